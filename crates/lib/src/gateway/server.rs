//! Gateway HTTP server: one webhook route for LINE.

use crate::channels::{LineChannel, SIGNATURE_HEADER};
use crate::config::{self, Config};
use crate::gateway::dispatch::Relay;
use crate::llm::{GeminiClient, DEFAULT_SYSTEM_PROMPT};
use crate::message_log::MessageLog;
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
    Router,
};
use std::sync::Arc;

/// Shared state for the webhook handler.
#[derive(Clone)]
pub struct GatewayState {
    pub relay: Arc<Relay>,
}

/// Build the Gemini client from config and GEMINI_API_KEY. Fails when no API key is configured.
pub fn build_gemini_client(config: &Config) -> Result<GeminiClient> {
    let api_key = config::resolve_gemini_api_key(config).context(
        "gemini api key not configured (set GEMINI_API_KEY or gemini.apiKey)",
    )?;
    Ok(GeminiClient::new(
        api_key,
        config::resolve_gemini_model(config),
        config.gemini.base_url.clone(),
    ))
}

/// System instruction for completions: None when relay.withSystemPrompt is false.
pub fn resolve_system_prompt(config: &Config) -> Option<String> {
    if !config.relay.with_system_prompt {
        return None;
    }
    let custom = config
        .relay
        .system_prompt
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());
    Some(custom.unwrap_or(DEFAULT_SYSTEM_PROMPT).to_string())
}

/// Build the reply pipeline. Fails when the LINE secret/token or Gemini key are missing.
pub fn build_relay(config: &Config) -> Result<Relay> {
    let secret = config::resolve_line_channel_secret(config).context(
        "line channel secret not configured (set LINE_CHANNEL_SECRET or channels.line.channelSecret)",
    )?;
    let token = config::resolve_line_channel_token(config).context(
        "line channel access token not configured (set LINE_CHANNEL_TOKEN or channels.line.channelAccessToken)",
    )?;
    let line = LineChannel::new(secret, token, config.channels.line.api_base_url.clone());
    let gemini = build_gemini_client(config)?;
    let message_log = config
        .relay
        .with_logging
        .then(|| MessageLog::new(config.relay.log_directory.clone()));
    Ok(Relay::new(line, gemini)
        .with_system_prompt(resolve_system_prompt(config))
        .with_message_log(message_log)
        .with_failure_policy(config.relay.failure_policy))
}

/// Route path for the webhook; a missing leading slash is added.
fn callback_route(config: &Config) -> String {
    let path = config.gateway.callback_path.trim();
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    }
}

/// Run the gateway server; binds to config.gateway.bind:config.gateway.port.
/// Blocks until shutdown (e.g. Ctrl+C).
pub async fn run_gateway(config: Config) -> Result<()> {
    let relay = build_relay(&config)?;
    if config.relay.with_logging {
        let dir = &config.relay.log_directory;
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("creating message log directory {}", dir.display()))?;
    }

    let route = callback_route(&config);
    let bind_addr = format!("{}:{}", config.gateway.bind.trim(), config.gateway.port);
    log::info!(
        "relay: model {}, system prompt {}, message log {}, on failure {:?}",
        config::resolve_gemini_model(&config),
        if config.relay.with_system_prompt { "on" } else { "off" },
        if config.relay.with_logging { "on" } else { "off" },
        config.relay.failure_policy,
    );

    let state = GatewayState {
        relay: Arc::new(relay),
    };
    let app = Router::new()
        .route(&route, post(line_callback))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    log::info!("gateway listening on {} (webhook {})", bind_addr, route);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("gateway server exited")?;
    log::info!("gateway stopped");
    Ok(())
}

/// Future that completes when the process should shut down (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                log::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("shutdown signal received, draining connections");
}

/// POST callback: verifies X-Line-Signature, parses events, answers text messages.
/// Responds 500 when the body cannot be verified or parsed, 200 once the batch is processed.
async fn line_callback(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());
    let events = match state.relay.line().parse_request(signature, &body) {
        Ok(events) => events,
        Err(e) => {
            log::warn!("callback: rejecting webhook: {}", e);
            return StatusCode::INTERNAL_SERVER_ERROR;
        }
    };
    // Runs on its own task: the batch is finished and replied to even if the caller hangs up.
    let relay = state.relay.clone();
    let batch = tokio::spawn(async move {
        let report = relay.dispatch(&events).await;
        log::debug!(
            "callback: {} events, replied {}, failed {}, skipped {}, halted {}",
            events.len(),
            report.replied,
            report.failed,
            report.skipped,
            report.halted
        );
    });
    if let Err(e) = batch.await {
        log::error!("callback: dispatch task failed: {}", e);
    }
    StatusCode::OK
}
