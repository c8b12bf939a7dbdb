//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.linegem/config.json`) and environment.
//! Secrets normally come from the environment (`LINE_CHANNEL_SECRET`, `LINE_CHANNEL_TOKEN`,
//! `GEMINI_API_KEY`); the file values are used only when the variable is unset or empty.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default model when `gemini.model` is not set.
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-flash";

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// HTTP listener settings.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Channel settings (LINE).
    #[serde(default)]
    pub channels: ChannelsConfig,

    /// Gemini API settings.
    #[serde(default)]
    pub gemini: GeminiConfig,

    /// Relay behavior: system prompt, message log, failure policy.
    #[serde(default)]
    pub relay: RelayConfig,
}

/// Gateway bind, port and webhook route.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// Port for the webhook listener (default 8080). Overridden by PORT env.
    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Bind address (default "0.0.0.0"; LINE must be able to reach the callback).
    #[serde(default = "default_gateway_bind")]
    pub bind: String,

    /// Route LINE posts webhook events to (default "/callback").
    #[serde(default = "default_callback_path")]
    pub callback_path: String,
}

fn default_gateway_port() -> u16 {
    8080
}

fn default_gateway_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_callback_path() -> String {
    "/callback".to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_gateway_port(),
            bind: default_gateway_bind(),
            callback_path: default_callback_path(),
        }
    }
}

/// Per-channel config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelsConfig {
    #[serde(default)]
    pub line: LineChannelConfig,
}

/// LINE Messaging API channel config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineChannelConfig {
    /// Channel secret used to verify X-Line-Signature. Overridden by LINE_CHANNEL_SECRET env.
    pub channel_secret: Option<String>,
    /// Long-lived channel access token for the reply API. Overridden by LINE_CHANNEL_TOKEN env.
    pub channel_access_token: Option<String>,
    /// Messaging API base URL (default https://api.line.me).
    pub api_base_url: Option<String>,
}

/// Gemini generateContent settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiConfig {
    /// API key. Overridden by GEMINI_API_KEY env.
    pub api_key: Option<String>,
    /// Model id (default "gemini-1.5-flash").
    pub model: Option<String>,
    /// API base URL (default https://generativelanguage.googleapis.com).
    pub base_url: Option<String>,
}

/// What to do with the rest of a webhook batch after one completion fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Apologize for the failed event and drop the remaining events in the batch.
    #[default]
    Halt,
    /// Apologize for the failed event and keep processing the batch.
    Continue,
}

/// Relay behavior toggles.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayConfig {
    /// Send a system instruction with every completion (default true).
    #[serde(default = "default_true")]
    pub with_system_prompt: bool,
    /// Custom system instruction; the built-in one is used when unset or empty.
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// Write each answered message to `<logDirectory>/ai_<userId>.txt` (default true).
    #[serde(default = "default_true")]
    pub with_logging: bool,
    /// Directory for message log files (default "/tmp").
    #[serde(default = "default_log_directory")]
    pub log_directory: PathBuf,
    /// "halt" (default) or "continue".
    #[serde(default)]
    pub failure_policy: FailurePolicy,
}

fn default_true() -> bool {
    true
}

fn default_log_directory() -> PathBuf {
    PathBuf::from("/tmp")
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            with_system_prompt: true,
            system_prompt: None,
            with_logging: true,
            log_directory: default_log_directory(),
            failure_policy: FailurePolicy::default(),
        }
    }
}

/// Env value wins when set and non-empty; otherwise the trimmed, non-empty config value.
fn env_or_config(env_value: Option<String>, config_value: Option<&String>) -> Option<String> {
    env_value
        .and_then(|s| {
            let t = s.trim();
            if t.is_empty() {
                None
            } else {
                Some(t.to_string())
            }
        })
        .or_else(|| {
            config_value
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        })
}

/// Resolve the LINE channel secret: env LINE_CHANNEL_SECRET overrides config.
pub fn resolve_line_channel_secret(config: &Config) -> Option<String> {
    env_or_config(
        std::env::var("LINE_CHANNEL_SECRET").ok(),
        config.channels.line.channel_secret.as_ref(),
    )
}

/// Resolve the LINE channel access token: env LINE_CHANNEL_TOKEN overrides config.
pub fn resolve_line_channel_token(config: &Config) -> Option<String> {
    env_or_config(
        std::env::var("LINE_CHANNEL_TOKEN").ok(),
        config.channels.line.channel_access_token.as_ref(),
    )
}

/// Resolve the Gemini API key: env GEMINI_API_KEY overrides config.
pub fn resolve_gemini_api_key(config: &Config) -> Option<String> {
    env_or_config(
        std::env::var("GEMINI_API_KEY").ok(),
        config.gemini.api_key.as_ref(),
    )
}

/// Resolve the Gemini model id, falling back to [`DEFAULT_GEMINI_MODEL`].
pub fn resolve_gemini_model(config: &Config) -> String {
    config
        .gemini
        .model
        .as_deref()
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .unwrap_or(DEFAULT_GEMINI_MODEL)
        .to_string()
}

/// Apply the PORT env override. An unparsable value is ignored with a warning.
pub fn apply_port_env(config: &mut Config) {
    if let Ok(raw) = std::env::var("PORT") {
        apply_port_value(config, &raw);
    }
}

fn apply_port_value(config: &mut Config, raw: &str) {
    let raw = raw.trim();
    if raw.is_empty() {
        return;
    }
    match raw.parse::<u16>() {
        Ok(p) => config.gateway.port = p,
        Err(_) => log::warn!("ignoring invalid PORT value {:?}", raw),
    }
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("LINEGEM_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .map(|h| h.join(".linegem").join("config.json"))
                .unwrap_or_else(|| PathBuf::from("config.json"))
        })
}

/// Load config from the given path (or the default path). Missing file => default config.
/// The PORT env override is applied after parsing.
/// Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let mut config = read_config_file(&path)?;
    apply_port_env(&mut config);
    Ok((config, path))
}

fn read_config_file(path: &Path) -> Result<Config> {
    if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        return Ok(Config::default());
    }
    let s = std::fs::read_to_string(path)
        .with_context(|| format!("reading config from {}", path.display()))?;
    let config = serde_json::from_str(&s)
        .with_context(|| format!("parsing config from {}", path.display()))?;
    Ok(config)
}
