//! LINE Messaging API channel: webhook signature check, event parsing and the reply API.

use crate::channels::inbound::InboundMessage;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

const LINE_API_BASE: &str = "https://api.line.me";

/// Header carrying the base64 HMAC-SHA256 of the webhook body.
pub const SIGNATURE_HEADER: &str = "X-Line-Signature";

/// Maximum characters in one LINE text message.
pub const TEXT_MESSAGE_LIMIT: usize = 5000;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, thiserror::Error)]
pub enum LineError {
    #[error("missing X-Line-Signature header")]
    MissingSignature,
    #[error("invalid webhook signature")]
    InvalidSignature,
    #[error("invalid webhook body: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("line request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("line api error: {0}")]
    Api(String),
}

/// Webhook POST body.
#[derive(Debug, Deserialize)]
pub struct WebhookBody {
    #[serde(default)]
    pub destination: String,
    #[serde(default)]
    pub events: Vec<LineEvent>,
}

/// One webhook event. Only message events are modelled; everything else is `Other`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LineEvent {
    Message {
        /// Absent for events delivered in standby mode.
        #[serde(default, rename = "replyToken")]
        reply_token: Option<String>,
        #[serde(default)]
        source: Option<EventSource>,
        message: LineMessage,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventSource {
    #[serde(rename = "type", default)]
    pub typ: String,
    #[serde(default)]
    pub user_id: Option<String>,
}

/// Message payload of a message event. Media, stickers and locations are `Other`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LineMessage {
    Text {
        #[serde(default)]
        id: String,
        text: String,
    },
    #[serde(other)]
    Other,
}

impl LineEvent {
    /// The text message carried by this event, if it is a replyable text message event.
    pub fn text_message(&self) -> Option<InboundMessage> {
        match self {
            LineEvent::Message {
                reply_token: Some(reply_token),
                source,
                message: LineMessage::Text { text, .. },
            } => Some(InboundMessage {
                reply_token: reply_token.clone(),
                user_id: source.as_ref().and_then(|s| s.user_id.clone()),
                text: text.clone(),
            }),
            _ => None,
        }
    }

    /// Short name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            LineEvent::Message {
                message: LineMessage::Text { .. },
                ..
            } => "message/text",
            LineEvent::Message { .. } => "message/other",
            LineEvent::Other => "other",
        }
    }
}

/// Base64 HMAC-SHA256 of `body` keyed by the channel secret (the value LINE sends in X-Line-Signature).
pub fn compute_signature(channel_secret: &str, body: &[u8]) -> Result<String, LineError> {
    let mut mac = hmac_for(channel_secret)?;
    mac.update(body);
    Ok(BASE64.encode(mac.finalize().into_bytes()))
}

fn hmac_for(channel_secret: &str) -> Result<HmacSha256, LineError> {
    HmacSha256::new_from_slice(channel_secret.as_bytes()).map_err(|_| LineError::InvalidSignature)
}

/// Cut `text` to at most `limit` characters, on a char boundary.
pub fn truncate_text(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((i, _)) => &text[..i],
        None => text,
    }
}

/// LINE channel connector: verifies and parses webhook posts, sends replies via the reply API.
#[derive(Clone)]
pub struct LineChannel {
    channel_secret: String,
    access_token: String,
    api_base: String,
    client: reqwest::Client,
}

impl LineChannel {
    pub fn new(channel_secret: String, access_token: String, api_base: Option<String>) -> Self {
        let api_base = api_base
            .map(|u| u.trim_end_matches('/').to_string())
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| LINE_API_BASE.to_string());
        Self {
            channel_secret,
            access_token,
            api_base,
            client: reqwest::Client::new(),
        }
    }

    /// Verify `signature` against the raw body, then parse the events.
    pub fn parse_request(
        &self,
        signature: Option<&str>,
        body: &[u8],
    ) -> Result<Vec<LineEvent>, LineError> {
        let signature = signature
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(LineError::MissingSignature)?;
        self.verify_signature(signature, body)?;
        let webhook: WebhookBody = serde_json::from_slice(body)?;
        Ok(webhook.events)
    }

    fn verify_signature(&self, signature: &str, body: &[u8]) -> Result<(), LineError> {
        let expected = BASE64
            .decode(signature)
            .map_err(|_| LineError::InvalidSignature)?;
        let mut mac = hmac_for(&self.channel_secret)?;
        mac.update(body);
        mac.verify_slice(&expected)
            .map_err(|_| LineError::InvalidSignature)
    }

    /// Send one text message to a reply token via POST /v2/bot/message/reply.
    pub async fn reply_text(&self, reply_token: &str, text: &str) -> Result<(), LineError> {
        let url = format!("{}/v2/bot/message/reply", self.api_base);
        let body = serde_json::json!({
            "replyToken": reply_token,
            "messages": [{ "type": "text", "text": truncate_text(text, TEXT_MESSAGE_LIMIT) }],
        });
        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(LineError::Api(format!("reply failed: {} {}", status, body)));
        }
        Ok(())
    }
}
