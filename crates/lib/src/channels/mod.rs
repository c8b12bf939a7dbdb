//! Messaging channels (LINE).
//!
//! The LINE channel verifies and parses webhook posts into events and sends replies
//! through the reply API. Text message events become [`InboundMessage`]s for the dispatcher.

mod inbound;
mod line;

pub use inbound::InboundMessage;
pub use line::{
    compute_signature, truncate_text, EventSource, LineChannel, LineError, LineEvent,
    LineMessage, WebhookBody, SIGNATURE_HEADER, TEXT_MESSAGE_LIMIT,
};
