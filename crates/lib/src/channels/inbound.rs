//! Inbound text message from a channel: what the dispatcher hands to the completion client.

/// A replyable text message pulled out of a webhook event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub reply_token: String,
    /// Sender's user id; absent for group/room sources that hide it.
    pub user_id: Option<String>,
    pub text: String,
}
