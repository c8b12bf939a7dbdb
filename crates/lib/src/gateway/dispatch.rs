//! Event dispatch: answer each text message of a webhook batch with a Gemini completion.
//!
//! Per text message: one completion, an optional message-log write, exactly one reply.
//! A failed completion is answered with [`APOLOGY_TEXT`]; whether the rest of the batch is
//! still processed depends on the [`FailurePolicy`].

use crate::channels::{InboundMessage, LineChannel, LineEvent};
use crate::config::FailurePolicy;
use crate::llm::{GeminiClient, GeminiError};
use crate::message_log::MessageLog;

/// Reply sent when the completion for a message fails.
pub const APOLOGY_TEXT: &str = "出現問題，請稍後再試";

/// What happened to one webhook batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Text messages answered with a completion.
    pub replied: usize,
    /// Text messages whose completion failed (answered with the apology).
    pub failed: usize,
    /// Events that are not replyable text messages.
    pub skipped: usize,
    /// True when a failure stopped the batch early.
    pub halted: bool,
}

/// The reply pipeline: LINE channel, completion client, optional message log.
/// Shared by all requests; holds no mutable state.
#[derive(Clone)]
pub struct Relay {
    line: LineChannel,
    gemini: GeminiClient,
    system_prompt: Option<String>,
    message_log: Option<MessageLog>,
    failure_policy: FailurePolicy,
}

impl Relay {
    pub fn new(line: LineChannel, gemini: GeminiClient) -> Self {
        Self {
            line,
            gemini,
            system_prompt: None,
            message_log: None,
            failure_policy: FailurePolicy::default(),
        }
    }

    /// Send `prompt` as the system instruction of every completion.
    pub fn with_system_prompt(mut self, prompt: Option<String>) -> Self {
        self.system_prompt = prompt.filter(|p| !p.trim().is_empty());
        self
    }

    /// Record every answered message in `log`.
    pub fn with_message_log(mut self, log: Option<MessageLog>) -> Self {
        self.message_log = log;
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn line(&self) -> &LineChannel {
        &self.line
    }

    /// Process a parsed batch in order.
    pub async fn dispatch(&self, events: &[LineEvent]) -> DispatchReport {
        let mut report = DispatchReport::default();
        for event in events {
            let Some(msg) = event.text_message() else {
                log::debug!("dispatch: skipping {} event", event.kind());
                report.skipped += 1;
                continue;
            };
            match self.answer(&msg).await {
                Ok(()) => report.replied += 1,
                Err(_) => {
                    report.failed += 1;
                    if self.failure_policy == FailurePolicy::Halt {
                        report.halted = true;
                        break;
                    }
                }
            }
        }
        report
    }

    /// Complete one message and reply. The reply is the apology when the completion fails.
    async fn answer(&self, msg: &InboundMessage) -> Result<(), GeminiError> {
        let completion = self
            .gemini
            .complete(self.system_prompt.as_deref(), &msg.text)
            .await;
        let text = match completion {
            Ok(text) => text,
            Err(e) => {
                if e.is_extraction() {
                    log::error!("dispatch: completion returned no usable text: {}", e);
                } else {
                    log::error!("dispatch: completion failed: {}", e);
                }
                self.reply(&msg.reply_token, APOLOGY_TEXT).await;
                return Err(e);
            }
        };
        self.record(msg).await;
        self.reply(&msg.reply_token, &text).await;
        Ok(())
    }

    async fn record(&self, msg: &InboundMessage) {
        let Some(ref message_log) = self.message_log else {
            return;
        };
        let Some(ref user_id) = msg.user_id else {
            log::debug!("dispatch: message has no user id, not logging it");
            return;
        };
        if let Err(e) = message_log.record(user_id, msg.text.as_bytes()).await {
            log::warn!("dispatch: message log write failed: {:#}", e);
        }
    }

    async fn reply(&self, reply_token: &str, text: &str) {
        if let Err(e) = self.line.reply_text(reply_token, text).await {
            log::warn!("dispatch: reply failed: {}", e);
        }
    }
}
