//! Gateway: the webhook HTTP server and the event dispatcher behind it.
//!
//! One POST route receives LINE webhook batches; each text message is answered with a
//! Gemini completion (or an apology when the completion fails).

mod dispatch;
mod server;

pub use dispatch::{DispatchReport, Relay, APOLOGY_TEXT};
pub use server::{build_gemini_client, build_relay, resolve_system_prompt, run_gateway, GatewayState};
