//! linegem core library: LINE webhook relay answering chat messages with Gemini.
//!
//! Shared by the `linegem` binary and the integration tests.

pub mod channels;
pub mod config;
pub mod gateway;
pub mod init;
pub mod llm;
pub mod message_log;
