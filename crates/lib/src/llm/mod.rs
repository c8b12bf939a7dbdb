//! Completion client for the Gemini generative-language API.
//!
//! One request per inbound message; the first text part of the first candidate is the answer.

mod gemini;

pub use gemini::{
    Candidate, Content, GeminiClient, GeminiError, GenerateContentResponse, Part,
    DEFAULT_SYSTEM_PROMPT,
};
