//! debate-forge: persona debates between LLM-backed agents.
//!
//! Two scripted personas take turns on a subject through a chat completion
//! API; every turn is appended to a JSON conversation log that can later be
//! filtered and summarized by subject.

pub mod cli;
pub mod debate;
pub mod error;
pub mod llm;

// Re-export commonly used error types
pub use error::{DebateError, GatewayError, LlmError, RecorderError, RegistryError, TurnFailure};
