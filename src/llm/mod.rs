//! LLM integration for debate-forge.
//!
//! A minimal OpenAI-compatible chat completions client behind the
//! `LlmProvider` trait. Debates never use it directly; they go through
//! `debate::LlmGateway`.

pub mod client;

pub use client::{
    mask_secret, ChatCompletionsClient, Choice, GenerationRequest, GenerationResponse,
    LlmProvider, Message, Usage, DEFAULT_API_BASE, DEFAULT_MODEL,
};
