//! Error types for debate-forge operations.
//!
//! Defines error types for each subsystem:
//! - Persona registry lookups and loading
//! - Raw LLM API interactions
//! - The completion gateway contract
//! - Conversation log persistence
//! - Debate orchestration

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur during persona registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Persona '{0}' not found in registry")]
    NotFound(String),

    #[error("Persona '{0}' already exists in registry")]
    DuplicatePersona(String),

    #[error("Invalid persona '{name}': {reason}")]
    InvalidPersona { name: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Errors that can occur during raw LLM API calls.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Missing API key: OPENAI_API_KEY environment variable not set")]
    MissingApiKey,

    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(String),

    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("Failed to parse LLM response: {0}")]
    ParseError(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("API error ({code}): {message}")]
    ApiError { code: u16, message: String },
}

/// Errors surfaced by the completion gateway.
///
/// These are the only failure kinds the orchestrator reasons about when
/// deciding whether to retry a turn.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Rate limited by provider: {0}")]
    RateLimit(String),

    #[error("Generation failed: {0}")]
    Generation(String),
}

impl From<LlmError> for GatewayError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::MissingApiKey => {
                GatewayError::Authentication(LlmError::MissingApiKey.to_string())
            }
            LlmError::ApiError { code: 401 | 403, message } => {
                GatewayError::Authentication(message)
            }
            LlmError::RateLimited(message) | LlmError::ApiError { code: 429, message } => {
                GatewayError::RateLimit(message)
            }
            other => GatewayError::Generation(other.to_string()),
        }
    }
}

/// Errors that can occur while loading or writing the conversation log.
#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("Failed to persist conversation log to {path:?}: {reason}")]
    Persistence { path: PathBuf, reason: String },

    #[error("Conversation log {path:?} is corrupt: {reason}")]
    CorruptLog { path: PathBuf, reason: String },
}

/// The failure behind a single debate turn.
#[derive(Debug, Error)]
pub enum TurnFailure {
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Recorder(#[from] RecorderError),
}

/// Errors that can occur while running a debate.
#[derive(Debug, Error)]
pub enum DebateError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("Invalid round count {0}: a debate needs at least one round")]
    InvalidRounds(u32),

    #[error("Debate configuration error: {0}")]
    Configuration(String),

    #[error("Round {round}, persona '{persona}' failed: {cause}")]
    TurnFailed {
        round: u32,
        persona: String,
        #[source]
        cause: TurnFailure,
    },
}

impl DebateError {
    /// Returns true if the error means no further debate should be attempted
    /// in this process (bad credentials or an unwritable log).
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DebateError::TurnFailed {
                cause: TurnFailure::Gateway(GatewayError::Authentication(_))
                    | TurnFailure::Recorder(_),
                ..
            }
        )
    }

    /// Returns true if the error is an unknown persona id.
    pub fn is_not_found(&self) -> bool {
        matches!(self, DebateError::Registry(RegistryError::NotFound(_)))
    }
}
