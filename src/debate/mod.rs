//! Persona debates.
//!
//! Two personas take turns arguing a subject. Each turn goes through the
//! completion gateway and is appended to the conversation log before the
//! next persona speaks.
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use debate_forge::debate::{ConversationRecorder, DebateOrchestrator, LlmGateway};
//! use debate_forge::llm::ChatCompletionsClient;
//!
//! let client = Arc::new(ChatCompletionsClient::from_env()?);
//! let recorder = Arc::new(ConversationRecorder::open("agent_conversations.json").await?);
//!
//! let orchestrator = DebateOrchestrator::builder()
//!     .gateway(Arc::new(LlmGateway::new(client)))
//!     .recorder(recorder.clone())
//!     .build()?;
//!
//! let turns = orchestrator
//!     .run_debate("Remote work is better than office work", 3, ("skeptic", "optimist"))
//!     .await?;
//! let summary = recorder.summarize("Remote work is better than office work").await;
//! ```

pub mod gateway;
pub mod orchestrator;
pub mod personas;
pub mod recorder;
pub mod transcript;

pub use gateway::{Completion, CompletionGateway, LlmGateway};
pub use orchestrator::{
    DebateEvent, DebateOrchestrator, DebateOrchestratorBuilder, DebateOrchestratorConfig,
    HistoryScope, RetryPolicy,
};
pub use personas::{Persona, PersonaRegistry};
pub use recorder::{ConversationRecorder, SubjectSummary, TurnRecord};

/// Sample subjects used by `debate --sample-subjects`.
pub const SAMPLE_SUBJECTS: [&str; 3] = [
    "Artificial Intelligence will replace human creativity",
    "Remote work is better than office work",
    "Social media has made society worse",
];
