//! Completion gateway: the single seam between debates and the LLM provider.
//!
//! The orchestrator only knows `CompletionGateway`. `LlmGateway` is the
//! production implementation: it turns a persona, a subject and the prior
//! transcript into a chat request and maps provider failures onto the three
//! gateway error kinds.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::personas::Persona;
use super::recorder::TurnRecord;
use crate::error::GatewayError;
use crate::llm::{GenerationRequest, LlmProvider, Message};

/// Default sampling temperature for debate turns.
pub const DEFAULT_TEMPERATURE: f64 = 0.8;

/// Default per-call timeout.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(60);

/// Generated text plus the provider's completion token count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub text: String,
    pub token_count: u32,
}

/// Produces one persona's reply given the debate so far.
#[async_trait]
pub trait CompletionGateway: Send + Sync {
    async fn generate(
        &self,
        persona: &Persona,
        subject: &str,
        history: &[TurnRecord],
    ) -> Result<Completion, GatewayError>;
}

/// Gateway backed by an `LlmProvider`.
pub struct LlmGateway {
    provider: Arc<dyn LlmProvider>,
    model: String,
    temperature: f64,
    timeout: Duration,
}

impl LlmGateway {
    /// Creates a gateway using the provider's default model.
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self {
            provider,
            model: String::new(),
            temperature: DEFAULT_TEMPERATURE,
            timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    /// Sets the model sent with every request.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Sets the sampling temperature.
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature.clamp(0.0, 2.0);
        self
    }

    /// Sets the per-call timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Builds the chat request for one turn.
    pub fn build_request(
        &self,
        persona: &Persona,
        subject: &str,
        history: &[TurnRecord],
    ) -> GenerationRequest {
        GenerationRequest::new(
            self.model.clone(),
            vec![
                Message::system(persona.system_prompt()),
                Message::user(build_turn_prompt(persona, subject, history)),
            ],
        )
        .with_temperature(self.temperature)
        .with_max_tokens(persona.max_tokens)
    }
}

/// Renders the user prompt: subject, transcript so far, then directives.
pub fn build_turn_prompt(persona: &Persona, subject: &str, history: &[TurnRecord]) -> String {
    let mut prompt = format!("Debate the topic: \"{}\"\n", subject);

    if history.is_empty() {
        prompt.push_str("\nYou are opening the debate.\n");
    } else {
        prompt.push_str("\nTranscript so far:\n");
        for record in history {
            prompt.push_str(&record.transcript_line());
            prompt.push('\n');
        }
    }

    if !persona.instructions.is_empty() {
        prompt.push_str("\nYou must:\n");
        prompt.push_str(&persona.render_instructions(subject));
        prompt.push('\n');
    }

    if let Some(expected) = &persona.expected_output {
        prompt.push_str(&format!("\nExpected output: {}\n", expected));
    }

    prompt
}

#[async_trait]
impl CompletionGateway for LlmGateway {
    async fn generate(
        &self,
        persona: &Persona,
        subject: &str,
        history: &[TurnRecord],
    ) -> Result<Completion, GatewayError> {
        let request = self.build_request(persona, subject, history);

        let response = tokio::time::timeout(self.timeout, self.provider.generate(request))
            .await
            .map_err(|_| {
                GatewayError::Generation(format!(
                    "completion timed out after {}s",
                    self.timeout.as_secs_f64()
                ))
            })??;

        let text = response
            .first_content()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| GatewayError::Generation("Empty response from LLM".to_string()))?
            .to_string();

        tracing::debug!(
            persona = %persona.name,
            completion_tokens = response.usage.completion_tokens,
            "Received completion"
        );

        Ok(Completion {
            text,
            token_count: response.usage.completion_tokens,
        })
    }
}
