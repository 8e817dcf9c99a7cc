//! Debate Orchestrator.
//!
//! Drives a fixed number of rounds between two personas on a subject. Every
//! turn depends on the text of all turns before it, so turns run strictly one
//! after another: fetch history, call the gateway (with bounded retries for
//! transient failures), record the result, move to the next persona.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use super::gateway::{Completion, CompletionGateway};
use super::personas::{Persona, PersonaRegistry};
use super::recorder::{ConversationRecorder, TurnRecord};
use crate::error::{DebateError, GatewayError, TurnFailure};

// ============================================================================
// Configuration
// ============================================================================

/// Upper bound on rounds whose turn slots are reserved before a debate starts.
const MAX_PREALLOCATED_ROUNDS: usize = 64;

/// Which prior turns a persona sees when generating its reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum HistoryScope {
    /// Every recorded turn on the same subject, including earlier debates.
    #[default]
    Subject,
    /// Only turns produced by the current `run_debate` call.
    Session,
}

/// Bounded retry policy for transient gateway failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries allowed after a rate-limit response.
    pub max_rate_limit_retries: u32,
    /// Retries allowed after any other generation failure.
    pub max_generation_retries: u32,
    /// Delay before the first retry; doubles on each further attempt.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_rate_limit_retries: 3,
            max_generation_retries: 1,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_rate_limit_retries: 0,
            max_generation_retries: 0,
            base_delay: Duration::ZERO,
        }
    }

    /// Sets the base backoff delay.
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Number of retries allowed for this error. Authentication is never retried.
    pub fn max_retries_for(&self, error: &GatewayError) -> u32 {
        match error {
            GatewayError::Authentication(_) => 0,
            GatewayError::RateLimit(_) => self.max_rate_limit_retries,
            GatewayError::Generation(_) => self.max_generation_retries,
        }
    }

    /// Backoff before retry number `attempt` (0-based): base, 2x base, 4x base...
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(1u32 << attempt.min(16))
    }
}

/// Configuration for the debate orchestrator.
#[derive(Debug, Clone, Default)]
pub struct DebateOrchestratorConfig {
    /// Which prior turns are fed back to personas.
    pub history_scope: HistoryScope,
    /// Keep only the most recent N turns of history, if set.
    pub history_window: Option<usize>,
    /// Retry policy for gateway failures.
    pub retry: RetryPolicy,
}

impl DebateOrchestratorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_history_scope(mut self, scope: HistoryScope) -> Self {
        self.history_scope = scope;
        self
    }

    /// Sets the history window. Zero is treated as "no history".
    pub fn with_history_window(mut self, window: Option<usize>) -> Self {
        self.history_window = window;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

// ============================================================================
// Debate Events
// ============================================================================

/// Events emitted while a debate runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DebateEvent {
    DebateStarted {
        subject: String,
        participants: Vec<String>,
        planned_rounds: u32,
        timestamp: DateTime<Utc>,
    },
    RoundStarted {
        /// 1-based round number.
        round: u32,
        timestamp: DateTime<Utc>,
    },
    TurnRecorded {
        round: u32,
        record: TurnRecord,
    },
    RetryScheduled {
        round: u32,
        persona: String,
        /// 1-based retry attempt.
        attempt: u32,
        delay_ms: u64,
        error: String,
        timestamp: DateTime<Utc>,
    },
    DebateCompleted {
        subject: String,
        turns: usize,
        total_tokens: u64,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
    DebateFailed {
        error: String,
        timestamp: DateTime<Utc>,
    },
}

// ============================================================================
// Debate Orchestrator
// ============================================================================

/// Runs alternating debates between personas and records every turn.
pub struct DebateOrchestrator {
    registry: Arc<PersonaRegistry>,
    gateway: Arc<dyn CompletionGateway>,
    recorder: Arc<ConversationRecorder>,
    config: DebateOrchestratorConfig,
}

impl DebateOrchestrator {
    /// Creates a new debate orchestrator.
    pub fn new(
        registry: Arc<PersonaRegistry>,
        gateway: Arc<dyn CompletionGateway>,
        recorder: Arc<ConversationRecorder>,
        config: DebateOrchestratorConfig,
    ) -> Self {
        Self {
            registry,
            gateway,
            recorder,
            config,
        }
    }

    /// Creates a new builder for configuring the orchestrator.
    pub fn builder() -> DebateOrchestratorBuilder {
        DebateOrchestratorBuilder::new()
    }

    pub fn config(&self) -> &DebateOrchestratorConfig {
        &self.config
    }

    pub fn registry(&self) -> &PersonaRegistry {
        &self.registry
    }

    pub fn recorder(&self) -> &Arc<ConversationRecorder> {
        &self.recorder
    }

    /// Runs `rounds` rounds on `subject`, alternating `persona_ids` in order.
    ///
    /// Returns only the turns produced by this call. Unknown personas and a
    /// zero round count are rejected before anything is generated or written.
    pub async fn run_debate(
        &self,
        subject: &str,
        rounds: u32,
        persona_ids: (&str, &str),
    ) -> Result<Vec<TurnRecord>, DebateError> {
        self.run(subject, rounds, persona_ids, None).await
    }

    /// Same as [`run_debate`](Self::run_debate), emitting progress events.
    pub async fn run_debate_with_events(
        &self,
        subject: &str,
        rounds: u32,
        persona_ids: (&str, &str),
        event_tx: mpsc::Sender<DebateEvent>,
    ) -> Result<Vec<TurnRecord>, DebateError> {
        self.run(subject, rounds, persona_ids, Some(&event_tx)).await
    }

    async fn run(
        &self,
        subject: &str,
        rounds: u32,
        persona_ids: (&str, &str),
        events: Option<&mpsc::Sender<DebateEvent>>,
    ) -> Result<Vec<TurnRecord>, DebateError> {
        if rounds == 0 {
            return Err(DebateError::InvalidRounds(rounds));
        }
        let personas = [
            self.registry.get_persona(persona_ids.0)?,
            self.registry.get_persona(persona_ids.1)?,
        ];

        let start_time = Instant::now();
        tracing::info!(
            subject = %subject,
            rounds,
            first = %personas[0].name,
            second = %personas[1].name,
            "Starting debate"
        );
        send_event(
            events,
            DebateEvent::DebateStarted {
                subject: subject.to_string(),
                participants: personas.iter().map(|p| p.name.clone()).collect(),
                planned_rounds: rounds,
                timestamp: Utc::now(),
            },
        )
        .await;

        // Round counts are caller-controlled; reserve a bounded prefix only.
        let reserve = (rounds as usize).min(MAX_PREALLOCATED_ROUNDS) * personas.len();
        let mut session: Vec<TurnRecord> = Vec::with_capacity(reserve);

        for round in 1..=rounds {
            send_event(
                events,
                DebateEvent::RoundStarted {
                    round,
                    timestamp: Utc::now(),
                },
            )
            .await;

            for persona in personas {
                let record = match self
                    .take_turn(round, persona, subject, &session, events)
                    .await
                {
                    Ok(record) => record,
                    Err(err) => {
                        tracing::error!(
                            subject = %subject,
                            round,
                            persona = %persona.name,
                            recorded = session.len(),
                            error = %err,
                            "Debate stopped"
                        );
                        send_event(
                            events,
                            DebateEvent::DebateFailed {
                                error: err.to_string(),
                                timestamp: Utc::now(),
                            },
                        )
                        .await;
                        return Err(err);
                    }
                };

                send_event(
                    events,
                    DebateEvent::TurnRecorded {
                        round,
                        record: record.clone(),
                    },
                )
                .await;
                session.push(record);
            }
        }

        let total_tokens: u64 = session.iter().map(|r| u64::from(r.response_tokens)).sum();
        let duration_ms = start_time.elapsed().as_millis() as u64;
        tracing::info!(
            subject = %subject,
            turns = session.len(),
            total_tokens,
            duration_ms,
            "Debate completed"
        );
        send_event(
            events,
            DebateEvent::DebateCompleted {
                subject: subject.to_string(),
                turns: session.len(),
                total_tokens,
                duration_ms,
                timestamp: Utc::now(),
            },
        )
        .await;

        Ok(session)
    }

    /// Generates and records one persona's turn.
    async fn take_turn(
        &self,
        round: u32,
        persona: &Persona,
        subject: &str,
        session: &[TurnRecord],
        events: Option<&mpsc::Sender<DebateEvent>>,
    ) -> Result<TurnRecord, DebateError> {
        let turn_failed = |cause: TurnFailure| DebateError::TurnFailed {
            round,
            persona: persona.name.clone(),
            cause,
        };

        let history = self.history_for(subject, session).await;
        let completion = self
            .generate_with_retry(round, persona, subject, &history, events)
            .await
            .map_err(|e| turn_failed(e.into()))?;

        let record = TurnRecord::now(
            subject,
            persona.name.clone(),
            completion.text,
            completion.token_count,
        );
        self.recorder
            .record(record.clone())
            .await
            .map_err(|e| turn_failed(e.into()))?;

        tracing::info!(
            round,
            persona = %persona.name,
            tokens = record.response_tokens,
            "Turn recorded"
        );
        Ok(record)
    }

    /// History handed to the next persona, per the configured scope and window.
    async fn history_for(&self, subject: &str, session: &[TurnRecord]) -> Vec<TurnRecord> {
        let mut history = match self.config.history_scope {
            HistoryScope::Subject => self.recorder.get_history(subject).await,
            HistoryScope::Session => session.to_vec(),
        };

        if let Some(window) = self.config.history_window {
            let skip = history.len().saturating_sub(window);
            history.drain(..skip);
        }
        history
    }

    /// Calls the gateway, retrying transient failures per the retry policy.
    async fn generate_with_retry(
        &self,
        round: u32,
        persona: &Persona,
        subject: &str,
        history: &[TurnRecord],
        events: Option<&mpsc::Sender<DebateEvent>>,
    ) -> Result<Completion, GatewayError> {
        let mut attempt = 0;
        loop {
            let err = match self.gateway.generate(persona, subject, history).await {
                Ok(completion) => return Ok(completion),
                Err(err) => err,
            };

            if attempt >= self.config.retry.max_retries_for(&err) {
                return Err(err);
            }

            let delay = self.config.retry.delay_for(attempt);
            attempt += 1;
            tracing::warn!(
                round,
                persona = %persona.name,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Transient gateway error, will retry"
            );
            send_event(
                events,
                DebateEvent::RetryScheduled {
                    round,
                    persona: persona.name.clone(),
                    attempt,
                    delay_ms: delay.as_millis() as u64,
                    error: err.to_string(),
                    timestamp: Utc::now(),
                },
            )
            .await;
            tokio::time::sleep(delay).await;
        }
    }
}

/// Sends an event if a channel was supplied. A closed receiver is ignored.
async fn send_event(events: Option<&mpsc::Sender<DebateEvent>>, event: DebateEvent) {
    if let Some(tx) = events {
        let _ = tx.send(event).await;
    }
}

// ============================================================================
// Builder Pattern
// ============================================================================

/// Builder for creating a DebateOrchestrator with fluent API.
pub struct DebateOrchestratorBuilder {
    registry: Option<Arc<PersonaRegistry>>,
    gateway: Option<Arc<dyn CompletionGateway>>,
    recorder: Option<Arc<ConversationRecorder>>,
    config: DebateOrchestratorConfig,
}

impl DebateOrchestratorBuilder {
    /// Creates a new builder with default configuration.
    pub fn new() -> Self {
        Self {
            registry: None,
            gateway: None,
            recorder: None,
            config: DebateOrchestratorConfig::default(),
        }
    }

    /// Sets the persona registry. Defaults to the built-in personas.
    pub fn registry(mut self, registry: Arc<PersonaRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn gateway(mut self, gateway: Arc<dyn CompletionGateway>) -> Self {
        self.gateway = Some(gateway);
        self
    }

    pub fn recorder(mut self, recorder: Arc<ConversationRecorder>) -> Self {
        self.recorder = Some(recorder);
        self
    }

    pub fn history_scope(mut self, scope: HistoryScope) -> Self {
        self.config.history_scope = scope;
        self
    }

    pub fn history_window(mut self, window: Option<usize>) -> Self {
        self.config.history_window = window;
        self
    }

    pub fn retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.config.retry = retry;
        self
    }

    /// Builds the DebateOrchestrator.
    pub fn build(self) -> Result<DebateOrchestrator, DebateError> {
        let gateway = self
            .gateway
            .ok_or_else(|| DebateError::Configuration("completion gateway is required".to_string()))?;
        let recorder = self
            .recorder
            .ok_or_else(|| DebateError::Configuration("conversation recorder is required".to_string()))?;
        let registry = self
            .registry
            .unwrap_or_else(|| Arc::new(PersonaRegistry::builtin()));

        Ok(DebateOrchestrator::new(registry, gateway, recorder, self.config))
    }
}

impl Default for DebateOrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RecorderError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Scripted gateway: pops queued failures first, then replies with a
    /// numbered line per persona. Captures the history each call saw.
    struct MockGateway {
        failures: Mutex<Vec<GatewayError>>,
        call_count: AtomicUsize,
        seen_history: Mutex<Vec<Vec<String>>>,
    }

    impl MockGateway {
        fn new() -> Self {
            Self::with_failures(Vec::new())
        }

        fn with_failures(mut failures: Vec<GatewayError>) -> Self {
            failures.reverse();
            Self {
                failures: Mutex::new(failures),
                call_count: AtomicUsize::new(0),
                seen_history: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.call_count.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CompletionGateway for MockGateway {
        async fn generate(
            &self,
            persona: &Persona,
            _subject: &str,
            history: &[TurnRecord],
        ) -> Result<Completion, GatewayError> {
            let idx = self.call_count.fetch_add(1, Ordering::SeqCst);
            self.seen_history
                .lock()
                .expect("lock not poisoned")
                .push(history.iter().map(|r| r.response.clone()).collect());

            if let Some(err) = self.failures.lock().expect("lock not poisoned").pop() {
                return Err(err);
            }
            Ok(Completion {
                text: format!("{} reply #{}", persona.name, idx),
                token_count: 10 + idx as u32,
            })
        }
    }

    async fn recorder_in(dir: &tempfile::TempDir) -> Arc<ConversationRecorder> {
        Arc::new(
            ConversationRecorder::open(dir.path().join("log.json"))
                .await
                .expect("open recorder"),
        )
    }

    fn orchestrator(
        gateway: Arc<MockGateway>,
        recorder: Arc<ConversationRecorder>,
        config: DebateOrchestratorConfig,
    ) -> DebateOrchestrator {
        DebateOrchestrator::new(
            Arc::new(PersonaRegistry::builtin()),
            gateway,
            recorder,
            config,
        )
    }

    fn fast_retries() -> RetryPolicy {
        RetryPolicy::default().with_base_delay(Duration::from_millis(1))
    }

    #[test]
    fn test_retry_policy_limits() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.max_retries_for(&GatewayError::Authentication("x".into())),
            0
        );
        assert_eq!(policy.max_retries_for(&GatewayError::RateLimit("x".into())), 3);
        assert_eq!(policy.max_retries_for(&GatewayError::Generation("x".into())), 1);
        assert_eq!(policy.delay_for(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for(2), Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_run_debate_alternates_and_records() {
        let dir = tempfile::tempdir().expect("tempdir");
        let recorder = recorder_in(&dir).await;
        let gateway = Arc::new(MockGateway::new());
        let orch = orchestrator(gateway.clone(), recorder.clone(), Default::default());

        let turns = orch
            .run_debate("Cryptocurrency is the future of money", 2, ("skeptic", "optimist"))
            .await
            .expect("debate completes");

        let agents: Vec<_> = turns.iter().map(|t| t.agent_name.as_str()).collect();
        assert_eq!(agents, vec!["skeptic", "optimist", "skeptic", "optimist"]);
        assert!(turns.iter().all(|t| !t.response.is_empty() && t.response_tokens > 0));
        assert_eq!(gateway.calls(), 4);
        assert_eq!(
            recorder.get_history("Cryptocurrency is the future of money").await,
            turns
        );
    }

    #[tokio::test]
    async fn test_each_turn_sees_all_previous_turns() {
        let dir = tempfile::tempdir().expect("tempdir");
        let gateway = Arc::new(MockGateway::new());
        let orch = orchestrator(gateway.clone(), recorder_in(&dir).await, Default::default());

        orch.run_debate("S", 2, ("skeptic", "optimist"))
            .await
            .expect("debate completes");

        let seen = gateway.seen_history.lock().expect("lock");
        let lens: Vec<_> = seen.iter().map(Vec::len).collect();
        assert_eq!(lens, vec![0, 1, 2, 3]);
        assert_eq!(seen[2], vec!["skeptic reply #0", "optimist reply #1"]);
    }

    #[tokio::test]
    async fn test_subject_scope_includes_earlier_debates() {
        let dir = tempfile::tempdir().expect("tempdir");
        let gateway = Arc::new(MockGateway::new());
        let orch = orchestrator(gateway.clone(), recorder_in(&dir).await, Default::default());

        orch.run_debate("S", 1, ("skeptic", "optimist")).await.expect("first");
        let second = orch.run_debate("S", 1, ("skeptic", "optimist")).await.expect("second");

        assert_eq!(second.len(), 2);
        let seen = gateway.seen_history.lock().expect("lock");
        assert_eq!(seen[2].len(), 2, "second debate starts with prior turns");
    }

    #[tokio::test]
    async fn test_session_scope_and_window() {
        let dir = tempfile::tempdir().expect("tempdir");
        let gateway = Arc::new(MockGateway::new());
        let config = DebateOrchestratorConfig::new()
            .with_history_scope(HistoryScope::Session)
            .with_history_window(Some(1));
        let orch = orchestrator(gateway.clone(), recorder_in(&dir).await, config);

        orch.run_debate("S", 1, ("skeptic", "optimist")).await.expect("first");
        orch.run_debate("S", 2, ("skeptic", "optimist")).await.expect("second");

        let seen = gateway.seen_history.lock().expect("lock");
        let lens: Vec<_> = seen.iter().map(Vec::len).collect();
        assert_eq!(lens, vec![0, 1, 0, 1, 1, 1]);
        assert_eq!(seen[5], vec!["skeptic reply #4"]);
    }

    #[tokio::test]
    async fn test_unknown_persona_has_no_side_effects() {
        let dir = tempfile::tempdir().expect("tempdir");
        let recorder = recorder_in(&dir).await;
        let gateway = Arc::new(MockGateway::new());
        let orch = orchestrator(gateway.clone(), recorder.clone(), Default::default());

        let err = orch
            .run_debate("S", 2, ("skeptic", "cynic"))
            .await
            .expect_err("unknown persona");

        assert!(err.is_not_found());
        assert_eq!(gateway.calls(), 0);
        assert!(recorder.is_empty().await);
        assert!(!dir.path().join("log.json").exists());
    }

    #[tokio::test]
    async fn test_zero_rounds_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let orch = orchestrator(
            Arc::new(MockGateway::new()),
            recorder_in(&dir).await,
            Default::default(),
        );
        assert!(matches!(
            orch.run_debate("S", 0, ("skeptic", "optimist")).await,
            Err(DebateError::InvalidRounds(0))
        ));
    }

    #[tokio::test]
    async fn test_huge_round_count_fails_on_first_turn() {
        let dir = tempfile::tempdir().expect("tempdir");
        let recorder = recorder_in(&dir).await;
        let gateway = Arc::new(MockGateway::with_failures(vec![
            GatewayError::Authentication("401".into()),
        ]));
        let orch = orchestrator(gateway.clone(), recorder.clone(), Default::default());

        let err = orch
            .run_debate("S", u32::MAX, ("skeptic", "optimist"))
            .await
            .expect_err("authentication failure stops the debate");

        assert!(matches!(
            err,
            DebateError::TurnFailed {
                round: 1,
                ref persona,
                cause: TurnFailure::Gateway(GatewayError::Authentication(_)),
            } if persona == "skeptic"
        ));
        assert_eq!(gateway.calls(), 1);
        assert!(recorder.is_empty().await);
    }

    #[tokio::test]
    async fn test_rate_limit_is_retried() {
        let dir = tempfile::tempdir().expect("tempdir");
        let gateway = Arc::new(MockGateway::with_failures(vec![
            GatewayError::RateLimit("429".into()),
            GatewayError::RateLimit("429".into()),
        ]));
        let config = DebateOrchestratorConfig::new().with_retry_policy(fast_retries());
        let orch = orchestrator(gateway.clone(), recorder_in(&dir).await, config);

        let turns = orch
            .run_debate("S", 1, ("skeptic", "optimist"))
            .await
            .expect("retries recover");
        assert_eq!(turns.len(), 2);
        assert_eq!(gateway.calls(), 4);
    }

    #[tokio::test]
    async fn test_generation_error_retry_ceiling() {
        let dir = tempfile::tempdir().expect("tempdir");
        let recorder = recorder_in(&dir).await;
        let gateway = Arc::new(MockGateway::with_failures(vec![
            GatewayError::Generation("boom".into()),
            GatewayError::Generation("boom".into()),
        ]));
        let config = DebateOrchestratorConfig::new().with_retry_policy(fast_retries());
        let orch = orchestrator(gateway.clone(), recorder.clone(), config);

        let err = orch
            .run_debate("S", 1, ("skeptic", "optimist"))
            .await
            .expect_err("second generation failure surfaces");

        match err {
            DebateError::TurnFailed {
                round,
                persona,
                cause: TurnFailure::Gateway(GatewayError::Generation(_)),
            } => {
                assert_eq!(round, 1);
                assert_eq!(persona, "skeptic");
            }
            other => panic!("Expected generation failure, got {:?}", other),
        }
        assert_eq!(gateway.calls(), 2);
        assert!(recorder.is_empty().await);
    }

    #[tokio::test]
    async fn test_authentication_is_not_retried() {
        let dir = tempfile::tempdir().expect("tempdir");
        let gateway = Arc::new(MockGateway::with_failures(vec![
            GatewayError::Authentication("bad key".into()),
        ]));
        let config = DebateOrchestratorConfig::new().with_retry_policy(fast_retries());
        let orch = orchestrator(gateway.clone(), recorder_in(&dir).await, config);

        let err = orch
            .run_debate("S", 1, ("skeptic", "optimist"))
            .await
            .expect_err("auth failure");
        assert!(err.is_fatal());
        assert_eq!(gateway.calls(), 1);
    }

    #[tokio::test]
    async fn test_persistence_failure_stops_debate() {
        let dir = tempfile::tempdir().expect("tempdir");
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "").expect("write");
        let recorder = Arc::new(
            ConversationRecorder::open(blocker.join("log.json"))
                .await
                .expect("open"),
        );
        let gateway = Arc::new(MockGateway::new());
        let orch = orchestrator(gateway.clone(), recorder.clone(), Default::default());

        let err = orch
            .run_debate("S", 3, ("skeptic", "optimist"))
            .await
            .expect_err("log cannot be written");

        assert!(matches!(
            err,
            DebateError::TurnFailed {
                round: 1,
                cause: TurnFailure::Recorder(RecorderError::Persistence { .. }),
                ..
            }
        ));
        assert_eq!(gateway.calls(), 1, "no further turns after a failed write");
        assert!(recorder.is_empty().await);
    }

    #[tokio::test]
    async fn test_partial_progress_survives_failure() {
        let dir = tempfile::tempdir().expect("tempdir");
        let recorder = recorder_in(&dir).await;

        struct FailSecond(AtomicUsize);

        #[async_trait]
        impl CompletionGateway for FailSecond {
            async fn generate(
                &self,
                persona: &Persona,
                _subject: &str,
                _history: &[TurnRecord],
            ) -> Result<Completion, GatewayError> {
                if self.0.fetch_add(1, Ordering::SeqCst) == 1 {
                    return Err(GatewayError::Authentication("revoked".into()));
                }
                Ok(Completion {
                    text: format!("{} speaks", persona.name),
                    token_count: 5,
                })
            }
        }

        let orch = DebateOrchestrator::builder()
            .gateway(Arc::new(FailSecond(AtomicUsize::new(0))))
            .recorder(recorder.clone())
            .build()
            .expect("builds");

        let err = orch
            .run_debate("S", 2, ("skeptic", "optimist"))
            .await
            .expect_err("second turn fails");
        assert!(err.to_string().contains("optimist"));

        let history = recorder.get_history("S").await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].agent_name, "skeptic");
    }

    #[tokio::test]
    async fn test_events_are_emitted_in_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        let orch = orchestrator(
            Arc::new(MockGateway::new()),
            recorder_in(&dir).await,
            Default::default(),
        );
        let (event_tx, mut event_rx) = mpsc::channel(100);

        orch.run_debate_with_events("S", 1, ("optimist", "skeptic"), event_tx)
            .await
            .expect("debate completes");

        let mut events = Vec::new();
        while let Some(event) = event_rx.recv().await {
            events.push(event);
        }

        assert!(matches!(events.first(), Some(DebateEvent::DebateStarted { planned_rounds: 1, .. })));
        assert!(matches!(events[1], DebateEvent::RoundStarted { round: 1, .. }));
        let recorded: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                DebateEvent::TurnRecorded { record, .. } => Some(record.agent_name.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(recorded, vec!["optimist", "skeptic"]);
        assert!(matches!(
            events.last(),
            Some(DebateEvent::DebateCompleted { turns: 2, .. })
        ));
    }

    #[test]
    fn test_builder_requires_gateway_and_recorder() {
        match DebateOrchestrator::builder().build() {
            Err(DebateError::Configuration(msg)) => assert!(msg.contains("gateway")),
            _ => panic!("Expected Configuration error"),
        }
    }
}
