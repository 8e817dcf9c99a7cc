//! CLI command definitions for debate-forge.
//!
//! `debate` runs one or more debates and prints the transcript as it is
//! produced; `summary`, `history` and `subjects` read the conversation log;
//! `personas` lists the configured personas.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::debate::recorder::DEFAULT_LOG_FILE;
use crate::debate::transcript::{self, PREVIEW_CHARS};
use crate::debate::{
    ConversationRecorder, DebateEvent, DebateOrchestrator, HistoryScope, LlmGateway, Persona,
    PersonaRegistry, RetryPolicy, SubjectSummary, TurnRecord, SAMPLE_SUBJECTS,
};
use crate::error::LlmError;
use crate::llm::{ChatCompletionsClient, DEFAULT_API_BASE, DEFAULT_MODEL};

/// Default number of rounds per debate.
const DEFAULT_ROUNDS: u32 = 3;

/// Default persona pair, in speaking order.
const DEFAULT_PERSONAS: &str = "skeptic,optimist";

/// Persona debate runner with a JSON conversation log.
#[derive(Parser)]
#[command(name = "debate-forge")]
#[command(about = "Run scripted persona debates through an LLM and log every turn")]
#[command(version)]
#[command(
    long_about = "debate-forge makes two personas argue a subject through an OpenAI-compatible chat API.\n\nEvery turn is appended to a JSON conversation log that can be summarized later.\n\nExample usage:\n  debate-forge debate \"Remote work is better than office work\" --rounds 3\n  debate-forge summary \"Remote work is better than office work\""
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,

    /// Conversation log file.
    #[arg(long, env = "DEBATE_LOG_FILE", default_value = DEFAULT_LOG_FILE, global = true)]
    pub log_file: PathBuf,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Run debates on one or more subjects.
    #[command(alias = "run")]
    Debate(DebateArgs),

    /// Summarize all recorded turns for a subject.
    Summary(SummaryArgs),

    /// Print recorded turns for a subject.
    History(HistoryArgs),

    /// List every subject in the conversation log.
    Subjects(SubjectsArgs),

    /// List configured personas.
    Personas(PersonasArgs),
}

/// Arguments for `debate-forge debate`.
#[derive(Parser, Debug)]
pub struct DebateArgs {
    /// Subjects to debate, run one after another.
    #[arg(required_unless_present = "sample_subjects")]
    pub subjects: Vec<String>,

    /// Debate the built-in sample subjects.
    #[arg(long)]
    pub sample_subjects: bool,

    /// Rounds per debate. Each round is one turn per persona.
    #[arg(short = 'r', long, default_value_t = DEFAULT_ROUNDS)]
    pub rounds: u32,

    /// The two personas, comma-separated, in speaking order.
    #[arg(short = 'p', long, value_delimiter = ',', default_value = DEFAULT_PERSONAS)]
    pub personas: Vec<String>,

    /// YAML file with persona definitions (replaces the built-in pair).
    #[arg(long)]
    pub personas_file: Option<PathBuf>,

    /// Model to request.
    #[arg(short = 'm', long, env = "DEBATE_MODEL", default_value = DEFAULT_MODEL)]
    pub model: String,

    /// Base URL of the OpenAI-compatible API.
    #[arg(long, env = "DEBATE_API_BASE", default_value = DEFAULT_API_BASE)]
    pub api_base: String,

    /// API key (can also be set via OPENAI_API_KEY env var).
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Sampling temperature.
    #[arg(long, default_value_t = crate::debate::gateway::DEFAULT_TEMPERATURE)]
    pub temperature: f64,

    /// Per-call timeout in seconds.
    #[arg(long, default_value_t = 60)]
    pub timeout_secs: u64,

    /// Which earlier turns each persona sees.
    #[arg(long, value_enum, default_value_t = HistoryScope::Subject)]
    pub history_scope: HistoryScope,

    /// Only pass the most recent N turns to each persona.
    #[arg(long)]
    pub history_window: Option<usize>,

    /// Base delay for retry backoff, in milliseconds.
    #[arg(long, default_value_t = 1000)]
    pub retry_delay_ms: u64,

    /// Output JSON instead of the live transcript.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Arguments for `debate-forge summary`.
#[derive(Parser, Debug)]
pub struct SummaryArgs {
    /// Subject to summarize.
    pub subject: String,

    /// Output JSON.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Arguments for `debate-forge history`.
#[derive(Parser, Debug)]
pub struct HistoryArgs {
    /// Subject to list.
    pub subject: String,

    /// Print full responses instead of previews.
    #[arg(long)]
    pub full: bool,

    /// Output JSON.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Arguments for `debate-forge subjects`.
#[derive(Parser, Debug)]
pub struct SubjectsArgs {
    /// Output JSON.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Arguments for `debate-forge personas`.
#[derive(Parser, Debug)]
pub struct PersonasArgs {
    /// YAML file with persona definitions.
    #[arg(long)]
    pub personas_file: Option<PathBuf>,

    /// Output JSON.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Parse CLI arguments and return the Cli struct.
///
/// This allows main.rs to access CLI arguments (like log_level) before running commands.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI by parsing arguments and executing the command.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Debate(args) => run_debate_command(args, &cli.log_file).await,
        Commands::Summary(args) => run_summary_command(args, &cli.log_file).await,
        Commands::History(args) => run_history_command(args, &cli.log_file).await,
        Commands::Subjects(args) => run_subjects_command(args, &cli.log_file).await,
        Commands::Personas(args) => run_personas_command(args),
    }
}

// ============================================================================
// Debate Command
// ============================================================================

/// JSON output for one debated subject.
#[derive(Debug, Serialize)]
struct DebateOutput {
    subject: String,
    turns: Vec<TurnRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<SubjectSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

async fn run_debate_command(args: DebateArgs, log_file: &Path) -> anyhow::Result<()> {
    let registry = Arc::new(load_registry(args.personas_file.as_deref())?);
    let (first, second) = parse_persona_pair(&args.personas)?;
    let pair = (first.as_str(), second.as_str());
    for id in [pair.0, pair.1] {
        registry
            .get_persona(id)
            .with_context(|| format!("available personas: {}", registry.ids().join(", ")))?;
    }

    let subjects = resolve_subjects(&args);

    let api_key = args.api_key.clone().ok_or(LlmError::MissingApiKey)?;
    let client = ChatCompletionsClient::new(&args.api_base, api_key, &args.model)?;
    info!(
        api_base = %client.api_base(),
        model = %client.default_model(),
        api_key = %client.api_key_masked(),
        "Using chat completions endpoint"
    );

    let recorder = Arc::new(
        ConversationRecorder::open(log_file)
            .await
            .context("Refusing to start with an unreadable conversation log")?,
    );

    let gateway = LlmGateway::new(Arc::new(client))
        .with_model(&args.model)
        .with_temperature(args.temperature)
        .with_timeout(Duration::from_secs(args.timeout_secs));

    let orchestrator = DebateOrchestrator::builder()
        .registry(registry)
        .gateway(Arc::new(gateway))
        .recorder(recorder.clone())
        .history_scope(args.history_scope)
        .history_window(args.history_window)
        .retry_policy(
            RetryPolicy::default().with_base_delay(Duration::from_millis(args.retry_delay_ms)),
        )
        .build()?;

    let mut outputs = Vec::with_capacity(subjects.len());
    let mut failures = 0usize;

    for subject in &subjects {
        if !args.json {
            println!("\n{}", transcript::debate_banner(subject));
        }

        let logged_before = recorder.len().await;
        let result = if args.json {
            orchestrator
                .run_debate(subject, args.rounds, pair)
                .await
        } else {
            let (event_tx, event_rx) = mpsc::channel(64);
            let printer = tokio::spawn(print_events(event_rx));
            let result = orchestrator
                .run_debate_with_events(subject, args.rounds, pair, event_tx)
                .await;
            let _ = printer.await;
            result
        };

        match result {
            Ok(turns) => {
                let summary = recorder.summarize(subject).await;
                if !args.json {
                    println!("\n{}", transcript::render_summary(&summary));
                }
                outputs.push(DebateOutput {
                    subject: subject.clone(),
                    turns,
                    summary: Some(summary),
                    error: None,
                });
            }
            Err(err) => {
                failures += 1;
                error!(subject = %subject, error = %err, "Debate failed");
                if !args.json {
                    eprintln!("Error in debate '{}': {}", subject, err);
                }
                let fatal = err.is_fatal();
                outputs.push(DebateOutput {
                    subject: subject.clone(),
                    turns: turns_recorded_since(&recorder, logged_before, subject).await,
                    summary: None,
                    error: Some(err.to_string()),
                });
                if fatal {
                    warn!("Aborting remaining debates after fatal error");
                    break;
                }
            }
        }
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&outputs)?);
    }

    if failures > 0 {
        anyhow::bail!("{} of {} debates failed", failures, subjects.len());
    }
    Ok(())
}

/// Turns on `subject` appended to the log after the first `offset` records.
async fn turns_recorded_since(
    recorder: &ConversationRecorder,
    offset: usize,
    subject: &str,
) -> Vec<TurnRecord> {
    recorder
        .records()
        .await
        .into_iter()
        .skip(offset)
        .filter(|r| r.subject == subject)
        .collect()
}

/// Prints transcript lines as turns are recorded.
async fn print_events(mut event_rx: mpsc::Receiver<DebateEvent>) {
    while let Some(event) = event_rx.recv().await {
        match event {
            DebateEvent::RoundStarted { round, .. } => {
                println!("{}", transcript::round_header(round));
            }
            DebateEvent::TurnRecorded { record, .. } => {
                println!("{}\n", transcript::render_turn(&record));
            }
            DebateEvent::RetryScheduled {
                persona,
                attempt,
                delay_ms,
                error,
                ..
            } => {
                eprintln!(
                    "Retrying {} (attempt {}) in {}ms: {}",
                    persona, attempt, delay_ms, error
                );
            }
            _ => {}
        }
    }
}

fn resolve_subjects(args: &DebateArgs) -> Vec<String> {
    let mut subjects = args.subjects.clone();
    if args.sample_subjects {
        subjects.extend(SAMPLE_SUBJECTS.iter().map(|s| s.to_string()));
    }
    subjects
}

fn parse_persona_pair(ids: &[String]) -> anyhow::Result<(String, String)> {
    match ids {
        [first, second] if !first.trim().is_empty() && !second.trim().is_empty() => {
            Ok((first.trim().to_string(), second.trim().to_string()))
        }
        _ => anyhow::bail!(
            "--personas needs exactly two persona names, got {:?}",
            ids
        ),
    }
}

fn load_registry(path: Option<&Path>) -> anyhow::Result<PersonaRegistry> {
    match path {
        Some(path) => PersonaRegistry::from_yaml_file(path)
            .with_context(|| format!("Failed to load personas from {}", path.display())),
        None => Ok(PersonaRegistry::builtin()),
    }
}

// ============================================================================
// Log Inspection Commands
// ============================================================================

async fn open_log(log_file: &Path) -> anyhow::Result<ConversationRecorder> {
    ConversationRecorder::open(log_file)
        .await
        .with_context(|| format!("Failed to open conversation log {}", log_file.display()))
}

async fn run_summary_command(args: SummaryArgs, log_file: &Path) -> anyhow::Result<()> {
    let recorder = open_log(log_file).await?;
    let summary = recorder.summarize(&args.subject).await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("{}", transcript::render_summary(&summary));
    }
    Ok(())
}

async fn run_history_command(args: HistoryArgs, log_file: &Path) -> anyhow::Result<()> {
    let recorder = open_log(log_file).await?;
    let history = recorder.get_history(&args.subject).await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&history)?);
        return Ok(());
    }

    println!("Subject: {}", args.subject);
    if history.is_empty() {
        println!("  (no recorded turns)");
    }
    let limit = (!args.full).then_some(PREVIEW_CHARS);
    for record in &history {
        println!("{}", transcript::render_history_line(record, limit));
    }
    Ok(())
}

async fn run_subjects_command(args: SubjectsArgs, log_file: &Path) -> anyhow::Result<()> {
    let recorder = open_log(log_file).await?;
    let subjects = recorder.subjects().await;

    if args.json {
        let mut summaries = Vec::with_capacity(subjects.len());
        for subject in &subjects {
            summaries.push(recorder.summarize(subject).await);
        }
        println!("{}", serde_json::to_string_pretty(&summaries)?);
        return Ok(());
    }

    if subjects.is_empty() {
        println!("No recorded conversations in {}", log_file.display());
    }
    for subject in &subjects {
        let summary = recorder.summarize(subject).await;
        println!(
            "{} ({} turns, {} tokens)",
            subject, summary.turn_count, summary.total_tokens
        );
    }
    Ok(())
}

fn run_personas_command(args: PersonasArgs) -> anyhow::Result<()> {
    let registry = load_registry(args.personas_file.as_deref())?;

    if args.json {
        let personas: Vec<&Persona> = registry.iter().collect();
        println!("{}", serde_json::to_string_pretty(&personas)?);
        return Ok(());
    }

    for persona in registry.iter() {
        println!(
            "{:<12} {} (max {} tokens)\n             {}",
            persona.name, persona.role, persona.max_tokens, persona.goal
        );
    }
    Ok(())
}
