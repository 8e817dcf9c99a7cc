//! Conversation log: append-only JSON storage for debate turns.
//!
//! The whole log is rewritten on every append. The new contents go to a
//! sibling temp file which is synced and then renamed over the log, so the
//! file on disk is always a complete, parseable snapshot. A record becomes
//! visible in memory only after its write succeeded.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::error::RecorderError;

/// Default log file name, relative to the working directory.
pub const DEFAULT_LOG_FILE: &str = "agent_conversations.json";

// ============================================================================
// Records
// ============================================================================

/// One completed agent turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnRecord {
    /// The topic under debate.
    pub subject: String,
    /// When the turn was recorded. Written as RFC 3339; offset-less ISO 8601
    /// timestamps from older logs are read as UTC.
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub timestamp: DateTime<Utc>,
    /// Name of the persona that produced the turn.
    pub agent_name: String,
    /// Generated text.
    pub response: String,
    /// Provider-reported completion tokens.
    pub response_tokens: u32,
}

impl TurnRecord {
    /// Creates a record stamped with the current time.
    pub fn now(
        subject: impl Into<String>,
        agent_name: impl Into<String>,
        response: impl Into<String>,
        response_tokens: u32,
    ) -> Self {
        Self {
            subject: subject.into(),
            timestamp: Utc::now(),
            agent_name: agent_name.into(),
            response: response.into(),
            response_tokens,
        }
    }

    /// Renders the turn the way prompts quote prior turns.
    pub fn transcript_line(&self) -> String {
        format!("{}: {}", self.agent_name, self.response)
    }
}

/// Aggregate view of all turns recorded for one subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectSummary {
    pub subject: String,
    pub turn_count: usize,
    pub total_tokens: u64,
    pub participants: BTreeSet<String>,
    /// Number of turns per agent.
    pub turns_by_agent: BTreeMap<String, usize>,
    /// Timestamp of the most recent turn, if any.
    pub latest_turn: Option<DateTime<Utc>>,
}

impl SubjectSummary {
    /// Aggregates a subject's history.
    pub fn from_history(subject: impl Into<String>, history: &[TurnRecord]) -> Self {
        let mut turns_by_agent: BTreeMap<String, usize> = BTreeMap::new();
        for record in history {
            *turns_by_agent.entry(record.agent_name.clone()).or_default() += 1;
        }

        Self {
            subject: subject.into(),
            turn_count: history.len(),
            total_tokens: history.iter().map(|r| u64::from(r.response_tokens)).sum(),
            participants: turns_by_agent.keys().cloned().collect(),
            turns_by_agent,
            latest_turn: history.iter().map(|r| r.timestamp).max(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.turn_count == 0
    }
}

// ============================================================================
// Recorder
// ============================================================================

/// JSON-file-backed, append-only log of turn records.
///
/// Cheap to share behind an `Arc`; writes are serialized by an internal
/// mutex so concurrent debates never interleave partial snapshots.
#[derive(Debug)]
pub struct ConversationRecorder {
    path: PathBuf,
    records: Mutex<Vec<TurnRecord>>,
}

impl ConversationRecorder {
    /// Opens the log at `path`, hydrating any existing records.
    ///
    /// A missing file yields an empty log. A file that exists but cannot be
    /// read or parsed is reported as `CorruptLog` and left untouched.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, RecorderError> {
        let path = path.into();
        let records = load_records(&path).await?;

        tracing::debug!(
            path = %path.display(),
            records = records.len(),
            "Opened conversation log"
        );

        Ok(Self {
            path,
            records: Mutex::new(records),
        })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends a record and persists the full log.
    ///
    /// On error the in-memory log is unchanged.
    pub async fn record(&self, turn: TurnRecord) -> Result<(), RecorderError> {
        let mut records = self.records.lock().await;

        let mut next = Vec::with_capacity(records.len() + 1);
        next.extend(records.iter().cloned());
        next.push(turn);

        write_records(&self.path, &next).await?;
        *records = next;

        tracing::debug!(
            path = %self.path.display(),
            records = records.len(),
            "Persisted conversation log"
        );
        Ok(())
    }

    /// All records for `subject`, oldest first.
    pub async fn get_history(&self, subject: &str) -> Vec<TurnRecord> {
        self.records
            .lock()
            .await
            .iter()
            .filter(|r| r.subject == subject)
            .cloned()
            .collect()
    }

    /// Turn count, token total and participants for `subject`.
    pub async fn summarize(&self, subject: &str) -> SubjectSummary {
        let history = self.get_history(subject).await;
        SubjectSummary::from_history(subject, &history)
    }

    /// A copy of the whole log.
    pub async fn records(&self) -> Vec<TurnRecord> {
        self.records.lock().await.clone()
    }

    /// Distinct subjects in the order they first appear.
    pub async fn subjects(&self) -> Vec<String> {
        let records = self.records.lock().await;
        let mut seen = BTreeSet::new();
        records
            .iter()
            .filter(|r| seen.insert(r.subject.as_str()))
            .map(|r| r.subject.clone())
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw).map_err(serde::de::Error::custom)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    raw.parse::<NaiveDateTime>()
        .map(|naive| naive.and_utc())
        .map_err(|e| format!("invalid timestamp '{}': {}", raw, e))
}

async fn load_records(path: &Path) -> Result<Vec<TurnRecord>, RecorderError> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let corrupt = |reason: String| RecorderError::CorruptLog {
        path: path.to_path_buf(),
        reason,
    };

    let contents = fs::read_to_string(path)
        .await
        .map_err(|e| corrupt(format!("unreadable: {}", e)))?;

    serde_json::from_str(&contents).map_err(|e| corrupt(e.to_string()))
}

async fn write_records(path: &Path, records: &[TurnRecord]) -> Result<(), RecorderError> {
    let persistence = |reason: String| RecorderError::Persistence {
        path: path.to_path_buf(),
        reason,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| persistence(format!("failed to create {}: {}", parent.display(), e)))?;
    }

    let json = serde_json::to_string_pretty(records)
        .map_err(|e| persistence(format!("serialization failed: {}", e)))?;

    let tmp_path = temp_path(path);
    let write_result = async {
        let mut file = fs::File::create(&tmp_path).await?;
        file.write_all(json.as_bytes()).await?;
        file.sync_all().await?;
        fs::rename(&tmp_path, path).await
    }
    .await;

    if let Err(e) = write_result {
        let _ = fs::remove_file(&tmp_path).await;
        return Err(persistence(e.to_string()));
    }
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
