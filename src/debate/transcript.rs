//! Plain-text rendering of debates, summaries and history listings.

use super::recorder::{SubjectSummary, TurnRecord};

/// Width of the `=` rules around debate banners.
const RULE_WIDTH: usize = 60;

/// Default preview length for history listings, in characters.
pub const PREVIEW_CHARS: usize = 100;

/// Banner printed before a debate starts.
pub fn debate_banner(subject: &str) -> String {
    let rule = "=".repeat(RULE_WIDTH);
    format!("{rule}\nSTARTING DEBATE: {subject}\n{rule}")
}

/// Header printed at the start of each round (1-based).
pub fn round_header(round: u32) -> String {
    format!("\n=== ROUND {} ===", round)
}

/// One turn as a block: speaker, text, token count.
pub fn render_turn(record: &TurnRecord) -> String {
    format!(
        "{}:\n{}\nTokens: {}",
        record.agent_name, record.response, record.response_tokens
    )
}

/// Multi-line summary block for one subject.
pub fn render_summary(summary: &SubjectSummary) -> String {
    let mut lines = vec![
        "--- DEBATE SUMMARY ---".to_string(),
        format!("Subject: {}", summary.subject),
        format!("Total exchanges: {}", summary.turn_count),
        format!("Total tokens used: {}", summary.total_tokens),
    ];

    if summary.is_empty() {
        lines.push("No conversations found for this subject".to_string());
        return lines.join("\n");
    }

    let participants: Vec<&str> = summary.participants.iter().map(String::as_str).collect();
    lines.push(format!("Participants: {}", participants.join(", ")));
    for (agent, count) in &summary.turns_by_agent {
        lines.push(format!("  {}: {} responses", agent, count));
    }
    if let Some(latest) = summary.latest_turn {
        lines.push(format!("Latest turn: {}", latest.to_rfc3339()));
    }
    lines.join("\n")
}

/// One history line: `agent (N tokens): text`, optionally truncated.
pub fn render_history_line(record: &TurnRecord, max_chars: Option<usize>) -> String {
    let text = match max_chars {
        Some(limit) => preview(&record.response, limit),
        None => record.response.clone(),
    };
    format!(
        "  {} ({} tokens): {}",
        record.agent_name, record.response_tokens, text
    )
}

/// Truncates `text` to `max_chars` characters, appending `...` when cut.
pub fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}...", &text[..byte_idx]),
        None => text.to_string(),
    }
}
