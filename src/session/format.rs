//! Per-backend line format strategy.

use std::fmt::Debug;

use serde::Deserialize;

use super::message::{ContentBlock, NormalizedMessage, Role};

/// One accepted transcript entry, tagged with its position in the session.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    /// Zero-based ordering key, strictly increasing per tailer.
    pub index: u64,
    pub message: NormalizedMessage,
}

/// Parses one line of a line-delimited transcript.
///
/// Implementations are stateless; all per-file state lives in the
/// [`Tailer`](super::Tailer) that drives them.
pub trait LineFormat: Send + Sync + Debug {
    /// Short backend-facing name, e.g. `claude_code`.
    fn name(&self) -> &'static str;

    /// Parse a single trimmed, non-empty line.
    ///
    /// Returns `Ok(None)` for records that are valid but not surfaced
    /// (bookkeeping, placeholders).
    ///
    /// # Errors
    ///
    /// Returns an error if the line is not valid JSON for this format.
    fn parse_line(&self, line: &str) -> Result<Option<NormalizedMessage>, serde_json::Error>;

    /// Whether `message` leaves the agent blocked on the user.
    fn is_waiting_for_input(&self, message: &NormalizedMessage) -> bool {
        assistant_finished_turn(message)
    }
}

/// Default waiting heuristic shared by the JSONL backends.
///
/// An explicit `end_turn` stop reason means waiting and `tool_use` means
/// still working. Without a stop reason, an assistant message ending in
/// text is treated as a finished turn.
#[must_use]
pub fn assistant_finished_turn(message: &NormalizedMessage) -> bool {
    if message.role != Role::Assistant {
        return false;
    }
    match message.stop_reason.as_deref() {
        Some("end_turn" | "stop_sequence") => true,
        Some("tool_use") => false,
        _ => message.last_block().is_some_and(ContentBlock::is_text),
    }
}

/// Minimal `{"role": ..., "text": ...}` records.
///
/// Used for hand-written transcripts and fixtures.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimpleFormat;

#[derive(Debug, Deserialize)]
struct SimpleRecord {
    role: String,
    #[serde(default)]
    text: String,
    #[serde(default)]
    timestamp: String,
    #[serde(default)]
    model: Option<String>,
}

impl LineFormat for SimpleFormat {
    fn name(&self) -> &'static str {
        "simple"
    }

    fn parse_line(&self, line: &str) -> Result<Option<NormalizedMessage>, serde_json::Error> {
        let record: SimpleRecord = serde_json::from_str(line)?;
        let Some(role) = Role::parse(&record.role) else {
            return Ok(None);
        };
        let mut message =
            NormalizedMessage::new(role, record.timestamp, vec![ContentBlock::text(record.text)]);
        message.model = record.model.filter(|_| role == Role::Assistant);
        Ok(Some(message))
    }
}
