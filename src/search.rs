//! Phrase search across session transcripts on disk.
//!
//! Candidates come from every backend's recent-session discovery, so the
//! search sees the same files the dashboard would track, tracked or not.
//! Each hit carries a window of surrounding messages for context.

use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use regex::{Regex, RegexBuilder};
use serde::Serialize;

use crate::backends::{read_messages, Backend, BackendSet};
use crate::export::{message_markdown, ExportOptions};
use crate::render::tool_result_text;
use crate::session::{ContentBlock, NormalizedMessage, Role};

/// Most session files considered per search.
pub const CANDIDATE_LIMIT: usize = 1000;

/// Search errors.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("Search phrase is empty")]
    EmptyQuery,

    #[error("Invalid search phrase: {0}")]
    Pattern(#[from] regex::Error),
}

/// Search switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchOptions {
    /// Most sessions returned.
    pub limit: usize,
    pub include_subagents: bool,
    pub case_sensitive: bool,
    /// Ignore tool calls and tool output when matching and in context.
    pub hide_tools: bool,
    pub context_before: usize,
    pub context_after: usize,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            limit: 10,
            include_subagents: false,
            case_sensitive: false,
            hide_tools: true,
            context_before: 5,
            context_after: 5,
        }
    }
}

/// A message shown around a hit.
#[derive(Debug, Clone, Serialize)]
pub struct ContextMessage {
    /// Position of the message in the session.
    pub index: usize,
    pub is_match: bool,
    pub message: NormalizedMessage,
}

/// One session containing the phrase.
#[derive(Debug, Clone, Serialize)]
pub struct SessionMatch {
    pub session_id: String,
    pub backend: String,
    pub path: PathBuf,
    pub project_name: String,
    pub modified_at: Option<DateTime<Utc>>,
    pub last_message_at: Option<DateTime<Utc>>,
    /// Occurrences of the phrase across the session.
    pub match_count: usize,
    pub context: Vec<ContextMessage>,
}

/// Sessions matching a phrase, most recent message first.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResults {
    pub query: String,
    pub sessions: Vec<SessionMatch>,
    /// Matching sessions before the limit was applied.
    pub total: usize,
}

/// Literal matcher for `phrase`.
///
/// # Errors
///
/// Returns an error for a blank phrase.
pub fn build_matcher(phrase: &str, case_sensitive: bool) -> Result<Regex, SearchError> {
    let phrase = phrase.trim();
    if phrase.is_empty() {
        return Err(SearchError::EmptyQuery);
    }
    Ok(RegexBuilder::new(&regex::escape(phrase))
        .case_insensitive(!case_sensitive)
        .build()?)
}

/// Search every backend's sessions for `phrase`.
///
/// Blocking: reads each candidate file in full.
///
/// # Errors
///
/// Returns an error for a blank phrase.
pub fn search_sessions(
    backends: &BackendSet,
    phrase: &str,
    options: &SearchOptions,
) -> Result<SearchResults, SearchError> {
    let matcher = build_matcher(phrase, options.case_sensitive)?;
    let candidates = backends.find_recent_sessions(CANDIDATE_LIMIT, options.include_subagents);

    let mut sessions: Vec<SessionMatch> = candidates
        .iter()
        .filter_map(|path| {
            let backend = backends.for_path(path)?;
            search_session(backend.as_ref(), path, &matcher, options)
        })
        .collect();
    sessions.sort_by(|a, b| b.last_message_at.cmp(&a.last_message_at));

    let total = sessions.len();
    sessions.truncate(options.limit);
    tracing::debug!(
        phrase,
        candidates = candidates.len(),
        total,
        "Search complete"
    );
    Ok(SearchResults {
        query: phrase.trim().to_string(),
        sessions,
        total,
    })
}

/// Search one session file. `None` when nothing matches.
#[must_use]
pub fn search_session(
    backend: &dyn Backend,
    path: &Path,
    matcher: &Regex,
    options: &SearchOptions,
) -> Option<SessionMatch> {
    let messages = read_messages(path, backend.line_format().as_ref());

    let mut hits = Vec::new();
    let mut match_count = 0;
    for (index, message) in messages.iter().enumerate() {
        if options.hide_tools && is_tool_traffic(message) {
            continue;
        }
        let found = matcher.find_iter(&searchable_text(message, options.hide_tools)).count();
        if found > 0 {
            hits.push(index);
            match_count += found;
        }
    }
    if hits.is_empty() {
        return None;
    }

    let context = context_window(&messages, &hits, options);
    let last_message_at = messages
        .iter()
        .rev()
        .filter(|message| message.is_conversation())
        .find_map(NormalizedMessage::timestamp_utc);
    let modified_at = std::fs::metadata(path)
        .and_then(|metadata| metadata.modified())
        .ok()
        .map(DateTime::<Utc>::from);

    Some(SessionMatch {
        session_id: backend.session_id(path),
        backend: backend.name().to_string(),
        path: path.to_path_buf(),
        project_name: backend.metadata(path).project_name,
        modified_at,
        last_message_at,
        match_count,
        context,
    })
}

/// Tool output, or an assistant turn that only calls tools.
fn is_tool_traffic(message: &NormalizedMessage) -> bool {
    match message.role {
        Role::Tool => true,
        Role::Assistant => {
            !message.blocks.is_empty()
                && message
                    .blocks
                    .iter()
                    .all(|block| matches!(block, ContentBlock::ToolUse { .. }))
        }
        Role::User => message
            .blocks
            .first()
            .is_some_and(|block| matches!(block, ContentBlock::ToolResult { .. })),
        Role::System => false,
    }
}

fn searchable_text(message: &NormalizedMessage, hide_tools: bool) -> String {
    let mut text = String::new();
    for block in &message.blocks {
        match block {
            ContentBlock::Text { text: body } | ContentBlock::Thinking { text: body } => {
                text.push_str(body);
            }
            ContentBlock::ToolUse {
                tool_name,
                tool_input,
                ..
            } if !hide_tools => {
                let _ = write!(text, "{tool_name} {tool_input}");
            }
            ContentBlock::ToolResult { content, .. } if !hide_tools => {
                text.push_str(&tool_result_text(content));
            }
            _ => continue,
        }
        text.push('\n');
    }
    text
}

/// Hits plus their neighbours, overlapping windows merged, in session order.
fn context_window(
    messages: &[NormalizedMessage],
    hits: &[usize],
    options: &SearchOptions,
) -> Vec<ContextMessage> {
    let shown: Vec<usize> = (0..messages.len())
        .filter(|&i| !(options.hide_tools && is_tool_traffic(&messages[i])))
        .collect();

    let mut included = BTreeSet::new();
    for hit in hits {
        let Ok(pos) = shown.binary_search(hit) else {
            continue;
        };
        let start = pos.saturating_sub(options.context_before);
        let end = (pos + options.context_after + 1).min(shown.len());
        included.extend(start..end);
    }

    included
        .into_iter()
        .map(|pos| {
            let index = shown[pos];
            ContextMessage {
                index,
                is_match: hits.binary_search(&index).is_ok(),
                message: messages[index].clone(),
            }
        })
        .collect()
}

fn format_time(time: Option<DateTime<Utc>>) -> String {
    time.map_or_else(
        || "unknown".to_string(),
        |t| t.format("%Y-%m-%d %H:%M:%S").to_string(),
    )
}

/// Plain-text report of search results, one markdown section per session.
#[must_use]
pub fn format_results(results: &SearchResults, options: &SearchOptions) -> String {
    if results.sessions.is_empty() {
        return format!("No sessions found matching '{}'\n", results.query);
    }

    let export = ExportOptions {
        hide_tools: options.hide_tools,
    };
    let mut out = String::new();
    for session in &results.sessions {
        let _ = write!(
            out,
            "## {}\n\nbackend: {}\nsession: {}\nproject: {}\nupdated_at: {}\nlast_msg_at: {}\nmatches: {}\n\n",
            session.path.display(),
            session.backend,
            session.session_id,
            session.project_name,
            format_time(session.modified_at),
            format_time(session.last_message_at),
            session.match_count,
        );
        for shown in &session.context {
            let Some(md) = message_markdown(&shown.message, export) else {
                continue;
            };
            if shown.is_match {
                out.push_str(">>> **[MATCH]**\n");
            }
            out.push_str(&md);
            out.push_str("\n\n");
        }
        let _ = write!(out, "\n{}\n\n", "=".repeat(80));
    }

    if results.total > results.sessions.len() {
        let _ = writeln!(
            out,
            "**Note:** {} more session(s) match this search. Use `--limit {}` to see all results.",
            results.total - results.sessions.len(),
            results.total
        );
    } else {
        let _ = writeln!(out, "**Total:** {} session(s) found.", results.total);
    }
    out
}
