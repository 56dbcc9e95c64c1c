//! Synchronous file scanning shared by the backends' discovery code.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use walkdir::WalkDir;

use crate::session::{LineFormat, NormalizedMessage, Role};

/// Longest first-message preview kept in session metadata.
pub const FIRST_MESSAGE_PREVIEW_CHARS: usize = 200;

/// Recursively collect non-empty `.jsonl` files under `dir` with their mtimes.
///
/// Unreadable directories and entries are skipped.
pub(crate) fn collect_jsonl_files(
    dir: &Path,
    keep: impl Fn(&Path) -> bool,
) -> Vec<(PathBuf, SystemTime)> {
    let mut found: Vec<(PathBuf, SystemTime)> = WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "jsonl"))
        .filter(|entry| keep(entry.path()))
        .filter_map(|entry| {
            let metadata = entry.metadata().ok()?;
            if metadata.len() == 0 {
                return None;
            }
            let modified = metadata.modified().ok()?;
            Some((entry.into_path(), modified))
        })
        .collect();

    found.sort_by(|a, b| b.1.cmp(&a.1));
    found
}

/// Iterate parsed messages of a file from the start, stopping when `visit` returns `true`.
fn visit_messages(
    path: &Path,
    format: &dyn LineFormat,
    mut visit: impl FnMut(NormalizedMessage) -> bool,
) {
    let Ok(file) = File::open(path) else {
        return;
    };
    for line in BufReader::new(file).split(b'\n').map_while(Result::ok) {
        let Ok(line) = std::str::from_utf8(&line) else {
            continue;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Ok(Some(message)) = format.parse_line(line) {
            if visit(message) {
                return;
            }
        }
    }
}

/// Every parsed message of a file, in order. Malformed lines are skipped.
#[must_use]
pub fn read_messages(path: &Path, format: &dyn LineFormat) -> Vec<NormalizedMessage> {
    let mut messages = Vec::new();
    visit_messages(path, format, |message| {
        messages.push(message);
        false
    });
    messages
}

/// Whether the file contains at least one user or assistant message.
#[must_use]
pub fn has_messages(path: &Path, format: &dyn LineFormat) -> bool {
    let mut found = false;
    visit_messages(path, format, |message| {
        found = matches!(message.role, Role::User | Role::Assistant);
        found
    });
    found
}

/// Text of the first user message with text content, truncated for previews.
#[must_use]
pub fn first_user_message(path: &Path, format: &dyn LineFormat) -> Option<String> {
    let mut first = None;
    visit_messages(path, format, |message| {
        if message.role != Role::User {
            return false;
        }
        let text = message.text();
        let text = text.trim();
        if text.is_empty() {
            return false;
        }
        first = Some(truncate_chars(text, FIRST_MESSAGE_PREVIEW_CHARS));
        true
    });
    first
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}
