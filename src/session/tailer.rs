//! Incremental transcript tailer.
//!
//! Reads bytes appended to a session file since the last call, keeps any
//! unterminated trailing line for the next read, and hands complete lines
//! to a [`LineFormat`].

use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use super::format::{Entry, LineFormat};
use super::message::NormalizedMessage;

/// Largest slice of a session file read in one step.
pub const READ_CHUNK: usize = 64 * 1024;

/// Stateful reader over one append-only session file.
///
/// Not safe for concurrent use; callers serialize access (the registry
/// keeps each tailer behind its own mutex).
#[derive(Debug)]
pub struct Tailer {
    path: PathBuf,
    format: Arc<dyn LineFormat>,
    /// Bytes consumed so far. Only [`Tailer::reset`] moves it backwards.
    position: u64,
    /// Consumed bytes not yet terminated by `\n`.
    line_buffer: Vec<u8>,
    message_index: u64,
    waiting_for_input: bool,
    first_timestamp: Option<String>,
    /// Last message timestamp, cached against the file length it was computed for.
    last_message: Option<(u64, Option<DateTime<Utc>>)>,
}

impl Tailer {
    /// Create a tailer positioned at the start of the file.
    #[must_use]
    pub fn new(path: PathBuf, format: Arc<dyn LineFormat>) -> Self {
        Self {
            path,
            format,
            position: 0,
            line_buffer: Vec::new(),
            message_index: 0,
            waiting_for_input: false,
            first_timestamp: None,
            last_message: None,
        }
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Format used to parse lines.
    #[must_use]
    pub fn format(&self) -> &Arc<dyn LineFormat> {
        &self.format
    }

    /// Byte offset already consumed.
    #[must_use]
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Number of buffered bytes belonging to an unterminated line.
    #[must_use]
    pub fn buffered_len(&self) -> usize {
        self.line_buffer.len()
    }

    /// Number of entries produced so far.
    #[must_use]
    pub fn message_index(&self) -> u64 {
        self.message_index
    }

    /// Waiting state derived from the latest entry.
    #[must_use]
    pub fn waiting_for_input(&self) -> bool {
        self.waiting_for_input
    }

    /// Read and parse everything appended since the previous call.
    ///
    /// The file is consumed in [`READ_CHUNK`] pieces, so only the entries and
    /// one unterminated line are held in memory. Never fails: a missing or
    /// unreadable file yields no entries, and malformed lines are logged and
    /// dropped.
    pub async fn read_new_lines(&mut self) -> Vec<Entry> {
        let (mut file, mut pending) = match self.open_appended().await {
            Ok(Some(opened)) => opened,
            Ok(None) => return Vec::new(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path = %self.path.display(), "Session file not found");
                return Vec::new();
            }
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Failed to read session file");
                return Vec::new();
            }
        };

        let mut entries = Vec::new();
        let chunk_len =
            |left: u64| usize::try_from(left).map_or(READ_CHUNK, |left| left.min(READ_CHUNK));
        let mut chunk = vec![0u8; chunk_len(pending)];
        while pending > 0 {
            let want = chunk_len(pending);
            let read = match file.read(&mut chunk[..want]).await {
                Ok(0) => break,
                Ok(read) => read,
                Err(e) => {
                    tracing::warn!(path = %self.path.display(), error = %e, "Read interrupted");
                    break;
                }
            };
            pending -= read as u64;
            self.position += read as u64;
            self.line_buffer.extend_from_slice(&chunk[..read]);
            self.parse_complete_lines(&mut entries);
        }
        entries
    }

    /// Parse every newline-terminated line in the buffer, keeping the remainder.
    fn parse_complete_lines(&mut self, entries: &mut Vec<Entry>) {
        let Some(last_newline) = self.line_buffer.iter().rposition(|&b| b == b'\n') else {
            return;
        };
        let remainder = self.line_buffer.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.line_buffer, remainder);

        for raw in complete.split(|&b| b == b'\n') {
            let Some(message) = self.parse_raw(raw) else {
                continue;
            };
            self.waiting_for_input = self.format.is_waiting_for_input(&message);
            entries.push(Entry {
                index: self.message_index,
                message,
            });
            self.message_index += 1;
        }
    }

    /// Jump to the current end of file without parsing existing content.
    pub async fn seek_to_end(&mut self) {
        self.line_buffer.clear();
        self.position = match tokio::fs::metadata(&self.path).await {
            Ok(metadata) => metadata.len(),
            Err(e) => {
                tracing::debug!(path = %self.path.display(), error = %e, "Cannot stat file, seeking to start");
                0
            }
        };
    }

    /// Read the whole file with an independent tailer.
    ///
    /// This tailer's position and buffer are untouched, but its waiting
    /// state is replaced with the freshly computed one.
    pub async fn read_all(&mut self) -> Vec<Entry> {
        let mut fresh = Self::new(self.path.clone(), Arc::clone(&self.format));
        let entries = fresh.read_new_lines().await;
        self.waiting_for_input = fresh.waiting_for_input;
        entries
    }

    /// Timestamp of the first message carrying one. Cached once found.
    pub async fn get_first_timestamp(&mut self) -> Option<String> {
        if self.first_timestamp.is_none() {
            self.first_timestamp = self
                .scan_messages()
                .await
                .into_iter()
                .find(|message| !message.timestamp.is_empty())
                .map(|message| message.timestamp);
        }
        self.first_timestamp.clone()
    }

    /// Timestamp of the last conversation message, `None` if there is none yet.
    pub async fn get_last_message_timestamp(&mut self) -> Option<DateTime<Utc>> {
        let len = tokio::fs::metadata(&self.path).await.ok()?.len();
        if let Some((cached_len, cached)) = self.last_message {
            if cached_len == len {
                return cached;
            }
        }

        let latest = self
            .scan_messages()
            .await
            .iter()
            .rev()
            .filter(|message| message.is_conversation())
            .find_map(NormalizedMessage::timestamp_utc);
        self.last_message = Some((len, latest));
        latest
    }

    /// Whether the file holds bytes past the consumed position.
    pub async fn has_unread_bytes(&self) -> bool {
        tokio::fs::metadata(&self.path)
            .await
            .is_ok_and(|metadata| metadata.len() > self.position)
    }

    /// Forget all progress so the next read starts from offset 0.
    pub fn reset(&mut self) {
        self.position = 0;
        self.line_buffer.clear();
        self.message_index = 0;
        self.waiting_for_input = false;
        self.first_timestamp = None;
        self.last_message = None;
    }

    /// Open the file at the consumed offset. `None` when nothing was appended.
    async fn open_appended(&self) -> std::io::Result<Option<(File, u64)>> {
        let mut file = File::open(&self.path).await?;
        let len = file.metadata().await?.len();

        if len < self.position {
            tracing::debug!(
                path = %self.path.display(),
                position = self.position,
                len,
                "File shorter than consumed offset, treating as no new content"
            );
            return Ok(None);
        }
        if len == self.position {
            return Ok(None);
        }

        file.seek(SeekFrom::Start(self.position)).await?;
        Ok(Some((file, len - self.position)))
    }

    /// Parse every complete line from offset 0 without touching tailer state.
    async fn scan_messages(&self) -> Vec<NormalizedMessage> {
        let Ok(content) = tokio::fs::read(&self.path).await else {
            return Vec::new();
        };
        let complete = match content.iter().rposition(|&b| b == b'\n') {
            Some(last_newline) => &content[..=last_newline],
            None => return Vec::new(),
        };
        complete
            .split(|&b| b == b'\n')
            .filter_map(|raw| self.parse_raw(raw))
            .collect()
    }

    fn parse_raw(&self, raw: &[u8]) -> Option<NormalizedMessage> {
        let Ok(line) = std::str::from_utf8(raw) else {
            tracing::warn!(path = %self.path.display(), bytes = raw.len(), "Dropping non-UTF-8 line");
            return None;
        };
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        match self.format.parse_line(line) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    format = self.format.name(),
                    error = %e,
                    "Skipping malformed line"
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{Role, SimpleFormat};
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn tailer_for(file: &NamedTempFile) -> Tailer {
        Tailer::new(file.path().to_path_buf(), Arc::new(SimpleFormat))
    }

    fn line(role: &str, text: &str) -> String {
        format!(r#"{{"role":"{role}","text":"{text}","timestamp":"2026-01-29T10:00:00Z"}}"#)
    }

    #[tokio::test]
    async fn test_empty_file_yields_nothing() {
        let file = NamedTempFile::new().unwrap();
        let mut tailer = tailer_for(&file);

        assert!(tailer.read_new_lines().await.is_empty());
        assert!(!tailer.waiting_for_input());
        assert_eq!(tailer.position(), 0);
    }

    #[tokio::test]
    async fn test_second_read_without_growth_is_empty() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "{}", line("user", "one")).unwrap();
        writeln!(file, "{}", line("assistant", "two")).unwrap();
        file.flush().unwrap();

        let mut tailer = tailer_for(&file);
        let first = tailer.read_new_lines().await;
        assert_eq!(first.len(), 2);
        let position = tailer.position();

        let second = tailer.read_new_lines().await;
        assert!(second.is_empty());
        assert_eq!(tailer.position(), position);
        assert_eq!(tailer.buffered_len(), 0);
    }

    #[tokio::test]
    async fn test_partial_line_is_buffered_until_terminated() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"role":"user","te"#).unwrap();
        file.flush().unwrap();

        let mut tailer = tailer_for(&file);
        assert!(tailer.read_new_lines().await.is_empty());
        assert!(tailer.buffered_len() > 0);

        writeln!(file, r#"xt":"hello"}}"#).unwrap();
        file.flush().unwrap();

        let entries = tailer.read_new_lines().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].message.text(), "hello");
        assert_eq!(tailer.buffered_len(), 0);
    }

    #[tokio::test]
    async fn test_multibyte_character_split_across_reads() {
        let mut file = NamedTempFile::new().unwrap();
        let full = line("user", "caf\u{e9} \u{1f600}");
        let bytes = full.as_bytes();
        let split_at = full.find('\u{1f600}').unwrap() + 2;
        file.write_all(&bytes[..split_at]).unwrap();
        file.flush().unwrap();

        let mut tailer = tailer_for(&file);
        assert!(tailer.read_new_lines().await.is_empty());

        file.write_all(&bytes[split_at..]).unwrap();
        file.write_all(b"\n").unwrap();
        file.flush().unwrap();

        let entries = tailer.read_new_lines().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].message.text(), "caf\u{e9} \u{1f600}");
    }

    #[tokio::test]
    async fn test_entries_keep_file_order() {
        let mut file = NamedTempFile::new().unwrap();
        let mut batch = String::new();
        for i in 0..5 {
            batch.push_str(&line("user", &format!("msg-{i}")));
            batch.push('\n');
        }
        file.write_all(batch.as_bytes()).unwrap();
        file.flush().unwrap();

        let mut tailer = tailer_for(&file);
        let entries = tailer.read_new_lines().await;

        assert_eq!(entries.len(), 5);
        for (i, entry) in entries.iter().enumerate() {
            assert_eq!(entry.message.text(), format!("msg-{i}"));
            assert_eq!(entry.index, i as u64);
        }
        assert!(entries.windows(2).all(|w| w[0].index < w[1].index));
        assert_eq!(tailer.message_index(), 5);
    }

    #[tokio::test]
    async fn test_skips_malformed_and_binary_lines() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "{}", line("user", "a")).unwrap();
        writeln!(file, "not valid json").unwrap();
        file.write_all(&[0xff, 0xfe, 0x00, 0x9f, b'\n']).unwrap();
        writeln!(file, "{{\"incomplete\": true").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "{}", line("assistant", "b")).unwrap();
        file.flush().unwrap();

        let mut tailer = tailer_for(&file);
        let entries = tailer.read_new_lines().await;

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].message.role, Role::User);
        assert_eq!(entries[1].message.role, Role::Assistant);
        assert_eq!(entries[1].index, 1);
    }

    #[tokio::test]
    async fn test_missing_file_returns_empty() {
        let dir = tempfile::tempdir().unwrap();
        let mut tailer = Tailer::new(dir.path().join("gone.jsonl"), Arc::new(SimpleFormat));

        assert!(tailer.read_new_lines().await.is_empty());
        assert_eq!(tailer.position(), 0);
    }

    #[tokio::test]
    async fn test_shrunk_file_is_no_new_content() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "{}", line("user", "a")).unwrap();
        writeln!(file, "{}", line("user", "b")).unwrap();
        file.flush().unwrap();

        let mut tailer = tailer_for(&file);
        assert_eq!(tailer.read_new_lines().await.len(), 2);
        let position = tailer.position();

        std::fs::write(file.path(), format!("{}\n", line("user", "new"))).unwrap();

        assert!(tailer.read_new_lines().await.is_empty());
        assert_eq!(tailer.position(), position);
    }

    #[tokio::test]
    async fn test_seek_to_end_skips_existing_content() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "{}", line("user", "old")).unwrap();
        write!(file, r#"{{"role":"user","#).unwrap();
        file.flush().unwrap();

        let mut tailer = tailer_for(&file);
        tailer.seek_to_end().await;
        assert_eq!(tailer.position(), file.as_file().metadata().unwrap().len());
        assert_eq!(tailer.buffered_len(), 0);

        // Rest of the partial line is dropped as malformed, the next line parses.
        writeln!(file, r#""text":"tail"}}"#).unwrap();
        writeln!(file, "{}", line("assistant", "fresh")).unwrap();
        file.flush().unwrap();

        let entries = tailer.read_new_lines().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].message.text(), "fresh");
    }

    #[tokio::test]
    async fn test_seek_to_end_on_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut tailer = Tailer::new(dir.path().join("gone.jsonl"), Arc::new(SimpleFormat));
        tailer.seek_to_end().await;
        assert_eq!(tailer.position(), 0);
    }

    #[tokio::test]
    async fn test_read_all_preserves_position_and_copies_waiting() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "{}", line("user", "question")).unwrap();
        file.flush().unwrap();

        let mut tailer = tailer_for(&file);
        assert_eq!(tailer.read_new_lines().await.len(), 1);
        assert!(!tailer.waiting_for_input());
        let position = tailer.position();

        writeln!(file, "{}", line("assistant", "answer")).unwrap();
        file.flush().unwrap();

        let all = tailer.read_all().await;
        assert_eq!(all.len(), 2);
        assert_eq!(tailer.position(), position);
        assert!(tailer.waiting_for_input());

        let resumed = tailer.read_new_lines().await;
        assert_eq!(resumed.len(), 1);
        assert_eq!(resumed[0].message.text(), "answer");
    }

    #[tokio::test]
    async fn test_waiting_follows_latest_entry() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "{}", line("assistant", "done")).unwrap();
        file.flush().unwrap();

        let mut tailer = tailer_for(&file);
        tailer.read_new_lines().await;
        assert!(tailer.waiting_for_input());

        writeln!(file, "{}", line("user", "more please")).unwrap();
        file.flush().unwrap();
        tailer.read_new_lines().await;
        assert!(!tailer.waiting_for_input());
    }

    #[tokio::test]
    async fn test_first_and_last_timestamps() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"role":"user","text":"a","timestamp":"2026-01-29T10:00:00Z"}}"#).unwrap();
        writeln!(file, r#"{{"role":"assistant","text":"b","timestamp":"2026-01-29T10:05:00Z"}}"#).unwrap();
        writeln!(file, r#"{{"role":"system","text":"compacted","timestamp":"2026-01-29T11:00:00Z"}}"#).unwrap();
        file.flush().unwrap();

        let mut tailer = tailer_for(&file);
        assert_eq!(
            tailer.get_first_timestamp().await.as_deref(),
            Some("2026-01-29T10:00:00Z")
        );

        let last = tailer.get_last_message_timestamp().await.unwrap();
        assert_eq!(last.to_rfc3339(), "2026-01-29T10:05:00+00:00");

        writeln!(file, r#"{{"role":"user","text":"c","timestamp":"2026-01-29T12:00:00Z"}}"#).unwrap();
        file.flush().unwrap();
        let last = tailer.get_last_message_timestamp().await.unwrap();
        assert_eq!(last.to_rfc3339(), "2026-01-29T12:00:00+00:00");

        // Queries never move the read position.
        assert_eq!(tailer.position(), 0);
    }

    #[tokio::test]
    async fn test_last_timestamp_none_without_messages() {
        let file = NamedTempFile::new().unwrap();
        let mut tailer = tailer_for(&file);
        assert!(tailer.get_last_message_timestamp().await.is_none());
        assert!(tailer.get_first_timestamp().await.is_none());
    }

    #[tokio::test]
    async fn test_has_unread_bytes() {
        let mut file = NamedTempFile::new().unwrap();
        let mut tailer = tailer_for(&file);
        assert!(!tailer.has_unread_bytes().await);

        writeln!(file, "{}", line("user", "a")).unwrap();
        file.flush().unwrap();
        assert!(tailer.has_unread_bytes().await);

        tailer.read_new_lines().await;
        assert!(!tailer.has_unread_bytes().await);
    }

    #[tokio::test]
    async fn test_reset_rereads_from_start() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "{}", line("assistant", "a")).unwrap();
        file.flush().unwrap();

        let mut tailer = tailer_for(&file);
        assert_eq!(tailer.read_new_lines().await.len(), 1);

        tailer.reset();
        assert_eq!(tailer.position(), 0);
        assert_eq!(tailer.message_index(), 0);
        assert!(!tailer.waiting_for_input());

        let again = tailer.read_new_lines().await;
        assert_eq!(again.len(), 1);
        assert_eq!(again[0].index, 0);
    }
}
