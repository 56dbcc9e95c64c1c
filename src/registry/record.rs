//! One tracked session.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::backends::{Backend, SessionMetadata};
use crate::broadcast::SessionStatus;
use crate::session::{Entry, Tailer};

/// Side-car summary written next to a transcript.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SessionSummary {
    pub title: Option<String>,
    pub short_summary: Option<String>,
    pub executive_summary: Option<String>,
    pub branch: Option<String>,
}

/// Relayed CLI activity for one session.
#[derive(Debug, Default)]
pub struct RunState {
    /// Process id of the in-flight run, when the OS reported one.
    pub pid: Option<u32>,
    pub running: bool,
    /// Messages waiting for the current run to exit, oldest first.
    pub queue: VecDeque<String>,
}

impl RunState {
    /// Mark the current run as finished.
    pub fn finish(&mut self) {
        self.running = false;
        self.pid = None;
    }
}

/// Session description served to clients and sent with `session_added`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub id: String,
    pub name: String,
    pub path: String,
    pub project_name: String,
    pub project_path: String,
    pub first_message: Option<String>,
    pub started_at: Option<String>,
    pub last_updated_at: Option<DateTime<Utc>>,
    pub backend: String,
    pub is_subagent: bool,
    pub parent_session_id: Option<String>,
    pub summary_title: Option<String>,
    pub summary_short: Option<String>,
    pub summary_executive: Option<String>,
    pub summary_branch: Option<String>,
}

/// A session file, its owning backend and its tailer.
///
/// The tailer sits behind an async mutex so that a read and the broadcast
/// of its entries happen as one unit per session.
#[derive(Debug)]
pub struct SessionRecord {
    id: String,
    path: PathBuf,
    backend: Arc<dyn Backend>,
    metadata: SessionMetadata,
    tailer: tokio::sync::Mutex<Tailer>,
    last_mtime: Mutex<Option<SystemTime>>,
    summary: RwLock<Option<SessionSummary>>,
    run: Mutex<RunState>,
}

impl SessionRecord {
    /// Build a record for `path`, reading metadata and any summary side-car.
    ///
    /// The current mtime becomes the baseline for [`check_mtime_changed`](Self::check_mtime_changed).
    #[must_use]
    pub fn new(path: PathBuf, backend: Arc<dyn Backend>) -> Self {
        let id = backend.session_id(&path);
        let metadata = backend.metadata(&path);
        let tailer = Tailer::new(path.clone(), backend.line_format());
        let last_mtime = std::fs::metadata(&path).and_then(|m| m.modified()).ok();
        let summary = backend
            .summary_path(&path)
            .and_then(|summary_path| read_summary(&id, &summary_path));

        Self {
            id,
            path,
            backend,
            metadata,
            tailer: tokio::sync::Mutex::new(tailer),
            last_mtime: Mutex::new(last_mtime),
            summary: RwLock::new(summary),
            run: Mutex::new(RunState::default()),
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    #[must_use]
    pub fn metadata(&self) -> &SessionMetadata {
        &self.metadata
    }

    /// The session's tailer. Hold the guard for the whole read-and-publish cycle.
    #[must_use]
    pub fn tailer(&self) -> &tokio::sync::Mutex<Tailer> {
        &self.tailer
    }

    /// Whether the file's mtime moved past the stored one.
    ///
    /// A missing file reports `false`. A newer mtime is stored before
    /// returning `true`, so the same modification is reported once.
    pub async fn check_mtime_changed(&self) -> bool {
        let Ok(current) = tokio::fs::metadata(&self.path).await.and_then(|m| m.modified()) else {
            return false;
        };

        let mut last = self.last_mtime.lock().unwrap_or_else(PoisonError::into_inner);
        match *last {
            Some(stored) if current > stored => {
                *last = Some(current);
                true
            }
            Some(_) => false,
            None => {
                *last = Some(current);
                false
            }
        }
    }

    /// Whether a sweep should read this session.
    ///
    /// Unread bytes catch appends that landed within the same mtime tick.
    pub async fn needs_read(&self) -> bool {
        let changed = self.check_mtime_changed().await;
        let unread = self.tailer.lock().await.has_unread_bytes().await;
        changed || unread
    }

    /// Full history through an independent reader.
    pub async fn read_all(&self) -> Vec<Entry> {
        self.tailer.lock().await.read_all().await
    }

    /// Restart the tailer from offset 0 and return every entry in the file.
    pub async fn resync(&self) -> Vec<Entry> {
        let mut tailer = self.tailer.lock().await;
        tailer.reset();
        let entries = tailer.read_new_lines().await;
        tracing::info!(session_id = %self.id, entries = entries.len(), "Session resynced");
        entries
    }

    pub async fn waiting_for_input(&self) -> bool {
        self.tailer.lock().await.waiting_for_input()
    }

    /// Relay state. Do not hold the guard across an await.
    pub fn run_state(&self) -> MutexGuard<'_, RunState> {
        self.run.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Payload for `session_status`.
    pub async fn status(&self) -> SessionStatus {
        let waiting_for_input = self.waiting_for_input().await;
        let run = self.run_state();
        SessionStatus {
            session_id: self.id.clone(),
            running: run.running,
            queued_messages: run.queue.len(),
            waiting_for_input,
        }
    }

    /// Last message timestamp, else the file mtime.
    pub async fn effective_timestamp(&self) -> Option<DateTime<Utc>> {
        let last_message = self.tailer.lock().await.get_last_message_timestamp().await;
        match last_message {
            Some(ts) => Some(ts),
            None => tokio::fs::metadata(&self.path)
                .await
                .and_then(|m| m.modified())
                .ok()
                .map(DateTime::<Utc>::from),
        }
    }

    /// Re-read the summary side-car. Returns whether a summary is now loaded.
    pub fn reload_summary(&self) -> bool {
        let summary = self
            .backend
            .summary_path(&self.path)
            .and_then(|summary_path| read_summary(&self.id, &summary_path));
        let loaded = summary.is_some();
        *self.summary.write().unwrap_or_else(PoisonError::into_inner) = summary;
        loaded
    }

    #[must_use]
    pub fn summary(&self) -> Option<SessionSummary> {
        self.summary.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Snapshot for clients.
    pub async fn info(&self) -> SessionInfo {
        let started_at = self.tailer.lock().await.get_first_timestamp().await;
        let last_updated_at = self.effective_timestamp().await;
        let summary = self.summary().unwrap_or_default();
        let name = if self.metadata.project_name.is_empty() {
            self.id.clone()
        } else {
            self.metadata.project_name.clone()
        };

        SessionInfo {
            id: self.id.clone(),
            name: name.clone(),
            path: self.path.display().to_string(),
            project_name: name,
            project_path: self.metadata.project_path.clone(),
            first_message: self.metadata.first_message.clone(),
            started_at,
            last_updated_at,
            backend: self.backend.name().to_string(),
            is_subagent: self.metadata.is_subagent,
            parent_session_id: self.metadata.parent_session_id.clone(),
            summary_title: summary.title,
            summary_short: summary.short_summary,
            summary_executive: summary.executive_summary,
            summary_branch: summary.branch,
        }
    }
}

fn read_summary(session_id: &str, path: &Path) -> Option<SessionSummary> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            tracing::warn!(session_id, path = %path.display(), error = %e, "Failed to read summary");
            return None;
        }
    };
    match serde_json::from_str::<SessionSummary>(&content) {
        Ok(summary) => {
            tracing::debug!(session_id, title = ?summary.title, "Loaded summary");
            Some(summary)
        }
        Err(e) => {
            tracing::warn!(session_id, path = %path.display(), error = %e, "Failed to parse summary");
            None
        }
    }
}
