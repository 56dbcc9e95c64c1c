//! The set of tracked sessions.

use std::collections::hash_map::Entry as MapEntry;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};

use super::error::RegistryError;
use super::record::{SessionInfo, SessionRecord};
use crate::backends::BackendSet;

/// Default cap on tracked sessions.
pub const DEFAULT_MAX_SESSIONS: usize = 100;

/// Result of a successful [`SessionRegistry::add_session`].
#[derive(Debug)]
pub struct AddedSession {
    pub record: Arc<SessionRecord>,
    /// Id of the session evicted to make room, if any.
    pub evicted: Option<String>,
}

/// In-memory map from session id to [`SessionRecord`].
///
/// Locks guard the maps only and are never held across an await.
#[derive(Debug)]
pub struct SessionRegistry {
    backends: BackendSet,
    max_sessions: usize,
    sessions: RwLock<HashMap<String, Arc<SessionRecord>>>,
    known_files: RwLock<HashSet<PathBuf>>,
}

impl SessionRegistry {
    #[must_use]
    pub fn new(backends: BackendSet, max_sessions: usize) -> Self {
        Self {
            backends,
            max_sessions: max_sessions.max(1),
            sessions: RwLock::new(HashMap::new()),
            known_files: RwLock::new(HashSet::new()),
        }
    }

    #[must_use]
    pub fn backends(&self) -> &BackendSet {
        &self.backends
    }

    #[must_use]
    pub fn max_sessions(&self) -> usize {
        self.max_sessions
    }

    /// Start tracking `path`.
    ///
    /// New records are attached at the end of the file; a replay rewinds the
    /// record's own tailer. At the limit, the session with the
    /// oldest activity is evicted when `evict_oldest` is set.
    ///
    /// # Errors
    ///
    /// Returns an error when the path is not a trackable session or the
    /// limit is reached without eviction.
    pub async fn add_session(
        &self,
        path: &Path,
        evict_oldest: bool,
    ) -> Result<AddedSession, RegistryError> {
        let file_meta = match tokio::fs::metadata(path).await {
            Ok(meta) if meta.is_file() => meta,
            Ok(_) => return Err(RegistryError::NotAFile(path.to_path_buf())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(RegistryError::NotAFile(path.to_path_buf()));
            }
            Err(e) => return Err(e.into()),
        };

        let backend = self
            .backends
            .for_path(path)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownBackend(path.to_path_buf()))?;
        let session_id = backend.session_id(path);

        if self.contains(&session_id) {
            return Err(RegistryError::AlreadyTracked(session_id));
        }
        // The CLI creates an empty file before connecting on resume.
        if file_meta.len() == 0 {
            return Err(RegistryError::EmptyFile(path.to_path_buf()));
        }
        if !backend.has_messages(path) {
            return Err(RegistryError::NoMessages(path.to_path_buf()));
        }

        let mut evicted = None;
        if self.len() >= self.max_sessions {
            if !evict_oldest {
                return Err(RegistryError::LimitReached {
                    limit: self.max_sessions,
                });
            }
            if let Some(oldest) = self.oldest_session_id().await {
                tracing::info!(session_id = %oldest, "Session limit reached, evicting oldest");
                self.remove_session(&oldest);
                evicted = Some(oldest);
            }
        }

        let record = Arc::new(SessionRecord::new(path.to_path_buf(), backend));
        record.tailer().lock().await.seek_to_end().await;

        {
            let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
            match sessions.entry(session_id.clone()) {
                MapEntry::Occupied(_) => return Err(RegistryError::AlreadyTracked(session_id)),
                MapEntry::Vacant(slot) => {
                    slot.insert(Arc::clone(&record));
                }
            }
        }
        self.known_files
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path.to_path_buf());

        tracing::info!(
            session_id = %session_id,
            project = %record.metadata().project_name,
            backend = record.backend().name(),
            "Added session"
        );
        Ok(AddedSession { record, evicted })
    }

    /// Stop tracking a session. Returns the removed record.
    pub fn remove_session(&self, session_id: &str) -> Option<Arc<SessionRecord>> {
        let record = self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(session_id)?;
        self.known_files
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(record.path());
        tracing::info!(session_id, "Removed session");
        Some(record)
    }

    #[must_use]
    pub fn get(&self, session_id: &str) -> Option<Arc<SessionRecord>> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(session_id)
            .cloned()
    }

    /// Look up a session by id, as a `SessionNotFound` error when absent.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::SessionNotFound`] for unknown ids.
    pub fn require(&self, session_id: &str) -> Result<Arc<SessionRecord>, RegistryError> {
        self.get(session_id)
            .ok_or_else(|| RegistryError::SessionNotFound(session_id.to_string()))
    }

    #[must_use]
    pub fn contains(&self, session_id: &str) -> bool {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(session_id)
    }

    /// Snapshot of all records, in no particular order.
    #[must_use]
    pub fn records(&self) -> Vec<Arc<SessionRecord>> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn ids(&self) -> Vec<String> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `path` backs a tracked session.
    #[must_use]
    pub fn is_known_file(&self, path: &Path) -> bool {
        self.known_files
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(path)
    }

    /// All sessions, most recently active first.
    pub async fn sessions_list(&self) -> Vec<SessionInfo> {
        let mut infos = Vec::new();
        for record in self.records() {
            infos.push(record.info().await);
        }
        infos.sort_by(|a, b| b.last_updated_at.cmp(&a.last_updated_at));
        infos
    }

    /// Forget every session.
    pub fn clear(&self) {
        self.sessions.write().unwrap_or_else(PoisonError::into_inner).clear();
        self.known_files
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Session with the oldest activity. Sessions without any timestamp go last.
    async fn oldest_session_id(&self) -> Option<String> {
        let mut oldest: Option<(DateTime<Utc>, String)> = None;
        let mut fallback = None;
        for record in self.records() {
            match record.effective_timestamp().await {
                Some(ts) if oldest.as_ref().is_none_or(|(current, _)| ts < *current) => {
                    oldest = Some((ts, record.id().to_string()));
                }
                Some(_) => {}
                None => {
                    fallback.get_or_insert_with(|| record.id().to_string());
                }
            }
        }
        oldest.map(|(_, id)| id).or(fallback)
    }
}
