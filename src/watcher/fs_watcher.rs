//! Recursive directory watcher built on notify-debouncer-full.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify_debouncer_full::{
    new_debouncer,
    notify::{EventKind, RecommendedWatcher, RecursiveMode},
    DebounceEventResult, DebouncedEvent, Debouncer, RecommendedCache,
};
use tokio::sync::mpsc;

use super::error::WatcherError;

/// Default debounce window.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(100);

/// Events emitted by the directory watcher.
#[derive(Debug)]
pub enum WatchEvent {
    /// Paths created, modified or removed within one debounce window.
    Changed(Vec<PathBuf>),
    /// An error reported by the OS watcher.
    Error(WatcherError),
}

/// Watches backend directories and forwards change batches to a tokio channel.
///
/// Dropping the watcher stops it and closes the channel.
pub struct DirectoryWatcher {
    roots: Vec<PathBuf>,
    _debouncer: Debouncer<RecommendedWatcher, RecommendedCache>,
}

impl std::fmt::Debug for DirectoryWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryWatcher")
            .field("roots", &self.roots)
            .finish_non_exhaustive()
    }
}

impl DirectoryWatcher {
    /// Watch every existing directory in `roots` recursively.
    ///
    /// # Errors
    ///
    /// Returns [`WatcherError::NoWatchDirectories`] when none of the roots
    /// exist, or a notify error if the OS watcher cannot be set up.
    pub fn new(
        roots: &[PathBuf],
        debounce: Duration,
    ) -> Result<(Self, mpsc::UnboundedReceiver<WatchEvent>), WatcherError> {
        let existing: Vec<PathBuf> = roots.iter().filter(|root| root.is_dir()).cloned().collect();
        if existing.is_empty() {
            return Err(WatcherError::NoWatchDirectories(roots.to_vec()));
        }

        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let mut debouncer = new_debouncer(debounce, None, move |result: DebounceEventResult| {
            match result {
                Ok(events) => {
                    let paths = changed_paths(&events);
                    if !paths.is_empty() {
                        let _ = event_tx.send(WatchEvent::Changed(paths));
                    }
                }
                Err(errors) => {
                    for error in errors {
                        let _ = event_tx.send(WatchEvent::Error(WatcherError::Notify(error)));
                    }
                }
            }
        })?;

        for root in &existing {
            debouncer.watch(root, RecursiveMode::Recursive)?;
            tracing::info!(path = %root.display(), "Watching directory");
        }

        Ok((
            Self {
                roots: existing,
                _debouncer: debouncer,
            },
            event_rx,
        ))
    }

    /// Directories actually being watched.
    #[must_use]
    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }
}

/// Unique paths touched by content-changing events, in arrival order.
fn changed_paths(events: &[DebouncedEvent]) -> Vec<PathBuf> {
    let mut seen: HashSet<&Path> = HashSet::new();
    let mut paths = Vec::new();
    for event in events {
        if !matches!(
            event.kind,
            EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
        ) {
            continue;
        }
        for path in &event.paths {
            if seen.insert(path.as_path()) {
                paths.push(path.clone());
            }
        }
    }
    paths
}
