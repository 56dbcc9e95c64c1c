//! Watcher error types.

use std::path::PathBuf;

/// Errors that can occur during file watching.
#[derive(thiserror::Error, Debug)]
pub enum WatcherError {
    /// Notify watcher error.
    #[error("File watcher error: {0}")]
    Notify(#[from] notify::Error),

    /// None of the backend directories exist.
    #[error("No directories to watch (checked {})", .0.len())]
    NoWatchDirectories(Vec<PathBuf>),
}
