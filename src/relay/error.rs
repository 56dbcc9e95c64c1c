//! Relay error types.

/// Error type for process spawning operations.
#[derive(thiserror::Error, Debug)]
pub enum SpawnError {
    /// The CLI binary was not found on `PATH`.
    #[error("{0} binary not found")]
    NotFound(String),
    /// Permission denied when spawning.
    #[error("Permission denied running {0}")]
    PermissionDenied(String),
    /// Other I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SpawnError {
    /// Create a `SpawnError` from an I/O error, classifying common cases.
    pub(crate) fn from_io(program: &str, err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(program.to_string()),
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied(program.to_string()),
            _ => Self::Io(err),
        }
    }
}

/// Errors returned to callers of the relay.
#[derive(thiserror::Error, Debug)]
pub enum RelayError {
    /// Sending is turned off in the configuration.
    #[error("Sending messages is disabled")]
    SendDisabled,

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// The session's backend cannot receive messages.
    #[error("Backend {0} does not support sending messages")]
    UnsupportedBackend(String),

    #[error("Message is empty")]
    EmptyMessage,

    /// The CLI process could not be started.
    #[error("Failed to start CLI: {0}")]
    Spawn(#[from] SpawnError),

    /// No run is in flight for the session.
    #[error("No running process for session {0}")]
    NotRunning(String),

    /// Delivering a signal failed.
    #[error("Failed to signal process: {0}")]
    Signal(String),
}
