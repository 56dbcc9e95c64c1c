//! Registry error types.

use std::path::PathBuf;

/// Reasons a session cannot be added or found.
#[derive(thiserror::Error, Debug)]
pub enum RegistryError {
    /// Path does not exist or is not a regular file.
    #[error("Not a session file: {0}")]
    NotAFile(PathBuf),

    /// Session id is already tracked.
    #[error("Session already tracked: {0}")]
    AlreadyTracked(String),

    /// File has no bytes yet.
    #[error("Session file is empty: {0}")]
    EmptyFile(PathBuf),

    /// File contains no user or assistant messages.
    #[error("Session has no messages: {0}")]
    NoMessages(PathBuf),

    /// The session limit was reached and eviction was not requested.
    #[error("Session limit of {limit} reached")]
    LimitReached { limit: usize },

    /// No enabled backend owns the path.
    #[error("No backend for path: {0}")]
    UnknownBackend(PathBuf),

    /// Unknown session id.
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// I/O error while inspecting the file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RegistryError {
    /// Whether the error only means "nothing to add", as opposed to a failure.
    #[must_use]
    pub fn is_skip(&self) -> bool {
        matches!(
            self,
            Self::AlreadyTracked(_) | Self::EmptyFile(_) | Self::NoMessages(_) | Self::NotAFile(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_a_file_display() {
        let err = RegistryError::NotAFile(PathBuf::from("/tmp/dir"));
        assert_eq!(err.to_string(), "Not a session file: /tmp/dir");
    }

    #[test]
    fn test_limit_reached_display() {
        let err = RegistryError::LimitReached { limit: 100 };
        assert_eq!(err.to_string(), "Session limit of 100 reached");
    }

    #[test]
    fn test_session_not_found_display() {
        let err = RegistryError::SessionNotFound("abc".to_string());
        assert_eq!(err.to_string(), "Session not found: abc");
    }

    #[test]
    fn test_is_skip() {
        assert!(RegistryError::AlreadyTracked("a".to_string()).is_skip());
        assert!(RegistryError::EmptyFile(PathBuf::from("a")).is_skip());
        assert!(!RegistryError::LimitReached { limit: 1 }.is_skip());
        assert!(!RegistryError::UnknownBackend(PathBuf::from("a")).is_skip());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: RegistryError = io_err.into();
        assert!(matches!(err, RegistryError::Io(_)));
    }
}
