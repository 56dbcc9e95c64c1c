//! Dashboard error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::relay::RelayError;
use crate::search::SearchError;

/// Errors that can occur during dashboard operations.
#[derive(thiserror::Error, Debug)]
pub enum DashboardError {
    /// Failed to bind to address.
    #[error("Failed to bind to {address}: {source}")]
    BindError {
        address: String,
        #[source]
        source: std::io::Error,
    },

    /// Server error.
    #[error("Server error: {0}")]
    ServerError(String),

    /// Unknown session id.
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// Relay rejected or failed the request.
    #[error(transparent)]
    Relay(#[from] RelayError),

    /// Malformed request.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Rejected search phrase.
    #[error(transparent)]
    Search(#[from] SearchError),
}

impl DashboardError {
    /// HTTP status for this error.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::SessionNotFound(_) | Self::Relay(RelayError::SessionNotFound(_)) => {
                StatusCode::NOT_FOUND
            }
            Self::BadRequest(_)
            | Self::Search(_)
            | Self::Relay(RelayError::EmptyMessage | RelayError::UnsupportedBackend(_)) => {
                StatusCode::BAD_REQUEST
            }
            Self::Relay(RelayError::SendDisabled) => StatusCode::FORBIDDEN,
            Self::Relay(RelayError::NotRunning(_)) => StatusCode::CONFLICT,
            Self::BindError { .. }
            | Self::ServerError(_)
            | Self::Relay(RelayError::Spawn(_) | RelayError::Signal(_)) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for DashboardError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
