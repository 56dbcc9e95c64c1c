//! Request and response bodies for the dashboard HTTP endpoints.

use serde::{Deserialize, Serialize};

use crate::backends::Backend;
use crate::registry::SessionInfo;
use crate::search::SearchOptions;
use crate::session::NormalizedMessage;

/// Response for `GET /sessions`.
#[derive(Debug, Clone, Serialize)]
pub struct SessionsResponse {
    pub sessions: Vec<SessionInfo>,
}

/// Response for `GET /sessions/:id/messages`.
#[derive(Debug, Clone, Serialize)]
pub struct MessagesResponse {
    pub session_id: String,
    pub messages: Vec<NormalizedMessage>,
    pub count: usize,
}

impl MessagesResponse {
    #[must_use]
    pub fn new(session_id: impl Into<String>, messages: Vec<NormalizedMessage>) -> Self {
        Self {
            session_id: session_id.into(),
            count: messages.len(),
            messages,
        }
    }
}

/// Query string of `GET /search`.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchQuery {
    pub q: String,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub include_subagents: bool,
    #[serde(default)]
    pub case_sensitive: bool,
    #[serde(default)]
    pub show_tools: bool,
}

impl SearchQuery {
    #[must_use]
    pub fn options(&self) -> SearchOptions {
        let defaults = SearchOptions::default();
        SearchOptions {
            limit: self.limit.unwrap_or(defaults.limit),
            include_subagents: self.include_subagents,
            case_sensitive: self.case_sensitive,
            hide_tools: !self.show_tools,
            ..defaults
        }
    }
}

/// Query string of `GET /sessions/:id/export`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExportQuery {
    #[serde(default)]
    pub hide_tools: bool,
}

/// Body of `POST /sessions/:id/send`.
#[derive(Debug, Clone, Deserialize)]
pub struct SendRequest {
    pub message: String,
}

/// Response for command endpoints (interrupt, resync).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResponse {
    /// Whether the command was successful.
    pub success: bool,
    /// Message describing the result.
    pub message: String,
    /// Optional error details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CommandResponse {
    /// Create a success response.
    #[must_use]
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            error: None,
        }
    }
}

/// One enabled backend in `GET /backends`.
#[derive(Debug, Clone, Serialize)]
pub struct BackendInfo {
    pub name: String,
    pub projects_dir: String,
    pub cli_command: Option<String>,
    pub models: Vec<String>,
    pub supports_send: bool,
}

impl From<&dyn Backend> for BackendInfo {
    fn from(backend: &dyn Backend) -> Self {
        Self {
            name: backend.name().to_string(),
            projects_dir: backend.projects_dir().display().to_string(),
            cli_command: backend.cli_command().map(str::to_string),
            models: backend.models().into_iter().map(str::to_string).collect(),
            supports_send: backend.cli_command().is_some(),
        }
    }
}

/// Response for `GET /backends`.
#[derive(Debug, Clone, Serialize)]
pub struct BackendsResponse {
    pub backends: Vec<BackendInfo>,
    pub send_enabled: bool,
}

/// Response for `GET /health`.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub sessions: usize,
    /// Rich feed subscribers.
    pub clients: usize,
    /// Structured feed subscribers.
    pub json_clients: usize,
}
