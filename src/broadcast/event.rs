//! Live-feed event types.

use serde::Serialize;

/// Which representation a subscriber consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubscriberKind {
    /// Pre-rendered HTML fragments.
    Rich,
    /// Normalized JSON payloads.
    Structured,
}

impl SubscriberKind {
    /// Label used in logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Rich => "rich",
            Self::Structured => "structured",
        }
    }
}

/// A named event with a JSON payload, cloned to every subscriber of a set.
#[derive(Debug, Clone, PartialEq)]
pub struct BroadcastEvent {
    pub name: String,
    pub payload: serde_json::Value,
}

impl BroadcastEvent {
    /// Create an event.
    #[must_use]
    pub fn new(name: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            payload,
        }
    }
}

/// Payload of the `session_status` lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionStatus {
    pub session_id: String,
    /// Whether a relayed CLI run is in flight.
    pub running: bool,
    pub queued_messages: usize,
    pub waiting_for_input: bool,
}
