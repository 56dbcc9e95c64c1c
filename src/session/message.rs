//! Normalized message model shared by every backend.
//!
//! Backends translate their own record formats into [`NormalizedMessage`],
//! which is what the structured live feed and the REST queries serialize.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    Tool,
    System,
}

impl Role {
    /// Parse a role name as it appears in transcript records.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            "tool" => Some(Self::Tool),
            "system" => Some(Self::System),
            _ => None,
        }
    }

    /// Lowercase wire name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
            Self::System => "system",
        }
    }
}

/// A single content block within a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Plain or markdown text.
    Text { text: String },
    /// Model reasoning.
    Thinking { text: String },
    /// Tool invocation.
    ToolUse {
        tool_name: String,
        tool_id: String,
        tool_input: serde_json::Value,
    },
    /// Tool output, either a string or a list of content parts.
    ToolResult {
        tool_use_id: String,
        content: serde_json::Value,
        is_error: bool,
    },
    /// Inline base64 image.
    Image { media_type: String, data: String },
}

impl ContentBlock {
    /// Create a text block.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Whether this is a text block.
    #[must_use]
    pub fn is_text(&self) -> bool {
        matches!(self, Self::Text { .. })
    }
}

/// Token accounting reported with assistant messages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub cache_creation_tokens: u64,
    #[serde(default)]
    pub cache_read_tokens: u64,
}

/// Backend-agnostic message.
///
/// Built once by a [`LineFormat`](super::LineFormat) and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedMessage {
    pub role: Role,
    /// ISO 8601 timestamp as written by the agent, empty when absent.
    pub timestamp: String,
    pub blocks: Vec<ContentBlock>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl NormalizedMessage {
    /// Create a message with the given role and blocks.
    #[must_use]
    pub fn new(role: Role, timestamp: impl Into<String>, blocks: Vec<ContentBlock>) -> Self {
        Self {
            role,
            timestamp: timestamp.into(),
            blocks,
            model: None,
            stop_reason: None,
            usage: None,
        }
    }

    /// Set the model identifier (builder pattern).
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the stop reason (builder pattern).
    #[must_use]
    pub fn with_stop_reason(mut self, stop_reason: impl Into<String>) -> Self {
        self.stop_reason = Some(stop_reason.into());
        self
    }

    /// Whether the message is conversation content rather than bookkeeping.
    #[must_use]
    pub fn is_conversation(&self) -> bool {
        self.role != Role::System
    }

    /// Parse the timestamp, if present and valid.
    #[must_use]
    pub fn timestamp_utc(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.timestamp)
            .ok()
            .map(|ts| ts.with_timezone(&Utc))
    }

    /// Concatenated text of all text blocks.
    #[must_use]
    pub fn text(&self) -> String {
        self.blocks
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// The final block, if any.
    #[must_use]
    pub fn last_block(&self) -> Option<&ContentBlock> {
        self.blocks.last()
    }
}
