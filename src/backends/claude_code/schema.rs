//! Record schema of Claude Code transcript files.
//!
//! Parses lines of `~/.claude/projects/<folder>/<session>.jsonl`. Fields are
//! lenient so records from older and newer CLI versions still deserialize.

use serde::Deserialize;

/// A single line of a Claude Code transcript.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum TranscriptRecord {
    /// User prompt or tool result
    User(MessageRecord),
    /// Assistant response chunk
    Assistant(MessageRecord),
    /// Compaction summary
    Summary,
    /// System notice
    System,
    /// MCP or hook progress
    Progress,
    /// File backup snapshot
    FileHistorySnapshot,
    /// Queue operation (headless mode)
    QueueOperation,
    /// Unknown record type (forward compatibility)
    #[serde(other)]
    Unknown,
}

/// User or assistant record.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRecord {
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub message: Option<WireMessage>,
    #[serde(default)]
    pub cwd: Option<String>,
    #[serde(default)]
    pub is_sidechain: Option<bool>,
}

/// The API message embedded in a record.
#[derive(Debug, Clone, Deserialize)]
pub struct WireMessage {
    #[serde(default)]
    pub content: WireContent,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub stop_reason: Option<String>,
    #[serde(default)]
    pub usage: Option<WireUsage>,
}

/// Message content - plain text or structured blocks.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum WireContent {
    Text(String),
    Blocks(Vec<WireBlock>),
}

impl Default for WireContent {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

/// A content block within a message.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WireBlock {
    Text {
        #[serde(default)]
        text: String,
    },
    Thinking {
        #[serde(default)]
        thinking: String,
    },
    ToolUse {
        #[serde(default)]
        id: String,
        #[serde(default)]
        name: String,
        #[serde(default)]
        input: serde_json::Value,
    },
    ToolResult {
        #[serde(default)]
        tool_use_id: String,
        #[serde(default)]
        content: serde_json::Value,
        #[serde(default)]
        is_error: bool,
    },
    Image {
        #[serde(default)]
        source: ImageSource,
    },
    /// Unknown block type
    #[serde(other)]
    Unknown,
}

/// Inline image payload.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImageSource {
    #[serde(default)]
    pub media_type: Option<String>,
    #[serde(default)]
    pub data: String,
}

/// Token usage as written by the API.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WireUsage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub cache_creation_input_tokens: u64,
    #[serde(default)]
    pub cache_read_input_tokens: u64,
}
