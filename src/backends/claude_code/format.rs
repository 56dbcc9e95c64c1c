//! Claude Code line format.

use crate::session::{ContentBlock, LineFormat, NormalizedMessage, Role, Usage};

use super::schema::{TranscriptRecord, WireBlock, WireContent, WireMessage, WireUsage};

/// Streaming placeholder written before an assistant response has content.
const NO_CONTENT_PLACEHOLDER: &str = "(no content)";

/// Parses Claude Code transcript records into normalized messages.
///
/// Only user and assistant records surface; summaries, snapshots and other
/// bookkeeping records are skipped.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClaudeCodeFormat;

impl LineFormat for ClaudeCodeFormat {
    fn name(&self) -> &'static str {
        "claude_code"
    }

    fn parse_line(&self, line: &str) -> Result<Option<NormalizedMessage>, serde_json::Error> {
        let record: TranscriptRecord = serde_json::from_str(line)?;
        let (role, record) = match record {
            TranscriptRecord::User(record) => (Role::User, record),
            TranscriptRecord::Assistant(record) => (Role::Assistant, record),
            _ => return Ok(None),
        };
        let Some(message) = record.message else {
            return Ok(None);
        };
        Ok(normalize(role, record.timestamp, message))
    }
}

fn normalize(role: Role, timestamp: String, message: WireMessage) -> Option<NormalizedMessage> {
    if role == Role::Assistant && is_placeholder(&message) {
        return None;
    }

    let blocks: Vec<ContentBlock> = match message.content {
        WireContent::Text(text) if text.trim().is_empty() => Vec::new(),
        WireContent::Text(text) => vec![ContentBlock::Text { text }],
        WireContent::Blocks(blocks) => blocks.into_iter().filter_map(normalize_block).collect(),
    };
    if blocks.is_empty() {
        return None;
    }

    // User records that only carry tool output are the tool speaking.
    let role = if role == Role::User
        && blocks
            .iter()
            .all(|block| matches!(block, ContentBlock::ToolResult { .. }))
    {
        Role::Tool
    } else {
        role
    };

    let usage = if role == Role::Assistant {
        message.usage.map(normalize_usage)
    } else {
        None
    };

    Some(NormalizedMessage {
        role,
        timestamp,
        blocks,
        model: message.model.filter(|_| role == Role::Assistant),
        stop_reason: message.stop_reason,
        usage,
    })
}

fn is_placeholder(message: &WireMessage) -> bool {
    if message.stop_reason.is_some() {
        return false;
    }
    match &message.content {
        WireContent::Blocks(blocks) => matches!(
            blocks.as_slice(),
            [WireBlock::Text { text }] if text.trim() == NO_CONTENT_PLACEHOLDER
        ),
        WireContent::Text(_) => false,
    }
}

fn normalize_block(block: WireBlock) -> Option<ContentBlock> {
    match block {
        WireBlock::Text { text } => Some(ContentBlock::Text { text }),
        WireBlock::Thinking { thinking } => Some(ContentBlock::Thinking { text: thinking }),
        WireBlock::ToolUse { id, name, input } => Some(ContentBlock::ToolUse {
            tool_name: name,
            tool_id: id,
            tool_input: if input.is_null() {
                serde_json::json!({})
            } else {
                input
            },
        }),
        WireBlock::ToolResult {
            tool_use_id,
            content,
            is_error,
        } => Some(ContentBlock::ToolResult {
            tool_use_id,
            content,
            is_error,
        }),
        WireBlock::Image { source } => Some(ContentBlock::Image {
            media_type: source.media_type.unwrap_or_else(|| "image/png".to_string()),
            data: source.data,
        }),
        WireBlock::Unknown => None,
    }
}

fn normalize_usage(usage: WireUsage) -> Usage {
    Usage {
        input_tokens: usage.input_tokens,
        output_tokens: usage.output_tokens,
        cache_creation_tokens: usage.cache_creation_input_tokens,
        cache_read_tokens: usage.cache_read_input_tokens,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(line: &str) -> Option<NormalizedMessage> {
        ClaudeCodeFormat.parse_line(line).unwrap()
    }

    #[test]
    fn test_user_string_content() {
        let msg = parse(
            r#"{"type":"user","timestamp":"2026-01-29T10:00:00Z","message":{"role":"user","content":"Fix the tests"}}"#,
        )
        .unwrap();
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.text(), "Fix the tests");
        assert_eq!(msg.timestamp, "2026-01-29T10:00:00Z");
    }

    #[test]
    fn test_blank_user_content_skipped() {
        assert!(parse(r#"{"type":"user","message":{"role":"user","content":"   "}}"#).is_none());
        assert!(parse(r#"{"type":"user","message":{"role":"user","content":[]}}"#).is_none());
    }

    #[test]
    fn test_bookkeeping_records_skipped() {
        assert!(parse(r#"{"type":"summary","summary":"x","leafUuid":"y"}"#).is_none());
        assert!(parse(r#"{"type":"system","subtype":"compact"}"#).is_none());
        assert!(parse(r#"{"type":"progress","data":{}}"#).is_none());
        assert!(parse(r#"{"type":"assistant","timestamp":"t"}"#).is_none());
    }

    #[test]
    fn test_malformed_is_error() {
        assert!(ClaudeCodeFormat.parse_line("{\"type\":").is_err());
    }

    #[test]
    fn test_assistant_blocks_and_usage() {
        let msg = parse(
            r#"{"type":"assistant","timestamp":"t","message":{"model":"claude-opus-4-5","stop_reason":"tool_use","content":[{"type":"thinking","thinking":"plan"},{"type":"text","text":"Running"},{"type":"tool_use","id":"toolu_1","name":"Bash","input":{"command":"ls"}}],"usage":{"input_tokens":10,"output_tokens":5,"cache_creation_input_tokens":2,"cache_read_input_tokens":3}}}"#,
        )
        .unwrap();

        assert_eq!(msg.role, Role::Assistant);
        assert_eq!(msg.model.as_deref(), Some("claude-opus-4-5"));
        assert_eq!(msg.blocks.len(), 3);
        assert_eq!(
            msg.blocks[2],
            ContentBlock::ToolUse {
                tool_name: "Bash".to_string(),
                tool_id: "toolu_1".to_string(),
                tool_input: json!({"command": "ls"}),
            }
        );
        let usage = msg.usage.unwrap();
        assert_eq!(usage.cache_creation_tokens, 2);
        assert_eq!(usage.cache_read_tokens, 3);
        assert!(!ClaudeCodeFormat.is_waiting_for_input(&parse(
            r#"{"type":"assistant","message":{"stop_reason":"tool_use","content":[{"type":"text","text":"x"}]}}"#
        ).unwrap()));
    }

    #[test]
    fn test_tool_result_only_user_becomes_tool() {
        let msg = parse(
            r#"{"type":"user","message":{"role":"user","content":[{"type":"tool_result","tool_use_id":"toolu_1","content":"file.txt","is_error":true}]}}"#,
        )
        .unwrap();
        assert_eq!(msg.role, Role::Tool);
        assert_eq!(
            msg.blocks[0],
            ContentBlock::ToolResult {
                tool_use_id: "toolu_1".to_string(),
                content: json!("file.txt"),
                is_error: true,
            }
        );
    }

    #[test]
    fn test_image_block() {
        let msg = parse(
            r#"{"type":"user","message":{"content":[{"type":"text","text":"see"},{"type":"image","source":{"type":"base64","media_type":"image/jpeg","data":"AAAA"}}]}}"#,
        )
        .unwrap();
        assert_eq!(msg.role, Role::User);
        assert_eq!(
            msg.blocks[1],
            ContentBlock::Image {
                media_type: "image/jpeg".to_string(),
                data: "AAAA".to_string(),
            }
        );
    }

    #[test]
    fn test_no_content_placeholder_skipped() {
        assert!(parse(
            r#"{"type":"assistant","message":{"stop_reason":null,"content":[{"type":"text","text":"(no content)"}]}}"#
        )
        .is_none());

        // A finished message with the same text is real content.
        assert!(parse(
            r#"{"type":"assistant","message":{"stop_reason":"end_turn","content":[{"type":"text","text":"(no content)"}]}}"#
        )
        .is_some());
    }

    #[test]
    fn test_waiting_for_input() {
        let done = parse(
            r#"{"type":"assistant","message":{"content":[{"type":"text","text":"All done"}]}}"#,
        )
        .unwrap();
        assert!(ClaudeCodeFormat.is_waiting_for_input(&done));

        let working = parse(
            r#"{"type":"assistant","message":{"content":[{"type":"tool_use","id":"t","name":"Read","input":{}}]}}"#,
        )
        .unwrap();
        assert!(!ClaudeCodeFormat.is_waiting_for_input(&working));

        let user = parse(r#"{"type":"user","message":{"content":"next"}}"#).unwrap();
        assert!(!ClaudeCodeFormat.is_waiting_for_input(&user));
    }
}
