//! Codex rollout line format.
//!
//! Rollout files (`~/.codex/sessions/YYYY/MM/DD/rollout-*.jsonl`) interleave
//! session metadata, UI events and the model-facing `response_item` records.
//! Only the response items carry the conversation.

use serde::Deserialize;

use crate::session::{ContentBlock, LineFormat, NormalizedMessage, Role};

/// Injected user-turn preambles that are not typed by the user.
const INJECTED_PREFIXES: [&str; 3] = [
    "<environment_context>",
    "<user_instructions>",
    "# AGENTS.md instructions",
];

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(super) enum RolloutRecord {
    SessionMeta(SessionMetaRecord),
    ResponseItem(ResponseItemRecord),
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
pub(super) struct SessionMetaRecord {
    pub payload: SessionMetaPayload,
}

#[derive(Debug, Deserialize)]
pub(super) struct SessionMetaPayload {
    #[serde(default)]
    pub cwd: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct ResponseItemRecord {
    #[serde(default)]
    timestamp: String,
    payload: ResponseItem,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ResponseItem {
    Message {
        role: String,
        #[serde(default)]
        content: Vec<MessagePart>,
    },
    Reasoning {
        #[serde(default)]
        summary: Vec<SummaryPart>,
    },
    FunctionCall {
        name: String,
        #[serde(default)]
        arguments: String,
        #[serde(default)]
        call_id: String,
    },
    FunctionCallOutput {
        #[serde(default)]
        call_id: String,
        #[serde(default)]
        output: serde_json::Value,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum MessagePart {
    InputText { text: String },
    OutputText { text: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum SummaryPart {
    SummaryText { text: String },
    #[serde(other)]
    Other,
}

/// Parses Codex rollout records into normalized messages.
#[derive(Debug, Clone, Copy, Default)]
pub struct CodexFormat;

impl LineFormat for CodexFormat {
    fn name(&self) -> &'static str {
        "codex"
    }

    fn parse_line(&self, line: &str) -> Result<Option<NormalizedMessage>, serde_json::Error> {
        let RolloutRecord::ResponseItem(record) = serde_json::from_str::<RolloutRecord>(line)? else {
            return Ok(None);
        };
        Ok(normalize(record))
    }
}

fn normalize(record: ResponseItemRecord) -> Option<NormalizedMessage> {
    let timestamp = record.timestamp;
    match record.payload {
        ResponseItem::Message { role, content } => {
            let role = match role.as_str() {
                "user" => Role::User,
                "assistant" => Role::Assistant,
                _ => return None,
            };
            let blocks: Vec<ContentBlock> = content
                .into_iter()
                .filter_map(|part| match part {
                    MessagePart::InputText { text } | MessagePart::OutputText { text } => {
                        Some(text)
                    }
                    MessagePart::Other => None,
                })
                .filter(|text| !text.trim().is_empty() && !is_injected(text))
                .map(ContentBlock::text)
                .collect();
            (!blocks.is_empty()).then(|| NormalizedMessage::new(role, timestamp, blocks))
        }
        ResponseItem::Reasoning { summary } => {
            let text = summary
                .into_iter()
                .filter_map(|part| match part {
                    SummaryPart::SummaryText { text } => Some(text),
                    SummaryPart::Other => None,
                })
                .collect::<Vec<_>>()
                .join("\n\n");
            (!text.trim().is_empty()).then(|| {
                NormalizedMessage::new(Role::Assistant, timestamp, vec![ContentBlock::Thinking { text }])
            })
        }
        ResponseItem::FunctionCall {
            name,
            arguments,
            call_id,
        } => {
            let tool_input = serde_json::from_str(&arguments)
                .unwrap_or_else(|_| serde_json::Value::String(arguments));
            Some(NormalizedMessage::new(
                Role::Assistant,
                timestamp,
                vec![ContentBlock::ToolUse {
                    tool_name: name,
                    tool_id: call_id,
                    tool_input,
                }],
            ))
        }
        ResponseItem::FunctionCallOutput { call_id, output } => Some(NormalizedMessage::new(
            Role::Tool,
            timestamp,
            vec![ContentBlock::ToolResult {
                tool_use_id: call_id,
                content: output,
                is_error: false,
            }],
        )),
        ResponseItem::Other => None,
    }
}

fn is_injected(text: &str) -> bool {
    let trimmed = text.trim_start();
    INJECTED_PREFIXES
        .iter()
        .any(|prefix| trimmed.starts_with(prefix))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(line: &str) -> Option<NormalizedMessage> {
        CodexFormat.parse_line(line).unwrap()
    }

    #[test]
    fn test_user_and_assistant_messages() {
        let user = parse(
            r#"{"timestamp":"2026-01-29T10:00:00Z","type":"response_item","payload":{"type":"message","role":"user","content":[{"type":"input_text","text":"Add tests"}]}}"#,
        )
        .unwrap();
        assert_eq!(user.role, Role::User);
        assert_eq!(user.text(), "Add tests");
        assert_eq!(user.timestamp, "2026-01-29T10:00:00Z");

        let assistant = parse(
            r#"{"timestamp":"t","type":"response_item","payload":{"type":"message","role":"assistant","content":[{"type":"output_text","text":"Done."}]}}"#,
        )
        .unwrap();
        assert_eq!(assistant.role, Role::Assistant);
        assert!(CodexFormat.is_waiting_for_input(&assistant));
    }

    #[test]
    fn test_injected_context_skipped() {
        assert!(parse(
            r#"{"type":"response_item","payload":{"type":"message","role":"user","content":[{"type":"input_text","text":"<environment_context>\n  <cwd>/tmp</cwd>\n</environment_context>"}]}}"#
        )
        .is_none());
        assert!(parse(
            r#"{"type":"response_item","payload":{"type":"message","role":"developer","content":[{"type":"input_text","text":"rules"}]}}"#
        )
        .is_none());
    }

    #[test]
    fn test_function_call_and_output() {
        let call = parse(
            r#"{"type":"response_item","payload":{"type":"function_call","name":"shell","arguments":"{\"command\":[\"ls\"]}","call_id":"call_1"}}"#,
        )
        .unwrap();
        assert_eq!(call.role, Role::Assistant);
        assert_eq!(
            call.blocks[0],
            ContentBlock::ToolUse {
                tool_name: "shell".to_string(),
                tool_id: "call_1".to_string(),
                tool_input: json!({"command": ["ls"]}),
            }
        );
        assert!(!CodexFormat.is_waiting_for_input(&call));

        let output = parse(
            r#"{"type":"response_item","payload":{"type":"function_call_output","call_id":"call_1","output":"Cargo.toml\nsrc"}}"#,
        )
        .unwrap();
        assert_eq!(output.role, Role::Tool);
        assert!(!CodexFormat.is_waiting_for_input(&output));
    }

    #[test]
    fn test_unparseable_arguments_kept_as_string() {
        let call = parse(
            r#"{"type":"response_item","payload":{"type":"function_call","name":"apply_patch","arguments":"*** Begin Patch","call_id":"c"}}"#,
        )
        .unwrap();
        assert!(matches!(
            &call.blocks[0],
            ContentBlock::ToolUse { tool_input, .. } if tool_input == &json!("*** Begin Patch")
        ));
    }

    #[test]
    fn test_reasoning_summary_becomes_thinking() {
        let msg = parse(
            r#"{"type":"response_item","payload":{"type":"reasoning","summary":[{"type":"summary_text","text":"Looking at files"}],"encrypted_content":"xyz"}}"#,
        )
        .unwrap();
        assert_eq!(
            msg.blocks[0],
            ContentBlock::Thinking {
                text: "Looking at files".to_string()
            }
        );
        assert!(parse(r#"{"type":"response_item","payload":{"type":"reasoning","summary":[]}}"#).is_none());
    }

    #[test]
    fn test_non_conversation_records_skipped() {
        assert!(parse(r#"{"type":"session_meta","payload":{"id":"x","cwd":"/tmp"}}"#).is_none());
        assert!(parse(r#"{"type":"event_msg","payload":{"type":"token_count"}}"#).is_none());
        assert!(parse(r#"{"type":"turn_context","payload":{}}"#).is_none());
        assert!(parse(r#"{"type":"response_item","payload":{"type":"ghost_snapshot"}}"#).is_none());
        assert!(CodexFormat.parse_line("][").is_err());
    }
}
