//! Markdown export of one session transcript.

use std::fmt::Write as _;
use std::path::Path;

use crate::render::{longest_backtick_run, tool_result_text};
use crate::session::{ContentBlock, NormalizedMessage, Role};

/// Tool output and written file bodies longer than this are cut.
pub const LONG_OUTPUT_CHARS: usize = 2000;

/// Export switches.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExportOptions {
    /// Keep only the conversation: no tool calls, no tool output, no timestamps.
    pub hide_tools: bool,
}

/// Document heading for a backend's transcripts.
#[must_use]
pub fn transcript_title(format_name: &str) -> &'static str {
    match format_name {
        "claude_code" => "Claude Code Transcript",
        "codex" => "Codex Transcript",
        _ => "Session Transcript",
    }
}

/// Render a whole session as a markdown document.
///
/// User prompts are numbered; tool output is attached to the prompt that
/// caused it.
#[must_use]
pub fn session_markdown(
    path: &Path,
    format_name: &str,
    messages: &[NormalizedMessage],
    options: ExportOptions,
) -> String {
    let session = path.file_stem().map(|s| s.to_string_lossy()).unwrap_or_default();
    let project = path
        .parent()
        .and_then(Path::file_name)
        .map(|s| s.to_string_lossy())
        .unwrap_or_default();

    let mut out = format!(
        "# {}\n\n**Session:** {session}\n**Project:** {project}\n",
        transcript_title(format_name)
    );
    if !options.hide_tools {
        if let Some(first) = messages.iter().find(|m| !m.timestamp.is_empty()) {
            let _ = writeln!(out, "**Date:** {}", first.timestamp);
        }
    }
    out.push_str("\n---\n\n");

    let mut prompt = 0;
    for message in messages {
        if message.role == Role::User && has_prompt_text(message) {
            prompt += 1;
            let _ = write!(out, "## Prompt {prompt}\n\n");
        }
        if let Some(section) = message_markdown(message, options) {
            out.push_str(&section);
            out.push_str("\n\n");
        }
    }
    out
}

/// Markdown for one message, or `None` when nothing is shown for it.
#[must_use]
pub fn message_markdown(message: &NormalizedMessage, options: ExportOptions) -> Option<String> {
    let mut lines: Vec<String> = Vec::new();
    match message.role {
        Role::System => return None,
        Role::User => {
            let text = message.text();
            if !text.trim().is_empty() {
                if options.hide_tools || message.timestamp.is_empty() {
                    lines.push("**User:**".to_string());
                } else {
                    lines.push(format!("**User** ({}):", message.timestamp));
                }
                lines.push(String::new());
                lines.push(text);
            }
            push_non_text_blocks(&mut lines, &message.blocks, options);
        }
        Role::Assistant => {
            let mut body = Vec::new();
            for block in &message.blocks {
                match block {
                    ContentBlock::Text { text } if !text.trim().is_empty() => {
                        body.push(text.clone());
                        body.push(String::new());
                    }
                    ContentBlock::Thinking { text } => {
                        body.push("*Thinking:*".to_string());
                        body.push(String::new());
                        body.extend(text.lines().map(|line| format!("> {line}")));
                        body.push(String::new());
                    }
                    _ => push_non_text_blocks(&mut body, std::slice::from_ref(block), options),
                }
            }
            if !body.is_empty() {
                lines.push("**Assistant:**".to_string());
                lines.push(String::new());
                lines.extend(body);
            }
        }
        Role::Tool => push_non_text_blocks(&mut lines, &message.blocks, options),
    }

    let section = lines.join("\n");
    let section = section.trim_end();
    (!section.is_empty()).then(|| section.to_string())
}

fn has_prompt_text(message: &NormalizedMessage) -> bool {
    !message.text().trim().is_empty()
}

fn push_non_text_blocks(lines: &mut Vec<String>, blocks: &[ContentBlock], options: ExportOptions) {
    for block in blocks {
        match block {
            ContentBlock::ToolUse {
                tool_name,
                tool_input,
                ..
            } if !options.hide_tools => push_tool_call(lines, tool_name, tool_input),
            ContentBlock::ToolResult {
                content, is_error, ..
            } if !options.hide_tools => {
                lines.push(if *is_error { "**Tool Error:**" } else { "**Tool Output:**" }.to_string());
                push_fenced(lines, "", &truncate(&tool_result_text(content)));
                lines.push(String::new());
            }
            ContentBlock::Image { media_type, .. } => {
                lines.push(format!("*[image: {media_type}]*"));
                lines.push(String::new());
            }
            _ => {}
        }
    }
}

fn push_tool_call(lines: &mut Vec<String>, name: &str, input: &serde_json::Value) {
    let field = |key: &str| input.get(key).and_then(serde_json::Value::as_str).unwrap_or_default();

    lines.push(format!("### Tool: {name}"));
    match name.to_ascii_lowercase().as_str() {
        "bash" | "shell" => {
            let description = field("description");
            if !description.is_empty() {
                lines.push(format!("*{description}*"));
            }
            let command = match input.get("command") {
                Some(serde_json::Value::Array(parts)) => parts
                    .iter()
                    .filter_map(serde_json::Value::as_str)
                    .collect::<Vec<_>>()
                    .join(" "),
                _ => field("command").to_string(),
            };
            push_fenced(lines, "bash", &command);
        }
        "edit" => {
            lines.push(format!("**File:** `{}`", field("file_path")));
            lines.push(String::new());
            lines.push("**Old:**".to_string());
            push_fenced(lines, "", field("old_string"));
            lines.push(String::new());
            lines.push("**New:**".to_string());
            push_fenced(lines, "", field("new_string"));
        }
        "write" => {
            lines.push(format!("**File:** `{}`", field("file_path")));
            lines.push(String::new());
            push_fenced(lines, "", &truncate(field("content")));
        }
        "read" => lines.push(format!("**File:** `{}`", field("file_path"))),
        _ => {
            let pretty = serde_json::to_string_pretty(input).unwrap_or_default();
            push_fenced(lines, "json", &truncate(&pretty));
        }
    }
    lines.push(String::new());
}

fn push_fenced(lines: &mut Vec<String>, lang: &str, body: &str) {
    let fence = "`".repeat(longest_backtick_run(body).max(2) + 1);
    lines.push(format!("{fence}{lang}"));
    lines.push(body.to_string());
    lines.push(fence);
}

fn truncate(text: &str) -> String {
    match text.char_indices().nth(LONG_OUTPUT_CHARS) {
        Some((cut, _)) => format!("{}\n... (truncated)", &text[..cut]),
        None => text.to_string(),
    }
}
