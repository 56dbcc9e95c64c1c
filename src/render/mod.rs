//! HTML fragments for the rich live feed.
//!
//! All user-controlled text goes through comrak with raw HTML disabled, so
//! transcript content can never inject markup.

use std::fmt::Debug;
use std::fmt::Write as _;

use comrak::{markdown_to_html, Options};

use crate::session::{ContentBlock, Entry};

/// Turns entries into display fragments.
pub trait MessageRenderer: Send + Sync + Debug {
    /// Render one entry, or `None` when nothing is displayable.
    fn render(&self, entry: &Entry) -> Option<String>;
}

/// Markdown-to-HTML renderer.
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlRenderer;

impl HtmlRenderer {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn markdown(text: &str) -> String {
        let mut options = Options::default();
        options.extension.strikethrough = true;
        options.extension.table = true;
        options.extension.autolink = true;
        options.extension.tasklist = true;
        options.render.unsafe_ = false;
        markdown_to_html(text, &options)
    }

    fn code_block(body: &str, lang: &str) -> String {
        let fence = "`".repeat(longest_backtick_run(body).max(2) + 1);
        Self::markdown(&format!("{fence}{lang}\n{body}\n{fence}\n"))
    }

    fn inline_code(text: &str) -> String {
        let fence = "`".repeat(longest_backtick_run(text) + 1);
        Self::markdown(&format!("{fence} {text} {fence}"))
    }

    fn render_block(block: &ContentBlock) -> Option<String> {
        match block {
            ContentBlock::Text { text } => {
                if text.trim().is_empty() {
                    return None;
                }
                Some(format!(
                    r#"<div class="block block-text">{}</div>"#,
                    Self::markdown(text)
                ))
            }
            ContentBlock::Thinking { text } => {
                if text.trim().is_empty() {
                    return None;
                }
                Some(format!(
                    r#"<details class="block block-thinking"><summary>Thinking</summary>{}</details>"#,
                    Self::markdown(text)
                ))
            }
            ContentBlock::ToolUse {
                tool_name,
                tool_input,
                ..
            } => {
                let input = serde_json::to_string_pretty(tool_input).unwrap_or_default();
                Some(format!(
                    r#"<div class="block block-tool-use"><div class="tool-name">{}</div>{}</div>"#,
                    Self::inline_code(tool_name),
                    Self::code_block(&input, "json")
                ))
            }
            ContentBlock::ToolResult {
                content, is_error, ..
            } => {
                let class = if *is_error { "block block-tool-result tool-error" } else { "block block-tool-result" };
                Some(format!(
                    r#"<details class="{class}"><summary>Result</summary>{}</details>"#,
                    Self::code_block(&tool_result_text(content), "")
                ))
            }
            ContentBlock::Image { media_type, data } => {
                if !is_safe_media_type(media_type) || !is_base64(data) {
                    tracing::debug!(media_type, "Skipping image with unexpected encoding");
                    return None;
                }
                Some(format!(
                    r#"<div class="block block-image"><img src="data:{media_type};base64,{data}" alt="image"></div>"#
                ))
            }
        }
    }
}

impl MessageRenderer for HtmlRenderer {
    fn render(&self, entry: &Entry) -> Option<String> {
        let blocks: String = entry.message.blocks.iter().filter_map(Self::render_block).collect();
        if blocks.is_empty() {
            return None;
        }

        let mut html = format!(
            r#"<div class="message message-{}" data-index="{}""#,
            entry.message.role.as_str(),
            entry.index
        );
        if let Some(ts) = entry.message.timestamp_utc() {
            let _ = write!(html, r#" data-timestamp="{}""#, ts.to_rfc3339());
        }
        html.push('>');
        html.push_str(&blocks);
        html.push_str("</div>");
        Some(html)
    }
}

pub(crate) fn longest_backtick_run(text: &str) -> usize {
    text.split(|c| c != '`').map(str::len).max().unwrap_or(0)
}

/// Flatten a tool result into displayable text.
pub(crate) fn tool_result_text(content: &serde_json::Value) -> String {
    match content {
        serde_json::Value::String(text) => text.clone(),
        serde_json::Value::Array(parts) => parts
            .iter()
            .map(|part| match part.get("text").and_then(serde_json::Value::as_str) {
                Some(text) => text.to_string(),
                None => part.to_string(),
            })
            .collect::<Vec<_>>()
            .join("\n"),
        serde_json::Value::Null => String::new(),
        other => serde_json::to_string_pretty(other).unwrap_or_default(),
    }
}

fn is_safe_media_type(media_type: &str) -> bool {
    media_type.strip_prefix("image/").is_some_and(|subtype| {
        !subtype.is_empty()
            && subtype
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '+' | '-'))
    })
}

fn is_base64(data: &str) -> bool {
    !data.is_empty()
        && data
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '/' | '='))
}
