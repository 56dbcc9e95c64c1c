//! Claude Code backend.

mod cli;
mod discovery;
mod format;
mod schema;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::backends::scan::{collect_jsonl_files, first_user_message, has_messages};
use crate::backends::{Backend, CommandSpec, SendOptions, SessionMetadata};
use crate::session::LineFormat;

pub use cli::{CLI_COMMAND, MODELS};
pub use discovery::{
    decode_project_folder, is_subagent_session, is_summary_file, parent_session_id,
    project_folder, session_id_from_summary_file, summary_path,
};
pub use format::ClaudeCodeFormat;

/// First user message of short-lived sessions the CLI opens to warm its cache.
const WARMUP_MESSAGE: &str = "Warmup";

/// Transcripts under `~/.claude/projects`.
#[derive(Debug, Clone)]
pub struct ClaudeCodeBackend {
    projects_dir: PathBuf,
    format: Arc<ClaudeCodeFormat>,
}

impl ClaudeCodeBackend {
    /// Create a backend rooted at `projects_dir`.
    #[must_use]
    pub fn new(projects_dir: PathBuf) -> Self {
        Self {
            projects_dir,
            format: Arc::new(ClaudeCodeFormat),
        }
    }

    /// `~/.claude/projects`, if the home directory is known.
    #[must_use]
    pub fn default_dir() -> Option<PathBuf> {
        discovery::default_projects_dir()
    }

    fn is_warmup_session(&self, path: &Path) -> bool {
        first_user_message(path, self.format.as_ref()).as_deref() == Some(WARMUP_MESSAGE)
    }
}

impl Backend for ClaudeCodeBackend {
    fn name(&self) -> &'static str {
        "claude_code"
    }

    fn projects_dir(&self) -> &Path {
        &self.projects_dir
    }

    fn line_format(&self) -> Arc<dyn LineFormat> {
        self.format.clone()
    }

    fn session_id(&self, path: &Path) -> String {
        discovery::session_id(path)
    }

    fn should_watch_file(&self, path: &Path, include_subagents: bool) -> bool {
        discovery::should_watch_file(path, include_subagents)
    }

    fn is_summary_file(&self, path: &Path) -> bool {
        is_summary_file(path)
    }

    fn summary_path(&self, path: &Path) -> Option<PathBuf> {
        Some(summary_path(path))
    }

    fn session_id_from_changed_file(&self, path: &Path) -> Option<String> {
        if is_summary_file(path) {
            session_id_from_summary_file(path)
        } else {
            Some(discovery::session_id(path))
        }
    }

    fn find_recent_sessions(&self, limit: usize, include_subagents: bool) -> Vec<PathBuf> {
        if !self.projects_dir.is_dir() {
            tracing::warn!(path = %self.projects_dir.display(), "Projects directory not found");
            return Vec::new();
        }

        collect_jsonl_files(&self.projects_dir, |path| {
            include_subagents || !is_subagent_session(path)
        })
        .into_iter()
        .map(|(path, _)| path)
        .filter(|path| has_messages(path, self.format.as_ref()) && !self.is_warmup_session(path))
        .take(limit)
        .collect()
    }

    fn metadata(&self, path: &Path) -> SessionMetadata {
        let folder = project_folder(path)
            .and_then(Path::file_name)
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let (mut project_name, project_path) = decode_project_folder(&folder);

        let is_subagent = is_subagent_session(path);
        if is_subagent {
            project_name = format!("[subagent] {project_name}");
        }

        SessionMetadata {
            project_name,
            project_path,
            first_message: first_user_message(path, self.format.as_ref()),
            is_subagent,
            parent_session_id: parent_session_id(path),
        }
    }

    fn has_messages(&self, path: &Path) -> bool {
        has_messages(path, self.format.as_ref())
    }

    fn models(&self) -> Vec<&'static str> {
        MODELS.to_vec()
    }

    fn cli_command(&self) -> Option<&'static str> {
        Some(CLI_COMMAND)
    }

    fn build_send_command(
        &self,
        session_id: &str,
        message: &str,
        options: &SendOptions,
    ) -> Option<CommandSpec> {
        Some(cli::build_send_command(session_id, message, options))
    }

    fn build_fork_command(
        &self,
        session_id: &str,
        message: &str,
        options: &SendOptions,
    ) -> Option<CommandSpec> {
        Some(cli::build_fork_command(session_id, message, options))
    }

    fn build_new_session_command(
        &self,
        message: &str,
        model: Option<&str>,
        options: &SendOptions,
    ) -> Option<CommandSpec> {
        Some(cli::build_new_session_command(message, model, options))
    }
}
