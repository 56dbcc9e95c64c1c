//! Coding-agent backends.
//!
//! A [`Backend`] knows where one agent tool keeps its transcripts, how its
//! lines parse, and how to build the CLI invocations that talk back to it.

pub mod claude_code;
pub mod codex;
mod scan;

use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::session::LineFormat;

pub use claude_code::{ClaudeCodeBackend, ClaudeCodeFormat};
pub use codex::{CodexBackend, CodexFormat};
pub use scan::{first_user_message, has_messages, read_messages};

/// Metadata extracted from a session file at discovery time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionMetadata {
    /// Display name of the project the session ran in.
    pub project_name: String,
    /// Filesystem path of that project, best effort.
    pub project_path: String,
    /// First user prompt, truncated.
    pub first_message: Option<String>,
    pub is_subagent: bool,
    pub parent_session_id: Option<String>,
}

/// A fully resolved CLI invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    /// Working directory to spawn in, when the backend needs one.
    pub cwd: Option<PathBuf>,
}

impl CommandSpec {
    /// Create a command for `program` with no arguments.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
        }
    }

    /// Append an argument (builder pattern).
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Shell-quoted rendering for logs.
    #[must_use]
    pub fn display(&self) -> String {
        std::iter::once(&self.program)
            .chain(&self.args)
            .map(|part| shell_escape::escape(part.as_str().into()).into_owned())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Options shared by the send, fork and new-session commands.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendOptions {
    pub skip_permissions: bool,
    pub add_dirs: Vec<String>,
}

/// A pluggable transcript source.
pub trait Backend: Send + Sync + Debug {
    /// Stable identifier, e.g. `claude_code`.
    fn name(&self) -> &'static str;

    /// Root directory holding this backend's session files.
    fn projects_dir(&self) -> &Path;

    /// Line format used to tail this backend's files.
    fn line_format(&self) -> Arc<dyn LineFormat>;

    /// Session id for a session file.
    fn session_id(&self, path: &Path) -> String;

    /// Whether `path` belongs to this backend.
    fn owns_path(&self, path: &Path) -> bool {
        path.starts_with(self.projects_dir())
    }

    /// Whether changes to `path` are relevant to the live pipeline.
    fn should_watch_file(&self, path: &Path, include_subagents: bool) -> bool;

    /// Whether `path` is a side-car summary file rather than a transcript.
    fn is_summary_file(&self, _path: &Path) -> bool {
        false
    }

    /// Side-car summary file for a transcript, when the backend writes one.
    fn summary_path(&self, _path: &Path) -> Option<PathBuf> {
        None
    }

    /// Session id a changed file refers to, for transcripts and summaries alike.
    fn session_id_from_changed_file(&self, path: &Path) -> Option<String> {
        Some(self.session_id(path))
    }

    /// Most recently modified sessions that contain messages, newest first.
    fn find_recent_sessions(&self, limit: usize, include_subagents: bool) -> Vec<PathBuf>;

    /// Whether the file holds at least one conversation message.
    fn has_messages(&self, path: &Path) -> bool {
        has_messages(path, self.line_format().as_ref())
    }

    /// Extract display metadata.
    fn metadata(&self, path: &Path) -> SessionMetadata;

    /// Models accepted by the new-session command.
    fn models(&self) -> Vec<&'static str> {
        Vec::new()
    }

    /// Executable name of the agent CLI, if sending is supported.
    fn cli_command(&self) -> Option<&'static str> {
        None
    }

    /// Command that appends `message` to an existing session.
    fn build_send_command(
        &self,
        _session_id: &str,
        _message: &str,
        _options: &SendOptions,
    ) -> Option<CommandSpec> {
        None
    }

    /// Command that forks `session_id` into a new session starting with `message`.
    fn build_fork_command(
        &self,
        _session_id: &str,
        _message: &str,
        _options: &SendOptions,
    ) -> Option<CommandSpec> {
        None
    }

    /// Command that starts a brand new session.
    fn build_new_session_command(
        &self,
        _message: &str,
        _model: Option<&str>,
        _options: &SendOptions,
    ) -> Option<CommandSpec> {
        None
    }
}

/// The set of enabled backends, resolved per path.
#[derive(Debug, Clone, Default)]
pub struct BackendSet {
    backends: Vec<Arc<dyn Backend>>,
}

impl BackendSet {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a backend (builder pattern).
    #[must_use]
    pub fn with(mut self, backend: Arc<dyn Backend>) -> Self {
        self.backends.push(backend);
        self
    }

    /// Build the set from backend names, using default or overridden directories.
    ///
    /// Unknown names are logged and skipped.
    #[must_use]
    pub fn from_names(
        names: &[String],
        claude_dir: Option<PathBuf>,
        codex_dir: Option<PathBuf>,
    ) -> Self {
        let mut set = Self::new();
        for name in names {
            match name.as_str() {
                "claude_code" => {
                    if let Some(dir) = claude_dir.clone().or_else(ClaudeCodeBackend::default_dir) {
                        set = set.with(Arc::new(ClaudeCodeBackend::new(dir)));
                    }
                }
                "codex" => {
                    if let Some(dir) = codex_dir.clone().or_else(CodexBackend::default_dir) {
                        set = set.with(Arc::new(CodexBackend::new(dir)));
                    }
                }
                other => tracing::warn!(backend = %other, "Ignoring unknown backend"),
            }
        }
        set
    }

    /// All backends in registration order.
    #[must_use]
    pub fn all(&self) -> &[Arc<dyn Backend>] {
        &self.backends
    }

    /// Whether no backend is enabled.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    /// Backend owning `path`.
    #[must_use]
    pub fn for_path(&self, path: &Path) -> Option<&Arc<dyn Backend>> {
        self.backends.iter().find(|backend| backend.owns_path(path))
    }

    /// Backend by name.
    #[must_use]
    pub fn by_name(&self, name: &str) -> Option<&Arc<dyn Backend>> {
        self.backends.iter().find(|backend| backend.name() == name)
    }

    /// Recent sessions across every backend, newest first, at most `limit`.
    #[must_use]
    pub fn find_recent_sessions(&self, limit: usize, include_subagents: bool) -> Vec<PathBuf> {
        let mut all: Vec<(PathBuf, std::time::SystemTime)> = self
            .backends
            .iter()
            .flat_map(|backend| backend.find_recent_sessions(limit, include_subagents))
            .filter_map(|path| {
                let modified = std::fs::metadata(&path).ok()?.modified().ok()?;
                Some((path, modified))
            })
            .collect();
        all.sort_by(|a, b| b.1.cmp(&a.1));
        all.into_iter().take(limit).map(|(path, _)| path).collect()
    }
}
