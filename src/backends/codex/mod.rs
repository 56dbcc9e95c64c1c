//! Codex CLI backend.

mod format;

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use uuid::Uuid;

use crate::backends::scan::{collect_jsonl_files, first_user_message, has_messages};
use crate::backends::{Backend, CommandSpec, SendOptions, SessionMetadata};
use crate::session::LineFormat;

pub use format::CodexFormat;
use format::RolloutRecord;

/// Executable name of the Codex CLI.
pub const CLI_COMMAND: &str = "codex";

const ROLLOUT_PREFIX: &str = "rollout-";

/// Length of a hyphenated UUID.
const UUID_LEN: usize = 36;

/// Rollout transcripts under `~/.codex/sessions`.
#[derive(Debug, Clone)]
pub struct CodexBackend {
    sessions_dir: PathBuf,
    format: Arc<CodexFormat>,
}

impl CodexBackend {
    /// Create a backend rooted at `sessions_dir`.
    #[must_use]
    pub fn new(sessions_dir: PathBuf) -> Self {
        Self {
            sessions_dir,
            format: Arc::new(CodexFormat),
        }
    }

    /// `~/.codex/sessions`, if the home directory is known.
    #[must_use]
    pub fn default_dir() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".codex").join("sessions"))
    }
}

/// Whether `path` is a rollout transcript.
#[must_use]
pub fn is_rollout_file(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "jsonl")
        && path
            .file_name()
            .is_some_and(|name| name.to_string_lossy().starts_with(ROLLOUT_PREFIX))
}

/// Session id of a rollout file: the trailing UUID of
/// `rollout-<timestamp>-<uuid>.jsonl`, or the whole stem when absent.
#[must_use]
pub fn rollout_session_id(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    stem.len()
        .checked_sub(UUID_LEN)
        .and_then(|start| stem.get(start..))
        .and_then(|tail| Uuid::parse_str(tail).ok())
        .map_or(stem.clone(), |id| id.to_string())
}

/// Working directory recorded in the rollout's `session_meta` record.
fn session_cwd(path: &Path) -> Option<String> {
    let file = File::open(path).ok()?;
    BufReader::new(file)
        .lines()
        .map_while(Result::ok)
        .take(5)
        .find_map(|line| match serde_json::from_str::<RolloutRecord>(&line) {
            Ok(RolloutRecord::SessionMeta(meta)) => meta.payload.cwd,
            _ => None,
        })
}

impl Backend for CodexBackend {
    fn name(&self) -> &'static str {
        "codex"
    }

    fn projects_dir(&self) -> &Path {
        &self.sessions_dir
    }

    fn line_format(&self) -> Arc<dyn LineFormat> {
        self.format.clone()
    }

    fn session_id(&self, path: &Path) -> String {
        rollout_session_id(path)
    }

    fn should_watch_file(&self, path: &Path, _include_subagents: bool) -> bool {
        is_rollout_file(path)
    }

    fn find_recent_sessions(&self, limit: usize, _include_subagents: bool) -> Vec<PathBuf> {
        if !self.sessions_dir.is_dir() {
            tracing::debug!(path = %self.sessions_dir.display(), "Codex sessions directory not found");
            return Vec::new();
        }

        collect_jsonl_files(&self.sessions_dir, is_rollout_file)
            .into_iter()
            .map(|(path, _)| path)
            .filter(|path| has_messages(path, self.format.as_ref()))
            .take(limit)
            .collect()
    }

    fn metadata(&self, path: &Path) -> SessionMetadata {
        let project_path = session_cwd(path).unwrap_or_default();
        let project_name = Path::new(&project_path)
            .file_name()
            .map_or_else(|| rollout_session_id(path), |name| name.to_string_lossy().into_owned());

        SessionMetadata {
            project_name,
            project_path,
            first_message: first_user_message(path, self.format.as_ref()),
            is_subagent: false,
            parent_session_id: None,
        }
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
        let mut spec = CommandSpec::new(CLI_COMMAND)
            .arg("exec")
            .arg("resume")
            .arg(session_id)
            .arg(message);
        if options.skip_permissions {
            spec = spec.arg("--dangerously-bypass-approvals-and-sandbox");
        }
        Some(spec)
    }

    fn build_new_session_command(
        &self,
        message: &str,
        model: Option<&str>,
        options: &SendOptions,
    ) -> Option<CommandSpec> {
        let mut spec = CommandSpec::new(CLI_COMMAND).arg("exec");
        if let Some(model) = model {
            spec = spec.arg("--model").arg(model);
        }
        if options.skip_permissions {
            spec = spec.arg("--dangerously-bypass-approvals-and-sandbox");
        }
        Some(spec.arg(message))
    }
}
