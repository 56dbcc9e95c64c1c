//! Session path utilities for Claude Code.
//!
//! Layout:
//! `~/.claude/projects/<folder>/<session>.jsonl`, with subagent transcripts at
//! `~/.claude/projects/<folder>/<parent-session>/subagents/agent-<id>.jsonl`
//! and summaries at `<folder>/<session>_summary.json`.

use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

const SUMMARY_SUFFIX: &str = "_summary.json";

/// Path segments after which the remainder of a folder name is the project.
const PROJECT_MARKERS: [&str; 7] = [
    "-projects-",
    "-repos-",
    "-src-",
    "-code-",
    "-github-",
    "-tmp-",
    "-os-",
];

static HOME_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^-(?:Users|home)-[^-]+-(.+)$").expect("home prefix pattern is valid")
});

/// Default projects directory, `~/.claude/projects`.
#[must_use]
pub fn default_projects_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".claude").join("projects"))
}

/// Session id of a transcript (file stem).
#[must_use]
pub fn session_id(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Whether a transcript belongs to a subagent (`agent-<id>.jsonl`).
#[must_use]
pub fn is_subagent_session(path: &Path) -> bool {
    path.file_name()
        .is_some_and(|name| name.to_string_lossy().starts_with("agent-"))
}

/// Parent session id of a subagent transcript stored under `<parent>/subagents/`.
#[must_use]
pub fn parent_session_id(path: &Path) -> Option<String> {
    if !is_subagent_session(path) {
        return None;
    }
    let subagents = path.parent()?;
    if subagents.file_name()? != "subagents" {
        return None;
    }
    Some(subagents.parent()?.file_name()?.to_string_lossy().into_owned())
}

/// Whether `path` is a `<session>_summary.json` side-car.
#[must_use]
pub fn is_summary_file(path: &Path) -> bool {
    path.file_name()
        .is_some_and(|name| name.to_string_lossy().ends_with(SUMMARY_SUFFIX))
}

/// Session id a summary file belongs to.
#[must_use]
pub fn session_id_from_summary_file(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_str()?;
    name.strip_suffix(SUMMARY_SUFFIX).map(str::to_string)
}

/// Summary side-car path for a transcript.
#[must_use]
pub fn summary_path(path: &Path) -> PathBuf {
    let id = session_id(path);
    path.with_file_name(format!("{id}{SUMMARY_SUFFIX}"))
}

/// Whether a changed file is a transcript or summary worth reacting to.
#[must_use]
pub fn should_watch_file(path: &Path, include_subagents: bool) -> bool {
    if path.extension().is_some_and(|ext| ext == "jsonl") {
        return include_subagents || !is_subagent_session(path);
    }
    is_summary_file(path)
}

/// Project folder (`-Users-me-code-proj`) a transcript lives in.
#[must_use]
pub fn project_folder(path: &Path) -> Option<&Path> {
    let parent = path.parent()?;
    if parent.file_name().is_some_and(|name| name == "subagents") {
        parent.parent()?.parent()
    } else {
        Some(parent)
    }
}

/// Decode a project folder name into `(project_name, project_path)`.
///
/// Dashes in the folder stand for `/`, `.` or `_` in the original path, so
/// candidate paths are checked on disk first. Without a match the name
/// falls back to well-known path markers.
#[must_use]
pub fn decode_project_folder(folder: &str) -> (String, String) {
    let decoded =
        urlencoding::decode(folder).map_or_else(|_| folder.to_string(), Cow::into_owned);
    let trimmed = decoded.trim_start_matches('-');

    let mut variants = vec![trimmed.to_string()];
    if trimmed.contains("--") {
        variants.push(trimmed.replace("--", "-."));
    }
    for variant in &variants {
        if let Some(found) = find_project_path(variant) {
            return found;
        }
    }

    (fallback_project_name(&decoded), trimmed.to_string())
}

fn find_project_path(variant: &str) -> Option<(String, String)> {
    let dashes: Vec<usize> = variant
        .char_indices()
        .filter(|(_, c)| *c == '-')
        .map(|(i, _)| i)
        .collect();

    for separators in (1..=dashes.len()).rev() {
        for window in dashes.windows(separators) {
            let mut candidate = variant.as_bytes().to_vec();
            for &pos in window {
                candidate[pos] = b'/';
            }
            let candidate = format!("/{}", String::from_utf8_lossy(&candidate));
            if let Some(found) = existing_dir(&candidate) {
                return Some(found);
            }
            let underscored = candidate.replace('-', "_");
            if let Some(found) = existing_dir(&underscored) {
                return Some(found);
            }
        }
    }
    None
}

fn existing_dir(candidate: &str) -> Option<(String, String)> {
    let path = Path::new(candidate);
    if !path.is_dir() {
        return None;
    }
    let name = path.file_name()?.to_string_lossy().into_owned();
    Some((name, candidate.to_string()))
}

fn fallback_project_name(folder: &str) -> String {
    for marker in PROJECT_MARKERS {
        if let Some(idx) = folder.find(marker) {
            let rest = &folder[idx + marker.len()..];
            if !rest.is_empty() {
                return rest.to_string();
            }
        }
    }
    if let Some(captures) = HOME_PREFIX.captures(folder) {
        return captures[1].to_string();
    }
    folder.trim_start_matches('-').to_string()
}
