//! Claude CLI invocations.

use crate::backends::{CommandSpec, SendOptions};

/// Executable name of the Claude CLI.
pub const CLI_COMMAND: &str = "claude";

/// Model aliases accepted by `--model`.
pub const MODELS: [&str; 6] = [
    "opus",
    "sonnet",
    "haiku",
    "claude-opus-4-5",
    "claude-sonnet-4-5",
    "claude-haiku-4-5",
];

fn with_options(mut spec: CommandSpec, options: &SendOptions) -> CommandSpec {
    for dir in &options.add_dirs {
        spec = spec.arg("--add-dir").arg(dir);
    }
    if options.skip_permissions {
        spec = spec.arg("--dangerously-skip-permissions");
    }
    spec
}

/// `claude -p <message> --resume <session>`
#[must_use]
pub fn build_send_command(session_id: &str, message: &str, options: &SendOptions) -> CommandSpec {
    let spec = CommandSpec::new(CLI_COMMAND)
        .arg("-p")
        .arg(message)
        .arg("--resume")
        .arg(session_id);
    with_options(spec, options)
}

/// `claude -p <message> --resume <session> --fork-session`
#[must_use]
pub fn build_fork_command(session_id: &str, message: &str, options: &SendOptions) -> CommandSpec {
    let spec = CommandSpec::new(CLI_COMMAND)
        .arg("-p")
        .arg(message)
        .arg("--resume")
        .arg(session_id)
        .arg("--fork-session");
    with_options(spec, options)
}

/// `claude -p <message> [--model <model>]`
#[must_use]
pub fn build_new_session_command(
    message: &str,
    model: Option<&str>,
    options: &SendOptions,
) -> CommandSpec {
    let mut spec = CommandSpec::new(CLI_COMMAND).arg("-p").arg(message);
    if let Some(model) = model {
        spec = spec.arg("--model").arg(model);
    }
    with_options(spec, options)
}
