//! Colored terminal output for the binary.

use owo_colors::OwoColorize;

use crate::backends::BackendSet;

/// Startup banner with the dashboard URL and enabled backends.
#[must_use]
pub fn banner(address: &str, backends: &BackendSet, sessions: usize, send_enabled: bool) -> String {
    let mut lines = vec![
        format!("{} {}", "vibedeck".bold().cyan(), env!("CARGO_PKG_VERSION").dimmed()),
        format!("  {} http://{address}", "dashboard".green()),
    ];
    for backend in backends.all() {
        lines.push(format!(
            "  {} {} ({})",
            "backend".blue(),
            backend.name(),
            backend.projects_dir().display()
        ));
    }
    lines.push(format!("  {} {sessions} tracked", "sessions".blue()));
    if !send_enabled {
        lines.push(format!("  {}", "sending disabled".yellow()));
    }
    lines.join("\n")
}

/// Print the startup banner to stdout.
pub fn print_banner(address: &str, backends: &BackendSet, sessions: usize, send_enabled: bool) {
    println!("{}", banner(address, backends, sessions, send_enabled));
}
