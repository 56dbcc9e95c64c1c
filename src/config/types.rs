//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::backends::SendOptions;
use crate::dashboard::{DashboardConfig, DEFAULT_PORT};
use crate::registry::DEFAULT_MAX_SESSIONS;

/// Top-level configuration loaded from TOML.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeckConfig {
    pub server: ServerConfig,
    pub sessions: SessionsConfig,
    pub backends: BackendsConfig,
    pub send: SendConfig,
}

/// HTTP server settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Allow cross-origin requests from any origin.
    pub cors_permissive: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            cors_permissive: false,
        }
    }
}

impl From<&ServerConfig> for DashboardConfig {
    fn from(config: &ServerConfig) -> Self {
        Self {
            port: config.port,
            host: config.host.clone(),
            cors_permissive: config.cors_permissive,
        }
    }
}

/// Session tracking and live update settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionsConfig {
    pub max_sessions: usize,
    pub include_subagents: bool,
    /// Seconds between catch-up sweeps over every tracked session.
    pub sweep_interval_secs: u64,
    /// File event debounce window in milliseconds.
    pub debounce_ms: u64,
    /// Queued events per subscriber before it is dropped.
    pub subscriber_capacity: usize,
}

impl SessionsConfig {
    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }

    #[must_use]
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            max_sessions: DEFAULT_MAX_SESSIONS,
            include_subagents: false,
            sweep_interval_secs: 5,
            debounce_ms: 100,
            subscriber_capacity: 100,
        }
    }
}

/// Which backends are enabled and where their transcripts live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendsConfig {
    pub enabled: Vec<String>,
    pub claude_projects_dir: Option<PathBuf>,
    pub codex_sessions_dir: Option<PathBuf>,
}

impl Default for BackendsConfig {
    fn default() -> Self {
        Self {
            enabled: vec!["claude_code".to_string(), "codex".to_string()],
            claude_projects_dir: None,
            codex_sessions_dir: None,
        }
    }
}

/// Message relay settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SendConfig {
    pub enabled: bool,
    pub skip_permissions: bool,
    /// Fork the session instead of appending to it.
    pub fork: bool,
    pub add_dirs: Vec<String>,
}

impl SendConfig {
    /// Options passed to the backend command builders.
    #[must_use]
    pub fn options(&self) -> SendOptions {
        SendOptions {
            skip_permissions: self.skip_permissions,
            add_dirs: self.add_dirs.clone(),
        }
    }
}

impl Default for SendConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            skip_permissions: false,
            fork: false,
            add_dirs: Vec::new(),
        }
    }
}
