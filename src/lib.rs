//! Vibedeck - live dashboard for AI coding-agent session transcripts.

pub mod backends;
pub mod broadcast;
pub mod config;
pub mod dashboard;
pub mod display;
pub mod export;
pub mod registry;
pub mod relay;
pub mod render;
pub mod search;
pub mod session;
pub mod watcher;
