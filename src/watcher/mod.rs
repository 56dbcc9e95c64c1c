//! File watching and the live update pipeline.

mod error;
mod fs_watcher;
mod pipeline;

pub use error::WatcherError;
pub use fs_watcher::{DirectoryWatcher, WatchEvent, DEFAULT_DEBOUNCE};
pub use pipeline::{LivePipeline, DEFAULT_SWEEP_INTERVAL};
