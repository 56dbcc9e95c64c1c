//! Session transcript reading.
//!
//! Normalized message model, the per-backend line format strategy, and the
//! incremental tailer that drives it.

mod format;
mod message;
mod tailer;

pub use format::{assistant_finished_turn, Entry, LineFormat, SimpleFormat};
pub use message::{ContentBlock, NormalizedMessage, Role, Usage};
pub use tailer::{Tailer, READ_CHUNK};
