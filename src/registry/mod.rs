//! Tracked sessions and change detection.

mod error;
mod record;
mod store;

pub use error::RegistryError;
pub use record::{RunState, SessionInfo, SessionRecord, SessionSummary};
pub use store::{AddedSession, SessionRegistry, DEFAULT_MAX_SESSIONS};
