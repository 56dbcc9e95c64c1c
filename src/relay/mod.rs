//! Relays user messages from the dashboard to the agent CLI.
//!
//! Each session runs at most one CLI process at a time. Messages sent while
//! a run is in flight are queued and sent in order once it exits.

mod error;
mod process;

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tokio::process::Child;

use crate::backends::{CommandSpec, SendOptions};
use crate::broadcast::{BroadcastHub, SessionStatus};
use crate::registry::{SessionRecord, SessionRegistry};

pub use error::{RelayError, SpawnError};

/// Relay behaviour switches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelayOptions {
    pub enabled: bool,
    /// Fork into a new session instead of appending to the existing one.
    pub fork: bool,
    pub send: SendOptions,
}

/// What happened to a sent message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SendOutcome {
    /// A CLI run was started.
    Sent,
    /// A run is in flight; the message waits at `position` (1-based).
    Queued { position: usize },
}

/// Starts CLI runs and tracks their state per session.
#[derive(Debug)]
pub struct MessageRelay {
    registry: Arc<SessionRegistry>,
    hub: Arc<BroadcastHub>,
    options: RelayOptions,
}

impl MessageRelay {
    #[must_use]
    pub fn new(registry: Arc<SessionRegistry>, hub: Arc<BroadcastHub>, options: RelayOptions) -> Self {
        Self {
            registry,
            hub,
            options,
        }
    }

    #[must_use]
    pub fn options(&self) -> &RelayOptions {
        &self.options
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.options.enabled
    }

    /// Send `message` to a session, or queue it behind the current run.
    ///
    /// # Errors
    ///
    /// Fails when sending is disabled, the message is blank, the session is
    /// unknown, its backend cannot send, or the CLI cannot be spawned.
    pub async fn send(self: &Arc<Self>, session_id: &str, message: &str) -> Result<SendOutcome, RelayError> {
        if !self.options.enabled {
            return Err(RelayError::SendDisabled);
        }
        let message = message.trim();
        if message.is_empty() {
            return Err(RelayError::EmptyMessage);
        }
        let record = self
            .registry
            .get(session_id)
            .ok_or_else(|| RelayError::SessionNotFound(session_id.to_string()))?;

        if self.options.fork {
            let child = self.spawn_for(&record, message)?;
            let id = record.id().to_string();
            tokio::spawn(async move { process::wait_and_log(child, &id).await });
            return Ok(SendOutcome::Sent);
        }

        let queued = {
            let mut run = record.run_state();
            if run.running {
                run.queue.push_back(message.to_string());
                Some(run.queue.len())
            } else {
                run.running = true;
                None
            }
        };
        if let Some(position) = queued {
            tracing::info!(session_id, position, "Message queued");
            self.publish_status(&record).await;
            return Ok(SendOutcome::Queued { position });
        }

        let child = match self.spawn_for(&record, message) {
            Ok(child) => child,
            Err(e) => {
                record.run_state().finish();
                return Err(e);
            }
        };
        record.run_state().pid = child.id();
        self.publish_status(&record).await;

        tokio::spawn(Arc::clone(self).drain(record, child));
        Ok(SendOutcome::Sent)
    }

    /// Interrupt the in-flight run of a session with SIGINT.
    ///
    /// # Errors
    ///
    /// Fails for unknown sessions, sessions without a run, or when the
    /// signal cannot be delivered.
    pub fn interrupt(&self, session_id: &str) -> Result<(), RelayError> {
        let record = self
            .registry
            .get(session_id)
            .ok_or_else(|| RelayError::SessionNotFound(session_id.to_string()))?;
        let pid = record
            .run_state()
            .pid
            .ok_or_else(|| RelayError::NotRunning(session_id.to_string()))?;

        process::interrupt(pid)?;
        tracing::info!(session_id, pid, "Interrupted CLI run");
        Ok(())
    }

    /// Current status of a session.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::SessionNotFound`] for unknown sessions.
    pub async fn status(&self, session_id: &str) -> Result<SessionStatus, RelayError> {
        let record = self
            .registry
            .get(session_id)
            .ok_or_else(|| RelayError::SessionNotFound(session_id.to_string()))?;
        Ok(record.status().await)
    }

    fn command_for(&self, record: &SessionRecord, message: &str) -> Result<CommandSpec, RelayError> {
        let backend = record.backend();
        let spec = if self.options.fork {
            backend.build_fork_command(record.id(), message, &self.options.send)
        } else {
            backend.build_send_command(record.id(), message, &self.options.send)
        };
        spec.ok_or_else(|| RelayError::UnsupportedBackend(backend.name().to_string()))
    }

    fn spawn_for(&self, record: &SessionRecord, message: &str) -> Result<Child, RelayError> {
        let spec = self.command_for(record, message)?;
        let project = Path::new(&record.metadata().project_path);
        let cwd = (!record.metadata().project_path.is_empty() && project.is_dir()).then_some(project);
        Ok(process::spawn(&spec, cwd)?)
    }

    /// Wait for runs to exit and start queued messages until the queue is empty.
    async fn drain(self: Arc<Self>, record: Arc<SessionRecord>, mut child: Child) {
        loop {
            process::wait_and_log(child, record.id()).await;

            let next = loop {
                // `send` checks `running` under this same lock.
                let popped = {
                    let mut run = record.run_state();
                    let message = run.queue.pop_front();
                    if message.is_none() {
                        run.finish();
                    }
                    message
                };
                let Some(message) = popped else {
                    break None;
                };
                match self.spawn_for(&record, &message) {
                    Ok(next) => {
                        record.run_state().pid = next.id();
                        break Some(next);
                    }
                    Err(e) => {
                        tracing::warn!(session_id = %record.id(), error = %e, "Dropping queued message");
                    }
                }
            };

            self.publish_status(&record).await;
            match next {
                Some(next) => child = next,
                None => return,
            }
        }
    }

    async fn publish_status(&self, record: &SessionRecord) {
        self.hub.session_status(&record.status().await);
    }
}
