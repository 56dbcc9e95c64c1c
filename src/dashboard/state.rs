//! Shared state handed to every handler.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::broadcast::BroadcastHub;
use crate::registry::SessionRegistry;
use crate::relay::MessageRelay;
use crate::render::MessageRenderer;
use crate::watcher::LivePipeline;

/// Application state shared across all handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    pub registry: Arc<SessionRegistry>,
    pub hub: Arc<BroadcastHub>,
    pub renderer: Arc<dyn MessageRenderer>,
    pub relay: Arc<MessageRelay>,
    /// Cancellation token for graceful shutdown.
    pub cancel: CancellationToken,
}

impl AppState {
    /// Share the pipeline's registry, hub and renderer with the HTTP layer.
    #[must_use]
    pub fn new(pipeline: &LivePipeline, relay: Arc<MessageRelay>, cancel: CancellationToken) -> Self {
        Self {
            registry: Arc::clone(pipeline.registry()),
            hub: Arc::clone(pipeline.hub()),
            renderer: Arc::clone(pipeline.renderer()),
            relay,
            cancel,
        }
    }
}
