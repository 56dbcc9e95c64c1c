//! Broadcast hub with two independent subscriber sets.
//!
//! Delivery never blocks: each subscriber owns a bounded queue, and a
//! subscriber whose queue is full or closed is removed from its set. The
//! event itself is never retried.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::task::{Context, Poll};

use serde::Serialize;
use serde_json::json;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::event::{BroadcastEvent, SessionStatus, SubscriberKind};
use crate::session::NormalizedMessage;

/// Default per-subscriber queue capacity.
pub const DEFAULT_SUBSCRIBER_CAPACITY: usize = 100;

/// Opaque subscriber handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

type SubscriberSet = HashMap<SubscriberId, mpsc::Sender<BroadcastEvent>>;

/// Fans events out to rich and structured subscribers.
#[derive(Debug)]
pub struct BroadcastHub {
    rich: Mutex<SubscriberSet>,
    structured: Mutex<SubscriberSet>,
    capacity: usize,
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new()
    }
}

impl BroadcastHub {
    /// Create a hub with empty sets and the default queue capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_SUBSCRIBER_CAPACITY)
    }

    /// Create a hub whose [`subscribe`](Self::subscribe) queues hold `capacity` events.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            rich: Mutex::new(HashMap::new()),
            structured: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    fn set(&self, kind: SubscriberKind) -> MutexGuard<'_, SubscriberSet> {
        let set = match kind {
            SubscriberKind::Rich => &self.rich,
            SubscriberKind::Structured => &self.structured,
        };
        set.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register an externally created queue.
    pub fn add(&self, kind: SubscriberKind, sender: mpsc::Sender<BroadcastEvent>) -> SubscriberId {
        let id = SubscriberId::new();
        self.set(kind).insert(id, sender);
        tracing::debug!(kind = kind.as_str(), "Subscriber added");
        id
    }

    /// Deregister a subscriber. Removing an absent subscriber is a no-op.
    pub fn remove(&self, kind: SubscriberKind, id: SubscriberId) -> bool {
        self.set(kind).remove(&id).is_some()
    }

    /// Whether `id` is currently registered in the `kind` set.
    #[must_use]
    pub fn contains(&self, kind: SubscriberKind, id: SubscriberId) -> bool {
        self.set(kind).contains_key(&id)
    }

    /// Number of subscribers in the `kind` set.
    #[must_use]
    pub fn subscriber_count(&self, kind: SubscriberKind) -> usize {
        self.set(kind).len()
    }

    /// Whether the `kind` set is non-empty.
    #[must_use]
    pub fn has_subscribers(&self, kind: SubscriberKind) -> bool {
        self.subscriber_count(kind) > 0
    }

    /// Open a subscription with the hub's default capacity.
    #[must_use]
    pub fn subscribe(self: &Arc<Self>, kind: SubscriberKind) -> Subscription {
        self.subscribe_with_capacity(kind, self.capacity)
    }

    /// Open a subscription with an explicit queue capacity.
    ///
    /// The subscription deregisters itself when dropped.
    #[must_use]
    pub fn subscribe_with_capacity(
        self: &Arc<Self>,
        kind: SubscriberKind,
        capacity: usize,
    ) -> Subscription {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let id = self.add(kind, tx);
        Subscription {
            id,
            kind,
            rx,
            hub: Arc::downgrade(self),
        }
    }

    /// Send to rich subscribers only.
    pub fn broadcast_rich(&self, name: &str, data: serde_json::Value) -> usize {
        self.deliver(SubscriberKind::Rich, &BroadcastEvent::new(name, data))
    }

    /// Send to structured subscribers only.
    pub fn broadcast_structured_event(&self, name: &str, data: serde_json::Value) -> usize {
        self.deliver(SubscriberKind::Structured, &BroadcastEvent::new(name, data))
    }

    /// Send a normalized message to structured subscribers as a `message` event.
    pub fn broadcast_structured_message(
        &self,
        session_id: &str,
        message: &NormalizedMessage,
    ) -> usize {
        if !self.has_subscribers(SubscriberKind::Structured) {
            return 0;
        }
        self.broadcast_structured_event(
            "message",
            json!({ "session_id": session_id, "message": message }),
        )
    }

    /// Send a rendered fragment to rich subscribers as a `message` event.
    pub fn broadcast_rich_message(&self, session_id: &str, html: &str) -> usize {
        self.broadcast_rich(
            "message",
            json!({ "type": "html", "content": html, "session_id": session_id }),
        )
    }

    /// Send the same payload to both sets.
    pub fn broadcast_dual(&self, name: &str, data: serde_json::Value) -> usize {
        let event = BroadcastEvent::new(name, data);
        self.deliver(SubscriberKind::Rich, &event) + self.deliver(SubscriberKind::Structured, &event)
    }

    /// `session_added` with the session's info.
    pub fn session_added(&self, info: &impl Serialize) {
        match serde_json::to_value(info) {
            Ok(payload) => {
                self.broadcast_dual("session_added", payload);
            }
            Err(e) => tracing::warn!(error = %e, "Failed to serialize session info"),
        }
    }

    /// `session_removed` with `{id}`.
    pub fn session_removed(&self, session_id: &str) {
        self.broadcast_dual("session_removed", json!({ "id": session_id }));
    }

    /// `session_status` with running, queue and waiting state.
    pub fn session_status(&self, status: &SessionStatus) {
        match serde_json::to_value(status) {
            Ok(payload) => {
                self.broadcast_dual("session_status", payload);
            }
            Err(e) => tracing::warn!(error = %e, "Failed to serialize session status"),
        }
    }

    /// Replay a newly added session's history to connected subscribers.
    ///
    /// Rich subscribers get one `message` per rendered fragment. Structured
    /// subscribers get a single `session_catchup` batch.
    pub fn catchup(&self, session_id: &str, fragments: &[String], messages: &[NormalizedMessage]) {
        for html in fragments {
            self.broadcast_rich_message(session_id, html);
        }
        if !messages.is_empty() && self.has_subscribers(SubscriberKind::Structured) {
            self.broadcast_structured_event(
                "session_catchup",
                json!({ "session_id": session_id, "messages": messages }),
            );
        }
    }

    /// Drop every subscriber from both sets.
    pub fn clear(&self) {
        self.set(SubscriberKind::Rich).clear();
        self.set(SubscriberKind::Structured).clear();
    }

    /// Enqueue without blocking; returns how many subscribers accepted the event.
    fn deliver(&self, kind: SubscriberKind, event: &BroadcastEvent) -> usize {
        let snapshot: Vec<(SubscriberId, mpsc::Sender<BroadcastEvent>)> = self
            .set(kind)
            .iter()
            .map(|(id, tx)| (*id, tx.clone()))
            .collect();

        let mut delivered = 0;
        let mut dead = Vec::new();
        for (id, tx) in snapshot {
            match tx.try_send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!(kind = kind.as_str(), event = %event.name, "Dropping slow subscriber");
                    dead.push(id);
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    tracing::debug!(kind = kind.as_str(), "Dropping disconnected subscriber");
                    dead.push(id);
                }
            }
        }

        if !dead.is_empty() {
            let mut set = self.set(kind);
            for id in dead {
                set.remove(&id);
            }
        }
        delivered
    }
}

/// Receiving side of a hub subscription.
///
/// Dropping it removes the subscriber from the hub.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriberId,
    kind: SubscriberKind,
    rx: mpsc::Receiver<BroadcastEvent>,
    hub: Weak<BroadcastHub>,
}

impl Subscription {
    /// Subscriber id in the hub.
    #[must_use]
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Which set this subscription belongs to.
    #[must_use]
    pub fn kind(&self) -> SubscriberKind {
        self.kind
    }

    /// Wait for the next event. Returns `None` once the hub dropped this subscriber
    /// and the queue is drained.
    pub async fn recv(&mut self) -> Option<BroadcastEvent> {
        self.rx.recv().await
    }

    /// Take an already queued event without waiting.
    pub fn try_recv(&mut self) -> Option<BroadcastEvent> {
        self.rx.try_recv().ok()
    }
}

impl futures_core::Stream for Subscription {
    type Item = BroadcastEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().rx.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            hub.remove(self.kind, self.id);
        }
    }
}
