//! Publish/subscribe channel for committed events.
//!
//! The bus is the **transport layer** after persistence: events are stored
//! first, then broadcast. It provides at-least-once, commit-order delivery to
//! every subscriber; consumers must be idempotent. The event store remains
//! the source of truth — the bus never persists anything.
//!
//! One channel carries all events; filtering happens on the consumer side via
//! [`EventSelection`], so dispatch is never keyed by dynamically built
//! channel names.

use std::collections::HashSet;

use tokio::sync::broadcast;
use tracing::warn;

use crate::event::RecordedEvent;

/// Which event types a subscriber cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventSelection {
    /// Every event, regardless of type.
    All,
    /// Only events whose type is in the set.
    Types(HashSet<String>),
}

impl EventSelection {
    pub fn types<I, T>(types: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self::Types(types.into_iter().map(Into::into).collect())
    }

    pub fn matches(&self, event_type: &str) -> bool {
        match self {
            EventSelection::All => true,
            EventSelection::Types(set) => set.contains(event_type),
        }
    }
}

/// Broadcast channel for committed events.
///
/// Cloning the bus is cheap; all clones share the same channel. Publishing
/// when no subscriber exists is not an error — events are already durable in
/// the store and can be replayed.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<RecordedEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Broadcast a committed event to all current subscribers.
    pub fn publish(&self, event: RecordedEvent) {
        // send only fails when there are no receivers; that's fine here.
        let _ = self.tx.send(event);
    }

    /// Subscribe to every event.
    pub fn subscribe(&self) -> Subscription {
        self.subscribe_to(EventSelection::All)
    }

    /// Subscribe to a filtered view of the stream.
    pub fn subscribe_to(&self, selection: EventSelection) -> Subscription {
        Subscription {
            rx: self.tx.subscribe(),
            selection,
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

/// A filtered subscription to the event bus.
///
/// Events arrive in publish (= commit) order. A subscriber that falls behind
/// the channel capacity loses the oldest events; that is logged and the
/// subscription continues — the store can always be replayed to recover.
#[derive(Debug)]
pub struct Subscription {
    rx: broadcast::Receiver<RecordedEvent>,
    selection: EventSelection,
}

impl Subscription {
    /// Wait for the next matching event. Returns `None` once the bus is
    /// dropped and the backlog is drained.
    pub async fn recv(&mut self) -> Option<RecordedEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) if self.selection.matches(&event.event_type) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "subscription lagged behind the event bus");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking variant: the next matching event already in the channel,
    /// or `None` if the channel is empty or closed.
    pub fn try_recv(&mut self) -> Option<RecordedEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) if self.selection.matches(&event.event_type) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "subscription lagged behind the event bus");
                    continue;
                }
                Err(_) => return None,
            }
        }
    }
}
