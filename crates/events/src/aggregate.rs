//! Aggregate contract for event-sourced state.
//!
//! An aggregate is split in two:
//!
//! - [`AggregateState`]: the domain-specific, deterministic state machine.
//!   Implementations dispatch on the event type and mutate their fields.
//! - [`AggregateRoot`]: the generic shell that owns the stream identity,
//!   version tracking, and the uncommitted-event queue.
//!
//! Aggregates must not perform IO. Replaying a stream's events through
//! `apply_event` must always produce the same state, whether or not a
//! snapshot was used as the starting point.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use thiserror::Error;

use chronicle_core::StreamId;

use crate::event::{EventMetadata, NewEvent, RecordedEvent};

/// Failed to restore aggregate state from snapshot data.
#[derive(Debug, Error)]
#[error("failed to restore {aggregate_type} state from snapshot: {source}")]
pub struct RestoreError {
    pub aggregate_type: &'static str,
    #[source]
    pub source: serde_json::Error,
}

/// Domain-specific aggregate state, evolved purely from events.
///
/// `apply_event` dispatches on the event type string. Unknown event types
/// must be a no-op, not an error: newer code may introduce event types that
/// older readers replay over.
pub trait AggregateState: Default + Serialize + DeserializeOwned + Send + Sync {
    /// Stable aggregate type name (e.g. "booking.session").
    fn aggregate_type() -> &'static str;

    /// Evolve state from a single event. Deterministic, no IO.
    fn apply_event(&mut self, event_type: &str, data: &JsonValue);
}

/// Caller-owned reconstruction of one stream's current state.
///
/// `version` is the last version applied from the stream. Events raised via
/// [`AggregateRoot::raise`] mutate local state immediately but stay queued as
/// uncommitted until the caller appends them and calls `mark_committed`. If
/// the append fails with a concurrency conflict the queue is untouched, so
/// the caller can reload, reapply its change, and retry without data loss.
#[derive(Debug)]
pub struct AggregateRoot<S> {
    id: StreamId,
    version: u64,
    state: S,
    uncommitted: Vec<NewEvent>,
}

impl<S> AggregateRoot<S>
where
    S: AggregateState,
{
    /// Fresh aggregate at version 0 (before any events).
    pub fn new(id: StreamId) -> Self {
        Self {
            id,
            version: 0,
            state: S::default(),
            uncommitted: Vec::new(),
        }
    }

    /// Restore an aggregate from snapshot state taken at `version`.
    pub fn from_snapshot_state(
        id: StreamId,
        version: u64,
        state: &JsonValue,
    ) -> Result<Self, RestoreError> {
        let state = serde_json::from_value(state.clone()).map_err(|source| RestoreError {
            aggregate_type: S::aggregate_type(),
            source,
        })?;

        Ok(Self {
            id,
            version,
            state,
            uncommitted: Vec::new(),
        })
    }

    pub fn id(&self) -> StreamId {
        self.id
    }

    /// Last committed stream version applied to this aggregate.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn state(&self) -> &S {
        &self.state
    }

    /// Apply a committed event from the stream, advancing the version.
    ///
    /// Used during reconstruction; never queues uncommitted events.
    pub fn apply_recorded(&mut self, event: &RecordedEvent) {
        self.state.apply_event(&event.event_type, &event.data);
        self.version = event.version;
    }

    /// Raise a new domain event: apply it to local state immediately and
    /// queue it for persistence.
    ///
    /// The caller sees the effect before the event is appended; the stream
    /// version only advances once the append succeeds and `mark_committed`
    /// is called.
    pub fn raise(
        &mut self,
        event_type: impl Into<String>,
        data: JsonValue,
        metadata: EventMetadata,
    ) -> &NewEvent {
        let event = NewEvent::new(event_type, data).with_metadata(metadata);
        self.state.apply_event(&event.event_type, &event.data);
        self.uncommitted.push(event);
        self.uncommitted.last().unwrap()
    }

    /// Events raised but not yet appended to the log.
    pub fn uncommitted_events(&self) -> &[NewEvent] {
        &self.uncommitted
    }

    pub fn has_uncommitted_events(&self) -> bool {
        !self.uncommitted.is_empty()
    }

    /// Clear the uncommitted queue after a successful append and advance to
    /// the new stream version.
    pub fn mark_committed(&mut self, new_version: u64) {
        self.uncommitted.clear();
        self.version = new_version;
    }

    /// Serialize the derived state for snapshotting (uncommitted events are
    /// never part of a snapshot).
    pub fn snapshot_state(&self) -> Result<JsonValue, serde_json::Error> {
        serde_json::to_value(&self.state)
    }
}
