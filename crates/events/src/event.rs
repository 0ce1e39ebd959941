use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use chronicle_core::{ActorId, EventId, StreamId};

/// A domain-agnostic event.
///
/// Events are:
/// - **immutable** (treat them as facts)
/// - designed to be **append-only**
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable event name/type identifier (e.g. "booking.session.created").
    fn event_type(&self) -> &'static str;

    /// When the event occurred (business time).
    fn occurred_at(&self) -> DateTime<Utc>;
}

/// Correlation context attached to an event.
///
/// Causal relationships across streams are expressed here, never inferred
/// from `read_all` inspection order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMetadata {
    /// Ties together all events of one logical operation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<Uuid>,

    /// The event that directly caused this one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub causation_id: Option<Uuid>,

    /// The user on whose behalf the event was raised.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor: Option<ActorId>,
}

/// An event ready to be appended to a stream (not yet assigned a version).
///
/// The event store assigns the per-stream version and global position during
/// append; until then the event only carries its identity, type, payload,
/// metadata, and business timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEvent {
    pub event_id: EventId,
    pub event_type: String,
    pub data: JsonValue,
    pub metadata: EventMetadata,
    pub occurred_at: DateTime<Utc>,
}

impl NewEvent {
    /// Create an unpersisted event with a fresh id, stamped with the current time.
    pub fn new(event_type: impl Into<String>, data: JsonValue) -> Self {
        Self {
            event_id: EventId::new(),
            event_type: event_type.into(),
            data,
            metadata: EventMetadata::default(),
            occurred_at: Utc::now(),
        }
    }

    pub fn with_metadata(mut self, metadata: EventMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Convenience constructor from a typed domain event.
    ///
    /// Serializes the payload while preserving the event metadata needed for
    /// later deserialization.
    pub fn from_typed<E>(event: &E) -> Result<Self, serde_json::Error>
    where
        E: Event + Serialize,
    {
        Ok(Self {
            event_id: EventId::new(),
            event_type: event.event_type().to_string(),
            data: serde_json::to_value(event)?,
            metadata: EventMetadata::default(),
            occurred_at: event.occurred_at(),
        })
    }
}

/// An event persisted in an append-only stream.
///
/// `version` is the position within its stream: contiguous, starting at 1,
/// unique per stream. `position` is the strictly increasing global sequence
/// across all streams; `read_all` pagination and rebuild watermarks use
/// `position` only, never the per-stream version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedEvent {
    pub event_id: EventId,
    pub stream_id: StreamId,

    /// Monotonically increasing position within the stream.
    pub version: u64,

    /// Strictly increasing commit-order position across all streams.
    pub position: u64,

    pub event_type: String,
    pub data: JsonValue,
    pub metadata: EventMetadata,

    /// Business time, carried over from the unpersisted event.
    pub occurred_at: DateTime<Utc>,

    /// Append time, stamped by the store.
    pub recorded_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Serialize)]
    struct SessionBooked {
        tutor: String,
        occurred_at: DateTime<Utc>,
    }

    impl Event for SessionBooked {
        fn event_type(&self) -> &'static str {
            "booking.session.booked"
        }

        fn occurred_at(&self) -> DateTime<Utc> {
            self.occurred_at
        }
    }

    #[test]
    fn from_typed_captures_type_and_payload() {
        let booked = SessionBooked {
            tutor: "ada".to_string(),
            occurred_at: Utc::now(),
        };

        let event = NewEvent::from_typed(&booked).unwrap();
        assert_eq!(event.event_type, "booking.session.booked");
        assert_eq!(event.data["tutor"], "ada");
        assert_eq!(event.occurred_at, booked.occurred_at);
    }

    #[test]
    fn new_events_get_distinct_ids() {
        let a = NewEvent::new("booking.session.booked", JsonValue::Null);
        let b = NewEvent::new("booking.session.booked", JsonValue::Null);
        assert_ne!(a.event_id, b.event_id);
    }
}
