use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use chronicle_core::{ExpectedVersion, StreamId};
use chronicle_events::{NewEvent, RecordedEvent};

/// Outcome of a successful append.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppendResult {
    /// Stream version after the append (= version of the last event written).
    pub stream_version: u64,
    /// The persisted events, now carrying version, position, and append time.
    pub events: Vec<RecordedEvent>,
}

/// Event store operation error.
///
/// Every variant carries enough structured context for the caller to decide
/// on recovery; none of them is a generic failure with only a message.
#[derive(Debug, Clone, Error)]
pub enum EventStoreError {
    /// Optimistic concurrency check failed. Recoverable: reload the
    /// aggregate, reapply the change, retry. The store never retries on its
    /// own — blind retry could reapply business logic against stale
    /// assumptions.
    #[error(
        "optimistic concurrency check failed on stream {stream_id}: expected version {expected}, actual {actual}"
    )]
    Conflict {
        stream_id: StreamId,
        expected: u64,
        actual: u64,
    },

    /// The configured backend could not be reached. The append is
    /// all-or-nothing: on this error, none of the batch was persisted.
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),

    /// Invalid event data or stream state.
    #[error("invalid append: {0}")]
    InvalidAppend(String),
}

/// Append-only, stream-scoped event store.
///
/// Events are organized into **streams**, one per aggregate instance. Within
/// a stream, versions are exactly `1, 2, 3, …` with no gaps and no
/// duplicates. Across streams, `read_all` exposes a best-effort commit order
/// via the strictly increasing global `position`.
///
/// ## Implementation requirements
///
/// - enforce optimistic concurrency: the check-then-write in `append` must be
///   a single atomic unit per stream, so at most one concurrent caller
///   observes a given expected version as valid
/// - assign contiguous versions starting at `current + 1`, in batch order
/// - ensure atomicity: all events in a batch are persisted or none are
/// - appends to different streams must not block each other
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Short backend name for health reporting (e.g. "in-memory", "postgres").
    fn backend(&self) -> &'static str;

    /// Append events to a stream under an optimistic-concurrency check.
    ///
    /// An empty batch still performs the version check and returns the
    /// current stream version.
    async fn append(
        &self,
        stream_id: StreamId,
        events: Vec<NewEvent>,
        expected: ExpectedVersion,
    ) -> Result<AppendResult, EventStoreError>;

    /// Events with `version > from_version`, ascending, capped at
    /// `max_count`. Unknown streams and out-of-range cursors yield an empty
    /// list, not an error.
    async fn read_stream(
        &self,
        stream_id: StreamId,
        from_version: u64,
        max_count: usize,
    ) -> Result<Vec<RecordedEvent>, EventStoreError>;

    /// Global commit-ordered view across all streams: events with
    /// `position > from_position`, ascending by position, capped at
    /// `max_count`. This is the pagination surface for projection rebuilds.
    async fn read_all(
        &self,
        from_position: u64,
        max_count: usize,
    ) -> Result<Vec<RecordedEvent>, EventStoreError>;

    /// Backend reachability probe.
    async fn ping(&self) -> Result<(), EventStoreError>;
}

#[async_trait]
impl<S> EventStore for Arc<S>
where
    S: EventStore + ?Sized,
{
    fn backend(&self) -> &'static str {
        (**self).backend()
    }

    async fn append(
        &self,
        stream_id: StreamId,
        events: Vec<NewEvent>,
        expected: ExpectedVersion,
    ) -> Result<AppendResult, EventStoreError> {
        (**self).append(stream_id, events, expected).await
    }

    async fn read_stream(
        &self,
        stream_id: StreamId,
        from_version: u64,
        max_count: usize,
    ) -> Result<Vec<RecordedEvent>, EventStoreError> {
        (**self).read_stream(stream_id, from_version, max_count).await
    }

    async fn read_all(
        &self,
        from_position: u64,
        max_count: usize,
    ) -> Result<Vec<RecordedEvent>, EventStoreError> {
        (**self).read_all(from_position, max_count).await
    }

    async fn ping(&self) -> Result<(), EventStoreError> {
        (**self).ping().await
    }
}
