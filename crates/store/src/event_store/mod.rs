//! Append-only event store boundary.
//!
//! The `EventStore` trait is the storage seam: the engine holds one abstract
//! handle, chosen once at construction (in-memory for tests/dev, Postgres for
//! production).

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryEventStore;
pub use postgres::PostgresEventStore;
pub use r#trait::{AppendResult, EventStore, EventStoreError};

use async_trait::async_trait;

use chronicle_core::{ExpectedVersion, StreamId};
use chronicle_events::{EventBus, NewEvent, RecordedEvent};

/// Adapter that broadcasts committed events after a successful append.
///
/// Ordering invariant: **publish happens only after append succeeds**, and
/// events are published in the order they were persisted. On append failure
/// nothing is published.
pub struct PublishingEventStore<S> {
    store: S,
    bus: EventBus,
}

impl<S> PublishingEventStore<S> {
    pub fn new(store: S, bus: EventBus) -> Self {
        Self { store, bus }
    }

    /// The bus committed events are broadcast on.
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn into_parts(self) -> (S, EventBus) {
        (self.store, self.bus)
    }
}

#[async_trait]
impl<S> EventStore for PublishingEventStore<S>
where
    S: EventStore,
{
    fn backend(&self) -> &'static str {
        self.store.backend()
    }

    async fn append(
        &self,
        stream_id: StreamId,
        events: Vec<NewEvent>,
        expected: ExpectedVersion,
    ) -> Result<AppendResult, EventStoreError> {
        // 1) Append (durable step)
        let result = self.store.append(stream_id, events, expected).await?;

        // 2) Broadcast committed events in persistence order
        for event in &result.events {
            self.bus.publish(event.clone());
        }

        Ok(result)
    }

    async fn read_stream(
        &self,
        stream_id: StreamId,
        from_version: u64,
        max_count: usize,
    ) -> Result<Vec<RecordedEvent>, EventStoreError> {
        self.store.read_stream(stream_id, from_version, max_count).await
    }

    async fn read_all(
        &self,
        from_position: u64,
        max_count: usize,
    ) -> Result<Vec<RecordedEvent>, EventStoreError> {
        self.store.read_all(from_position, max_count).await
    }

    async fn ping(&self) -> Result<(), EventStoreError> {
        self.store.ping().await
    }
}
