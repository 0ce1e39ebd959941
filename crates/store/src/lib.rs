//! `chronicle-store` — durable event log, snapshots, and projections.
//!
//! The event log is the single source of truth; aggregates and projections
//! are derived and disposable. Any derived state can be discarded and rebuilt
//! from the log with identical results.

pub mod event_store;
pub mod health;
pub mod projections;
pub mod repository;
pub mod snapshot;


pub use event_store::{
    AppendResult, EventStore, EventStoreError, InMemoryEventStore, PostgresEventStore,
    PublishingEventStore,
};
pub use health::{StoreHealth, check};
pub use projections::{
    EngineError, ProjectionEngine, RebuildError, RebuildHandle, RebuildPhase, RebuildProgress,
};
pub use repository::{Repository, RepositoryError, SnapshotPolicy};
pub use snapshot::{
    InMemorySnapshotStore, PostgresSnapshotStore, Snapshot, SnapshotError, SnapshotStore,
};
