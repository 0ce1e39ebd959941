//! Snapshot store boundary.
//!
//! Snapshots are **advisory caches**: one per stream, overwritten by later
//! saves, keyed by the stream version they reflect. Deleting every snapshot
//! must not change any aggregate's computed state, only replay cost.

pub mod in_memory;
pub mod postgres;

pub use in_memory::InMemorySnapshotStore;
pub use postgres::PostgresSnapshotStore;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

use chronicle_core::StreamId;

/// A point-in-time materialization of an aggregate's derived state.
///
/// `version` must correspond to a committed event version in the same stream
/// (or 0 for "before any events").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub stream_id: StreamId,
    pub version: u64,
    pub state: JsonValue,
    pub created_at: DateTime<Utc>,
}

/// Snapshot store operation error.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),

    #[error("invalid snapshot: {0}")]
    Invalid(String),
}

/// Keyed-by-stream snapshot storage.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Upsert: one snapshot per stream, overwritten by later saves. Never
    /// fails on "no prior snapshot".
    async fn save(&self, snapshot: Snapshot) -> Result<(), SnapshotError>;

    /// The latest snapshot for the stream; absence is not an error.
    async fn load(&self, stream_id: StreamId) -> Result<Option<Snapshot>, SnapshotError>;

    /// Drop the stream's snapshot if one exists.
    async fn delete(&self, stream_id: StreamId) -> Result<(), SnapshotError>;
}

#[async_trait]
impl<S> SnapshotStore for Arc<S>
where
    S: SnapshotStore + ?Sized,
{
    async fn save(&self, snapshot: Snapshot) -> Result<(), SnapshotError> {
        (**self).save(snapshot).await
    }

    async fn load(&self, stream_id: StreamId) -> Result<Option<Snapshot>, SnapshotError> {
        (**self).load(stream_id).await
    }

    async fn delete(&self, stream_id: StreamId) -> Result<(), SnapshotError> {
        (**self).delete(stream_id).await
    }
}
