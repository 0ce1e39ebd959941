use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use chronicle_core::StreamId;

use super::{Snapshot, SnapshotError, SnapshotStore};

/// In-memory snapshot store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemorySnapshotStore {
    snapshots: RwLock<HashMap<StreamId, Snapshot>>,
}

impl InMemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SnapshotStore for InMemorySnapshotStore {
    async fn save(&self, snapshot: Snapshot) -> Result<(), SnapshotError> {
        let mut snapshots = self
            .snapshots
            .write()
            .map_err(|_| SnapshotError::Unavailable("lock poisoned".to_string()))?;
        snapshots.insert(snapshot.stream_id, snapshot);
        Ok(())
    }

    async fn load(&self, stream_id: StreamId) -> Result<Option<Snapshot>, SnapshotError> {
        let snapshots = self
            .snapshots
            .read()
            .map_err(|_| SnapshotError::Unavailable("lock poisoned".to_string()))?;
        Ok(snapshots.get(&stream_id).cloned())
    }

    async fn delete(&self, stream_id: StreamId) -> Result<(), SnapshotError> {
        let mut snapshots = self
            .snapshots
            .write()
            .map_err(|_| SnapshotError::Unavailable("lock poisoned".to_string()))?;
        snapshots.remove(&stream_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use serde_json::json;

    use super::*;

    fn snapshot(stream_id: StreamId, version: u64) -> Snapshot {
        Snapshot {
            stream_id,
            version,
            state: json!({ "version": version }),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn absence_is_none_not_an_error() {
        let store = InMemorySnapshotStore::new();
        assert!(store.load(StreamId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn later_saves_overwrite_earlier_ones() {
        let store = InMemorySnapshotStore::new();
        let stream = StreamId::new();

        store.save(snapshot(stream, 2)).await.unwrap();
        store.save(snapshot(stream, 5)).await.unwrap();

        let loaded = store.load(stream).await.unwrap().unwrap();
        assert_eq!(loaded.version, 5);
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let store = InMemorySnapshotStore::new();
        let stream = StreamId::new();

        store.save(snapshot(stream, 1)).await.unwrap();
        store.delete(stream).await.unwrap();
        store.delete(stream).await.unwrap();
        assert!(store.load(stream).await.unwrap().is_none());
    }
}
