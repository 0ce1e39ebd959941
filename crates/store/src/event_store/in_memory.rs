use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use chrono::Utc;

use chronicle_core::{ExpectedVersion, StreamId};
use chronicle_events::{NewEvent, RecordedEvent};

use super::r#trait::{AppendResult, EventStore, EventStoreError};

/// In-memory append-only event store.
///
/// Intended for tests/dev. Each stream has its own mutex so the
/// check-then-write in `append` serializes per stream without blocking
/// appends to other streams. A shared log assigns global positions and backs
/// `read_all`.
///
/// Constructed and injected, never module-global: independent instances can
/// coexist in tests.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    streams: RwLock<HashMap<StreamId, Arc<Mutex<Vec<RecordedEvent>>>>>,
    log: Mutex<GlobalLog>,
}

#[derive(Debug, Default)]
struct GlobalLog {
    events: Vec<RecordedEvent>,
    next_position: u64,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn stream_slot(&self, stream_id: StreamId) -> Result<Arc<Mutex<Vec<RecordedEvent>>>, EventStoreError> {
        {
            let streams = self
                .streams
                .read()
                .map_err(|_| EventStoreError::Unavailable("lock poisoned".to_string()))?;
            if let Some(slot) = streams.get(&stream_id) {
                return Ok(slot.clone());
            }
        }

        let mut streams = self
            .streams
            .write()
            .map_err(|_| EventStoreError::Unavailable("lock poisoned".to_string()))?;
        Ok(streams.entry(stream_id).or_default().clone())
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    fn backend(&self) -> &'static str {
        "in-memory"
    }

    async fn append(
        &self,
        stream_id: StreamId,
        events: Vec<NewEvent>,
        expected: ExpectedVersion,
    ) -> Result<AppendResult, EventStoreError> {
        let slot = self.stream_slot(stream_id)?;
        let mut stream = slot
            .lock()
            .map_err(|_| EventStoreError::Unavailable("lock poisoned".to_string()))?;

        let current = stream.last().map(|e| e.version).unwrap_or(0);

        // Only Exact can fail the check; its value feeds the conflict report.
        if !expected.matches(current) {
            if let ExpectedVersion::Exact(expected) = expected {
                return Err(EventStoreError::Conflict {
                    stream_id,
                    expected,
                    actual: current,
                });
            }
        }

        if events.is_empty() {
            return Ok(AppendResult {
                stream_version: current,
                events: vec![],
            });
        }

        // Assign versions and global positions under the log lock so commit
        // order and position order agree. Lock order is always stream → log.
        let mut log = self
            .log
            .lock()
            .map_err(|_| EventStoreError::Unavailable("lock poisoned".to_string()))?;

        let recorded_at = Utc::now();
        let mut next_version = current + 1;
        let mut committed = Vec::with_capacity(events.len());

        for event in events {
            log.next_position += 1;
            let recorded = RecordedEvent {
                event_id: event.event_id,
                stream_id,
                version: next_version,
                position: log.next_position,
                event_type: event.event_type,
                data: event.data,
                metadata: event.metadata,
                occurred_at: event.occurred_at,
                recorded_at,
            };
            next_version += 1;
            log.events.push(recorded.clone());
            stream.push(recorded.clone());
            committed.push(recorded);
        }

        Ok(AppendResult {
            stream_version: next_version - 1,
            events: committed,
        })
    }

    async fn read_stream(
        &self,
        stream_id: StreamId,
        from_version: u64,
        max_count: usize,
    ) -> Result<Vec<RecordedEvent>, EventStoreError> {
        let streams = self
            .streams
            .read()
            .map_err(|_| EventStoreError::Unavailable("lock poisoned".to_string()))?;

        let Some(slot) = streams.get(&stream_id) else {
            return Ok(vec![]);
        };

        let stream = slot
            .lock()
            .map_err(|_| EventStoreError::Unavailable("lock poisoned".to_string()))?;

        Ok(stream
            .iter()
            .filter(|e| e.version > from_version)
            .take(max_count)
            .cloned()
            .collect())
    }

    async fn read_all(
        &self,
        from_position: u64,
        max_count: usize,
    ) -> Result<Vec<RecordedEvent>, EventStoreError> {
        let log = self
            .log
            .lock()
            .map_err(|_| EventStoreError::Unavailable("lock poisoned".to_string()))?;

        Ok(log
            .events
            .iter()
            .filter(|e| e.position > from_position)
            .take(max_count)
            .cloned()
            .collect())
    }

    async fn ping(&self) -> Result<(), EventStoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn event(event_type: &str) -> NewEvent {
        NewEvent::new(event_type, json!({}))
    }

    #[tokio::test]
    async fn append_assigns_contiguous_versions_from_one() {
        let store = InMemoryEventStore::new();
        let stream = StreamId::new();

        let result = store
            .append(
                stream,
                vec![event("order.created"), event("order.paid"), event("order.shipped")],
                ExpectedVersion::Any,
            )
            .await
            .unwrap();

        assert_eq!(result.stream_version, 3);
        let versions: Vec<u64> = result.events.iter().map(|e| e.version).collect();
        assert_eq!(versions, vec![1, 2, 3]);

        let read = store.read_stream(stream, 0, 10).await.unwrap();
        let versions: Vec<u64> = read.iter().map(|e| e.version).collect();
        assert_eq!(versions, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn conflict_carries_accurate_expected_and_actual() {
        let store = InMemoryEventStore::new();
        let stream = StreamId::new();

        store
            .append(stream, vec![event("order.created")], ExpectedVersion::Any)
            .await
            .unwrap();

        // First conditional append at the right version succeeds.
        store
            .append(stream, vec![event("order.paid")], ExpectedVersion::Exact(1))
            .await
            .unwrap();

        // Replaying the same expectation must conflict with current values.
        let err = store
            .append(stream, vec![event("order.paid")], ExpectedVersion::Exact(1))
            .await
            .unwrap_err();

        match err {
            EventStoreError::Conflict {
                stream_id,
                expected,
                actual,
            } => {
                assert_eq!(stream_id, stream);
                assert_eq!(expected, 1);
                assert_eq!(actual, 2);
            }
            other => panic!("expected Conflict, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn conflicting_append_persists_nothing() {
        let store = InMemoryEventStore::new();
        let stream = StreamId::new();

        store
            .append(stream, vec![event("order.created")], ExpectedVersion::Any)
            .await
            .unwrap();

        let err = store
            .append(
                stream,
                vec![event("order.paid"), event("order.shipped")],
                ExpectedVersion::Exact(0),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EventStoreError::Conflict { .. }));

        assert_eq!(store.read_stream(stream, 0, 10).await.unwrap().len(), 1);
        assert_eq!(store.read_all(0, 10).await.unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn exactly_one_of_two_concurrent_appends_wins() {
        let store = Arc::new(InMemoryEventStore::new());
        let stream = StreamId::new();

        let a = {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .append(stream, vec![event("order.created")], ExpectedVersion::Exact(0))
                    .await
            })
        };
        let b = {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .append(stream, vec![event("order.created")], ExpectedVersion::Exact(0))
                    .await
            })
        };

        let results = [a.await.unwrap(), b.await.unwrap()];
        let wins = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(wins, 1);

        let conflict = results.iter().find(|r| r.is_err()).unwrap();
        match conflict.as_ref().unwrap_err() {
            EventStoreError::Conflict { expected, actual, .. } => {
                assert_eq!(*expected, 0);
                assert_eq!(*actual, 1);
            }
            other => panic!("expected Conflict, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn read_stream_tolerates_unknown_streams_and_cursors() {
        let store = InMemoryEventStore::new();
        let stream = StreamId::new();

        assert!(store.read_stream(stream, 0, 10).await.unwrap().is_empty());

        store
            .append(stream, vec![event("order.created")], ExpectedVersion::Any)
            .await
            .unwrap();
        assert!(store.read_stream(stream, 99, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn read_all_orders_by_global_position_across_streams() {
        let store = InMemoryEventStore::new();
        let a = StreamId::new();
        let b = StreamId::new();

        store.append(a, vec![event("order.created")], ExpectedVersion::Any).await.unwrap();
        store.append(b, vec![event("order.created")], ExpectedVersion::Any).await.unwrap();
        store.append(a, vec![event("order.paid")], ExpectedVersion::Any).await.unwrap();

        let all = store.read_all(0, 10).await.unwrap();
        let positions: Vec<u64> = all.iter().map(|e| e.position).collect();
        assert_eq!(positions, vec![1, 2, 3]);

        // Resuming from a watermark skips everything at or before it.
        let tail = store.read_all(2, 10).await.unwrap();
        assert_eq!(tail.len(), 1);
        assert_eq!(tail[0].stream_id, a);
        assert_eq!(tail[0].version, 2);
    }

    #[tokio::test]
    async fn empty_append_checks_the_version_and_reports_current() {
        let store = InMemoryEventStore::new();
        let stream = StreamId::new();

        store
            .append(stream, vec![event("order.created")], ExpectedVersion::Any)
            .await
            .unwrap();

        let ok = store.append(stream, vec![], ExpectedVersion::Exact(1)).await.unwrap();
        assert_eq!(ok.stream_version, 1);
        assert!(ok.events.is_empty());

        let err = store.append(stream, vec![], ExpectedVersion::Exact(0)).await;
        assert!(matches!(err, Err(EventStoreError::Conflict { .. })));
    }

    mod properties {
        use proptest::prelude::*;

        use super::*;

        proptest! {
            // Appending arbitrary batch sizes always yields one contiguous
            // run of versions starting at 1.
            #[test]
            fn versions_are_gapless(batch_sizes in proptest::collection::vec(1usize..5, 1..8)) {
                let rt = tokio::runtime::Builder::new_current_thread()
                    .build()
                    .unwrap();

                rt.block_on(async {
                    let store = InMemoryEventStore::new();
                    let stream = StreamId::new();
                    let mut expected_total = 0u64;

                    for size in batch_sizes {
                        let batch: Vec<NewEvent> =
                            (0..size).map(|_| event("order.noted")).collect();
                        let result = store
                            .append(stream, batch, ExpectedVersion::Exact(expected_total))
                            .await
                            .unwrap();
                        expected_total += size as u64;
                        assert_eq!(result.stream_version, expected_total);
                    }

                    let read = store.read_stream(stream, 0, usize::MAX).await.unwrap();
                    let versions: Vec<u64> = read.iter().map(|e| e.version).collect();
                    let expected: Vec<u64> = (1..=expected_total).collect();
                    assert_eq!(versions, expected);
                });
            }
        }
    }
}
