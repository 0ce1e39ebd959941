//! Aggregate reconstruction and persistence.
//!
//! The repository rebuilds an aggregate's current state from the latest
//! usable snapshot plus subsequent events, and persists raised events under
//! an optimistic-concurrency check. Snapshotting is a replay-cost
//! optimization only: correctness never depends on when or whether a
//! snapshot is taken.

use chrono::Utc;
use thiserror::Error;
use tracing::{instrument, warn};

use chronicle_core::{ExpectedVersion, StreamId};
use chronicle_events::{AggregateRoot, AggregateState, RestoreError};

use crate::event_store::{EventStore, EventStoreError};
use crate::snapshot::{Snapshot, SnapshotError, SnapshotStore};

/// Events read per page while replaying a stream.
const REPLAY_PAGE: usize = 256;

/// When to take a fresh snapshot after reconstruction.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SnapshotPolicy {
    /// Save a snapshot when at least this many events were replayed past the
    /// last one. `None` disables snapshotting.
    pub threshold: Option<usize>,
}

impl SnapshotPolicy {
    pub fn every(threshold: usize) -> Self {
        Self {
            threshold: Some(threshold),
        }
    }

    pub fn disabled() -> Self {
        Self { threshold: None }
    }
}

impl Default for SnapshotPolicy {
    fn default() -> Self {
        Self::every(10)
    }
}

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error(transparent)]
    Store(#[from] EventStoreError),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    #[error(transparent)]
    Restore(#[from] RestoreError),
}

/// Loads and saves event-sourced aggregates over an event store and a
/// snapshot store.
#[derive(Debug)]
pub struct Repository<S, N> {
    store: S,
    snapshots: N,
    policy: SnapshotPolicy,
}

impl<S, N> Repository<S, N>
where
    S: EventStore,
    N: SnapshotStore,
{
    pub fn new(store: S, snapshots: N) -> Self {
        Self::with_policy(store, snapshots, SnapshotPolicy::default())
    }

    pub fn with_policy(store: S, snapshots: N, policy: SnapshotPolicy) -> Self {
        Self {
            store,
            snapshots,
            policy,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn snapshots(&self) -> &N {
        &self.snapshots
    }

    /// Reconstruct the aggregate at its latest version.
    pub async fn load<A>(&self, stream_id: StreamId) -> Result<AggregateRoot<A>, RepositoryError>
    where
        A: AggregateState,
    {
        self.load_at(stream_id, None).await
    }

    /// Reconstruct the aggregate at `to_version` (or latest when `None`).
    ///
    /// A snapshot newer than the requested version is skipped and the state
    /// is replayed from the log instead — the result is never ahead of the
    /// requested version. The returned aggregate has no uncommitted events.
    #[instrument(skip(self), fields(stream_id = %stream_id, aggregate_type = A::aggregate_type()))]
    pub async fn load_at<A>(
        &self,
        stream_id: StreamId,
        to_version: Option<u64>,
    ) -> Result<AggregateRoot<A>, RepositoryError>
    where
        A: AggregateState,
    {
        let snapshot = self.snapshots.load(stream_id).await?;
        let snapshot = match (snapshot, to_version) {
            (Some(s), Some(v)) if s.version > v => None,
            (s, _) => s,
        };

        let mut root = match snapshot {
            Some(s) => AggregateRoot::from_snapshot_state(stream_id, s.version, &s.state)?,
            None => AggregateRoot::new(stream_id),
        };

        let mut replayed = 0usize;
        'replay: loop {
            let batch = self
                .store
                .read_stream(stream_id, root.version(), REPLAY_PAGE)
                .await?;
            if batch.is_empty() {
                break;
            }
            let full_page = batch.len() == REPLAY_PAGE;

            for event in &batch {
                if to_version.is_some_and(|v| event.version > v) {
                    break 'replay;
                }
                root.apply_recorded(event);
                replayed += 1;
            }

            if !full_page {
                break;
            }
        }

        // Cadence applies only to full loads; a point-in-time state must not
        // overwrite the stream's snapshot.
        if to_version.is_none() {
            self.maybe_snapshot(&root, replayed).await;
        }

        Ok(root)
    }

    /// Append the aggregate's uncommitted events with an exact-version check.
    ///
    /// On success the aggregate is marked committed and the new stream
    /// version returned. On a conflict the uncommitted events stay queued so
    /// the caller can reload, reapply its change, and retry.
    #[instrument(skip(self, root), fields(stream_id = %root.id(), event_count = root.uncommitted_events().len()))]
    pub async fn save<A>(&self, root: &mut AggregateRoot<A>) -> Result<u64, RepositoryError>
    where
        A: AggregateState,
    {
        if !root.has_uncommitted_events() {
            return Ok(root.version());
        }

        let events = root.uncommitted_events().to_vec();
        let result = self
            .store
            .append(root.id(), events, ExpectedVersion::Exact(root.version()))
            .await?;

        root.mark_committed(result.stream_version);
        Ok(result.stream_version)
    }

    async fn maybe_snapshot<A>(&self, root: &AggregateRoot<A>, replayed: usize)
    where
        A: AggregateState,
    {
        let Some(threshold) = self.policy.threshold else {
            return;
        };
        if replayed < threshold {
            return;
        }

        let state = match root.snapshot_state() {
            Ok(state) => state,
            Err(error) => {
                warn!(stream_id = %root.id(), %error, "failed to serialize snapshot state");
                return;
            }
        };

        let snapshot = Snapshot {
            stream_id: root.id(),
            version: root.version(),
            state,
            created_at: Utc::now(),
        };

        // Snapshots are advisory; a failed save only costs future replays.
        if let Err(error) = self.snapshots.save(snapshot).await {
            warn!(stream_id = %root.id(), %error, "failed to save snapshot");
        }
    }
}
