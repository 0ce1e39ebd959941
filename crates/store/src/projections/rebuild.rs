//! Rebuild a projection by replaying the global log in batches.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;
use tokio::sync::RwLock;
use tracing::warn;

use chronicle_events::Projection;

use crate::event_store::{EventStore, EventStoreError};

/// Error type for rebuild operations.
#[derive(Debug, Clone, Error)]
pub enum RebuildError {
    #[error(transparent)]
    Store(#[from] EventStoreError),

    #[error("rebuild cancelled")]
    Cancelled,
}

/// Phase of a rebuild operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RebuildPhase {
    /// Clearing projection state.
    Resetting,
    /// Paging through the log.
    Replaying,
    /// Completed successfully.
    Complete,
    /// Failed or cancelled.
    Failed,
}

/// Progress information for a running rebuild.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RebuildProgress {
    /// Matching events fed to the projection so far.
    pub processed_events: u64,
    /// Position watermark: the last fully applied batch's max position.
    pub position: u64,
    pub phase: RebuildPhase,
    pub is_complete: bool,
    pub error: Option<String>,
}

/// Handle for monitoring and controlling a rebuild.
#[derive(Debug, Clone)]
pub struct RebuildHandle {
    progress: Arc<RwLock<RebuildProgress>>,
    failure: Arc<RwLock<Option<RebuildError>>>,
    cancellation: Arc<AtomicBool>,
}

impl RebuildHandle {
    /// Get current progress.
    pub async fn progress(&self) -> RebuildProgress {
        self.progress.read().await.clone()
    }

    /// Request cancellation. Takes effect at the next batch boundary, so the
    /// position watermark is never left mid-batch.
    pub fn cancel(&self) {
        self.cancellation.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.load(Ordering::Relaxed)
    }

    /// Wait for the rebuild to finish.
    ///
    /// A failed rebuild returns its actual cause: `Store(..)` for backend
    /// failures, `Cancelled` when cancellation was requested.
    pub async fn wait_for_completion(&self) -> Result<RebuildProgress, RebuildError> {
        loop {
            let progress = self.progress.read().await.clone();
            if progress.is_complete {
                if progress.phase == RebuildPhase::Failed {
                    let failure = self.failure.read().await.clone();
                    return Err(failure.unwrap_or(RebuildError::Cancelled));
                }
                return Ok(progress);
            }
            tokio::time::sleep(tokio::time::Duration::from_millis(10)).await;
        }
    }
}

/// Spawn a rebuild task and return its handle.
pub(crate) fn spawn<S>(
    store: Arc<S>,
    projection_id: String,
    projection: Arc<dyn Projection>,
    from_position: u64,
    batch_size: usize,
) -> RebuildHandle
where
    S: EventStore + 'static,
{
    let progress = Arc::new(RwLock::new(RebuildProgress {
        processed_events: 0,
        position: from_position,
        phase: RebuildPhase::Resetting,
        is_complete: false,
        error: None,
    }));
    let failure = Arc::new(RwLock::new(None));
    let cancellation = Arc::new(AtomicBool::new(false));

    let handle = RebuildHandle {
        progress: progress.clone(),
        failure: failure.clone(),
        cancellation: cancellation.clone(),
    };

    tokio::spawn(async move {
        let result = run_rebuild(
            store,
            &projection_id,
            projection,
            from_position,
            batch_size,
            progress.clone(),
            cancellation,
        )
        .await;

        // The failure cause is recorded before is_complete flips, so any
        // waiter that observes completion also sees the cause.
        match result {
            Ok(()) => {
                let mut prog = progress.write().await;
                prog.phase = RebuildPhase::Complete;
                prog.is_complete = true;
            }
            Err(error) => {
                let message = error.to_string();
                *failure.write().await = Some(error);
                let mut prog = progress.write().await;
                prog.phase = RebuildPhase::Failed;
                prog.error = Some(message);
                prog.is_complete = true;
            }
        }
    });

    handle
}

async fn run_rebuild<S>(
    store: Arc<S>,
    projection_id: &str,
    projection: Arc<dyn Projection>,
    from_position: u64,
    batch_size: usize,
    progress: Arc<RwLock<RebuildProgress>>,
    cancellation: Arc<AtomicBool>,
) -> Result<(), RebuildError>
where
    S: EventStore,
{
    projection.reset().await;
    {
        let mut prog = progress.write().await;
        prog.phase = RebuildPhase::Replaying;
    }

    let selection = projection.interest();
    let mut position = from_position;
    let mut processed = 0u64;

    loop {
        // Cancellation is only honored between batches.
        if cancellation.load(Ordering::Relaxed) {
            return Err(RebuildError::Cancelled);
        }

        let batch = store.read_all(position, batch_size).await?;
        let Some(last) = batch.last() else {
            break;
        };
        let batch_end = last.position;

        for event in &batch {
            if !selection.matches(&event.event_type) {
                continue;
            }
            if let Err(error) = projection.apply(event).await {
                // Isolated per event: a broken handler must not stop the scan.
                warn!(
                    projection = projection_id,
                    event_id = %event.event_id,
                    position = event.position,
                    %error,
                    "projection handler failed during rebuild"
                );
            }
            processed += 1;
        }

        // The watermark advances only once the batch is fully applied.
        position = batch_end;
        {
            let mut prog = progress.write().await;
            prog.processed_events = processed;
            prog.position = position;
        }
    }

    Ok(())
}
