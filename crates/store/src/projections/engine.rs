//! Projection registry and live delivery workers.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{RwLock, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use chronicle_events::{EventBus, Projection, Subscription};

use crate::event_store::{EventStore, EventStoreError};

use super::rebuild::{self, RebuildHandle};

/// Projection engine operation error.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Rebuild or lookup requested for an unregistered projection id.
    #[error("projection not found: {0}")]
    NotFound(String),

    /// A projection with this id already has a running worker.
    #[error("projection already registered: {0}")]
    AlreadyRegistered(String),

    #[error(transparent)]
    Store(#[from] EventStoreError),
}

struct Registered {
    projection: Arc<dyn Projection>,
    shutdown: watch::Sender<bool>,
    worker: JoinHandle<()>,
}

/// Subscribes projections to the live event bus and rebuilds them from the
/// global log.
///
/// Each registered projection gets one worker task consuming a filtered
/// subscription; matching events arrive in commit order, at least once.
/// Handler errors are logged per event and never stop the worker — one
/// broken projection cannot block others or block new appends.
pub struct ProjectionEngine<S> {
    store: Arc<S>,
    bus: EventBus,
    batch_size: usize,
    registry: RwLock<HashMap<String, Registered>>,
}

impl<S> ProjectionEngine<S>
where
    S: EventStore + 'static,
{
    pub fn new(store: Arc<S>, bus: EventBus) -> Self {
        Self::with_batch_size(store, bus, 100)
    }

    pub fn with_batch_size(store: Arc<S>, bus: EventBus, batch_size: usize) -> Self {
        Self {
            store,
            bus,
            batch_size,
            registry: RwLock::new(HashMap::new()),
        }
    }

    /// Register a projection and start live delivery.
    ///
    /// From this point on the projection receives every newly appended event
    /// matching its interest, in the order the log persists them.
    pub async fn register(
        &self,
        projection_id: impl Into<String>,
        projection: Arc<dyn Projection>,
    ) -> Result<(), EngineError> {
        let projection_id = projection_id.into();
        let mut registry = self.registry.write().await;
        if registry.contains_key(&projection_id) {
            return Err(EngineError::AlreadyRegistered(projection_id));
        }

        // Subscribe before inserting so no event published after this call
        // can be missed by the worker.
        let subscription = self.bus.subscribe_to(projection.interest());
        let (shutdown, shutdown_rx) = watch::channel(false);
        let worker = tokio::spawn(worker_loop(
            projection_id.clone(),
            projection.clone(),
            subscription,
            shutdown_rx,
        ));

        registry.insert(
            projection_id,
            Registered {
                projection,
                shutdown,
                worker,
            },
        );
        Ok(())
    }

    /// Stop live delivery for a projection. Idempotent: unsubscribing an
    /// unknown or already-removed id is a no-op.
    pub async fn unsubscribe(&self, projection_id: &str) {
        let entry = {
            let mut registry = self.registry.write().await;
            registry.remove(projection_id)
        };

        if let Some(entry) = entry {
            let _ = entry.shutdown.send(true);
            if let Err(error) = entry.worker.await {
                if !error.is_cancelled() {
                    warn!(projection = projection_id, %error, "projection worker ended abnormally");
                }
            }
        }
    }

    /// Rebuild a projection's read model by replaying the global log from
    /// `from_position` in batches.
    ///
    /// Fails with [`EngineError::NotFound`] before reading any events when
    /// the id is unknown. Safe to run while live appends continue; events
    /// appended during the rebuild may be delivered twice (scan + live), and
    /// deduplication is the projection's responsibility.
    pub async fn rebuild(
        &self,
        projection_id: &str,
        from_position: u64,
    ) -> Result<RebuildHandle, EngineError> {
        let projection = {
            let registry = self.registry.read().await;
            registry
                .get(projection_id)
                .ok_or_else(|| EngineError::NotFound(projection_id.to_string()))?
                .projection
                .clone()
        };

        Ok(rebuild::spawn(
            self.store.clone(),
            projection_id.to_string(),
            projection,
            from_position,
            self.batch_size,
        ))
    }

    /// Ids of all currently registered projections.
    pub async fn registered(&self) -> Vec<String> {
        let registry = self.registry.read().await;
        registry.keys().cloned().collect()
    }
}

async fn worker_loop(
    projection_id: String,
    projection: Arc<dyn Projection>,
    mut subscription: Subscription,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            event = subscription.recv() => match event {
                Some(event) => {
                    // Handlers run sequentially per projection to preserve
                    // delivery order; a failure is isolated to its event.
                    if let Err(error) = projection.apply(&event).await {
                        warn!(
                            projection = %projection_id,
                            event_id = %event.event_id,
                            event_type = %event.event_type,
                            %error,
                            "projection handler failed"
                        );
                    }
                }
                None => break,
            }
        }
    }
    debug!(projection = %projection_id, "projection worker stopped");
}
