//! Read-model projection contract.

use async_trait::async_trait;

use crate::bus::EventSelection;
use crate::event::RecordedEvent;

/// A projection builds a read model from the event stream.
///
/// Read models are **disposable**; events are the source of truth. A
/// projection can always be torn down and rebuilt from the log with identical
/// results.
///
/// ## Idempotency
///
/// Delivery is at-least-once: an event appended during a rebuild may arrive
/// both via the rebuild scan and via the live subscription. Projections must
/// apply events idempotently (e.g. keyed by `event_id`); the engine does not
/// deduplicate.
#[async_trait]
pub trait Projection: Send + Sync {
    /// Which event types this projection consumes.
    fn interest(&self) -> EventSelection;

    /// Apply a single event to the read model.
    ///
    /// Errors are logged per event by the engine and never stop delivery of
    /// subsequent events.
    async fn apply(&self, event: &RecordedEvent) -> anyhow::Result<()>;

    /// Clear derived state before a rebuild. Default: no-op, for projections
    /// whose `apply` is a natural upsert.
    async fn reset(&self) {}
}
