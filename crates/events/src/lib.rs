//! `chronicle-events` — the event model and event-sourcing contracts.
//!
//! Defines what an event *is* (unpersisted and recorded forms), how aggregates
//! raise and apply events, and the publish/subscribe channel committed events
//! travel on. Storage lives in `chronicle-store`.

pub mod aggregate;
pub mod bus;
pub mod event;
pub mod projection;

pub use aggregate::{AggregateRoot, AggregateState, RestoreError};
pub use bus::{EventBus, EventSelection, Subscription};
pub use event::{Event, EventMetadata, NewEvent, RecordedEvent};
pub use projection::Projection;
