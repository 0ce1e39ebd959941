//! Projection engine: live delivery and batched rebuilds.
//!
//! Read models are **disposable**; events are the source of truth. The
//! engine keeps registered projections fed from the live bus and can rebuild
//! any of them by paging through the global log.

pub mod engine;
pub mod rebuild;

pub use engine::{EngineError, ProjectionEngine};
pub use rebuild::{RebuildError, RebuildHandle, RebuildPhase, RebuildProgress};
