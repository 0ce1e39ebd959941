//! `chronicle-core` — identifier and versioning primitives.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod error;
pub mod id;
pub mod version;

pub use error::DomainError;
pub use id::{ActorId, EventId, StreamId};
pub use version::ExpectedVersion;
