//! Domain error model.
//!
//! Storage and projection failures carry their own structured error types in
//! `chronicle-store`; this covers only failures of the pure domain
//! primitives themselves.

use thiserror::Error;

/// Domain-level error.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),
}

impl DomainError {
    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }
}
