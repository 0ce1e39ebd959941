//! Process-wide tracing/logging setup shared by binaries and tests.

pub mod tracing;

/// Initialize logging and tracing for the process.
///
/// Idempotent: calling it again after a subscriber is installed is a no-op.
pub fn init() {
    tracing::init();
}
