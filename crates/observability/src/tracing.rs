//! Subscriber installation: JSON output, `RUST_LOG`-driven filtering.

use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber.
///
/// Filter comes from `RUST_LOG`, falling back to `info`. Output is one JSON
/// object per line so log shippers can ingest it without a parser config.
/// Idempotent: `try_init` makes repeated calls a no-op.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false)
        .try_init();
}
