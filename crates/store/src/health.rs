//! Storage backend health reporting.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::event_store::EventStore;

/// Reachability report for the configured storage backend.
#[derive(Debug, Clone, Serialize)]
pub struct StoreHealth {
    pub backend: &'static str,
    pub reachable: bool,
    pub checked_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Probe the backend and report the result. Never fails: an unreachable
/// backend is a report, not an error.
pub async fn check<S>(store: &S) -> StoreHealth
where
    S: EventStore + ?Sized,
{
    let (reachable, error) = match store.ping().await {
        Ok(()) => (true, None),
        Err(e) => (false, Some(e.to_string())),
    };

    StoreHealth {
        backend: store.backend(),
        reachable,
        checked_at: Utc::now(),
        error,
    }
}
