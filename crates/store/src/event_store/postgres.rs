//! Postgres-backed event store implementation.
//!
//! Persists events in an append-only `events` table with optimistic
//! concurrency enforced at the database level.
//!
//! ## Schema
//!
//! ```sql
//! CREATE TABLE events (
//!     event_id    UUID        NOT NULL,
//!     stream_id   UUID        NOT NULL,
//!     version     BIGINT      NOT NULL CHECK (version > 0),
//!     position    BIGSERIAL   NOT NULL UNIQUE,
//!     event_type  TEXT        NOT NULL,
//!     data        JSONB       NOT NULL,
//!     metadata    JSONB       NOT NULL,
//!     occurred_at TIMESTAMPTZ NOT NULL,
//!     recorded_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
//!     UNIQUE (stream_id, version)
//! );
//! ```
//!
//! `position` is the strictly increasing global sequence used by `read_all`;
//! it is independent of the per-stream `version`.
//!
//! ## Concurrency
//!
//! `append` takes a transaction-scoped advisory lock on the stream id, so the
//! check-then-insert is serialized per stream while appends to different
//! streams proceed in parallel. The unique constraint on
//! `(stream_id, version)` is the backstop: a violation is still reported as a
//! conflict.
//!
//! ## Error mapping
//!
//! Connection-level failures (I/O, pool exhaustion, TLS) map to
//! `EventStoreError::Unavailable`; constraint and data errors map to
//! `InvalidAppend`; unique violations on `(stream_id, version)` map to
//! `Conflict`.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::instrument;

use chronicle_core::{EventId, ExpectedVersion, StreamId};
use chronicle_events::{EventMetadata, NewEvent, RecordedEvent};

use super::r#trait::{AppendResult, EventStore, EventStoreError};

/// Postgres-backed append-only event store.
///
/// Cloneable; all clones share the underlying connection pool.
#[derive(Debug, Clone)]
pub struct PostgresEventStore {
    pool: Arc<PgPool>,
}

impl PostgresEventStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Create the `events` table if it does not exist yet.
    pub async fn ensure_schema(&self) -> Result<(), EventStoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS events (
                event_id    UUID        NOT NULL,
                stream_id   UUID        NOT NULL,
                version     BIGINT      NOT NULL CHECK (version > 0),
                position    BIGSERIAL   NOT NULL UNIQUE,
                event_type  TEXT        NOT NULL,
                data        JSONB       NOT NULL,
                metadata    JSONB       NOT NULL,
                occurred_at TIMESTAMPTZ NOT NULL,
                recorded_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                UNIQUE (stream_id, version)
            )
            "#,
        )
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("ensure_schema", e))?;

        Ok(())
    }
}

#[async_trait]
impl EventStore for PostgresEventStore {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    #[instrument(
        skip(self, events),
        fields(stream_id = %stream_id, event_count = events.len(), expected = ?expected),
        err
    )]
    async fn append(
        &self,
        stream_id: StreamId,
        events: Vec<NewEvent>,
        expected: ExpectedVersion,
    ) -> Result<AppendResult, EventStoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        // Serialize check-then-insert per stream. Released on commit/rollback.
        lock_stream(&mut tx, stream_id).await?;

        let current = current_stream_version(&mut tx, stream_id).await?;

        // Only Exact can fail the check; its value feeds the conflict report.
        if !expected.matches(current) {
            if let ExpectedVersion::Exact(expected) = expected {
                tx.rollback()
                    .await
                    .map_err(|e| map_sqlx_error("rollback", e))?;
                return Err(EventStoreError::Conflict {
                    stream_id,
                    expected,
                    actual: current,
                });
            }
        }

        if events.is_empty() {
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback", e))?;
            return Ok(AppendResult {
                stream_version: current,
                events: vec![],
            });
        }

        let mut committed = Vec::with_capacity(events.len());
        let mut next_version = current + 1;

        for event in events {
            let metadata = serde_json::to_value(&event.metadata).map_err(|e| {
                EventStoreError::InvalidAppend(format!("metadata serialization failed: {e}"))
            })?;

            let row = sqlx::query(
                r#"
                INSERT INTO events (
                    event_id,
                    stream_id,
                    version,
                    event_type,
                    data,
                    metadata,
                    occurred_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                RETURNING position, recorded_at
                "#,
            )
            .bind(event.event_id.as_uuid())
            .bind(stream_id.as_uuid())
            .bind(next_version as i64)
            .bind(&event.event_type)
            .bind(&event.data)
            .bind(&metadata)
            .bind(event.occurred_at)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    EventStoreError::Conflict {
                        stream_id,
                        expected: current,
                        actual: next_version,
                    }
                } else {
                    map_sqlx_error("insert_event", e)
                }
            })?;

            let position: i64 = row
                .try_get("position")
                .map_err(|e| EventStoreError::InvalidAppend(format!("failed to read position: {e}")))?;
            let recorded_at: DateTime<Utc> = row
                .try_get("recorded_at")
                .map_err(|e| EventStoreError::InvalidAppend(format!("failed to read recorded_at: {e}")))?;

            committed.push(RecordedEvent {
                event_id: event.event_id,
                stream_id,
                version: next_version,
                position: position as u64,
                event_type: event.event_type,
                data: event.data,
                metadata: event.metadata,
                occurred_at: event.occurred_at,
                recorded_at,
            });
            next_version += 1;
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        Ok(AppendResult {
            stream_version: next_version - 1,
            events: committed,
        })
    }

    #[instrument(skip(self), fields(stream_id = %stream_id), err)]
    async fn read_stream(
        &self,
        stream_id: StreamId,
        from_version: u64,
        max_count: usize,
    ) -> Result<Vec<RecordedEvent>, EventStoreError> {
        let rows = sqlx::query(
            r#"
            SELECT
                event_id, stream_id, version, position,
                event_type, data, metadata, occurred_at, recorded_at
            FROM events
            WHERE stream_id = $1 AND version > $2
            ORDER BY version ASC
            LIMIT $3
            "#,
        )
        .bind(stream_id.as_uuid())
        .bind(bigint(from_version))
        .bind(bigint(max_count))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("read_stream", e))?;

        rows.iter().map(recorded_event_from_row).collect()
    }

    #[instrument(skip(self), err)]
    async fn read_all(
        &self,
        from_position: u64,
        max_count: usize,
    ) -> Result<Vec<RecordedEvent>, EventStoreError> {
        let rows = sqlx::query(
            r#"
            SELECT
                event_id, stream_id, version, position,
                event_type, data, metadata, occurred_at, recorded_at
            FROM events
            WHERE position > $1
            ORDER BY position ASC
            LIMIT $2
            "#,
        )
        .bind(bigint(from_position))
        .bind(bigint(max_count))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("read_all", e))?;

        rows.iter().map(recorded_event_from_row).collect()
    }

    async fn ping(&self) -> Result<(), EventStoreError> {
        sqlx::query("SELECT 1")
            .execute(&*self.pool)
            .await
            .map(|_| ())
            .map_err(|e| EventStoreError::Unavailable(e.to_string()))
    }
}

async fn lock_stream(
    tx: &mut Transaction<'_, Postgres>,
    stream_id: StreamId,
) -> Result<(), EventStoreError> {
    sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1::text, 0))")
        .bind(stream_id.as_uuid().to_string())
        .execute(&mut **tx)
        .await
        .map(|_| ())
        .map_err(|e| map_sqlx_error("lock_stream", e))
}

async fn current_stream_version(
    tx: &mut Transaction<'_, Postgres>,
    stream_id: StreamId,
) -> Result<u64, EventStoreError> {
    let row = sqlx::query("SELECT COALESCE(MAX(version), 0) AS current_version FROM events WHERE stream_id = $1")
        .bind(stream_id.as_uuid())
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("current_stream_version", e))?;

    let current: i64 = row
        .try_get("current_version")
        .map_err(|e| EventStoreError::InvalidAppend(format!("failed to read current_version: {e}")))?;

    Ok(current as u64)
}

fn recorded_event_from_row(row: &sqlx::postgres::PgRow) -> Result<RecordedEvent, EventStoreError> {
    let read = |e: sqlx::Error| EventStoreError::InvalidAppend(format!("failed to read event row: {e}"));

    let event_id: uuid::Uuid = row.try_get("event_id").map_err(read)?;
    let stream_id: uuid::Uuid = row.try_get("stream_id").map_err(read)?;
    let version: i64 = row.try_get("version").map_err(read)?;
    let position: i64 = row.try_get("position").map_err(read)?;
    let event_type: String = row.try_get("event_type").map_err(read)?;
    let data: serde_json::Value = row.try_get("data").map_err(read)?;
    let metadata: serde_json::Value = row.try_get("metadata").map_err(read)?;
    let occurred_at: DateTime<Utc> = row.try_get("occurred_at").map_err(read)?;
    let recorded_at: DateTime<Utc> = row.try_get("recorded_at").map_err(read)?;

    let metadata: EventMetadata = serde_json::from_value(metadata)
        .map_err(|e| EventStoreError::InvalidAppend(format!("failed to deserialize metadata: {e}")))?;

    Ok(RecordedEvent {
        event_id: EventId::from_uuid(event_id),
        stream_id: StreamId::from_uuid(stream_id),
        version: version as u64,
        position: position as u64,
        event_type,
        data,
        metadata,
        occurred_at,
        recorded_at,
    })
}

/// Map SQLx errors to `EventStoreError`.
///
/// Connection-level failures become `Unavailable`; data and constraint
/// problems become `InvalidAppend`.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> EventStoreError {
    match err {
        sqlx::Error::Database(db_err) => EventStoreError::InvalidAppend(format!(
            "database error in {operation}: {}",
            db_err.message()
        )),
        sqlx::Error::RowNotFound => {
            EventStoreError::InvalidAppend(format!("unexpected row not found in {operation}"))
        }
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) | sqlx::Error::TypeNotFound { .. } => {
            EventStoreError::InvalidAppend(format!("decode error in {operation}: {err}"))
        }
        other => EventStoreError::Unavailable(format!("{operation}: {other}")),
    }
}

/// Clamp an unsigned cursor or limit into the BIGINT range.
///
/// `as i64` would wrap values above `i64::MAX` negative, turning a wide-open
/// `LIMIT` into one Postgres rejects. Clamping keeps the semantics: a cursor
/// past the end reads nothing, a limit that large reads everything.
fn bigint(value: impl TryInto<i64>) -> i64 {
    value.try_into().unwrap_or(i64::MAX)
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        if let Some(code) = db_err.code() {
            return code.as_ref() == "23505";
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bigint_passes_in_range_values_through() {
        assert_eq!(bigint(0u64), 0);
        assert_eq!(bigint(256usize), 256);
    }

    #[test]
    fn bigint_clamps_values_too_wide_for_postgres() {
        assert_eq!(bigint(u64::MAX), i64::MAX);
        assert_eq!(bigint(usize::MAX), i64::MAX);
    }
}
