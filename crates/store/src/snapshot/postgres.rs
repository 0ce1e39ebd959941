//! Postgres-backed snapshot store.
//!
//! One row per stream, upserted in place:
//!
//! ```sql
//! CREATE TABLE snapshots (
//!     stream_id  UUID        PRIMARY KEY,
//!     version    BIGINT      NOT NULL CHECK (version >= 0),
//!     state      JSONB       NOT NULL,
//!     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
//! );
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::instrument;

use chronicle_core::StreamId;

use super::{Snapshot, SnapshotError, SnapshotStore};

#[derive(Debug, Clone)]
pub struct PostgresSnapshotStore {
    pool: Arc<PgPool>,
}

impl PostgresSnapshotStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Create the `snapshots` table if it does not exist yet.
    pub async fn ensure_schema(&self) -> Result<(), SnapshotError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS snapshots (
                stream_id  UUID        PRIMARY KEY,
                version    BIGINT      NOT NULL CHECK (version >= 0),
                state      JSONB       NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&*self.pool)
        .await
        .map(|_| ())
        .map_err(map_sqlx_error)
    }
}

#[async_trait]
impl SnapshotStore for PostgresSnapshotStore {
    #[instrument(skip(self, snapshot), fields(stream_id = %snapshot.stream_id, version = snapshot.version), err)]
    async fn save(&self, snapshot: Snapshot) -> Result<(), SnapshotError> {
        sqlx::query(
            r#"
            INSERT INTO snapshots (stream_id, version, state, created_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (stream_id)
            DO UPDATE SET
                version = EXCLUDED.version,
                state = EXCLUDED.state,
                created_at = EXCLUDED.created_at
            "#,
        )
        .bind(snapshot.stream_id.as_uuid())
        .bind(snapshot.version as i64)
        .bind(&snapshot.state)
        .bind(snapshot.created_at)
        .execute(&*self.pool)
        .await
        .map(|_| ())
        .map_err(map_sqlx_error)
    }

    #[instrument(skip(self), fields(stream_id = %stream_id), err)]
    async fn load(&self, stream_id: StreamId) -> Result<Option<Snapshot>, SnapshotError> {
        let row = sqlx::query(
            "SELECT stream_id, version, state, created_at FROM snapshots WHERE stream_id = $1",
        )
        .bind(stream_id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let Some(row) = row else { return Ok(None) };

        let read = |e: sqlx::Error| SnapshotError::Invalid(format!("failed to read snapshot row: {e}"));
        let version: i64 = row.try_get("version").map_err(read)?;
        let state: serde_json::Value = row.try_get("state").map_err(read)?;
        let created_at: DateTime<Utc> = row.try_get("created_at").map_err(read)?;

        Ok(Some(Snapshot {
            stream_id,
            version: version as u64,
            state,
            created_at,
        }))
    }

    #[instrument(skip(self), fields(stream_id = %stream_id), err)]
    async fn delete(&self, stream_id: StreamId) -> Result<(), SnapshotError> {
        sqlx::query("DELETE FROM snapshots WHERE stream_id = $1")
            .bind(stream_id.as_uuid())
            .execute(&*self.pool)
            .await
            .map(|_| ())
            .map_err(map_sqlx_error)
    }
}

fn map_sqlx_error(err: sqlx::Error) -> SnapshotError {
    match err {
        sqlx::Error::Database(db_err) => SnapshotError::Invalid(db_err.message().to_string()),
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
            SnapshotError::Invalid(err.to_string())
        }
        other => SnapshotError::Unavailable(other.to_string()),
    }
}
