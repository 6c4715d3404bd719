// SQLite DeadLetterStore Implementation

use crate::error::map_sqlx_error;
use crate::row::{DeadLetterRow, ENVELOPE_COLUMNS};
use async_trait::async_trait;
use cmdbus_core::domain::DeadLetterRecord;
use cmdbus_core::error::Result;
use cmdbus_core::port::DeadLetterStore;
use sqlx::SqlitePool;

const RECORD_COLUMNS: &str = "last_error, error_class, failed_at";

pub struct SqliteDeadLetterStore {
    pool: SqlitePool,
}

impl SqliteDeadLetterStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DeadLetterStore for SqliteDeadLetterStore {
    async fn push(&self, record: DeadLetterRecord) -> Result<()> {
        let env = &record.envelope;
        sqlx::query(&format!(
            "INSERT OR REPLACE INTO dead_letters ({}, {}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            ENVELOPE_COLUMNS, RECORD_COLUMNS
        ))
        .bind(&env.id)
        .bind(&env.queue)
        .bind(&env.name)
        .bind(env.payload.as_value().to_string())
        .bind(env.enqueued_at)
        .bind(env.available_at)
        .bind(i64::from(env.attempts))
        .bind(env.state.to_string())
        .bind(&record.last_error)
        .bind(record.error_class.to_string())
        .bind(record.failed_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<DeadLetterRecord>> {
        let rows = sqlx::query_as::<_, DeadLetterRow>(&format!(
            "SELECT {}, {} FROM dead_letters ORDER BY seq ASC",
            ENVELOPE_COLUMNS, RECORD_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(DeadLetterRow::into_record).collect())
    }

    async fn take(&self, id: &str) -> Result<Option<DeadLetterRecord>> {
        let row = sqlx::query_as::<_, DeadLetterRow>(&format!(
            "DELETE FROM dead_letters WHERE id = ? RETURNING {}, {}",
            ENVELOPE_COLUMNS, RECORD_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(DeadLetterRow::into_record))
    }

    async fn len(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM dead_letters")
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(usize::try_from(count).unwrap_or(0))
    }
}
