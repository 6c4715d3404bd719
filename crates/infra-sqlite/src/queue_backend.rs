// SQLite QueueBackend Implementation

use crate::error::map_sqlx_error;
use crate::row::{EnvelopeRow, ENVELOPE_COLUMNS};
use async_trait::async_trait;
use cmdbus_core::domain::{Envelope, QueueName};
use cmdbus_core::error::Result;
use cmdbus_core::port::{QueueBackend, TimeProvider};
use sqlx::{Executor, Sqlite, SqlitePool};
use std::sync::Arc;
use tracing::debug;

/// Durable queues in one `envelopes` table
///
/// `pop` leases a row with a single `UPDATE ... RETURNING` statement, so two
/// consumers can never receive the same envelope. The row stays until `ack`
/// deletes it or a requeue replaces it.
pub struct SqliteQueueBackend {
    pool: SqlitePool,
    time_provider: Arc<dyn TimeProvider>,
}

impl SqliteQueueBackend {
    pub fn new(pool: SqlitePool, time_provider: Arc<dyn TimeProvider>) -> Self {
        Self {
            pool,
            time_provider,
        }
    }

    async fn count(&self, queue: &str, available_before: Option<i64>) -> Result<usize> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM envelopes
            WHERE queue = ? AND leased_at IS NULL
              AND (? IS NULL OR available_at <= ?)
            "#,
        )
        .bind(queue)
        .bind(available_before)
        .bind(available_before)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(usize::try_from(count).unwrap_or(0))
    }
}

/// Insert, or replace the row with the same id (fresh seq, no lease)
async fn store<'e, E>(executor: E, envelope: &Envelope) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(&format!(
        "INSERT OR REPLACE INTO envelopes ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        ENVELOPE_COLUMNS
    ))
    .bind(&envelope.id)
    .bind(&envelope.queue)
    .bind(&envelope.name)
    .bind(envelope.payload.as_value().to_string())
    .bind(envelope.enqueued_at)
    .bind(envelope.available_at)
    .bind(i64::from(envelope.attempts))
    .bind(envelope.state.to_string())
    .execute(executor)
    .await
    .map_err(map_sqlx_error)?;
    Ok(())
}

#[async_trait]
impl QueueBackend for SqliteQueueBackend {
    async fn push(&self, envelope: Envelope) -> Result<()> {
        store(&self.pool, &envelope).await?;
        debug!(envelope_id = %envelope.id, queue = %envelope.queue, "Envelope stored");
        Ok(())
    }

    async fn pop(&self, queue: &str) -> Result<Option<Envelope>> {
        let now = self.time_provider.now_millis();

        let row = sqlx::query_as::<_, EnvelopeRow>(&format!(
            r#"
            UPDATE envelopes
            SET leased_at = ?
            WHERE seq = (
                SELECT seq FROM envelopes
                WHERE queue = ? AND leased_at IS NULL AND available_at <= ?
                ORDER BY seq ASC
                LIMIT 1
            )
            RETURNING {}
            "#,
            ENVELOPE_COLUMNS
        ))
        .bind(now)
        .bind(queue)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(EnvelopeRow::into_envelope))
    }

    async fn ack(&self, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM envelopes WHERE id = ? AND leased_at IS NOT NULL")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn peek(&self, queue: &str) -> Result<Option<Envelope>> {
        let now = self.time_provider.now_millis();

        let row = sqlx::query_as::<_, EnvelopeRow>(&format!(
            r#"
            SELECT {} FROM envelopes
            WHERE queue = ? AND leased_at IS NULL AND available_at <= ?
            ORDER BY seq ASC
            LIMIT 1
            "#,
            ENVELOPE_COLUMNS
        ))
        .bind(queue)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(EnvelopeRow::into_envelope))
    }

    async fn len(&self, queue: &str) -> Result<usize> {
        self.count(queue, None).await
    }

    async fn available_len(&self, queue: &str) -> Result<usize> {
        self.count(queue, Some(self.time_provider.now_millis())).await
    }

    async fn queues(&self) -> Result<Vec<QueueName>> {
        sqlx::query_scalar::<_, String>(
            "SELECT DISTINCT queue FROM envelopes WHERE leased_at IS NULL ORDER BY queue",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)
    }

    async fn release_expired_leases(&self, leased_before: i64) -> Result<usize> {
        let now = self.time_provider.now_millis();

        // Rows move to the tail: a fresh seq per released envelope
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        let released = sqlx::query_as::<_, EnvelopeRow>(&format!(
            "DELETE FROM envelopes WHERE leased_at < ? RETURNING {}",
            ENVELOPE_COLUMNS
        ))
        .bind(leased_before)
        .fetch_all(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        let mut envelopes: Vec<Envelope> =
            released.into_iter().map(EnvelopeRow::into_envelope).collect();
        envelopes.sort_by_key(|env| env.enqueued_at);

        for envelope in &mut envelopes {
            envelope.record_attempt();
            envelope.schedule_retry(now)?;
            store(&mut *tx, envelope).await?;
        }
        tx.commit().await.map_err(map_sqlx_error)?;

        if !envelopes.is_empty() {
            debug!(released = envelopes.len(), "Expired leases released");
        }
        Ok(envelopes.len())
    }
}
