// Schema migrations, applied in order inside one transaction each

use crate::error::map_sqlx_error;
use cmdbus_core::error::Result;
use sqlx::SqlitePool;
use tracing::{debug, info};

/// (version, label, sql)
const MIGRATIONS: &[(i64, &str, &str)] = &[
    (
        1,
        "queue schema",
        include_str!("../migrations/001_queue_schema.sql"),
    ),
    (
        2,
        "envelope leases",
        include_str!("../migrations/002_envelope_leases.sql"),
    ),
];

/// Bring the schema up to the latest version
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    let current = schema_version(pool).await?;
    debug!(current_version = current, "Checking queue schema");

    for (version, label, sql) in MIGRATIONS.iter().filter(|(v, _, _)| *v > current) {
        info!(version = *version, migration = *label, "Applying migration");
        apply_migration(pool, sql).await?;
    }
    Ok(())
}

async fn schema_version(pool: &SqlitePool) -> Result<i64> {
    let has_table: i64 = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'schema_version')",
    )
    .fetch_one(pool)
    .await
    .map_err(map_sqlx_error)?;

    if has_table == 0 {
        return Ok(0);
    }

    let version: Option<i64> = sqlx::query_scalar("SELECT MAX(version) FROM schema_version")
        .fetch_one(pool)
        .await
        .map_err(map_sqlx_error)?;
    Ok(version.unwrap_or(0))
}

/// Statements are separated by `;` and `--` lines are dropped
async fn apply_migration(pool: &SqlitePool, sql: &str) -> Result<()> {
    let mut tx = pool.begin().await.map_err(map_sqlx_error)?;

    let statements = sql.split(';').map(|chunk| {
        chunk
            .lines()
            .filter(|line| !line.trim_start().starts_with("--"))
            .collect::<Vec<_>>()
            .join("\n")
    });
    for statement in statements.filter(|s| !s.trim().is_empty()) {
        sqlx::query(statement.trim())
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
    }

    tx.commit().await.map_err(map_sqlx_error)
}
