// sqlx::Error -> AppError mapping

use cmdbus_core::error::AppError;

/// Convert sqlx::Error to AppError with structured information
///
/// Every storage failure surfaces as `QueueUnavailable`; the SQLite result
/// code is kept in the message.
pub(crate) fn map_sqlx_error(err: sqlx::Error) -> AppError {
    match &err {
        sqlx::Error::Database(db_err) => match db_err.code() {
            // SQLite result codes: https://www.sqlite.org/rescode.html
            Some(code) => match code.as_ref() {
                "2067" | "1555" => AppError::QueueUnavailable(format!(
                    "Unique constraint violation: {} ({})",
                    db_err.message(),
                    code
                )),
                "5" => AppError::QueueUnavailable(format!(
                    "Database locked (SQLITE_BUSY): {}",
                    db_err.message()
                )),
                "13" => AppError::QueueUnavailable(format!("Database full: {}", db_err.message())),
                other => AppError::QueueUnavailable(format!(
                    "Database error [{}]: {}",
                    other,
                    db_err.message()
                )),
            },
            None => AppError::QueueUnavailable(format!("Database error: {}", db_err.message())),
        },
        sqlx::Error::RowNotFound => AppError::QueueUnavailable("Row not found".to_string()),
        sqlx::Error::ColumnNotFound(col) => {
            AppError::QueueUnavailable(format!("Column not found: {}", col))
        }
        // Connection, pool, protocol errors
        _ => AppError::QueueUnavailable(err.to_string()),
    }
}
