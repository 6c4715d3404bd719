// cmdbus Infrastructure - SQLite Adapter
// Implements: QueueBackend, DeadLetterStore

mod connection;
mod dead_letter_store;
mod error;
mod migration;
mod queue_backend;
mod row;

pub use connection::create_pool;
pub use dead_letter_store::SqliteDeadLetterStore;
pub use migration::run_migrations;
pub use queue_backend::SqliteQueueBackend;

// Note: sqlx::Error conversion goes through error::map_sqlx_error
// due to Rust's orphan rules (cannot implement From<sqlx::Error> for AppError here)
