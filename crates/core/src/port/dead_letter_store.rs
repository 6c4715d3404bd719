// Dead-Letter Store Port (Interface)

use crate::domain::DeadLetterRecord;
use crate::error::{AppError, Result};
use async_trait::async_trait;

/// Terminal store for envelopes that exhausted their retries
///
/// Records only leave through `take`, i.e. an operator replaying them.
#[async_trait]
pub trait DeadLetterStore: Send + Sync {
    /// Store a record, replacing any earlier one for the same envelope ID
    async fn push(&self, record: DeadLetterRecord) -> Result<()>;

    /// All records, oldest failure first
    async fn list(&self) -> Result<Vec<DeadLetterRecord>>;

    /// Remove a record by envelope ID
    async fn take(&self, id: &str) -> Result<Option<DeadLetterRecord>>;

    async fn len(&self) -> Result<usize>;
}

pub mod mocks {
    use super::*;

    /// Store that refuses every write and holds nothing
    pub struct UnavailableDeadLetterStore;

    #[async_trait]
    impl DeadLetterStore for UnavailableDeadLetterStore {
        async fn push(&self, _record: DeadLetterRecord) -> Result<()> {
            Err(AppError::QueueUnavailable("dead-letter store down".into()))
        }
        async fn list(&self) -> Result<Vec<DeadLetterRecord>> {
            Ok(Vec::new())
        }
        async fn take(&self, _id: &str) -> Result<Option<DeadLetterRecord>> {
            Ok(None)
        }
        async fn len(&self) -> Result<usize> {
            Ok(0)
        }
    }
}
