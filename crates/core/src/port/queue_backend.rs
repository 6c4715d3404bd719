// Queue Backend Port (Interface)

use crate::domain::{Envelope, QueueName};
use crate::error::{AppError, Result};
use async_trait::async_trait;
use std::sync::Arc;

/// Durable store holding named queues of envelopes
///
/// Ordering is FIFO per queue on a best-effort basis: retried envelopes
/// re-enter at the tail, and a distributed store may reorder deliveries.
///
/// `pop` leases an envelope rather than removing it. A leased envelope is
/// invisible to `pop`, `peek` and the counters until it is settled, either by
/// `ack` (gone for good) or by `push` with the same id (back on the queue).
/// Leases left behind by a crashed consumer come back through
/// `release_expired_leases`, which gives at-least-once delivery.
#[async_trait]
pub trait QueueBackend: Send + Sync {
    /// Append an envelope to the queue named by `envelope.queue`
    ///
    /// Replaces a leased envelope with the same id and clears its lease.
    async fn push(&self, envelope: Envelope) -> Result<()>;

    /// Lease and return the oldest available envelope (`None` = empty)
    async fn pop(&self, queue: &str) -> Result<Option<Envelope>>;

    /// Drop a leased envelope after it has been settled
    async fn ack(&self, id: &str) -> Result<()>;

    /// Return the envelope `pop` would return, without leasing it
    async fn peek(&self, queue: &str) -> Result<Option<Envelope>>;

    /// Number of unleased envelopes, including ones waiting on backoff
    async fn len(&self, queue: &str) -> Result<usize>;

    /// Number of envelopes `pop` could hand out right now
    async fn available_len(&self, queue: &str) -> Result<usize>;

    /// Names of all queues currently holding unleased envelopes
    async fn queues(&self) -> Result<Vec<QueueName>>;

    /// Put every envelope leased before `leased_before` back on its queue
    ///
    /// The abandoned delivery counts as an attempt. Returns how many came back.
    async fn release_expired_leases(&self, leased_before: i64) -> Result<usize>;
}

/// Handle on one named queue of a backend
#[derive(Clone)]
pub struct Queue {
    name: QueueName,
    backend: Arc<dyn QueueBackend>,
}

impl Queue {
    pub fn new(name: impl Into<String>, backend: Arc<dyn QueueBackend>) -> Self {
        Self {
            name: name.into(),
            backend,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn push(&self, envelope: Envelope) -> Result<()> {
        if envelope.queue != self.name {
            return Err(AppError::Internal(format!(
                "envelope {} is routed to {} but was pushed onto {}",
                envelope.id, envelope.queue, self.name
            )));
        }
        self.backend.push(envelope).await
    }

    pub async fn pop(&self) -> Result<Option<Envelope>> {
        self.backend.pop(&self.name).await
    }

    pub async fn ack(&self, id: &str) -> Result<()> {
        self.backend.ack(id).await
    }

    pub async fn peek(&self) -> Result<Option<Envelope>> {
        self.backend.peek(&self.name).await
    }

    pub async fn len(&self) -> Result<usize> {
        self.backend.len(&self.name).await
    }

    pub async fn available_len(&self) -> Result<usize> {
        self.backend.available_len(&self.name).await
    }

    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }
}

pub mod mocks {
    use super::*;
    use async_trait::async_trait;

    /// Backend that refuses every push and holds nothing
    pub struct UnavailableBackend {
        reason: String,
    }

    impl UnavailableBackend {
        pub fn new(reason: impl Into<String>) -> Self {
            Self {
                reason: reason.into(),
            }
        }
    }

    #[async_trait]
    impl QueueBackend for UnavailableBackend {
        async fn push(&self, _envelope: Envelope) -> Result<()> {
            Err(AppError::QueueUnavailable(self.reason.clone()))
        }
        async fn pop(&self, _queue: &str) -> Result<Option<Envelope>> {
            Ok(None)
        }
        async fn ack(&self, _id: &str) -> Result<()> {
            Ok(())
        }
        async fn peek(&self, _queue: &str) -> Result<Option<Envelope>> {
            Ok(None)
        }
        async fn len(&self, _queue: &str) -> Result<usize> {
            Ok(0)
        }
        async fn available_len(&self, _queue: &str) -> Result<usize> {
            Ok(0)
        }
        async fn queues(&self) -> Result<Vec<QueueName>> {
            Ok(Vec::new())
        }
        async fn release_expired_leases(&self, _leased_before: i64) -> Result<usize> {
            Ok(0)
        }
    }
}
