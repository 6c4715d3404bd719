// Dead-letter replay (operator action)
use crate::domain::{Envelope, EnvelopeId};
use crate::error::{AppError, Result};
use crate::port::{DeadLetterStore, QueueBackend, TimeProvider};
use std::sync::Arc;
use tracing::{error, info};

/// Moves dead-lettered envelopes back onto their original queue
pub struct DeadLetterReplayer {
    dead_letters: Arc<dyn DeadLetterStore>,
    backend: Arc<dyn QueueBackend>,
    time_provider: Arc<dyn TimeProvider>,
}

impl DeadLetterReplayer {
    pub fn new(
        dead_letters: Arc<dyn DeadLetterStore>,
        backend: Arc<dyn QueueBackend>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            dead_letters,
            backend,
            time_provider,
        }
    }

    /// Replay one record by envelope ID
    ///
    /// The envelope starts over as Pending with zero attempts. If the push
    /// fails the record is put back so nothing is lost.
    pub async fn replay(&self, id: &str) -> Result<Envelope> {
        let record = self
            .dead_letters
            .take(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("dead-letter record {}", id)))?;

        let mut envelope = record.envelope.clone();
        envelope.reset_for_replay(self.time_provider.now_millis())?;

        if let Err(e) = self.backend.push(envelope.clone()).await {
            error!(envelope_id = %id, error = %e, "Replay push failed, restoring record");
            self.dead_letters.push(record).await?;
            return Err(e);
        }

        info!(
            envelope_id = %envelope.id,
            queue = %envelope.queue,
            command = %envelope.name,
            "Dead-lettered envelope replayed"
        );
        Ok(envelope)
    }

    /// Replay every record currently in the store, oldest failure first
    pub async fn replay_all(&self) -> Result<Vec<EnvelopeId>> {
        let mut replayed = Vec::new();
        for record in self.dead_letters.list().await? {
            let envelope = self.replay(record.id()).await?;
            replayed.push(envelope.id);
        }
        Ok(replayed)
    }
}
