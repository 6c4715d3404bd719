// Failure handling: requeue with backoff or dead-letter
use crate::application::retry::{RetryDecision, RetryPolicy};
use crate::domain::{DeadLetterRecord, Envelope, ErrorClass, FailureOutcome};
use crate::error::Result;
use crate::port::{DeadLetterStore, HandlerError, QueueBackend, TimeProvider};
use std::sync::Arc;
use tracing::{error, warn};

/// Settles an envelope whose handler failed
///
/// The envelope is on lease from `pop`. It ends up either back on its queue
/// or in the dead-letter store. When the chosen store rejects the write the
/// other one is tried; only when both fail does the lease stay in place, for
/// lease recovery to pick up later.
pub struct FailureHandler {
    backend: Arc<dyn QueueBackend>,
    dead_letters: Arc<dyn DeadLetterStore>,
    retry_policy: RetryPolicy,
    time_provider: Arc<dyn TimeProvider>,
}

impl FailureHandler {
    pub fn new(
        backend: Arc<dyn QueueBackend>,
        dead_letters: Arc<dyn DeadLetterStore>,
        retry_policy: RetryPolicy,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            backend,
            dead_letters,
            retry_policy,
            time_provider,
        }
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    /// Route a failed envelope
    ///
    /// `envelope.attempts` must already include the failed delivery.
    pub async fn handle(&self, envelope: Envelope, err: &HandlerError) -> Result<FailureOutcome> {
        let class = err.class();
        let now = self.time_provider.now_millis();

        warn!(
            envelope_id = %envelope.id,
            queue = %envelope.queue,
            command = %envelope.name,
            attempts = envelope.attempts,
            error_class = %class,
            error = %err.message(),
            "Handler failed"
        );

        match self.retry_policy.decide(&envelope, class) {
            RetryDecision::Retry(delay_ms) => {
                match self.requeue(envelope.clone(), now, delay_ms).await {
                    Ok(()) => Ok(FailureOutcome::Retrying { delay_ms }),
                    Err(e) => {
                        error!(
                            envelope_id = %envelope.id,
                            error = %e,
                            "Requeue failed, dead-lettering instead"
                        );
                        self.dead_letter(envelope, err, class, now).await?;
                        Ok(FailureOutcome::DeadLettered)
                    }
                }
            }
            RetryDecision::GiveUp => {
                match self.dead_letter(envelope.clone(), err, class, now).await {
                    Ok(()) => Ok(FailureOutcome::DeadLettered),
                    Err(e) => {
                        let delay_ms = self.retry_policy.backoff_delay(&envelope);
                        error!(
                            envelope_id = %envelope.id,
                            error = %e,
                            delay_ms = delay_ms,
                            "Dead-letter store rejected envelope, requeueing instead"
                        );
                        self.requeue(envelope, now, delay_ms).await?;
                        Ok(FailureOutcome::Retrying { delay_ms })
                    }
                }
            }
        }
    }

    async fn requeue(&self, mut envelope: Envelope, now: i64, delay_ms: i64) -> Result<()> {
        envelope.schedule_retry(now.saturating_add(delay_ms))?;
        self.backend.push(envelope).await
    }

    async fn dead_letter(
        &self,
        mut envelope: Envelope,
        err: &HandlerError,
        class: ErrorClass,
        now: i64,
    ) -> Result<()> {
        let id = envelope.id.clone();
        envelope.dead_letter()?;
        error!(
            envelope_id = %envelope.id,
            queue = %envelope.queue,
            attempts = envelope.attempts,
            error_class = %class,
            "Moving envelope to dead-letter store"
        );
        let record = DeadLetterRecord::new(envelope, err.message(), class, now);
        self.dead_letters.push(record).await?;

        // The record is safe; a lingering lease only means a later redelivery
        if let Err(e) = self.backend.ack(&id).await {
            warn!(envelope_id = %id, error = %e, "Could not release dead-lettered envelope");
        }
        Ok(())
    }
}
