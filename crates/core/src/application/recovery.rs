// Lease recovery (startup)
use crate::error::Result;
use crate::port::{QueueBackend, TimeProvider};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Returns envelopes abandoned on lease to their queues
///
/// A consumer that dies between `pop` and settlement leaves its envelope
/// leased. Once the lease is older than `lease_timeout` no live consumer can
/// still be working on it, so the envelope is put back and the lost delivery
/// counts as an attempt.
pub struct LeaseRecovery {
    backend: Arc<dyn QueueBackend>,
    time_provider: Arc<dyn TimeProvider>,
    lease_timeout: Duration,
}

impl LeaseRecovery {
    /// `lease_timeout` should be the consumers' `ConsumerConfig::settle_window`
    pub fn new(
        backend: Arc<dyn QueueBackend>,
        time_provider: Arc<dyn TimeProvider>,
        lease_timeout: Duration,
    ) -> Self {
        Self {
            backend,
            time_provider,
            lease_timeout,
        }
    }

    /// Release every expired lease, returning how many envelopes came back
    pub async fn recover(&self) -> Result<usize> {
        let timeout_ms = i64::try_from(self.lease_timeout.as_millis()).unwrap_or(i64::MAX);
        let cutoff = self.time_provider.now_millis().saturating_sub(timeout_ms);

        let released = self.backend.release_expired_leases(cutoff).await?;
        if released > 0 {
            warn!(
                released = released,
                cutoff = cutoff,
                "Requeued envelopes abandoned on lease"
            );
        } else {
            info!(cutoff = cutoff, "No abandoned leases");
        }
        Ok(released)
    }
}
