// Retry logic for failed envelopes
use crate::application::consumer::constants::{
    DEFAULT_BACKOFF_FACTOR, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_RETRY_DELAY_MS,
    DEFAULT_RETRY_BASE_DELAY_MS,
};
use crate::domain::{Envelope, ErrorClass};
use tracing::{info, warn};

/// Retry decision result
#[derive(Debug, PartialEq, Eq)]
pub enum RetryDecision {
    /// Requeue the envelope (with backoff delay in ms)
    Retry(i64),
    /// Stop retrying; the envelope goes to the dead-letter store
    GiveUp,
}

/// Retry policy
///
/// Decides based on:
/// - Error classification (permanent errors are never retried)
/// - Attempts already made vs. maximum attempts allowed
/// - Backoff factor for exponential delay, capped at `max_delay_ms`
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay_ms: i64,
    backoff_factor: f64,
    max_delay_ms: i64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(
            DEFAULT_MAX_ATTEMPTS,
            DEFAULT_RETRY_BASE_DELAY_MS,
            DEFAULT_BACKOFF_FACTOR,
        )
    }
}

impl RetryPolicy {
    /// Create a new retry policy
    ///
    /// # Arguments
    /// * `max_attempts` - Total deliveries allowed, the first one included
    /// * `base_delay_ms` - Delay before the first retry
    /// * `backoff_factor` - Multiplier applied per further retry
    pub fn new(max_attempts: u32, base_delay_ms: i64, backoff_factor: f64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay_ms: base_delay_ms.max(0),
            backoff_factor,
            max_delay_ms: DEFAULT_MAX_RETRY_DELAY_MS,
        }
    }

    /// Cap every backoff delay at `max_delay_ms`
    pub fn with_max_delay(mut self, max_delay_ms: i64) -> Self {
        self.max_delay_ms = max_delay_ms.max(0);
        self
    }

    pub fn max_delay_ms(&self) -> i64 {
        self.max_delay_ms
    }

    /// Backoff before the next delivery of `envelope`
    ///
    /// delay = base_delay * (backoff_factor ^ (attempts - 1)) * (1.0 ± 0.1),
    /// never above `max_delay_ms`
    pub fn backoff_delay(&self, envelope: &Envelope) -> i64 {
        let exponent = i32::try_from(envelope.attempts.saturating_sub(1)).unwrap_or(i32::MAX);
        let raw_delay_ms = self.base_delay_ms as f64 * self.backoff_factor.powi(exponent);

        // ±10% jitter, deterministic per envelope id
        let jitter_seed = envelope.id.chars().map(|c| c as u32).fold(0u32, u32::wrapping_add);
        let jitter_factor = 0.9 + ((jitter_seed % 21) as f64 / 100.0); // 0.9 to 1.1

        let delay_ms = raw_delay_ms * jitter_factor;
        if delay_ms.is_nan() {
            return 0;
        }
        delay_ms.clamp(0.0, self.max_delay_ms as f64) as i64
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Decide what to do with an envelope whose handler just failed
    ///
    /// `envelope.attempts` already counts the failed delivery.
    pub fn decide(&self, envelope: &Envelope, class: ErrorClass) -> RetryDecision {
        if class == ErrorClass::Permanent {
            warn!(
                envelope_id = %envelope.id,
                attempts = envelope.attempts,
                "Permanent error, skipping retry"
            );
            return RetryDecision::GiveUp;
        }

        if envelope.attempts >= self.max_attempts {
            warn!(
                envelope_id = %envelope.id,
                attempts = envelope.attempts,
                max_attempts = self.max_attempts,
                "Max retry attempts reached"
            );
            return RetryDecision::GiveUp;
        }

        let delay_ms = self.backoff_delay(envelope);

        info!(
            envelope_id = %envelope.id,
            attempt = envelope.attempts,
            max_attempts = self.max_attempts,
            delay_ms = delay_ms,
            "Scheduling retry"
        );

        RetryDecision::Retry(delay_ms)
    }
}
