// Consumer Observer Port
// Invoked synchronously by the consumer after each envelope settles

use crate::domain::{Envelope, FailureOutcome};
use crate::port::HandlerError;
use tracing::{error, info, warn};

pub trait ConsumerObserver: Send + Sync {
    fn on_success(&self, _envelope: &Envelope) {}

    fn on_failure(&self, _envelope: &Envelope, _error: &HandlerError, _outcome: &FailureOutcome) {}
}

/// Default observer: one log line per settled envelope
pub struct LoggingObserver;

impl ConsumerObserver for LoggingObserver {
    fn on_success(&self, envelope: &Envelope) {
        info!(
            envelope_id = %envelope.id,
            queue = %envelope.queue,
            command = %envelope.name,
            attempts = envelope.attempts,
            "Envelope processed"
        );
    }

    fn on_failure(&self, envelope: &Envelope, err: &HandlerError, outcome: &FailureOutcome) {
        match outcome {
            FailureOutcome::Retrying { delay_ms } => warn!(
                envelope_id = %envelope.id,
                queue = %envelope.queue,
                attempts = envelope.attempts,
                delay_ms = delay_ms,
                error = %err,
                "Envelope requeued"
            ),
            FailureOutcome::DeadLettered => error!(
                envelope_id = %envelope.id,
                queue = %envelope.queue,
                attempts = envelope.attempts,
                error = %err,
                "Envelope dead-lettered"
            ),
        }
    }
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::Mutex;

    /// Observed consumer event
    #[derive(Debug, Clone, PartialEq)]
    pub enum ObservedEvent {
        Succeeded { envelope_id: String },
        Failed {
            envelope_id: String,
            attempts: u32,
            outcome: FailureOutcome,
        },
    }

    #[derive(Default)]
    pub struct RecordingObserver {
        events: Mutex<Vec<ObservedEvent>>,
    }

    impl RecordingObserver {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn events(&self) -> Vec<ObservedEvent> {
            self.events.lock().unwrap().clone()
        }
    }

    impl ConsumerObserver for RecordingObserver {
        fn on_success(&self, envelope: &Envelope) {
            self.events.lock().unwrap().push(ObservedEvent::Succeeded {
                envelope_id: envelope.id.clone(),
            });
        }

        fn on_failure(&self, envelope: &Envelope, _error: &HandlerError, outcome: &FailureOutcome) {
            self.events.lock().unwrap().push(ObservedEvent::Failed {
                envelope_id: envelope.id.clone(),
                attempts: envelope.attempts,
                outcome: *outcome,
            });
        }
    }
}
