// Command Handler Port
// One handler per command name, resolved through the CommandRegistry

use crate::domain::{Command, ErrorClass};
use async_trait::async_trait;
use thiserror::Error;

/// Handler failure, classified for the failure handler
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HandlerError {
    #[error("transient failure: {0}")]
    Transient(String),

    #[error("permanent failure: {0}")]
    Permanent(String),
}

impl HandlerError {
    pub fn class(&self) -> ErrorClass {
        match self {
            HandlerError::Transient(_) => ErrorClass::Transient,
            HandlerError::Permanent(_) => ErrorClass::Permanent,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            HandlerError::Transient(msg) | HandlerError::Permanent(msg) => msg,
        }
    }
}

/// Executes commands of one name
///
/// The same handler runs for inline dispatch and for envelopes pulled off a
/// queue, so it must not care which path delivered the command.
#[async_trait]
pub trait CommandHandler<C: Command>: Send + Sync {
    async fn handle(&self, command: &C) -> Result<(), HandlerError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Records the debug form of every command it handles
    #[derive(Default)]
    pub struct RecordingHandler {
        calls: Mutex<Vec<String>>,
    }

    impl RecordingHandler {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl<C: Command> CommandHandler<C> for RecordingHandler {
        async fn handle(&self, command: &C) -> Result<(), HandlerError> {
            self.calls.lock().unwrap().push(format!("{:?}", command));
            Ok(())
        }
    }

    /// Fails with a fixed error, either forever or for the first N calls
    pub struct FailingHandler {
        error: HandlerError,
        failures_left: Mutex<Option<usize>>,
        call_count: Mutex<usize>,
    }

    impl FailingHandler {
        pub fn always(error: HandlerError) -> Self {
            Self {
                error,
                failures_left: Mutex::new(None),
                call_count: Mutex::new(0),
            }
        }

        pub fn times(error: HandlerError, failures: usize) -> Self {
            Self {
                error,
                failures_left: Mutex::new(Some(failures)),
                call_count: Mutex::new(0),
            }
        }

        pub fn call_count(&self) -> usize {
            *self.call_count.lock().unwrap()
        }
    }

    #[async_trait]
    impl<C: Command> CommandHandler<C> for FailingHandler {
        async fn handle(&self, _command: &C) -> Result<(), HandlerError> {
            *self.call_count.lock().unwrap() += 1;

            let mut left = self.failures_left.lock().unwrap();
            match left.as_mut() {
                None => Err(self.error.clone()),
                Some(0) => Ok(()),
                Some(n) => {
                    *n -= 1;
                    Err(self.error.clone())
                }
            }
        }
    }

    /// Sleeps before succeeding (execution timeout testing)
    pub struct SlowHandler {
        delay: Duration,
    }

    impl SlowHandler {
        pub fn new(delay: Duration) -> Self {
            Self { delay }
        }
    }

    #[async_trait]
    impl<C: Command> CommandHandler<C> for SlowHandler {
        async fn handle(&self, _command: &C) -> Result<(), HandlerError> {
            tokio::time::sleep(self.delay).await;
            Ok(())
        }
    }

    /// Panics on every call (panic isolation testing)
    pub struct PanickingHandler {
        message: String,
    }

    impl PanickingHandler {
        pub fn new(message: impl Into<String>) -> Self {
            Self {
                message: message.into(),
            }
        }
    }

    #[async_trait]
    impl<C: Command> CommandHandler<C> for PanickingHandler {
        async fn handle(&self, _command: &C) -> Result<(), HandlerError> {
            panic!("{}", self.message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let transient = HandlerError::Transient("backend busy".into());
        let permanent = HandlerError::Permanent("bad title".into());

        assert_eq!(transient.class(), ErrorClass::Transient);
        assert_eq!(permanent.class(), ErrorClass::Permanent);
        assert_eq!(permanent.message(), "bad title");
        assert_eq!(transient.to_string(), "transient failure: backend busy");
    }
}
