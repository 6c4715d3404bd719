// Panic isolation for handler execution
//
// Handlers run in their own tokio task; a panic surfaces as a JoinError
// instead of unwinding through the consumer loop.
use std::any::Any;
use tokio::task::JoinError;
use tracing::error;

/// Best-effort text of a panic payload
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}

/// Describe a failed handler task
///
/// Panics are logged here; cancellation is reported as-is.
pub fn describe_join_error(envelope_id: &str, err: JoinError) -> String {
    if err.is_panic() {
        let panic_msg = panic_message(err.into_panic().as_ref());
        error!(
            envelope_id = %envelope_id,
            panic_msg = %panic_msg,
            "Handler task panicked"
        );
        format!("handler panicked: {}", panic_msg)
    } else {
        format!("handler task cancelled: {}", err)
    }
}
