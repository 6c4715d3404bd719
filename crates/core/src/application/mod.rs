// Application Layer - Dispatch, queueing and consumption

pub mod consumer;
pub mod dead_letter;
pub mod dispatcher;
pub mod enqueuer;
pub mod failure;
pub mod recovery;
pub mod registry;
pub mod retry;
pub mod router;

// Re-exports
pub use consumer::{
    shutdown_channel, ConsumeReport, Consumer, ConsumerConfig, Settlement, ShutdownSender,
    ShutdownToken,
};
pub use dead_letter::DeadLetterReplayer;
pub use dispatcher::{DispatchOutcome, Dispatcher};
pub use enqueuer::Enqueuer;
pub use failure::FailureHandler;
pub use recovery::LeaseRecovery;
pub use registry::CommandRegistry;
pub use retry::{RetryDecision, RetryPolicy};
pub use router::QueueRouter;
