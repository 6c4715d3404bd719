// Domain Layer - Commands, envelopes and queue vocabulary

pub mod command;
pub mod envelope;
pub mod error;
pub mod queue;

// Re-exports
pub use command::{Command, CommandName, CommandPayload};
pub use envelope::{
    DeadLetterRecord, Envelope, EnvelopeId, EnvelopeState, ErrorClass, FailureOutcome,
};
pub use error::DomainError;
pub use queue::{ConsumePolicy, QueueName};
