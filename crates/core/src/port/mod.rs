// Port Layer - Interfaces for handlers, storage and collaborators

pub mod dead_letter_store;
pub mod handler;
pub mod id_provider; // For deterministic testing
pub mod in_memory;
pub mod observer;
pub mod queue_backend;
pub mod serializer;
pub mod time_provider;

// Re-exports
pub use dead_letter_store::DeadLetterStore;
pub use handler::{CommandHandler, HandlerError};
pub use id_provider::{IdProvider, UuidProvider};
pub use in_memory::{InMemoryDeadLetterStore, InMemoryQueueBackend};
pub use observer::{ConsumerObserver, LoggingObserver};
pub use queue_backend::{Queue, QueueBackend};
pub use serializer::{CommandSerializer, JsonSerializer};
pub use time_provider::{SystemTimeProvider, TimeProvider};
