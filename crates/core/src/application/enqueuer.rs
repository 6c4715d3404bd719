// Enqueuer - command -> envelope -> queue

use crate::application::router::QueueRouter;
use crate::domain::{Command, Envelope, EnvelopeId};
use crate::error::Result;
use crate::port::{CommandSerializer, IdProvider, QueueBackend, TimeProvider};
use std::sync::Arc;
use tracing::info;

/// Turns queueable commands into pending envelopes
///
/// Holds no mutable state of its own; concurrent callers only meet at the
/// backend's `push`.
pub struct Enqueuer<C: Command> {
    backend: Arc<dyn QueueBackend>,
    serializer: Arc<dyn CommandSerializer<C>>,
    router: QueueRouter,
    id_provider: Arc<dyn IdProvider>,
    time_provider: Arc<dyn TimeProvider>,
}

impl<C: Command> Enqueuer<C> {
    pub fn new(
        backend: Arc<dyn QueueBackend>,
        serializer: Arc<dyn CommandSerializer<C>>,
        router: QueueRouter,
        id_provider: Arc<dyn IdProvider>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            backend,
            serializer,
            router,
            id_provider,
            time_provider,
        }
    }

    pub fn router(&self) -> &QueueRouter {
        &self.router
    }

    /// Serialize and push a command, returning the new envelope ID
    ///
    /// # Errors
    /// - `AppError::Serialization` if the command cannot be encoded
    /// - `AppError::QueueUnavailable` if the backend rejects the write
    pub async fn enqueue(&self, command: &C) -> Result<EnvelopeId> {
        let payload = self.serializer.serialize(command)?;
        let queue = self.router.queue_for(command.name());

        let envelope = Envelope::new(
            self.id_provider.generate_id(),
            command.name(),
            queue,
            payload,
            self.time_provider.now_millis(),
        );
        let id = envelope.id.clone();
        let queue = envelope.queue.clone();

        self.backend.push(envelope).await?;

        info!(
            envelope_id = %id,
            queue = %queue,
            command = %command.name(),
            "Command enqueued"
        );
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CommandPayload, EnvelopeState};
    use crate::error::AppError;
    use crate::port::id_provider::mocks::SequentialIdProvider;
    use crate::port::time_provider::mocks::FixedTimeProvider;
    use crate::port::queue_backend::mocks::UnavailableBackend;
    use crate::port::{InMemoryQueueBackend, JsonSerializer};
    use crate::testing::TestCommand;

    struct BrokenSerializer;

    impl CommandSerializer<TestCommand> for BrokenSerializer {
        fn serialize(&self, command: &TestCommand) -> Result<CommandPayload> {
            Err(AppError::Serialization(format!("{} not representable", command.name())))
        }
        fn deserialize(&self, _payload: &CommandPayload, name: &str) -> Result<TestCommand> {
            Err(AppError::Serialization(name.to_string()))
        }
    }

    fn enqueuer_with(
        backend: Arc<dyn QueueBackend>,
        serializer: Arc<dyn CommandSerializer<TestCommand>>,
    ) -> Enqueuer<TestCommand> {
        Enqueuer::new(
            backend,
            serializer,
            QueueRouter::new().route("Deliver", "outbound"),
            Arc::new(SequentialIdProvider::new("env")),
            Arc::new(FixedTimeProvider::new(42_000)),
        )
    }

    #[tokio::test]
    async fn test_enqueue_builds_pending_envelope() {
        let backend = Arc::new(InMemoryQueueBackend::new(Arc::new(FixedTimeProvider::new(
            42_000,
        ))));
        let enqueuer = enqueuer_with(backend.clone(), Arc::new(JsonSerializer));

        let id = enqueuer
            .enqueue(&TestCommand::deliver("parcel"))
            .await
            .unwrap();
        assert_eq!(id, "env-1");

        let envelope = backend.peek("outbound").await.unwrap().unwrap();
        assert_eq!(envelope.id, "env-1");
        assert_eq!(envelope.name, "Deliver");
        assert_eq!(envelope.attempts, 0);
        assert_eq!(envelope.state, EnvelopeState::Pending);
        assert_eq!(envelope.enqueued_at, 42_000);
        assert_eq!(envelope.payload.as_value()["message"], "parcel");
    }

    #[tokio::test]
    async fn test_serialization_error() {
        let backend = Arc::new(InMemoryQueueBackend::new(Arc::new(FixedTimeProvider::new(0))));
        let enqueuer = enqueuer_with(backend.clone(), Arc::new(BrokenSerializer));

        let result = enqueuer.enqueue(&TestCommand::deliver("parcel")).await;
        assert!(matches!(result, Err(AppError::Serialization(_))));
        assert_eq!(backend.len("outbound").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_queue_unavailable() {
        let enqueuer = enqueuer_with(Arc::new(UnavailableBackend::new("read-only")), Arc::new(JsonSerializer));

        let result = enqueuer.enqueue(&TestCommand::deliver("parcel")).await;
        assert!(matches!(result, Err(AppError::QueueUnavailable(_))));
    }

    #[tokio::test]
    async fn test_concurrent_enqueue_loses_nothing() {
        let backend = Arc::new(InMemoryQueueBackend::new(Arc::new(FixedTimeProvider::new(0))));
        let enqueuer = Arc::new(enqueuer_with(backend.clone(), Arc::new(JsonSerializer)));

        let mut tasks = tokio::task::JoinSet::new();
        for i in 0..50 {
            let enqueuer = Arc::clone(&enqueuer);
            tasks.spawn(async move {
                enqueuer
                    .enqueue(&TestCommand::deliver(&format!("parcel-{}", i)))
                    .await
            });
        }

        let mut ids = Vec::new();
        while let Some(res) = tasks.join_next().await {
            ids.push(res.unwrap().unwrap());
        }
        ids.sort();
        ids.dedup();

        assert_eq!(ids.len(), 50);
        assert_eq!(backend.len("outbound").await.unwrap(), 50);
    }
}
