// Consumer - queue pull loop

pub mod constants;
mod panic_guard;
mod shutdown;

use constants::*;
pub use panic_guard::panic_message;
pub use shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};

use crate::application::dispatcher::Dispatcher;
use crate::application::failure::FailureHandler;
use crate::domain::{Command, ConsumePolicy, Envelope, FailureOutcome, QueueName};
use crate::error::{AppError, Result};
use crate::port::{CommandSerializer, ConsumerObserver, HandlerError, LoggingObserver, QueueBackend};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Consumer tuning
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Per-envelope handler timeout; expiry is a transient failure
    pub execution_timeout: Duration,
    /// Poll interval on an empty queue in blocking mode
    pub idle_sleep: Duration,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            execution_timeout: DEFAULT_EXECUTION_TIMEOUT,
            idle_sleep: IDLE_SLEEP_DURATION,
        }
    }
}

impl ConsumerConfig {
    /// Longest one envelope may stay on lease, pop to settlement
    ///
    /// Bounds both the shutdown grace period and the age at which a lease
    /// counts as abandoned.
    pub fn settle_window(&self) -> Duration {
        self.execution_timeout + SETTLE_MARGIN
    }
}

/// How one popped envelope settled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    Succeeded,
    Failed(FailureOutcome),
    /// Neither store took the failed envelope; it stays on lease
    Unsettled,
}

/// Counters for one consume run
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ConsumeReport {
    pub processed: usize,
    pub succeeded: usize,
    pub retried: usize,
    pub dead_lettered: usize,
    pub unsettled: usize,
}

impl ConsumeReport {
    fn record(&mut self, settlement: Settlement) {
        self.processed += 1;
        match settlement {
            Settlement::Succeeded => self.succeeded += 1,
            Settlement::Failed(FailureOutcome::Retrying { .. }) => self.retried += 1,
            Settlement::Failed(FailureOutcome::DeadLettered) => self.dead_lettered += 1,
            Settlement::Unsettled => self.unsettled += 1,
        }
    }

    /// Add another run's counters to this one
    pub fn merge(&mut self, other: ConsumeReport) {
        self.processed += other.processed;
        self.succeeded += other.succeeded;
        self.retried += other.retried;
        self.dead_lettered += other.dead_lettered;
        self.unsettled += other.unsettled;
    }
}

/// Pulls envelopes off queues and re-dispatches them on the same bus
pub struct Consumer<C: Command> {
    backend: Arc<dyn QueueBackend>,
    dispatcher: Arc<Dispatcher<C>>,
    serializer: Arc<dyn CommandSerializer<C>>,
    failure_handler: Arc<FailureHandler>,
    observer: Arc<dyn ConsumerObserver>,
    config: ConsumerConfig,
}

impl<C: Command> Consumer<C> {
    pub fn new(
        backend: Arc<dyn QueueBackend>,
        dispatcher: Arc<Dispatcher<C>>,
        serializer: Arc<dyn CommandSerializer<C>>,
        failure_handler: Arc<FailureHandler>,
        config: ConsumerConfig,
    ) -> Self {
        Self {
            backend,
            dispatcher,
            serializer,
            failure_handler,
            observer: Arc::new(LoggingObserver),
            config,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn ConsumerObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn config(&self) -> &ConsumerConfig {
        &self.config
    }

    /// Consume one queue under the given policy
    pub async fn consume(
        &self,
        queue: &str,
        policy: ConsumePolicy,
        shutdown: ShutdownToken,
    ) -> Result<ConsumeReport> {
        match policy {
            ConsumePolicy::StopWhenEmpty => self.drain_until(queue, Some(&shutdown)).await,
            ConsumePolicy::BlockUntilAvailable => self.run(queue, shutdown).await,
        }
    }

    /// Stop-when-empty pass over one queue
    ///
    /// Processes at most as many envelopes as were available when the pass
    /// started; anything pushed meanwhile (retries included) and anything
    /// still backing off waits for the next pass.
    pub async fn drain(&self, queue: &str) -> Result<ConsumeReport> {
        self.drain_until(queue, None).await
    }

    /// Drain several queues in sequence
    pub async fn consume_all(&self, queues: &[QueueName]) -> Result<ConsumeReport> {
        self.consume_each(queues, |_| {}).await
    }

    /// `consume_all`, calling `on_queue` before each queue is drained
    pub async fn consume_each<F>(&self, queues: &[QueueName], mut on_queue: F) -> Result<ConsumeReport>
    where
        F: FnMut(&str) + Send,
    {
        let mut total = ConsumeReport::default();
        for queue in queues {
            on_queue(queue);
            total.merge(self.drain(queue).await?);
        }
        info!(
            queues = queues.len(),
            processed = total.processed,
            succeeded = total.succeeded,
            retried = total.retried,
            dead_lettered = total.dead_lettered,
            unsettled = total.unsettled,
            "Queues drained"
        );
        Ok(total)
    }

    async fn drain_until(
        &self,
        queue: &str,
        shutdown: Option<&ShutdownToken>,
    ) -> Result<ConsumeReport> {
        let budget = self.backend.available_len(queue).await?;
        let mut report = ConsumeReport::default();
        debug!(queue = %queue, budget = budget, "Draining queue");

        while report.processed < budget {
            if shutdown.is_some_and(ShutdownToken::is_shutdown) {
                info!(queue = %queue, "Drain interrupted by shutdown");
                break;
            }
            match self.process_next(queue).await? {
                Some(settlement) => report.record(settlement),
                None => break,
            }
        }
        Ok(report)
    }

    /// Blocking loop: poll until the shutdown token fires
    pub async fn run(&self, queue: &str, mut shutdown: ShutdownToken) -> Result<ConsumeReport> {
        info!(queue = %queue, "Consumer started");
        let mut report = ConsumeReport::default();
        loop {
            if shutdown.is_shutdown() {
                info!(queue = %queue, "Consumer shutting down");
                break;
            }
            match self.process_next(queue).await {
                Ok(Some(settlement)) => report.record(settlement),
                Ok(None) => {
                    // Nothing available, sleep briefly (or wait for shutdown)
                    tokio::select! {
                        _ = sleep(self.config.idle_sleep) => {},
                        _ = shutdown.wait() => {
                            info!(queue = %queue, "Consumer interrupted during idle");
                            break;
                        }
                    }
                }
                Err(e) => {
                    error!(queue = %queue, error = %e, "Consumer error");
                    tokio::select! {
                        _ = sleep(ERROR_RECOVERY_SLEEP_DURATION) => {},
                        _ = shutdown.wait() => {
                            info!(queue = %queue, "Consumer interrupted during error recovery");
                            break;
                        }
                    }
                }
            }
        }
        info!(
            queue = %queue,
            processed = report.processed,
            "Consumer stopped"
        );
        Ok(report)
    }

    /// Pop and settle the next available envelope (`None` = queue empty)
    ///
    /// Only a failing `pop` is returned as an error; handler failures are
    /// settled by the failure handler, and a settlement that cannot be stored
    /// leaves the envelope on lease.
    pub async fn process_next(&self, queue: &str) -> Result<Option<Settlement>> {
        let mut envelope = match self.backend.pop(queue).await? {
            Some(env) => env,
            None => return Ok(None),
        };
        envelope.record_attempt();

        info!(
            envelope_id = %envelope.id,
            queue = %envelope.queue,
            command = %envelope.name,
            attempts = envelope.attempts,
            "Processing envelope"
        );

        let outcome = match self.serializer.deserialize(&envelope.payload, &envelope.name) {
            Ok(command) => self.execute(&envelope, command).await,
            Err(e) => Err(HandlerError::Permanent(e.to_string())),
        };

        match outcome {
            Ok(()) => {
                if let Err(e) = self.backend.ack(&envelope.id).await {
                    warn!(
                        envelope_id = %envelope.id,
                        error = %e,
                        "Ack failed, envelope will be redelivered after lease recovery"
                    );
                }
                self.observer.on_success(&envelope);
                Ok(Some(Settlement::Succeeded))
            }
            Err(err) => {
                let observed = envelope.clone();
                match self.failure_handler.handle(envelope, &err).await {
                    Ok(outcome) => {
                        self.observer.on_failure(&observed, &err, &outcome);
                        Ok(Some(Settlement::Failed(outcome)))
                    }
                    Err(e) => {
                        error!(
                            envelope_id = %observed.id,
                            queue = %observed.queue,
                            error = %e,
                            "Failed envelope could not be settled, left on lease"
                        );
                        Ok(Some(Settlement::Unsettled))
                    }
                }
            }
        }
    }

    /// Run the handler in its own task under the execution timeout
    ///
    /// A panic or a cancelled task is permanent, a timeout is transient (and
    /// aborts the task). Dispatch errors other than handler errors, e.g. an
    /// unknown command name, are permanent.
    async fn execute(&self, envelope: &Envelope, command: C) -> std::result::Result<(), HandlerError> {
        let dispatcher = Arc::clone(&self.dispatcher);
        let mut handle = tokio::task::spawn(async move { dispatcher.execute(&command).await });

        match tokio::time::timeout(self.config.execution_timeout, &mut handle).await {
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(AppError::HandlerExecution(err)))) => Err(err),
            Ok(Ok(Err(other))) => Err(HandlerError::Permanent(other.to_string())),
            Ok(Err(join_err)) => Err(HandlerError::Permanent(
                panic_guard::describe_join_error(&envelope.id, join_err),
            )),
            Err(_elapsed) => {
                handle.abort();
                Err(HandlerError::Transient(format!(
                    "handler timed out after {}ms",
                    self.config.execution_timeout.as_millis()
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::enqueuer::Enqueuer;
    use crate::application::registry::CommandRegistry;
    use crate::application::retry::RetryPolicy;
    use crate::application::router::QueueRouter;
    use crate::domain::{CommandPayload, EnvelopeState, ErrorClass};
    use crate::port::handler::mocks::{
        FailingHandler, PanickingHandler, RecordingHandler, SlowHandler,
    };
    use crate::port::dead_letter_store::mocks::UnavailableDeadLetterStore;
    use crate::port::id_provider::mocks::SequentialIdProvider;
    use crate::port::observer::mocks::{ObservedEvent, RecordingObserver};
    use crate::port::queue_backend::mocks::UnavailableBackend;
    use crate::port::time_provider::mocks::FixedTimeProvider;
    use crate::port::{
        CommandHandler, DeadLetterStore, InMemoryDeadLetterStore, InMemoryQueueBackend,
        JsonSerializer, TimeProvider,
    };
    use crate::testing::TestCommand;
    use async_trait::async_trait;
    use serde_json::json;

    struct Fixture {
        clock: Arc<FixedTimeProvider>,
        backend: Arc<InMemoryQueueBackend>,
        dead_letters: Arc<InMemoryDeadLetterStore>,
        enqueuer: Arc<Enqueuer<TestCommand>>,
        dispatcher: Arc<Dispatcher<TestCommand>>,
        observer: Arc<RecordingObserver>,
        consumer: Consumer<TestCommand>,
    }

    impl Fixture {
        /// Same bus, failures settled into the given stores
        fn consumer_settling_into(
            &self,
            backend: Arc<dyn QueueBackend>,
            dead_letters: Arc<dyn DeadLetterStore>,
        ) -> Consumer<TestCommand> {
            let failure_handler = Arc::new(FailureHandler::new(
                backend,
                dead_letters,
                RetryPolicy::new(3, 1_000, 2.0),
                self.clock.clone(),
            ));
            Consumer::new(
                self.backend.clone(),
                self.dispatcher.clone(),
                Arc::new(JsonSerializer),
                failure_handler,
                ConsumerConfig::default(),
            )
        }
    }

    /// Builds a bus whose "Deliver" handler is `deliver`; Ping is recorded
    fn fixture_with(
        deliver: Arc<dyn CommandHandler<TestCommand>>,
        policy: RetryPolicy,
        config: ConsumerConfig,
    ) -> Fixture {
        let clock = Arc::new(FixedTimeProvider::new(1_000));
        let backend = Arc::new(InMemoryQueueBackend::new(clock.clone()));
        let dead_letters = Arc::new(InMemoryDeadLetterStore::new());
        let serializer: Arc<dyn CommandSerializer<TestCommand>> = Arc::new(JsonSerializer);

        let enqueuer = Arc::new(Enqueuer::new(
            backend.clone(),
            serializer.clone(),
            QueueRouter::new(),
            Arc::new(SequentialIdProvider::new("env")),
            clock.clone(),
        ));

        let mut registry = CommandRegistry::<TestCommand>::new();
        registry.register("Deliver", deliver).unwrap();
        registry
            .register("Ping", Arc::new(RecordingHandler::new()))
            .unwrap();
        let dispatcher =
            Arc::new(Dispatcher::new(Arc::new(registry)).with_enqueuer(enqueuer.clone()));

        let failure_handler = Arc::new(FailureHandler::new(
            backend.clone(),
            dead_letters.clone(),
            policy,
            clock.clone(),
        ));
        let observer = Arc::new(RecordingObserver::new());
        let consumer = Consumer::new(
            backend.clone(),
            dispatcher.clone(),
            serializer,
            failure_handler,
            config,
        )
        .with_observer(observer.clone());

        Fixture {
            clock,
            backend,
            dead_letters,
            enqueuer,
            dispatcher,
            observer,
            consumer,
        }
    }

    fn fixture(deliver: Arc<dyn CommandHandler<TestCommand>>) -> Fixture {
        fixture_with(deliver, RetryPolicy::new(3, 0, 2.0), ConsumerConfig::default())
    }

    #[tokio::test]
    async fn test_drain_runs_handlers_and_empties_queue() {
        let handler = Arc::new(RecordingHandler::new());
        let fx = fixture(handler.clone());

        fx.enqueuer.enqueue(&TestCommand::deliver("one")).await.unwrap();
        fx.enqueuer.enqueue(&TestCommand::deliver("two")).await.unwrap();

        let report = fx.consumer.drain("deliver").await.unwrap();

        assert_eq!(
            report,
            ConsumeReport {
                processed: 2,
                succeeded: 2,
                retried: 0,
                dead_lettered: 0,
                unsettled: 0,
            }
        );
        assert_eq!(
            handler.calls(),
            vec![
                format!("{:?}", TestCommand::deliver("one")),
                format!("{:?}", TestCommand::deliver("two")),
            ]
        );
        assert_eq!(fx.backend.len("deliver").await.unwrap(), 0);
        assert_eq!(fx.backend.leased_len().unwrap(), 0);
        assert_eq!(
            fx.observer.events(),
            vec![
                ObservedEvent::Succeeded {
                    envelope_id: "env-1".into()
                },
                ObservedEvent::Succeeded {
                    envelope_id: "env-2".into()
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_drain_empty_queue_returns_immediately() {
        let fx = fixture(Arc::new(RecordingHandler::new()));
        let report = fx.consumer.drain("deliver").await.unwrap();
        assert_eq!(report, ConsumeReport::default());
    }

    /// Enqueues another Deliver every time it runs
    struct ReEnqueuingHandler {
        enqueuer: std::sync::Mutex<Option<Arc<Enqueuer<TestCommand>>>>,
        calls: std::sync::atomic::AtomicUsize,
    }

    #[async_trait]
    impl CommandHandler<TestCommand> for ReEnqueuingHandler {
        async fn handle(&self, _command: &TestCommand) -> std::result::Result<(), HandlerError> {
            self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            let enqueuer = self.enqueuer.lock().unwrap().clone();
            if let Some(enqueuer) = enqueuer {
                enqueuer
                    .enqueue(&TestCommand::deliver("again"))
                    .await
                    .map_err(|e| HandlerError::Transient(e.to_string()))?;
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_drain_processes_only_the_starting_snapshot() {
        let handler = Arc::new(ReEnqueuingHandler {
            enqueuer: std::sync::Mutex::new(None),
            calls: std::sync::atomic::AtomicUsize::new(0),
        });
        let fx = fixture(handler.clone());
        *handler.enqueuer.lock().unwrap() = Some(fx.enqueuer.clone());

        for i in 0..3 {
            fx.enqueuer
                .enqueue(&TestCommand::deliver(&i.to_string()))
                .await
                .unwrap();
        }

        let report = fx.consumer.drain("deliver").await.unwrap();

        assert_eq!(report.processed, 3);
        assert_eq!(handler.calls.load(std::sync::atomic::Ordering::SeqCst), 3);
        // Each run pushed a new envelope; those wait for the next pass
        assert_eq!(fx.backend.len("deliver").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_drain_budget_ignores_envelopes_still_backing_off() {
        let handler = Arc::new(ReEnqueuingHandler {
            enqueuer: std::sync::Mutex::new(None),
            calls: std::sync::atomic::AtomicUsize::new(0),
        });
        let fx = fixture(handler.clone());
        *handler.enqueuer.lock().unwrap() = Some(fx.enqueuer.clone());

        let mut waiting = Envelope::new(
            "waiting",
            "Deliver",
            "deliver",
            CommandPayload::new(json!({"message": "waiting"})),
            1_000,
        );
        waiting.schedule_retry(60_000).unwrap();
        fx.backend.push(waiting).await.unwrap();
        fx.enqueuer.enqueue(&TestCommand::deliver("ready")).await.unwrap();

        let report = fx.consumer.drain("deliver").await.unwrap();

        // Only "ready" was available; the envelope its handler pushed waits
        assert_eq!(report.processed, 1);
        assert_eq!(handler.calls.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(fx.backend.len("deliver").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_transient_failures_dead_letter_after_max_attempts() {
        let handler = Arc::new(FailingHandler::always(HandlerError::Transient(
            "backend busy".into(),
        )));
        let fx = fixture(handler.clone());
        fx.enqueuer.enqueue(&TestCommand::deliver("x")).await.unwrap();

        // Each pass sees one envelope: attempt 1 and 2 requeue, 3 dead-letters
        let first = fx.consumer.drain("deliver").await.unwrap();
        let second = fx.consumer.drain("deliver").await.unwrap();
        let third = fx.consumer.drain("deliver").await.unwrap();
        let fourth = fx.consumer.drain("deliver").await.unwrap();

        assert_eq!(first.retried, 1);
        assert_eq!(second.retried, 1);
        assert_eq!(third.dead_lettered, 1);
        assert_eq!(fourth, ConsumeReport::default());
        assert_eq!(handler.call_count(), 3);

        let records = fx.dead_letters.list().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].envelope.attempts, 3);
        assert_eq!(records[0].envelope.state, EnvelopeState::DeadLettered);
        assert_eq!(records[0].error_class, ErrorClass::Transient);
        assert_eq!(records[0].last_error, "backend busy");
        assert_eq!(fx.backend.len("deliver").await.unwrap(), 0);

        let events = fx.observer.events();
        assert_eq!(events.len(), 3);
        assert_eq!(
            events[2],
            ObservedEvent::Failed {
                envelope_id: "env-1".into(),
                attempts: 3,
                outcome: FailureOutcome::DeadLettered,
            }
        );
    }

    #[tokio::test]
    async fn test_transient_failure_then_success() {
        let handler = Arc::new(FailingHandler::times(
            HandlerError::Transient("flaky".into()),
            1,
        ));
        let fx = fixture(handler.clone());
        fx.enqueuer.enqueue(&TestCommand::deliver("x")).await.unwrap();

        let first = fx.consumer.drain("deliver").await.unwrap();
        let second = fx.consumer.drain("deliver").await.unwrap();

        assert_eq!(first.retried, 1);
        assert_eq!(second.succeeded, 1);
        assert_eq!(fx.dead_letters.len().await.unwrap(), 0);
        assert_eq!(fx.backend.len("deliver").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_backoff_delays_redelivery() {
        let handler = Arc::new(FailingHandler::times(
            HandlerError::Transient("flaky".into()),
            1,
        ));
        let fx = fixture_with(
            handler.clone(),
            RetryPolicy::new(3, 10_000, 2.0),
            ConsumerConfig::default(),
        );
        fx.enqueuer.enqueue(&TestCommand::deliver("x")).await.unwrap();

        assert_eq!(fx.consumer.drain("deliver").await.unwrap().retried, 1);

        // Still backing off: counted by len, invisible to pop
        let waiting = fx.consumer.drain("deliver").await.unwrap();
        assert_eq!(waiting.processed, 0);
        assert_eq!(fx.backend.len("deliver").await.unwrap(), 1);

        fx.clock.advance(11_000);
        assert_eq!(fx.consumer.drain("deliver").await.unwrap().succeeded, 1);
        assert_eq!(handler.call_count(), 2);
    }

    #[tokio::test]
    async fn test_permanent_failure_skips_retry() {
        let handler = Arc::new(FailingHandler::always(HandlerError::Permanent(
            "no such title".into(),
        )));
        let fx = fixture(handler.clone());
        fx.enqueuer.enqueue(&TestCommand::deliver("x")).await.unwrap();

        let report = fx.consumer.drain("deliver").await.unwrap();

        assert_eq!(report.dead_lettered, 1);
        assert_eq!(handler.call_count(), 1);
        let records = fx.dead_letters.list().await.unwrap();
        assert_eq!(records[0].error_class, ErrorClass::Permanent);
        assert_eq!(records[0].envelope.attempts, 1);
    }

    #[tokio::test]
    async fn test_undecodable_payload_is_permanent() {
        let fx = fixture(Arc::new(RecordingHandler::new()));
        fx.backend
            .push(Envelope::new(
                "bad-1",
                "Deliver",
                "deliver",
                CommandPayload::new(json!({"unexpected": true})),
                1_000,
            ))
            .await
            .unwrap();

        let report = fx.consumer.drain("deliver").await.unwrap();

        assert_eq!(report.dead_lettered, 1);
        let records = fx.dead_letters.list().await.unwrap();
        assert_eq!(records[0].id(), "bad-1");
        assert_eq!(records[0].error_class, ErrorClass::Permanent);
    }

    #[tokio::test]
    async fn test_unregistered_command_is_permanent() {
        let fx = fixture(Arc::new(RecordingHandler::new()));
        fx.backend
            .push(Envelope::new(
                "noop-1",
                "Noop",
                "noop",
                CommandPayload::new(serde_json::Value::Null),
                1_000,
            ))
            .await
            .unwrap();

        let report = fx.consumer.drain("noop").await.unwrap();

        assert_eq!(report.dead_lettered, 1);
        let records = fx.dead_letters.list().await.unwrap();
        assert!(records[0].last_error.contains("Noop"));
    }

    #[tokio::test]
    async fn test_handler_panic_is_isolated() {
        let fx = fixture(Arc::new(PanickingHandler::new("handler exploded")));
        fx.enqueuer.enqueue(&TestCommand::deliver("x")).await.unwrap();
        fx.enqueuer.enqueue(&TestCommand::deliver("y")).await.unwrap();

        // Both envelopes settle; the consumer itself survives
        let report = fx.consumer.drain("deliver").await.unwrap();

        assert_eq!(report.processed, 2);
        assert_eq!(report.dead_lettered, 2);
        let records = fx.dead_letters.list().await.unwrap();
        assert_eq!(records[0].error_class, ErrorClass::Permanent);
        assert!(records[0].last_error.contains("handler exploded"));
    }

    #[tokio::test]
    async fn test_execution_timeout_is_transient() {
        let fx = fixture_with(
            Arc::new(SlowHandler::new(Duration::from_secs(5))),
            RetryPolicy::new(3, 0, 2.0),
            ConsumerConfig {
                execution_timeout: Duration::from_millis(20),
                idle_sleep: IDLE_SLEEP_DURATION,
            },
        );
        fx.enqueuer.enqueue(&TestCommand::deliver("x")).await.unwrap();

        let report = fx.consumer.drain("deliver").await.unwrap();

        assert_eq!(report.retried, 1);
        let requeued = fx.backend.peek("deliver").await.unwrap().unwrap();
        assert_eq!(requeued.state, EnvelopeState::Retrying);
        assert_eq!(requeued.attempts, 1);
    }

    #[tokio::test]
    async fn test_consume_all_sums_reports() {
        let fx = fixture(Arc::new(RecordingHandler::new()));
        fx.enqueuer.enqueue(&TestCommand::deliver("x")).await.unwrap();
        fx.backend
            .push(Envelope::new(
                "ping-1",
                "Ping",
                "ping",
                CommandPayload::new(json!({"message": "hi"})),
                1_000,
            ))
            .await
            .unwrap();

        let report = fx
            .consumer
            .consume_all(&["deliver".to_string(), "ping".to_string()])
            .await
            .unwrap();

        assert_eq!(report.processed, 2);
        assert_eq!(report.succeeded, 2);
    }

    #[tokio::test]
    async fn test_consume_each_reports_every_queue() {
        let fx = fixture(Arc::new(RecordingHandler::new()));
        fx.enqueuer.enqueue(&TestCommand::deliver("x")).await.unwrap();

        let mut visited = Vec::new();
        let report = fx
            .consumer
            .consume_each(&["deliver".to_string(), "ping".to_string()], |queue| {
                visited.push(queue.to_string())
            })
            .await
            .unwrap();

        assert_eq!(visited, vec!["deliver".to_string(), "ping".to_string()]);
        assert_eq!(report.succeeded, 1);
    }

    #[tokio::test]
    async fn test_blocking_consumer_picks_up_new_work_until_shutdown() {
        let handler = Arc::new(RecordingHandler::new());
        let fx = fixture_with(
            handler.clone(),
            RetryPolicy::default(),
            ConsumerConfig {
                execution_timeout: DEFAULT_EXECUTION_TIMEOUT,
                idle_sleep: Duration::from_millis(5),
            },
        );
        let consumer = Arc::new(fx.consumer);
        let (tx, token) = shutdown_channel();

        let running = Arc::clone(&consumer);
        let loop_handle = tokio::spawn(async move {
            running
                .consume("deliver", ConsumePolicy::BlockUntilAvailable, token)
                .await
        });

        fx.enqueuer.enqueue(&TestCommand::deliver("late")).await.unwrap();

        for _ in 0..200 {
            if handler.call_count() == 1 {
                break;
            }
            sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(handler.call_count(), 1);

        tx.shutdown();
        let report = tokio::time::timeout(Duration::from_secs(1), loop_handle)
            .await
            .expect("consumer should stop")
            .unwrap();
        let report = tokio_test::assert_ok!(report);
        assert_eq!(report.succeeded, 1);
    }

    #[tokio::test]
    async fn test_stop_when_empty_honours_shutdown() {
        let fx = fixture(Arc::new(RecordingHandler::new()));
        fx.enqueuer.enqueue(&TestCommand::deliver("x")).await.unwrap();

        let (tx, token) = shutdown_channel();
        tx.shutdown();

        let report = fx
            .consumer
            .consume("deliver", ConsumePolicy::StopWhenEmpty, token)
            .await
            .unwrap();

        assert_eq!(report.processed, 0);
        assert_eq!(fx.backend.len("deliver").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_rejected_dead_letters_do_not_stop_the_pass() {
        let fx = fixture(Arc::new(FailingHandler::always(HandlerError::Permanent(
            "no such title".into(),
        ))));
        let consumer =
            fx.consumer_settling_into(fx.backend.clone(), Arc::new(UnavailableDeadLetterStore));
        fx.enqueuer.enqueue(&TestCommand::deliver("a")).await.unwrap();
        fx.enqueuer.enqueue(&TestCommand::deliver("b")).await.unwrap();

        let report = consumer.drain("deliver").await.unwrap();

        // Both were attempted and both went back on the queue
        assert_eq!(report.processed, 2);
        assert_eq!(report.retried, 2);
        assert_eq!(fx.backend.len("deliver").await.unwrap(), 2);
        assert_eq!(fx.backend.leased_len().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unsettled_failure_stays_leased_until_recovered() {
        let fx = fixture(Arc::new(FailingHandler::always(HandlerError::Permanent(
            "no such title".into(),
        ))));
        let consumer = fx.consumer_settling_into(
            Arc::new(UnavailableBackend::new("down")),
            Arc::new(UnavailableDeadLetterStore),
        );
        fx.enqueuer.enqueue(&TestCommand::deliver("a")).await.unwrap();

        let report = consumer.drain("deliver").await.unwrap();

        assert_eq!(report.processed, 1);
        assert_eq!(report.unsettled, 1);
        assert_eq!(fx.backend.len("deliver").await.unwrap(), 0);
        assert_eq!(fx.backend.leased_len().unwrap(), 1);

        fx.clock.advance(1);
        let released = fx.backend.release_expired_leases(fx.clock.now_millis()).await.unwrap();
        assert_eq!(released, 1);
        assert_eq!(fx.backend.len("deliver").await.unwrap(), 1);
    }

    #[test]
    fn test_settle_window_covers_the_execution_timeout() {
        let config = ConsumerConfig {
            execution_timeout: Duration::from_secs(30),
            idle_sleep: IDLE_SLEEP_DURATION,
        };
        assert!(config.settle_window() > config.execution_timeout);
        assert_eq!(config.settle_window(), Duration::from_secs(30) + SETTLE_MARGIN);
    }
}
