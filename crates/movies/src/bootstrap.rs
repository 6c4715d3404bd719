// MovieBus - DI wiring for the movie demo

use crate::command::{Action, MovieCommand, BUY_MOVIE, RENT_MOVIE};
use crate::handlers::{BuyMovieHandler, OutputSink, RentMovieHandler};
use crate::settings::{QueueTarget, Settings};
use cmdbus_core::application::{
    CommandRegistry, ConsumeReport, Consumer, DeadLetterReplayer, DispatchOutcome, Dispatcher,
    Enqueuer, FailureHandler, LeaseRecovery, QueueRouter,
};
use cmdbus_core::domain::QueueName;
use cmdbus_core::error::{AppError, Result};
use cmdbus_core::port::{
    CommandSerializer, DeadLetterStore, IdProvider, InMemoryDeadLetterStore,
    InMemoryQueueBackend, JsonSerializer, QueueBackend, SystemTimeProvider, TimeProvider,
    UuidProvider,
};
use cmdbus_infra_sqlite::{create_pool, run_migrations, SqliteDeadLetterStore, SqliteQueueBackend};
use std::sync::Arc;
use tracing::info;

/// Queue RentMovie envelopes land on
pub const RENT_MOVIE_QUEUE: &str = "rent-movie";

/// Storage the bus runs on
pub struct Stores {
    pub backend: Arc<dyn QueueBackend>,
    pub dead_letters: Arc<dyn DeadLetterStore>,
}

impl Stores {
    pub fn in_memory(time_provider: Arc<dyn TimeProvider>) -> Self {
        Self {
            backend: Arc::new(InMemoryQueueBackend::new(time_provider)),
            dead_letters: Arc::new(InMemoryDeadLetterStore::new()),
        }
    }

    /// Open the stores `QUEUE_URL` points at (sqlite: runs migrations)
    pub async fn open(settings: &Settings, time_provider: Arc<dyn TimeProvider>) -> Result<Self> {
        match settings.queue_target()? {
            QueueTarget::Memory => {
                info!("Using in-memory queue backend");
                Ok(Self::in_memory(time_provider))
            }
            QueueTarget::Sqlite { url, path } => {
                if let Some(parent) = path.as_deref().and_then(|p| p.parent()) {
                    if !parent.as_os_str().is_empty() {
                        std::fs::create_dir_all(parent).map_err(|e| {
                            AppError::QueueUnavailable(format!(
                                "cannot create {}: {}",
                                parent.display(),
                                e
                            ))
                        })?;
                    }
                }

                info!(queue_url = %url, "Opening SQLite queue backend");
                let pool = create_pool(&url).await?;
                run_migrations(&pool).await?;

                Ok(Self {
                    backend: Arc::new(SqliteQueueBackend::new(pool.clone(), time_provider)),
                    dead_letters: Arc::new(SqliteDeadLetterStore::new(pool)),
                })
            }
        }
    }
}

/// Fully wired command bus for the movie demo
pub struct MovieBus {
    dispatcher: Arc<Dispatcher<MovieCommand>>,
    consumer: Arc<Consumer<MovieCommand>>,
    replayer: DeadLetterReplayer,
    recovery: LeaseRecovery,
    router: QueueRouter,
    stores: Stores,
}

impl MovieBus {
    /// Build from settings with system clock and UUID ids
    ///
    /// Envelopes abandoned on lease by a crashed process are requeued before
    /// the bus is handed out.
    pub async fn build(settings: &Settings, sink: Arc<dyn OutputSink>) -> Result<Self> {
        if let Some(region) = settings.backend_region.as_deref() {
            info!(region = %region, has_key = settings.backend_key.is_some(), "Queue backend credentials loaded");
        }

        let time_provider: Arc<dyn TimeProvider> = Arc::new(SystemTimeProvider);
        let stores = Stores::open(settings, time_provider.clone()).await?;
        let bus = Self::with_stores(settings, sink, stores, Arc::new(UuidProvider), time_provider)?;
        bus.recover_leases().await?;
        Ok(bus)
    }

    /// Build on explicit stores and providers
    pub fn with_stores(
        settings: &Settings,
        sink: Arc<dyn OutputSink>,
        stores: Stores,
        id_provider: Arc<dyn IdProvider>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Result<Self> {
        let registry = CommandRegistry::<MovieCommand>::new()
            .with_handler(RENT_MOVIE, Arc::new(RentMovieHandler::new(sink.clone())))?
            .with_handler(BUY_MOVIE, Arc::new(BuyMovieHandler::new(sink)))?;

        let router = QueueRouter::new().route(RENT_MOVIE, RENT_MOVIE_QUEUE);
        let serializer: Arc<dyn CommandSerializer<MovieCommand>> = Arc::new(JsonSerializer);

        let enqueuer = Arc::new(Enqueuer::new(
            stores.backend.clone(),
            serializer.clone(),
            router.clone(),
            id_provider,
            time_provider.clone(),
        ));
        let dispatcher = Arc::new(Dispatcher::new(Arc::new(registry)).with_enqueuer(enqueuer));

        let failure_handler = Arc::new(FailureHandler::new(
            stores.backend.clone(),
            stores.dead_letters.clone(),
            settings.retry_policy(),
            time_provider.clone(),
        ));
        let consumer_config = settings.consumer_config();
        let recovery = LeaseRecovery::new(
            stores.backend.clone(),
            time_provider.clone(),
            consumer_config.settle_window(),
        );
        let consumer = Arc::new(Consumer::new(
            stores.backend.clone(),
            dispatcher.clone(),
            serializer,
            failure_handler,
            consumer_config,
        ));
        let replayer = DeadLetterReplayer::new(
            stores.dead_letters.clone(),
            stores.backend.clone(),
            time_provider,
        );

        Ok(Self {
            dispatcher,
            consumer,
            replayer,
            recovery,
            router,
            stores,
        })
    }

    pub fn dispatcher(&self) -> &Dispatcher<MovieCommand> {
        &self.dispatcher
    }

    pub fn consumer(&self) -> Arc<Consumer<MovieCommand>> {
        Arc::clone(&self.consumer)
    }

    pub fn replayer(&self) -> &DeadLetterReplayer {
        &self.replayer
    }

    pub fn backend(&self) -> &Arc<dyn QueueBackend> {
        &self.stores.backend
    }

    pub fn dead_letters(&self) -> &Arc<dyn DeadLetterStore> {
        &self.stores.dead_letters
    }

    /// Queues a worker should consume (every routed queue)
    pub fn queues(&self) -> Vec<QueueName> {
        self.router.queues()
    }

    /// Dispatch the command for a CLI action
    pub async fn post(&self, action: Action, title: &str) -> Result<DispatchOutcome> {
        self.dispatcher.dispatch(action.command(title)).await
    }

    /// Requeue envelopes whose lease outlived the consumer's settle window
    pub async fn recover_leases(&self) -> Result<usize> {
        self.recovery.recover().await
    }

    /// One stop-when-empty pass over every routed queue
    pub async fn work_queues(&self) -> Result<ConsumeReport> {
        self.work(&self.queues(), |_| {}).await
    }

    /// Stop-when-empty pass over `queues`, announcing each one to `on_queue`
    pub async fn work<F>(&self, queues: &[QueueName], on_queue: F) -> Result<ConsumeReport>
    where
        F: FnMut(&str) + Send,
    {
        self.consumer.consume_each(queues, on_queue).await
    }
}
