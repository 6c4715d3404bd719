//! cmdbus Worker - consumes every routed queue until Ctrl+C

use anyhow::{Context, Result};
use cmdbus_core::application::{shutdown_channel, ConsumeReport};
use cmdbus_core::domain::ConsumePolicy;
use cmdbus_movies::{MovieBus, Settings, StdoutSink};
use std::sync::Arc;
use tracing::{error, info, warn};

const VERSION: &str = env!("CARGO_PKG_VERSION");
const DEFAULT_LOG_DIRECTIVE: &str = "cmdbus=info";

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Load configuration (.env first, so RUST_LOG from it applies)
    let settings = Settings::load().context("Failed to load settings")?;

    // 2. Initialize logging
    cmdbus_movies::logging::init_tracing(DEFAULT_LOG_DIRECTIVE);
    info!("cmdbus worker v{} starting...", VERSION);
    info!(settings = ?settings, "Settings loaded");

    // 3. Setup dependencies (DI wiring)
    let bus = MovieBus::build(&settings, Arc::new(StdoutSink))
        .await
        .context("Failed to initialize command bus")?;

    let queues = bus.queues();
    if queues.is_empty() {
        warn!("No queues routed, nothing to consume");
        return Ok(());
    }

    // 4. Start one consumer loop per queue
    let (shutdown_tx, _) = shutdown_channel();
    let consumer = bus.consumer();
    // Every in-flight envelope settles within this window (timeout included)
    let grace_period = consumer.config().settle_window();

    let mut handles = Vec::with_capacity(queues.len());
    for queue in queues {
        let consumer = Arc::clone(&consumer);
        let token = shutdown_tx.token();
        handles.push(tokio::spawn(async move {
            let result = consumer
                .consume(&queue, ConsumePolicy::BlockUntilAvailable, token)
                .await;
            (queue, result)
        }));
    }

    info!("✅ Worker ready. Waiting for envelopes...");
    info!("Press Ctrl+C to shutdown");

    // 5. Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received. Finishing in-flight envelopes...");

    // 6. Graceful shutdown
    shutdown_tx.shutdown();
    let joined = tokio::time::timeout(grace_period, futures::future::join_all(handles)).await;

    match joined {
        Ok(results) => {
            let mut total = ConsumeReport::default();
            for result in results {
                match result {
                    Ok((_, Ok(report))) => {
                        total.merge(report);
                    }
                    Ok((queue, Err(e))) => error!(queue = %queue, error = %e, "Consumer failed"),
                    Err(e) => error!(error = ?e, "Consumer task panicked"),
                }
            }
            info!(
                processed = total.processed,
                succeeded = total.succeeded,
                retried = total.retried,
                dead_lettered = total.dead_lettered,
                unsettled = total.unsettled,
                "Shutdown complete."
            );
        }
        Err(_) => warn!(
            grace_period_secs = grace_period.as_secs(),
            "Consumers did not stop in time, leased envelopes return on next start"
        ),
    }

    Ok(())
}
