// Dispatcher - inline execution or hand-off to the enqueuer

use crate::application::enqueuer::Enqueuer;
use crate::application::registry::CommandRegistry;
use crate::domain::{Command, EnvelopeId};
use crate::error::{AppError, Result};
use crate::port::CommandHandler;
use std::sync::Arc;
use tracing::{debug, info};

/// Result of a successful `dispatch`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The handler ran to completion
    Executed,
    /// The command was durably queued; a consumer will attempt it later
    Enqueued(EnvelopeId),
}

pub struct Dispatcher<C: Command> {
    registry: Arc<CommandRegistry<C>>,
    enqueuer: Option<Arc<Enqueuer<C>>>,
}

impl<C: Command> Dispatcher<C> {
    /// Dispatcher without a queue: every command runs inline
    pub fn new(registry: Arc<CommandRegistry<C>>) -> Self {
        Self {
            registry,
            enqueuer: None,
        }
    }

    pub fn with_enqueuer(mut self, enqueuer: Arc<Enqueuer<C>>) -> Self {
        self.enqueuer = Some(enqueuer);
        self
    }

    pub fn registry(&self) -> &CommandRegistry<C> {
        &self.registry
    }

    /// Dispatch a command
    ///
    /// The handler is resolved first, so an unknown command fails even when it
    /// is queueable. Queueable commands return `Enqueued` once the backend has
    /// accepted the envelope, not once the handler has run.
    pub async fn dispatch(&self, command: C) -> Result<DispatchOutcome> {
        let handler = self.registry.resolve(command.name())?;

        if command.is_queueable() {
            let enqueuer = self.enqueuer.as_ref().ok_or_else(|| {
                AppError::QueueUnavailable(format!(
                    "no enqueuer configured for queueable command {}",
                    command.name()
                ))
            })?;
            let id = enqueuer.enqueue(&command).await?;
            return Ok(DispatchOutcome::Enqueued(id));
        }

        Self::invoke(handler.as_ref(), &command).await?;
        Ok(DispatchOutcome::Executed)
    }

    /// Same-bus execution: run the handler inline, ignoring `is_queueable`
    ///
    /// Used by the consumer so queued commands take the exact code path of
    /// synchronous ones.
    pub async fn execute(&self, command: &C) -> Result<()> {
        let handler = self.registry.resolve(command.name())?;
        Self::invoke(handler.as_ref(), command).await
    }

    async fn invoke(handler: &dyn CommandHandler<C>, command: &C) -> Result<()> {
        debug!(command = %command.name(), "Invoking handler");
        handler.handle(command).await?;
        info!(command = %command.name(), "Command handled");
        Ok(())
    }
}
