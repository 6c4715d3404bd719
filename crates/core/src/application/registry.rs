// Command Registry - command name -> handler

use crate::domain::{Command, CommandName};
use crate::error::{AppError, Result};
use crate::port::CommandHandler;
use std::collections::HashMap;
use std::sync::Arc;

/// Maps each command name to exactly one handler
///
/// Built once at startup, then shared read-only (`Arc<CommandRegistry<C>>`).
pub struct CommandRegistry<C: Command> {
    handlers: HashMap<CommandName, Arc<dyn CommandHandler<C>>>,
}

impl<C: Command> Default for CommandRegistry<C> {
    fn default() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }
}

impl<C: Command> CommandRegistry<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler, failing if the name is already taken
    pub fn register(
        &mut self,
        name: impl Into<String>,
        handler: Arc<dyn CommandHandler<C>>,
    ) -> Result<()> {
        let name = name.into();
        if self.handlers.contains_key(&name) {
            return Err(AppError::DuplicateRegistration(name));
        }
        tracing::debug!(command = %name, "Handler registered");
        self.handlers.insert(name, handler);
        Ok(())
    }

    /// Builder form of `register`
    pub fn with_handler(
        mut self,
        name: impl Into<String>,
        handler: Arc<dyn CommandHandler<C>>,
    ) -> Result<Self> {
        self.register(name, handler)?;
        Ok(self)
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<dyn CommandHandler<C>>> {
        self.handlers
            .get(name)
            .cloned()
            .ok_or_else(|| AppError::UnknownCommand(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<CommandName> {
        let mut names: Vec<CommandName> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
