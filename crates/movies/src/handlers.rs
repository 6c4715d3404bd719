// Movie command handlers

use crate::command::MovieCommand;
use async_trait::async_trait;
use cmdbus_core::domain::Command;
use cmdbus_core::port::{CommandHandler, HandlerError};
use std::sync::{Arc, Mutex};

/// Where handlers write their user-facing line
pub trait OutputSink: Send + Sync {
    fn emit(&self, line: &str);
}

/// Prints to stdout (logs go to stderr)
pub struct StdoutSink;

impl OutputSink for StdoutSink {
    fn emit(&self, line: &str) {
        println!("{}", line);
    }
}

/// Collects lines in memory
#[derive(Default)]
pub struct MemorySink {
    lines: Mutex<Vec<String>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .map(|lines| lines.clone())
            .unwrap_or_default()
    }
}

impl OutputSink for MemorySink {
    fn emit(&self, line: &str) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push(line.to_string());
        }
    }
}

fn mismatch(handler: &str, command: &MovieCommand) -> HandlerError {
    HandlerError::Permanent(format!("{} cannot handle {}", handler, command.name()))
}

pub struct RentMovieHandler {
    sink: Arc<dyn OutputSink>,
}

impl RentMovieHandler {
    pub fn new(sink: Arc<dyn OutputSink>) -> Self {
        Self { sink }
    }
}

#[async_trait]
impl CommandHandler<MovieCommand> for RentMovieHandler {
    async fn handle(&self, command: &MovieCommand) -> Result<(), HandlerError> {
        match command {
            MovieCommand::RentMovie { title } => {
                self.sink.emit(&format!("{} is available to rent.", title));
                Ok(())
            }
            other => Err(mismatch("RentMovieHandler", other)),
        }
    }
}

pub struct BuyMovieHandler {
    sink: Arc<dyn OutputSink>,
}

impl BuyMovieHandler {
    pub fn new(sink: Arc<dyn OutputSink>) -> Self {
        Self { sink }
    }
}

#[async_trait]
impl CommandHandler<MovieCommand> for BuyMovieHandler {
    async fn handle(&self, command: &MovieCommand) -> Result<(), HandlerError> {
        match command {
            MovieCommand::BuyMovie { title } => {
                self.sink.emit(&format!("You bought {}", title));
                Ok(())
            }
            other => Err(mismatch("BuyMovieHandler", other)),
        }
    }
}
