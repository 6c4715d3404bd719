// Command Domain Model

use serde::{Deserialize, Serialize};

/// Command name (routing key, StudlyCase by convention, e.g. `RentMovie`)
pub type CommandName = String;

/// An application-level request to perform an action.
///
/// Implemented by the application's closed command type (usually an enum with
/// one variant per command). `name` selects both the handler and the queue
/// route. Queueable commands are handed to the enqueuer by `Dispatcher::dispatch`
/// instead of being executed inline.
pub trait Command: Send + Sync + std::fmt::Debug + 'static {
    fn name(&self) -> &str;

    fn is_queueable(&self) -> bool {
        false
    }
}

/// Serialized command fields (JSON object)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandPayload(serde_json::Value);

impl CommandPayload {
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }

    pub fn into_value(self) -> serde_json::Value {
        self.0
    }
}
