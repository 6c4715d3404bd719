// Shared fixtures for unit tests

use crate::domain::Command;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "name", content = "payload")]
pub enum TestCommand {
    Ping { message: String },
    Deliver { message: String },
    Noop,
}

impl TestCommand {
    pub fn ping(message: &str) -> Self {
        TestCommand::Ping {
            message: message.to_string(),
        }
    }

    pub fn deliver(message: &str) -> Self {
        TestCommand::Deliver {
            message: message.to_string(),
        }
    }
}

impl Command for TestCommand {
    fn name(&self) -> &str {
        match self {
            TestCommand::Ping { .. } => "Ping",
            TestCommand::Deliver { .. } => "Deliver",
            TestCommand::Noop => "Noop",
        }
    }

    fn is_queueable(&self) -> bool {
        matches!(self, TestCommand::Deliver { .. })
    }
}
