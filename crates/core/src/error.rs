// Central Error Type for the Application

use thiserror::Error;

/// Application-level error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("Handler already registered for command: {0}")]
    DuplicateRegistration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Queue unavailable: {0}")]
    QueueUnavailable(String),

    #[error("Handler execution failed: {0}")]
    HandlerExecution(#[from] crate::port::HandlerError),

    #[error("Domain error: {0}")]
    Domain(#[from] crate::domain::DomainError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Stable variant name, printed by the binaries next to the message
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::UnknownCommand(_) => "UnknownCommand",
            AppError::DuplicateRegistration(_) => "DuplicateRegistration",
            AppError::Serialization(_) => "SerializationError",
            AppError::QueueUnavailable(_) => "QueueUnavailable",
            AppError::HandlerExecution(crate::port::HandlerError::Transient(_)) => "TransientError",
            AppError::HandlerExecution(crate::port::HandlerError::Permanent(_)) => "PermanentError",
            AppError::Domain(_) => "DomainError",
            AppError::Config(_) => "ConfigError",
            AppError::NotFound(_) => "NotFound",
            AppError::Internal(_) => "InternalError",
        }
    }
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

// Note: sqlx::Error conversion is handled in infra-sqlite crate
// by converting to AppError::QueueUnavailable(String)
