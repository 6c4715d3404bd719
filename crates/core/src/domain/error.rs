// Domain Error Types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Invalid envelope state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Unknown envelope state: {0}")]
    UnknownState(String),

    #[error("Unknown error class: {0}")]
    UnknownErrorClass(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

pub type Result<T> = std::result::Result<T, DomainError>;
