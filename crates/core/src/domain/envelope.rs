// Envelope Domain Model

use super::command::{CommandName, CommandPayload};
use super::error::{DomainError, Result};
use super::queue::QueueName;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Envelope ID (UUID v4)
pub type EnvelopeId = String;

/// Envelope delivery state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EnvelopeState {
    Pending,
    Retrying,
    DeadLettered,
}

impl std::fmt::Display for EnvelopeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EnvelopeState::Pending => write!(f, "PENDING"),
            EnvelopeState::Retrying => write!(f, "RETRYING"),
            EnvelopeState::DeadLettered => write!(f, "DEAD_LETTERED"),
        }
    }
}

impl FromStr for EnvelopeState {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "PENDING" => Ok(EnvelopeState::Pending),
            "RETRYING" => Ok(EnvelopeState::Retrying),
            "DEAD_LETTERED" => Ok(EnvelopeState::DeadLettered),
            other => Err(DomainError::UnknownState(other.to_string())),
        }
    }
}

/// Classification of a handler failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorClass {
    /// Worth retrying (timeouts, unavailable collaborators)
    Transient,
    /// Retrying cannot help; goes straight to the dead-letter store
    Permanent,
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorClass::Transient => write!(f, "TRANSIENT"),
            ErrorClass::Permanent => write!(f, "PERMANENT"),
        }
    }
}

impl FromStr for ErrorClass {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "TRANSIENT" => Ok(ErrorClass::Transient),
            "PERMANENT" => Ok(ErrorClass::Permanent),
            other => Err(DomainError::UnknownErrorClass(other.to_string())),
        }
    }
}

/// What the failure handler did with a failed envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Pushed back onto its queue, available again after `delay_ms`
    Retrying { delay_ms: i64 },
    /// Moved to the dead-letter store
    DeadLettered,
}

/// Durable, queued representation of a command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub id: EnvelopeId,
    pub name: CommandName,
    pub queue: QueueName,
    pub payload: CommandPayload,

    pub enqueued_at: i64,  // epoch ms
    pub available_at: i64, // epoch ms, pushed forward by retry backoff

    pub attempts: u32,
    pub state: EnvelopeState,
}

impl Envelope {
    /// Create a pending envelope
    ///
    /// # Arguments
    ///
    /// * `id` - Unique envelope ID (injected, not generated)
    /// * `name` - Command name used to resolve the handler on the consumer side
    /// * `queue` - Queue the envelope is pushed onto
    /// * `payload` - Serialized command fields
    /// * `now_millis` - Enqueue timestamp in epoch ms (injected, not system time)
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        queue: impl Into<String>,
        payload: CommandPayload,
        now_millis: i64,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            queue: queue.into(),
            payload,
            enqueued_at: now_millis,
            available_at: now_millis,
            attempts: 0,
            state: EnvelopeState::Pending,
        }
    }

    /// Whether a consumer may pop this envelope at `now_millis`
    pub fn is_available(&self, now_millis: i64) -> bool {
        self.available_at <= now_millis
    }

    /// Count a delivery attempt (done by the consumer right after `pop`)
    pub fn record_attempt(&mut self) {
        self.attempts = self.attempts.saturating_add(1);
    }

    /// Transition to Retrying, available again at `available_at`
    pub fn schedule_retry(&mut self, available_at: i64) -> Result<()> {
        self.ensure_live(EnvelopeState::Retrying)?;
        self.state = EnvelopeState::Retrying;
        self.available_at = available_at;
        Ok(())
    }

    /// Transition to the terminal DeadLettered state
    pub fn dead_letter(&mut self) -> Result<()> {
        self.ensure_live(EnvelopeState::DeadLettered)?;
        self.state = EnvelopeState::DeadLettered;
        Ok(())
    }

    /// Operator replay: only a dead-lettered envelope can start over
    pub fn reset_for_replay(&mut self, now_millis: i64) -> Result<()> {
        if self.state != EnvelopeState::DeadLettered {
            return Err(DomainError::InvalidStateTransition {
                from: self.state.to_string(),
                to: EnvelopeState::Pending.to_string(),
            });
        }
        self.state = EnvelopeState::Pending;
        self.attempts = 0;
        self.available_at = now_millis;
        Ok(())
    }

    fn ensure_live(&self, to: EnvelopeState) -> Result<()> {
        if self.state == EnvelopeState::DeadLettered {
            return Err(DomainError::InvalidStateTransition {
                from: self.state.to_string(),
                to: to.to_string(),
            });
        }
        Ok(())
    }
}

/// An envelope that exhausted its retries (or failed permanently)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetterRecord {
    pub envelope: Envelope,
    pub last_error: String,
    pub error_class: ErrorClass,
    pub failed_at: i64, // epoch ms
}

impl DeadLetterRecord {
    pub fn new(
        envelope: Envelope,
        last_error: impl Into<String>,
        error_class: ErrorClass,
        failed_at: i64,
    ) -> Self {
        Self {
            envelope,
            last_error: last_error.into(),
            error_class,
            failed_at,
        }
    }

    pub fn id(&self) -> &str {
        &self.envelope.id
    }
}
