// Row <-> domain mapping shared by the queue and dead-letter tables

use cmdbus_core::domain::{CommandPayload, DeadLetterRecord, Envelope, EnvelopeState, ErrorClass};
use tracing::warn;

pub(crate) const ENVELOPE_COLUMNS: &str =
    "id, queue, name, payload, enqueued_at, available_at, attempts, state";

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct EnvelopeRow {
    id: String,
    queue: String,
    name: String,
    payload: String,
    enqueued_at: i64,
    available_at: i64,
    attempts: i64,
    state: String,
}

impl EnvelopeRow {
    pub(crate) fn into_envelope(self) -> Envelope {
        // Payload written by us is always JSON; keep foreign text intact
        let payload = serde_json::from_str(&self.payload)
            .unwrap_or_else(|_| serde_json::Value::String(self.payload.clone()));

        let state = self.state.parse().unwrap_or_else(|e| {
            warn!(envelope_id = %self.id, error = %e, "Unknown envelope state, treating as pending");
            EnvelopeState::Pending
        });

        Envelope {
            id: self.id,
            name: self.name,
            queue: self.queue,
            payload: CommandPayload::new(payload),
            enqueued_at: self.enqueued_at,
            available_at: self.available_at,
            attempts: u32::try_from(self.attempts).unwrap_or(0),
            state,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct DeadLetterRow {
    #[sqlx(flatten)]
    envelope: EnvelopeRow,
    last_error: String,
    error_class: String,
    failed_at: i64,
}

impl DeadLetterRow {
    pub(crate) fn into_record(self) -> DeadLetterRecord {
        let error_class = self.error_class.parse().unwrap_or_else(|e| {
            warn!(envelope_id = %self.envelope.id, error = %e, "Unknown error class, treating as permanent");
            ErrorClass::Permanent
        });

        DeadLetterRecord {
            envelope: self.envelope.into_envelope(),
            last_error: self.last_error,
            error_class,
            failed_at: self.failed_at,
        }
    }
}
