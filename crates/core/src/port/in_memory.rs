// In-process backends (QUEUE_URL=memory:)
// Also the default fixture for tests that do not care about persistence

use crate::domain::{DeadLetterRecord, Envelope, EnvelopeId, QueueName};
use crate::error::{AppError, Result};
use crate::port::{DeadLetterStore, QueueBackend, TimeProvider};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

fn poisoned<T>(_: T) -> AppError {
    AppError::QueueUnavailable("in-memory store lock poisoned".to_string())
}

#[derive(Default)]
struct Shelves {
    queues: HashMap<QueueName, VecDeque<Envelope>>,
    /// envelope id -> (leased_at, envelope)
    leased: HashMap<EnvelopeId, (i64, Envelope)>,
}

impl Shelves {
    fn waiting(&self, queue: &str) -> impl Iterator<Item = &Envelope> {
        self.queues.get(queue).into_iter().flatten()
    }
}

/// Queue backend kept in process memory
///
/// Every operation takes one mutex, so concurrent pushes never interleave and
/// a popped envelope is leased to exactly one caller.
pub struct InMemoryQueueBackend {
    shelves: Mutex<Shelves>,
    time_provider: Arc<dyn TimeProvider>,
}

impl InMemoryQueueBackend {
    pub fn new(time_provider: Arc<dyn TimeProvider>) -> Self {
        Self {
            shelves: Mutex::new(Shelves::default()),
            time_provider,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Shelves>> {
        self.shelves.lock().map_err(poisoned)
    }

    fn first_available(queue: &VecDeque<Envelope>, now: i64) -> Option<usize> {
        queue.iter().position(|env| env.is_available(now))
    }

    /// Number of envelopes currently out on lease
    pub fn leased_len(&self) -> Result<usize> {
        Ok(self.lock()?.leased.len())
    }
}

#[async_trait]
impl QueueBackend for InMemoryQueueBackend {
    async fn push(&self, envelope: Envelope) -> Result<()> {
        let mut shelves = self.lock()?;
        shelves.leased.remove(&envelope.id);
        shelves
            .queues
            .entry(envelope.queue.clone())
            .or_default()
            .push_back(envelope);
        Ok(())
    }

    async fn pop(&self, queue: &str) -> Result<Option<Envelope>> {
        let now = self.time_provider.now_millis();
        let mut shelves = self.lock()?;

        let Some(entries) = shelves.queues.get_mut(queue) else {
            return Ok(None);
        };
        let Some(envelope) = Self::first_available(entries, now).and_then(|idx| entries.remove(idx))
        else {
            return Ok(None);
        };
        shelves
            .leased
            .insert(envelope.id.clone(), (now, envelope.clone()));
        Ok(Some(envelope))
    }

    async fn ack(&self, id: &str) -> Result<()> {
        self.lock()?.leased.remove(id);
        Ok(())
    }

    async fn peek(&self, queue: &str) -> Result<Option<Envelope>> {
        let now = self.time_provider.now_millis();
        let shelves = self.lock()?;

        Ok(shelves.queues.get(queue).and_then(|entries| {
            Self::first_available(entries, now).map(|idx| entries[idx].clone())
        }))
    }

    async fn len(&self, queue: &str) -> Result<usize> {
        Ok(self.lock()?.waiting(queue).count())
    }

    async fn available_len(&self, queue: &str) -> Result<usize> {
        let now = self.time_provider.now_millis();
        Ok(self
            .lock()?
            .waiting(queue)
            .filter(|env| env.is_available(now))
            .count())
    }

    async fn queues(&self) -> Result<Vec<QueueName>> {
        let mut names: Vec<QueueName> = self
            .lock()?
            .queues
            .iter()
            .filter(|(_, entries)| !entries.is_empty())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        Ok(names)
    }

    async fn release_expired_leases(&self, leased_before: i64) -> Result<usize> {
        let now = self.time_provider.now_millis();
        let mut shelves = self.lock()?;

        let mut expired: Vec<(i64, EnvelopeId)> = shelves
            .leased
            .iter()
            .filter(|(_, (leased_at, _))| *leased_at < leased_before)
            .map(|(id, (leased_at, _))| (*leased_at, id.clone()))
            .collect();
        expired.sort();

        for (_, id) in &expired {
            if let Some((_, mut envelope)) = shelves.leased.remove(id) {
                envelope.record_attempt();
                envelope.schedule_retry(now)?;
                shelves
                    .queues
                    .entry(envelope.queue.clone())
                    .or_default()
                    .push_back(envelope);
            }
        }
        Ok(expired.len())
    }
}

/// Dead-letter store kept in process memory
#[derive(Default)]
pub struct InMemoryDeadLetterStore {
    records: Mutex<Vec<DeadLetterRecord>>,
}

impl InMemoryDeadLetterStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Vec<DeadLetterRecord>>> {
        self.records.lock().map_err(poisoned)
    }
}

#[async_trait]
impl DeadLetterStore for InMemoryDeadLetterStore {
    async fn push(&self, record: DeadLetterRecord) -> Result<()> {
        let mut records = self.lock()?;
        records.retain(|existing| existing.id() != record.id());
        records.push(record);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<DeadLetterRecord>> {
        Ok(self.lock()?.clone())
    }

    async fn take(&self, id: &str) -> Result<Option<DeadLetterRecord>> {
        let mut records = self.lock()?;
        Ok(records
            .iter()
            .position(|record| record.id() == id)
            .map(|idx| records.remove(idx)))
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.lock()?.len())
    }
}
