// Queue Domain Model

/// Queue identifier (kebab-case by convention, e.g. `rent-movie`)
pub type QueueName = String;

/// How a consumer treats an empty queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumePolicy {
    /// Process what is queued when the loop starts, then halt
    StopWhenEmpty,
    /// Keep polling until the shutdown token fires
    BlockUntilAvailable,
}

impl std::fmt::Display for ConsumePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConsumePolicy::StopWhenEmpty => write!(f, "stop-when-empty"),
            ConsumePolicy::BlockUntilAvailable => write!(f, "block-until-available"),
        }
    }
}
