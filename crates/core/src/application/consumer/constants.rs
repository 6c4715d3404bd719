// Consumer constants (no magic values)
use std::time::Duration;

/// Sleep between polls of an empty queue in blocking mode (100ms)
pub const IDLE_SLEEP_DURATION: Duration = Duration::from_millis(100);

/// Sleep after a backend error before polling again (1s)
pub const ERROR_RECOVERY_SLEEP_DURATION: Duration = Duration::from_secs(1);

/// Default handler execution timeout (30s)
pub const DEFAULT_EXECUTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Default delivery attempts before dead-lettering, first delivery included
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default retry base delay (1000ms = 1s)
pub const DEFAULT_RETRY_BASE_DELAY_MS: i64 = 1000;

/// Default exponential backoff multiplier
pub const DEFAULT_BACKOFF_FACTOR: f64 = 2.0;

/// Default cap on a single backoff delay (1h)
pub const DEFAULT_MAX_RETRY_DELAY_MS: i64 = 3_600_000;

/// Allowance on top of the execution timeout for settling one envelope
pub const SETTLE_MARGIN: Duration = Duration::from_secs(5);
