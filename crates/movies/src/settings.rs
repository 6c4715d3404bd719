// Settings - environment (+ .env) -> typed configuration

use cmdbus_core::application::{ConsumerConfig, RetryPolicy};
use cmdbus_core::application::consumer::constants::{
    DEFAULT_BACKOFF_FACTOR, DEFAULT_EXECUTION_TIMEOUT, DEFAULT_MAX_ATTEMPTS,
    DEFAULT_RETRY_BASE_DELAY_MS, IDLE_SLEEP_DURATION,
};
use cmdbus_core::error::{AppError, Result};
use config::{Config, Environment};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_QUEUE_URL: &str = "sqlite://~/.cmdbus/queue.db";

fn default_queue_url() -> String {
    DEFAULT_QUEUE_URL.to_string()
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_retry_base_delay_ms() -> i64 {
    DEFAULT_RETRY_BASE_DELAY_MS
}

fn default_backoff_factor() -> f64 {
    DEFAULT_BACKOFF_FACTOR
}

fn default_execution_timeout_ms() -> u64 {
    DEFAULT_EXECUTION_TIMEOUT.as_millis() as u64
}

/// Where the queue lives, resolved from `QUEUE_URL`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueTarget {
    /// Process-local queues, gone on exit
    Memory,
    /// SQLite database; `path` is `None` for in-memory databases
    Sqlite { url: String, path: Option<PathBuf> },
}

/// Startup configuration, read once and passed to the backends
///
/// Keys are the upper-cased field names in the environment (`QUEUE_URL`,
/// `CMDBUS_MAX_ATTEMPTS`, ...). The backend credentials are carried for
/// hosted queue services and are never printed.
#[derive(Clone, Deserialize)]
pub struct Settings {
    #[serde(rename = "queue_backend_key", default)]
    pub backend_key: Option<String>,

    #[serde(rename = "queue_backend_secret", default)]
    pub backend_secret: Option<String>,

    #[serde(rename = "queue_backend_region", default)]
    pub backend_region: Option<String>,

    #[serde(default = "default_queue_url")]
    pub queue_url: String,

    #[serde(rename = "cmdbus_max_attempts", default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(
        rename = "cmdbus_retry_base_delay_ms",
        default = "default_retry_base_delay_ms"
    )]
    pub retry_base_delay_ms: i64,

    #[serde(rename = "cmdbus_backoff_factor", default = "default_backoff_factor")]
    pub backoff_factor: f64,

    #[serde(
        rename = "cmdbus_execution_timeout_ms",
        default = "default_execution_timeout_ms"
    )]
    pub execution_timeout_ms: u64,
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("backend_key", &self.backend_key)
            .field("backend_secret", &self.backend_secret.as_ref().map(|_| "***"))
            .field("backend_region", &self.backend_region)
            .field("queue_url", &self.queue_url)
            .field("max_attempts", &self.max_attempts)
            .field("retry_base_delay_ms", &self.retry_base_delay_ms)
            .field("backoff_factor", &self.backoff_factor)
            .field("execution_timeout_ms", &self.execution_timeout_ms)
            .finish()
    }
}

impl Settings {
    /// Load `.env` (if present) and read the process environment
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_environment(Environment::default())
    }

    /// Read settings from an explicit key/value map instead of the process
    /// environment
    pub fn from_map(vars: HashMap<String, String>) -> Result<Self> {
        Self::from_environment(Environment::default().source(Some(vars)))
    }

    fn from_environment(environment: Environment) -> Result<Self> {
        let settings: Settings = Config::builder()
            .add_source(environment.try_parsing(true))
            .build()
            .and_then(Config::try_deserialize)
            .map_err(|e| AppError::Config(e.to_string()))?;

        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(AppError::Config(
                "CMDBUS_MAX_ATTEMPTS must be at least 1".to_string(),
            ));
        }
        if self.retry_base_delay_ms < 0 {
            return Err(AppError::Config(
                "CMDBUS_RETRY_BASE_DELAY_MS must not be negative".to_string(),
            ));
        }
        if !self.backoff_factor.is_finite() || self.backoff_factor < 1.0 {
            return Err(AppError::Config(
                "CMDBUS_BACKOFF_FACTOR must be a finite number >= 1.0".to_string(),
            ));
        }
        if self.execution_timeout_ms == 0 {
            return Err(AppError::Config(
                "CMDBUS_EXECUTION_TIMEOUT_MS must be positive".to_string(),
            ));
        }
        self.queue_target().map(|_| ())
    }

    /// Resolve `QUEUE_URL` (`memory:` or `sqlite:...`, `~` expanded)
    pub fn queue_target(&self) -> Result<QueueTarget> {
        let url = self.queue_url.trim();
        if url == "memory:" || url == "memory" {
            return Ok(QueueTarget::Memory);
        }

        let (scheme, rest) = url
            .strip_prefix("sqlite://")
            .map(|rest| ("sqlite://", rest))
            .or_else(|| url.strip_prefix("sqlite:").map(|rest| ("sqlite:", rest)))
            .ok_or_else(|| {
                AppError::Config(format!(
                    "unsupported QUEUE_URL '{}' (expected memory: or sqlite:<path>)",
                    url
                ))
            })?;

        if rest.is_empty() {
            return Err(AppError::Config("QUEUE_URL has an empty sqlite path".to_string()));
        }

        let expanded = shellexpand::tilde(rest).into_owned();
        let path_part = expanded.split('?').next().unwrap_or_default();
        let path = if path_part.contains(":memory:") {
            None
        } else {
            Some(PathBuf::from(path_part))
        };

        Ok(QueueTarget::Sqlite {
            url: format!("{}{}", scheme, expanded),
            path,
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, self.retry_base_delay_ms, self.backoff_factor)
    }

    pub fn consumer_config(&self) -> ConsumerConfig {
        ConsumerConfig {
            execution_timeout: Duration::from_millis(self.execution_timeout_ms),
            idle_sleep: IDLE_SLEEP_DURATION,
        }
    }
}
