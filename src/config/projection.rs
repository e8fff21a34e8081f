//! Projection scheduling configuration.
//!
//! `ProjectionsConfig` is the serialized form; `ProjectionSettings` is what a
//! worker runs with, resolved per projection from the defaults plus any
//! override registered under the projection's name.

use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;

use super::ConfigError;
use crate::projection::ExecutorStrategy;

/// Retry policy for transient store failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total tries of an operation, the first one included.
    pub max_attempts: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryConfig::default().into()
    }
}

/// Resolved runtime settings of one projection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectionSettings {
    pub strategy: ExecutorStrategy,
    pub batch_size: usize,
    pub retry: RetryPolicy,
    pub lock_lease: Duration,
    pub poll_interval: Duration,
    /// Upper bound on any single store call.
    pub store_timeout: Duration,
}

impl ProjectionSettings {
    pub fn batched() -> Self {
        ProjectionConfig::default().settings(ExecutorStrategy::Batched)
    }

    pub fn direct_write() -> Self {
        ProjectionConfig::default().settings(ExecutorStrategy::DirectWrite)
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_lock_lease(mut self, lease: Duration) -> Self {
        self.lock_lease = lease;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    /// Reject settings a worker cannot run with.
    ///
    /// A store call must finish well inside one lease: the worker renews
    /// before each reduce and relies on the lease outliving the call.
    pub fn validate(&self, scope: &str) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(format!("projection {scope}: {msg}")));
        if self.batch_size == 0 {
            return invalid("batch_size must be positive");
        }
        if self.lock_lease.is_zero() {
            return invalid("lock_lease_secs must be positive");
        }
        if self.retry.max_attempts == 0 {
            return invalid("retry max_attempts must be at least 1");
        }
        if self.retry.base_delay > self.retry.max_delay {
            return invalid("retry base delay exceeds max delay");
        }
        if self.store_timeout >= self.lock_lease {
            return invalid("store_timeout_ms must be shorter than the lock lease");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: usize,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 100,
            max_delay_ms: 5_000,
        }
    }
}

impl From<RetryConfig> for RetryPolicy {
    fn from(c: RetryConfig) -> Self {
        Self {
            max_attempts: c.max_attempts,
            base_delay: Duration::from_millis(c.base_delay_ms),
            max_delay: Duration::from_millis(c.max_delay_ms),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProjectionConfig {
    pub batch_size: usize,
    pub retry: RetryConfig,
    pub lock_lease_secs: u64,
    pub poll_interval_ms: u64,
    pub store_timeout_ms: u64,
}

impl Default for ProjectionConfig {
    fn default() -> Self {
        Self {
            batch_size: 200,
            retry: RetryConfig::default(),
            lock_lease_secs: 30,
            poll_interval_ms: 1_000,
            store_timeout_ms: 10_000,
        }
    }
}

impl ProjectionConfig {
    pub fn settings(&self, strategy: ExecutorStrategy) -> ProjectionSettings {
        ProjectionSettings {
            strategy,
            batch_size: self.batch_size,
            retry: self.retry.clone().into(),
            lock_lease: Duration::from_secs(self.lock_lease_secs),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            store_timeout: Duration::from_millis(self.store_timeout_ms),
        }
    }

    pub(super) fn validate(&self, scope: &str) -> Result<(), ConfigError> {
        self.settings(ExecutorStrategy::Batched).validate(scope)
    }
}

/// Per-projection overrides. Unset fields fall back to the defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProjectionOverride {
    pub strategy: Option<ExecutorStrategy>,
    pub batch_size: Option<usize>,
    pub max_attempts: Option<usize>,
    pub lock_lease_secs: Option<u64>,
    pub poll_interval_ms: Option<u64>,
    pub store_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProjectionsConfig {
    pub defaults: ProjectionConfig,
    pub overrides: HashMap<String, ProjectionOverride>,
}

impl ProjectionsConfig {
    /// Settings for `name`, starting from the projection's native strategy.
    pub fn settings_for(&self, name: &str, strategy: ExecutorStrategy) -> ProjectionSettings {
        let mut settings = self.defaults.settings(strategy);
        let Some(o) = self.overrides.get(name) else {
            return settings;
        };
        if let Some(strategy) = o.strategy {
            settings.strategy = strategy;
        }
        if let Some(batch_size) = o.batch_size {
            settings.batch_size = batch_size;
        }
        if let Some(max_attempts) = o.max_attempts {
            settings.retry.max_attempts = max_attempts;
        }
        if let Some(secs) = o.lock_lease_secs {
            settings.lock_lease = Duration::from_secs(secs);
        }
        if let Some(ms) = o.poll_interval_ms {
            settings.poll_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = o.store_timeout_ms {
            settings.store_timeout = Duration::from_millis(ms);
        }
        settings
    }
}
