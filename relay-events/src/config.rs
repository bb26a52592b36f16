use std::time::Duration;

use relay_core::config::{ConfigError, ConfigSection, RelayConfig};
use relay_core::RelayError;

/// Default grace period for in-flight notifications at shutdown.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(60);

/// Used when the platform cannot report its parallelism.
const FALLBACK_POOL_SIZE: usize = 4;

/// Settings for [`ConcurrentEventBus`](crate::ConcurrentEventBus).
///
/// Loaded from the `relay.bus` section:
///
/// ```yaml
/// relay:
///   bus:
///     pool_size: 8              # concurrent notifications
///     queue_capacity: 1024      # omit or null for an unbounded queue
///     shutdown_timeout_ms: 5000
/// ```
///
/// A bounded queue makes `publish().await` wait for room when producers
/// outrun the dispatch loop. That protects memory at the cost of stalling
/// producers, so the default stays unbounded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusConfig {
    pub pool_size: usize,
    pub queue_capacity: Option<usize>,
    pub shutdown_timeout: Duration,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            pool_size: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(FALLBACK_POOL_SIZE),
            queue_capacity: None,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }
}

impl BusConfig {
    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = Some(capacity);
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    pub fn validate(&self) -> Result<(), RelayError> {
        if self.pool_size == 0 {
            return Err(RelayError::invalid("pool_size must be greater than 0"));
        }
        if self.queue_capacity == Some(0) {
            return Err(RelayError::invalid("queue_capacity must be greater than 0"));
        }
        Ok(())
    }
}

impl ConfigSection for BusConfig {
    fn prefix() -> &'static str {
        "relay.bus"
    }

    fn from_config(config: &RelayConfig) -> Result<Self, ConfigError> {
        let defaults = BusConfig::default();
        let timeout_ms = config.get_or(
            &Self::key("shutdown_timeout_ms"),
            defaults.shutdown_timeout.as_millis() as u64,
        )?;
        let parsed = BusConfig {
            pool_size: config.get_or(&Self::key("pool_size"), defaults.pool_size)?,
            queue_capacity: config.get_or(&Self::key("queue_capacity"), None)?,
            shutdown_timeout: Duration::from_millis(timeout_ms),
        };
        parsed.validate().map_err(|e| ConfigError::Invalid {
            key: Self::prefix().to_string(),
            reason: e.to_string(),
        })?;
        Ok(parsed)
    }
}
