use std::time::Duration;

use relay_core::config::{ConfigError, ConfigSection, RelayConfig};
use relay_core::RelayError;

/// Settings for [`Throttler`](crate::Throttler), read from `relay.throttle`:
///
/// ```yaml
/// relay:
///   throttle:
///     max_requests: 100
///     window_ms: 1000
///     notify_interval_ms: 100
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThrottleConfig {
    /// Requests tolerated within one window.
    pub max_requests: usize,
    pub window: Duration,
    /// How often registered callbacks are polled.
    pub notify_interval: Duration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            max_requests: 100,
            window: Duration::from_secs(1),
            notify_interval: Duration::from_millis(100),
        }
    }
}

impl ThrottleConfig {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            ..Self::default()
        }
    }

    pub fn with_notify_interval(mut self, interval: Duration) -> Self {
        self.notify_interval = interval;
        self
    }

    pub fn validate(&self) -> Result<(), RelayError> {
        if self.max_requests == 0 {
            return Err(RelayError::invalid("max_requests must be greater than 0"));
        }
        if self.window.is_zero() {
            return Err(RelayError::invalid("window must be greater than 0"));
        }
        if self.notify_interval.is_zero() {
            return Err(RelayError::invalid("notify_interval must be greater than 0"));
        }
        Ok(())
    }
}

impl ConfigSection for ThrottleConfig {
    fn prefix() -> &'static str {
        "relay.throttle"
    }

    fn from_config(config: &RelayConfig) -> Result<Self, ConfigError> {
        let defaults = ThrottleConfig::default();
        let window_ms: u64 = config.get_or(&Self::key("window_ms"), defaults.window.as_millis() as u64)?;
        let interval_ms: u64 = config.get_or(
            &Self::key("notify_interval_ms"),
            defaults.notify_interval.as_millis() as u64,
        )?;
        let parsed = ThrottleConfig {
            max_requests: config.get_or(&Self::key("max_requests"), defaults.max_requests)?,
            window: Duration::from_millis(window_ms),
            notify_interval: Duration::from_millis(interval_ms),
        };
        parsed.validate().map_err(|e| ConfigError::Invalid {
            key: Self::prefix().to_string(),
            reason: e.to_string(),
        })?;
        Ok(parsed)
    }
}
