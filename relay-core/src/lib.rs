//! Shared foundations for the Relay crates: the [`RelayError`] taxonomy,
//! layered configuration, and tracing setup.

pub mod config;
pub mod error;
pub mod telemetry;

pub use config::{ConfigError, ConfigSection, ConfigValue, FromConfigValue, RelayConfig};
pub use error::RelayError;
