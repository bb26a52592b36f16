use super::{ConfigError, RelayConfig};

/// A strongly-typed configuration section rooted at a key prefix.
///
/// ```ignore
/// impl ConfigSection for BusConfig {
///     fn prefix() -> &'static str { "relay.bus" }
///
///     fn from_config(config: &RelayConfig) -> Result<Self, ConfigError> {
///         let pool_size = config.get_or(&Self::key("pool_size"), 4usize)?;
///         Ok(BusConfig { pool_size, ..Default::default() })
///     }
/// }
/// ```
pub trait ConfigSection: Sized {
    /// The configuration key prefix (e.g., `"relay.bus"`).
    fn prefix() -> &'static str;

    /// Construct from a [`RelayConfig`] instance.
    fn from_config(config: &RelayConfig) -> Result<Self, ConfigError>;

    /// Absolute key for a property of this section.
    fn key(name: &str) -> String {
        format!("{}.{name}", Self::prefix())
    }
}
