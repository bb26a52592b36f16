use crate::config::ConfigError;

/// Errors surfaced synchronously to callers of Relay components.
///
/// Subscriber failures are not represented: a handler that panics or
/// returns `Err` is logged where it runs and never reaches the publisher.
pub enum RelayError {
    /// Rejected input. Nothing was registered, enqueued or built.
    InvalidArgument(String),
    /// The component was shut down; the call was rejected before any state change.
    ShutDown,
    /// A bounded queue had no room and the caller asked not to wait.
    QueueFull,
    /// A component that spawns background work was built outside a Tokio runtime.
    NoRuntime,
    /// Configuration could not be loaded or converted.
    Config(ConfigError),
}

impl RelayError {
    /// Shorthand for [`RelayError::InvalidArgument`].
    pub fn invalid(message: impl Into<String>) -> Self {
        RelayError::InvalidArgument(message.into())
    }

    /// Whether this error means the target component no longer accepts work.
    pub fn is_shut_down(&self) -> bool {
        matches!(self, RelayError::ShutDown)
    }
}

impl std::fmt::Display for RelayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RelayError::InvalidArgument(msg) => write!(f, "Invalid argument: {msg}"),
            RelayError::ShutDown => write!(f, "Component has been shut down"),
            RelayError::QueueFull => write!(f, "Ingestion queue is full"),
            RelayError::NoRuntime => {
                write!(f, "No Tokio runtime available; construct inside a runtime context")
            }
            RelayError::Config(err) => write!(f, "{err}"),
        }
    }
}

impl std::fmt::Debug for RelayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        <Self as std::fmt::Display>::fmt(self, f)
    }
}

impl std::error::Error for RelayError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RelayError::Config(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ConfigError> for RelayError {
    fn from(err: ConfigError) -> Self {
        RelayError::Config(err)
    }
}
