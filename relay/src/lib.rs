//! Relay: in-process typed publish/subscribe.
//!
//! This facade re-exports the Relay crates behind feature flags:
//!
//! ```ignore
//! use relay::prelude::*;
//! ```
//!
//! # Feature flags
//!
//! | Feature      | Default | Crate              |
//! |--------------|---------|--------------------|
//! | `events`     | **yes** | `relay-events`     |
//! | `rate-limit` | **yes** | `relay-rate-limit` |
//! | `sampler`    | **yes** | `relay-sampler`    |
//! | `full`       | no      | All of the above   |

pub extern crate relay_core;

pub use relay_core::*;

#[cfg(feature = "events")]
pub use relay_events;

#[cfg(feature = "rate-limit")]
pub use relay_rate_limit;

#[cfg(feature = "sampler")]
pub use relay_sampler;

/// Unified prelude: `use relay::prelude::*`.
pub mod prelude {
    pub use relay_core::config::{ConfigSection, RelayConfig};
    pub use relay_core::RelayError;

    #[cfg(feature = "events")]
    pub use relay_events::prelude::*;

    #[cfg(feature = "rate-limit")]
    pub use relay_rate_limit::{Request, ThrottleConfig, ThrottleResult, Throttler};

    #[cfg(feature = "sampler")]
    pub use relay_sampler::{Weighted, WeightedSampler};
}
