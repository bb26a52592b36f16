//! Sliding-window throttling.
//!
//! A [`Throttler`] counts the requests recorded within its window and
//! answers [`ThrottleResult::DoNotProceed`] once they exceed the limit.
//! Callers that would rather be told when to resume register a callback with
//! [`Throttler::notify_when_can_proceed`]; a background task polls the
//! window every `notify_interval` and calls them while traffic is allowed.

pub mod config;
mod throttler;

pub use config::ThrottleConfig;
pub use throttler::{Request, ThrottleResult, Throttler};
