//! In-process typed publish/subscribe.
//!
//! Two buses share one subscriber model:
//!
//! - [`SyncEventBus`] delivers every publish on the caller's thread, in
//!   registration order, with the published payload.
//! - [`ConcurrentEventBus`] queues publishes and fans them out on a bounded
//!   [`WorkerPool`]. Per event type only the freshest value is delivered:
//!   a burst of publishes collapses to its last element.
//!
//! ```text
//!   subscribe::<E>(handler[, filter]) ──► SubscriberRegistry (TypeId → Arc<Vec<_>>)
//!   publish(e: E) ──► LatestValueCache (TypeId → Envelope<E>) ──► dispatch ──► handlers
//! ```
//!
//! Events are routed by their Rust type. Any `Send + Sync + 'static` value is
//! an event; subscribers of `E` never see events of another type.
//!
//! Handler failures (an `Err` return or a panic) are logged with `tracing`
//! and never reach the publisher or the other subscribers.

pub mod concurrent;
pub mod config;
pub mod envelope;
pub mod handler;
pub mod latest;
pub mod pool;
pub mod registry;
pub mod sync_bus;

pub use concurrent::ConcurrentEventBus;
pub use config::{BusConfig, DEFAULT_SHUTDOWN_TIMEOUT};
pub use envelope::{Envelope, TypeKey};
pub use handler::{HandlerResult, Subscriber};
pub use latest::LatestValueCache;
pub use pool::WorkerPool;
pub use registry::SubscriberRegistry;
pub use sync_bus::SyncEventBus;
pub use relay_core::RelayError;

pub mod prelude {
    //! Common imports for publishing and subscribing.
    pub use crate::{BusConfig, ConcurrentEventBus, Envelope, HandlerResult, SyncEventBus};
    pub use relay_core::RelayError;
}
