use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::envelope::{Envelope, TypeKey};
use crate::handler::{self, HandlerResult, Subscriber, SyncHandler};
use crate::latest::LatestValueCache;
use crate::registry::SubscriberRegistry;

/// Reference bus: every publish is delivered on the caller's thread, with
/// its own payload, to each matching subscriber in registration order.
///
/// No queue, no coalescing, no concurrency. Handlers that panic or return
/// `Err` are logged and skipped; the remaining subscribers still run and the
/// publisher never sees the failure.
///
/// `SyncEventBus` is `Clone`; clones share subscribers. Handlers may publish
/// or subscribe re-entrantly: each publish iterates over the subscriber list
/// as it stood when the publish began.
#[derive(Clone, Default)]
pub struct SyncEventBus {
    inner: Arc<SyncInner>,
}

#[derive(Default)]
struct SyncInner {
    registry: SubscriberRegistry,
    latest: LatestValueCache,
    sequence: AtomicU64,
}

impl SyncEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to every event of type `E`.
    pub fn subscribe<E, F, R>(&self, handler: F)
    where
        E: Send + Sync + 'static,
        F: Fn(&E) -> R + Send + Sync + 'static,
        R: HandlerResult,
    {
        self.register(Subscriber::unfiltered(handler::sync_handler(handler)));
    }

    /// Subscribe to events of type `E` accepted by `filter`.
    pub fn subscribe_filtered<E, F, R, P>(&self, handler: F, filter: P)
    where
        E: Send + Sync + 'static,
        F: Fn(&E) -> R + Send + Sync + 'static,
        R: HandlerResult,
        P: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.register(Subscriber::new(handler::sync_handler(handler), Arc::new(filter)));
    }

    fn register<E: Send + Sync + 'static>(&self, subscriber: Subscriber<E, SyncHandler<E>>) {
        let count = self.inner.registry.register(subscriber);
        tracing::debug!(event_type = %TypeKey::of::<E>().name(), subscribers = count, "Subscriber registered");
    }

    /// Deliver `event` to the current subscribers of `E`, synchronously.
    pub fn publish<E: Send + Sync + 'static>(&self, event: E) {
        let key = TypeKey::of::<E>();
        let sequence = &self.inner.sequence;
        let envelope = self
            .inner
            .latest
            .store_with(|| Envelope::new(event, sequence.fetch_add(1, Ordering::Relaxed)));

        let subscribers = self.inner.registry.snapshot::<E, SyncHandler<E>>();
        if subscribers.is_empty() {
            tracing::trace!(event_type = %key.name(), "No subscribers; event dropped");
            return;
        }

        let payload = envelope.payload();
        for (index, subscriber) in subscribers.iter().enumerate() {
            if !subscriber.accepts(payload, key.name()) {
                continue;
            }
            let handler = subscriber.handler();
            if let Err(panic) = std::panic::catch_unwind(AssertUnwindSafe(|| handler(payload))) {
                tracing::error!(
                    event_type = %key.name(),
                    subscriber = index,
                    panic = %handler::panic_message(panic.as_ref()),
                    "Subscriber panicked"
                );
            }
        }
    }

    /// Number of subscribers registered for `E`.
    pub fn subscriber_count<E: Send + Sync + 'static>(&self) -> usize {
        self.inner.registry.count::<E, SyncHandler<E>>()
    }

    /// The most recently published envelope of type `E`.
    pub fn latest<E: Send + Sync + 'static>(&self) -> Option<Arc<Envelope<E>>> {
        self.inner.latest.get::<E>()
    }
}
