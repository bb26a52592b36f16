//! Queued, coalescing event bus with concurrent fan-out.
//!
//! ## Architecture
//! ```text
//! Publishers (many):                        Dispatch loop (one task):
//!   publish(e) ─┬─► LatestValueCache[E] ◄──── coalescing read
//!               └─► ingestion queue ────────► recv ─► snapshot subscribers
//!                     (mpsc)                              │ filter
//!                                                         ▼
//!                                              WorkerPool (size N)
//!                                             ┌────┼────┐
//!                                             h1   h2   hN
//! ```
//!
//! ## Rules
//! - **Freshest value wins**: on each dequeue the loop delivers whatever the
//!   cache holds for that type, not the dequeued payload. If `A` then `B` are
//!   published before the loop drains, subscribers see `B` only.
//! - **Exactly once per value**: the loop remembers the last sequence it
//!   delivered per type; a dequeued entry whose freshest value already went
//!   out is superseded and dropped.
//! - **Fire-and-forget**: publishers never learn about subscriber outcomes.
//! - **No cross-type ordering**, and no ordering among the notifications of
//!   one drain.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::future::BoxFuture;
use relay_core::RelayError;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::BusConfig;
use crate::envelope::{Envelope, TypeKey};
use crate::handler::{self, AsyncHandler, HandlerResult, Subscriber};
use crate::latest::LatestValueCache;
use crate::pool::WorkerPool;
use crate::registry::SubscriberRegistry;

type Erased = Arc<dyn Any + Send + Sync>;

/// Last delivered sequence per event type. Owned by the dispatch loop.
type Delivered = HashMap<TypeId, u64>;

/// Monomorphised per event type; turns a dequeued entry into notifications.
type FanOut = fn(&Shared, &mut Delivered, Erased) -> Vec<BoxFuture<'static, ()>>;

/// A queued envelope awaiting the dispatch loop.
struct Pending {
    envelope: Erased,
    fan_out: FanOut,
}

/// State reachable from both the facade and the dispatch loop.
struct Shared {
    registry: SubscriberRegistry,
    latest: LatestValueCache,
    pool: WorkerPool,
}

enum IngestSender {
    Unbounded(mpsc::UnboundedSender<Pending>),
    Bounded(mpsc::Sender<Pending>),
}

enum IngestReceiver {
    Unbounded(mpsc::UnboundedReceiver<Pending>),
    Bounded(mpsc::Receiver<Pending>),
}

impl IngestReceiver {
    async fn recv(&mut self) -> Option<Pending> {
        match self {
            IngestReceiver::Unbounded(rx) => rx.recv().await,
            IngestReceiver::Bounded(rx) => rx.recv().await,
        }
    }
}

fn ingest_queue(capacity: Option<usize>) -> (IngestSender, IngestReceiver) {
    match capacity {
        Some(capacity) => {
            let (tx, rx) = mpsc::channel(capacity);
            (IngestSender::Bounded(tx), IngestReceiver::Bounded(rx))
        }
        None => {
            let (tx, rx) = mpsc::unbounded_channel();
            (IngestSender::Unbounded(tx), IngestReceiver::Unbounded(rx))
        }
    }
}

struct Inner {
    shared: Arc<Shared>,
    queue: IngestSender,
    sequence: AtomicU64,
    shutdown: CancellationToken,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    config: BusConfig,
}

/// Concurrent event bus with latest-value coalescing per event type.
///
/// Publishing stores the event as the freshest value for its type and
/// enqueues it; a dedicated dispatch task drains the queue and fans the
/// freshest value out to matching subscribers on a fixed-size [`WorkerPool`].
///
/// Must be constructed inside a Tokio runtime. `ConcurrentEventBus` is
/// `Clone`; clones share state, and any clone may call [`shutdown`](Self::shutdown).
///
/// After shutdown, `publish` fails with [`RelayError::ShutDown`] without
/// touching the latest value, and entries still queued are dropped. A
/// publish racing `shutdown` on an unbounded queue may still record its
/// value as latest before the enqueue is refused.
#[derive(Clone)]
pub struct ConcurrentEventBus {
    inner: Arc<Inner>,
}

impl ConcurrentEventBus {
    /// Build a bus from `config` and start its dispatch loop.
    pub fn new(config: BusConfig) -> Result<Self, RelayError> {
        config.validate()?;
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| RelayError::NoRuntime)?;

        let shared = Arc::new(Shared {
            registry: SubscriberRegistry::new(),
            latest: LatestValueCache::new(),
            pool: WorkerPool::new(config.pool_size),
        });
        let (queue, receiver) = ingest_queue(config.queue_capacity);
        let shutdown = CancellationToken::new();

        let dispatch = DispatchLoop {
            shared: Arc::clone(&shared),
            delivered: Delivered::new(),
        };
        let handle = runtime.spawn(dispatch.run(receiver, shutdown.clone()));

        tracing::info!(
            pool_size = config.pool_size,
            queue_capacity = ?config.queue_capacity,
            "Concurrent event bus started"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                shared,
                queue,
                sequence: AtomicU64::new(0),
                shutdown,
                dispatcher: Mutex::new(Some(handle)),
                config,
            }),
        })
    }

    /// Build a bus with [`BusConfig::default`].
    pub fn try_default() -> Result<Self, RelayError> {
        Self::new(BusConfig::default())
    }

    /// Build a bus with default settings and `pool_size` workers.
    pub fn with_pool_size(pool_size: usize) -> Result<Self, RelayError> {
        Self::new(BusConfig::default().with_pool_size(pool_size))
    }

    /// Subscribe to every event of type `E`.
    ///
    /// Takes effect for the next drain; a drain already fanning out keeps
    /// the subscriber list it started with.
    pub fn subscribe<E, F, Fut, R>(&self, handler: F)
    where
        E: Send + Sync + 'static,
        F: Fn(Arc<E>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: HandlerResult,
    {
        self.register(Subscriber::unfiltered(handler::async_handler(handler)));
    }

    /// Subscribe to events of type `E` accepted by `filter`.
    pub fn subscribe_filtered<E, F, Fut, R, P>(&self, handler: F, filter: P)
    where
        E: Send + Sync + 'static,
        F: Fn(Arc<E>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: HandlerResult,
        P: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.register(Subscriber::new(handler::async_handler(handler), Arc::new(filter)));
    }

    fn register<E: Send + Sync + 'static>(&self, subscriber: Subscriber<E, AsyncHandler<E>>) {
        let count = self.inner.shared.registry.register(subscriber);
        tracing::debug!(event_type = %TypeKey::of::<E>().name(), subscribers = count, "Subscriber registered");
    }

    /// Publish `event`, waiting for queue space if the queue is bounded and full.
    ///
    /// Returns once the event is enqueued; delivery happens later on the
    /// dispatch loop. Fails with [`RelayError::ShutDown`] after shutdown.
    pub async fn publish<E: Send + Sync + 'static>(&self, event: E) -> Result<(), RelayError> {
        self.ensure_open()?;
        match &self.inner.queue {
            IngestSender::Unbounded(tx) => {
                if tx.is_closed() {
                    return Err(RelayError::ShutDown);
                }
                tx.send(self.stage(event)).map_err(|_| RelayError::ShutDown)
            }
            IngestSender::Bounded(tx) => {
                let slot = tokio::select! {
                    _ = self.inner.shutdown.cancelled() => return Err(RelayError::ShutDown),
                    slot = tx.reserve() => slot.map_err(|_| RelayError::ShutDown)?,
                };
                slot.send(self.stage(event));
                Ok(())
            }
        }
    }

    /// Publish without waiting: fails with [`RelayError::QueueFull`] when a
    /// bounded queue has no room. Identical to [`publish`](Self::publish)
    /// for an unbounded queue.
    pub fn try_publish<E: Send + Sync + 'static>(&self, event: E) -> Result<(), RelayError> {
        self.ensure_open()?;
        match &self.inner.queue {
            IngestSender::Unbounded(tx) => {
                if tx.is_closed() {
                    return Err(RelayError::ShutDown);
                }
                tx.send(self.stage(event)).map_err(|_| RelayError::ShutDown)
            }
            IngestSender::Bounded(tx) => {
                let slot = tx.try_reserve().map_err(|e| match e {
                    mpsc::error::TrySendError::Full(()) => RelayError::QueueFull,
                    mpsc::error::TrySendError::Closed(()) => RelayError::ShutDown,
                })?;
                slot.send(self.stage(event));
                Ok(())
            }
        }
    }

    fn ensure_open(&self) -> Result<(), RelayError> {
        if self.inner.shutdown.is_cancelled() {
            return Err(RelayError::ShutDown);
        }
        Ok(())
    }

    /// Record `event` as the freshest value for its type and wrap it for the queue.
    fn stage<E: Send + Sync + 'static>(&self, event: E) -> Pending {
        let sequence = &self.inner.sequence;
        let envelope = self
            .inner
            .shared
            .latest
            .store_with(|| Envelope::new(event, sequence.fetch_add(1, Ordering::Relaxed)));
        Pending {
            envelope,
            fan_out: fan_out::<E>,
        }
    }

    /// Stop the bus.
    ///
    /// Interrupts the dispatch loop, rejects further publishes, then gives
    /// running notifications up to `shutdown_timeout` to finish before
    /// cancelling them. Idempotent; when any call returns, no notification
    /// is running.
    pub async fn shutdown(&self) {
        let first = !self.inner.shutdown.is_cancelled();
        self.inner.shutdown.cancel();

        {
            let mut dispatcher = self.inner.dispatcher.lock().await;
            if let Some(handle) = dispatcher.take() {
                if let Err(e) = handle.await {
                    tracing::error!(error = %e, "Dispatch loop terminated abnormally");
                }
            }
        }

        let graceful = self.inner.shared.pool.shutdown(self.inner.config.shutdown_timeout).await;
        if first {
            tracing::info!(graceful, "Concurrent event bus shut down");
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    /// Number of subscribers registered for `E`.
    pub fn subscriber_count<E: Send + Sync + 'static>(&self) -> usize {
        self.inner.shared.registry.count::<E, AsyncHandler<E>>()
    }

    /// Notifications spawned on the pool and not yet finished.
    pub fn in_flight(&self) -> usize {
        self.inner.shared.pool.in_flight()
    }

    /// The freshest published envelope of type `E`.
    pub fn latest<E: Send + Sync + 'static>(&self) -> Option<Arc<Envelope<E>>> {
        self.inner.shared.latest.get::<E>()
    }

    pub fn config(&self) -> &BusConfig {
        &self.inner.config
    }
}

/// Resolve one dequeued entry of type `E` into ready-to-spawn notifications.
fn fan_out<E: Send + Sync + 'static>(
    shared: &Shared,
    delivered: &mut Delivered,
    dequeued: Erased,
) -> Vec<BoxFuture<'static, ()>> {
    let key = TypeKey::of::<E>();
    let Ok(dequeued) = dequeued.downcast::<Envelope<E>>() else {
        tracing::error!(event_type = %key.name(), "Queued envelope has an unexpected type");
        return Vec::new();
    };

    let freshest = shared.latest.get::<E>().unwrap_or_else(|| Arc::clone(&dequeued));
    if delivered
        .get(&key.id())
        .is_some_and(|&last| freshest.sequence() <= last)
    {
        tracing::debug!(
            event_type = %key.name(),
            sequence = dequeued.sequence(),
            "Envelope superseded; freshest value already delivered"
        );
        return Vec::new();
    }
    delivered.insert(key.id(), freshest.sequence());

    let subscribers = shared.registry.snapshot::<E, AsyncHandler<E>>();
    if subscribers.is_empty() {
        tracing::debug!(event_type = %key.name(), "No subscribers; event dropped");
        return Vec::new();
    }

    let payload = freshest.shared_payload();
    subscribers
        .iter()
        .filter(|subscriber| subscriber.accepts(&payload, key.name()))
        .map(|subscriber| handler::isolate((subscriber.handler())(Arc::clone(&payload)), key.name()))
        .collect()
}

struct DispatchLoop {
    shared: Arc<Shared>,
    delivered: Delivered,
}

impl DispatchLoop {
    async fn run(mut self, mut queue: IngestReceiver, shutdown: CancellationToken) {
        tracing::info!("Dispatch loop started");
        'drain: loop {
            let pending = tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    tracing::debug!("Dispatch loop interrupted by shutdown");
                    break;
                }
                next = queue.recv() => match next {
                    Some(pending) => pending,
                    None => {
                        tracing::debug!("All publishers dropped; dispatch loop exiting");
                        break;
                    }
                },
            };

            let notifications = (pending.fan_out)(&self.shared, &mut self.delivered, pending.envelope);
            for notification in notifications {
                let Some(permit) = self.shared.pool.acquire(&shutdown).await else {
                    break 'drain;
                };
                self.shared.pool.spawn(permit, notification);
            }
        }
        tracing::info!("Dispatch loop stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shared() -> Shared {
        Shared {
            registry: SubscriberRegistry::new(),
            latest: LatestValueCache::new(),
            pool: WorkerPool::new(1),
        }
    }

    async fn stop_dispatcher(bus: &ConcurrentEventBus) {
        let handle = bus.inner.dispatcher.lock().await.take().unwrap();
        handle.abort();
        let _ = handle.await;
    }

    #[tokio::test]
    async fn rejected_publish_leaves_latest_untouched() {
        let bus = ConcurrentEventBus::with_pool_size(1).unwrap();
        stop_dispatcher(&bus).await;

        assert!(!bus.is_shut_down());
        assert!(matches!(bus.publish(7u32).await, Err(RelayError::ShutDown)));
        assert!(matches!(bus.try_publish(8u32), Err(RelayError::ShutDown)));
        assert!(bus.latest::<u32>().is_none());
        bus.shutdown().await;
    }

    #[tokio::test]
    async fn rejected_bounded_publish_leaves_latest_untouched() {
        let bus = ConcurrentEventBus::new(BusConfig::default().with_pool_size(1).with_queue_capacity(4)).unwrap();
        stop_dispatcher(&bus).await;

        assert!(matches!(bus.publish(7u32).await, Err(RelayError::ShutDown)));
        assert!(matches!(bus.try_publish(8u32), Err(RelayError::ShutDown)));
        assert!(bus.latest::<u32>().is_none());
        bus.shutdown().await;
    }

    #[tokio::test]
    async fn try_default_uses_default_config() {
        let bus = ConcurrentEventBus::try_default().unwrap();
        assert_eq!(bus.config(), &BusConfig::default());
        bus.shutdown().await;
    }

    #[test]
    fn stale_entries_are_superseded() {
        let shared = shared();
        shared
            .registry
            .register(Subscriber::<u32, _>::unfiltered(handler::async_handler(|_: Arc<u32>| async {})));

        let first: Erased = shared.latest.store_with(|| Envelope::new(1u32, 0));
        let second: Erased = shared.latest.store_with(|| Envelope::new(2u32, 1));
        let mut delivered = Delivered::new();

        assert_eq!(fan_out::<u32>(&shared, &mut delivered, first).len(), 1);
        assert_eq!(fan_out::<u32>(&shared, &mut delivered, second).len(), 0);
        assert_eq!(delivered[&TypeId::of::<u32>()], 1);
    }

    #[test]
    fn newer_value_after_delivery_goes_out() {
        let shared = shared();
        shared
            .registry
            .register(Subscriber::<u32, _>::unfiltered(handler::async_handler(|_: Arc<u32>| async {})));
        let mut delivered = Delivered::new();

        let first: Erased = shared.latest.store_with(|| Envelope::new(1u32, 0));
        assert_eq!(fan_out::<u32>(&shared, &mut delivered, first).len(), 1);
        let second: Erased = shared.latest.store_with(|| Envelope::new(2u32, 1));
        assert_eq!(fan_out::<u32>(&shared, &mut delivered, second).len(), 1);
    }

    #[test]
    fn no_subscribers_still_marks_delivery() {
        let shared = shared();
        let mut delivered = Delivered::new();
        let only: Erased = shared.latest.store_with(|| Envelope::new(7u64, 4));
        assert!(fan_out::<u64>(&shared, &mut delivered, only).is_empty());
        assert_eq!(delivered[&TypeId::of::<u64>()], 4);
    }
}
