use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use relay_core::RelayError;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::config::ThrottleConfig;

/// Admission decision for the current window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleResult {
    Proceed,
    DoNotProceed,
}

/// A request offered to the throttler: a payload and when it was made.
#[derive(Debug, Clone)]
pub struct Request<T> {
    payload: T,
    timestamp: Instant,
}

impl<T> Request<T> {
    /// A request stamped with the current time.
    pub fn new(payload: T) -> Self {
        Self::at(payload, Instant::now())
    }

    pub fn at(payload: T, timestamp: Instant) -> Self {
        Self { payload, timestamp }
    }

    pub fn payload(&self) -> &T {
        &self.payload
    }

    pub fn timestamp(&self) -> Instant {
        self.timestamp
    }
}

type Callback = Arc<dyn Fn(ThrottleResult) + Send + Sync>;

struct Window {
    config: ThrottleConfig,
    requests: Mutex<VecDeque<Instant>>,
    callbacks: RwLock<Vec<Callback>>,
}

impl Window {
    fn evaluate(&self) -> ThrottleResult {
        let now = Instant::now();
        let window = self.config.window;
        let mut requests = self.requests.lock().unwrap_or_else(PoisonError::into_inner);
        requests.retain(|&ts| now.saturating_duration_since(ts) <= window);

        if requests.len() > self.config.max_requests {
            ThrottleResult::DoNotProceed
        } else {
            ThrottleResult::Proceed
        }
    }

    fn notify(&self) {
        let result = self.evaluate();
        if result != ThrottleResult::Proceed {
            tracing::trace!(result = ?result, "Window saturated; callbacks held back");
            return;
        }
        let callbacks = self
            .callbacks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for callback in callbacks {
            if std::panic::catch_unwind(AssertUnwindSafe(|| callback(result))).is_err() {
                tracing::warn!("Throttle callback panicked");
            }
        }
    }
}

struct Notifier {
    cancel: CancellationToken,
    task: tokio::sync::Mutex<Option<JoinHandle<()>>>,
    // Stops the background task once the last handle is dropped.
    _guard: DropGuard,
}

/// Sliding-window throttler.
///
/// Requests older than the window are forgotten; while more than
/// `max_requests` remain, [`should_proceed`](Self::should_proceed) answers
/// [`ThrottleResult::DoNotProceed`]. A background task evaluates the window
/// every `notify_interval` and calls each registered callback with
/// [`ThrottleResult::Proceed`] while traffic is allowed.
///
/// Cloning is cheap; clones share the window. The background task stops on
/// [`quit`](Self::quit) or when the last clone is dropped.
#[derive(Clone)]
pub struct Throttler {
    window: Arc<Window>,
    notifier: Arc<Notifier>,
}

impl Throttler {
    /// Create a throttler and start its notifier. Requires a Tokio runtime.
    pub fn new(config: ThrottleConfig) -> Result<Self, RelayError> {
        config.validate()?;
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| RelayError::NoRuntime)?;

        let interval = config.notify_interval;
        let window = Arc::new(Window {
            config,
            requests: Mutex::new(VecDeque::new()),
            callbacks: RwLock::new(Vec::new()),
        });

        let cancel = CancellationToken::new();
        let task = runtime.spawn(run_notifier(Arc::clone(&window), interval, cancel.clone()));

        Ok(Self {
            window,
            notifier: Arc::new(Notifier {
                _guard: cancel.clone().drop_guard(),
                cancel,
                task: tokio::sync::Mutex::new(Some(task)),
            }),
        })
    }

    /// Decide whether a new request may go ahead right now.
    pub fn should_proceed(&self) -> ThrottleResult {
        self.window.evaluate()
    }

    /// Record `request` in the window.
    pub fn add_request<T>(&self, request: &Request<T>) {
        self.window
            .requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(request.timestamp());
    }

    /// Call `callback` with [`ThrottleResult::Proceed`] on every notifier
    /// tick where traffic is allowed.
    pub fn notify_when_can_proceed<F>(&self, callback: F)
    where
        F: Fn(ThrottleResult) + Send + Sync + 'static,
    {
        let mut callbacks = self
            .window
            .callbacks
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        callbacks.push(Arc::new(callback));
        tracing::debug!(callbacks = callbacks.len(), "Throttle callback registered");
    }

    /// Requests currently counted in the window, including expired ones not
    /// yet evicted.
    pub fn pending(&self) -> usize {
        self.window
            .requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn config(&self) -> &ThrottleConfig {
        &self.window.config
    }

    /// Stop the notifier and wait for it to exit. Safe to call more than once.
    pub async fn quit(&self) {
        self.notifier.cancel.cancel();
        let mut task = self.notifier.task.lock().await;
        if let Some(handle) = task.take() {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Throttle notifier terminated abnormally");
            }
            tracing::debug!("Throttle notifier stopped");
        }
    }
}

async fn run_notifier(window: Arc<Window>, interval: std::time::Duration, cancel: CancellationToken) {
    let mut tick = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = tick.tick() => window.notify(),
            _ = cancel.cancelled() => break,
        }
    }
}
