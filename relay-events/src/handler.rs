//! Subscriber entries and handler plumbing shared by both buses.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;

/// Predicate deciding whether a subscriber sees a given payload.
pub type Filter<E> = Arc<dyn Fn(&E) -> bool + Send + Sync>;

/// Type-erased handler of the synchronous bus.
pub type SyncHandler<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// Type-erased handler of the concurrent bus.
pub type AsyncHandler<E> = Arc<dyn Fn(Arc<E>) -> BoxFuture<'static, ()> + Send + Sync>;

/// Handler return values the buses accept.
///
/// Handlers may return `()` (infallible) or `Result<(), E>`. An `Err` is a
/// subscriber failure: it is logged and goes no further.
pub trait HandlerResult {
    fn log_if_err(self, event_type: &str);
}

impl HandlerResult for () {
    fn log_if_err(self, _: &str) {}
}

impl<E: std::fmt::Display> HandlerResult for Result<(), E> {
    fn log_if_err(self, event_type: &str) {
        if let Err(e) = self {
            tracing::error!(event_type = %event_type, error = %e, "Subscriber returned an error");
        }
    }
}

/// One registered `(handler, filter)` pair.
pub struct Subscriber<E, H> {
    handler: H,
    filter: Filter<E>,
}

impl<E, H> Subscriber<E, H> {
    pub fn new(handler: H, filter: Filter<E>) -> Self {
        Self { handler, filter }
    }

    /// A subscriber whose filter accepts everything.
    pub fn unfiltered(handler: H) -> Self
    where
        E: 'static,
    {
        Self::new(handler, Arc::new(|_: &E| true))
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Evaluate the filter. A panicking filter counts as a rejection.
    pub fn accepts(&self, event: &E, event_type: &str) -> bool {
        match std::panic::catch_unwind(AssertUnwindSafe(|| (self.filter)(event))) {
            Ok(accepted) => accepted,
            Err(panic) => {
                tracing::error!(
                    event_type = %event_type,
                    panic = %panic_message(panic.as_ref()),
                    "Subscriber filter panicked; treating as rejected"
                );
                false
            }
        }
    }
}

impl<E, H: Clone> Clone for Subscriber<E, H> {
    fn clone(&self) -> Self {
        Self {
            handler: self.handler.clone(),
            filter: Arc::clone(&self.filter),
        }
    }
}

pub(crate) fn sync_handler<E, F, R>(handler: F) -> SyncHandler<E>
where
    E: 'static,
    F: Fn(&E) -> R + Send + Sync + 'static,
    R: HandlerResult,
{
    let event_type = std::any::type_name::<E>();
    Arc::new(move |event: &E| handler(event).log_if_err(event_type))
}

pub(crate) fn async_handler<E, F, Fut, R>(handler: F) -> AsyncHandler<E>
where
    E: Send + Sync + 'static,
    F: Fn(Arc<E>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: HandlerResult,
{
    let event_type = std::any::type_name::<E>();
    let handler = Arc::new(handler);
    // The user closure runs on first poll, inside whatever wraps the future.
    Arc::new(move |event: Arc<E>| {
        let handler = Arc::clone(&handler);
        Box::pin(async move { handler(event).await.log_if_err(event_type) })
    })
}

/// Wrap a notification so a panic inside it is logged instead of unwinding
/// into the worker.
pub(crate) fn isolate(
    fut: BoxFuture<'static, ()>,
    event_type: &'static str,
) -> BoxFuture<'static, ()> {
    Box::pin(async move {
        if let Err(panic) = AssertUnwindSafe(fut).catch_unwind().await {
            tracing::error!(
                event_type = %event_type,
                panic = %panic_message(panic.as_ref()),
                "Subscriber panicked"
            );
        }
    })
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn unfiltered_accepts_everything() {
        let sub: Subscriber<u32, ()> = Subscriber::unfiltered(());
        assert!(sub.accepts(&0, "u32"));
        assert!(sub.accepts(&u32::MAX, "u32"));
    }

    #[test]
    fn panicking_filter_rejects() {
        let sub: Subscriber<u32, ()> =
            Subscriber::new((), Arc::new(|_: &u32| -> bool { panic!("bad filter") }));
        assert!(!sub.accepts(&1, "u32"));
    }

    #[test]
    fn sync_handler_swallows_err_results() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let handler = sync_handler(move |_: &u32| -> Result<(), String> {
            c.fetch_add(1, Ordering::SeqCst);
            Err("nope".into())
        });
        handler(&5);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn panic_message_extracts_text() {
        let owned: Box<dyn Any + Send> = Box::new(String::from("owned"));
        let borrowed: Box<dyn Any + Send> = Box::new("borrowed");
        let other: Box<dyn Any + Send> = Box::new(42u8);
        assert_eq!(panic_message(owned.as_ref()), "owned");
        assert_eq!(panic_message(borrowed.as_ref()), "borrowed");
        assert_eq!(panic_message(other.as_ref()), "non-string panic payload");
    }

    #[tokio::test]
    async fn async_handler_defers_the_call_until_polled() {
        let handler: AsyncHandler<u32> = async_handler(|event: Arc<u32>| {
            if *event == 1 {
                panic!("failed before returning a future");
            }
            async {}
        });

        let fut = handler(Arc::new(1));
        isolate(fut, "u32").await;
        handler(Arc::new(2)).await;
    }

    #[tokio::test]
    async fn isolate_contains_panics() {
        let fut: BoxFuture<'static, ()> = Box::pin(async { panic!("boom") });
        isolate(fut, "u32").await;
    }
}
