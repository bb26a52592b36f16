use std::any::{Any, TypeId};
use std::sync::Arc;

use dashmap::DashMap;

use crate::handler::Subscriber;

/// Immutable view of one type's subscribers, in registration order.
pub type Snapshot<E, H> = Arc<Vec<Subscriber<E, H>>>;

/// Append-only mapping from event type to its subscriber list.
///
/// Each list is copy-on-write: registering publishes a new list under the
/// type's map slot, and readers hold an `Arc` snapshot that never changes
/// underneath them. Slots for different types never contend with each other.
///
/// The handler type `H` is fixed by the owning bus, so a given event type
/// always maps to a `Vec<Subscriber<E, H>>` of one concrete shape.
#[derive(Default)]
pub struct SubscriberRegistry {
    lists: DashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a subscriber for `E`. Returns the new list length.
    pub fn register<E, H>(&self, subscriber: Subscriber<E, H>) -> usize
    where
        E: Send + Sync + 'static,
        H: Clone + Send + Sync + 'static,
    {
        let mut slot = self
            .lists
            .entry(TypeId::of::<E>())
            .or_insert_with(|| Box::new(Snapshot::<E, H>::default()));

        let mut next: Vec<Subscriber<E, H>> = slot
            .downcast_ref::<Snapshot<E, H>>()
            .map(|current| current.as_ref().clone())
            .unwrap_or_default();
        next.push(subscriber);
        let len = next.len();
        let published: Box<dyn Any + Send + Sync> = Box::new(Arc::new(next));
        *slot = published;
        len
    }

    /// Current subscribers for `E`. Empty when none are registered.
    pub fn snapshot<E, H>(&self) -> Snapshot<E, H>
    where
        E: Send + Sync + 'static,
        H: Clone + Send + Sync + 'static,
    {
        self.lists
            .get(&TypeId::of::<E>())
            .and_then(|slot| slot.downcast_ref::<Snapshot<E, H>>().cloned())
            .unwrap_or_default()
    }

    /// Number of subscribers registered for `E`.
    pub fn count<E, H>(&self) -> usize
    where
        E: Send + Sync + 'static,
        H: Clone + Send + Sync + 'static,
    {
        self.snapshot::<E, H>().len()
    }

    /// Number of event types with at least one subscriber.
    pub fn type_count(&self) -> usize {
        self.lists.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Tag = &'static str;

    fn tagged(tag: Tag) -> Subscriber<u32, Tag> {
        Subscriber::unfiltered(tag)
    }

    #[test]
    fn preserves_registration_order() {
        let registry = SubscriberRegistry::new();
        assert_eq!(registry.register(tagged("first")), 1);
        assert_eq!(registry.register(tagged("second")), 2);
        assert_eq!(registry.register(tagged("third")), 3);

        let order: Vec<Tag> = registry
            .snapshot::<u32, Tag>()
            .iter()
            .map(|s| *s.handler())
            .collect();
        assert_eq!(order, vec!["first", "second", "third"]);
    }

    #[test]
    fn snapshot_is_stable_across_registration() {
        let registry = SubscriberRegistry::new();
        registry.register(tagged("a"));
        let before = registry.snapshot::<u32, Tag>();
        registry.register(tagged("b"));

        assert_eq!(before.len(), 1);
        assert_eq!(registry.count::<u32, Tag>(), 2);
    }

    #[test]
    fn types_are_independent() {
        let registry = SubscriberRegistry::new();
        registry.register(tagged("a"));
        registry.register(Subscriber::<String, Tag>::unfiltered("s"));

        assert_eq!(registry.count::<u32, Tag>(), 1);
        assert_eq!(registry.count::<String, Tag>(), 1);
        assert_eq!(registry.count::<u64, Tag>(), 0);
        assert_eq!(registry.type_count(), 2);
    }

    #[test]
    fn concurrent_registration_loses_nothing() {
        let registry = Arc::new(SubscriberRegistry::new());
        let threads: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        registry.register(tagged("t"));
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        assert_eq!(registry.count::<u32, Tag>(), 400);
    }
}
