use std::any::{Any, TypeId};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::envelope::Envelope;

/// Most recently published envelope per event type. Last write wins.
#[derive(Default)]
pub struct LatestValueCache {
    slots: DashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl LatestValueCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an envelope and store it as the latest value for `E`.
    ///
    /// `make` runs while the type's slot is locked, so envelopes stamped
    /// inside it land in the cache in stamp order.
    pub fn store_with<E, F>(&self, make: F) -> Arc<Envelope<E>>
    where
        E: Send + Sync + 'static,
        F: FnOnce() -> Envelope<E>,
    {
        match self.slots.entry(TypeId::of::<E>()) {
            Entry::Occupied(mut slot) => {
                let envelope = Arc::new(make());
                slot.insert(envelope.clone());
                envelope
            }
            Entry::Vacant(slot) => {
                let envelope = Arc::new(make());
                slot.insert(envelope.clone());
                envelope
            }
        }
    }

    /// The latest envelope for `E`, if one was ever published.
    pub fn get<E>(&self) -> Option<Arc<Envelope<E>>>
    where
        E: Send + Sync + 'static,
    {
        let erased = self.slots.get(&TypeId::of::<E>())?.value().clone();
        erased.downcast::<Envelope<E>>().ok()
    }

    /// Number of event types with a cached value.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_write_wins() {
        let cache = LatestValueCache::new();
        assert!(cache.get::<String>().is_none());

        cache.store_with(|| Envelope::new("A".to_string(), 0));
        cache.store_with(|| Envelope::new("B".to_string(), 1));

        let latest = cache.get::<String>().unwrap();
        assert_eq!(latest.payload(), "B");
        assert_eq!(latest.sequence(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn returns_the_stored_envelope() {
        let cache = LatestValueCache::new();
        let stored = cache.store_with(|| Envelope::new(5u32, 9));
        let fetched = cache.get::<u32>().unwrap();
        assert!(Arc::ptr_eq(&stored, &fetched));
    }

    #[test]
    fn one_slot_per_type() {
        let cache = LatestValueCache::new();
        cache.store_with(|| Envelope::new(1u32, 0));
        cache.store_with(|| Envelope::new(1u64, 1));
        assert_eq!(cache.get::<u32>().unwrap().sequence(), 0);
        assert_eq!(cache.get::<u64>().unwrap().sequence(), 1);
        assert!(!cache.is_empty());
    }
}
