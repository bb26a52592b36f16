use std::any::TypeId;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use chrono::{DateTime, Utc};

/// Stable routing key for an event type.
///
/// Equality and hashing use the [`TypeId`] only; the type name is carried
/// for log output.
#[derive(Clone, Copy, Debug)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
}

impl TypeKey {
    pub fn of<E: 'static>() -> Self {
        Self {
            id: TypeId::of::<E>(),
            name: std::any::type_name::<E>(),
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for TypeKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeKey {}

impl Hash for TypeKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Immutable wrapper pairing a published payload with its creation time.
///
/// `sequence` is assigned by the owning bus and increases with every
/// publish on that bus.
#[derive(Debug)]
pub struct Envelope<E> {
    payload: Arc<E>,
    created_at: DateTime<Utc>,
    sequence: u64,
}

impl<E> Envelope<E> {
    pub fn new(payload: E, sequence: u64) -> Self {
        Self {
            payload: Arc::new(payload),
            created_at: Utc::now(),
            sequence,
        }
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }

    /// A shared handle to the payload, for handing to concurrent subscribers.
    pub fn shared_payload(&self) -> Arc<E> {
        Arc::clone(&self.payload)
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}

impl<E> Clone for Envelope<E> {
    fn clone(&self) -> Self {
        Self {
            payload: Arc::clone(&self.payload),
            created_at: self.created_at,
            sequence: self.sequence,
        }
    }
}
