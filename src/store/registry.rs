use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use strum_macros::{AsRefStr, Display};

use crate::store::{now_ms, StoreError};

/// The kind of value a key currently holds. Rendered the way `TYPE` reports it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum ValueType {
    String,
    List,
    Stream,
}

/// Ownership record for one key. A string with a TTL stops owning its key once the TTL has
/// passed, even before the key/value store evicts it.
#[derive(Clone, Copy, Debug)]
struct Slot {
    value_type: ValueType,
    expires_at_ms: Option<u64>,
}

impl Slot {
    fn new(value_type: ValueType) -> Slot {
        Slot {
            value_type,
            expires_at_ms: None,
        }
    }

    fn is_expired(&self, now_ms: u64) -> bool {
        matches!(self.expires_at_ms, Some(expires_at) if expires_at <= now_ms)
    }
}

/// Tracks which store owns each key, so that a key holding a list cannot be overwritten by `SET`
/// and vice versa.
///
/// This is the only structure shared between the store actors. It holds no data of its own and is
/// guarded by its own mutex, which is never held across an await point.
#[derive(Clone, Default)]
pub struct TypeRegistry {
    inner: Arc<Mutex<HashMap<String, Slot>>>,
}

impl TypeRegistry {
    pub fn new() -> TypeRegistry {
        Self::default()
    }

    /// Atomically checks that `key` is free or already of type `value_type` and records it.
    /// An existing expiry of the same type is kept.
    pub fn claim(&self, key: &str, value_type: ValueType) -> Result<(), StoreError> {
        let mut slots = self.lock();
        Self::claim_slot(&mut slots, key, value_type, now_ms()).map(|_| ())
    }

    /// Like `claim`, replacing the key's expiry with `expires_at_ms`.
    pub fn claim_until(
        &self,
        key: &str,
        value_type: ValueType,
        expires_at_ms: Option<u64>,
    ) -> Result<(), StoreError> {
        let mut slots = self.lock();
        let slot = Self::claim_slot(&mut slots, key, value_type, now_ms())?;
        slot.expires_at_ms = expires_at_ms;
        Ok(())
    }

    /// Fails with `WrongType` if `key` is owned by a different type. Records nothing.
    pub fn check(&self, key: &str, value_type: ValueType) -> Result<(), StoreError> {
        match self.get(key) {
            Some(current) if current != value_type => Err(StoreError::WrongType),
            _ => Ok(()),
        }
    }

    pub fn get(&self, key: &str) -> Option<ValueType> {
        let now = now_ms();
        self.lock()
            .get(key)
            .filter(|slot| !slot.is_expired(now))
            .map(|slot| slot.value_type)
    }

    /// Forgets `key`, but only if it is still owned by `value_type`.
    pub fn release(&self, key: &str, value_type: ValueType) {
        let mut slots = self.lock();

        if slots.get(key).map(|slot| slot.value_type) == Some(value_type) {
            slots.remove(key);
        }
    }

    fn claim_slot<'a>(
        slots: &'a mut HashMap<String, Slot>,
        key: &str,
        value_type: ValueType,
        now_ms: u64,
    ) -> Result<&'a mut Slot, StoreError> {
        let slot = slots
            .entry(key.to_string())
            .or_insert_with(|| Slot::new(value_type));

        if slot.is_expired(now_ms) {
            *slot = Slot::new(value_type);
        } else if slot.value_type != value_type {
            return Err(StoreError::WrongType);
        }

        Ok(slot)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Slot>> {
        // The map is always left consistent, a panic elsewhere cannot corrupt it.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claim_records_first_type() {
        let registry = TypeRegistry::new();

        assert_eq!(registry.claim("k", ValueType::List), Ok(()));
        assert_eq!(registry.get("k"), Some(ValueType::List));
        assert_eq!(registry.claim("k", ValueType::List), Ok(()));
        assert_eq!(
            registry.claim("k", ValueType::String),
            Err(StoreError::WrongType)
        );
        assert_eq!(registry.get("k"), Some(ValueType::List));
    }

    #[test]
    fn check_does_not_record() {
        let registry = TypeRegistry::new();

        assert_eq!(registry.check("k", ValueType::Stream), Ok(()));
        assert_eq!(registry.get("k"), None);

        registry.claim("k", ValueType::String).unwrap();
        assert_eq!(
            registry.check("k", ValueType::Stream),
            Err(StoreError::WrongType)
        );
    }

    #[test]
    fn release_only_removes_matching_type() {
        let registry = TypeRegistry::new();
        registry.claim("k", ValueType::String).unwrap();

        registry.release("k", ValueType::List);
        assert_eq!(registry.get("k"), Some(ValueType::String));

        registry.release("k", ValueType::String);
        assert_eq!(registry.get("k"), None);
    }

    #[test]
    fn type_names() {
        assert_eq!(ValueType::String.to_string(), "string");
        assert_eq!(ValueType::List.as_ref(), "list");
        assert_eq!(ValueType::Stream.to_string(), "stream");
    }

    #[test]
    fn expired_string_frees_its_key() {
        let registry = TypeRegistry::new();
        registry
            .claim_until("k", ValueType::String, Some(now_ms() - 1))
            .unwrap();

        assert_eq!(registry.get("k"), None);
        assert_eq!(registry.check("k", ValueType::List), Ok(()));
        assert_eq!(registry.claim("k", ValueType::List), Ok(()));
        assert_eq!(registry.get("k"), Some(ValueType::List));

        // The late eviction from the key/value store leaves the new owner alone.
        registry.release("k", ValueType::String);
        assert_eq!(registry.get("k"), Some(ValueType::List));
    }

    #[test]
    fn claim_keeps_live_expiry() {
        let registry = TypeRegistry::new();
        registry
            .claim_until("k", ValueType::String, Some(now_ms() + 60_000))
            .unwrap();

        assert_eq!(registry.claim("k", ValueType::String), Ok(()));
        assert_eq!(
            registry.claim("k", ValueType::List),
            Err(StoreError::WrongType)
        );

        registry.claim_until("k", ValueType::String, None).unwrap();
        assert_eq!(registry.get("k"), Some(ValueType::String));
    }
}
