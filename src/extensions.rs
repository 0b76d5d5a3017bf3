//! Typed per-request storage shared between middleware and handlers.
//!
//! A middleware declares a `static` [`ExtensionKey<T>`] and stores a `T` on the
//! request; downstream code reads it back through the same key and gets a `&T`
//! without any casting on the caller's side.
//!
//! ```rust
//! use strata::extensions::{ExtensionKey, Extensions};
//!
//! static USER: ExtensionKey<String> = ExtensionKey::new("user");
//!
//! let mut ext = Extensions::default();
//! ext.insert(&USER, "alice".to_string());
//! assert_eq!(ext.get(&USER).map(String::as_str), Some("alice"));
//! ```

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;

/// Name plus value type identifying one slot in [`Extensions`]
///
/// Two keys with the same name but different value types address different
/// slots, so a key can never hand back a value of the wrong type.
pub struct ExtensionKey<T> {
    name: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T> ExtensionKey<T> {
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> fmt::Debug for ExtensionKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ExtensionKey").field(&self.name).finish()
    }
}

type Slot = (&'static str, TypeId);

/// Type-indexed map of middleware-provided values
#[derive(Default)]
pub struct Extensions {
    map: HashMap<Slot, Box<dyn Any + Send + Sync>>,
}

impl Extensions {
    /// Store `value`, returning the previous value held under `key`
    pub fn insert<T: Any + Send + Sync>(&mut self, key: &ExtensionKey<T>, value: T) -> Option<T> {
        self.map
            .insert(slot(key), Box::new(value))
            .and_then(|old| old.downcast::<T>().ok())
            .map(|b| *b)
    }

    #[must_use]
    pub fn get<T: Any + Send + Sync>(&self, key: &ExtensionKey<T>) -> Option<&T> {
        self.map
            .get(&slot(key))
            .and_then(|v| v.downcast_ref::<T>())
    }

    pub fn get_mut<T: Any + Send + Sync>(&mut self, key: &ExtensionKey<T>) -> Option<&mut T> {
        self.map
            .get_mut(&slot(key))
            .and_then(|v| v.downcast_mut::<T>())
    }

    pub fn remove<T: Any + Send + Sync>(&mut self, key: &ExtensionKey<T>) -> Option<T> {
        self.map
            .remove(&slot(key))
            .and_then(|v| v.downcast::<T>().ok())
            .map(|b| *b)
    }

    #[must_use]
    pub fn contains<T: Any + Send + Sync>(&self, key: &ExtensionKey<T>) -> bool {
        self.map.contains_key(&slot(key))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn clear(&mut self) {
        self.map.clear();
    }
}

impl fmt::Debug for Extensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set()
            .entries(self.map.keys().map(|(name, _)| name))
            .finish()
    }
}

#[inline]
fn slot<T: Any>(key: &ExtensionKey<T>) -> Slot {
    (key.name, TypeId::of::<T>())
}

#[cfg(test)]
mod tests {
    use super::*;

    static COUNT: ExtensionKey<u32> = ExtensionKey::new("count");
    static COUNT_TEXT: ExtensionKey<String> = ExtensionKey::new("count");

    #[test]
    fn test_insert_get_replace() {
        let mut ext = Extensions::default();
        assert!(ext.insert(&COUNT, 1).is_none());
        assert_eq!(ext.insert(&COUNT, 2), Some(1));
        assert_eq!(ext.get(&COUNT), Some(&2));

        if let Some(v) = ext.get_mut(&COUNT) {
            *v += 1;
        }
        assert_eq!(ext.remove(&COUNT), Some(3));
        assert!(ext.is_empty());
    }

    #[test]
    fn test_same_name_different_type() {
        let mut ext = Extensions::default();
        ext.insert(&COUNT, 7);
        ext.insert(&COUNT_TEXT, "seven".to_string());
        assert_eq!(ext.len(), 2);
        assert_eq!(ext.get(&COUNT), Some(&7));
        assert_eq!(ext.get(&COUNT_TEXT).map(String::as_str), Some("seven"));
    }
}
