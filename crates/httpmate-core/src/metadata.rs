//! Per-request heterogeneous key/value store.
//!
//! [`MetaData`] is the only channel through which processors, rules and
//! modules exchange data. Values are addressed by a [`MetaDataKey<T>`], which
//! carries both the key's name (its identity) and the value type as a static
//! witness, so reads come back typed without casts at the call site.
//!
//! ```rust,ignore
//! use httpmate_core::{MetaData, MetaDataKey};
//!
//! const USER: MetaDataKey<String> = MetaDataKey::new("USER");
//!
//! let mut meta = MetaData::new();
//! meta.set(&USER, "alice".to_string());
//! assert_eq!(meta.get(&USER)?, "alice");
//! ```
//!
//! One `MetaData` exists per request and is moved, never shared, so there is
//! no internal locking.

use std::any::Any;
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

use crate::error::{MetaDataError, MetaDataResult};

// =============================================================================
// MetaDataKey
// =============================================================================

/// A named, type-tagged key into [`MetaData`].
///
/// Two keys are the same key when their names are equal. Declaring two keys
/// with the same name but different types is a programming error; reads
/// through the wrong one fail with [`MetaDataError::TypeMismatch`].
pub struct MetaDataKey<T> {
    name: Cow<'static, str>,
    _type: PhantomData<fn() -> T>,
}

impl<T> MetaDataKey<T> {
    /// Creates a key with a static name. Usable in `const` items.
    pub const fn new(name: &'static str) -> Self {
        Self {
            name: Cow::Borrowed(name),
            _type: PhantomData,
        }
    }

    /// Creates a key with a name computed at runtime.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Cow::Owned(name.into()),
            _type: PhantomData,
        }
    }

    /// Returns the key's name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<T> Clone for MetaDataKey<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            _type: PhantomData,
        }
    }
}

impl<T> PartialEq for MetaDataKey<T> {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl<T> Eq for MetaDataKey<T> {}

impl<T> Hash for MetaDataKey<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl<T> fmt::Debug for MetaDataKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetaDataKey")
            .field("name", &self.name)
            .field("type", &std::any::type_name::<T>())
            .finish()
    }
}

impl<T> fmt::Display for MetaDataKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

// =============================================================================
// MetaData
// =============================================================================

type Datum = Box<dyn Any + Send + Sync>;

/// The per-request key/value store threaded through every chain.
#[derive(Default)]
pub struct MetaData {
    values: HashMap<String, Datum>,
}

impl MetaData {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value` under `key`, replacing any previous value.
    pub fn set<T: Send + Sync + 'static>(&mut self, key: &MetaDataKey<T>, value: T) {
        self.values.insert(key.name().to_string(), Box::new(value));
    }

    /// Builder-style [`set`](Self::set).
    pub fn with<T: Send + Sync + 'static>(mut self, key: &MetaDataKey<T>, value: T) -> Self {
        self.set(key, value);
        self
    }

    /// Returns the value stored under `key`.
    ///
    /// Fails with [`MetaDataError::Missing`] when the key was never set; the
    /// error lists the keys that *are* present to ease debugging of chain
    /// wiring.
    pub fn get<T: 'static>(&self, key: &MetaDataKey<T>) -> MetaDataResult<&T> {
        let datum = self
            .values
            .get(key.name())
            .ok_or_else(|| self.missing(key.name()))?;
        datum
            .downcast_ref::<T>()
            .ok_or_else(|| MetaDataError::TypeMismatch {
                key: key.name().to_string(),
                expected: std::any::type_name::<T>(),
            })
    }

    /// Returns a mutable reference to the value stored under `key`.
    pub fn get_mut<T: 'static>(&mut self, key: &MetaDataKey<T>) -> MetaDataResult<&mut T> {
        if !self.values.contains_key(key.name()) {
            return Err(self.missing(key.name()));
        }
        self.values
            .get_mut(key.name())
            .and_then(|datum| datum.downcast_mut::<T>())
            .ok_or_else(|| MetaDataError::TypeMismatch {
                key: key.name().to_string(),
                expected: std::any::type_name::<T>(),
            })
    }

    /// Returns the value stored under `key`, or `None`. Never fails.
    pub fn get_optional<T: 'static>(&self, key: &MetaDataKey<T>) -> Option<&T> {
        self.values
            .get(key.name())
            .and_then(|datum| datum.downcast_ref::<T>())
    }

    /// Returns `true` if a value of the key's type is stored under `key`.
    pub fn contains<T: 'static>(&self, key: &MetaDataKey<T>) -> bool {
        self.get_optional(key).is_some()
    }

    /// Removes and returns the value stored under `key`.
    pub fn remove<T: 'static>(&mut self, key: &MetaDataKey<T>) -> Option<T> {
        if !self.contains(key) {
            return None;
        }
        self.values
            .remove(key.name())
            .and_then(|datum| datum.downcast::<T>().ok())
            .map(|boxed| *boxed)
    }

    /// Removes and returns the value stored under `key`, failing like
    /// [`get`](Self::get) when it is absent.
    pub fn take<T: 'static>(&mut self, key: &MetaDataKey<T>) -> MetaDataResult<T> {
        self.get(key)?;
        self.remove(key).ok_or_else(|| self.missing(key.name()))
    }

    /// Iterates the names of all present keys, in no particular order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Returns the number of stored values.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn missing(&self, key: &str) -> MetaDataError {
        let mut present: Vec<String> = self.values.keys().cloned().collect();
        present.sort();
        MetaDataError::Missing {
            key: key.to_string(),
            present,
        }
    }
}

impl fmt::Debug for MetaData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&str> = self.keys().collect();
        keys.sort_unstable();
        f.debug_struct("MetaData").field("keys", &keys).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NAME: MetaDataKey<String> = MetaDataKey::new("NAME");
    const COUNT: MetaDataKey<u32> = MetaDataKey::new("COUNT");
    const COUNT_AS_STRING: MetaDataKey<String> = MetaDataKey::new("COUNT");

    #[test]
    fn test_set_and_get() {
        let mut meta = MetaData::new();
        meta.set(&NAME, "alice".to_string());
        assert_eq!(meta.get(&NAME).unwrap(), "alice");
        assert!(meta.contains(&NAME));
        assert_eq!(meta.len(), 1);
    }

    #[test]
    fn test_set_overwrites() {
        let mut meta = MetaData::new().with(&COUNT, 1);
        meta.set(&COUNT, 2);
        assert_eq!(*meta.get(&COUNT).unwrap(), 2);
    }

    #[test]
    fn test_missing_names_key_and_snapshot() {
        let meta = MetaData::new().with(&COUNT, 7);
        let err = meta.get(&NAME).unwrap_err();
        match &err {
            MetaDataError::Missing { key, present } => {
                assert_eq!(key, "NAME");
                assert_eq!(present, &vec!["COUNT".to_string()]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.to_string().contains("NAME"));
        assert!(err.to_string().contains("COUNT"));
    }

    #[test]
    fn test_get_optional_never_fails() {
        let meta = MetaData::new().with(&COUNT, 7);
        assert!(meta.get_optional(&NAME).is_none());
        assert!(meta.get_optional(&COUNT_AS_STRING).is_none());
        assert_eq!(meta.get_optional(&COUNT), Some(&7));
    }

    #[test]
    fn test_type_mismatch() {
        let meta = MetaData::new().with(&COUNT, 7);
        assert!(matches!(
            meta.get(&COUNT_AS_STRING),
            Err(MetaDataError::TypeMismatch { .. })
        ));
        assert!(!meta.contains(&COUNT_AS_STRING));
    }

    #[test]
    fn test_get_mut_and_remove() {
        let mut meta = MetaData::new().with(&COUNT, 1);
        *meta.get_mut(&COUNT).unwrap() += 41;
        assert_eq!(meta.remove(&COUNT), Some(42));
        assert!(meta.is_empty());
        assert!(meta.get_mut(&COUNT).is_err());
    }

    #[test]
    fn test_take_fails_like_get() {
        let mut meta = MetaData::new().with(&COUNT, 3);
        assert!(matches!(
            meta.take(&NAME),
            Err(MetaDataError::Missing { .. })
        ));
        assert!(meta.take(&COUNT_AS_STRING).is_err());
        assert_eq!(meta.take(&COUNT).unwrap(), 3);
        assert!(meta.is_empty());
    }

    #[test]
    fn test_remove_with_wrong_type_keeps_value() {
        let mut meta = MetaData::new().with(&COUNT, 1);
        assert_eq!(meta.remove(&COUNT_AS_STRING), None);
        assert!(meta.contains(&COUNT));
    }

    #[test]
    fn test_keys_compare_by_name() {
        let dynamic: MetaDataKey<String> = MetaDataKey::named("NAME");
        assert_eq!(dynamic, NAME);
        let meta = MetaData::new().with(&dynamic, "bob".to_string());
        assert_eq!(meta.get(&NAME).unwrap(), "bob");
    }
}
