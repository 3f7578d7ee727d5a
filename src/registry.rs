//! Name-keyed registry that remembers registration order.
//!
//! One [`Registry`] holds the gateways, another holds the per-gateway circuit breakers. The map
//! and the order sequence live behind a single `RwLock`, so they always describe the same set of
//! names: every name in the order exists in the map and vice versa.
//!
//! Values are handed out by clone; store `Arc`s for anything that is not cheap to copy.

use std::collections::{HashMap, HashSet};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Errors from registry operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("'{name}' is already registered")]
    AlreadyRegistered { name: String },
    #[error("'{name}' not found")]
    NotFound { name: String },
    #[error("invalid order: {reason}")]
    InvalidOrder { reason: String },
}

#[derive(Debug)]
struct Inner<T> {
    entries: HashMap<String, T>,
    order: Vec<String>,
}

/// Ordered, name-keyed collection of `T`.
#[derive(Debug)]
pub struct Registry<T> {
    inner: RwLock<Inner<T>>,
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self { inner: RwLock::new(Inner { entries: HashMap::new(), order: Vec::new() }) }
    }
}

impl<T: Clone> Registry<T> {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    // No mutation below can panic between touching the map and touching the order, so a
    // poisoned lock still guards consistent data.
    fn read(&self) -> RwLockReadGuard<'_, Inner<T>> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner<T>> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert `value` under `name` and append `name` to the order.
    pub fn register(&self, name: impl Into<String>, value: T) -> Result<(), RegistryError> {
        let name = name.into();
        let mut inner = self.write();
        if inner.entries.contains_key(&name) {
            return Err(RegistryError::AlreadyRegistered { name });
        }
        inner.entries.insert(name.clone(), value);
        inner.order.push(name);
        Ok(())
    }

    /// Remove `name` from both the map and the order.
    pub fn unregister(&self, name: &str) -> Result<T, RegistryError> {
        let mut inner = self.write();
        let value = inner
            .entries
            .remove(name)
            .ok_or_else(|| RegistryError::NotFound { name: name.to_string() })?;
        inner.order.retain(|n| n != name);
        Ok(value)
    }

    /// A clone of the value registered under `name`.
    ///
    /// # Errors
    ///
    /// [`RegistryError::NotFound`] if nothing is registered under `name`.
    pub fn get(&self, name: &str) -> Result<T, RegistryError> {
        self.read()
            .entries
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound { name: name.to_string() })
    }

    /// Return the value under `name`, inserting `make()` first if it is absent.
    ///
    /// The fast path only takes the read lock. On a miss the check is repeated under the write
    /// lock, so concurrent first callers for the same name all observe one value and `make` runs
    /// at most once per name.
    pub fn get_or_insert_with(&self, name: &str, make: impl FnOnce() -> T) -> T {
        if let Some(value) = self.read().entries.get(name) {
            return value.clone();
        }
        let mut inner = self.write();
        if let Some(value) = inner.entries.get(name) {
            return value.clone();
        }
        let value = make();
        inner.entries.insert(name.to_string(), value.clone());
        inner.order.push(name.to_string());
        value
    }

    /// Values in registration order.
    pub fn list(&self) -> Vec<T> {
        let inner = self.read();
        inner.order.iter().filter_map(|name| inner.entries.get(name).cloned()).collect()
    }

    /// `(name, value)` pairs in registration order.
    pub fn entries(&self) -> Vec<(String, T)> {
        let inner = self.read();
        inner
            .order
            .iter()
            .filter_map(|name| inner.entries.get(name).map(|v| (name.clone(), v.clone())))
            .collect()
    }

    /// Names in registration order.
    pub fn names(&self) -> Vec<String> {
        self.read().order.clone()
    }

    /// Replace the order. `order` must be a permutation of the registered names.
    pub fn set_order<S: AsRef<str>>(&self, order: &[S]) -> Result<(), RegistryError> {
        let mut inner = self.write();
        if order.len() != inner.order.len() {
            return Err(RegistryError::InvalidOrder {
                reason: format!(
                    "expected {} names, got {}",
                    inner.order.len(),
                    order.len()
                ),
            });
        }
        let mut seen = HashSet::with_capacity(order.len());
        for name in order.iter().map(AsRef::as_ref) {
            if !inner.entries.contains_key(name) {
                return Err(RegistryError::InvalidOrder {
                    reason: format!("'{name}' is not registered"),
                });
            }
            if !seen.insert(name) {
                return Err(RegistryError::InvalidOrder {
                    reason: format!("'{name}' appears more than once"),
                });
            }
        }
        inner.order = order.iter().map(|n| n.as_ref().to_string()).collect();
        Ok(())
    }

    /// Values with `preferred` moved to the front; the rest keep registration order.
    ///
    /// An empty or unregistered preference yields plain registration order.
    pub fn list_with_preference(&self, preferred: &str) -> Vec<T> {
        let inner = self.read();
        let Some(first) = inner.entries.get(preferred) else {
            return inner.order.iter().filter_map(|name| inner.entries.get(name).cloned()).collect();
        };
        let mut ordered = Vec::with_capacity(inner.order.len());
        ordered.push(first.clone());
        ordered.extend(
            inner
                .order
                .iter()
                .filter(|name| name.as_str() != preferred)
                .filter_map(|name| inner.entries.get(name).cloned()),
        );
        ordered
    }

    /// Whether `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.read().entries.contains_key(name)
    }

    /// Number of registered entries.
    pub fn len(&self) -> usize {
        self.read().order.len()
    }

    /// True when nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.read().order.is_empty()
    }
}
