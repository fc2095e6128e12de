//! Per-run typed key/value storage for nodes.

use std::any::Any;
use std::collections::HashMap;
use std::marker::PhantomData;

use tokio::sync::Mutex;

/// Typed key into [`AgentStorage`].
pub struct StorageKey<T> {
    name: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T> StorageKey<T> {
    /// Create a key. Usable in `const` position.
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }

    /// Key name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> Clone for StorageKey<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for StorageKey<T> {}

/// Values shared between the nodes of one run; dropped when the run ends.
#[derive(Default)]
pub struct AgentStorage {
    values: Mutex<HashMap<&'static str, Box<dyn Any + Send + Sync>>>,
}

impl AgentStorage {
    /// Create empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a value, replacing any previous one.
    pub async fn set<T: Send + Sync + 'static>(&self, key: &StorageKey<T>, value: T) {
        let _ = self.values.lock().await.insert(key.name, Box::new(value));
    }

    /// Clone out a stored value.
    pub async fn get<T: Clone + Send + Sync + 'static>(&self, key: &StorageKey<T>) -> Option<T> {
        self.values
            .lock()
            .await
            .get(key.name)
            .and_then(|v| v.downcast_ref::<T>())
            .cloned()
    }

    /// Remove and return a stored value.
    pub async fn remove<T: Send + Sync + 'static>(&self, key: &StorageKey<T>) -> Option<T> {
        let value = self.values.lock().await.remove(key.name)?;
        value.downcast::<T>().ok().map(|v| *v)
    }

    /// Update a value in place, starting from `T::default()` when absent.
    /// Returns the updated value.
    pub async fn update<T, F>(&self, key: &StorageKey<T>, f: F) -> T
    where
        T: Clone + Default + Send + Sync + 'static,
        F: FnOnce(&mut T),
    {
        let mut values = self.values.lock().await;
        let mut current = values
            .get(key.name)
            .and_then(|v| v.downcast_ref::<T>())
            .cloned()
            .unwrap_or_default();
        f(&mut current);
        let _ = values.insert(key.name, Box::new(current.clone()));
        current
    }

    /// Drop every stored value.
    pub async fn clear(&self) {
        self.values.lock().await.clear();
    }
}
