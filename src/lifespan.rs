//! Lifespan State
//!
//! A process-wide key-value container populated by the startup hook and
//! handed by reference to every request scope. Values are stored as
//! `Arc<T>`; the container only guards the map itself, so whatever
//! synchronization a stored value needs (atomics, mutexes, pools) is up to
//! the value.

use {
    dashmap::DashMap,
    std::any::Any,
    std::fmt,
    std::sync::Arc,
};

type Entry = Arc<dyn Any + Send + Sync>;

#[derive(Default)]
pub struct LifespanState {
    entries: DashMap<String, Entry>,
}

impl LifespanState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a value under `key`, returning whether a previous value was replaced.
    pub fn insert<T>(&self, key: impl Into<String>, value: T) -> bool
    where
        T: Any + Send + Sync,
    {
        self.insert_arc(key, Arc::new(value))
    }

    /// Store an already shared value under `key`.
    pub fn insert_arc<T>(&self, key: impl Into<String>, value: Arc<T>) -> bool
    where
        T: Any + Send + Sync,
    {
        self.entries.insert(key.into(), value).is_some()
    }

    /// Fetch the value stored under `key` if it has type `T`.
    pub fn get<T>(&self, key: &str) -> Option<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        let entry = self.entries.get(key)?.value().clone();
        entry.downcast::<T>().ok()
    }

    /// Whether `key` holds a value of type `T`.
    pub fn holds<T: Any>(&self, key: &str) -> bool {
        self.entries
            .get(key)
            .map(|e| e.value().is::<T>())
            .unwrap_or(false)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn remove(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every stored value. Used after the shutdown hook ran.
    pub fn clear(&self) {
        self.entries.clear();
    }
}

impl fmt::Debug for LifespanState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys = self.keys();
        keys.sort();
        f.debug_struct("LifespanState").field("keys", &keys).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_typed_roundtrip() {
        let state = LifespanState::new();
        state.insert("db_url", "postgres://localhost".to_string());

        let url = state.get::<String>("db_url").unwrap();
        assert_eq!(url.as_str(), "postgres://localhost");
        assert!(state.holds::<String>("db_url"));
        assert!(state.get::<u32>("db_url").is_none());
    }

    #[test]
    fn test_shared_values_are_not_copied() {
        let state = LifespanState::new();
        state.insert("counter", AtomicU32::new(0));

        let a = state.get::<AtomicU32>("counter").unwrap();
        let b = state.get::<AtomicU32>("counter").unwrap();
        a.fetch_add(1, Ordering::SeqCst);
        assert_eq!(b.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_replace_and_clear() {
        let state = LifespanState::new();
        assert!(!state.insert("k", 1u8));
        assert!(state.insert("k", 2u8));
        assert_eq!(*state.get::<u8>("k").unwrap(), 2);

        state.clear();
        assert!(state.is_empty());
        assert!(!state.contains_key("k"));
    }
}
