//! Name -> cache registry owned by whoever composes dispatcher and targets.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

use crate::{CacheError, RingCache};

/// Registry of named caches
pub struct CacheRegistry<T> {
    caches: Mutex<HashMap<String, RingCache<T>>>,
}

impl<T> Default for CacheRegistry<T> {
    fn default() -> Self {
        Self {
            caches: Mutex::new(HashMap::new()),
        }
    }
}

impl<T> CacheRegistry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, RingCache<T>>> {
        self.caches.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create a fresh cache under `name`, replacing any existing entry.
    ///
    /// Handles to a replaced cache keep working but are no longer reachable
    /// through the registry.
    pub fn create(&self, name: &str, capacity: usize) -> Result<RingCache<T>, CacheError> {
        check_capacity(name, capacity)?;
        let cache = RingCache::new(capacity);
        if self.lock().insert(name.to_string(), cache.clone()).is_some() {
            warn!(cache = name, "Cache name re-created, previous cache unregistered");
        }
        debug!(cache = name, capacity, "Cache created");
        Ok(cache)
    }

    /// Look up an existing cache
    pub fn get(&self, name: &str) -> Option<RingCache<T>> {
        self.lock().get(name).cloned()
    }

    /// Return the cache registered under `name`, creating it if absent.
    ///
    /// An existing cache keeps its original capacity.
    pub fn get_or_create(&self, name: &str, capacity: usize) -> Result<RingCache<T>, CacheError> {
        check_capacity(name, capacity)?;
        let mut caches = self.lock();
        if let Some(existing) = caches.get(name) {
            if existing.capacity() != capacity {
                warn!(
                    cache = name,
                    existing = existing.capacity(),
                    requested = capacity,
                    "Shared cache keeps its original capacity"
                );
            }
            return Ok(existing.clone());
        }
        let cache = RingCache::new(capacity);
        caches.insert(name.to_string(), cache.clone());
        debug!(cache = name, capacity, "Cache created");
        Ok(cache)
    }

    /// Clear and unregister a cache. Destroying an unknown name is a no-op.
    ///
    /// Outstanding handles observe an empty cache that ignores writes.
    pub fn destroy(&self, name: &str) {
        if let Some(cache) = self.lock().remove(name) {
            cache.detach();
            debug!(cache = name, "Cache destroyed");
        }
    }

    /// Registered cache names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.lock().keys().cloned().collect();
        names.sort();
        names
    }
}

fn check_capacity(name: &str, capacity: usize) -> Result<(), CacheError> {
    if capacity == 0 {
        return Err(CacheError::InvalidCapacity {
            name: name.to_string(),
            capacity,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_share_by_name() {
        let registry = CacheRegistry::new();
        let cache = registry.create("test-log-cache", 5).unwrap();
        cache.add("test log");

        let shared = registry.get("test-log-cache").unwrap();
        assert_eq!(shared.collect_all(), vec!["test log"]);
    }

    #[test]
    fn test_get_or_create_reuses_existing() {
        let registry = CacheRegistry::new();
        let first = registry.get_or_create("recent", 3).unwrap();
        let second = registry.get_or_create("recent", 10).unwrap();

        first.add(1);
        second.add(2);
        assert_eq!(first.collect_all(), vec![2, 1]);
        assert_eq!(second.capacity(), 3);
    }

    #[test]
    fn test_create_overwrites() {
        let registry = CacheRegistry::new();
        let old = registry.create("c", 3).unwrap();
        old.add(1);

        let new = registry.create("c", 3).unwrap();
        assert!(new.is_empty());
        assert!(registry.get("c").unwrap().is_empty());
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let registry = CacheRegistry::<u8>::new();
        let err = registry.create("c", 0).unwrap_err();
        assert_eq!(
            err,
            CacheError::InvalidCapacity {
                name: "c".to_string(),
                capacity: 0
            }
        );
        assert!(registry.get("c").is_none());
    }

    #[test]
    fn test_destroy_detaches_and_is_idempotent() {
        let registry = CacheRegistry::new();
        let cache = registry.create("c", 3).unwrap();
        cache.add("a");

        registry.destroy("c");
        registry.destroy("c");
        registry.destroy("never-created");

        assert!(registry.get("c").is_none());
        assert!(cache.is_empty());
        cache.add("b");
        assert!(cache.collect_all().is_empty());
    }

    #[test]
    fn test_names_sorted() {
        let registry = CacheRegistry::<u8>::new();
        registry.create("b", 1).unwrap();
        registry.create("a", 1).unwrap();
        assert_eq!(registry.names(), vec!["a".to_string(), "b".to_string()]);
    }
}
