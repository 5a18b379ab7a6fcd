//! Fixed-capacity most-recent-N buffer.
//!
//! Backed by a `HeapRb` used in overwrite mode: once full, every push drops
//! the oldest element. Reads walk the ring backwards so callers always see
//! newest-first order.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use ringbuf::{traits::*, HeapRb};

struct Slot<T> {
    /// `None` once the cache has been destroyed through the registry
    ring: Option<HeapRb<T>>,
    capacity: usize,
}

/// Shared handle to a bounded cache.
///
/// Clones share the same storage, so a write through one handle is visible
/// through every other.
pub struct RingCache<T> {
    slot: Arc<Mutex<Slot<T>>>,
}

impl<T> Clone for RingCache<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T> fmt::Debug for RingCache<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slot = self.lock();
        f.debug_struct("RingCache")
            .field("len", &slot.ring.as_ref().map_or(0, |r| r.occupied_len()))
            .field("capacity", &slot.capacity)
            .field("detached", &slot.ring.is_none())
            .finish()
    }
}

impl<T> RingCache<T> {
    /// Create an empty cache. `capacity` must be non-zero.
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Slot {
                ring: Some(HeapRb::new(capacity)),
                capacity,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slot<T>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert at the most recent end, evicting the oldest element when full.
    pub fn add(&self, element: T) {
        if let Some(ring) = self.lock().ring.as_mut() {
            // Evicted element is dropped here
            let _ = ring.push_overwrite(element);
        }
    }

    /// Number of retained elements
    pub fn len(&self) -> usize {
        self.lock().ring.as_ref().map_or(0, |r| r.occupied_len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.lock().capacity
    }

    /// Remove every element. Later inserts start again from size 0.
    pub fn clear(&self) {
        if let Some(ring) = self.lock().ring.as_mut() {
            ring.clear();
        }
    }

    /// Drop all elements and stop accepting new ones
    pub(crate) fn detach(&self) {
        self.lock().ring = None;
    }

    /// Lock the cache for reading.
    ///
    /// Writers block while the view is alive, keep it short.
    pub fn view(&self) -> CacheView<'_, T> {
        CacheView { slot: self.lock() }
    }

    /// Clone out up to `n` elements, newest first
    pub fn collect_recent(&self, n: usize) -> Vec<T>
    where
        T: Clone,
    {
        self.view().most_recent(n).cloned().collect()
    }

    /// Clone out every element, newest first
    pub fn collect_all(&self) -> Vec<T>
    where
        T: Clone,
    {
        self.view().all().cloned().collect()
    }
}

/// Read guard over a `RingCache`.
///
/// Every call to `all` / `most_recent` restarts from the newest element.
pub struct CacheView<'a, T> {
    slot: MutexGuard<'a, Slot<T>>,
}

impl<T> CacheView<'_, T> {
    /// Every retained element, newest first
    pub fn all(&self) -> impl Iterator<Item = &T> + '_ {
        let (older, newer) = match self.slot.ring.as_ref() {
            Some(ring) => ring.as_slices(),
            None => (&[][..], &[][..]),
        };
        newer.iter().rev().chain(older.iter().rev())
    }

    /// Up to `n` elements, newest first
    pub fn most_recent(&self, n: usize) -> impl Iterator<Item = &T> + '_ {
        self.all().take(n)
    }

    pub fn len(&self) -> usize {
        self.slot.ring.as_ref().map_or(0, |r| r.occupied_len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
