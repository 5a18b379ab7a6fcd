//! # Log Cache
//!
//! Bounded, named, in-memory caches of the most recent records.
//!
//! - `RingCache` keeps the newest `capacity` elements, evicting the oldest
//! - `CacheRegistry` shares caches by name between independently configured
//!   cache targets and the read-out surface

mod registry;
mod ring;

pub use registry::CacheRegistry;
pub use ring::{CacheView, RingCache};

use thiserror::Error;

/// Cache errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CacheError {
    /// Capacity must be a positive integer
    #[error("invalid capacity for cache '{name}': {capacity}")]
    InvalidCapacity { name: String, capacity: usize },
}
