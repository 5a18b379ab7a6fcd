//! CacheTarget - keeps the most recent records in a shared ring cache

use std::sync::Arc;

use tracing::debug;
use validator::Validate;

use contracts::{CacheConfig, ContractError, LogRecord, Target};
use log_cache::{CacheRegistry, RingCache};

/// Target appending records to a named `RingCache`.
///
/// Targets configured with the same cache name share the buffer.
pub struct CacheTarget {
    name: String,
    cache_name: String,
    cache: RingCache<LogRecord>,
    registry: Arc<CacheRegistry<LogRecord>>,
}

impl CacheTarget {
    pub fn build(
        name: impl Into<String>,
        config: &CacheConfig,
        registry: Arc<CacheRegistry<LogRecord>>,
    ) -> Result<Self, ContractError> {
        let name = name.into();
        config.validate()?;
        let cache = registry
            .get_or_create(&config.name, config.size)
            .map_err(|e| ContractError::target_build(&name, e.to_string()))?;

        Ok(Self {
            name,
            cache_name: config.name.clone(),
            cache,
            registry,
        })
    }

    /// The cache this target writes to
    pub fn cache(&self) -> &RingCache<LogRecord> {
        &self.cache
    }
}

impl Target for CacheTarget {
    fn name(&self) -> &str {
        &self.name
    }

    async fn log(&mut self, record: &LogRecord) -> Result<(), ContractError> {
        self.cache.add(record.clone());
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), ContractError> {
        self.registry.destroy(&self.cache_name);
        debug!(target_name = %self.name, cache = %self.cache_name, "Cache destroyed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(name: &str, size: usize) -> CacheConfig {
        CacheConfig {
            name: name.to_string(),
            size,
        }
    }

    #[tokio::test]
    async fn test_cache_target_keeps_newest() {
        let registry = Arc::new(CacheRegistry::new());
        let mut target = CacheTarget::build("cache", &config("recent", 2), Arc::clone(&registry)).unwrap();

        for title in ["a", "b", "c"] {
            target
                .log(&LogRecord::new("info", "c", "i", title))
                .await
                .unwrap();
        }

        let cache = registry.get("recent").unwrap();
        let titles: Vec<_> = cache.collect_all().into_iter().map(|r| r.title).collect();
        assert_eq!(titles, vec!["c", "b"]);
        assert_eq!(target.cache().len(), 2);
    }

    #[tokio::test]
    async fn test_cache_targets_share_by_name() {
        let registry = Arc::new(CacheRegistry::new());
        let mut first = CacheTarget::build("first", &config("shared", 5), Arc::clone(&registry)).unwrap();
        let mut second = CacheTarget::build("second", &config("shared", 9), Arc::clone(&registry)).unwrap();

        first.log(&LogRecord::new("info", "c", "i", "one")).await.unwrap();
        second.log(&LogRecord::new("info", "c", "i", "two")).await.unwrap();

        assert_eq!(first.cache().len(), 2);
        assert_eq!(second.cache().capacity(), 5);
    }

    #[tokio::test]
    async fn test_cache_target_stop_destroys_entry() {
        let registry = Arc::new(CacheRegistry::new());
        let mut target = CacheTarget::build("cache", &config("recent", 2), Arc::clone(&registry)).unwrap();
        let cache = target.cache().clone();

        target.stop().await.unwrap();
        assert!(registry.get("recent").is_none());

        // Writes after destroy are dropped
        cache.add(LogRecord::new("info", "c", "i", "late"));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_cache_target_rejects_zero_size() {
        let registry = Arc::new(CacheRegistry::new());
        assert!(CacheTarget::build("cache", &config("recent", 0), registry).is_err());
    }
}
