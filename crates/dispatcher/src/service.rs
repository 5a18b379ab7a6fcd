//! LogHub - startup and shutdown order of the whole service
//!
//! Startup: targets, dispatcher, event bridge, then a "Startup complete"
//! record. Shutdown runs in reverse after a "Shutting down" record.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use contracts::{ContractError, LogRecord, ServiceConfig};
use log_cache::CacheRegistry;
use transport::Broker;

use crate::dispatcher::{DispatcherBuilder, DispatcherConfig, DispatcherHandle, Logger};
use crate::error::DispatcherError;
use crate::event_bridge::EventBridge;
use crate::metrics::MetricsSnapshot;
use crate::targets::initialize_targets;
use crate::Clock;

/// A running log hub
pub struct LogHub {
    dispatcher: DispatcherHandle,
    bridge: EventBridge,
    registry: Arc<CacheRegistry<LogRecord>>,
    lifecycle_level: String,
}

impl LogHub {
    /// Start every component described by `config`
    pub async fn start(config: &ServiceConfig, broker: &Arc<Broker>) -> Result<Self, DispatcherError> {
        Self::start_inner(config, broker, None).await
    }

    /// Start with a custom suspension clock
    pub async fn start_with_clock(
        config: &ServiceConfig,
        broker: &Arc<Broker>,
        clock: impl Clock,
    ) -> Result<Self, DispatcherError> {
        let with_clock = move |builder: DispatcherBuilder| builder.with_clock(clock);
        Self::start_inner(config, broker, Some(Box::new(with_clock))).await
    }

    #[instrument(name = "log_hub_start", skip_all, fields(queue = %config.queue))]
    async fn start_inner(
        config: &ServiceConfig,
        broker: &Arc<Broker>,
        clock: Option<Box<dyn FnOnce(DispatcherBuilder) -> DispatcherBuilder + Send>>,
    ) -> Result<Self, DispatcherError> {
        let registry = Arc::new(CacheRegistry::new());
        let targets = initialize_targets(&config.targets, &config.levels, &registry).await?;

        let mut builder = DispatcherBuilder::new(DispatcherConfig::from_service_config(config), targets);
        if let Some(with_clock) = clock {
            builder = with_clock(builder);
        }
        let dispatcher = builder.start(broker).await?;

        let bridge = match EventBridge::start(broker, &config.events, dispatcher.logger()) {
            Ok(bridge) => bridge,
            Err(e) => {
                dispatcher.shutdown().await;
                return Err(e);
            }
        };

        let lifecycle_level = lifecycle_level(config);
        dispatcher
            .logger()
            .log(&lifecycle_level, "Startup complete", None)
            .await;
        info!(
            targets = dispatcher.metrics().len(),
            events = bridge.is_active(),
            "Log hub started"
        );

        Ok(Self {
            dispatcher,
            bridge,
            registry,
            lifecycle_level,
        })
    }

    pub fn logger(&self) -> Logger {
        self.dispatcher.logger()
    }

    /// Caches created by cache targets, by name
    pub fn caches(&self) -> &Arc<CacheRegistry<LogRecord>> {
        &self.registry
    }

    pub fn metrics(&self) -> Vec<(String, MetricsSnapshot)> {
        self.dispatcher.metrics()
    }

    /// Stop the bridge, the consumer and every target.
    ///
    /// Returns the targets that failed to stop.
    #[instrument(name = "log_hub_shutdown", skip(self))]
    pub async fn shutdown(self) -> Vec<(String, ContractError)> {
        self.dispatcher
            .logger()
            .log(&self.lifecycle_level, "Shutting down", None)
            .await;
        self.bridge.stop().await;
        let failures = self.dispatcher.shutdown().await;
        if !failures.is_empty() {
            warn!(failed = failures.len(), "Some targets failed to stop");
        }
        failures
    }
}

/// Lifecycle records use the level `info` maps to, or the least severe level
fn lifecycle_level(config: &ServiceConfig) -> String {
    let levels = &config.levels;
    if let Some(level) = levels.resolve("info") {
        return level.to_string();
    }
    levels
        .hierarchy
        .iter()
        .filter_map(|(name, &rank)| {
            levels
                .hierarchy
                .values()
                .all(|&other| levels.admits(other, rank))
                .then_some(name)
        })
        .next()
        .cloned()
        .unwrap_or_else(|| levels.internal.on_unknown_level.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{InternalLevels, LevelConfig, Severity};

    fn config(severity: Severity, mapping: &[(&str, &str)]) -> ServiceConfig {
        ServiceConfig {
            queue: "logs".to_string(),
            target_error_timeout_ms: 1000,
            identity: Default::default(),
            levels: LevelConfig {
                hierarchy: [("ERROR".to_string(), 0), ("DEBUG".to_string(), 3)].into(),
                mapping: mapping
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
                internal: InternalLevels {
                    on_unknown_level: "ERROR".to_string(),
                    on_target_failed_to_handle: "ERROR".to_string(),
                },
                severity,
            },
            targets: Vec::new(),
            events: Default::default(),
        }
    }

    #[test]
    fn test_lifecycle_level_prefers_info_mapping() {
        let cfg = config(Severity::LowerIsMoreSevere, &[("info", "DEBUG")]);
        assert_eq!(lifecycle_level(&cfg), "DEBUG");
    }

    #[test]
    fn test_lifecycle_level_falls_back_to_least_severe() {
        let cfg = config(Severity::LowerIsMoreSevere, &[("error", "ERROR")]);
        assert_eq!(lifecycle_level(&cfg), "DEBUG");

        let cfg = config(Severity::HigherIsMoreSevere, &[("error", "ERROR")]);
        assert_eq!(lifecycle_level(&cfg), "ERROR");
    }

    #[tokio::test]
    async fn test_start_and_shutdown_without_targets() {
        let broker = Broker::new();
        let hub = LogHub::start(&config(Severity::LowerIsMoreSevere, &[("info", "DEBUG")]), &broker)
            .await
            .unwrap();
        assert!(hub.metrics().is_empty());
        assert!(hub.shutdown().await.is_empty());
    }
}
