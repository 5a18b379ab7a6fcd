//! # Integration Tests
//!
//! 集成测试与端到端测试。
//!
//! 负责：
//! - 合约快照测试
//! - 端到端测试：producer -> transport -> dispatcher -> targets
//! - 事件桥与生命周期测试

#[cfg(test)]
mod contract_tests {
    use contracts::{LevelConfig, LogRecord, Severity};

    #[test]
    fn test_record_wire_shape() {
        let record = LogRecord::new("error", "api", "api-1", "boom")
            .with_data(serde_json::json!({ "code": 7 }));
        let value = serde_json::to_value(&record).unwrap();

        for key in ["time", "level", "component", "instance", "title", "data"] {
            assert!(value.get(key).is_some(), "missing {key}");
        }
    }

    #[test]
    fn test_default_severity_direction() {
        let levels: LevelConfig = serde_json::from_value(serde_json::json!({
            "hierarchy": { "error": 0, "info": 2 },
            "mapping": { "info": "info" },
            "internal": { "on_unknown_level": "error", "on_target_failed_to_handle": "error" }
        }))
        .unwrap();
        assert_eq!(levels.severity, Severity::LowerIsMoreSevere);
        assert!(levels.admits(0, 2));
        assert!(!levels.admits(2, 0));
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use config_loader::{ConfigFormat, ConfigLoader};
    use contracts::{
        CacheConfig, ContractError, DocumentStoreConfig, LevelConfig, LogRecord, ServiceConfig,
        Target,
    };
    use dispatcher::{
        CacheTarget, DispatcherBuilder, DispatcherConfig, DocumentStoreTarget, LogHub, ManualClock,
        TargetHandle,
    };
    use log_cache::CacheRegistry;
    use serde_json::json;
    use transport::{Broker, TransportError};

    const LEVELS: &str = r#"
[levels.hierarchy]
error = 0
warning = 1
info = 2
debug = 3

[levels.mapping]
error = "error"
warn = "warning"
warning = "warning"
info = "info"
debug = "debug"

[levels.internal]
on_unknown_level = "warning"
on_target_failed_to_handle = "error"
"#;

    fn service_config(store_dir: &std::path::Path) -> ServiceConfig {
        let content = format!(
            r#"
queue = "logs"
target_error_timeout_ms = 1000
{LEVELS}
[[targets]]
type = "cache"
name = "recent"
level = "info"
size = 3

[[targets]]
type = "document_store"
level = "warning"
connection = "{}"
database = "hub"
collection = "logs"

[[targets]]
type = "console"
enabled = false
level = "debug"

[events]
enabled = true
channels = ["deploy"]
"#,
            store_dir.display()
        );
        ConfigLoader::load_from_str(&content, ConfigFormat::Toml).unwrap()
    }

    fn request(level: &str, title: &str) -> serde_json::Value {
        json!({
            "level": level,
            "component": "billing",
            "instance": "billing-2",
            "title": title,
            "data": { "order": 42 },
        })
    }

    fn titles(records: &[LogRecord]) -> Vec<&str> {
        records.iter().map(|r| r.title.as_str()).collect()
    }

    /// End-to-end test: config -> LogHub -> publisher -> cache + document store
    ///
    /// 验证完整的数据流：
    /// 1. 配置加载并启动全部组件
    /// 2. 生产者通过队列发布日志
    /// 3. 日志按阈值分发到 cache 与 document store
    #[tokio::test]
    async fn test_e2e_records_reach_targets() {
        let dir = tempfile::tempdir().unwrap();
        let config = service_config(dir.path());
        let broker = Broker::new();
        let hub = LogHub::start(&config, &broker).await.unwrap();

        // Disabled console target is not built
        let names: Vec<_> = hub.metrics().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["recent", "document_store"]);

        let publisher = broker.publisher("logs");
        publisher.publish(request("info", "invoice sent")).await.unwrap();
        publisher.publish(request("warn", "retrying payment")).await.unwrap();
        publisher.publish(request("debug", "cache miss")).await.unwrap();

        let cache = hub.caches().get("recent").unwrap();
        let recent = cache.collect_all();
        assert_eq!(
            titles(&recent),
            vec!["retrying payment", "invoice sent", "Startup complete"]
        );
        assert_eq!(recent[0].level, "warning");
        assert_eq!(recent[0].component, "billing");
        assert_eq!(recent[0].data, Some(json!({ "order": 42 })));

        let metrics = hub.metrics();
        assert_eq!(metrics[1].1.delivered_count, 1);
        assert_eq!(metrics[1].1.filtered_count, 3);

        assert!(hub.shutdown().await.is_empty());

        // Documents survive the shutdown flush
        let store = DocumentStoreTarget::build(
            "reader",
            &DocumentStoreConfig {
                connection: dir.path().display().to_string(),
                database: "hub".to_string(),
                collection: "logs".to_string(),
            },
        )
        .unwrap();
        assert_eq!(titles(&store.recent(10).unwrap()), vec!["retrying payment"]);
    }

    #[tokio::test]
    async fn test_e2e_rejected_request_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let broker = Broker::new();
        let hub = LogHub::start(&service_config(dir.path()), &broker).await.unwrap();

        let err = broker
            .publisher("logs")
            .publish(request("loud", "unknown level"))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Rejected { .. }));

        let report = hub.caches().get("recent").unwrap().collect_recent(1).remove(0);
        assert_eq!(report.title, "Invalid log request");
        assert_eq!(report.level, "warning");
        assert_eq!(report.component, "log-hub");
        assert_eq!(report.data.unwrap()["log"]["level"], json!("loud"));

        hub.shutdown().await;
    }

    #[tokio::test]
    async fn test_e2e_event_bridge() {
        let dir = tempfile::tempdir().unwrap();
        let broker = Broker::new();
        let hub = LogHub::start(&service_config(dir.path()), &broker).await.unwrap();

        assert_eq!(broker.notify("events:deploy", json!({ "version": "2.0.1" })), 1);
        assert_eq!(broker.notify("events:unknown", json!({})), 0);

        let cache = hub.caches().get("recent").unwrap();
        let mut forwarded = None;
        for _ in 0..100 {
            forwarded = cache
                .collect_all()
                .into_iter()
                .find(|r| r.title == "Event 'deploy'");
            if forwarded.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let record = forwarded.expect("event never forwarded");
        assert_eq!(record.level, "info");
        assert_eq!(
            record.data,
            Some(json!({ "event": "deploy", "eventData": { "version": "2.0.1" } }))
        );

        hub.shutdown().await;
    }

    #[tokio::test]
    async fn test_e2e_shutdown_is_recorded_and_caches_destroyed() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = service_config(dir.path());
        // Lifecycle records pass the document store threshold
        config.targets[1].level = "info".to_string();

        let broker = Broker::new();
        let hub = LogHub::start(&config, &broker).await.unwrap();
        let registry = Arc::clone(hub.caches());
        assert_eq!(registry.names(), vec!["recent".to_string()]);

        hub.shutdown().await;
        assert!(registry.names().is_empty());
        assert!(broker.publisher("logs").publish(request("info", "late")).await.is_err());

        let store = DocumentStoreTarget::build(
            "reader",
            &DocumentStoreConfig {
                connection: dir.path().display().to_string(),
                database: "hub".to_string(),
                collection: "logs".to_string(),
            },
        )
        .unwrap();
        assert_eq!(
            titles(&store.recent(10).unwrap()),
            vec!["Shutting down", "Startup complete"]
        );
    }

    /// Target whose availability is switched from the test
    struct FlakyTarget {
        down: Arc<AtomicBool>,
    }

    impl Target for FlakyTarget {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn log(&mut self, _record: &LogRecord) -> Result<(), ContractError> {
            if self.down.load(Ordering::SeqCst) {
                return Err(ContractError::target_write("flaky", "connection refused"));
            }
            Ok(())
        }

        async fn stop(&mut self) -> Result<(), ContractError> {
            Err(ContractError::target_stop("flaky", "already closed"))
        }
    }

    #[tokio::test]
    async fn test_e2e_failing_target_suspended_and_reported() {
        let config = service_config(tempfile::tempdir().unwrap().path());
        let levels: LevelConfig = config.levels.clone();
        let registry = Arc::new(CacheRegistry::new());
        let cache = CacheTarget::build(
            "recent",
            &CacheConfig {
                name: "recent".to_string(),
                size: 10,
            },
            Arc::clone(&registry),
        )
        .unwrap();

        let down = Arc::new(AtomicBool::new(true));
        let flaky = FlakyTarget {
            down: Arc::clone(&down),
        };
        let clock = ManualClock::default();
        let broker = Broker::new();
        let handle = DispatcherBuilder::new(
            DispatcherConfig::new("logs", levels, Duration::from_secs(60)),
            vec![
                TargetHandle::spawn(flaky, 3),
                TargetHandle::spawn(cache, 3),
            ],
        )
        .with_clock(clock.clone())
        .start(&broker)
        .await
        .unwrap();
        let publisher = broker.publisher("logs");
        let recent = registry.get("recent").unwrap();

        publisher.publish(request("error", "first")).await.unwrap();
        let stored = recent.collect_all();
        assert_eq!(titles(&stored), vec!["Targets failed to handle a log", "first"]);
        let errors = &stored[0].data.as_ref().unwrap()["errors"];
        assert_eq!(errors[0]["message"], json!("target 'flaky' write error: connection refused"));

        // Recovered but still suspended: no delivery attempt, no report
        down.store(false, Ordering::SeqCst);
        clock.advance(Duration::from_secs(30));
        publisher.publish(request("error", "second")).await.unwrap();
        assert_eq!(recent.len(), 3);
        assert_eq!(handle.metrics()[0].1.skipped_count, 2);

        clock.advance(Duration::from_secs(31));
        publisher.publish(request("error", "third")).await.unwrap();
        assert_eq!(handle.metrics()[0].1.delivered_count, 1);
        assert_eq!(recent.collect_recent(1)[0].title, "third");

        // A failing stop does not prevent the other targets from stopping
        let failures = handle.shutdown().await;
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, "flaky");
        assert!(registry.names().is_empty());
    }
}
