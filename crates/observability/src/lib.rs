//! # Observability
//!
//! 日志与指标的进程级初始化。
//!
//! - `init_tracing`: tracing 订阅者 (JSON/Pretty/Compact)，`RUST_LOG` 优先于默认级别
//! - `serve_metrics`: Prometheus 导出端点 (可选)
//! - `metrics`: `log_hub_*` 计数器与直方图，未安装导出器时为空操作
//!
//! ```ignore
//! observability::init_tracing(&TracingConfig {
//!     log_format: LogFormat::Pretty,
//!     ..Default::default()
//! })?;
//! observability::serve_metrics(9000)?;
//! ```

pub mod metrics;

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry,
};

pub use crate::metrics::{
    record_event_forwarded, record_fan_out_duration, record_internal_report,
    record_record_received, record_record_rejected, record_target_delivery,
    record_target_suspended,
};

/// 日志输出配置
#[derive(Debug, Clone)]
pub struct TracingConfig {
    pub log_format: LogFormat,
    /// 未设置 `RUST_LOG` 时使用的过滤器
    pub default_log_level: String,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            log_format: LogFormat::Json,
            default_log_level: "info".to_string(),
        }
    }
}

/// 日志格式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// JSON 结构化日志
    #[default]
    Json,
    /// 人类可读格式
    Pretty,
    /// 紧凑单行格式
    Compact,
}

fn format_layer(format: LogFormat) -> Box<dyn Layer<Registry> + Send + Sync> {
    match format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        LogFormat::Pretty => fmt::layer().pretty().boxed(),
        LogFormat::Compact => fmt::layer().compact().boxed(),
    }
}

/// Install the global tracing subscriber. Fails if one is already set.
pub fn init_tracing(config: &TracingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.default_log_level))
        .with_context(|| format!("Invalid log filter '{}'", config.default_log_level))?;

    tracing_subscriber::registry()
        .with(format_layer(config.log_format))
        .with(filter)
        .try_init()
        .context("Failed to initialize tracing subscriber")?;

    tracing::debug!(log_format = ?config.log_format, "Tracing initialized");
    Ok(())
}

/// Install the Prometheus recorder and serve it on `0.0.0.0:{port}`.
///
/// Must run inside a tokio runtime.
pub fn serve_metrics(port: u16) -> Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .with_context(|| format!("Failed to serve Prometheus metrics on port {port}"))?;

    tracing::info!(port, "Prometheus metrics endpoint listening");
    Ok(())
}
