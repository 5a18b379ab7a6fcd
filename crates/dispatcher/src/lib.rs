//! # Dispatcher
//!
//! 日志分发模块。
//!
//! 负责：
//! - 消费入站日志队列，校验并解析级别
//! - Fan-out 到多个 targets，按级别阈值过滤
//! - 隔离失败的 target：挂起一段时间，并通过同一 fan-out 汇报失败
//! - 事件桥：把通知频道转发为日志
//! - `LogHub`：按顺序启动与关闭全部组件

pub mod clock;
pub mod dispatcher;
pub mod error;
pub mod event_bridge;
pub mod handle;
pub mod metrics;
pub mod service;
pub mod targets;

pub use clock::{Clock, ManualClock, SystemClock};
pub use contracts::{LogRecord, Target};
pub use dispatcher::{
    start_dispatcher, Dispatcher, DispatcherBuilder, DispatcherConfig, DispatcherHandle, Logger,
};
pub use error::DispatcherError;
pub use event_bridge::EventBridge;
pub use handle::{TargetHandle, TargetState};
pub use metrics::{MetricsSnapshot, TargetMetrics};
pub use service::LogHub;
pub use targets::{
    create_target_handle, escape_markdown, initialize_targets, CacheTarget, ChatTarget,
    ConsoleTarget, DocumentStoreTarget,
};
