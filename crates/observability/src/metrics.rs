//! Log Hub 指标收集模块
//!
//! Dispatcher 在每次接收、分发、挂起目标时调用这些函数。
//! 未安装 recorder 时调用为空操作。

use std::time::Duration;

use metrics::{counter, histogram};

/// 记录入站日志请求
pub fn record_record_received() {
    counter!("log_hub_records_received_total").increment(1);
}

/// 记录被拒绝的入站请求
pub fn record_record_rejected() {
    counter!("log_hub_records_rejected_total").increment(1);
}

/// 记录单个目标的投递结果
pub fn record_target_delivery(target_name: &str, success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!(
        "log_hub_target_deliveries_total",
        "target" => target_name.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// 记录目标被挂起
pub fn record_target_suspended(target_name: &str) {
    counter!(
        "log_hub_target_suspensions_total",
        "target" => target_name.to_string()
    )
    .increment(1);
}

/// 记录内部失败报告
pub fn record_internal_report() {
    counter!("log_hub_internal_reports_total").increment(1);
}

/// 记录一次完整 fan-out 的耗时 (含失败报告)
pub fn record_fan_out_duration(elapsed: Duration) {
    histogram!("log_hub_fan_out_duration_ms").record(elapsed.as_secs_f64() * 1000.0);
}

/// 记录事件桥转发的事件
pub fn record_event_forwarded(event: &str) {
    counter!(
        "log_hub_events_forwarded_total",
        "event" => event.to_string()
    )
    .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_recorder_is_noop() {
        record_record_received();
        record_record_rejected();
        record_target_delivery("console", true);
        record_target_delivery("chat", false);
        record_target_suspended("chat");
        record_internal_report();
        record_fan_out_duration(Duration::from_micros(250));
        record_event_forwarded("deploy");
    }
}
