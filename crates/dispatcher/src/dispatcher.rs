//! Dispatcher - consumer loop and fan-out to targets

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use contracts::{
    is_valid_queue_name, ContractError, LevelConfig, LogRecord, SerializedError, ServiceConfig,
    ServiceIdentity,
};
use observability::{
    record_fan_out_duration, record_internal_report, record_record_received, record_record_rejected,
    record_target_delivery, record_target_suspended,
};
use transport::{Broker, QueueSubscriber};

use crate::clock::{Clock, SystemClock};
use crate::error::DispatcherError;
use crate::handle::TargetHandle;
use crate::metrics::{MetricsSnapshot, TargetMetrics};

/// Depth 0 is the original record, depth 1 the failure report. Failures of
/// the report itself are only traced.
const MAX_REPORT_DEPTH: usize = 1;

const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// Dispatcher configuration
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Inbound queue name
    pub queue: String,
    /// Level hierarchy and mapping
    pub levels: LevelConfig,
    /// Suspension length of a failing target
    pub target_error_timeout: Duration,
    /// Component / instance of the dispatcher's own records
    pub identity: ServiceIdentity,
    /// Inbound requests buffered before producers wait
    pub queue_capacity: usize,
}

impl DispatcherConfig {
    pub fn new(queue: impl Into<String>, levels: LevelConfig, target_error_timeout: Duration) -> Self {
        Self {
            queue: queue.into(),
            levels,
            target_error_timeout,
            identity: ServiceIdentity::default(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }

    pub fn from_service_config(config: &ServiceConfig) -> Self {
        Self::new(
            config.queue.clone(),
            config.levels.clone(),
            config.target_error_timeout(),
        )
        .with_identity(config.identity.clone())
    }

    pub fn with_identity(mut self, identity: ServiceIdentity) -> Self {
        self.identity = identity;
        self
    }

    fn validate(&self) -> Result<(), DispatcherError> {
        if !is_valid_queue_name(&self.queue) {
            return Err(DispatcherError::invalid_parameter(
                "queue",
                format!("'{}' is not a queue identifier", self.queue),
            ));
        }
        if self.levels.hierarchy.is_empty() {
            return Err(DispatcherError::invalid_parameter("levels", "empty hierarchy"));
        }
        if self.levels.mapping.is_empty() {
            return Err(DispatcherError::invalid_parameter("levels", "empty mapping"));
        }
        let dangling = self.levels.dangling_levels();
        if !dangling.is_empty() {
            return Err(DispatcherError::invalid_parameter(
                "levels",
                format!("levels missing from hierarchy: {}", dangling.join(", ")),
            ));
        }
        Ok(())
    }
}

/// Builder for starting a Dispatcher
pub struct DispatcherBuilder {
    config: DispatcherConfig,
    targets: Vec<TargetHandle>,
    clock: Arc<dyn Clock>,
}

impl DispatcherBuilder {
    /// Targets are delivered to in the given order
    pub fn new(config: DispatcherConfig, targets: Vec<TargetHandle>) -> Self {
        Self {
            config,
            targets,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the clock used for suspension deadlines
    pub fn with_clock(mut self, clock: impl Clock) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Validate, subscribe to the inbound queue and start consuming.
    ///
    /// On error every target passed in has been stopped.
    #[instrument(
        name = "dispatcher_builder_start",
        skip(self, broker),
        fields(queue = %self.config.queue, target_count = self.targets.len())
    )]
    pub async fn start(self, broker: &Arc<Broker>) -> Result<DispatcherHandle, DispatcherError> {
        let subscribed = self.config.validate().and_then(|()| {
            broker
                .subscribe_queue(&self.config.queue, self.config.queue_capacity)
                .map_err(DispatcherError::from)
        });
        let subscriber = match subscribed {
            Ok(subscriber) => subscriber,
            Err(e) => {
                error!(error = %e, "Dispatcher startup failed, stopping targets");
                shutdown_targets(self.targets).await;
                return Err(e);
            }
        };

        let dispatcher = Arc::new(Dispatcher::new(self.config, self.targets, self.clock));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let consumer = tokio::spawn(run(Arc::clone(&dispatcher), subscriber, shutdown_rx));

        Ok(DispatcherHandle {
            logger: Logger { dispatcher },
            shutdown_tx,
            consumer: Some(consumer),
        })
    }
}

/// Convenience function to start a dispatcher with the default identity
#[instrument(name = "dispatcher_start", skip(broker, targets, levels))]
pub async fn start_dispatcher(
    broker: &Arc<Broker>,
    queue: &str,
    targets: Vec<TargetHandle>,
    levels: LevelConfig,
    target_error_timeout: Duration,
) -> Result<DispatcherHandle, DispatcherError> {
    let config = DispatcherConfig::new(queue, levels, target_error_timeout);
    DispatcherBuilder::new(config, targets).start(broker).await
}

/// The fan-out engine shared by the consumer loop and every `Logger`
pub struct Dispatcher {
    /// Locked for a whole fan-out, so records are dispatched one at a time
    targets: Mutex<Vec<TargetHandle>>,
    target_metrics: Vec<(String, Arc<TargetMetrics>)>,
    levels: LevelConfig,
    target_error_timeout: Duration,
    identity: ServiceIdentity,
    clock: Arc<dyn Clock>,
}

impl Dispatcher {
    fn new(config: DispatcherConfig, targets: Vec<TargetHandle>, clock: Arc<dyn Clock>) -> Self {
        let target_metrics = targets
            .iter()
            .map(|t| (t.name().to_string(), Arc::clone(t.metrics())))
            .collect();
        Self {
            targets: Mutex::new(targets),
            target_metrics,
            levels: config.levels,
            target_error_timeout: config.target_error_timeout,
            identity: config.identity,
            clock,
        }
    }

    /// Validate one inbound payload and dispatch it.
    ///
    /// A rejected payload is reported through the targets and the error is
    /// returned so the transport can fail the producer's request.
    async fn handle(&self, payload: Value) -> Result<(), DispatcherError> {
        record_record_received();
        match self.parse_request(&payload) {
            Ok(record) => {
                self.send_log(record).await;
                Ok(())
            }
            Err(reason) => {
                warn!(reason, "Rejecting invalid log request");
                record_record_rejected();
                let error = SerializedError {
                    name: "InvalidLogRequest".to_string(),
                    message: reason.to_string(),
                    trace: Vec::new(),
                };
                let report = self
                    .own_record(&self.levels.internal.on_unknown_level, "Invalid log request")
                    .with_data(json!({ "error": error, "log": payload }));
                self.send_log(report).await;
                Err(DispatcherError::Rejected {
                    reason: reason.to_string(),
                })
            }
        }
    }

    fn parse_request(&self, payload: &Value) -> Result<LogRecord, &'static str> {
        let field = |name: &str| payload.get(name).and_then(Value::as_str);

        let level = field("level")
            .and_then(|token| self.levels.resolve(token))
            .ok_or("Invalid log level")?;
        let component = field("component").ok_or("Invalid log component")?;
        let instance = field("instance").ok_or("Invalid log instance")?;
        let title = field("title").ok_or("Invalid log title")?;

        Ok(LogRecord {
            time: producer_time(payload.get("time")),
            level: level.to_string(),
            component: component.to_string(),
            instance: instance.to_string(),
            title: title.to_string(),
            data: payload.get("data").filter(|d| !d.is_null()).cloned(),
        })
    }

    /// Deliver a record to every active target whose threshold it passes.
    ///
    /// Never fails: target failures suspend the target and are reported in one
    /// aggregated record per call. A record whose level is not part of the
    /// hierarchy is dropped.
    pub async fn send_log(&self, record: LogRecord) {
        let started = Instant::now();
        self.dispatch(record).await;
        record_fan_out_duration(started.elapsed());
    }

    async fn dispatch(&self, record: LogRecord) {
        let mut targets = self.targets.lock().await;
        let mut current = Arc::new(record);

        for depth in 0..=MAX_REPORT_DEPTH {
            let Some(rank) = self.levels.rank(&current.level) else {
                error!(
                    level = %current.level,
                    title = %current.title,
                    depth,
                    "Dropping record with unknown level"
                );
                return;
            };

            let errors = self.fan_out(&mut targets, &current, rank).await;
            if errors.is_empty() {
                return;
            }
            if depth == MAX_REPORT_DEPTH {
                warn!(
                    failures = errors.len(),
                    "Targets failed to handle a failure report, dropping it"
                );
                return;
            }

            record_internal_report();
            current = Arc::new(self.failure_report(&current, errors));
        }
    }

    async fn fan_out(
        &self,
        targets: &mut [TargetHandle],
        record: &Arc<LogRecord>,
        rank: i64,
    ) -> Vec<SerializedError> {
        let mut errors = Vec::new();

        for target in targets.iter_mut() {
            if !self.levels.admits(rank, target.threshold()) {
                target.metrics().inc_filtered_count();
                continue;
            }
            if target.is_suspended(self.clock.now()) {
                target.metrics().inc_skipped_count();
                continue;
            }

            match target.deliver(Arc::clone(record)).await {
                Ok(()) => {
                    target.metrics().inc_delivered_count();
                    record_target_delivery(target.name(), true);
                }
                Err(e) => {
                    target.metrics().inc_failure_count();
                    record_target_delivery(target.name(), false);
                    if target.suspend(self.clock.now(), self.target_error_timeout) {
                        record_target_suspended(target.name());
                    }
                    warn!(
                        target_name = %target.name(),
                        error = %e,
                        suspended_ms = self.target_error_timeout.as_millis() as u64,
                        "Target failed to handle a log, suspending"
                    );
                    errors.push(SerializedError::from(&e));
                }
            }
        }

        errors
    }

    fn failure_report(&self, record: &LogRecord, errors: Vec<SerializedError>) -> LogRecord {
        self.own_record(
            &self.levels.internal.on_target_failed_to_handle,
            "Targets failed to handle a log",
        )
        .with_data(json!({ "errors": errors, "log": record }))
    }

    fn own_record(&self, level: &str, title: &str) -> LogRecord {
        LogRecord::new(level, &self.identity.component, &self.identity.instance, title)
    }

    async fn stop_targets(&self) -> Vec<(String, ContractError)> {
        let targets = std::mem::take(&mut *self.targets.lock().await);
        shutdown_targets(targets).await
    }
}

/// Stop every target, collecting failures instead of propagating them
pub(crate) async fn shutdown_targets(targets: Vec<TargetHandle>) -> Vec<(String, ContractError)> {
    let mut failures = Vec::new();
    for handle in targets {
        let name = handle.name().to_string();
        if let Err(e) = handle.shutdown().await {
            error!(target_name = %name, error = %e, "Target failed to stop");
            failures.push((name, e));
        }
    }
    failures
}

/// Consumer loop: one inbound request at a time
#[instrument(name = "dispatcher_run", skip_all, fields(queue = %subscriber.queue()))]
async fn run(
    dispatcher: Arc<Dispatcher>,
    mut subscriber: QueueSubscriber,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    info!(targets = dispatcher.target_metrics.len(), "Dispatcher started");

    let mut record_count: u64 = 0;

    loop {
        let request = tokio::select! {
            biased;
            _ = shutdown_rx.changed() => break,
            request = subscriber.recv() => match request {
                Some(request) => request,
                None => break,
            },
        };

        record_count += 1;
        let (payload, responder) = request.into_parts();
        match dispatcher.handle(payload).await {
            Ok(()) => responder.ack(),
            Err(e) => responder.reject(e.to_string()),
        }

        if record_count.is_multiple_of(1000) {
            debug!(records = record_count, "Dispatcher progress");
        }
    }

    subscriber.close();
    info!(records = record_count, "Dispatcher stopped consuming");
}

/// Producer supplied `time`: RFC3339 string or epoch milliseconds.
/// Anything else is replaced by the receipt time.
fn producer_time(raw: Option<&Value>) -> DateTime<Utc> {
    let parsed = match raw {
        None | Some(Value::Null) => return Utc::now(),
        Some(Value::String(s)) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|t| t.with_timezone(&Utc)),
        Some(Value::Number(n)) => n.as_i64().and_then(DateTime::from_timestamp_millis),
        Some(_) => None,
    };
    parsed.unwrap_or_else(|| {
        debug!(time = ?raw, "Unreadable log time, using receipt time");
        Utc::now()
    })
}

/// Clonable entry point for programmatic records
#[derive(Clone)]
pub struct Logger {
    dispatcher: Arc<Dispatcher>,
}

impl Logger {
    /// Deliver a record through the fan-out
    pub async fn send_log(&self, record: LogRecord) {
        self.dispatcher.send_log(record).await;
    }

    /// Deliver a record issued by the service itself
    pub async fn log(&self, level: &str, title: &str, data: Option<Value>) {
        let mut record = self.dispatcher.own_record(level, title);
        record.data = data;
        self.send_log(record).await;
    }

    pub fn identity(&self) -> &ServiceIdentity {
        &self.dispatcher.identity
    }

    pub fn levels(&self) -> &LevelConfig {
        &self.dispatcher.levels
    }
}

/// Handle to a running dispatcher
pub struct DispatcherHandle {
    logger: Logger,
    shutdown_tx: watch::Sender<bool>,
    consumer: Option<JoinHandle<()>>,
}

impl DispatcherHandle {
    pub fn logger(&self) -> Logger {
        self.logger.clone()
    }

    pub async fn send_log(&self, record: LogRecord) {
        self.logger.send_log(record).await;
    }

    /// Get metrics for all targets, in delivery order
    pub fn metrics(&self) -> Vec<(String, MetricsSnapshot)> {
        self.logger
            .dispatcher
            .target_metrics
            .iter()
            .map(|(name, metrics)| (name.clone(), metrics.snapshot()))
            .collect()
    }

    /// Stop consuming inbound records. An in-flight fan-out runs to completion.
    pub async fn stop(&mut self) {
        // Consumer may already be gone
        let _ = self.shutdown_tx.send(true);
        if let Some(consumer) = self.consumer.take() {
            if let Err(e) = consumer.await {
                error!(error = ?e, "Dispatcher consumer task panicked");
            }
        }
    }

    /// Stop consuming, then stop every target.
    ///
    /// Teardown failures are logged and returned, never propagated.
    #[instrument(name = "dispatcher_shutdown", skip(self))]
    pub async fn shutdown(mut self) -> Vec<(String, ContractError)> {
        self.stop().await;
        let failures = self.logger.dispatcher.stop_targets().await;
        info!(failed = failures.len(), "Dispatcher shutdown complete");
        failures
    }
}
