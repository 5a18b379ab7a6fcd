//! EventBridge - forwards notification channels into the dispatcher

use std::sync::Arc;

use serde_json::{json, Value};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use contracts::EventBridgeConfig;
use observability::record_event_forwarded;
use transport::Broker;

use crate::dispatcher::Logger;
use crate::error::DispatcherError;

/// Running event bridge. A disabled configuration yields an inert bridge.
pub struct EventBridge {
    stop_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl EventBridge {
    /// Subscribe to `{prefix}:{event}` for every configured event
    #[instrument(name = "event_bridge_start", skip_all, fields(enabled = config.enabled))]
    pub fn start(
        broker: &Arc<Broker>,
        config: &EventBridgeConfig,
        logger: Logger,
    ) -> Result<Self, DispatcherError> {
        let (stop_tx, _) = watch::channel(false);
        if !config.enabled {
            return Ok(Self {
                stop_tx,
                tasks: Vec::new(),
            });
        }

        if config.prefix.is_empty() {
            return Err(DispatcherError::invalid_parameter("events.prefix", "empty prefix"));
        }
        if logger.levels().rank(&config.level).is_none() {
            return Err(DispatcherError::invalid_parameter(
                "events.level",
                format!("level '{}' is not part of the hierarchy", config.level),
            ));
        }

        let tasks = config
            .channels
            .iter()
            .map(|event| {
                let channel = format!("{}:{}", config.prefix, event);
                let rx = broker.subscribe_channel(&channel);
                debug!(channel = %channel, "Listening for events");
                tokio::spawn(forward(
                    event.clone(),
                    config.level.clone(),
                    rx,
                    stop_tx.subscribe(),
                    logger.clone(),
                ))
            })
            .collect::<Vec<_>>();

        info!(channels = tasks.len(), prefix = %config.prefix, "Event bridge started");
        Ok(Self { stop_tx, tasks })
    }

    pub fn is_active(&self) -> bool {
        !self.tasks.is_empty()
    }

    /// Stop listening and wait for the forwarding tasks to finish
    pub async fn stop(self) {
        // No receivers left when every task already ended
        let _ = self.stop_tx.send(true);
        for task in self.tasks {
            if let Err(e) = task.await {
                error!(error = ?e, "Event forwarding task panicked");
            }
        }
        debug!("Event bridge stopped");
    }
}

async fn forward(
    event: String,
    level: String,
    mut rx: broadcast::Receiver<Value>,
    mut stop_rx: watch::Receiver<bool>,
    logger: Logger,
) {
    let title = format!("Event '{event}'");

    loop {
        let event_data = tokio::select! {
            biased;
            _ = stop_rx.changed() => break,
            received = rx.recv() => match received {
                Ok(value) => value,
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(event = %event, missed, "Event bridge lagged, notifications lost");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        };

        record_event_forwarded(&event);
        logger
            .log(
                &level,
                &title,
                Some(json!({ "event": event, "eventData": event_data })),
            )
            .await;
    }
}
