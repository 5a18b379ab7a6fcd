//! Broker - named queues and channels

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, warn};

use crate::TransportError;

/// Buffered notifications per channel before slow subscribers lag
const CHANNEL_CAPACITY: usize = 256;

type Verdict = Result<(), String>;

struct QueueEntry {
    id: u64,
    tx: mpsc::Sender<Request>,
}

/// In-process broker
#[derive(Default)]
pub struct Broker {
    queues: Mutex<HashMap<String, QueueEntry>>,
    channels: Mutex<HashMap<String, broadcast::Sender<Value>>>,
    next_id: AtomicU64,
}

impl Broker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn queues(&self) -> MutexGuard<'_, HashMap<String, QueueEntry>> {
        self.queues.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn channels(&self) -> MutexGuard<'_, HashMap<String, broadcast::Sender<Value>>> {
        self.channels.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Become the consumer of `queue`
    ///
    /// # Errors
    /// `AlreadySubscribed` if another live subscriber holds the queue
    pub fn subscribe_queue(
        self: &Arc<Self>,
        queue: &str,
        capacity: usize,
    ) -> Result<QueueSubscriber, TransportError> {
        let mut queues = self.queues();
        if let Some(existing) = queues.get(queue) {
            if !existing.tx.is_closed() {
                return Err(TransportError::AlreadySubscribed {
                    queue: queue.to_string(),
                });
            }
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(capacity.max(1));
        queues.insert(queue.to_string(), QueueEntry { id, tx });
        debug!(queue, "Queue subscribed");

        Ok(QueueSubscriber {
            queue: queue.to_string(),
            id,
            rx,
            broker: Arc::clone(self),
        })
    }

    /// Publisher bound to `queue`
    pub fn publisher(self: &Arc<Self>, queue: &str) -> Publisher {
        Publisher {
            queue: queue.to_string(),
            broker: Arc::clone(self),
        }
    }

    /// Send `payload` to the consumer of `queue` and wait for its verdict
    pub async fn request(&self, queue: &str, payload: Value) -> Result<(), TransportError> {
        let tx = self
            .queues()
            .get(queue)
            .map(|entry| entry.tx.clone())
            .ok_or_else(|| TransportError::NoRecipients {
                queue: queue.to_string(),
            })?;

        let (reply_tx, reply_rx) = oneshot::channel();
        tx.send(Request {
            payload,
            reply: reply_tx,
        })
        .await
        .map_err(|_| TransportError::NoRecipients {
            queue: queue.to_string(),
        })?;

        match reply_rx.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(reason)) => Err(TransportError::Rejected {
                queue: queue.to_string(),
                reason,
            }),
            Err(_) => Err(TransportError::NoReply {
                queue: queue.to_string(),
            }),
        }
    }

    /// Subscribe to notifications published on `channel`
    pub fn subscribe_channel(&self, channel: &str) -> broadcast::Receiver<Value> {
        self.channels()
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Publish a notification, returns the number of subscribers reached
    pub fn notify(&self, channel: &str, value: Value) -> usize {
        match self.channels().get(channel) {
            Some(tx) => tx.send(value).unwrap_or(0),
            None => 0,
        }
    }

    fn unregister(&self, queue: &str, id: u64) {
        let mut queues = self.queues();
        if queues.get(queue).is_some_and(|entry| entry.id == id) {
            queues.remove(queue);
            debug!(queue, "Queue unsubscribed");
        }
    }
}

/// Producer side of a queue
#[derive(Clone)]
pub struct Publisher {
    queue: String,
    broker: Arc<Broker>,
}

impl Publisher {
    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Publish one payload and wait until the consumer handled it
    pub async fn publish(&self, payload: Value) -> Result<(), TransportError> {
        self.broker.request(&self.queue, payload).await
    }
}

/// One inbound message awaiting a verdict
#[derive(Debug)]
pub struct Request {
    payload: Value,
    reply: oneshot::Sender<Verdict>,
}

impl Request {
    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn into_parts(self) -> (Value, Responder) {
        (self.payload, Responder { reply: self.reply })
    }

    pub fn reject(self, reason: impl Into<String>) {
        self.into_parts().1.reject(reason);
    }
}

/// Answers one request
#[derive(Debug)]
pub struct Responder {
    reply: oneshot::Sender<Verdict>,
}

impl Responder {
    pub fn ack(self) {
        // Producer may have given up waiting
        let _ = self.reply.send(Ok(()));
    }

    pub fn reject(self, reason: impl Into<String>) {
        let _ = self.reply.send(Err(reason.into()));
    }
}

/// Consumer side of a queue
pub struct QueueSubscriber {
    queue: String,
    id: u64,
    rx: mpsc::Receiver<Request>,
    broker: Arc<Broker>,
}

impl QueueSubscriber {
    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Next request, `None` once closed
    pub async fn recv(&mut self) -> Option<Request> {
        self.rx.recv().await
    }

    /// Stop accepting requests and reject anything still buffered
    pub fn close(mut self) {
        self.broker.unregister(&self.queue, self.id);
        self.rx.close();
        let mut rejected = 0usize;
        while let Ok(request) = self.rx.try_recv() {
            request.reject("queue closed");
            rejected += 1;
        }
        if rejected > 0 {
            warn!(queue = %self.queue, rejected, "Rejected buffered requests on close");
        }
    }
}

impl Drop for QueueSubscriber {
    fn drop(&mut self) {
        self.broker.unregister(&self.queue, self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_publish_without_subscriber() {
        let broker = Broker::new();
        let err = broker.publisher("logs").publish(json!({})).await.unwrap_err();
        assert!(matches!(err, TransportError::NoRecipients { .. }));
    }

    #[tokio::test]
    async fn test_ack_and_reject() {
        let broker = Broker::new();
        let mut sub = broker.subscribe_queue("logs", 8).unwrap();

        let consumer = tokio::spawn(async move {
            while let Some(request) = sub.recv().await {
                let (payload, responder) = request.into_parts();
                if payload["ok"] == json!(true) {
                    responder.ack();
                } else {
                    responder.reject("bad payload");
                }
            }
        });

        let publisher = broker.publisher("logs");
        assert!(publisher.publish(json!({ "ok": true })).await.is_ok());
        let err = publisher.publish(json!({ "ok": false })).await.unwrap_err();
        assert_eq!(
            err,
            TransportError::Rejected {
                queue: "logs".to_string(),
                reason: "bad payload".to_string()
            }
        );

        consumer.abort();
    }

    #[tokio::test]
    async fn test_single_subscriber_per_queue() {
        let broker = Broker::new();
        let first = broker.subscribe_queue("logs", 1).unwrap();
        assert!(matches!(
            broker.subscribe_queue("logs", 1),
            Err(TransportError::AlreadySubscribed { .. })
        ));

        first.close();
        assert!(broker.subscribe_queue("logs", 1).is_ok());
    }

    #[tokio::test]
    async fn test_close_rejects_buffered() {
        let broker = Broker::new();
        let sub = broker.subscribe_queue("logs", 4).unwrap();

        let publisher = broker.publisher("logs");
        let pending = tokio::spawn(async move { publisher.publish(json!({ "n": 1 })).await });
        tokio::task::yield_now().await;
        while sub.rx.is_empty() {
            tokio::task::yield_now().await;
        }

        sub.close();
        let result = pending.await.unwrap();
        assert!(matches!(result, Err(TransportError::Rejected { .. })));
        assert!(matches!(
            broker.publisher("logs").publish(json!({})).await,
            Err(TransportError::NoRecipients { .. })
        ));
    }

    #[tokio::test]
    async fn test_channel_notify() {
        let broker = Broker::new();
        assert_eq!(broker.notify("events:deploy", json!(1)), 0);

        let mut rx = broker.subscribe_channel("events:deploy");
        assert_eq!(broker.notify("events:deploy", json!({ "v": 2 })), 1);
        assert_eq!(rx.recv().await.unwrap(), json!({ "v": 2 }));
    }
}
