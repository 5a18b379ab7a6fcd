//! # Transport
//!
//! In-process message broker used between log producers and the dispatcher.
//!
//! - Named request/response queues: one consumer per queue, every published
//!   payload is answered with an ack or a rejection
//! - Named publish/subscribe channels for fire-and-forget notifications

mod broker;

pub use broker::{Broker, Publisher, QueueSubscriber, Request, Responder};

use thiserror::Error;

/// Transport errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Nobody consumes the queue
    #[error("no recipients on queue '{queue}'")]
    NoRecipients { queue: String },

    /// The queue already has a consumer
    #[error("queue '{queue}' already has a subscriber")]
    AlreadySubscribed { queue: String },

    /// The consumer rejected the payload
    #[error("rejected by '{queue}': {reason}")]
    Rejected { queue: String, reason: String },

    /// The consumer dropped the request without answering
    #[error("no reply from queue '{queue}'")]
    NoReply { queue: String },
}
