use std::error::Error as StdError;

use thiserror::Error;

use crate::message::AckError;
use crate::topic::{TopicError, TopicName};

/// Errors surfaced by the broker and its channels to callers.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("broker has been disposed")]
    Disposed,
    #[error("at least one topic is required")]
    EmptyTopics,
    #[error(transparent)]
    Topic(#[from] TopicError),
    #[error("failed to start scheduler: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("handler already owns an active subscription")]
    AlreadySubscribed,
    #[error("no reply on {topic} within the wait bound")]
    ReplyTimeout { topic: TopicName },
    #[error("request on {topic} was dropped before a reply was sent")]
    ReplyDropped { topic: TopicName },
}

/// Error returned by a message handler.
///
/// On a command channel any handler error (or a return without
/// acknowledgment) leads to redelivery. On an event channel it is logged and
/// dropped.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("expected payload of type {expected}, got {actual}")]
    PayloadType {
        expected: &'static str,
        actual: &'static str,
    },
    #[error("rejected: {0}")]
    Rejected(String),
    #[error(transparent)]
    Ack(#[from] AckError),
    #[error(transparent)]
    Broker(#[from] BrokerError),
    #[error("handler error: {0}")]
    Other(Box<dyn StdError + Send + Sync>),
}

impl HandlerError {
    pub fn rejected(reason: impl Into<String>) -> Self {
        HandlerError::Rejected(reason.into())
    }

    pub fn other<E>(err: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        HandlerError::Other(Box::new(err))
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(err: serde_json::Error) -> Self {
        HandlerError::Other(Box::new(err))
    }
}
