//! Request/response over a command channel.
//!
//! A request is an ordinary command whose payload carries the query and a
//! one-slot reply channel. It is matched to one responder like any other
//! command, and redelivered if the responder fails.

use std::sync::Arc;
use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};

use crate::error::BrokerError;
use crate::topic::TopicName;

/// Command payload for a query of type `Q` expecting an `R`.
pub struct QueryRequest<Q, R> {
    query: Arc<Q>,
    reply: Sender<R>,
}

impl<Q, R> QueryRequest<Q, R> {
    pub(crate) fn new(query: Q, topic: TopicName) -> (Self, PendingReply<R>) {
        let (reply, rx) = channel::bounded(1);
        let request = Self {
            query: Arc::new(query),
            reply,
        };
        (request, PendingReply { topic, rx })
    }

    pub fn query(&self) -> &Q {
        &self.query
    }

    pub(crate) fn query_arc(&self) -> Arc<Q> {
        Arc::clone(&self.query)
    }

    /// Send the reply. The first reply wins; later ones are dropped.
    pub(crate) fn reply(&self, reply: R) -> bool {
        self.reply.try_send(reply).is_ok()
    }
}

/// The caller's side of a request.
pub struct PendingReply<R> {
    topic: TopicName,
    rx: Receiver<R>,
}

impl<R> PendingReply<R> {
    pub fn topic(&self) -> &TopicName {
        &self.topic
    }

    /// Take the reply if it has arrived.
    pub fn try_take(&self) -> Option<R> {
        self.rx.try_recv().ok()
    }

    /// Block up to `timeout` for the reply.
    ///
    /// With a manual scheduler, drain it before waiting; nothing else will
    /// run the responder.
    pub fn wait(&self, timeout: Duration) -> Result<R, BrokerError> {
        self.rx.recv_timeout(timeout).map_err(|err| match err {
            RecvTimeoutError::Timeout => BrokerError::ReplyTimeout {
                topic: self.topic.clone(),
            },
            RecvTimeoutError::Disconnected => BrokerError::ReplyDropped {
                topic: self.topic.clone(),
            },
        })
    }
}
