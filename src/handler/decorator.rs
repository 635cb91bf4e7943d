//! Decorators: wrap a handler and forward to it by default.
//!
//! Implement one of the decorator traits, override the single method you
//! care about, and register the result wrapped in [`Decorated`].
//!
//! ```
//! use inproc_broker::{CommandDecorator, CommandHandler, Decorated, HandlerError, Message};
//!
//! struct Audit<H> {
//!     inner: H,
//! }
//!
//! impl<T, H: CommandHandler<T>> CommandDecorator<T> for Audit<H> {
//!     type Inner = H;
//!
//!     fn inner(&self) -> &H {
//!         &self.inner
//!     }
//!
//!     fn handle(&self, message: &Message<T>) -> Result<(), HandlerError> {
//!         // before
//!         let result = self.inner.handle(message);
//!         // after
//!         result
//!     }
//! }
//!
//! let handler = Decorated(Audit {
//!     inner: |m: &Message<u32>| -> Result<(), HandlerError> { Ok(m.ack()?) },
//! });
//! let message = Message::new(7u32);
//! handler.handle(&message).unwrap();
//! ```

use std::time::{Duration, Instant};

use tracing::{debug, warn};

use super::{CommandHandler, EventHandler, QueryHandler};
use crate::error::HandlerError;
use crate::message::Message;

pub trait CommandDecorator<T>: Send + Sync {
    type Inner: CommandHandler<T>;

    fn inner(&self) -> &Self::Inner;

    fn handle(&self, message: &Message<T>) -> Result<(), HandlerError> {
        self.inner().handle(message)
    }
}

pub trait EventDecorator<T>: Send + Sync {
    type Inner: EventHandler<T>;

    fn inner(&self) -> &Self::Inner;

    fn on_event(&self, event: &Message<T>) -> Result<(), HandlerError> {
        self.inner().on_event(event)
    }
}

pub trait QueryDecorator<Q, R>: Send + Sync {
    type Inner: QueryHandler<Q, R>;

    fn inner(&self) -> &Self::Inner;

    fn answer(&self, query: &Message<Q>) -> Result<R, HandlerError> {
        self.inner().answer(query)
    }
}

/// Adapts a decorator into the matching handler trait.
pub struct Decorated<D>(pub D);

impl<D> Decorated<D> {
    pub fn into_inner(self) -> D {
        self.0
    }
}

impl<T, D: CommandDecorator<T>> CommandHandler<T> for Decorated<D> {
    fn handle(&self, message: &Message<T>) -> Result<(), HandlerError> {
        CommandDecorator::handle(&self.0, message)
    }
}

impl<T, D: EventDecorator<T>> EventHandler<T> for Decorated<D> {
    fn on_event(&self, event: &Message<T>) -> Result<(), HandlerError> {
        EventDecorator::on_event(&self.0, event)
    }
}

impl<Q, R, D: QueryDecorator<Q, R>> QueryHandler<Q, R> for Decorated<D> {
    fn answer(&self, query: &Message<Q>) -> Result<R, HandlerError> {
        QueryDecorator::answer(&self.0, query)
    }
}

/// Times each invocation and logs its outcome.
pub struct Logged<H> {
    label: String,
    inner: H,
}

impl<H> Logged<H> {
    pub fn new(label: impl Into<String>, inner: H) -> Self {
        Self {
            label: label.into(),
            inner,
        }
    }

    /// Shorthand for `Decorated(Logged::new(label, inner))`.
    pub fn wrap(label: impl Into<String>, inner: H) -> Decorated<Self> {
        Decorated(Self::new(label, inner))
    }

    fn record<T>(&self, started: Instant, attempt: u32, result: &Result<T, HandlerError>) {
        let elapsed_us = micros(started.elapsed());
        match result {
            Ok(_) => debug!(handler = %self.label, attempt, elapsed_us, "handled"),
            Err(err) => warn!(handler = %self.label, attempt, elapsed_us, error = %err, "handler failed"),
        }
    }
}

/// Whole microseconds, saturating at `u64::MAX`.
fn micros(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX)
}

impl<T, H: CommandHandler<T>> CommandDecorator<T> for Logged<H> {
    type Inner = H;

    fn inner(&self) -> &H {
        &self.inner
    }

    fn handle(&self, message: &Message<T>) -> Result<(), HandlerError> {
        let started = Instant::now();
        let result = self.inner.handle(message);
        self.record(started, message.attempt(), &result);
        result
    }
}

impl<T, H: EventHandler<T>> EventDecorator<T> for Logged<H> {
    type Inner = H;

    fn inner(&self) -> &H {
        &self.inner
    }

    fn on_event(&self, event: &Message<T>) -> Result<(), HandlerError> {
        let started = Instant::now();
        let result = self.inner.on_event(event);
        self.record(started, event.attempt(), &result);
        result
    }
}

impl<Q, R, H: QueryHandler<Q, R>> QueryDecorator<Q, R> for Logged<H> {
    type Inner = H;

    fn inner(&self) -> &H {
        &self.inner
    }

    fn answer(&self, query: &Message<Q>) -> Result<R, HandlerError> {
        let started = Instant::now();
        let result = self.inner.answer(query);
        self.record(started, query.attempt(), &result);
        result
    }
}
