//! Handler traits for the three message shapes.
//!
//! Closures implement the traits directly, so the common case is
//!
//! ```
//! use inproc_broker::{Broker, HandlerError, Message};
//!
//! struct Ping;
//!
//! let (broker, factory) = Broker::manual();
//! let _subscription = broker
//!     .commands("Ping")
//!     .unwrap()
//!     .subscribe(|message: &Message<Ping>| -> Result<(), HandlerError> {
//!         message.ack()?;
//!         Ok(())
//!     });
//! broker.send(Ping, ["Ping"]).unwrap();
//! assert_eq!(factory.drain_all(), 1);
//! ```
//!
//! Command handlers must acknowledge. Returning `Ok(())` without calling
//! `ack()` counts as a failure and the command is delivered again.

mod aware;
mod decorator;

use std::any::{self, Any};
use std::sync::Arc;

use tracing::error;

pub use aware::{SingleShot, SubscriptionAware, SubscriptionSlot};
pub use decorator::{CommandDecorator, Decorated, EventDecorator, Logged, QueryDecorator};

use crate::channel::{HandlerFn, QueryRequest};
use crate::error::HandlerError;
use crate::message::{Envelope, Message};

/// Handles commands of type `T` (competing consumers, ack required).
pub trait CommandHandler<T>: Send + Sync {
    fn handle(&self, message: &Message<T>) -> Result<(), HandlerError>;
}

impl<T, F> CommandHandler<T> for F
where
    F: Fn(&Message<T>) -> Result<(), HandlerError> + Send + Sync,
{
    fn handle(&self, message: &Message<T>) -> Result<(), HandlerError> {
        self(message)
    }
}

/// Handles events of type `T` (fan-out, ack ignored).
pub trait EventHandler<T>: Send + Sync {
    fn on_event(&self, event: &Message<T>) -> Result<(), HandlerError>;
}

impl<T, F> EventHandler<T> for F
where
    F: Fn(&Message<T>) -> Result<(), HandlerError> + Send + Sync,
{
    fn on_event(&self, event: &Message<T>) -> Result<(), HandlerError> {
        self(event)
    }
}

/// Answers queries of type `Q` with an `R`.
///
/// The request is acknowledged once the reply is sent; an error leaves it
/// unacknowledged so another attempt is made.
pub trait QueryHandler<Q, R>: Send + Sync {
    fn answer(&self, query: &Message<Q>) -> Result<R, HandlerError>;
}

impl<Q, R, F> QueryHandler<Q, R> for F
where
    F: Fn(&Message<Q>) -> Result<R, HandlerError> + Send + Sync,
{
    fn answer(&self, query: &Message<Q>) -> Result<R, HandlerError> {
        self(query)
    }
}

/// Downcast to the handler's payload type, or report the mismatch.
///
/// A mismatch is the publisher's mistake, and a command carrying it is
/// redelivered until someone accepts it, so every occurrence is logged at
/// error level.
pub(crate) fn with_typed<T, F>(envelope: &Envelope, f: F) -> Result<(), HandlerError>
where
    T: Any + Send + Sync,
    F: FnOnce(&Message<T>) -> Result<(), HandlerError>,
{
    match envelope.to_message::<T>() {
        Some(message) => f(&message),
        None => {
            let expected = any::type_name::<T>();
            let actual = envelope.type_name();
            error!(expected, actual, attempt = envelope.attempt(), "payload type mismatch");
            Err(HandlerError::PayloadType { expected, actual })
        }
    }
}

pub(crate) fn command_fn<T, H>(handler: H) -> Box<HandlerFn>
where
    T: Any + Send + Sync,
    H: CommandHandler<T> + 'static,
{
    Box::new(move |envelope: &Envelope| with_typed::<T, _>(envelope, |m| handler.handle(m)))
}

pub(crate) fn shared_command_fn<T, H>(handler: Arc<H>) -> Box<HandlerFn>
where
    T: Any + Send + Sync,
    H: CommandHandler<T> + ?Sized + 'static,
{
    Box::new(move |envelope: &Envelope| with_typed::<T, _>(envelope, |m| handler.handle(m)))
}

pub(crate) fn event_fn<T, H>(handler: H) -> Box<HandlerFn>
where
    T: Any + Send + Sync,
    H: EventHandler<T> + 'static,
{
    Box::new(move |envelope: &Envelope| with_typed::<T, _>(envelope, |m| handler.on_event(m)))
}

pub(crate) fn shared_event_fn<T, H>(handler: Arc<H>) -> Box<HandlerFn>
where
    T: Any + Send + Sync,
    H: EventHandler<T> + ?Sized + 'static,
{
    Box::new(move |envelope: &Envelope| with_typed::<T, _>(envelope, |m| handler.on_event(m)))
}

pub(crate) fn query_fn<Q, R, H>(handler: H) -> Box<HandlerFn>
where
    Q: Any + Send + Sync,
    R: Send + 'static,
    H: QueryHandler<Q, R> + 'static,
{
    Box::new(move |envelope: &Envelope| {
        with_typed::<QueryRequest<Q, R>, _>(envelope, |request| {
            let query = request.with_payload(request.payload().query_arc());
            let reply = handler.answer(&query)?;
            request.payload().reply(reply);
            request.ack()?;
            Ok(())
        })
    })
}
