//! Handlers that know their own subscription.

use std::sync::{Mutex, PoisonError};

use super::{CommandHandler, EventHandler};
use crate::channel::SubscriptionToken;
use crate::error::{BrokerError, HandlerError};
use crate::message::Message;

/// Receives its subscription token when registered through
/// `subscribe_aware`.
///
/// A handler owns at most one live subscription: attaching while a previous
/// token is still active must fail with [`BrokerError::AlreadySubscribed`].
/// [`SubscriptionSlot`] implements that rule.
pub trait SubscriptionAware: Send + Sync {
    fn attach(&self, token: SubscriptionToken) -> Result<(), BrokerError>;
}

/// Holds a handler's current subscription token.
#[derive(Default)]
pub struct SubscriptionSlot {
    token: Mutex<Option<SubscriptionToken>>,
}

impl SubscriptionSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&self, token: SubscriptionToken) -> Result<(), BrokerError> {
        let mut slot = self.token.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().is_some_and(SubscriptionToken::is_active) {
            return Err(BrokerError::AlreadySubscribed);
        }
        *slot = Some(token);
        Ok(())
    }

    pub fn token(&self) -> Option<SubscriptionToken> {
        self.token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_subscribed(&self) -> bool {
        self.token().is_some_and(|token| token.is_active())
    }

    /// Dispose the held subscription, if any.
    pub fn unsubscribe(&self) -> bool {
        self.token().is_some_and(|token| token.dispose())
    }
}

/// Handles one message successfully, then unsubscribes itself.
///
/// Failed invocations keep the subscription so a redelivered command can
/// be retried by the same handler.
pub struct SingleShot<H> {
    inner: H,
    slot: SubscriptionSlot,
}

impl<H> SingleShot<H> {
    pub fn new(inner: H) -> Self {
        Self {
            inner,
            slot: SubscriptionSlot::new(),
        }
    }

    pub fn is_subscribed(&self) -> bool {
        self.slot.is_subscribed()
    }
}

impl<H: Send + Sync> SubscriptionAware for SingleShot<H> {
    fn attach(&self, token: SubscriptionToken) -> Result<(), BrokerError> {
        self.slot.attach(token)
    }
}

impl<T, H: CommandHandler<T>> CommandHandler<T> for SingleShot<H> {
    fn handle(&self, message: &Message<T>) -> Result<(), HandlerError> {
        let result = self.inner.handle(message);
        if result.is_ok() {
            self.slot.unsubscribe();
        }
        result
    }
}

impl<T, H: EventHandler<T>> EventHandler<T> for SingleShot<H> {
    fn on_event(&self, event: &Message<T>) -> Result<(), HandlerError> {
        let result = self.inner.on_event(event);
        if result.is_ok() {
            self.slot.unsubscribe();
        }
        result
    }
}
