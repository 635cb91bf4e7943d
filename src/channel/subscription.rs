//! Subscription handles returned by `subscribe`.

use std::fmt;
use std::sync::{Arc, Weak};

use super::core::SubscriptionState;
use crate::topic::TopicName;

/// Owning handle for one registered handler.
///
/// Dropping the handle disposes the subscription. Call
/// [`Subscription::detach`] to keep the handler registered without holding
/// the handle.
#[must_use = "dropping a Subscription unsubscribes its handler"]
pub struct Subscription {
    state: Arc<SubscriptionState>,
    dispose_on_drop: bool,
}

impl Subscription {
    pub(crate) fn new(state: Arc<SubscriptionState>) -> Self {
        Self {
            state,
            dispose_on_drop: true,
        }
    }

    pub fn id(&self) -> u64 {
        self.state.id()
    }

    pub fn topic(&self) -> &TopicName {
        self.state.topic()
    }

    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    /// Unsubscribe now. An in-flight invocation finishes; no new message is
    /// handed to this handler afterwards.
    pub fn dispose(&self) -> bool {
        self.state.dispose()
    }

    /// Non-owning token for the same subscription.
    pub fn token(&self) -> SubscriptionToken {
        SubscriptionToken::new(&self.state)
    }

    /// Give up the owning handle while leaving the handler registered.
    pub fn detach(mut self) -> SubscriptionToken {
        self.dispose_on_drop = false;
        self.token()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if self.dispose_on_drop {
            self.state.dispose();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id())
            .field("topic", self.topic())
            .field("active", &self.is_active())
            .finish()
    }
}

/// Weak reference to a subscription, handed to subscription-aware
/// handlers so they can unsubscribe themselves.
#[derive(Clone)]
pub struct SubscriptionToken {
    id: u64,
    topic: TopicName,
    state: Weak<SubscriptionState>,
}

impl SubscriptionToken {
    pub(crate) fn new(state: &Arc<SubscriptionState>) -> Self {
        Self {
            id: state.id(),
            topic: state.topic().clone(),
            state: Arc::downgrade(state),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn topic(&self) -> &TopicName {
        &self.topic
    }

    pub fn is_active(&self) -> bool {
        self.state
            .upgrade()
            .map(|state| state.is_active())
            .unwrap_or(false)
    }

    /// Unsubscribe. Returns false if the subscription was already gone.
    pub fn dispose(&self) -> bool {
        self.state
            .upgrade()
            .map(|state| state.dispose())
            .unwrap_or(false)
    }
}

impl fmt::Debug for SubscriptionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionToken")
            .field("id", &self.id)
            .field("topic", &self.topic)
            .field("active", &self.is_active())
            .finish()
    }
}
