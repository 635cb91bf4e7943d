//! Event channel: fan-out to every active subscriber.
//!
//! Publishing snapshots the subscriber list and queues one delivery per
//! subscriber. Each delivery carries its own acknowledgment state, so one
//! subscriber's `ack()` or `nack()` is invisible to the others and has no
//! effect on delivery. A failing subscriber is logged and counted; the
//! other subscribers and the publisher never see the failure.

use std::any::Any;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use crossbeam::channel::Receiver;
use crossbeam::queue::SegQueue;
use tracing::{debug, warn};

use super::core::{ChannelCore, EmptyHook, HandlerFn, SubscriptionState};
use super::stats::ChannelStats;
use super::subscription::{Subscription, SubscriptionToken};
use super::{ChannelKind, ChannelLifetime};
use crate::error::{BrokerError, HandlerError};
use crate::handler::{self, EventHandler, SubscriptionAware};
use crate::message::{AckState, Envelope, Message};
use crate::scheduler::{Collect, CollectSource, Scheduler, SchedulerFactory, WorkItem, WorkSource};
use crate::topic::TopicName;

struct Delivery {
    envelope: Envelope,
    subscription: Arc<SubscriptionState>,
}

pub(crate) struct EventQueue {
    this: Weak<EventQueue>,
    core: Arc<ChannelCore>,
    pending: SegQueue<Delivery>,
}

impl EventQueue {
    /// Queue one delivery per active subscriber. Returns how many.
    fn fan_out(&self, envelope: Envelope) -> usize {
        let subscribers = self.core.active_subscribers();
        for subscription in &subscribers {
            self.pending.push(Delivery {
                envelope: envelope.detached(),
                subscription: Arc::clone(subscription),
            });
        }
        if !subscribers.is_empty() {
            self.core.notify();
        }
        subscribers.len()
    }

    fn execute(&self, delivery: Delivery) {
        let Delivery {
            envelope,
            subscription,
        } = delivery;

        self.core.stats.delivered();
        match subscription.invoke(&envelope) {
            Ok(()) => {
                if envelope.state() == AckState::Acknowledged {
                    self.core.stats.acknowledged();
                }
            }
            Err(failure) => {
                self.core.stats.failed();
                warn!(
                    topic = %self.core.topic(),
                    subscription = subscription.id(),
                    payload = envelope.type_name(),
                    error = %failure,
                    "event handler failed"
                );
            }
        }

        if !self.pending.is_empty() {
            self.core.notify();
        }
    }
}

impl Collect for EventQueue {
    fn source_name(&self) -> &str {
        self.core.name()
    }

    fn collect(&self) {
        self.core.collect();
    }

    fn try_match(&self) -> Option<WorkItem> {
        let queue = self.this.upgrade()?;
        loop {
            let delivery = self.pending.pop()?;
            // Disposed after the event was published.
            if !delivery.subscription.is_active() {
                continue;
            }
            return Some(Box::new(move || queue.execute(delivery)));
        }
    }

    fn may_match(&self) -> bool {
        self.core.collect();
        !self.pending.is_empty()
    }

    fn is_closed(&self) -> bool {
        self.core.is_closed()
    }

    fn wait_for_signal(&self, timeout: Duration, cancel: &Receiver<()>) -> bool {
        self.core.wait_for_signal(timeout, cancel)
    }
}

/// Broadcast channel for one topic.
#[derive(Clone)]
pub struct EventChannel {
    queue: Arc<EventQueue>,
    scheduler: Arc<dyn Scheduler>,
}

impl EventChannel {
    pub fn open(
        topic: TopicName,
        lifetime: ChannelLifetime,
        factory: &dyn SchedulerFactory,
    ) -> Result<Self, BrokerError> {
        let core = ChannelCore::new(ChannelKind::Events, topic, lifetime);
        let queue = Arc::new_cyclic(|this| EventQueue {
            this: this.clone(),
            core,
            pending: SegQueue::new(),
        });
        let source: Arc<dyn WorkSource> = Arc::new(CollectSource::new(Arc::clone(&queue)));
        let scheduler = factory.create(source)?;
        debug!(channel = queue.core.name(), ?lifetime, "event channel opened");
        Ok(Self { queue, scheduler })
    }

    pub fn topic(&self) -> &TopicName {
        self.queue.core.topic()
    }

    pub fn lifetime(&self) -> ChannelLifetime {
        self.queue.core.lifetime()
    }

    /// Broadcast to the subscribers active right now. Subscribers added
    /// later do not see this event. Never blocks.
    pub fn publish<T: Any + Send + Sync>(&self, payload: T) -> Result<(), BrokerError> {
        self.publish_shared(Arc::new(payload))
    }

    pub fn publish_shared<T: Any + Send + Sync>(&self, payload: Arc<T>) -> Result<(), BrokerError> {
        if self.queue.core.is_closed() {
            return Err(BrokerError::Disposed);
        }
        self.queue.core.stats.published();
        self.queue.fan_out(Message::from_arc(payload).into_envelope());
        Ok(())
    }

    pub fn subscribe<T, H>(&self, handler: H) -> Subscription
    where
        T: Any + Send + Sync,
        H: EventHandler<T> + 'static,
    {
        self.register(handler::event_fn(handler))
    }

    pub fn subscribe_any<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&Envelope) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.register(Box::new(handler))
    }

    /// See [`CommandChannel::subscribe_aware`](super::CommandChannel::subscribe_aware).
    pub fn subscribe_aware<T, H>(&self, handler: Arc<H>) -> Result<Subscription, BrokerError>
    where
        T: Any + Send + Sync,
        H: EventHandler<T> + SubscriptionAware + 'static,
    {
        let state = self
            .queue
            .core
            .prepare(handler::shared_event_fn::<T, H>(Arc::clone(&handler)));
        if let Err(err) = handler.attach(SubscriptionToken::new(&state)) {
            state.abandon();
            return Err(err);
        }
        self.queue.core.activate(&state);
        Ok(Subscription::new(state))
    }

    fn register(&self, handler: Box<HandlerFn>) -> Subscription {
        let state = self.queue.core.prepare(handler);
        self.queue.core.activate(&state);
        Subscription::new(state)
    }

    pub fn has_work(&self) -> bool {
        self.queue.may_match()
    }

    /// Deliveries queued but not yet run.
    pub fn pending_count(&self) -> usize {
        self.queue.pending.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.queue.core.live()
    }

    pub fn stats(&self) -> ChannelStats {
        self.queue.core.stats.snapshot()
    }

    pub fn is_closed(&self) -> bool {
        self.queue.core.is_closed()
    }

    pub fn same_channel(&self, other: &EventChannel) -> bool {
        Arc::ptr_eq(&self.queue, &other.queue)
    }

    pub(crate) fn id(&self) -> u64 {
        self.queue.core.id()
    }

    pub(crate) fn set_on_empty(&self, hook: EmptyHook) {
        self.queue.core.set_on_empty(hook);
    }

    pub(crate) fn close(&self) {
        self.queue.core.close();
        self.scheduler.shutdown();
    }
}

impl fmt::Debug for EventChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventChannel")
            .field("topic", self.topic())
            .field("lifetime", &self.lifetime())
            .field("scheduler", &self.scheduler.name())
            .field("pending", &self.pending_count())
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
