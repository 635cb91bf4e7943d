//! Command channel: competing consumers with mandatory acknowledgment.
//!
//! Each pending command is matched with one idle subscription. While the
//! handler runs, that subscription is out of the available pool, so it
//! never holds two commands at once. After the handler returns the
//! subscription goes back to the pool and the command's ack state decides
//! its fate:
//!
//! | handler result | ack state | outcome |
//! |---|---|---|
//! | any | `Acknowledged` | retired |
//! | `Err` / panic | `Initial` or `NotAcknowledged` | redelivered |
//! | `Ok` | `Initial` or `NotAcknowledged` | redelivered |
//!
//! A handler that forgets to call `ack()` therefore sees the same payload
//! again and again. Delivery is at-least-once.

use std::any::Any;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use crossbeam::channel::Receiver;
use crossbeam::queue::SegQueue;
use tracing::{debug, warn};

use super::core::{ChannelCore, EmptyHook, HandlerFn, SubscriptionState};
use super::query::{PendingReply, QueryRequest};
use super::stats::ChannelStats;
use super::subscription::{Subscription, SubscriptionToken};
use super::{ChannelKind, ChannelLifetime};
use crate::error::{BrokerError, HandlerError};
use crate::handler::{self, CommandHandler, QueryHandler, SubscriptionAware};
use crate::message::{AckState, Envelope, Message};
use crate::scheduler::{Collect, CollectSource, Scheduler, SchedulerFactory, WorkItem, WorkSource};
use crate::topic::TopicName;

pub(crate) struct CommandQueue {
    this: Weak<CommandQueue>,
    core: Arc<ChannelCore>,
    pending: SegQueue<Envelope>,
    available: SegQueue<Arc<SubscriptionState>>,
}

impl CommandQueue {
    fn enqueue(&self, envelope: Envelope) {
        self.pending.push(envelope);
        self.core.notify();
    }

    /// Run the handler for the command parked in `subscription`'s slot and
    /// apply the ack/retry policy.
    fn execute(&self, subscription: Arc<SubscriptionState>) {
        let Some(envelope) = subscription.unload() else {
            self.release(subscription);
            return;
        };

        self.core.stats.delivered();
        let outcome = subscription.invoke(&envelope);
        self.release(subscription);

        match (envelope.state(), outcome) {
            (AckState::Acknowledged, _) => self.core.stats.acknowledged(),
            (_, Err(failure)) => {
                self.core.stats.failed();
                self.redeliver(&envelope, &failure);
            }
            (state, Ok(())) => {
                let reason = format!("handler returned while {}", state);
                self.redeliver(&envelope, &reason);
            }
        }

        if !self.pending.is_empty() {
            self.core.notify();
        }
    }

    /// Return a subscription to the pool unless it was disposed meanwhile,
    /// possibly by its own handler.
    fn release(&self, subscription: Arc<SubscriptionState>) {
        if subscription.is_active() {
            self.available.push(subscription);
        }
    }

    /// Cleanup pass. Disposed subscriptions leave both the subscriber list
    /// and the available pool, which releases their handlers.
    fn prune(&self) {
        if !self.core.collect() {
            return;
        }
        // Entries pushed concurrently are left for the next pass.
        let mut kept = false;
        for _ in 0..self.available.len() {
            match self.available.pop() {
                Some(subscription) if subscription.is_active() => {
                    self.available.push(subscription);
                    kept = true;
                }
                Some(_) => {}
                None => break,
            }
        }
        if kept && !self.pending.is_empty() {
            self.core.notify();
        }
    }

    fn redeliver(&self, envelope: &Envelope, reason: &dyn fmt::Display) {
        let next = envelope.redeliver();
        warn!(
            topic = %self.core.topic(),
            payload = envelope.type_name(),
            attempt = next.attempt(),
            reason = %reason,
            "command not acknowledged; redelivering"
        );
        self.core.stats.redelivered();
        self.enqueue(next);
    }
}

impl Collect for CommandQueue {
    fn source_name(&self) -> &str {
        self.core.name()
    }

    fn collect(&self) {
        self.prune();
    }

    fn try_match(&self) -> Option<WorkItem> {
        if self.pending.is_empty() {
            return None;
        }
        let queue = self.this.upgrade()?;

        let subscription = loop {
            match self.available.pop() {
                Some(subscription) if subscription.is_active() => break subscription,
                Some(_) => continue,
                None => return None,
            }
        };

        let Some(envelope) = self.pending.pop() else {
            // Another matcher took the last command.
            self.available.push(subscription);
            return None;
        };

        subscription.load(envelope);
        Some(Box::new(move || queue.execute(subscription)))
    }

    fn may_match(&self) -> bool {
        self.prune();
        !self.pending.is_empty() && !self.available.is_empty()
    }

    fn is_closed(&self) -> bool {
        self.core.is_closed()
    }

    fn wait_for_signal(&self, timeout: Duration, cancel: &Receiver<()>) -> bool {
        self.core.wait_for_signal(timeout, cancel)
    }
}

/// Competing-consumer channel for one topic.
///
/// Clones are handles to the same channel. The channel's scheduler lives as
/// long as any handle does.
#[derive(Clone)]
pub struct CommandChannel {
    queue: Arc<CommandQueue>,
    scheduler: Arc<dyn Scheduler>,
}

impl CommandChannel {
    /// Open a standalone channel driven by a scheduler from `factory`.
    pub fn open(
        topic: TopicName,
        lifetime: ChannelLifetime,
        factory: &dyn SchedulerFactory,
    ) -> Result<Self, BrokerError> {
        let core = ChannelCore::new(ChannelKind::Commands, topic, lifetime);
        let queue = Arc::new_cyclic(|this| CommandQueue {
            this: this.clone(),
            core,
            pending: SegQueue::new(),
            available: SegQueue::new(),
        });
        let source: Arc<dyn WorkSource> = Arc::new(CollectSource::new(Arc::clone(&queue)));
        let scheduler = factory.create(source)?;
        debug!(channel = queue.core.name(), ?lifetime, "command channel opened");
        Ok(Self { queue, scheduler })
    }

    pub fn topic(&self) -> &TopicName {
        self.queue.core.topic()
    }

    pub fn lifetime(&self) -> ChannelLifetime {
        self.queue.core.lifetime()
    }

    /// Queue a command. Never blocks.
    pub fn publish<T: Any + Send + Sync>(&self, payload: T) -> Result<(), BrokerError> {
        self.publish_shared(Arc::new(payload))
    }

    /// Queue a command whose payload is already shared.
    pub fn publish_shared<T: Any + Send + Sync>(&self, payload: Arc<T>) -> Result<(), BrokerError> {
        if self.queue.core.is_closed() {
            return Err(BrokerError::Disposed);
        }
        self.queue.core.stats.published();
        self.queue.enqueue(Message::from_arc(payload).into_envelope());
        Ok(())
    }

    /// Register a handler for commands carrying a `T`.
    ///
    /// A command with any other payload type fails in this handler with
    /// [`HandlerError::PayloadType`], logged at error level, and is
    /// redelivered. With no subscriber for its type it loops forever.
    pub fn subscribe<T, H>(&self, handler: H) -> Subscription
    where
        T: Any + Send + Sync,
        H: CommandHandler<T> + 'static,
    {
        self.register(handler::command_fn(handler))
    }

    /// Register a handler that receives every command untyped.
    pub fn subscribe_any<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&Envelope) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.register(Box::new(handler))
    }

    /// Register a handler that is given its own subscription token.
    ///
    /// Fails with [`BrokerError::AlreadySubscribed`] if the same handler
    /// instance still holds a live subscription.
    pub fn subscribe_aware<T, H>(&self, handler: Arc<H>) -> Result<Subscription, BrokerError>
    where
        T: Any + Send + Sync,
        H: CommandHandler<T> + SubscriptionAware + 'static,
    {
        let state = self
            .queue
            .core
            .prepare(handler::shared_command_fn::<T, H>(Arc::clone(&handler)));
        if let Err(err) = handler.attach(SubscriptionToken::new(&state)) {
            state.abandon();
            return Err(err);
        }
        self.activate(&state);
        Ok(Subscription::new(state))
    }

    /// Register a responder for [`CommandChannel::request`].
    pub fn subscribe_query<Q, R, H>(&self, handler: H) -> Subscription
    where
        Q: Any + Send + Sync,
        R: Send + 'static,
        H: QueryHandler<Q, R> + 'static,
    {
        self.register(handler::query_fn(handler))
    }

    /// Send a query to one responder and get a handle on its reply.
    pub fn request<Q, R>(&self, query: Q) -> Result<PendingReply<R>, BrokerError>
    where
        Q: Any + Send + Sync,
        R: Send + 'static,
    {
        let (request, pending) = QueryRequest::new(query, self.topic().clone());
        self.publish(request)?;
        Ok(pending)
    }

    fn register(&self, handler: Box<HandlerFn>) -> Subscription {
        let state = self.queue.core.prepare(handler);
        self.activate(&state);
        Subscription::new(state)
    }

    fn activate(&self, state: &Arc<SubscriptionState>) {
        self.queue.available.push(Arc::clone(state));
        self.queue.core.activate(state);
    }

    /// True when a pending command and an idle subscription both exist.
    pub fn has_work(&self) -> bool {
        self.queue.may_match()
    }

    pub fn pending_count(&self) -> usize {
        self.queue.pending.len()
    }

    /// Live (not disposed) subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.queue.core.live()
    }

    pub fn stats(&self) -> ChannelStats {
        self.queue.core.stats.snapshot()
    }

    pub fn is_closed(&self) -> bool {
        self.queue.core.is_closed()
    }

    /// True when both handles refer to the same channel instance.
    pub fn same_channel(&self, other: &CommandChannel) -> bool {
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

impl fmt::Debug for CommandChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandChannel")
            .field("topic", self.topic())
            .field("lifetime", &self.lifetime())
            .field("scheduler", &self.scheduler.name())
            .field("pending", &self.pending_count())
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
