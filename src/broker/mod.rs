//! The broker: topic-keyed registries of command and event channels.
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use inproc_broker::{Broker, ChannelLifetime, HandlerError, Message};
//!
//! struct OrderPlaced(u32);
//!
//! let (broker, factory) = Broker::manual();
//! let total = Arc::new(AtomicUsize::new(0));
//! let sum = Arc::clone(&total);
//!
//! let events = broker.events_with("Events/Orders", ChannelLifetime::Temporary).unwrap();
//! let subscription = events.subscribe(move |e: &Message<OrderPlaced>| -> Result<(), HandlerError> {
//!     sum.fetch_add(e.payload().0 as usize, Ordering::SeqCst);
//!     Ok(())
//! });
//!
//! broker.publish(OrderPlaced(3), ["Events/Orders"]).unwrap();
//! factory.drain_all();
//! assert_eq!(total.load(Ordering::SeqCst), 3);
//!
//! // The last subscriber leaves, so the temporary channel is removed.
//! drop(subscription);
//! assert!(broker.event_topics().is_empty());
//! ```

mod registry;

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::debug;

use crate::channel::{
    ChannelKind, ChannelLifetime, CommandChannel, EmptyHook, EventChannel, PendingReply,
};
use crate::config::BrokerConfig;
use crate::error::BrokerError;
use crate::scheduler::{
    ActionQueue, ManualSchedulerFactory, Scheduler, SchedulerFactory, ThreadSchedulerFactory,
};
use crate::topic::{IntoTopic, TopicName};

use registry::Registry;

/// In-process message broker.
///
/// Cheap to clone; clones share the same registries. Channels are created
/// on first use and each gets its own scheduler from the broker's
/// [`SchedulerFactory`].
#[derive(Clone)]
pub struct Broker {
    inner: Arc<BrokerInner>,
}

struct BrokerInner {
    factory: Arc<dyn SchedulerFactory>,
    default_lifetime: ChannelLifetime,
    commands: Registry<CommandChannel>,
    events: Registry<EventChannel>,
    actions: Arc<ActionQueue>,
    action_scheduler: Arc<dyn Scheduler>,
    disposed: AtomicBool,
}

impl Broker {
    pub fn new(factory: Arc<dyn SchedulerFactory>) -> Result<Self, BrokerError> {
        Self::with_lifetime(factory, ChannelLifetime::Default)
    }

    /// Like [`Broker::new`], with `default_lifetime` used by
    /// [`Broker::commands`] and [`Broker::events`].
    pub fn with_lifetime(
        factory: Arc<dyn SchedulerFactory>,
        default_lifetime: ChannelLifetime,
    ) -> Result<Self, BrokerError> {
        let actions = Arc::new(ActionQueue::new("broker:actions"));
        let action_scheduler = factory.create(actions.clone())?;
        Ok(Self::assemble(
            factory,
            actions,
            action_scheduler,
            default_lifetime,
        ))
    }

    /// A broker backed by background threads, configured from `config`.
    pub fn from_config(config: &BrokerConfig) -> Result<Self, BrokerError> {
        Self::with_lifetime(
            Arc::new(ThreadSchedulerFactory::from_config(config)),
            config.default_lifetime,
        )
    }

    /// A broker whose channels only run when the returned factory is
    /// drained. For tests and reproducible runs.
    pub fn manual() -> (Self, Arc<ManualSchedulerFactory>) {
        let factory = Arc::new(ManualSchedulerFactory::new());
        let actions = Arc::new(ActionQueue::new("broker:actions"));
        let action_scheduler = factory.create_manual(actions.clone());
        let broker = Self::assemble(
            factory.clone(),
            actions,
            action_scheduler,
            ChannelLifetime::Default,
        );
        (broker, factory)
    }

    fn assemble(
        factory: Arc<dyn SchedulerFactory>,
        actions: Arc<ActionQueue>,
        action_scheduler: Arc<dyn Scheduler>,
        default_lifetime: ChannelLifetime,
    ) -> Self {
        Self {
            inner: Arc::new(BrokerInner {
                factory,
                default_lifetime,
                commands: Registry::new(ChannelKind::Commands),
                events: Registry::new(ChannelKind::Events),
                actions,
                action_scheduler,
                disposed: AtomicBool::new(false),
            }),
        }
    }

    /// Command channel for `topic`, created with the broker's default
    /// lifetime if it does not exist yet.
    pub fn commands(&self, topic: impl IntoTopic) -> Result<CommandChannel, BrokerError> {
        self.commands_with(topic, self.inner.default_lifetime)
    }

    /// Command channel for `topic`. `lifetime` only applies when the
    /// channel is created by this call.
    pub fn commands_with(
        &self,
        topic: impl IntoTopic,
        lifetime: ChannelLifetime,
    ) -> Result<CommandChannel, BrokerError> {
        self.ensure_live()?;
        let topic = topic.into_topic()?;
        self.command_channel(&topic, lifetime)
    }

    pub fn events(&self, topic: impl IntoTopic) -> Result<EventChannel, BrokerError> {
        self.events_with(topic, self.inner.default_lifetime)
    }

    pub fn events_with(
        &self,
        topic: impl IntoTopic,
        lifetime: ChannelLifetime,
    ) -> Result<EventChannel, BrokerError> {
        self.ensure_live()?;
        let topic = topic.into_topic()?;
        self.event_channel(&topic, lifetime)
    }

    /// Send a command to each of `topics`.
    ///
    /// All topics are validated before anything is sent. Every channel
    /// receives the same payload allocation.
    pub fn send<T, I>(&self, payload: T, topics: I) -> Result<(), BrokerError>
    where
        T: Any + Send + Sync,
        I: IntoIterator,
        I::Item: IntoTopic,
    {
        self.ensure_live()?;
        let topics = collect_topics(topics)?;
        let payload = Arc::new(payload);
        for topic in &topics {
            let lookup = || self.command_channel(topic, self.inner.default_lifetime);
            self.deliver(lookup()?, lookup, |channel| {
                channel.publish_shared(Arc::clone(&payload))
            })?;
        }
        Ok(())
    }

    /// Publish an event to each of `topics`.
    pub fn publish<T, I>(&self, payload: T, topics: I) -> Result<(), BrokerError>
    where
        T: Any + Send + Sync,
        I: IntoIterator,
        I::Item: IntoTopic,
    {
        self.ensure_live()?;
        let topics = collect_topics(topics)?;
        let payload = Arc::new(payload);
        for topic in &topics {
            let lookup = || self.event_channel(topic, self.inner.default_lifetime);
            self.deliver(lookup()?, lookup, |channel| {
                channel.publish_shared(Arc::clone(&payload))
            })?;
        }
        Ok(())
    }

    /// Send a query over the command channel for `topic`.
    pub fn request<Q, R>(&self, query: Q, topic: impl IntoTopic) -> Result<PendingReply<R>, BrokerError>
    where
        Q: Any + Send + Sync,
        R: Send + 'static,
    {
        self.commands(topic)?.request(query)
    }

    /// Run `action` on the broker's own scheduler.
    pub fn post<F>(&self, action: F) -> Result<(), BrokerError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.ensure_live()?;
        if self.inner.actions.post(Box::new(action)) {
            Ok(())
        } else {
            Err(BrokerError::Disposed)
        }
    }

    /// Registered command topics, sorted.
    pub fn command_topics(&self) -> Vec<TopicName> {
        self.inner.commands.topics()
    }

    pub fn event_topics(&self) -> Vec<TopicName> {
        self.inner.events.topics()
    }

    pub fn default_lifetime(&self) -> ChannelLifetime {
        self.inner.default_lifetime
    }

    /// Close every channel and stop every scheduler. Further calls fail
    /// with [`BrokerError::Disposed`]. Idempotent.
    pub fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        let commands = self.inner.commands.close_all();
        let events = self.inner.events.close_all();
        self.inner.actions.close();
        self.inner.action_scheduler.shutdown();
        debug!(commands, events, "broker disposed");
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }

    fn ensure_live(&self) -> Result<(), BrokerError> {
        if self.is_disposed() {
            Err(BrokerError::Disposed)
        } else {
            Ok(())
        }
    }

    /// Publish through `channel`. A temporary channel can be removed between
    /// lookup and publish; while the broker is live that is retried on the
    /// channel that now owns the topic.
    fn deliver<C, L, P>(&self, mut channel: C, lookup: L, publish: P) -> Result<(), BrokerError>
    where
        L: Fn() -> Result<C, BrokerError>,
        P: Fn(&C) -> Result<(), BrokerError>,
    {
        loop {
            match publish(&channel) {
                Err(BrokerError::Disposed) if !self.is_disposed() => channel = lookup()?,
                result => return result,
            }
        }
    }

    fn command_channel(
        &self,
        topic: &TopicName,
        lifetime: ChannelLifetime,
    ) -> Result<CommandChannel, BrokerError> {
        self.ensure_live()?;
        self.inner.commands.get_or_create(topic, || {
            let channel = CommandChannel::open(topic.clone(), lifetime, self.inner.factory.as_ref())?;
            if lifetime == ChannelLifetime::Temporary {
                channel.set_on_empty(self.removal_hook(ChannelKind::Commands, topic, channel.id()));
            }
            Ok(channel)
        })
    }

    fn event_channel(
        &self,
        topic: &TopicName,
        lifetime: ChannelLifetime,
    ) -> Result<EventChannel, BrokerError> {
        self.ensure_live()?;
        self.inner.events.get_or_create(topic, || {
            let channel = EventChannel::open(topic.clone(), lifetime, self.inner.factory.as_ref())?;
            if lifetime == ChannelLifetime::Temporary {
                channel.set_on_empty(self.removal_hook(ChannelKind::Events, topic, channel.id()));
            }
            Ok(channel)
        })
    }

    /// Hook run when a temporary channel loses its last subscriber. It
    /// removes the channel from its registry right away, unless the topic
    /// has been taken over by another instance or a subscriber came back.
    fn removal_hook(&self, kind: ChannelKind, topic: &TopicName, id: u64) -> EmptyHook {
        let broker = Arc::downgrade(&self.inner);
        let topic = topic.clone();
        Arc::new(move || {
            let Some(inner) = broker.upgrade() else {
                return;
            };
            match kind {
                ChannelKind::Commands => inner.commands.remove_if_unused(&topic, id),
                ChannelKind::Events => inner.events.remove_if_unused(&topic, id),
            };
        })
    }
}

fn collect_topics<I>(topics: I) -> Result<Vec<TopicName>, BrokerError>
where
    I: IntoIterator,
    I::Item: IntoTopic,
{
    let topics = topics
        .into_iter()
        .map(IntoTopic::into_topic)
        .collect::<Result<Vec<_>, _>>()?;
    if topics.is_empty() {
        return Err(BrokerError::EmptyTopics);
    }
    Ok(topics)
}

impl fmt::Debug for Broker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Broker")
            .field("default_lifetime", &self.inner.default_lifetime)
            .field("commands", &self.command_topics())
            .field("events", &self.event_topics())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
