use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use tracing::debug;

use crate::channel::{ChannelKind, ChannelLifetime, CommandChannel, EventChannel};
use crate::error::BrokerError;
use crate::topic::TopicName;

/// What the registry needs from a channel handle.
pub(crate) trait Registered: Clone {
    fn channel_id(&self) -> u64;
    fn lifetime(&self) -> ChannelLifetime;
    fn subscriber_count(&self) -> usize;
    fn close(&self);
}

impl Registered for CommandChannel {
    fn channel_id(&self) -> u64 {
        self.id()
    }

    fn lifetime(&self) -> ChannelLifetime {
        CommandChannel::lifetime(self)
    }

    fn subscriber_count(&self) -> usize {
        CommandChannel::subscriber_count(self)
    }

    fn close(&self) {
        CommandChannel::close(self)
    }
}

impl Registered for EventChannel {
    fn channel_id(&self) -> u64 {
        self.id()
    }

    fn lifetime(&self) -> ChannelLifetime {
        EventChannel::lifetime(self)
    }

    fn subscriber_count(&self) -> usize {
        EventChannel::subscriber_count(self)
    }

    fn close(&self) {
        EventChannel::close(self)
    }
}

/// Topic to channel map for one namespace.
///
/// Lookups of an existing topic take the read lock only. Creation and
/// removal take the write lock.
pub(crate) struct Registry<C> {
    kind: ChannelKind,
    channels: RwLock<HashMap<TopicName, C>>,
}

impl<C: Registered> Registry<C> {
    pub(crate) fn new(kind: ChannelKind) -> Self {
        Self {
            kind,
            channels: RwLock::new(HashMap::new()),
        }
    }

    /// Return the channel for `topic`, creating it with `create` if absent.
    ///
    /// `create` runs under the write lock, so two racing callers always get
    /// the same instance.
    pub(crate) fn get_or_create<F>(&self, topic: &TopicName, create: F) -> Result<C, BrokerError>
    where
        F: FnOnce() -> Result<C, BrokerError>,
    {
        if let Some(channel) = self
            .channels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(topic)
        {
            return Ok(channel.clone());
        }

        let mut channels = self
            .channels
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(channel) = channels.get(topic) {
            return Ok(channel.clone());
        }
        let channel = create()?;
        channels.insert(topic.clone(), channel.clone());
        Ok(channel)
    }

    /// Remove `topic` if it still maps to the temporary channel `id` and
    /// that channel has no live subscribers.
    ///
    /// The channel is closed after the write lock is released, so dropping
    /// it never re-enters the registry.
    pub(crate) fn remove_if_unused(&self, topic: &TopicName, id: u64) -> bool {
        let removed = {
            let mut channels = self
                .channels
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            let removable = channels.get(topic).is_some_and(|channel| {
                channel.channel_id() == id
                    && channel.lifetime() == ChannelLifetime::Temporary
                    && channel.subscriber_count() == 0
            });
            if removable {
                channels.remove(topic)
            } else {
                None
            }
        };
        match removed {
            Some(channel) => {
                channel.close();
                debug!(kind = %self.kind, %topic, "temporary channel removed");
                true
            }
            None => false,
        }
    }

    pub(crate) fn topics(&self) -> Vec<TopicName> {
        let mut topics: Vec<TopicName> = self
            .channels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        topics.sort();
        topics
    }

    /// Close and forget every channel.
    pub(crate) fn close_all(&self) -> usize {
        let drained: Vec<C> = self
            .channels
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .map(|(_, channel)| channel)
            .collect();
        for channel in &drained {
            channel.close();
        }
        drained.len()
    }
}
