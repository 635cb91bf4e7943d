//! Topic-bound channels.
//!
//! - [`CommandChannel`]: competing consumers, one handler per message,
//!   redelivered until acknowledged.
//! - [`EventChannel`]: every active subscriber gets every event, no
//!   redelivery.
//!
//! Each channel is driven by exactly one scheduler, created from the
//! [`SchedulerFactory`](crate::scheduler::SchedulerFactory) passed to
//! `open`.

mod command;
mod core;
mod event;
mod query;
mod stats;
mod subscription;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use command::CommandChannel;
pub use event::EventChannel;
pub use query::{PendingReply, QueryRequest};
pub use stats::ChannelStats;
pub use subscription::{Subscription, SubscriptionToken};

pub(crate) use self::core::{EmptyHook, HandlerFn};

/// The two channel namespaces. A topic may exist in both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    Commands,
    Events,
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelKind::Commands => f.write_str("commands"),
            ChannelKind::Events => f.write_str("events"),
        }
    }
}

/// What happens to a channel once it has no live subscribers.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelLifetime {
    /// Stays registered; late publishers and subscribers reach the same
    /// instance.
    #[default]
    Default,
    /// Removed from the broker when its last live subscription is
    /// disposed. The next lookup creates a new instance.
    Temporary,
}
