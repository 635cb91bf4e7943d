mod broker;
mod channel;
mod config;
mod error;
mod handler;
mod message;
pub mod scheduler;
pub mod telemetry;
mod topic;

pub use broker::Broker;
pub use channel::{
    ChannelKind, ChannelLifetime, ChannelStats, CommandChannel, EventChannel, PendingReply,
    QueryRequest, Subscription, SubscriptionToken,
};
pub use config::{BrokerConfig, ConfigError, ENV_THREAD_PREFIX, ENV_WAIT_TIMEOUT_MS};
pub use error::{BrokerError, HandlerError};
pub use handler::{
    CommandDecorator, CommandHandler, Decorated, EventDecorator, EventHandler, Logged,
    QueryDecorator, QueryHandler, SingleShot, SubscriptionAware, SubscriptionSlot,
};
pub use message::{AckCell, AckError, AckState, Envelope, Message, Payload};
pub use topic::{IntoTopic, TopicError, TopicName, SEPARATOR};

// Schedulers most callers need without reaching into the module
pub use scheduler::{ManualSchedulerFactory, SchedulerFactory, ThreadSchedulerFactory};
