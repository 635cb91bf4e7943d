//! Channel lifetimes, validation and disposal.

use std::sync::Arc;

use inproc_broker::{
    Broker, BrokerError, ChannelLifetime, HandlerError, ManualSchedulerFactory, Message,
    TopicError, TopicName,
};

use crate::support::{acking, Calls, Increment, Ticked};

fn noop(_: &Message<Ticked>) -> Result<(), HandlerError> {
    Ok(())
}

// ============================================================================
// Default vs Temporary
// ============================================================================

#[test]
fn default_event_channel_survives_its_last_subscriber() {
    let (broker, _factory) = Broker::manual();
    let channel = broker.events("Persistent").unwrap();
    let subscription = channel.subscribe(noop);
    subscription.dispose();

    let again = broker.events("Persistent").unwrap();
    assert!(again.same_channel(&channel));
    assert_eq!(again.subscriber_count(), 0);
}

#[test]
fn temporary_event_channel_is_new_after_last_subscriber_leaves() {
    let (broker, _factory) = Broker::manual();
    let channel = broker.events_with("Transient", ChannelLifetime::Temporary).unwrap();
    let first = channel.subscribe(noop);
    let second = channel.subscribe(noop);

    first.dispose();
    assert!(broker
        .events_with("Transient", ChannelLifetime::Temporary)
        .unwrap()
        .same_channel(&channel));

    drop(second);
    let replacement = broker.events_with("Transient", ChannelLifetime::Temporary).unwrap();
    assert!(!replacement.same_channel(&channel));
    assert!(channel.is_closed());
    assert!(matches!(
        channel.publish(Ticked { tick: 0 }),
        Err(BrokerError::Disposed)
    ));
}

#[test]
fn lookup_right_after_last_dispose_sees_new_instance() {
    let (broker, _factory) = Broker::manual();
    let channel = broker.events_with("T", ChannelLifetime::Temporary).unwrap();
    let subscription = channel.subscribe(noop);
    subscription.dispose();

    let next = broker.events_with("T", ChannelLifetime::Temporary).unwrap();
    assert!(!next.same_channel(&channel));
}

#[test]
fn resubscribing_before_last_leaves_keeps_temporary_channel() {
    let (broker, _factory) = Broker::manual();
    let channel = broker.events_with("Flicker", ChannelLifetime::Temporary).unwrap();
    let first = channel.subscribe(noop);
    let second = channel.subscribe(noop);
    first.dispose();
    let _back = channel.subscribe(noop);
    drop(second);

    let again = broker.events_with("Flicker", ChannelLifetime::Temporary).unwrap();
    assert!(again.same_channel(&channel));
    assert!(!channel.is_closed());
}

#[test]
fn send_after_temporary_removal_reaches_new_channel() {
    let (broker, factory) = Broker::manual();
    let stale = broker.commands_with("Jobs", ChannelLifetime::Temporary).unwrap();
    stale.subscribe(acking(&Calls::new())).dispose();
    assert!(stale.is_closed());

    let calls = Calls::new();
    let _worker = broker.commands("Jobs").unwrap().subscribe(acking(&calls));
    broker.send(Increment { by: 1 }, ["Jobs"]).unwrap();
    factory.drain_all();
    assert_eq!(calls.get(), 1);
}

#[test]
fn broker_default_lifetime_applies_to_plain_lookups() {
    let factory = Arc::new(ManualSchedulerFactory::new());
    let broker = Broker::with_lifetime(factory.clone(), ChannelLifetime::Temporary).unwrap();
    let channel = broker.commands("Scratch").unwrap();
    assert_eq!(channel.lifetime(), ChannelLifetime::Temporary);

    let calls = Calls::new();
    drop(channel.subscribe(acking(&calls)));
    assert!(broker.command_topics().is_empty());
}

#[test]
fn detached_subscription_keeps_handler_registered() {
    let (broker, factory) = Broker::manual();
    let channel = broker.commands_with("Detached", ChannelLifetime::Temporary).unwrap();
    let calls = Calls::new();
    let token = channel.subscribe(acking(&calls)).detach();

    channel.publish(Increment { by: 1 }).unwrap();
    factory.drain_all();
    assert_eq!(calls.get(), 1);
    assert!(token.is_active());

    assert!(token.dispose());
    assert!(!token.dispose());
    assert!(broker.command_topics().is_empty());
}

// ============================================================================
// Validation
// ============================================================================

#[test]
fn empty_topic_set_is_rejected() {
    let (broker, _factory) = Broker::manual();
    let none: [&str; 0] = [];
    assert!(matches!(broker.send(Increment { by: 1 }, none), Err(BrokerError::EmptyTopics)));
    assert!(matches!(broker.publish(Ticked { tick: 1 }, none), Err(BrokerError::EmptyTopics)));
}

#[test]
fn malformed_topics_are_rejected() {
    let (broker, _factory) = Broker::manual();
    assert!(matches!(
        broker.commands(""),
        Err(BrokerError::Topic(TopicError::NoSections))
    ));
    assert!(matches!(
        broker.events("Events//Orders"),
        Err(BrokerError::Topic(TopicError::EmptySection { index: 1 }))
    ));
    assert!(matches!(
        broker.publish(Ticked { tick: 1 }, ["ok", "not ok"]),
        Err(BrokerError::Topic(TopicError::Whitespace { .. }))
    ));
}

#[test]
fn topics_are_listed_per_namespace() {
    let (broker, _factory) = Broker::manual();
    broker.commands("B").unwrap();
    broker.commands("A").unwrap();
    broker.events(TopicName::from_sections(["Events", "X"]).unwrap()).unwrap();

    let names: Vec<String> = broker.command_topics().iter().map(ToString::to_string).collect();
    assert_eq!(names, vec!["A", "B"]);
    assert_eq!(broker.event_topics(), vec![TopicName::parse("Events/X").unwrap()]);
}

// ============================================================================
// Disposal
// ============================================================================

#[test]
fn disposed_broker_rejects_every_operation() {
    let (broker, _factory) = Broker::manual();
    let clone = broker.clone();
    broker.dispose();

    assert!(clone.is_disposed());
    assert!(matches!(clone.commands("T"), Err(BrokerError::Disposed)));
    assert!(matches!(clone.events("T"), Err(BrokerError::Disposed)));
    assert!(matches!(clone.send(Increment { by: 1 }, ["T"]), Err(BrokerError::Disposed)));
    assert!(matches!(clone.publish(Ticked { tick: 1 }, ["T"]), Err(BrokerError::Disposed)));
    let none: [&str; 0] = [];
    assert!(matches!(clone.publish(Ticked { tick: 1 }, none), Err(BrokerError::Disposed)));
}

#[test]
fn dispose_stops_pending_work() {
    let (broker, factory) = Broker::manual();
    let channel = broker.commands("Stopping").unwrap();
    let calls = Calls::new();
    let _subscription = channel.subscribe(acking(&calls));
    channel.publish(Increment { by: 1 }).unwrap();

    broker.dispose();
    assert_eq!(factory.drain_all(), 0);
    assert_eq!(calls.get(), 0);
    assert!(matches!(
        channel.publish(Increment { by: 2 }),
        Err(BrokerError::Disposed)
    ));
}
