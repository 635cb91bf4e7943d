//! Event channels: fan-out, no redelivery, failures isolated per subscriber.

use std::sync::Arc;

use inproc_broker::{AckError, AckState, Broker, Envelope, HandlerError, Message};

use crate::support::{Calls, Seen, Ticked, WriteCommitted};

#[test]
fn subscriber_sees_event_once_without_acknowledging() {
    let (broker, factory) = Broker::manual();
    let seen: Seen<Ticked> = Seen::new();
    let record = seen.clone();
    let _subscription = broker
        .events("Topic")
        .unwrap()
        .subscribe(move |event: &Message<Ticked>| -> Result<(), HandlerError> {
            record.push(event.payload().clone());
            Ok(())
        });

    broker.publish(Ticked { tick: 1 }, ["Topic"]).unwrap();
    assert_eq!(factory.drain_all(), 1);
    assert_eq!(seen.all(), vec![Ticked { tick: 1 }]);

    // Not acknowledged, and still not redelivered.
    assert_eq!(factory.drain_all(), 0);
    assert_eq!(seen.len(), 1);
}

#[test]
fn every_subscriber_gets_every_event() {
    let (broker, factory) = Broker::manual();
    let channel = broker.events("Clock").unwrap();
    let counters: Vec<Calls> = (0..3).map(|_| Calls::new()).collect();
    let _subscriptions: Vec<_> = counters
        .iter()
        .map(|calls| {
            let calls = calls.clone();
            channel.subscribe(move |_: &Message<Ticked>| -> Result<(), HandlerError> {
                calls.hit();
                Ok(())
            })
        })
        .collect();

    for tick in 0..4 {
        channel.publish(Ticked { tick }).unwrap();
    }
    assert_eq!(factory.drain_all(), 12);
    assert!(counters.iter().all(|calls| calls.get() == 4));
    assert_eq!(channel.stats().delivered, 12);
}

#[test]
fn failing_subscriber_does_not_disturb_others_or_publisher() {
    let (broker, factory) = Broker::manual();
    let channel = broker.events("Fragile").unwrap();
    let healthy = Calls::new();
    let counted = healthy.clone();
    let _ok = channel.subscribe(move |_: &Message<Ticked>| -> Result<(), HandlerError> {
        counted.hit();
        Ok(())
    });
    let _err = channel.subscribe(|_: &Message<Ticked>| -> Result<(), HandlerError> {
        Err(HandlerError::rejected("always fails"))
    });
    let _panics = channel.subscribe(|_: &Message<Ticked>| -> Result<(), HandlerError> {
        panic!("subscriber bug")
    });

    assert!(broker.publish(Ticked { tick: 7 }, ["Fragile"]).is_ok());
    assert_eq!(factory.drain_all(), 3);
    assert_eq!(healthy.get(), 1);

    let stats = channel.stats();
    assert_eq!(stats.failed, 2);
    assert_eq!(stats.redelivered, 0);
    assert_eq!(factory.drain_all(), 0);
}

#[test]
fn acknowledgment_rules_still_apply_inside_event_handlers() {
    let (broker, factory) = Broker::manual();
    let outcomes: Seen<Result<(), AckError>> = Seen::new();
    let record = outcomes.clone();
    let _subscription = broker
        .events("Acks")
        .unwrap()
        .subscribe(move |event: &Message<Ticked>| -> Result<(), HandlerError> {
            record.push(event.ack());
            record.push(event.ack());
            record.push(event.nack());
            Ok(())
        });

    broker.publish(Ticked { tick: 0 }, ["Acks"]).unwrap();
    factory.drain_all();

    let outcomes = outcomes.all();
    assert_eq!(outcomes[0], Ok(()));
    assert_eq!(outcomes[1], Ok(()));
    assert_eq!(
        outcomes[2],
        Err(AckError::Conflict {
            current: AckState::Acknowledged,
            requested: AckState::NotAcknowledged,
        })
    );
}

#[test]
fn typed_and_untyped_views_share_payload_and_state() {
    let (broker, factory) = Broker::manual();
    let checks = Calls::new();
    let passed = checks.clone();
    let _subscription = broker
        .events("Views")
        .unwrap()
        .subscribe_any(move |envelope: &Envelope| -> Result<(), HandlerError> {
            let typed: Message<Ticked> = envelope.to_message().ok_or_else(|| HandlerError::PayloadType {
                expected: "Ticked",
                actual: envelope.type_name(),
            })?;
            typed.nack()?;
            let back = typed.to_envelope();

            assert_eq!(envelope.state(), AckState::NotAcknowledged);
            assert!(back.same_payload(envelope));
            assert!(back.same_delivery(envelope));
            let again: Message<Ticked> = back.downcast().map_err(|_| HandlerError::rejected("lost type"))?;
            assert!(Arc::ptr_eq(&again.payload_arc(), &typed.payload_arc()));
            passed.hit();
            Ok(())
        });

    broker.publish(Ticked { tick: 3 }, ["Views"]).unwrap();
    factory.drain_all();
    assert_eq!(checks.get(), 1);
}

#[test]
fn notification_from_a_store_is_accepted_as_any_payload() {
    let (broker, factory) = Broker::manual();
    let operations: Seen<String> = Seen::new();
    let record = operations.clone();
    let _subscription = broker
        .events("Store/Committed")
        .unwrap()
        .subscribe(move |event: &Message<String>| -> Result<(), HandlerError> {
            let notification: WriteCommitted = serde_json::from_str(event.payload())?;
            record.push(notification.operation);
            Ok(())
        });

    let body = serde_json::to_string(&WriteCommitted {
        operation: "append".to_string(),
        timestamp_ms: 1_700_000_000_000,
    })
    .unwrap();
    broker.publish(body, ["Store/Committed"]).unwrap();
    broker.publish("{not json".to_string(), ["Store/Committed"]).unwrap();
    assert_eq!(factory.drain_all(), 2);

    assert_eq!(operations.all(), vec!["append".to_string()]);
    let stats = broker.events("Store/Committed").unwrap().stats();
    assert_eq!(stats.failed, 1);
}

#[test]
fn publish_to_several_topics_reaches_each() {
    let (broker, factory) = Broker::manual();
    let a = Calls::new();
    let b = Calls::new();
    let (ca, cb) = (a.clone(), b.clone());
    let _a = broker.events("A").unwrap().subscribe(move |_: &Message<Ticked>| -> Result<(), HandlerError> {
        ca.hit();
        Ok(())
    });
    let _b = broker.events("B").unwrap().subscribe(move |_: &Message<Ticked>| -> Result<(), HandlerError> {
        cb.hit();
        Ok(())
    });

    broker.publish(Ticked { tick: 1 }, ["A", "B", "A"]).unwrap();
    factory.drain_all();
    assert_eq!(a.get(), 2);
    assert_eq!(b.get(), 1);
}
