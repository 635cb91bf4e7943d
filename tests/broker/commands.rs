//! Command channels: competing consumers, mandatory acknowledgment.

use inproc_broker::{AckState, Broker, Envelope, HandlerError, Message};

use crate::support::{acking, silent, Calls, Increment, Seen};

// ============================================================================
// Scenario: one acking handler, two commands
// ============================================================================

#[test]
fn acking_handler_counts_two_commands() {
    let (broker, factory) = Broker::manual();
    let counter = Calls::new();
    let _subscription = broker.commands("Topic").unwrap().subscribe(acking(&counter));

    broker.send(Increment { by: 1 }, ["Topic"]).unwrap();
    broker.send(Increment { by: 1 }, ["Topic"]).unwrap();
    factory.drain_all();

    assert_eq!(counter.get(), 2);
}

// ============================================================================
// No subscriber, no work
// ============================================================================

#[test]
fn command_without_subscriber_waits() {
    let (broker, factory) = Broker::manual();
    let channel = broker.commands("Orders/Place").unwrap();
    broker.send(Increment { by: 1 }, ["Orders/Place"]).unwrap();

    assert!(!channel.has_work());
    assert!(!factory.has_work());
    assert_eq!(factory.drain_all(), 0);
    assert_eq!(channel.pending_count(), 1);

    let calls = Calls::new();
    let _subscription = channel.subscribe(acking(&calls));
    assert!(channel.has_work());
    assert_eq!(factory.drain_all(), 1);
    assert_eq!(calls.get(), 1);
}

// ============================================================================
// N acknowledged commands run exactly N times
// ============================================================================

#[test]
fn n_acknowledged_commands_run_exactly_n_times() {
    let (broker, factory) = Broker::manual();
    let channel = broker.commands("Work").unwrap();
    for by in 0..25 {
        channel.publish(Increment { by }).unwrap();
    }

    let calls = Calls::new();
    let _subscription = channel.subscribe(acking(&calls));
    assert_eq!(factory.drain_all(), 25);
    assert_eq!(calls.get(), 25);

    // Nothing left to redeliver.
    assert_eq!(factory.drain_all(), 0);
    let stats = channel.stats();
    assert_eq!(stats.published, 25);
    assert_eq!(stats.delivered, 25);
    assert_eq!(stats.acknowledged, 25);
    assert_eq!(stats.redelivered, 0);
}

// ============================================================================
// Silence is failure
// ============================================================================

#[test]
fn unacknowledged_command_is_redelivered_every_pass() {
    let (broker, factory) = Broker::manual();
    let channel = broker.commands("Poison").unwrap();
    let calls = Calls::new();
    let _subscription = channel.subscribe(silent(&calls));
    channel.publish(Increment { by: 1 }).unwrap();

    let mut previous = 0;
    for _ in 0..5 {
        factory.run_pass();
        let now = calls.get();
        assert!(now > previous, "invocations must keep growing: {} then {}", previous, now);
        previous = now;
    }

    assert_eq!(channel.pending_count(), 1);
    assert!(channel.stats().redelivered >= 5);
}

#[test]
fn redelivery_reuses_payload_with_fresh_state() {
    let (broker, factory) = Broker::manual();
    let channel = broker.commands("Retry").unwrap();
    let seen: Seen<(u32, AckState)> = Seen::new();
    let payloads: Seen<Envelope> = Seen::new();

    let record = seen.clone();
    let keep = payloads.clone();
    let _subscription = channel.subscribe_any(move |envelope: &Envelope| -> Result<(), HandlerError> {
        record.push((envelope.attempt(), envelope.state()));
        keep.push(envelope.clone());
        match envelope.attempt() {
            1 => Err(HandlerError::rejected("first attempt fails")),
            2 => Ok(envelope.nack()?),
            _ => Ok(envelope.ack()?),
        }
    });

    channel.publish(Increment { by: 9 }).unwrap();
    assert_eq!(factory.drain_all(), 3);

    assert_eq!(
        seen.all(),
        vec![
            (1, AckState::Initial),
            (2, AckState::Initial),
            (3, AckState::Initial)
        ]
    );
    let payloads = payloads.all();
    assert!(payloads[0].same_payload(&payloads[2]));
    assert!(!payloads[0].same_delivery(&payloads[2]));
    assert_eq!(payloads[2].downcast_ref::<Increment>(), Some(&Increment { by: 9 }));
}

// ============================================================================
// Competing consumers
// ============================================================================

#[test]
fn each_command_goes_to_exactly_one_subscriber() {
    let (broker, factory) = Broker::manual();
    let channel = broker.commands("Jobs").unwrap();
    let first = Calls::new();
    let second = Calls::new();
    let _a = channel.subscribe(acking(&first));
    let _b = channel.subscribe(acking(&second));

    for by in 0..10 {
        channel.publish(Increment { by }).unwrap();
    }
    assert_eq!(factory.drain_all(), 10);
    assert_eq!(first.get() + second.get(), 10);
    assert_eq!(channel.subscriber_count(), 2);
}

#[test]
fn failing_subscriber_hands_work_to_the_pool() {
    let (broker, factory) = Broker::manual();
    let channel = broker.commands("Jobs").unwrap();
    let refused = Calls::new();
    let refusing = refused.clone();
    let _refuser = channel.subscribe(move |_: &Message<Increment>| -> Result<(), HandlerError> {
        refusing.hit();
        Err(HandlerError::rejected("busy"))
    });

    channel.publish(Increment { by: 1 }).unwrap();
    assert_eq!(factory.drain_passes(3), 3);
    assert_eq!(refused.get(), 3);

    let accepted = Calls::new();
    let _acceptor = channel.subscribe(acking(&accepted));
    // The command bounces until the accepting subscriber picks it up.
    factory.drain_all();
    assert_eq!(accepted.get(), 1);
    assert_eq!(channel.pending_count(), 0);
}

// ============================================================================
// Typed handlers and mismatched payloads
// ============================================================================

#[test]
fn typed_handler_rejects_foreign_payload() {
    let (broker, factory) = Broker::manual();
    let channel = broker.commands("Mixed").unwrap();
    let calls = Calls::new();
    let _subscription = channel.subscribe(acking(&calls));

    channel.publish("not an increment").unwrap();
    factory.drain_passes(2);

    assert_eq!(calls.get(), 0);
    assert!(channel.stats().failed >= 2);
}

#[test]
fn one_payload_fans_out_to_several_command_topics() {
    let (broker, factory) = Broker::manual();
    let left: Seen<Envelope> = Seen::new();
    let right: Seen<Envelope> = Seen::new();

    let keep = left.clone();
    let _l = broker.commands("Left").unwrap().subscribe_any(move |e: &Envelope| -> Result<(), HandlerError> {
        keep.push(e.clone());
        Ok(e.ack()?)
    });
    let keep = right.clone();
    let _r = broker.commands("Right").unwrap().subscribe_any(move |e: &Envelope| -> Result<(), HandlerError> {
        keep.push(e.clone());
        Ok(e.ack()?)
    });

    broker.send(Increment { by: 4 }, ["Left", "Right"]).unwrap();
    assert_eq!(factory.drain_all(), 2);

    let (left, right) = (left.all(), right.all());
    assert!(left[0].same_payload(&right[0]));
    assert!(!left[0].same_delivery(&right[0]));
}
