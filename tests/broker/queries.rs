//! Request/response over command channels.

use std::time::Duration;

use inproc_broker::{Broker, BrokerError, HandlerError, Message};

use crate::support::Calls;

#[derive(Debug)]
struct Double(u32);

#[derive(Debug)]
struct Lookup {
    key: &'static str,
}

#[test]
fn responder_answers_request() {
    let (broker, factory) = Broker::manual();
    let _responder = broker
        .commands("Math/Double")
        .unwrap()
        .subscribe_query(|q: &Message<Double>| -> Result<u32, HandlerError> { Ok(q.payload().0 * 2) });

    let pending = broker.request::<Double, u32>(Double(21), "Math/Double").unwrap();
    assert!(pending.try_take().is_none());
    assert_eq!(factory.drain_all(), 1);
    assert_eq!(pending.wait(Duration::ZERO).unwrap(), 42);
}

#[test]
fn failed_answer_is_retried() {
    let (broker, factory) = Broker::manual();
    let calls = Calls::new();
    let counted = calls.clone();
    let channel = broker.commands("Config/Lookup").unwrap();
    let _responder = channel.subscribe_query(move |q: &Message<Lookup>| -> Result<String, HandlerError> {
        if counted.hit() == 1 {
            return Err(HandlerError::rejected("cache cold"));
        }
        Ok(format!("{}=on", q.payload().key))
    });

    let pending = channel.request::<Lookup, String>(Lookup { key: "feature" }).unwrap();
    assert_eq!(factory.drain_all(), 2);
    assert_eq!(pending.try_take().as_deref(), Some("feature=on"));
    assert_eq!(calls.get(), 2);
    assert_eq!(channel.stats().redelivered, 1);
    assert_eq!(channel.stats().acknowledged, 1);
}

#[test]
fn request_without_responder_times_out() {
    let (broker, factory) = Broker::manual();
    let pending = broker.request::<Double, u32>(Double(1), "Nobody/Home").unwrap();
    factory.drain_all();

    let err = pending.wait(Duration::from_millis(10)).unwrap_err();
    assert!(matches!(err, BrokerError::ReplyTimeout { .. }));
    assert_eq!(pending.topic().as_str(), "Nobody/Home");
}

#[test]
fn closing_the_channel_drops_the_request() {
    let (broker, _factory) = Broker::manual();
    let pending = broker.request::<Double, u32>(Double(1), "Closing").unwrap();
    broker.dispose();
    assert!(matches!(
        pending.wait(Duration::from_millis(10)),
        Err(BrokerError::ReplyDropped { .. })
    ));
}
