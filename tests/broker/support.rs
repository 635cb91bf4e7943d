//! Shared payloads and helpers.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use inproc_broker::{HandlerError, Message};
use serde::{Deserialize, Serialize};

/// Command payload used across tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Increment {
    pub by: usize,
}

/// Event payload used across tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticked {
    pub tick: u32,
}

/// Notification an event store would publish after a durable write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteCommitted {
    pub operation: String,
    pub timestamp_ms: u64,
}

/// Thread-safe invocation counter.
#[derive(Clone, Default)]
pub struct Calls(Arc<AtomicUsize>);

impl Calls {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hit(&self) -> usize {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

/// Thread-safe record of values seen by handlers.
#[derive(Clone)]
pub struct Seen<T>(Arc<Mutex<Vec<T>>>);

impl<T: Clone> Seen<T> {
    pub fn new() -> Self {
        Self(Arc::new(Mutex::new(Vec::new())))
    }

    pub fn push(&self, value: T) {
        self.0.lock().unwrap().push(value);
    }

    pub fn all(&self) -> Vec<T> {
        self.0.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.0.lock().unwrap().len()
    }
}

/// Handler that counts and acknowledges every `Increment`.
pub fn acking(calls: &Calls) -> impl Fn(&Message<Increment>) -> Result<(), HandlerError> {
    let calls = calls.clone();
    move |message| {
        calls.hit();
        message.ack()?;
        Ok(())
    }
}

/// Handler that counts every `Increment` and never acknowledges.
pub fn silent(calls: &Calls) -> impl Fn(&Message<Increment>) -> Result<(), HandlerError> {
    let calls = calls.clone();
    move |_| {
        calls.hit();
        Ok(())
    }
}

/// Poll `condition` until it holds or five seconds pass.
pub fn eventually(condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    condition()
}
