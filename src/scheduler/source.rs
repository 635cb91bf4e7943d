//! Work source adapters.
//!
//! - [`CollectSource`] polls a channel: cleanup first, then one matching
//!   attempt, then a wait on the channel's wake signal.
//! - [`ActionQueue`] is a plain queue of ready-to-run actions.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, Sender};

use super::{WorkItem, WorkSource};

/// Coalescing wake-up signal.
///
/// At most one pending wake is stored, so a notify that happens between a
/// failed match and the following wait is never lost.
pub(crate) struct Wake {
    tx: Sender<()>,
    rx: Receiver<()>,
}

pub(crate) enum WaitOutcome {
    Woken,
    TimedOut,
    Cancelled,
}

impl Wake {
    pub(crate) fn new() -> Self {
        let (tx, rx) = channel::bounded(1);
        Self { tx, rx }
    }

    pub(crate) fn notify(&self) {
        let _ = self.tx.try_send(());
    }

    pub(crate) fn wait(&self, timeout: Duration, cancel: &Receiver<()>) -> WaitOutcome {
        crossbeam::select! {
            recv(self.rx) -> _ => WaitOutcome::Woken,
            recv(cancel) -> _ => WaitOutcome::Cancelled,
            default(timeout) => WaitOutcome::TimedOut,
        }
    }
}

/// The side of a channel that a [`CollectSource`] drives.
pub trait Collect: Send + Sync + 'static {
    fn source_name(&self) -> &str;

    /// Drop disposed subscriptions from internal bookkeeping.
    fn collect(&self);

    /// One matching attempt. `None` means no work right now.
    fn try_match(&self) -> Option<WorkItem>;

    /// Whether a match may currently succeed.
    fn may_match(&self) -> bool;

    fn is_closed(&self) -> bool;

    /// Block until the channel signals new work, `timeout` elapses, or
    /// `cancel` fires. Returns false unless woken.
    fn wait_for_signal(&self, timeout: Duration, cancel: &Receiver<()>) -> bool;
}

/// Collect adapter: exposes a channel's match cycle as a [`WorkSource`].
pub struct CollectSource<C> {
    channel: Arc<C>,
}

impl<C: Collect> CollectSource<C> {
    pub fn new(channel: Arc<C>) -> Self {
        Self { channel }
    }
}

impl<C: Collect> WorkSource for CollectSource<C> {
    fn name(&self) -> &str {
        self.channel.source_name()
    }

    fn has_work(&self) -> bool {
        self.channel.may_match()
    }

    fn is_completed(&self) -> bool {
        self.channel.is_closed()
    }

    fn take(&self, timeout: Duration, cancel: &Receiver<()>) -> Option<WorkItem> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.channel.is_closed() {
                return None;
            }
            self.channel.collect();
            if let Some(work) = self.channel.try_match() {
                return Some(work);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() || !self.channel.wait_for_signal(remaining, cancel) {
                return None;
            }
        }
    }
}

/// Execute adapter: a queue of ready-to-run actions.
///
/// ## Example
///
/// ```
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use inproc_broker::scheduler::{ActionQueue, ManualSchedulerFactory, SchedulerFactory};
///
/// let factory = ManualSchedulerFactory::new();
/// let queue = Arc::new(ActionQueue::new("actions"));
/// let _scheduler = factory.create(queue.clone()).unwrap();
///
/// let runs = Arc::new(AtomicUsize::new(0));
/// let counter = Arc::clone(&runs);
/// queue.post(Box::new(move || { counter.fetch_add(1, Ordering::SeqCst); }));
///
/// assert_eq!(factory.drain_all(), 1);
/// assert_eq!(runs.load(Ordering::SeqCst), 1);
/// ```
pub struct ActionQueue {
    name: String,
    tx: Sender<WorkItem>,
    rx: Receiver<WorkItem>,
    closed: AtomicBool,
}

impl ActionQueue {
    pub fn new(name: impl Into<String>) -> Self {
        let (tx, rx) = channel::unbounded();
        Self {
            name: name.into(),
            tx,
            rx,
            closed: AtomicBool::new(false),
        }
    }

    /// Queue an action. Returns false once the queue is closed.
    pub fn post(&self, action: WorkItem) -> bool {
        if self.closed.load(Ordering::Acquire) {
            return false;
        }
        self.tx.send(action).is_ok()
    }

    /// Stop accepting actions. Already queued actions still run.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

impl WorkSource for ActionQueue {
    fn name(&self) -> &str {
        &self.name
    }

    fn has_work(&self) -> bool {
        !self.rx.is_empty()
    }

    fn is_completed(&self) -> bool {
        self.closed.load(Ordering::Acquire) && self.rx.is_empty()
    }

    fn take(&self, timeout: Duration, cancel: &Receiver<()>) -> Option<WorkItem> {
        if self.is_completed() {
            return None;
        }
        crossbeam::select! {
            recv(self.rx) -> action => action.ok(),
            recv(cancel) -> _ => None,
            default(timeout) => None,
        }
    }
}
