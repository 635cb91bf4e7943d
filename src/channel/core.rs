//! State shared by command and event channels: identity, the subscriber
//! list, liveness accounting, the wake signal, and statistics.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};
use std::time::Duration;

use crossbeam::channel::Receiver;

use super::stats::StatsCounters;
use super::{ChannelKind, ChannelLifetime};
use crate::error::HandlerError;
use crate::message::Envelope;
use crate::scheduler::{panic_message, WaitOutcome, Wake};
use crate::topic::TopicName;

/// Type-erased handler as stored in a subscription.
pub(crate) type HandlerFn = dyn Fn(&Envelope) -> Result<(), HandlerError> + Send + Sync;

/// Hook run when a temporary channel loses its last live subscriber.
pub(crate) type EmptyHook = Arc<dyn Fn() + Send + Sync>;

static NEXT_CHANNEL_ID: AtomicU64 = AtomicU64::new(1);

/// Why a handler invocation did not succeed.
#[derive(Debug)]
pub(crate) enum Failure {
    Error(HandlerError),
    Panic(String),
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Failure::Error(err) => write!(f, "{}", err),
            Failure::Panic(message) => write!(f, "handler panicked: {}", message),
        }
    }
}

/// One registered handler.
pub(crate) struct SubscriptionState {
    id: u64,
    topic: TopicName,
    active: AtomicBool,
    handler: Box<HandlerFn>,
    /// The one in-flight command, if any.
    slot: Mutex<Option<Envelope>>,
    owner: Weak<ChannelCore>,
}

impl SubscriptionState {
    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn topic(&self) -> &TopicName {
        &self.topic
    }

    pub(crate) fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Deactivate and tell the owning channel. Returns false if already
    /// disposed.
    pub(crate) fn dispose(&self) -> bool {
        if !self.active.swap(false, Ordering::AcqRel) {
            return false;
        }
        if let Some(owner) = self.owner.upgrade() {
            owner.released();
        }
        true
    }

    /// Deactivate a subscription that was never activated.
    pub(crate) fn abandon(&self) {
        self.active.store(false, Ordering::Release);
    }

    pub(crate) fn load(&self, envelope: Envelope) {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(envelope);
    }

    pub(crate) fn unload(&self) -> Option<Envelope> {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Run the handler, converting a panic into a [`Failure`].
    pub(crate) fn invoke(&self, envelope: &Envelope) -> Result<(), Failure> {
        match panic::catch_unwind(AssertUnwindSafe(|| (self.handler)(envelope))) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(Failure::Error(err)),
            Err(payload) => Err(Failure::Panic(panic_message(payload.as_ref()).to_string())),
        }
    }
}

pub(crate) struct ChannelCore {
    id: u64,
    topic: TopicName,
    lifetime: ChannelLifetime,
    name: String,
    subscribers: RwLock<Vec<Arc<SubscriptionState>>>,
    live: AtomicUsize,
    dirty: AtomicBool,
    closed: AtomicBool,
    wake: Wake,
    pub(crate) stats: StatsCounters,
    next_subscription: AtomicU64,
    on_empty: Mutex<Option<EmptyHook>>,
}

impl ChannelCore {
    pub(crate) fn new(kind: ChannelKind, topic: TopicName, lifetime: ChannelLifetime) -> Arc<Self> {
        let name = format!("{}:{}", kind, topic);
        Arc::new(Self {
            id: NEXT_CHANNEL_ID.fetch_add(1, Ordering::Relaxed),
            topic,
            lifetime,
            name,
            subscribers: RwLock::new(Vec::new()),
            live: AtomicUsize::new(0),
            dirty: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            wake: Wake::new(),
            stats: StatsCounters::default(),
            next_subscription: AtomicU64::new(1),
            on_empty: Mutex::new(None),
        })
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn topic(&self) -> &TopicName {
        &self.topic
    }

    pub(crate) fn lifetime(&self) -> ChannelLifetime {
        self.lifetime
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    /// Build a subscription that is not yet visible to matching.
    pub(crate) fn prepare(self: &Arc<Self>, handler: Box<HandlerFn>) -> Arc<SubscriptionState> {
        Arc::new(SubscriptionState {
            id: self.next_subscription.fetch_add(1, Ordering::Relaxed),
            topic: self.topic.clone(),
            active: AtomicBool::new(true),
            handler,
            slot: Mutex::new(None),
            owner: Arc::downgrade(self),
        })
    }

    /// Count a prepared subscription as live and add it to the subscriber
    /// list.
    pub(crate) fn activate(&self, subscription: &Arc<SubscriptionState>) {
        self.live.fetch_add(1, Ordering::AcqRel);
        self.subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::clone(subscription));
        self.wake.notify();
    }

    fn released(&self) {
        self.dirty.store(true, Ordering::Release);
        let previous = self.live.fetch_sub(1, Ordering::AcqRel);
        self.wake.notify();
        if previous == 1 && self.lifetime == ChannelLifetime::Temporary {
            let hook = self
                .on_empty
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone();
            if let Some(hook) = hook {
                hook();
            }
        }
    }

    /// Drop disposed subscriptions from the subscriber list. Returns true
    /// if anything had been disposed since the last pass.
    pub(crate) fn collect(&self) -> bool {
        if !self.dirty.swap(false, Ordering::AcqRel) {
            return false;
        }
        self.subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|subscription| subscription.is_active());
        true
    }

    pub(crate) fn active_subscribers(&self) -> Vec<Arc<SubscriptionState>> {
        self.subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|subscription| subscription.is_active())
            .cloned()
            .collect()
    }

    pub(crate) fn live(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }

    pub(crate) fn set_on_empty(&self, hook: EmptyHook) {
        *self.on_empty.lock().unwrap_or_else(PoisonError::into_inner) = Some(hook);
    }

    pub(crate) fn notify(&self) {
        self.wake.notify();
    }

    pub(crate) fn wait_for_signal(&self, timeout: Duration, cancel: &Receiver<()>) -> bool {
        matches!(self.wake.wait(timeout, cancel), WaitOutcome::Woken)
    }

    pub(crate) fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.wake.notify();
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}
