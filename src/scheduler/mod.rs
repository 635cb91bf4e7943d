//! Schedulers - execution strategies that drive a [`WorkSource`].
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────┐        ┌──────────────────────────────┐
//! │ SchedulerFactory          │ create │ Scheduler (bound to 1 source)│
//! │  ManualSchedulerFactory   │──────▶ │  ManualScheduler  (tests)    │
//! │  ThreadSchedulerFactory   │        │  ThreadScheduler  (1 thread) │
//! └───────────────────────────┘        └──────────────┬───────────────┘
//!                                                     │ take(timeout)
//!                                                     ▼
//!                                      ┌──────────────────────────────┐
//!                                      │ WorkSource                   │
//!                                      │  CollectSource<channel>      │
//!                                      │  ActionQueue                 │
//!                                      └──────────────────────────────┘
//! ```
//!
//! A scheduler repeatedly takes one [`WorkItem`] from its source and runs
//! it. The manual scheduler does this only when asked, on the caller's
//! thread. The thread scheduler owns a worker thread that loops until it
//! is stopped or its source completes.

mod manual;
mod source;
mod thread;

use std::any::Any;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use crossbeam::channel::Receiver;

pub use manual::{ManualScheduler, ManualSchedulerFactory};
pub use source::{ActionQueue, Collect, CollectSource};
pub use thread::{SchedulerStats, ThreadScheduler, ThreadSchedulerFactory};

pub(crate) use source::{WaitOutcome, Wake};

/// One executable unit of work.
pub type WorkItem = Box<dyn FnOnce() + Send + 'static>;

/// Default bound on a single wait for work.
pub const DEFAULT_WAIT: Duration = Duration::from_secs(2);

/// Something a scheduler can pull work from.
pub trait WorkSource: Send + Sync {
    /// Name used for logging and worker thread names.
    fn name(&self) -> &str;

    /// Whether a call to [`WorkSource::take`] may currently produce work.
    fn has_work(&self) -> bool;

    /// True once the source will never produce work again.
    fn is_completed(&self) -> bool;

    /// Obtain one unit of work, waiting up to `timeout`.
    ///
    /// Returns `None` on timeout, on completion, or as soon as `cancel`
    /// becomes ready (a message or a disconnect).
    fn take(&self, timeout: Duration, cancel: &Receiver<()>) -> Option<WorkItem>;
}

/// An execution strategy bound to exactly one [`WorkSource`].
pub trait Scheduler: Send + Sync {
    fn name(&self) -> &str;

    /// Stop pulling work. Work already running finishes. Idempotent.
    fn shutdown(&self);
}

/// Creates one scheduler per work source.
pub trait SchedulerFactory: Send + Sync {
    fn create(&self, source: Arc<dyn WorkSource>) -> io::Result<Arc<dyn Scheduler>>;
}

/// Best-effort text of a caught panic.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}
