//! Background thread scheduling.
//!
//! `ThreadScheduler` spawns one worker thread per work source. The thread
//! waits (bounded) for work, runs it inline, and repeats until stopped.
//! Stopping disconnects a cancel channel that the wait selects on, so a
//! worker blocked on an idle source exits right away instead of at the end
//! of its wait bound.

use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, Sender};
use tracing::{debug, error};

use super::{panic_message, Scheduler, SchedulerFactory, WorkSource, DEFAULT_WAIT};
use crate::config::BrokerConfig;

/// Statistics from a scheduler thread.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Units of work that ran to completion.
    pub executed: usize,
    /// Units of work (or waits) that panicked.
    pub panics: usize,
    /// Wait cycles started.
    pub polls: usize,
}

/// A scheduler that owns a dedicated worker thread.
///
/// ## Example
///
/// ```
/// use std::sync::Arc;
/// use std::time::Duration;
/// use inproc_broker::scheduler::{ActionQueue, ThreadScheduler};
///
/// let queue = Arc::new(ActionQueue::new("actions"));
/// let scheduler = ThreadScheduler::spawn(queue.clone(), Duration::from_millis(50), "demo").unwrap();
///
/// let (tx, rx) = std::sync::mpsc::channel();
/// queue.post(Box::new(move || tx.send(42).unwrap()));
/// assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 42);
///
/// let stats = scheduler.stop();
/// assert_eq!(stats.executed, 1);
/// ```
pub struct ThreadScheduler {
    name: String,
    stopping: Arc<AtomicBool>,
    cancel_tx: Mutex<Option<Sender<()>>>,
    handle: Mutex<Option<JoinHandle<SchedulerStats>>>,
}

impl ThreadScheduler {
    /// Spawn a worker thread named `thread_name` driving `source`.
    pub fn spawn(
        source: Arc<dyn WorkSource>,
        wait: Duration,
        thread_name: &str,
    ) -> io::Result<Self> {
        let (cancel_tx, cancel_rx) = channel::bounded::<()>(0);
        let stopping = Arc::new(AtomicBool::new(false));
        let name = source.name().to_string();

        let worker_stopping = Arc::clone(&stopping);
        let handle = thread::Builder::new()
            .name(thread_name.to_string())
            .spawn(move || {
                let mut stats = SchedulerStats::default();
                debug!(source = source.name(), "scheduler thread started");

                loop {
                    if worker_stopping.load(Ordering::Acquire) || source.is_completed() {
                        break;
                    }

                    stats.polls += 1;

                    let taken =
                        panic::catch_unwind(AssertUnwindSafe(|| source.take(wait, &cancel_rx)));
                    match taken {
                        Ok(Some(work)) => match panic::catch_unwind(AssertUnwindSafe(work)) {
                            Ok(()) => stats.executed += 1,
                            Err(payload) => {
                                stats.panics += 1;
                                error!(
                                    source = source.name(),
                                    panic = panic_message(payload.as_ref()),
                                    "work item panicked"
                                );
                            }
                        },
                        Ok(None) => {
                            // Timed out, cancelled, or completed; re-check the loop guard.
                        }
                        Err(payload) => {
                            stats.panics += 1;
                            error!(
                                source = source.name(),
                                panic = panic_message(payload.as_ref()),
                                "work source panicked while waiting"
                            );
                        }
                    }
                }

                debug!(
                    source = source.name(),
                    executed = stats.executed,
                    panics = stats.panics,
                    "scheduler thread stopped"
                );
                stats
            })?;

        Ok(Self {
            name,
            stopping,
            cancel_tx: Mutex::new(Some(cancel_tx)),
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Signal the worker to stop without waiting for it.
    pub fn signal_stop(&self) {
        self.stopping.store(true, Ordering::Release);
        // Dropping the sender disconnects the cancel channel, which wakes
        // any wait in progress.
        self.cancel_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    /// Signal the worker to stop and wait for it to finish.
    /// Returns the worker's statistics.
    ///
    /// Called from the worker thread itself this only signals, and returns
    /// default statistics.
    pub fn stop(&self) -> SchedulerStats {
        self.signal_stop();
        let handle = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match handle {
            Some(handle) if handle.thread().id() != thread::current().id() => {
                handle.join().unwrap_or_default()
            }
            _ => SchedulerStats::default(),
        }
    }

    pub fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::Acquire)
    }
}

impl Scheduler for ThreadScheduler {
    fn name(&self) -> &str {
        &self.name
    }

    fn shutdown(&self) {
        self.signal_stop();
    }
}

impl Drop for ThreadScheduler {
    fn drop(&mut self) {
        self.signal_stop();
    }
}

/// Creates one [`ThreadScheduler`] per work source.
pub struct ThreadSchedulerFactory {
    wait: Duration,
    thread_name_prefix: String,
    spawned: AtomicUsize,
}

impl Default for ThreadSchedulerFactory {
    fn default() -> Self {
        Self::new(DEFAULT_WAIT)
    }
}

impl ThreadSchedulerFactory {
    pub fn new(wait: Duration) -> Self {
        Self {
            wait,
            thread_name_prefix: "broker".to_string(),
            spawned: AtomicUsize::new(0),
        }
    }

    pub fn from_config(config: &BrokerConfig) -> Self {
        Self {
            wait: config.wait_timeout(),
            thread_name_prefix: config.thread_name_prefix.clone(),
            spawned: AtomicUsize::new(0),
        }
    }

    pub fn wait(&self) -> Duration {
        self.wait
    }

    /// Number of worker threads spawned so far.
    pub fn spawned(&self) -> usize {
        self.spawned.load(Ordering::Relaxed)
    }
}

impl SchedulerFactory for ThreadSchedulerFactory {
    fn create(&self, source: Arc<dyn WorkSource>) -> io::Result<Arc<dyn Scheduler>> {
        let index = self.spawned.fetch_add(1, Ordering::Relaxed);
        let thread_name = format!("{}-{}", self.thread_name_prefix, index);
        let scheduler = ThreadScheduler::spawn(source, self.wait, &thread_name)?;
        Ok(Arc::new(scheduler))
    }
}
