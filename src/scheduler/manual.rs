//! Deterministic, caller-driven scheduling for tests and demos.

use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use crossbeam::channel::{self, Receiver};

use super::{Scheduler, SchedulerFactory, WorkSource};

/// Runs work from its source only when asked, on the calling thread.
pub struct ManualScheduler {
    source: Arc<dyn WorkSource>,
    wait: Duration,
    never: Receiver<()>,
    stopped: AtomicBool,
    executed: AtomicUsize,
}

impl ManualScheduler {
    pub fn new(source: Arc<dyn WorkSource>, wait: Duration) -> Self {
        Self {
            source,
            wait,
            never: channel::never(),
            stopped: AtomicBool::new(false),
            executed: AtomicUsize::new(0),
        }
    }

    /// Execute at most one unit of work.
    ///
    /// Returns false without waiting when the source reports no work.
    /// Returns true only if a unit of work actually ran.
    pub fn execute_once(&self) -> bool {
        if self.stopped.load(Ordering::Acquire)
            || self.source.is_completed()
            || !self.source.has_work()
        {
            return false;
        }
        match self.source.take(self.wait, &self.never) {
            Some(work) => {
                work();
                self.executed.fetch_add(1, Ordering::Relaxed);
                true
            }
            None => false,
        }
    }

    /// Execute until the source has nothing runnable. Returns the count.
    ///
    /// Does not terminate while a handler keeps refusing to acknowledge a
    /// command; use [`ManualScheduler::drain_limit`] for those cases.
    pub fn drain(&self) -> usize {
        let mut count = 0;
        while self.execute_once() {
            count += 1;
        }
        count
    }

    /// Like [`ManualScheduler::drain`], but runs at most `max` units.
    pub fn drain_limit(&self, max: usize) -> usize {
        let mut count = 0;
        while count < max && self.execute_once() {
            count += 1;
        }
        count
    }

    pub fn has_work(&self) -> bool {
        self.source.has_work()
    }

    /// Total units executed over this scheduler's lifetime.
    pub fn executed(&self) -> usize {
        self.executed.load(Ordering::Relaxed)
    }
}

impl Scheduler for ManualScheduler {
    fn name(&self) -> &str {
        self.source.name()
    }

    fn shutdown(&self) {
        self.stopped.store(true, Ordering::Release);
    }
}

/// Creates [`ManualScheduler`]s and drains all of them together.
///
/// The factory only keeps weak references: a scheduler disappears from
/// [`ManualSchedulerFactory::drain_all`] once its channel is dropped.
pub struct ManualSchedulerFactory {
    wait: Duration,
    schedulers: Mutex<Vec<Weak<ManualScheduler>>>,
}

impl Default for ManualSchedulerFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualSchedulerFactory {
    pub fn new() -> Self {
        Self::with_wait(Duration::ZERO)
    }

    /// Use `wait` as the bound for each wait-and-execute step.
    pub fn with_wait(wait: Duration) -> Self {
        Self {
            wait,
            schedulers: Mutex::new(Vec::new()),
        }
    }

    /// Live schedulers, in creation order.
    pub fn schedulers(&self) -> Vec<Arc<ManualScheduler>> {
        let mut guard = self
            .schedulers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        guard.retain(|weak| weak.strong_count() > 0);
        guard.iter().filter_map(Weak::upgrade).collect()
    }

    /// One pass: each live scheduler executes at most one unit of work.
    pub fn run_pass(&self) -> usize {
        self.schedulers()
            .iter()
            .filter(|scheduler| scheduler.execute_once())
            .count()
    }

    /// Drain every scheduler, repeating full passes until one pass executes
    /// nothing. Work executed in one scheduler may enqueue work for another
    /// (redelivery, chained publishes), hence the outer loop.
    pub fn drain_all(&self) -> usize {
        let mut total = 0;
        loop {
            let executed: usize = self.schedulers().iter().map(|s| s.drain()).sum();
            if executed == 0 {
                return total;
            }
            total += executed;
        }
    }

    /// Run [`ManualSchedulerFactory::run_pass`] up to `max_passes` times,
    /// stopping early on a pass that executes nothing.
    pub fn drain_passes(&self, max_passes: usize) -> usize {
        let mut total = 0;
        for _ in 0..max_passes {
            let executed = self.run_pass();
            if executed == 0 {
                break;
            }
            total += executed;
        }
        total
    }

    pub fn has_work(&self) -> bool {
        self.schedulers().iter().any(|s| s.has_work())
    }

    /// Infallible form of [`SchedulerFactory::create`] that keeps the
    /// concrete type.
    pub fn create_manual(&self, source: Arc<dyn WorkSource>) -> Arc<ManualScheduler> {
        let scheduler = Arc::new(ManualScheduler::new(source, self.wait));
        self.schedulers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::downgrade(&scheduler));
        scheduler
    }
}

impl SchedulerFactory for ManualSchedulerFactory {
    fn create(&self, source: Arc<dyn WorkSource>) -> io::Result<Arc<dyn Scheduler>> {
        Ok(self.create_manual(source))
    }
}
