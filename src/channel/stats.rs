use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time counters for one channel.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ChannelStats {
    /// Payloads accepted by `publish`.
    pub published: u64,
    /// Handler invocations started.
    pub delivered: u64,
    /// Deliveries whose handler acknowledged.
    pub acknowledged: u64,
    /// Command deliveries queued again after a failure or a missing ack.
    pub redelivered: u64,
    /// Handler invocations that returned an error or panicked.
    pub failed: u64,
}

#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    published: AtomicU64,
    delivered: AtomicU64,
    acknowledged: AtomicU64,
    redelivered: AtomicU64,
    failed: AtomicU64,
}

impl StatsCounters {
    pub(crate) fn published(&self) {
        self.published.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn acknowledged(&self) {
        self.acknowledged.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn redelivered(&self) {
        self.redelivered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> ChannelStats {
        ChannelStats {
            published: self.published.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            acknowledged: self.acknowledged.load(Ordering::Relaxed),
            redelivered: self.redelivered.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}
