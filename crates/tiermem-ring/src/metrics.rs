/// Metrics for monitoring ring/channel throughput and backpressure.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsSnapshot {
    pub messages_sent: u64,
    pub messages_received: u64,
    pub batches_sent: u64,
    pub batches_received: u64,
    /// Count of `push` attempts that found the ring full (spec 4.C failure mode,
    /// 4.K dropped-event accounting, 7: "dropped events are counted").
    pub full_events: u64,
}

#[derive(Debug, Default)]
pub struct Metrics {
    messages_sent: std::sync::atomic::AtomicU64,
    messages_received: std::sync::atomic::AtomicU64,
    batches_sent: std::sync::atomic::AtomicU64,
    batches_received: std::sync::atomic::AtomicU64,
    full_events: std::sync::atomic::AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add_messages_sent(&self, n: u64) {
        self.messages_sent
            .fetch_add(n, std::sync::atomic::Ordering::Relaxed);
    }

    pub(crate) fn add_messages_received(&self, n: u64) {
        self.messages_received
            .fetch_add(n, std::sync::atomic::Ordering::Relaxed);
    }

    pub(crate) fn add_batches_sent(&self, n: u64) {
        self.batches_sent
            .fetch_add(n, std::sync::atomic::Ordering::Relaxed);
    }

    pub(crate) fn add_batches_received(&self, n: u64) {
        self.batches_received
            .fetch_add(n, std::sync::atomic::Ordering::Relaxed);
    }

    pub(crate) fn add_full_event(&self) {
        self.full_events
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        use std::sync::atomic::Ordering::Relaxed;
        MetricsSnapshot {
            messages_sent: self.messages_sent.load(Relaxed),
            messages_received: self.messages_received.load(Relaxed),
            batches_sent: self.batches_sent.load(Relaxed),
            batches_received: self.batches_received.load(Relaxed),
            full_events: self.full_events.load(Relaxed),
        }
    }
}
