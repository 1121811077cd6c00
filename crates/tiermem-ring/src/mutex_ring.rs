//! Mutex-backed ring with the same external surface as [`crate::ring::Ring`].
//!
//! Compiled in under the `mutex-ring` feature (spec 4.C: "a compile-time
//! alternative replaces the lock-free protocol with a mutex (identical
//! external behavior)"). Useful on platforms/tests where the lock-free
//! sequence-number protocol is harder to reason about than a plain mutex.

use crate::{Config, Metrics, MetricsSnapshot, Reservation};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

pub struct Ring<T> {
    queue: Mutex<VecDeque<T>>,
    capacity: usize,
    closed: AtomicBool,
    metrics: Metrics,
    config: Config,
}

impl<T> Ring<T> {
    pub fn new(config: Config) -> Self {
        Self {
            queue: Mutex::new(VecDeque::with_capacity(config.capacity())),
            capacity: config.capacity(),
            closed: AtomicBool::new(false),
            metrics: Metrics::new(),
            config,
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.queue.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub(crate) fn set_active(&self, _active: bool) {}

    /// `reserve` has no zero-copy counterpart over a `Mutex<VecDeque<T>>`;
    /// callers needing the `Reservation` API should use the default
    /// lock-free ring. `push`/`consume_*` remain available either way.
    pub fn reserve(&self, _n: usize) -> Option<Reservation<'_, T>> {
        None
    }

    pub fn reserve_with_backoff(&self, _n: usize) -> Option<Reservation<'_, T>> {
        None
    }

    /// Never invoked: `reserve`/`reserve_with_backoff` always return `None`
    /// for this backend, so no live `Reservation` can call back into it.
    /// Kept so [`Reservation`] can stay generic over either ring backend.
    pub(crate) fn commit_internal(&self, _n: usize) {
        unreachable!("mutex-ring never hands out a Reservation to commit")
    }

    pub fn push(&self, item: T) -> bool {
        if self.closed.load(Ordering::Acquire) {
            return false;
        }
        let mut q = self.queue.lock().unwrap();
        if q.len() >= self.capacity {
            if self.config.enable_metrics {
                self.metrics.add_full_event();
            }
            return false;
        }
        q.push_back(item);
        if self.config.enable_metrics {
            self.metrics.add_messages_sent(1);
            self.metrics.add_batches_sent(1);
        }
        true
    }

    pub fn consume_batch<F>(&self, handler: F) -> usize
    where
        F: FnMut(&T),
    {
        self.consume_up_to(usize::MAX, handler)
    }

    pub fn consume_up_to<F>(&self, max_items: usize, mut handler: F) -> usize
    where
        F: FnMut(&T),
    {
        let mut q = self.queue.lock().unwrap();
        let n = q.len().min(max_items);
        for item in q.drain(..n) {
            handler(&item);
        }
        if n > 0 && self.config.enable_metrics {
            self.metrics.add_messages_received(n as u64);
            self.metrics.add_batches_received(1);
        }
        n
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        if self.config.enable_metrics {
            self.metrics.snapshot()
        } else {
            MetricsSnapshot::default()
        }
    }
}

unsafe impl<T: Send> Send for Ring<T> {}
unsafe impl<T: Send> Sync for Ring<T> {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_and_drain() {
        let ring = Ring::<u64>::new(Config::new(4, 1, true));
        for i in 0..16 {
            assert!(ring.push(i));
        }
        assert!(!ring.push(99));

        let mut sum = 0;
        let n = ring.consume_batch(|v| sum += v);
        assert_eq!(n, 16);
        assert_eq!(sum, (0..16).sum::<u64>());
    }
}
