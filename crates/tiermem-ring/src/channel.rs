#[cfg(debug_assertions)]
use crate::invariants::debug_assert_fifo_count;
use crate::{Config, Ring};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
#[cfg(debug_assertions)]
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised by [`Channel`] producer registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ChannelError {
    #[error("too many producers registered (max: {max})")]
    TooManyProducers { max: usize },
    #[error("channel is closed")]
    Closed,
}

/// Multi-producer single-consumer event channel: each producer gets a
/// dedicated SPSC ring (spec 4.C), eliminating producer-producer contention.
pub struct Channel<T> {
    inner: Arc<ChannelInner<T>>,
}

struct ChannelInner<T> {
    rings: Vec<Ring<T>>,
    producer_count: AtomicUsize,
    closed: AtomicBool,
    config: Config,
    #[cfg(debug_assertions)]
    consumed_counts: Vec<AtomicU64>,
}

impl<T> Channel<T> {
    pub fn new(config: Config) -> Self {
        let mut rings = Vec::with_capacity(config.max_producers);
        for _ in 0..config.max_producers {
            rings.push(Ring::new(config));
        }

        #[cfg(debug_assertions)]
        let consumed_counts = (0..config.max_producers).map(|_| AtomicU64::new(0)).collect();

        Self {
            inner: Arc::new(ChannelInner {
                rings,
                producer_count: AtomicUsize::new(0),
                closed: AtomicBool::new(false),
                config,
                #[cfg(debug_assertions)]
                consumed_counts,
            }),
        }
    }

    /// Registers a new producer (one dedicated ring). The returned
    /// [`Producer`] is `Send` but deliberately not `Clone` — cloning it
    /// would let two threads write the same ring, breaking the SPSC
    /// invariant that makes the ring lock-free.
    pub fn register(&self) -> Result<Producer<T>, ChannelError> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(ChannelError::Closed);
        }

        let id = self.inner.producer_count.fetch_add(1, Ordering::SeqCst);
        if id >= self.inner.config.max_producers {
            self.inner.producer_count.fetch_sub(1, Ordering::SeqCst);
            return Err(ChannelError::TooManyProducers {
                max: self.inner.config.max_producers,
            });
        }

        self.inner.rings[id].set_active(true);

        Ok(Producer {
            channel: Arc::clone(&self.inner),
            id,
        })
    }

    /// Batch-consume from every producer's ring (the background consumer's
    /// steady-state drain, spec 4.J point 1). Consumes in producer-id order.
    pub fn consume_all<F>(&self, mut handler: F) -> usize
    where
        F: FnMut(&T),
    {
        self.consume_all_up_to(usize::MAX, &mut handler)
    }

    /// Consume up to `max_total` items across all producers.
    pub fn consume_all_up_to<F>(&self, max_total: usize, mut handler: F) -> usize
    where
        F: FnMut(&T),
    {
        let mut total = 0;
        let count = self.inner.producer_count.load(Ordering::Acquire);

        for (producer_id, ring) in self.inner.rings[..count].iter().enumerate() {
            if total >= max_total {
                break;
            }
            let remaining = max_total - total;
            let consumed = ring.consume_up_to(remaining, &mut handler);

            #[cfg(debug_assertions)]
            {
                let old_count = self.inner.consumed_counts[producer_id].load(Ordering::Relaxed);
                let new_count = old_count + consumed as u64;
                debug_assert_fifo_count!(producer_id, old_count, new_count);
                self.inner.consumed_counts[producer_id].store(new_count, Ordering::Relaxed);
            }

            total += consumed;
        }

        total
    }

    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
        let count = self.inner.producer_count.load(Ordering::Acquire);
        for ring in &self.inner.rings[..count] {
            ring.close();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    pub fn producer_count(&self) -> usize {
        self.inner.producer_count.load(Ordering::Acquire)
    }

    /// Aggregated metrics across every registered producer's ring.
    pub fn metrics(&self) -> crate::MetricsSnapshot {
        let mut m = crate::MetricsSnapshot::default();
        let count = self.inner.producer_count.load(Ordering::Acquire);

        for ring in &self.inner.rings[..count] {
            let rm = ring.metrics();
            m.messages_sent += rm.messages_sent;
            m.messages_received += rm.messages_received;
            m.batches_sent += rm.batches_sent;
            m.batches_received += rm.batches_received;
            m.full_events += rm.full_events;
        }

        m
    }
}

impl<T> Clone for Channel<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

unsafe impl<T: Send> Send for Channel<T> {}
unsafe impl<T: Send> Sync for Channel<T> {}

/// A producer's handle to its dedicated ring.
pub struct Producer<T> {
    channel: Arc<ChannelInner<T>>,
    id: usize,
}

impl<T> Producer<T> {
    #[inline]
    pub fn id(&self) -> usize {
        self.id
    }

    /// Push one event. `false` if the ring is full or closed — the caller
    /// (placement fast path, spec 5) must treat this as non-fatal
    /// backpressure, not an error.
    #[inline]
    pub fn push(&self, item: T) -> bool {
        self.channel.rings[self.id].push(item)
    }

    #[inline]
    pub fn reserve_with_backoff(&self, n: usize) -> Option<crate::Reservation<'_, T>> {
        self.channel.rings[self.id].reserve_with_backoff(n)
    }

    pub fn close(&self) {
        self.channel.rings[self.id].close();
    }

    pub fn is_closed(&self) -> bool {
        self.channel.rings[self.id].is_closed()
    }
}

unsafe impl<T: Send> Send for Producer<T> {}
unsafe impl<T: Send> Sync for Producer<T> {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multi_producer_round_robin_consume() {
        let ch = Channel::<u64>::new(Config::default());
        let p1 = ch.register().unwrap();
        let p2 = ch.register().unwrap();

        assert!(p1.push(10));
        assert!(p2.push(20));

        let mut total = 0;
        let n = ch.consume_all(|_| total += 1);
        assert_eq!(n, 2);
        assert_eq!(total, 2);
    }

    #[test]
    fn too_many_producers_is_rejected() {
        let config = Config::new(4, 2, false);
        let ch = Channel::<u64>::new(config);
        let _p1 = ch.register().unwrap();
        let _p2 = ch.register().unwrap();
        assert!(matches!(
            ch.register(),
            Err(ChannelError::TooManyProducers { max: 2 })
        ));
    }

    #[test]
    fn closed_channel_rejects_registration() {
        let ch = Channel::<u64>::new(Config::default());
        ch.close();
        assert!(matches!(ch.register(), Err(ChannelError::Closed)));
    }
}
