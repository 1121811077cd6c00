use crate::invariants::{
    debug_assert_bounded_count, debug_assert_head_not_past_tail, debug_assert_initialized_read,
    debug_assert_monotonic,
};
use crate::{Backoff, Config, Metrics, Reservation};
use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

// =============================================================================
// MEMORY ORDERING
// =============================================================================
//
// SPSC ring: unbounded u64 sequence numbers for head/tail avoid ABA entirely
// (wrap-around is centuries away at any realistic event rate); the slot index
// is `sequence & mask`.
//
// Producer: relaxed load of `tail`, UnsafeCell read of `cached_head`
// (single-writer), acquire-refresh `head` on cache miss, release-store `tail`
// on commit. Consumer: mirror image with `head`/`tail` swapped. This encodes
// the four-state slot machine from the spec (FREE -> WRITING -> READY ->
// READING -> FREE) without a per-slot atomic: a slot between [head, tail) is
// READY/READING, a slot outside is FREE, and WRITING exists only between
// reserve() and commit() on the producer's own reserved range, which no
// other thread can observe until the release-store publishes it.
// =============================================================================

/// SPSC ring buffer — the core building block of the event ring (spec 4.C).
#[repr(C)]
pub struct Ring<T> {
    tail: CacheAligned<AtomicU64>,
    cached_head: CacheAligned<UnsafeCell<u64>>,

    head: CacheAligned<AtomicU64>,
    cached_tail: CacheAligned<UnsafeCell<u64>>,

    active: CacheAligned<AtomicBool>,
    closed: AtomicBool,
    metrics: Metrics,

    config: Config,

    buffer: UnsafeCell<Box<[MaybeUninit<T>]>>,
}

unsafe impl<T: Send> Send for Ring<T> {}
unsafe impl<T: Send> Sync for Ring<T> {}

impl<T> Ring<T> {
    pub fn new(config: Config) -> Self {
        let capacity = config.capacity();

        let mut buffer = Vec::with_capacity(capacity);
        buffer.resize_with(capacity, MaybeUninit::uninit);
        let buffer = buffer.into_boxed_slice();

        Self {
            tail: CacheAligned::new(AtomicU64::new(0)),
            cached_head: CacheAligned::new(UnsafeCell::new(0)),
            head: CacheAligned::new(AtomicU64::new(0)),
            cached_tail: CacheAligned::new(UnsafeCell::new(0)),
            active: CacheAligned::new(AtomicBool::new(false)),
            closed: AtomicBool::new(false),
            metrics: Metrics::new(),
            config,
            buffer: UnsafeCell::new(buffer),
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.config.capacity()
    }

    #[inline]
    fn mask(&self) -> usize {
        self.config.mask()
    }

    #[inline]
    pub fn len(&self) -> usize {
        let tail = self.tail.load(Ordering::Relaxed);
        let head = self.head.load(Ordering::Relaxed);
        tail.wrapping_sub(head) as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tail.load(Ordering::Relaxed) == self.head.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity()
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub(crate) fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::Release);
    }

    /// Reserve `n` slots for zero-copy writing. `None` if full, closed, or `n`
    /// exceeds capacity. The returned reservation may hold fewer than `n`
    /// items if the request wraps the ring.
    #[allow(clippy::cast_possible_truncation)]
    pub fn reserve(&self, n: usize) -> Option<Reservation<'_, T>> {
        if n == 0 || n > self.capacity() || self.is_closed() {
            return None;
        }

        let tail = self.tail.load(Ordering::Relaxed);

        // SAFETY: cached_head has exactly one writer, this code path.
        let cached_head = unsafe { *self.cached_head.get() };
        let space = self
            .capacity()
            .saturating_sub(tail.wrapping_sub(cached_head) as usize);

        if space >= n {
            return Some(self.make_reservation(tail, n));
        }

        let head = self.head.load(Ordering::Acquire);
        // SAFETY: see above; the Acquire load synchronizes with the
        // consumer's Release store of `head`.
        unsafe {
            *self.cached_head.get() = head;
        }

        let space = self.capacity().saturating_sub(tail.wrapping_sub(head) as usize);
        if space < n {
            if self.config.enable_metrics {
                self.metrics.add_full_event();
            }
            return None;
        }

        Some(self.make_reservation(tail, n))
    }

    /// Reserve with adaptive backoff: spins, yields, then gives up.
    pub fn reserve_with_backoff(&self, n: usize) -> Option<Reservation<'_, T>> {
        let mut backoff = Backoff::new();
        while !backoff.is_completed() {
            if let Some(r) = self.reserve(n) {
                return Some(r);
            }
            if self.is_closed() {
                return None;
            }
            backoff.snooze();
        }
        None
    }

    fn make_reservation(&self, tail: u64, n: usize) -> Reservation<'_, T> {
        let mask = self.mask();
        let idx = (tail as usize) & mask;
        let contiguous = n.min(self.capacity() - idx);

        // SAFETY: idx is masked into bounds; slots [tail, tail+n) are not yet
        // visible to the consumer (publication happens on commit's Release
        // store), and only this producer writes them.
        let slice = unsafe {
            let buffer = &mut *self.buffer.get();
            &mut buffer[idx..idx + contiguous]
        };

        let ring_ptr = self as *const Self;
        Reservation::new(slice, ring_ptr)
    }

    pub(crate) fn commit_internal(&self, n: usize) {
        let tail = self.tail.load(Ordering::Relaxed);
        let new_tail = tail.wrapping_add(n as u64);
        let head = self.head.load(Ordering::Relaxed);

        debug_assert_bounded_count!(new_tail.wrapping_sub(head) as usize, self.capacity());
        debug_assert_monotonic!("tail", tail, new_tail);

        self.tail.store(new_tail, Ordering::Release);

        if self.config.enable_metrics {
            self.metrics.add_messages_sent(n as u64);
            self.metrics.add_batches_sent(1);
        }
    }

    /// Advance head after reading `n` items.
    #[inline]
    pub fn advance(&self, n: usize) {
        let head = self.head.load(Ordering::Relaxed);
        let new_head = head.wrapping_add(n as u64);
        let tail = self.tail.load(Ordering::Relaxed);

        debug_assert_head_not_past_tail!(new_head, tail);
        debug_assert_monotonic!("head", head, new_head);

        self.head.store(new_head, Ordering::Release);

        if self.config.enable_metrics {
            self.metrics.add_messages_received(n as u64);
            self.metrics.add_batches_received(1);
        }
    }

    /// Process all available items with a single head update (batches the
    /// atomic store, matching spec 4.J's "pop up to K events" drain loop).
    #[allow(clippy::cast_possible_truncation)]
    pub fn consume_batch<F>(&self, mut handler: F) -> usize
    where
        F: FnMut(&T),
    {
        self.consume_up_to(usize::MAX, &mut handler)
    }

    /// Consume up to `max_items`, a single head update for the whole batch.
    #[allow(clippy::cast_possible_truncation)]
    pub fn consume_up_to<F>(&self, max_items: usize, mut handler: F) -> usize
    where
        F: FnMut(&T),
    {
        if max_items == 0 {
            return 0;
        }

        let head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Acquire);

        let avail = tail.wrapping_sub(head) as usize;
        if avail == 0 {
            return 0;
        }

        let to_consume = avail.min(max_items);
        let mask = self.mask();
        let mut pos = head;
        let mut count = 0;

        while count < to_consume {
            debug_assert_initialized_read!(pos, head, tail);

            let idx = (pos as usize) & mask;
            // SAFETY: idx is masked into bounds; items in [head, tail) were
            // published by the producer's Release store on tail, which the
            // Acquire load above synchronizes with.
            let item = unsafe {
                let buffer = &*self.buffer.get();
                buffer[idx].assume_init_read()
            };
            handler(&item);
            pos = pos.wrapping_add(1);
            count += 1;
        }

        self.head.store(head.wrapping_add(count as u64), Ordering::Release);

        if self.config.enable_metrics {
            self.metrics.add_messages_received(count as u64);
            self.metrics.add_batches_received(1);
        }

        count
    }

    /// Send a single item. `false` if the ring is full or closed.
    #[inline]
    pub fn push(&self, item: T) -> bool {
        self.reserve(1).is_some_and(|mut r| {
            r.as_mut_slice()[0] = MaybeUninit::new(item);
            r.commit();
            true
        })
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub fn metrics(&self) -> crate::MetricsSnapshot {
        if self.config.enable_metrics {
            self.metrics.snapshot()
        } else {
            crate::MetricsSnapshot::default()
        }
    }
}

impl<T> Drop for Ring<T> {
    fn drop(&mut self) {
        let head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Relaxed);
        let count = tail.wrapping_sub(head) as usize;

        if count > 0 {
            let mask = self.mask();
            let buffer = self.buffer.get_mut();

            for i in 0..count {
                let idx = ((head as usize).wrapping_add(i)) & mask;
                // SAFETY: every slot in [head, tail) holds an initialized T.
                unsafe {
                    ptr::drop_in_place(buffer[idx].as_mut_ptr());
                }
            }
        }
    }
}

/// 128-byte aligned wrapper preventing prefetcher-induced false sharing
/// between producer-hot and consumer-hot cache lines.
#[repr(align(128))]
struct CacheAligned<T> {
    value: T,
}

impl<T> CacheAligned<T> {
    const fn new(value: T) -> Self {
        Self { value }
    }
}

impl<T> std::ops::Deref for CacheAligned<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserve_commit_read_advance_roundtrip() {
        let ring = Ring::<u64>::new(Config::default());

        if let Some(mut r) = ring.reserve(4) {
            let slice = r.as_mut_slice();
            slice[0].write(100);
            slice[1].write(200);
            slice[2].write(300);
            slice[3].write(400);
            r.commit();
        }
        assert_eq!(ring.len(), 4);

        let mut seen = Vec::new();
        let consumed = ring.consume_batch(|v| seen.push(*v));
        assert_eq!(consumed, 4);
        assert_eq!(seen, vec![100, 200, 300, 400]);
        assert!(ring.is_empty());
    }

    #[test]
    fn consume_up_to_partial_drain() {
        let ring = Ring::<u64>::new(Config::default());
        for i in 0..10 {
            ring.push(i);
        }

        let mut sum = 0u64;
        let consumed = ring.consume_up_to(5, |v| sum += v);
        assert_eq!(consumed, 5);
        assert_eq!(sum, 0 + 1 + 2 + 3 + 4);
        assert_eq!(ring.len(), 5);

        sum = 0;
        let consumed2 = ring.consume_up_to(10, |v| sum += v);
        assert_eq!(consumed2, 5);
        assert_eq!(sum, 5 + 6 + 7 + 8 + 9);
        assert!(ring.is_empty());
    }

    #[test]
    fn ring_full_reports_false_and_recovers_after_drain() {
        let config = Config::new(4, 16, true); // 16 slots
        let ring = Ring::<u64>::new(config);

        for i in 0..16 {
            assert!(ring.push(i));
        }
        assert!(!ring.push(99));
        assert_eq!(ring.metrics().full_events, 1);

        ring.consume_batch(|_| {});
        for i in 0..16 {
            assert!(ring.push(i));
        }
    }

    #[test]
    fn drop_runs_for_items_still_queued() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        static DROPS: AtomicUsize = AtomicUsize::new(0);

        struct Counted;
        impl Drop for Counted {
            fn drop(&mut self) {
                DROPS.fetch_add(1, Ordering::SeqCst);
            }
        }

        {
            let ring = Ring::<Counted>::new(Config::default());
            ring.push(Counted);
            ring.push(Counted);
            // dropped here without being consumed
        }
        assert_eq!(DROPS.load(Ordering::SeqCst), 2);
    }
}
