use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use crate::kind::Kind;

/// Default absolute per-thread delta (bytes) a shard accumulates before it
/// flushes into the process-wide atomics. Large enough to amortize the
/// flush under high-frequency alloc/free churn, small enough that the
/// consumer's view of `hot_to_total_ratio` doesn't lag badly behind reality.
pub const DEFAULT_FLUSH_THRESHOLD: i64 = 64 * 1024;

/// 128-byte alignment keeps the hot and cold counters off the same cache
/// line, avoiding false sharing between mutator threads banking into one
/// and the consumer reading the other.
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

#[derive(Default)]
struct Shard {
    hot: i64,
    cold: i64,
}

thread_local! {
    static SHARDS: RefCell<HashMap<usize, Shard>> = RefCell::new(HashMap::new());
}

/// Process-wide per-kind byte totals, banked through thread-local shards
/// (spec §4.K): each mutator thread accumulates its own delta and only
/// touches the shared atomic once that delta's absolute value crosses
/// `flush_threshold`. This amortizes contention on the shared counters
/// while keeping the consumer's periodic read eventually accurate.
pub struct ByteCounters {
    hot: CacheAligned<AtomicI64>,
    cold: CacheAligned<AtomicI64>,
    flush_threshold: i64,
}

impl ByteCounters {
    pub fn new() -> Arc<Self> {
        Self::with_flush_threshold(DEFAULT_FLUSH_THRESHOLD)
    }

    pub fn with_flush_threshold(flush_threshold: i64) -> Arc<Self> {
        Arc::new(Self {
            hot: CacheAligned::new(AtomicI64::new(0)),
            cold: CacheAligned::new(AtomicI64::new(0)),
            flush_threshold,
        })
    }

    fn key(&self) -> usize {
        std::ptr::from_ref(self) as usize
    }

    /// Banks `delta` bytes (negative on free) against `kind` for the
    /// calling thread, flushing into the shared atomic once the thread's
    /// accumulated delta for that kind exceeds `flush_threshold`.
    pub fn bank(&self, kind: Kind, delta: i64) {
        SHARDS.with(|shards| {
            let mut shards = shards.borrow_mut();
            let shard = shards.entry(self.key()).or_default();
            let (bucket, atomic) = match kind {
                Kind::Hot => (&mut shard.hot, &*self.hot),
                Kind::Cold => (&mut shard.cold, &*self.cold),
            };
            *bucket += delta;
            if bucket.unsigned_abs() as i64 >= self.flush_threshold {
                atomic.fetch_add(*bucket, Ordering::Relaxed);
                *bucket = 0;
            }
        });
    }

    /// Forces the calling thread's banked deltas into the shared atomics
    /// immediately, bypassing `flush_threshold`. Used at shutdown and by
    /// tests that need an exact reading without waiting on the threshold.
    pub fn flush_current_thread(&self) {
        SHARDS.with(|shards| {
            let mut shards = shards.borrow_mut();
            if let Some(shard) = shards.get_mut(&self.key()) {
                if shard.hot != 0 {
                    self.hot.fetch_add(shard.hot, Ordering::Relaxed);
                    shard.hot = 0;
                }
                if shard.cold != 0 {
                    self.cold.fetch_add(shard.cold, Ordering::Relaxed);
                    shard.cold = 0;
                }
            }
        });
    }

    pub fn hot_bytes(&self) -> i64 {
        self.hot.load(Ordering::Relaxed)
    }

    pub fn cold_bytes(&self) -> i64 {
        self.cold.load(Ordering::Relaxed)
    }

    pub fn total_bytes(&self) -> i64 {
        self.hot_bytes() + self.cold_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_deltas_stay_banked_until_threshold() {
        let counters = ByteCounters::with_flush_threshold(1000);
        counters.bank(Kind::Hot, 400);
        assert_eq!(counters.hot_bytes(), 0);
        counters.bank(Kind::Hot, 700);
        assert_eq!(counters.hot_bytes(), 1100);
    }

    #[test]
    fn flush_current_thread_forces_visibility() {
        let counters = ByteCounters::with_flush_threshold(1_000_000);
        counters.bank(Kind::Cold, 42);
        assert_eq!(counters.cold_bytes(), 0);
        counters.flush_current_thread();
        assert_eq!(counters.cold_bytes(), 42);
    }

    #[test]
    fn frees_bank_negative_deltas() {
        let counters = ByteCounters::with_flush_threshold(10);
        counters.bank(Kind::Hot, 100);
        counters.bank(Kind::Hot, -100);
        counters.flush_current_thread();
        assert_eq!(counters.hot_bytes(), 0);
        assert_eq!(counters.total_bytes(), 0);
    }
}
