use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Elements committed per grow step when the caller doesn't request an exact
/// top (mirrors `BIGARY_PAGESIZE`'s 2 MiB granularity, scaled to element
/// counts so this type stays allocation-kind-agnostic).
const DEFAULT_GRANULARITY: usize = 512;

/// A growable backing arena (spec component A).
///
/// Reserves `max` elements' worth of storage up front — the Rust
/// counterpart of `bigary`'s `mmap(PROT_NONE)` reservation, since stable
/// safe Rust has no portable way to commit pages into a reservation
/// on demand without FFI into the platform's `mmap`/`VirtualAlloc`, and
/// that raw mapping is explicitly the out-of-scope underlying allocator's
/// job (spec 1, 6). `ensure` tracks a logical `current_top`: elements below
/// it are considered committed and safe to index; `ensure` rounds its
/// argument up to [`Arena::granularity`] and advances the counter under a
/// mutex. The fast path (`top <= current_top`) is a single atomic load.
///
/// Never shrinks. Fails fatally (panics) if asked to grow past `max`,
/// matching spec 4.A / 7's "fatal: abort with message."
pub struct Arena<T> {
    storage: Box<[UnsafeCell<MaybeUninit<T>>]>,
    current_top: AtomicUsize,
    growth_lock: Mutex<()>,
    granularity: usize,
}

unsafe impl<T: Send> Send for Arena<T> {}
unsafe impl<T: Send> Sync for Arena<T> {}

impl<T> Arena<T> {
    /// Reserves storage for up to `max` elements with the default growth
    /// granularity.
    pub fn new(max: usize) -> Self {
        Self::with_granularity(max, DEFAULT_GRANULARITY)
    }

    pub fn with_granularity(max: usize, granularity: usize) -> Self {
        assert!(granularity > 0, "granularity must be positive");
        let mut storage = Vec::with_capacity(max);
        storage.resize_with(max, || UnsafeCell::new(MaybeUninit::uninit()));

        Self {
            storage: storage.into_boxed_slice(),
            current_top: AtomicUsize::new(0),
            growth_lock: Mutex::new(()),
            granularity,
        }
    }

    #[inline]
    pub fn max(&self) -> usize {
        self.storage.len()
    }

    #[inline]
    pub fn granularity(&self) -> usize {
        self.granularity
    }

    /// Number of elements currently committed (readable/writable).
    #[inline]
    pub fn committed(&self) -> usize {
        self.current_top.load(Ordering::Acquire)
    }

    /// Ensures at least `top` elements are committed, growing in
    /// [`Arena::granularity`]-sized steps.
    ///
    /// # Panics
    ///
    /// Panics if `top` exceeds the declared `max` — out-of-virtual-memory is
    /// a fatal condition per spec 7.
    pub fn ensure(&self, top: usize) {
        // Fast path: plain comparison, no locking (spec 4.A).
        if top <= self.current_top.load(Ordering::Acquire) {
            return;
        }

        let _guard = self.growth_lock.lock().unwrap();
        // Re-check: another thread may have grown the arena while we waited.
        if top <= self.current_top.load(Ordering::Acquire) {
            return;
        }

        let rounded = top.div_ceil(self.granularity) * self.granularity;
        assert!(
            rounded <= self.max(),
            "arena exhausted: max is {}, {} requested",
            self.max(),
            rounded
        );

        let rounded = rounded.min(self.max());
        tracing::trace!(from = self.committed(), to = rounded, "arena grown");
        self.current_top.store(rounded, Ordering::Release);
    }

    /// Writes `value` at `index`, growing the arena if needed. Returns the
    /// index for convenience chaining.
    pub fn put(&self, index: usize, value: T) -> usize {
        self.ensure(index + 1);
        // SAFETY: `ensure` guarantees `index` is within the committed range,
        // and the caller (Slab) guarantees exclusive access to this slot —
        // slots are never aliased because Slab hands out each index once
        // between alloc and free.
        unsafe {
            (*self.storage[index].get()).write(value);
        }
        index
    }

    /// Reads a reference to the element at `index`.
    ///
    /// # Safety
    ///
    /// `index` must be committed (`< committed()`) and the slot must have
    /// been initialized via [`Arena::put`] and not since invalidated.
    pub unsafe fn get(&self, index: usize) -> &T {
        (*self.storage[index].get()).assume_init_ref()
    }

    /// Mutable access to the element at `index`.
    ///
    /// # Safety
    ///
    /// Same preconditions as [`Arena::get`], plus the caller must hold
    /// exclusive access to the slot (no concurrent readers/writers).
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn get_mut(&self, index: usize) -> &mut T {
        (*self.storage[index].get()).assume_init_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grows_in_granularity_steps_and_serves_fast_path() {
        let arena: Arena<u64> = Arena::with_granularity(4096, 128);
        assert_eq!(arena.committed(), 0);

        arena.ensure(1);
        assert_eq!(arena.committed(), 128);

        arena.ensure(128); // already committed: fast path
        assert_eq!(arena.committed(), 128);

        arena.ensure(129);
        assert_eq!(arena.committed(), 256);
    }

    #[test]
    fn never_shrinks() {
        let arena: Arena<u64> = Arena::with_granularity(1024, 64);
        arena.ensure(200);
        let top = arena.committed();
        arena.ensure(10);
        assert_eq!(arena.committed(), top);
    }

    #[test]
    #[should_panic(expected = "arena exhausted")]
    fn growth_past_max_is_fatal() {
        let arena: Arena<u64> = Arena::with_granularity(64, 64);
        arena.ensure(65);
    }

    #[test]
    fn put_and_get_roundtrip() {
        let arena: Arena<u64> = Arena::with_granularity(1024, 64);
        let idx = arena.put(10, 42);
        assert_eq!(unsafe { *arena.get(idx) }, 42);
    }
}
