use crate::Arena;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Sentinel meaning "not on the free list / no next".
const NONE: usize = usize::MAX;

/// A fixed-size slab pool over an [`Arena`] (spec component B).
///
/// Backs the registry's type and block metadata tables, and the radix
/// trie's node pool. Allocation pops the LIFO free list; when it's empty,
/// a fresh slot is carved off the arena's committed range. Freed slots are
/// pushed back onto the free list by index — no coalescing, since every
/// slot is the same size (mirrors `pool_allocator.c`'s slab-of-slabs: one
/// pool per fixed size class, no splitting or merging).
pub struct Slab<T> {
    arena: Arena<Entry<T>>,
    free_head: AtomicUsize,
    next_fresh: AtomicUsize,
    used: AtomicUsize,
}

struct Entry<T> {
    next_free: usize,
    value: std::mem::ManuallyDrop<T>,
}

impl<T> Slab<T> {
    pub fn new(max_entries: usize) -> Self {
        Self::with_granularity(max_entries, 512)
    }

    pub fn with_granularity(max_entries: usize, granularity: usize) -> Self {
        Self {
            arena: Arena::with_granularity(max_entries, granularity),
            free_head: AtomicUsize::new(NONE),
            next_fresh: AtomicUsize::new(0),
            used: AtomicUsize::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.arena.max()
    }

    /// Number of live (allocated, not yet freed) entries. Relaxed: callers
    /// use this for metrics/telemetry, not synchronization.
    pub fn len(&self) -> usize {
        self.used.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Allocates a slot, writes `value` into it, and returns its index.
    ///
    /// # Panics
    ///
    /// Panics if the pool is exhausted (backing arena hit its declared max).
    pub fn alloc(&self, value: T) -> usize {
        let index = self.pop_free().unwrap_or_else(|| self.carve_fresh());

        self.arena.put(
            index,
            Entry {
                next_free: NONE,
                value: std::mem::ManuallyDrop::new(value),
            },
        );
        self.used.fetch_add(1, Ordering::Relaxed);
        index
    }

    fn pop_free(&self) -> Option<usize> {
        loop {
            let head = self.free_head.load(Ordering::Acquire);
            if head == NONE {
                return None;
            }
            // SAFETY: `head` came off the free list, so it was previously
            // allocated and committed; its `next_free` link is still valid.
            let next = unsafe { self.arena.get(head) }.next_free;
            if self
                .free_head
                .compare_exchange(head, next, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return Some(head);
            }
        }
    }

    fn carve_fresh(&self) -> usize {
        self.next_fresh.fetch_add(1, Ordering::Relaxed)
    }

    /// Reads the entry at `index`.
    ///
    /// # Safety
    ///
    /// `index` must have been returned by [`Slab::alloc`] and not since
    /// freed.
    pub unsafe fn get(&self, index: usize) -> &T {
        &self.arena.get(index).value
    }

    /// Mutable access to the entry at `index`.
    ///
    /// # Safety
    ///
    /// Same preconditions as [`Slab::get`], plus exclusive access.
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn get_mut(&self, index: usize) -> &mut T {
        &mut self.arena.get_mut(index).value
    }

    /// Frees the slot at `index`, dropping its value and pushing the index
    /// onto the LIFO free list.
    ///
    /// # Safety
    ///
    /// `index` must have been returned by [`Slab::alloc`] and not already
    /// freed; no outstanding references from [`Slab::get`]/[`Slab::get_mut`]
    /// may remain.
    pub unsafe fn free(&self, index: usize) {
        std::mem::ManuallyDrop::drop(&mut self.arena.get_mut(index).value);

        loop {
            let head = self.free_head.load(Ordering::Acquire);
            self.arena.get_mut(index).next_free = head;
            if self
                .free_head
                .compare_exchange(head, index, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                break;
            }
        }
        self.used.fetch_sub(1, Ordering::Relaxed);
    }
}

unsafe impl<T: Send> Send for Slab<T> {}
unsafe impl<T: Send> Sync for Slab<T> {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_and_free_reuses_slots_lifo() {
        let slab: Slab<u64> = Slab::with_granularity(64, 8);
        let a = slab.alloc(1);
        let b = slab.alloc(2);
        assert_eq!(slab.len(), 2);

        unsafe { slab.free(b) };
        assert_eq!(slab.len(), 1);

        let c = slab.alloc(3);
        assert_eq!(c, b, "freed slot should be reused LIFO");
        assert_eq!(unsafe { *slab.get(a) }, 1);
        assert_eq!(unsafe { *slab.get(c) }, 3);
    }

    #[test]
    fn no_coalescing_each_free_independent() {
        let slab: Slab<u64> = Slab::with_granularity(64, 8);
        let idxs: Vec<_> = (0..5).map(|i| slab.alloc(i)).collect();
        for &i in &idxs[1..4] {
            unsafe { slab.free(i) };
        }
        assert_eq!(slab.len(), 2);
        // Reallocating should draw from the 3 freed slots before carving
        // fresh ones.
        let fresh = slab.alloc(99);
        assert!(idxs[1..4].contains(&fresh));
    }
}
