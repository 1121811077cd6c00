use std::sync::atomic::{AtomicI8, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::TypeId;

/// A type's classification, as last computed by the consumer thread from
/// the hotness ranking's threshold. `Unclassified` is the initial state
/// before the first ranking pass has had a chance to look at it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HotOrNot {
    Unclassified,
    Cold,
    Hot,
}

impl HotOrNot {
    fn to_i8(self) -> i8 {
        match self {
            HotOrNot::Unclassified => -1,
            HotOrNot::Cold => 0,
            HotOrNot::Hot => 1,
        }
    }

    fn from_i8(v: i8) -> Self {
        match v {
            0 => HotOrNot::Cold,
            1 => HotOrNot::Hot,
            _ => HotOrNot::Unclassified,
        }
    }
}

pub type TouchCallback = Arc<dyn Fn(TypeId) + Send + Sync>;

/// Per-allocation-site (callsite hash) metadata. `num_allocs`/`total_size`
/// are mutated only from the consumer thread, which owns the registry, but
/// are read from mutator threads via [`crate::Registry::hotness_of_addr`]
/// and friends, so they're stored atomically to avoid torn reads rather
/// than for any write-side contention they'd otherwise need.
pub(crate) struct Type {
    pub hash: u64,
    pub num_allocs: AtomicUsize,
    pub total_size: AtomicUsize,
    hot_or_not: AtomicI8,
    touch_callback: Mutex<Option<TouchCallback>>,
}

impl Type {
    pub fn new(hash: u64) -> Self {
        Self {
            hash,
            num_allocs: AtomicUsize::new(0),
            total_size: AtomicUsize::new(0),
            hot_or_not: AtomicI8::new(HotOrNot::Unclassified.to_i8()),
            touch_callback: Mutex::new(None),
        }
    }

    pub fn hot_or_not(&self) -> HotOrNot {
        HotOrNot::from_i8(self.hot_or_not.load(Ordering::Acquire))
    }

    /// Stores the new classification, returning `true` if this call is the
    /// transition from not-hot to hot (the moment a registered touch
    /// callback should fire).
    pub fn set_hot_or_not(&self, value: HotOrNot) -> bool {
        let prev = self.hot_or_not.swap(value.to_i8(), Ordering::AcqRel);
        value == HotOrNot::Hot && HotOrNot::from_i8(prev) != HotOrNot::Hot
    }

    pub fn set_touch_callback(&self, cb: TouchCallback) {
        *self.touch_callback.lock().unwrap() = Some(cb);
    }

    pub fn touch_callback(&self) -> Option<TouchCallback> {
        self.touch_callback.lock().unwrap().clone()
    }
}

/// A single live allocation's bookkeeping: its current address, size, and
/// owning type. Threaded onto a LIFO free list via the slab's own `next_free`
/// field (no coalescing: every block occupies exactly one slot regardless of
/// the allocation's real size).
pub(crate) struct Block {
    addr: AtomicU64,
    size: AtomicUsize,
    type_idx: AtomicUsize,
}

impl Block {
    pub fn new(addr: u64, size: usize, type_idx: TypeId) -> Self {
        Self {
            addr: AtomicU64::new(addr),
            size: AtomicUsize::new(size),
            type_idx: AtomicUsize::new(type_idx),
        }
    }

    pub fn addr(&self) -> u64 {
        self.addr.load(Ordering::Acquire)
    }

    pub fn set_addr(&self, addr: u64) {
        self.addr.store(addr, Ordering::Release);
    }

    pub fn size(&self) -> usize {
        self.size.load(Ordering::Acquire)
    }

    pub fn set_size(&self, size: usize) {
        self.size.store(size, Ordering::Release);
    }

    pub fn type_idx(&self) -> TypeId {
        self.type_idx.load(Ordering::Acquire)
    }
}
