use crate::link::{Link, SLNODES};
use std::sync::atomic::AtomicU64;

/// An internal radix node. `child[0]` doubles as the next-free-node link
/// while the node sits on critnib's own free list (mirrors `critnib.c`'s
/// reuse of the same field for both purposes).
pub(crate) struct Node {
    pub child: [AtomicU64; SLNODES],
    pub path: u64,
    pub shift: u8,
}

impl Default for Node {
    fn default() -> Self {
        Self {
            child: std::array::from_fn(|_| AtomicU64::new(0)),
            path: 0,
            shift: 0,
        }
    }
}

/// A leaf slot: a key and its value. `next_free` doubles as the next-free
/// link while unlinked and pending reuse.
pub(crate) struct Leaf<V> {
    pub key: u64,
    pub value: V,
    pub next_free: Link,
}
