use tiermem_registry::TouchCallback;

/// The wire format carried across the event ring (spec component C's
/// payload). Copied by value into the ring by whichever thread observed
/// it — a mutator on the allocation fast path, or the sampling worker —
/// and consumed exactly once by the background consumer.
#[derive(Clone)]
pub enum Event {
    /// A fresh allocation became live. Enqueued by the placement fast path
    /// after the underlying allocation succeeds, before the pointer is
    /// handed to any other thread.
    CreateAdd { hash: u64, addr: u64, size: usize },
    /// A live allocation was freed.
    DestroyRemove { addr: u64, size: usize },
    /// A live allocation moved and/or resized. The original call-site
    /// identity (type) is preserved.
    Realloc {
        old_addr: u64,
        new_addr: u64,
        old_size: usize,
        new_size: usize,
    },
    /// A hardware sample (or synthetic stand-in) observed an access to
    /// `addr` at `timestamp`.
    Touch { addr: u64, timestamp: u64 },
    /// Registers a callback to invoke when the block covering `addr`'s
    /// type transitions to hot.
    SetTouchCallback { addr: u64, callback: TouchCallback },
}

impl std::fmt::Debug for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Event::CreateAdd { hash, addr, size } => f
                .debug_struct("CreateAdd")
                .field("hash", hash)
                .field("addr", addr)
                .field("size", size)
                .finish(),
            Event::DestroyRemove { addr, size } => f
                .debug_struct("DestroyRemove")
                .field("addr", addr)
                .field("size", size)
                .finish(),
            Event::Realloc {
                old_addr,
                new_addr,
                old_size,
                new_size,
            } => f
                .debug_struct("Realloc")
                .field("old_addr", old_addr)
                .field("new_addr", new_addr)
                .field("old_size", old_size)
                .field("new_size", new_size)
                .finish(),
            Event::Touch { addr, timestamp } => f
                .debug_struct("Touch")
                .field("addr", addr)
                .field("timestamp", timestamp)
                .finish(),
            Event::SetTouchCallback { addr, .. } => {
                f.debug_struct("SetTouchCallback").field("addr", addr).finish()
            }
        }
    }
}
