//! tiermem - tiered heap allocator with data-hotness placement
//!
//! Routes each allocation to one of two backing memory kinds — a fast,
//! capacity-limited tier and a larger, slower one — and keeps the hot/cold
//! threshold tracking a caller-specified target occupancy ratio by watching
//! the live access stream through a sampled, asynchronous pipeline.
//!
//! This crate is the placement core only: the underlying per-kind
//! allocator, the hardware sample source, and the call-site fingerprint
//! function are external collaborators behind the [`AllocatorKind`],
//! [`tiermem_sampling::SampleSource`], and [`Fingerprint`] boundaries.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use tiermem::{Builder, Fingerprint, Kind, Policy, testing::SystemAllocatorKind};
//!
//! let allocator = Arc::new(SystemAllocatorKind::new());
//! let memory = Builder::new(Policy::StaticRatio, allocator)
//!     .add_tier(Kind::Hot, 1.0)
//!     .build()
//!     .unwrap();
//!
//! let addr = tiermem::memtier_malloc(&memory, Fingerprint::from_site_id(1, 64), 64).unwrap();
//! tiermem::memtier_free(&memory, addr);
//! ```

mod config;
mod counters;
mod error;
mod fingerprint;
mod kind;
mod policy;
pub mod testing;
mod tiermem;

pub use config::TierMemConfig;
pub use error::TierMemError;
pub use fingerprint::Fingerprint;
pub use kind::{AllocatorKind, Kind};
pub use policy::Policy;
pub use tiermem::{Builder, Observability, TierMem};

/// Allocates `size` bytes, placed per the configured policy (spec §6).
pub fn memtier_malloc(memory: &TierMem, fingerprint: Fingerprint, size: usize) -> Option<u64> {
    memory.malloc(fingerprint, size)
}

/// Allocates space for `nmemb` elements of `size` bytes each.
pub fn memtier_calloc(memory: &TierMem, fingerprint: Fingerprint, nmemb: usize, size: usize) -> Option<u64> {
    memory.calloc(fingerprint, nmemb, size)
}

/// Resizes the allocation at `addr` to `new_size`, preserving its tier and
/// type identity (spec §9: REALLOC keeps the original type).
pub fn memtier_realloc(memory: &TierMem, addr: u64, new_size: usize) -> Option<u64> {
    memory.realloc(addr, new_size)
}

/// Allocates `size` bytes aligned to `align`, placed per the configured
/// policy.
pub fn memtier_posix_memalign(memory: &TierMem, fingerprint: Fingerprint, align: usize, size: usize) -> Option<u64> {
    memory.posix_memalign(fingerprint, align, size)
}

/// Frees the allocation at `addr`. A no-op if `addr` is not recognized by
/// the underlying allocator (mirrors libc `free(NULL)`).
pub fn memtier_free(memory: &TierMem, addr: u64) {
    memory.free(addr);
}

/// Returns the usable size of the allocation at `addr`, or `0` if unknown.
pub fn memtier_usable_size(memory: &TierMem, addr: u64) -> usize {
    memory.usable_size(addr)
}
