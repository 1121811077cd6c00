//! Type and block metadata registry (spec component F): two arenas hold
//! contiguous type and block tables, indexed by two radix tries — one
//! keyed by callsite hash, one by live address — so a mutator thread can
//! look up a type's current hotness classification from either a hash
//! (when it doesn't have a live pointer yet) or an address (predecessor
//! lookup against block spans, for `free`/`realloc`/sizing paths).

mod error;
mod registry;
mod types;

pub use error::RegistryError;
pub use registry::Registry;
pub use types::{HotOrNot, TouchCallback};

/// Index into the type table. Stable for the type's lifetime; never reused
/// while any block still references it (types are never unregistered,
/// mirroring the original's "types accumulate, allocations come and go").
pub type TypeId = usize;
