use std::sync::atomic::Ordering;

use tiermem_arena::Slab;
use tiermem_critnib::Critnib;

use crate::error::RegistryError;
use crate::types::{Block, HotOrNot, TouchCallback, Type};
use crate::TypeId;

/// Owns the type and block metadata tables plus their two address/hash
/// indices. All mutation methods take `&self`: the underlying [`Slab`]s and
/// [`Critnib`]s are already internally synchronized, so `Registry` adds no
/// locking of its own. In practice only the consumer thread calls the
/// mutating methods (`register`/`unregister`/`realloc`/`set_hot_or_not`);
/// mutator threads only ever call the read side (`hotness_of_*`).
pub struct Registry {
    types: Slab<Type>,
    blocks: Slab<Block>,
    hash_to_type: Critnib<usize>,
    addr_to_block: Critnib<usize>,
}

impl Registry {
    pub fn new(max_types: usize, max_blocks: usize) -> Self {
        Self {
            types: Slab::new(max_types),
            blocks: Slab::new(max_blocks),
            hash_to_type: Critnib::new(max_types),
            addr_to_block: Critnib::new(max_blocks),
        }
    }

    fn type_ref(&self, type_idx: TypeId) -> &Type {
        // SAFETY: every `TypeId` in circulation came from `find_or_create_type`
        // and types are never unregistered, so the slot stays live forever.
        unsafe { self.types.get(type_idx) }
    }

    fn block_ref(&self, block_idx: usize) -> &Block {
        // SAFETY: `block_idx` values only escape this module wrapped in the
        // `addr_to_block` index, and are removed from it before the slab slot
        // is freed.
        unsafe { self.blocks.get(block_idx) }
    }

    /// Finds the type registered under `hash`, creating it if this is the
    /// first time it's been seen.
    pub fn find_or_create_type(&self, hash: u64) -> Result<TypeId, RegistryError> {
        if let Some(idx) = self.hash_to_type.get(hash) {
            return Ok(idx);
        }
        let idx = self.types.alloc(Type::new(hash));
        match self.hash_to_type.insert(hash, idx) {
            Ok(()) => Ok(idx),
            // Lost a race with another inserter of the same hash; the type we
            // just allocated is simply abandoned (types are never freed, so
            // this just wastes a slot rather than corrupting anything).
            Err(tiermem_critnib::CritnibError::AlreadyExists) => {
                Ok(self.hash_to_type.get(hash).unwrap_or(idx))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Registers a new live allocation of `size` bytes at `addr`, under the
    /// type identified by `hash`. Returns the owning type's id.
    pub fn register(&self, hash: u64, addr: u64, size: usize) -> Result<TypeId, RegistryError> {
        let type_idx = self.find_or_create_type(hash)?;
        let t = self.type_ref(type_idx);
        t.num_allocs.fetch_add(1, Ordering::Relaxed);
        t.total_size.fetch_add(size, Ordering::Relaxed);

        let block_idx = self.blocks.alloc(Block::new(addr, size, type_idx));
        if let Err(e) = self.addr_to_block.insert(addr, block_idx) {
            // Roll back the stats bump and the block slot; the caller handed
            // us an address already in the index, which should never happen
            // for a fresh allocation.
            t.num_allocs.fetch_sub(1, Ordering::Relaxed);
            t.total_size.fetch_sub(size, Ordering::Relaxed);
            unsafe { self.blocks.free(block_idx) };
            return Err(e.into());
        }
        Ok(type_idx)
    }

    /// Removes the block at `addr`, if present, adjusting its type's stats
    /// and returning the type it belonged to.
    pub fn unregister(&self, addr: u64) -> Option<TypeId> {
        let Some(block_idx) = self.addr_to_block.remove(addr) else {
            tracing::warn!(addr, "unregister: address not tracked");
            return None;
        };
        let block = self.block_ref(block_idx);
        let type_idx = block.type_idx();
        let t = self.type_ref(type_idx);
        t.num_allocs.fetch_sub(1, Ordering::Relaxed);
        t.total_size.fetch_sub(block.size(), Ordering::Relaxed);
        unsafe { self.blocks.free(block_idx) };
        Some(type_idx)
    }

    /// Moves the block at `old_addr` to `new_addr` with `new_size`,
    /// preserving its original type (the new size is attributed to the type
    /// that made the original allocation, not reclassified). Returns the
    /// owning type on success.
    pub fn realloc(&self, old_addr: u64, new_addr: u64, new_size: usize) -> Result<TypeId, RegistryError> {
        let Some(block_idx) = self.addr_to_block.remove(old_addr) else {
            tracing::warn!(old_addr, "realloc: address not tracked");
            return Err(RegistryError::AlreadyRegistered);
        };
        let block = self.block_ref(block_idx);
        let old_size = block.size();

        if let Err(e) = self.addr_to_block.insert(new_addr, block_idx) {
            // Put the old mapping back so the block isn't orphaned.
            let _ = self.addr_to_block.insert(old_addr, block_idx);
            return Err(e.into());
        }
        block.set_addr(new_addr);
        block.set_size(new_size);

        let type_idx = block.type_idx();
        let t = self.type_ref(type_idx);
        if new_size >= old_size {
            t.total_size.fetch_add(new_size - old_size, Ordering::Relaxed);
        } else {
            t.total_size.fetch_sub(old_size - new_size, Ordering::Relaxed);
        }
        Ok(type_idx)
    }

    /// The type owning the block whose span covers `addr`, or `None` if no
    /// live block covers it.
    pub fn type_of_addr(&self, addr: u64) -> Option<TypeId> {
        let (block_addr, block_idx) = self.addr_to_block.find_le(addr)?;
        let block = self.block_ref(block_idx);
        let size = block.size() as u64;
        (addr >= block_addr && addr - block_addr < size).then(|| block.type_idx())
    }

    /// The classification of the block whose span covers `addr`, or `None`
    /// if no live block covers it.
    pub fn hotness_of_addr(&self, addr: u64) -> Option<HotOrNot> {
        let type_idx = self.type_of_addr(addr)?;
        Some(self.type_ref(type_idx).hot_or_not())
    }

    /// The classification of the type registered under `hash`, or `None` if
    /// no type has been registered under it yet.
    pub fn hotness_of_hash(&self, hash: u64) -> Option<HotOrNot> {
        let type_idx = self.hash_to_type.get(hash)?;
        Some(self.type_ref(type_idx).hot_or_not())
    }

    /// Stores `value` as `type_idx`'s current classification. Returns `true`
    /// exactly when this call is the transition into `Hot`, the moment a
    /// registered touch callback should fire.
    pub fn set_hot_or_not(&self, type_idx: TypeId, value: HotOrNot) -> bool {
        self.type_ref(type_idx).set_hot_or_not(value)
    }

    pub fn set_touch_callback(&self, type_idx: TypeId, cb: TouchCallback) {
        self.type_ref(type_idx).set_touch_callback(cb);
    }

    pub fn touch_callback(&self, type_idx: TypeId) -> Option<TouchCallback> {
        self.type_ref(type_idx).touch_callback()
    }

    /// `(num_allocs, total_size)` for `type_idx`, for feeding the hotness
    /// ranking's weight.
    pub fn type_stats(&self, type_idx: TypeId) -> (usize, usize) {
        let t = self.type_ref(type_idx);
        (
            t.num_allocs.load(Ordering::Relaxed),
            t.total_size.load(Ordering::Relaxed),
        )
    }

    pub fn type_hash(&self, type_idx: TypeId) -> u64 {
        self.type_ref(type_idx).hash
    }

    pub fn live_block_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn type_count(&self) -> usize {
        self.types.len()
    }
}

unsafe impl Send for Registry {}
unsafe impl Sync for Registry {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_creates_type_once_per_hash() {
        let r = Registry::new(64, 64);
        let t1 = r.register(0xAAAA, 0x1000, 64).unwrap();
        let t2 = r.register(0xAAAA, 0x2000, 128).unwrap();
        assert_eq!(t1, t2);
        assert_eq!(r.type_stats(t1), (2, 192));
        assert_eq!(r.type_count(), 1);
        assert_eq!(r.live_block_count(), 2);
    }

    #[test]
    fn unregister_adjusts_stats_and_frees_block() {
        let r = Registry::new(64, 64);
        let t = r.register(1, 0x1000, 100).unwrap();
        r.register(1, 0x2000, 50).unwrap();
        r.unregister(0x1000);
        assert_eq!(r.type_stats(t), (1, 50));
        assert_eq!(r.live_block_count(), 1);
        assert_eq!(r.hotness_of_addr(0x1000), None);
    }

    #[test]
    fn realloc_preserves_type_and_updates_size() {
        let r = Registry::new(64, 64);
        let t = r.register(7, 0x1000, 100).unwrap();
        r.realloc(0x1000, 0x5000, 300).unwrap();
        assert_eq!(r.type_stats(t), (1, 300));
        assert_eq!(r.hotness_of_addr(0x1000), None);
        assert!(r.hotness_of_addr(0x5000).is_some());
    }

    #[test]
    fn hotness_of_addr_respects_block_span() {
        let r = Registry::new(64, 64);
        r.register(1, 0x1000, 16).unwrap();
        assert!(r.hotness_of_addr(0x1000).is_some());
        assert!(r.hotness_of_addr(0x100F).is_some());
        assert_eq!(r.hotness_of_addr(0x1010), None);
    }

    #[test]
    fn set_hot_or_not_reports_cold_to_hot_transition_only() {
        let r = Registry::new(64, 64);
        let t = r.register(1, 0x1000, 16).unwrap();
        assert!(r.set_hot_or_not(t, HotOrNot::Hot));
        assert!(!r.set_hot_or_not(t, HotOrNot::Hot));
        assert!(!r.set_hot_or_not(t, HotOrNot::Cold));
        assert!(r.set_hot_or_not(t, HotOrNot::Hot));
    }

    #[test]
    fn hotness_of_hash_tracks_type_without_a_live_block() {
        let r = Registry::new(64, 64);
        let t = r.register(9, 0x1000, 16).unwrap();
        r.set_hot_or_not(t, HotOrNot::Hot);
        assert_eq!(r.hotness_of_hash(9), Some(HotOrNot::Hot));
        assert_eq!(r.hotness_of_hash(999), None);
    }
}
