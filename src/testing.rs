//! A `std::alloc::System`-backed [`AllocatorKind`] test double (spec §6),
//! used by this crate's own integration tests and never shipped as *the*
//! allocator — the raw per-kind allocator is explicitly out of scope
//! (spec §1).

use std::alloc::{self, Layout};
use std::collections::HashMap;
use std::sync::Mutex;

use crate::kind::{AllocatorKind, Kind};

/// Two independent `std::alloc::System`-backed regions standing in for
/// HOT_KIND/COLD_KIND. Tracks each live allocation's [`Layout`] so
/// `free`/`realloc`/`usable_size`/`detect_kind` can recover it from just
/// the address, the way a real kind implementation recovers it from an
/// allocator header.
pub struct SystemAllocatorKind {
    hot: Mutex<HashMap<u64, Layout>>,
    cold: Mutex<HashMap<u64, Layout>>,
}

impl SystemAllocatorKind {
    pub fn new() -> Self {
        Self {
            hot: Mutex::new(HashMap::new()),
            cold: Mutex::new(HashMap::new()),
        }
    }

    fn table(&self, kind: Kind) -> &Mutex<HashMap<u64, Layout>> {
        match kind {
            Kind::Hot => &self.hot,
            Kind::Cold => &self.cold,
        }
    }
}

impl Default for SystemAllocatorKind {
    fn default() -> Self {
        Self::new()
    }
}

impl AllocatorKind for SystemAllocatorKind {
    fn alloc(&self, kind: Kind, size: usize) -> Option<u64> {
        let layout = Layout::from_size_align(size.max(1), 8).ok()?;
        // SAFETY: `layout` has a nonzero size by construction above.
        let ptr = unsafe { alloc::alloc(layout) };
        if ptr.is_null() {
            return None;
        }
        let addr = ptr as u64;
        self.table(kind).lock().unwrap().insert(addr, layout);
        Some(addr)
    }

    fn free(&self, kind: Kind, addr: u64) {
        if let Some(layout) = self.table(kind).lock().unwrap().remove(&addr) {
            // SAFETY: `addr`/`layout` came from a matching `alloc`/`realloc`
            // call on this same table and haven't been freed since.
            unsafe { alloc::dealloc(addr as *mut u8, layout) };
        }
    }

    fn realloc(&self, kind: Kind, addr: u64, size: usize) -> Option<u64> {
        let mut table = self.table(kind).lock().unwrap();
        let old_layout = table.remove(&addr)?;
        let new_size = size.max(1);
        // SAFETY: `addr`/`old_layout` are the layout this allocation was
        // made with; `new_size` is nonzero.
        let new_ptr = unsafe { alloc::realloc(addr as *mut u8, old_layout, new_size) };
        if new_ptr.is_null() {
            table.insert(addr, old_layout);
            return None;
        }
        let new_layout = Layout::from_size_align(new_size, old_layout.align()).ok()?;
        let new_addr = new_ptr as u64;
        table.insert(new_addr, new_layout);
        Some(new_addr)
    }

    fn posix_memalign(&self, kind: Kind, align: usize, size: usize) -> Option<u64> {
        let layout = Layout::from_size_align(size.max(1), align.max(1)).ok()?;
        // SAFETY: `layout` has a nonzero size by construction above.
        let ptr = unsafe { alloc::alloc(layout) };
        if ptr.is_null() {
            return None;
        }
        let addr = ptr as u64;
        self.table(kind).lock().unwrap().insert(addr, layout);
        Some(addr)
    }

    fn usable_size(&self, addr: u64) -> usize {
        for kind in [Kind::Hot, Kind::Cold] {
            if let Some(layout) = self.table(kind).lock().unwrap().get(&addr) {
                return layout.size();
            }
        }
        0
    }

    fn detect_kind(&self, addr: u64) -> Option<Kind> {
        if self.hot.lock().unwrap().contains_key(&addr) {
            return Some(Kind::Hot);
        }
        if self.cold.lock().unwrap().contains_key(&addr) {
            return Some(Kind::Cold);
        }
        None
    }
}
