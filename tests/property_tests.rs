//! Property-based tests for the alloc/free byte-counter invariant: in any
//! order of allocation and deallocation, the live total is always the sum
//! of currently-outstanding usable sizes, and freeing everything restores
//! it to zero.

use std::sync::Arc;

use proptest::prelude::*;
use tiermem::testing::SystemAllocatorKind;
use tiermem::{memtier_free, memtier_malloc, memtier_usable_size, AllocatorKind, Builder, Fingerprint, Kind, Policy};

proptest! {
    /// Allocating a random batch of sizes then freeing a random subset of
    /// them in arbitrary order always leaves `get_total_size()` equal to
    /// the sum of usable sizes still outstanding.
    #[test]
    fn prop_total_size_tracks_live_allocations(
        sizes in prop::collection::vec(1usize..4096, 1..60),
        free_mask in prop::collection::vec(any::<bool>(), 1..60),
    ) {
        let allocator = Arc::new(SystemAllocatorKind::new());
        let memory = Builder::new(Policy::StaticRatio, Arc::clone(&allocator) as Arc<dyn AllocatorKind>)
            .add_tier(Kind::Hot, 1.0)
            .build()
            .unwrap();

        let mut live = Vec::new();
        let mut expected_total: usize = 0;
        for (i, &size) in sizes.iter().enumerate() {
            let fp = Fingerprint::from_site_id(i as u64, size);
            let addr = memtier_malloc(&memory, fp, size).expect("system allocator must not fail for test sizes");
            expected_total += memtier_usable_size(&memory, addr);
            live.push(addr);
        }
        prop_assert_eq!(memory.get_total_size(), expected_total);

        for (i, addr) in live.iter().enumerate() {
            if free_mask.get(i).copied().unwrap_or(false) {
                expected_total -= memtier_usable_size(&memory, *addr);
                memtier_free(&memory, *addr);
            }
        }
        prop_assert_eq!(memory.get_total_size(), expected_total);
    }

    /// Freeing every live allocation, regardless of the sizes or the order
    /// they were taken in, always restores the total to zero.
    #[test]
    fn prop_free_all_restores_zero(sizes in prop::collection::vec(1usize..4096, 1..60)) {
        let allocator = Arc::new(SystemAllocatorKind::new());
        let memory = Builder::new(Policy::StaticRatio, Arc::clone(&allocator) as Arc<dyn AllocatorKind>)
            .add_tier(Kind::Hot, 1.0)
            .build()
            .unwrap();

        let addrs: Vec<_> = sizes
            .iter()
            .enumerate()
            .map(|(i, &size)| memtier_malloc(&memory, Fingerprint::from_site_id(i as u64, size), size).unwrap())
            .collect();

        for addr in addrs {
            memtier_free(&memory, addr);
        }
        prop_assert_eq!(memory.get_total_size(), 0);
    }
}
