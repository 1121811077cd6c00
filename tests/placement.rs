use std::sync::Arc;
use std::time::Duration;

use tiermem::testing::SystemAllocatorKind;
use tiermem::{memtier_free, memtier_malloc, memtier_usable_size, Builder, Fingerprint, Kind, Observability, Policy, TierMemConfig};
use tiermem_sampling::SyntheticSampleSource;

fn retry_until<F: FnMut() -> bool>(timeout: Duration, step: Duration, mut check: F) -> bool {
    let start = std::time::Instant::now();
    loop {
        if check() {
            return true;
        }
        if start.elapsed() >= timeout {
            return false;
        }
        std::thread::sleep(step);
    }
}

/// Spec §8 scenario 1: single tier, ratio 1 — every allocation lands on
/// HOT_KIND and the observability surface's total matches the sum of
/// usable sizes.
#[test]
fn single_tier_static_routes_everything_hot() {
    let allocator = Arc::new(SystemAllocatorKind::new());
    let memory = Builder::new(Policy::StaticRatio, Arc::clone(&allocator) as Arc<dyn tiermem::AllocatorKind>)
        .add_tier(Kind::Hot, 1.0)
        .build()
        .unwrap();

    let sizes = [16usize, 64, 256, 33, 1024];
    let mut addrs = Vec::new();
    let mut expected_total = 0usize;
    for i in 0..1000usize {
        let size = sizes[i % sizes.len()];
        let fp = Fingerprint::from_site_id(i as u64, size);
        let addr = memtier_malloc(&memory, fp, size).expect("system allocator must not fail for tiny sizes");
        assert_eq!(allocator.detect_kind(addr), Some(Kind::Hot));
        expected_total += memtier_usable_size(&memory, addr);
        addrs.push(addr);
    }

    assert_eq!(memory.get_total_size(), expected_total);

    for addr in addrs {
        memtier_free(&memory, addr);
    }
    assert_eq!(memory.get_total_size(), 0);
}

/// Spec §8's register-then-unregister round-trip law: freeing every live
/// allocation restores the byte counter to zero.
#[test]
fn free_after_alloc_restores_byte_counter_to_zero() {
    let allocator = Arc::new(SystemAllocatorKind::new());
    let memory = Builder::new(Policy::StaticRatio, Arc::clone(&allocator) as Arc<dyn tiermem::AllocatorKind>)
        .add_tier(Kind::Hot, 1.0)
        .build()
        .unwrap();

    let fp = Fingerprint::from_site_id(7, 48);
    let a = memtier_malloc(&memory, fp, 48).unwrap();
    let b = memtier_malloc(&memory, fp, 48).unwrap();
    assert!(memory.get_total_size() > 0);

    memtier_free(&memory, a);
    memtier_free(&memory, b);
    assert_eq!(memory.get_total_size(), 0);
}

/// Spec §8 scenario 2 (adapted to this crate's API): two tiers, target
/// ratio 0.5. Ten "hot" call sites are touched far more than ten "cold"
/// ones; once the background consumer has processed the touches, fresh
/// allocations from the hot sites route to HOT_KIND and from the cold
/// sites to COLD_KIND.
#[test]
fn two_tier_hotness_classifies_by_touch_frequency() {
    const SITE_COUNT: usize = 10;
    const SIZE: usize = 64;

    let allocator = Arc::new(SystemAllocatorKind::new());
    let source = Arc::new(SyntheticSampleSource::new([]));

    let config = TierMemConfig {
        counter_flush_threshold: 1,
        ..TierMemConfig::default()
    };

    let memory = Builder::new(Policy::DataHotness, Arc::clone(&allocator) as Arc<dyn tiermem::AllocatorKind>)
        .add_tier(Kind::Hot, 1.0)
        .add_tier(Kind::Cold, 1.0)
        .with_config(config)
        .with_sample_source(Box::new(Arc::clone(&source)))
        .on_first_sight(Kind::Cold)
        .build()
        .unwrap();

    let hot_sites: Vec<Fingerprint> = (0..SITE_COUNT).map(|i| Fingerprint::from_site_id(0x1000 + i as u64, SIZE)).collect();
    let cold_sites: Vec<Fingerprint> = (0..SITE_COUNT).map(|i| Fingerprint::from_site_id(0x2000 + i as u64, SIZE)).collect();

    // First sighting: register every site's type and keep the blocks alive
    // long enough for TOUCH events (addressed, not hashed) to land on them.
    let mut hot_addrs = Vec::new();
    let mut cold_addrs = Vec::new();
    for fp in &hot_sites {
        hot_addrs.push(memtier_malloc(&memory, *fp, SIZE).unwrap());
    }
    for fp in &cold_sites {
        cold_addrs.push(memtier_malloc(&memory, *fp, SIZE).unwrap());
    }

    let registered = retry_until(Duration::from_secs(2), Duration::from_millis(10), || {
        memory.get_total_size() >= (hot_addrs.len() + cold_addrs.len()) * SIZE
    });
    assert!(registered, "consumer never registered the first-sighting allocations");

    let mut ts = 1u64;
    for &addr in &hot_addrs {
        for _ in 0..200 {
            source.push(addr, ts);
            ts += 1;
        }
    }
    for &addr in &cold_addrs {
        source.push(addr, ts);
        ts += 1;
    }

    for addr in hot_addrs.drain(..).chain(cold_addrs.drain(..)) {
        memtier_free(&memory, addr);
    }

    let reclassified = retry_until(Duration::from_secs(5), Duration::from_millis(20), || {
        let hot_addr = memtier_malloc(&memory, hot_sites[0], SIZE);
        let cold_addr = memtier_malloc(&memory, cold_sites[0], SIZE);
        let ok = matches!(
            (hot_addr.and_then(|a| allocator.detect_kind(a)), cold_addr.and_then(|a| allocator.detect_kind(a))),
            (Some(Kind::Hot), Some(Kind::Cold))
        );
        if let Some(a) = hot_addr {
            memtier_free(&memory, a);
        }
        if let Some(a) = cold_addr {
            memtier_free(&memory, a);
        }
        ok
    });
    assert!(reclassified, "hot sites never classified HOT and cold sites never classified COLD in time");
}
