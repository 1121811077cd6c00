use std::sync::Arc;

use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use tiermem::testing::SystemAllocatorKind;
use tiermem::{memtier_free, memtier_malloc, AllocatorKind, Builder, Fingerprint, Kind, Policy};

fn static_ratio_round_trip(c: &mut Criterion) {
    let allocator: Arc<dyn AllocatorKind> = Arc::new(SystemAllocatorKind::new());
    let memory = Builder::new(Policy::StaticRatio, allocator).add_tier(Kind::Hot, 1.0).add_tier(Kind::Cold, 1.0).build().unwrap();

    c.bench_function("static_ratio_malloc_free_256b", |b| {
        b.iter_batched(
            || Fingerprint::from_site_id(0x42, 256),
            |fp| {
                let addr = memtier_malloc(&memory, fp, 256).unwrap();
                memtier_free(&memory, addr);
            },
            BatchSize::SmallInput,
        );
    });
}

fn dynamic_threshold_round_trip(c: &mut Criterion) {
    let allocator: Arc<dyn AllocatorKind> = Arc::new(SystemAllocatorKind::new());
    let memory = Builder::new(Policy::DynamicThreshold, allocator).add_tier(Kind::Hot, 1.0).add_tier(Kind::Cold, 1.0).build().unwrap();

    let mut size = 64usize;
    c.bench_function("dynamic_threshold_malloc_free_varying", |b| {
        b.iter(|| {
            size = size.wrapping_mul(3).wrapping_add(7) % 16_384 + 1;
            let fp = Fingerprint::from_site_id(0x99, size);
            let addr = memtier_malloc(&memory, fp, size).unwrap();
            memtier_free(&memory, addr);
        });
    });
}

criterion_group!(benches, static_ratio_round_trip, dynamic_threshold_round_trip);
criterion_main!(benches);
