use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use tiermem_consumer::{Consumer, ConsumerConfig, Event, OccupancyObserver};
use tiermem_ring::{Channel, Config as RingConfig, MetricsSnapshot, Producer};
use tiermem_sampling::{SampleSource, SamplingWorker};

use crate::config::TierMemConfig;
use crate::counters::ByteCounters;
use crate::error::TierMemError;
use crate::fingerprint::Fingerprint;
use crate::kind::{AllocatorKind, Kind};
use crate::policy::{DataHotnessState, DynamicThresholdState, Policy, StaticRatioState, TierSpec};

/// Read-only access to the placement state (spec §6 Observability):
/// achieved vs. target hot-tier occupancy, total tracked bytes, and the
/// dropped-event counters from the background event ring (the `Metrics`
/// type supplemented from `original_source`'s `ttype` counters, not named
/// in spec.md's distillation — see `SPEC_FULL.md`'s ambient-stack section).
pub trait Observability {
    fn get_actual_hot_to_total_ratio(&self) -> f64;
    fn get_desired_hot_to_total_ratio(&self) -> f64;
    fn get_total_size(&self) -> usize;
    /// `None` for policies that don't run a background event pipeline
    /// (`StaticRatio`, `DynamicThreshold`).
    fn ring_metrics(&self) -> Option<MetricsSnapshot>;
}

enum PolicyState {
    StaticRatio(StaticRatioState),
    DynamicThreshold(DynamicThresholdState),
    DataHotness(DataHotnessState),
}

struct CounterOccupancy(Arc<ByteCounters>);

impl OccupancyObserver for CounterOccupancy {
    fn hot_tier_occupancy_fraction(&self) -> f64 {
        let total = self.0.total_bytes();
        if total <= 0 {
            return 0.0;
        }
        (self.0.hot_bytes().max(0) as f64 / total as f64).clamp(0.0, 1.0)
    }
}

fn desired_hot_ratio(tiers: &[TierSpec]) -> f64 {
    let total: f32 = tiers.iter().map(|t| t.ratio_weight).sum();
    if total <= 0.0 {
        return 0.0;
    }
    let hot: f32 = tiers.iter().filter(|t| t.kind == Kind::Hot).map(|t| t.ratio_weight).sum();
    f64::from(hot / total)
}

/// Builds a [`TierMem`] (spec §6 `builder_new`/`builder_add_tier`/`build`).
pub struct Builder {
    policy: Policy,
    allocator: Arc<dyn AllocatorKind>,
    tiers: Vec<TierSpec>,
    config: TierMemConfig,
    sample_source: Option<Box<dyn SampleSource>>,
    on_first_sight: Kind,
}

impl Builder {
    pub fn new(policy: Policy, allocator: Arc<dyn AllocatorKind>) -> Self {
        Self {
            policy,
            allocator,
            tiers: Vec::new(),
            config: TierMemConfig::default(),
            sample_source: None,
            on_first_sight: Kind::Hot,
        }
    }

    pub fn add_tier(mut self, kind: Kind, ratio_weight: f32) -> Self {
        self.tiers.push(TierSpec { kind, ratio_weight });
        self
    }

    pub fn with_config(mut self, config: TierMemConfig) -> Self {
        self.config = config;
        self
    }

    /// Supplies the hardware (or synthetic) access-sample source the
    /// `DataHotness` policy's background sampler polls. Ignored by the
    /// other two policies.
    pub fn with_sample_source(mut self, source: Box<dyn SampleSource>) -> Self {
        self.sample_source = Some(source);
        self
    }

    /// Overrides the default NOT_FOUND routing (spec §9 Open Question: this
    /// crate resolves it as "route to the hot kind", exposed here as a
    /// runtime knob instead of the original's compile-time flag).
    pub fn on_first_sight(mut self, kind: Kind) -> Self {
        self.on_first_sight = kind;
        self
    }

    pub fn build(self) -> Result<TierMem, TierMemError> {
        TierMem::from_builder(self)
    }
}

/// The tiered memory object (spec §6 `build(builder) -> memory`): the
/// placement fast path plus whatever background machinery the selected
/// policy needs — nothing, for `StaticRatio`/`DynamicThreshold`; a
/// registry, ranking, controller, consumer thread, and optionally a
/// sampling thread, for `DataHotness`.
pub struct TierMem {
    allocator: Arc<dyn AllocatorKind>,
    policy: PolicyState,
    counters: Arc<ByteCounters>,
    desired_ratio: f64,

    event_channel: Option<Channel<Event>>,
    event_producer: Option<Producer<Event>>,
    consumer_shutdown: Option<Arc<AtomicBool>>,
    consumer_handle: Option<JoinHandle<()>>,
    sampling: Option<SamplingWorker>,
}

impl TierMem {
    fn from_builder(builder: Builder) -> Result<TierMem, TierMemError> {
        if builder.tiers.is_empty() {
            return Err(TierMemError::NoTiersConfigured);
        }

        let desired_ratio = desired_hot_ratio(&builder.tiers);
        let counters = ByteCounters::with_flush_threshold(builder.config.counter_flush_threshold);

        let (policy, event_channel, event_producer, consumer_shutdown, consumer_handle, sampling) =
            match builder.policy {
                Policy::StaticRatio => (
                    PolicyState::StaticRatio(StaticRatioState::new(&builder.tiers)),
                    None,
                    None,
                    None,
                    None,
                    None,
                ),
                Policy::DynamicThreshold => {
                    let hot_kind = builder
                        .tiers
                        .iter()
                        .find(|t| t.kind == Kind::Hot)
                        .map_or(Kind::Hot, |t| t.kind);
                    let cold_kind = builder
                        .tiers
                        .iter()
                        .map(|t| t.kind)
                        .find(|k| *k != hot_kind)
                        .unwrap_or_else(|| hot_kind.other());
                    (
                        PolicyState::DynamicThreshold(DynamicThresholdState::new(hot_kind, cold_kind, desired_ratio)),
                        None,
                        None,
                        None,
                        None,
                        None,
                    )
                }
                Policy::DataHotness => {
                    if builder.tiers.len() != 2 || !builder.tiers.iter().any(|t| t.kind == Kind::Hot) {
                        return Err(TierMemError::DataHotnessRequiresTwoTiers);
                    }

                    let channel = Channel::<Event>::new(RingConfig::default());
                    let mutator_producer = channel.register().map_err(channel_err)?;

                    let observer: Arc<dyn OccupancyObserver> = Arc::new(CounterOccupancy(Arc::clone(&counters)));
                    let consumer_config = ConsumerConfig {
                        target_hot_ratio: desired_ratio,
                        hotness_window: builder.config.hotness_measure_window_ns,
                        w_old: builder.config.old_time_window_hotness_weight,
                        ..ConsumerConfig::default()
                    };
                    let mut consumer = Consumer::new(channel.clone(), consumer_config, observer);
                    let registry = consumer.registry_handle();

                    let shutdown = Arc::new(AtomicBool::new(false));
                    let shutdown_thread = Arc::clone(&shutdown);
                    let handle = std::thread::Builder::new()
                        .name("tiermem-consumer".into())
                        .spawn(move || consumer.run(&shutdown_thread))
                        .expect("failed to spawn consumer thread");

                    let sampling = match builder.sample_source {
                        Some(source) => {
                            let sample_producer = channel.register().map_err(channel_err)?;
                            Some(SamplingWorker::spawn(source, sample_producer, builder.config.pebs_freq_hz))
                        }
                        None => None,
                    };

                    (
                        PolicyState::DataHotness(DataHotnessState::new(
                            registry,
                            Kind::Hot,
                            Kind::Cold,
                            builder.on_first_sight,
                        )),
                        Some(channel),
                        Some(mutator_producer),
                        Some(shutdown),
                        Some(handle),
                        sampling,
                    )
                }
            };

        Ok(TierMem {
            allocator: builder.allocator,
            policy,
            counters,
            desired_ratio,
            event_channel,
            event_producer,
            consumer_shutdown,
            consumer_handle,
            sampling,
        })
    }

    fn classify(&self, fingerprint: Fingerprint, size: usize) -> Kind {
        match &self.policy {
            PolicyState::StaticRatio(state) => state.next_kind(),
            PolicyState::DynamicThreshold(state) => state.classify(size),
            PolicyState::DataHotness(state) => state.classify(fingerprint),
        }
    }

    fn after_placement(&self, size: usize) {
        if let PolicyState::DynamicThreshold(state) = &self.policy {
            state.maybe_recheck(self.get_actual_hot_to_total_ratio());
        }
        let _ = size;
    }

    fn emit(&self, event: Event) {
        if let Some(producer) = &self.event_producer {
            if !producer.push(event) {
                tracing::warn!("event ring full, dropping event");
            }
        }
    }

    /// Spec §4.K step 1-3: fingerprint is already computed by the caller
    /// (see [`Fingerprint::from_site_id`]); this consults placement,
    /// performs the allocation, banks the byte counter, and enqueues
    /// `CREATE_ADD`.
    pub fn malloc(&self, fingerprint: Fingerprint, size: usize) -> Option<u64> {
        let kind = self.classify(fingerprint, size);
        let addr = self.allocator.alloc(kind, size)?;
        let usable = self.allocator.usable_size(addr);
        self.counters.bank(kind, usable as i64);
        self.emit(Event::CreateAdd {
            hash: fingerprint.hash(),
            addr,
            size: usable,
        });
        self.after_placement(size);
        Some(addr)
    }

    pub fn calloc(&self, fingerprint: Fingerprint, nmemb: usize, size: usize) -> Option<u64> {
        let total = nmemb.checked_mul(size)?;
        self.malloc(fingerprint, total)
    }

    pub fn posix_memalign(&self, fingerprint: Fingerprint, align: usize, size: usize) -> Option<u64> {
        let kind = self.classify(fingerprint, size);
        let addr = self.allocator.posix_memalign(kind, align, size)?;
        let usable = self.allocator.usable_size(addr);
        self.counters.bank(kind, usable as i64);
        self.emit(Event::CreateAdd {
            hash: fingerprint.hash(),
            addr,
            size: usable,
        });
        self.after_placement(size);
        Some(addr)
    }

    /// Spec §4.K step 5: combination of free+alloc at the existing kind;
    /// the block keeps its type identity (§9's resolved Open Question —
    /// REALLOC never recomputes the fingerprint/hash for the new size).
    pub fn realloc(&self, addr: u64, new_size: usize) -> Option<u64> {
        let kind = self.allocator.detect_kind(addr)?;
        let old_usable = self.allocator.usable_size(addr);
        let new_addr = self.allocator.realloc(kind, addr, new_size)?;
        let new_usable = self.allocator.usable_size(new_addr);
        self.counters.bank(kind, new_usable as i64 - old_usable as i64);
        self.emit(Event::Realloc {
            old_addr: addr,
            new_addr,
            old_size: old_usable,
            new_size: new_usable,
        });
        Some(new_addr)
    }

    /// Spec §4.K step 4: detect kind, adjust the counter, enqueue
    /// `DESTROY_REMOVE`, free. A `free` of an address the allocator doesn't
    /// recognize is a no-op (mirrors libc `free(NULL)`).
    pub fn free(&self, addr: u64) {
        let Some(kind) = self.allocator.detect_kind(addr) else {
            return;
        };
        let usable = self.allocator.usable_size(addr);
        self.allocator.free(kind, addr);
        self.counters.bank(kind, -(usable as i64));
        self.emit(Event::DestroyRemove { addr, size: usable });
    }

    pub fn usable_size(&self, addr: u64) -> usize {
        self.allocator.usable_size(addr)
    }
}

fn channel_err(e: tiermem_ring::ChannelError) -> TierMemError {
    TierMemError::InvalidConfig {
        name: "event_channel",
        reason: e.to_string(),
    }
}

impl Observability for TierMem {
    fn get_actual_hot_to_total_ratio(&self) -> f64 {
        let total = self.counters.total_bytes();
        if total <= 0 {
            return 0.0;
        }
        (self.counters.hot_bytes().max(0) as f64 / total as f64).clamp(0.0, 1.0)
    }

    fn get_desired_hot_to_total_ratio(&self) -> f64 {
        self.desired_ratio
    }

    fn get_total_size(&self) -> usize {
        self.counters.total_bytes().max(0) as usize
    }

    fn ring_metrics(&self) -> Option<MetricsSnapshot> {
        self.event_channel.as_ref().map(|channel| channel.metrics())
    }
}

impl Drop for TierMem {
    /// Spec §5 shutdown order: drain the sampler first, then the consumer,
    /// then (implicitly, via field drop order) the indices/arenas it owns.
    fn drop(&mut self) {
        if let Some(sampling) = self.sampling.take() {
            sampling.shutdown();
        }
        if let Some(shutdown) = self.consumer_shutdown.take() {
            shutdown.store(true, Ordering::Release);
        }
        if let Some(handle) = self.consumer_handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::SystemAllocatorKind;

    #[test]
    fn static_ratio_allocates_and_frees_through_system_allocator() {
        let allocator = Arc::new(SystemAllocatorKind::new());
        let memory = Builder::new(Policy::StaticRatio, allocator)
            .add_tier(Kind::Hot, 1.0)
            .build()
            .unwrap();

        let addr = memory.malloc(Fingerprint::from_site_id(1, 64), 64).unwrap();
        assert_eq!(memory.get_total_size(), memory.usable_size(addr));
        memory.free(addr);
        assert_eq!(memory.get_total_size(), 0);
    }

    #[test]
    fn build_rejects_empty_tier_list() {
        let allocator = Arc::new(SystemAllocatorKind::new());
        let result = Builder::new(Policy::StaticRatio, allocator).build();
        assert!(matches!(result, Err(TierMemError::NoTiersConfigured)));
    }

    #[test]
    fn data_hotness_rejects_wrong_tier_count() {
        let allocator = Arc::new(SystemAllocatorKind::new());
        let result = Builder::new(Policy::DataHotness, allocator).add_tier(Kind::Hot, 1.0).build();
        assert!(matches!(result, Err(TierMemError::DataHotnessRequiresTwoTiers)));
    }

    #[test]
    fn data_hotness_routes_first_sighting_to_configured_default() {
        let allocator = Arc::new(SystemAllocatorKind::new());
        let memory = Builder::new(Policy::DataHotness, allocator)
            .add_tier(Kind::Hot, 1.0)
            .add_tier(Kind::Cold, 1.0)
            .on_first_sight(Kind::Cold)
            .build()
            .unwrap();

        let addr = memory.malloc(Fingerprint::from_site_id(0xAAAA, 32), 32).unwrap();
        assert_eq!(memory.allocator.detect_kind(addr), Some(Kind::Cold));
        memory.free(addr);
    }

    #[test]
    fn realloc_keeps_growing_allocation_alive() {
        let allocator = Arc::new(SystemAllocatorKind::new());
        let memory = Builder::new(Policy::StaticRatio, allocator)
            .add_tier(Kind::Hot, 1.0)
            .build()
            .unwrap();

        let addr = memory.malloc(Fingerprint::from_site_id(2, 16), 16).unwrap();
        let addr = memory.realloc(addr, 256).unwrap();
        assert!(memory.usable_size(addr) >= 256);
        memory.free(addr);
    }
}
