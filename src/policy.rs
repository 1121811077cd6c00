use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use tiermem_registry::{HotOrNot, Registry};

use crate::fingerprint::Fingerprint;
use crate::kind::Kind;

/// One tier's configuration inside a [`crate::Builder`] (spec §6
/// `builder_add_tier`).
#[derive(Debug, Clone, Copy)]
pub struct TierSpec {
    pub kind: Kind,
    pub ratio_weight: f32,
}

/// Placement policy selection (spec §9's redesign flag: a tagged variant
/// over the three policies replaces the original's function-pointer table,
/// dispatched with a `match` in placement rather than indirect calls).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    /// Allocations are distributed across tiers proportionally to their
    /// configured `ratio_weight`, independent of access behavior.
    StaticRatio,
    /// Allocations are routed by size against a threshold nudged toward the
    /// configured ratio every `THRESHOLD_CHECK_CNT` operations (spec §9:
    /// "orthogonal to the hotness core but shares the byte-counter
    /// infrastructure").
    DynamicThreshold,
    /// Allocations are routed by measured access hotness (spec §4.K) — the
    /// hard part this crate exists for. Requires exactly two tiers, one of
    /// them [`Kind::Hot`].
    DataHotness,
}

/// Deterministic weighted round-robin over the configured tiers, used by
/// [`Policy::StaticRatio`]. Weights are integerized into a repeating
/// sequence computed once at build time so the same input history always
/// produces the same placement sequence.
pub(crate) struct StaticRatioState {
    sequence: Vec<Kind>,
    cursor: AtomicUsize,
}

impl StaticRatioState {
    pub(crate) fn new(tiers: &[TierSpec]) -> Self {
        const RESOLUTION: usize = 100;
        let total_weight: f32 = tiers.iter().map(|t| t.ratio_weight).sum();
        let mut sequence = Vec::with_capacity(RESOLUTION);
        if total_weight > 0.0 {
            for tier in tiers {
                let slots = ((tier.ratio_weight / total_weight) * RESOLUTION as f32).round() as usize;
                sequence.extend(std::iter::repeat(tier.kind).take(slots));
            }
        }
        if sequence.is_empty() {
            sequence.push(tiers.first().map_or(Kind::Hot, |t| t.kind));
        }
        Self {
            sequence,
            cursor: AtomicUsize::new(0),
        }
    }

    pub(crate) fn next_kind(&self) -> Kind {
        let i = self.cursor.fetch_add(1, Ordering::Relaxed) % self.sequence.len();
        self.sequence[i]
    }
}

// Defaults mirror `original_source/src/memkind_memtier.c`'s
// THRESHOLD_TRIGGER/DEGREE/CHECK_CNT/STEP constants for the
// DYNAMIC_THRESHOLD policy.
const THRESHOLD_TRIGGER: f64 = 0.02;
const THRESHOLD_DEGREE: f64 = 0.15;
const THRESHOLD_CHECK_CNT: u64 = 20;
const THRESHOLD_STEP: u64 = 1024;
const DEFAULT_SIZE_THRESHOLD: u64 = 8192;

/// Size-threshold classifier for [`Policy::DynamicThreshold`]: allocations
/// smaller than `threshold` go to `hot_kind`, the rest to `cold_kind`.
/// `threshold` is nudged every `THRESHOLD_CHECK_CNT` operations toward
/// `desired_ratio` whenever the observed/desired gap exceeds
/// `THRESHOLD_TRIGGER`.
pub(crate) struct DynamicThresholdState {
    threshold: AtomicU64,
    ops_since_check: AtomicU64,
    hot_kind: Kind,
    cold_kind: Kind,
    desired_ratio: f64,
}

impl DynamicThresholdState {
    pub(crate) fn new(hot_kind: Kind, cold_kind: Kind, desired_ratio: f64) -> Self {
        Self {
            threshold: AtomicU64::new(DEFAULT_SIZE_THRESHOLD),
            ops_since_check: AtomicU64::new(0),
            hot_kind,
            cold_kind,
            desired_ratio,
        }
    }

    pub(crate) fn classify(&self, size: usize) -> Kind {
        if (size as u64) < self.threshold.load(Ordering::Relaxed) {
            self.hot_kind
        } else {
            self.cold_kind
        }
    }

    /// Called once per allocation after placement; recomputes the
    /// size threshold every `THRESHOLD_CHECK_CNT` calls against the
    /// currently observed hot-to-total ratio.
    pub(crate) fn maybe_recheck(&self, actual_ratio: f64) {
        let n = self.ops_since_check.fetch_add(1, Ordering::Relaxed) + 1;
        if n < THRESHOLD_CHECK_CNT {
            return;
        }
        self.ops_since_check.store(0, Ordering::Relaxed);

        let diff = actual_ratio - self.desired_ratio;
        if diff.abs() < THRESHOLD_TRIGGER {
            return;
        }

        let current = self.threshold.load(Ordering::Relaxed);
        let step = ((current as f64) * THRESHOLD_DEGREE).max(THRESHOLD_STEP as f64) as u64;
        if diff > 0.0 {
            // Too much is landing in the hot tier: shrink the threshold so
            // fewer allocations qualify.
            self.threshold.store(current.saturating_sub(step).max(1), Ordering::Relaxed);
        } else {
            self.threshold.fetch_add(step, Ordering::Relaxed);
        }
    }

    #[cfg(test)]
    pub(crate) fn current_threshold(&self) -> u64 {
        self.threshold.load(Ordering::Relaxed)
    }
}

/// Hotness-based classifier for [`Policy::DataHotness`]: consults the
/// shared [`Registry`] the background consumer maintains.
pub(crate) struct DataHotnessState {
    registry: Arc<Registry>,
    hot_kind: Kind,
    cold_kind: Kind,
    on_first_sight: Kind,
}

impl DataHotnessState {
    pub(crate) fn new(registry: Arc<Registry>, hot_kind: Kind, cold_kind: Kind, on_first_sight: Kind) -> Self {
        Self {
            registry,
            hot_kind,
            cold_kind,
            on_first_sight,
        }
    }

    /// Routes by the fingerprint's current classification (spec §4.K):
    /// HOT/COLD route to their kind; a fingerprint never seen before, or
    /// seen but not yet classified (spec §4.L's `UNINIT`/
    /// `INSUFFICIENT_DATA` states), routes to `on_first_sight`.
    pub(crate) fn classify(&self, fingerprint: Fingerprint) -> Kind {
        match self.registry.hotness_of_hash(fingerprint.hash()) {
            Some(HotOrNot::Hot) => self.hot_kind,
            Some(HotOrNot::Cold) => self.cold_kind,
            Some(HotOrNot::Unclassified) | None => self.on_first_sight,
        }
    }
}
