//! Hotness ranking (spec component G): wraps a weighted-rank AVL tree
//! keyed by each type's access frequency, weighted by its total byte
//! size, so a weighted quantile query answers "what frequency is the
//! boundary of the hottest `r` fraction of live bytes."

use std::cmp::Ordering;
use tiermem_wre::Wre;

pub type TypeId = usize;

#[derive(Debug, Clone, Copy)]
struct Entry {
    frequency: f64,
    type_id: TypeId,
}

fn compare(a: &Entry, b: &Entry) -> Ordering {
    a.frequency
        .total_cmp(&b.frequency)
        .then_with(|| a.type_id.cmp(&b.type_id))
}

/// Per-type bookkeeping the ranking needs beyond what's in the tree: the
/// tree only holds `(frequency, type_id)` pairs, keyed for ordering, so
/// decay and weight updates need the current value to remove-then-reinsert
/// with.
#[derive(Debug, Clone, Copy, Default)]
struct Tracked {
    handle: Option<usize>,
    frequency: f64,
    weight: f64,
    last_touch: Option<u64>,
}

/// Tracks each registered type's frequency rank and answers weighted
/// hot/cold queries.
///
/// `w_old` is the EMA decay base (spec 4.G): weight halves every
/// `window * ln(0.5) / ln(w_old)` time units. `window` is `W` in the same
/// formula.
pub struct HotnessRanking {
    wre: Wre<Entry>,
    tracked: Vec<Tracked>,
    threshold: f64,
    window: f64,
    w_old: f64,
}

impl HotnessRanking {
    pub fn new(max_types: usize, window: f64, w_old: f64) -> Self {
        assert!(w_old > 0.0 && w_old < 1.0, "w_old must be in (0, 1)");
        assert!(window > 0.0, "window must be positive");
        Self {
            wre: Wre::new(max_types, compare),
            tracked: Vec::new(),
            threshold: 0.0,
            window,
            w_old,
        }
    }

    fn ensure_capacity(&mut self, type_id: TypeId) {
        if type_id >= self.tracked.len() {
            self.tracked.resize(type_id + 1, Tracked::default());
        }
    }

    /// Registers `type_id` with an initial `frequency`/`weight` (byte
    /// size). No-op if already present — callers needing to change an
    /// already-tracked type's values should call [`HotnessRanking::update`].
    pub fn add(&mut self, type_id: TypeId, frequency: f64, weight: f64) {
        self.ensure_capacity(type_id);
        if self.tracked[type_id].handle.is_some() {
            return;
        }
        let handle = self.wre.put(Entry { frequency, type_id }, weight);
        self.tracked[type_id] = Tracked {
            handle: Some(handle),
            frequency,
            weight,
            last_touch: None,
        };
    }

    pub fn remove(&mut self, type_id: TypeId) {
        if type_id >= self.tracked.len() {
            return;
        }
        if let Some(handle) = self.tracked[type_id].handle.take() {
            self.wre.remove(handle);
        }
    }

    /// Atomically replaces `type_id`'s frequency and weight, preserving
    /// its position by key (remove, then reinsert).
    pub fn update(&mut self, type_id: TypeId, frequency: f64, weight: f64) {
        let last_touch = self.tracked.get(type_id).and_then(|t| t.last_touch);
        self.remove(type_id);
        self.ensure_capacity(type_id);
        let handle = self.wre.put(Entry { frequency, type_id }, weight);
        self.tracked[type_id] = Tracked {
            handle: Some(handle),
            frequency,
            weight,
            last_touch,
        };
    }

    /// Applies the exponential decay rule and reinserts at the updated
    /// frequency: `f <- w_old^(delta/window) * f + add_hotness`, clamped
    /// to `>= 0`. The very first touch (no prior timestamp) sets
    /// `f = add_hotness` directly (no history to decay).
    pub fn touch(&mut self, type_id: TypeId, timestamp: u64, add_hotness: f64) {
        self.ensure_capacity(type_id);
        let prev = self.tracked[type_id];
        let new_frequency = match prev.last_touch {
            None => add_hotness,
            Some(t_prev) => {
                let delta = timestamp.saturating_sub(t_prev) as f64;
                let alpha = self.w_old.powf(delta / self.window);
                (alpha * prev.frequency + add_hotness).max(0.0)
            }
        };

        self.remove(type_id);
        let handle = self.wre.put(
            Entry {
                frequency: new_frequency,
                type_id,
            },
            prev.weight,
        );
        self.tracked[type_id] = Tracked {
            handle: Some(handle),
            frequency: new_frequency,
            weight: prev.weight,
            last_touch: Some(timestamp),
        };
    }

    pub fn frequency_of(&self, type_id: TypeId) -> f64 {
        self.tracked
            .get(type_id)
            .map_or(0.0, |t| t.frequency)
    }

    /// Computes and stores the frequency threshold at which the hottest
    /// `r` fraction of live bytes lies above it, then returns it.
    ///
    /// `r = 0` never classifies anything as hot (`+inf`); `r = 1` always
    /// does (`0.0`); an empty ranking has nothing to be hot, so `0.0`.
    pub fn hot_threshold_for_ratio(&mut self, r: f64) -> f64 {
        self.threshold = if self.wre.is_empty() {
            0.0
        } else if r <= 0.0 {
            f64::INFINITY
        } else if r >= 1.0 {
            0.0
        } else {
            self.wre
                .find_weighted(1.0 - r)
                .map_or(0.0, |e| e.frequency)
        };
        self.threshold
    }

    pub fn last_threshold(&self) -> f64 {
        self.threshold
    }

    pub fn is_hot(&self, type_id: TypeId) -> bool {
        self.frequency_of(type_id) >= self.threshold
    }

    pub fn len(&self) -> usize {
        self.wre.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wre.is_empty()
    }
}
