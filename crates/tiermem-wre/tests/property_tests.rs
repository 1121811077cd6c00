//! Property-based tests for the weighted-quantile invariant: increasing
//! `ratio` in `find_weighted` never moves to an earlier (smaller) key, and
//! `total_weight` always equals the sum of what's actually live.

use std::cmp::Ordering;

use proptest::prelude::*;
use tiermem_wre::Wre;

fn by_key(a: &(i64, u64), b: &(i64, u64)) -> Ordering {
    a.0.cmp(&b.0)
}

proptest! {
    /// `total_weight()` always equals the sum of the `own_weight`s of
    /// whatever is still live in the tree, through interleaved puts and
    /// removes.
    #[test]
    fn prop_total_weight_tracks_live_entries(
        weights in prop::collection::vec(1.0f64..50.0, 1..40),
        remove_mask in prop::collection::vec(any::<bool>(), 1..40),
    ) {
        let mut t: Wre<(i64, u64)> = Wre::new(128, by_key);
        let handles: Vec<_> = weights
            .iter()
            .enumerate()
            .map(|(i, &w)| (t.put((i as i64, i as u64), w), w))
            .collect();

        let mut live_total: f64 = weights.iter().sum();
        prop_assert!((t.total_weight() - live_total).abs() < 1e-6);

        for (i, &(handle, weight)) in handles.iter().enumerate() {
            if remove_mask.get(i).copied().unwrap_or(false) {
                t.remove(handle);
                live_total -= weight;
            }
        }
        prop_assert!((t.total_weight() - live_total).abs() < 1e-6);
    }

    /// Walking `ratio` from 0 to 1 in increasing steps never returns a
    /// smaller key than a previous step — the weighted quantile is
    /// monotone in `ratio`.
    #[test]
    fn prop_find_weighted_is_monotone_in_ratio(
        weights in prop::collection::vec(1.0f64..20.0, 1..30),
        ratios in prop::collection::vec(0.0f64..1.0, 2..20),
    ) {
        let mut t: Wre<(i64, u64)> = Wre::new(64, by_key);
        for (i, &w) in weights.iter().enumerate() {
            t.put((i as i64, i as u64), w);
        }

        let mut sorted_ratios = ratios;
        sorted_ratios.sort_by(|a, b| a.partial_cmp(b).unwrap());

        let mut last_key = i64::MIN;
        for ratio in sorted_ratios {
            let key = t.find_weighted(ratio).unwrap().0;
            prop_assert!(key >= last_key, "ratio {} returned key {} < previous {}", ratio, key, last_key);
            last_key = key;
        }
    }

    /// The boundary ratios always land on the smallest and largest key.
    #[test]
    fn prop_find_weighted_boundaries(
        weights in prop::collection::vec(1.0f64..20.0, 1..30),
    ) {
        let mut t: Wre<(i64, u64)> = Wre::new(64, by_key);
        let n = weights.len();
        for (i, &w) in weights.iter().enumerate() {
            t.put((i as i64, i as u64), w);
        }

        prop_assert_eq!(t.find_weighted(0.0).unwrap().0, 0);
        prop_assert_eq!(t.find_weighted(1.0).unwrap().0, (n - 1) as i64);
    }
}
