/// Supplies the controller's observed input: the fraction of live bytes
/// currently sitting in the hot tier. Implemented by the placement layer
/// (spec component K), which owns the thread-local byte-counter shards this
/// is computed from; kept as a trait so this crate doesn't depend upward on
/// `tiermem`.
pub trait OccupancyObserver: Send + Sync {
    fn hot_tier_occupancy_fraction(&self) -> f64;
}

/// A fixed value, for tests and for callers that haven't wired up real byte
/// counters yet.
pub struct FixedOccupancy(pub f64);

impl OccupancyObserver for FixedOccupancy {
    fn hot_tier_occupancy_fraction(&self) -> f64 {
        self.0
    }
}
