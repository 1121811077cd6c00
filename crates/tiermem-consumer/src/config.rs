use std::time::Duration;

/// Tuning knobs for [`crate::Consumer`]'s steady-state loop, populated from
/// `tiermem`'s environment-variable parsing (`HOTNESS_MEASURE_WINDOW`,
/// `OLD_TIME_WINDOW_HOTNESS_WEIGHT`) or test defaults.
#[derive(Debug, Clone, Copy)]
pub struct ConsumerConfig {
    /// Max events drained per loop iteration (`K`).
    pub batch_size: usize,
    /// Recompute the threshold after this many loop iterations with no
    /// events processed yet reaching `control_every_events` (`T_control`).
    pub control_every_ticks: u64,
    /// Recompute the threshold after this many events processed (`M`).
    pub control_every_events: u64,
    /// How long to sleep after a loop iteration that drained nothing.
    pub poll_sleep: Duration,
    /// Target fraction of live bytes that should sit in the hot tier.
    pub target_hot_ratio: f64,
    /// PI controller proportional gain.
    pub pi_gain: f64,
    /// Decay window `W` for the hotness ranking's exponential decay.
    pub hotness_window: f64,
    /// Decay base `w_old` in `(0, 1)`.
    pub w_old: f64,
    /// Max distinct call-site types the registry/ranking can track.
    pub max_types: usize,
    /// Max concurrently-live allocations the registry can track.
    pub max_blocks: usize,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            batch_size: 256,
            control_every_ticks: 100,
            control_every_events: 10_000,
            poll_sleep: Duration::from_micros(200),
            target_hot_ratio: 0.2,
            pi_gain: 1.0,
            hotness_window: 1_000_000.0,
            w_old: 0.5,
            max_types: 4096,
            max_blocks: 1 << 20,
        }
    }
}
