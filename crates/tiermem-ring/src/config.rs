/// Configuration for a [`crate::Ring`] / [`crate::Channel`].
#[derive(Debug, Clone, Copy)]
pub struct Config {
    /// Ring buffer size as a power of 2 (default: 12 = 4K slots).
    pub ring_bits: u8,
    /// Maximum number of producers (one ring per producer).
    pub max_producers: usize,
    /// Enable metrics collection (slight overhead).
    pub enable_metrics: bool,
}

impl Config {
    /// Creates a new configuration with custom settings.
    ///
    /// # Panics
    ///
    /// Panics if `ring_bits` is outside `1..=20` or `max_producers` is
    /// outside `1..=128`.
    pub const fn new(ring_bits: u8, max_producers: usize, enable_metrics: bool) -> Self {
        assert!(
            ring_bits > 0 && ring_bits <= 20,
            "ring_bits must be between 1 and 20 (max 1M slots)"
        );
        assert!(
            max_producers > 0 && max_producers <= 128,
            "max_producers must be between 1 and 128"
        );

        Self {
            ring_bits,
            max_producers,
            enable_metrics,
        }
    }

    #[inline]
    pub const fn capacity(&self) -> usize {
        1 << self.ring_bits
    }

    #[inline]
    pub const fn mask(&self) -> usize {
        self.capacity() - 1
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ring_bits: 12, // 4K slots per producer, matches a single sampling/consumer pair well
            max_producers: 16,
            enable_metrics: true,
        }
    }
}
