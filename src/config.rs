use std::env;

use crate::error::TierMemError;

const DEFAULT_HOTNESS_MEASURE_WINDOW_NS: f64 = 1.0e9;
const DEFAULT_SAMPLE_FREQUENCY_HZ: f64 = 100.0;
const DEFAULT_PEBS_FREQ_HZ: f64 = 100.0;
const DEFAULT_OLD_TIME_WINDOW_HOTNESS_WEIGHT: f64 = 0.5;

/// Runtime configuration, populated either programmatically via
/// [`TierMemConfig::default`] + field assignment or from the environment
/// variables recognised by spec §6, mirroring `ringmpsc_rs::Config`'s role
/// for the event ring.
#[derive(Debug, Clone)]
pub struct TierMemConfig {
    /// `HOTNESS_MEASURE_WINDOW`: decay window `W`, in nanoseconds.
    pub hotness_measure_window_ns: f64,
    /// `SAMPLE_FREQUENCY`: hardware sample period, in Hz.
    pub sample_frequency_hz: f64,
    /// `PEBS_FREQ_HZ`: consumer wake-up frequency, in Hz.
    pub pebs_freq_hz: f64,
    /// `OLD_TIME_WINDOW_HOTNESS_WEIGHT`: decay base `w_old`, in (0, 1).
    pub old_time_window_hotness_weight: f64,
    /// `MEMKIND_MEM_TIERS`: opaque tier configuration string, parsed by the
    /// embedding layer rather than this crate (spec §6); kept verbatim.
    pub mem_tiers: Option<String>,
    /// Ambient addition (not an env var in spec §6): the per-thread
    /// byte-counter flush threshold from §4.K.
    pub counter_flush_threshold: i64,
}

impl Default for TierMemConfig {
    fn default() -> Self {
        Self {
            hotness_measure_window_ns: DEFAULT_HOTNESS_MEASURE_WINDOW_NS,
            sample_frequency_hz: DEFAULT_SAMPLE_FREQUENCY_HZ,
            pebs_freq_hz: DEFAULT_PEBS_FREQ_HZ,
            old_time_window_hotness_weight: DEFAULT_OLD_TIME_WINDOW_HOTNESS_WEIGHT,
            mem_tiers: None,
            counter_flush_threshold: crate::counters::DEFAULT_FLUSH_THRESHOLD,
        }
    }
}

impl TierMemConfig {
    /// Reads the environment variables named in spec §6, falling back to
    /// this crate's defaults for anything unset. Any set-but-malformed
    /// value (non-numeric, negative, or out of range) is fatal per spec
    /// §7 — returned as an error for the caller to abort on, matching the
    /// original's `log_fatal` + `exit`.
    pub fn from_env() -> Result<Self, TierMemError> {
        let mut config = Self::default();

        if let Some(v) = env_var("HOTNESS_MEASURE_WINDOW")? {
            config.hotness_measure_window_ns = parse_non_negative("HOTNESS_MEASURE_WINDOW", &v)?;
        }
        if let Some(v) = env_var("SAMPLE_FREQUENCY")? {
            config.sample_frequency_hz = parse_positive("SAMPLE_FREQUENCY", &v)?;
        }
        if let Some(v) = env_var("PEBS_FREQ_HZ")? {
            config.pebs_freq_hz = parse_positive("PEBS_FREQ_HZ", &v)?;
        }
        if let Some(v) = env_var("OLD_TIME_WINDOW_HOTNESS_WEIGHT")? {
            let w = parse_positive("OLD_TIME_WINDOW_HOTNESS_WEIGHT", &v)?;
            if !(0.0..1.0).contains(&w) {
                return Err(TierMemError::InvalidConfig {
                    name: "OLD_TIME_WINDOW_HOTNESS_WEIGHT",
                    reason: format!("must be in (0, 1), got {w}"),
                });
            }
            config.old_time_window_hotness_weight = w;
        }
        if let Some(v) = env_var("MEMKIND_MEM_TIERS")? {
            config.mem_tiers = Some(v);
        }

        Ok(config)
    }
}

fn env_var(name: &'static str) -> Result<Option<String>, TierMemError> {
    match env::var(name) {
        Ok(v) => Ok(Some(v)),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(env::VarError::NotUnicode(_)) => Err(TierMemError::InvalidConfig {
            name,
            reason: "value is not valid UTF-8".into(),
        }),
    }
}

fn parse_positive(name: &'static str, raw: &str) -> Result<f64, TierMemError> {
    let value: f64 = raw.parse().map_err(|_| TierMemError::InvalidConfig {
        name,
        reason: format!("{raw:?} is not a number"),
    })?;
    if !(value > 0.0) {
        return Err(TierMemError::InvalidConfig {
            name,
            reason: format!("must be positive, got {value}"),
        });
    }
    Ok(value)
}

fn parse_non_negative(name: &'static str, raw: &str) -> Result<f64, TierMemError> {
    let value: f64 = raw.parse().map_err(|_| TierMemError::InvalidConfig {
        name,
        reason: format!("{raw:?} is not a number"),
    })?;
    if value < 0.0 {
        return Err(TierMemError::InvalidConfig {
            name,
            reason: format!("must be non-negative, got {value}"),
        });
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_literals() {
        let config = TierMemConfig::default();
        assert_eq!(config.hotness_measure_window_ns, 1.0e9);
        assert!(config.old_time_window_hotness_weight > 0.0 && config.old_time_window_hotness_weight < 1.0);
    }

    #[test]
    fn rejects_non_numeric_value() {
        assert!(parse_positive("SAMPLE_FREQUENCY", "not-a-number").is_err());
    }

    #[test]
    fn rejects_negative_value() {
        assert!(parse_positive("PEBS_FREQ_HZ", "-1.0").is_err());
    }

    #[test]
    fn rejects_weight_outside_unit_interval() {
        let err = (|| -> Result<(), TierMemError> {
            let w = parse_positive("OLD_TIME_WINDOW_HOTNESS_WEIGHT", "1.5")?;
            if !(0.0..1.0).contains(&w) {
                return Err(TierMemError::InvalidConfig {
                    name: "OLD_TIME_WINDOW_HOTNESS_WEIGHT",
                    reason: "out of range".into(),
                });
            }
            Ok(())
        })();
        assert!(err.is_err());
    }
}
