use thiserror::Error;

/// Aggregated error surface for the `tiermem` crate (spec §7).
///
/// Fatal conditions (arena exhaustion, malformed config, an invalid policy
/// request) are represented here but the call sites that detect them
/// `panic!` rather than return this variant, per spec §7's "fatal: abort
/// with message" policy for startup/arena failures — `TierMemError` exists
/// for the handful of conditions a caller can recover from.
#[derive(Debug, Error)]
pub enum TierMemError {
    #[error("DATA_HOTNESS policy requires exactly two tiers, one of them HOT_KIND")]
    DataHotnessRequiresTwoTiers,

    #[error("at least one tier must be added to the builder before build()")]
    NoTiersConfigured,

    #[error("underlying allocator returned null for a {0:?} allocation of {1} bytes")]
    AllocationFailed(crate::kind::Kind, usize),

    #[error("sampling channel failed to open: {0}")]
    SamplingChannelUnavailable(String),

    #[error("invalid configuration for {name}: {reason}")]
    InvalidConfig { name: &'static str, reason: String },

    #[error(transparent)]
    Registry(#[from] tiermem_registry::RegistryError),
}
