//! Bounded lock-free multi-producer single-consumer event ring (spec
//! component C): one dedicated SPSC ring per producer thread, fixed-size
//! records, non-blocking push, single background consumer drain.
//!
//! The mutator-visible contract is: `push` never blocks and never fails
//! loudly — on a full ring it returns `false` and the event is dropped
//! (counted in [`MetricsSnapshot::full_events`]). Only the consumer thread
//! calls the batch-drain APIs.

mod backoff;
mod channel;
mod config;
mod invariants;
#[cfg(feature = "mutex-ring")]
mod mutex_ring;
mod metrics;
mod reservation;
#[cfg(not(feature = "mutex-ring"))]
mod ring;

pub use backoff::Backoff;
pub use channel::{Channel, ChannelError, Producer};
pub use config::Config;
pub use metrics::{Metrics, MetricsSnapshot};
pub use reservation::Reservation;

#[cfg(not(feature = "mutex-ring"))]
pub use ring::Ring;
#[cfg(feature = "mutex-ring")]
pub use mutex_ring::Ring;
