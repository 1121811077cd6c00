//! Background consumer (spec component J): the sole writer of the
//! registry, ranking, and threshold controller. Owns the consumer side of
//! the event ring and periodically republishes the hotness threshold that
//! the placement fast path reads.

mod config;
mod consumer;
mod event;
mod observer;

pub use config::ConsumerConfig;
pub use consumer::Consumer;
pub use event::Event;
pub use observer::{FixedOccupancy, OccupancyObserver};
