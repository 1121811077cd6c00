//! Sampling worker (spec component I): polls a hardware (or synthetic)
//! access-sample source and turns records into `TOUCH` events on the
//! shared event ring.

mod source;
mod worker;

pub use source::{SampleSource, SyntheticSampleSource};
pub use worker::SamplingWorker;
