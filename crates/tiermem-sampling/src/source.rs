use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// The out-of-scope hardware collaborator (spec §6): something that can be
/// polled for `(addr, timestamp)` access records since the last call. A
/// real implementation wraps a `perf_event_open` PEBS ring (see
/// `original_source/src/pebs.c`); this crate only defines the boundary.
pub trait SampleSource: Send {
    /// Returns every new record observed since the previous call, in
    /// timestamp order. An empty result is normal (no new samples yet).
    fn poll(&mut self) -> Vec<(u64, u64)>;
}

/// A queue of pre-recorded `(addr, timestamp)` pairs, drained one `poll()`
/// at a time. Used in integration tests in place of real PMU sampling.
pub struct SyntheticSampleSource {
    queue: Mutex<VecDeque<(u64, u64)>>,
}

impl SyntheticSampleSource {
    pub fn new(records: impl IntoIterator<Item = (u64, u64)>) -> Self {
        Self {
            queue: Mutex::new(records.into_iter().collect()),
        }
    }

    pub fn push(&self, addr: u64, timestamp: u64) {
        self.queue.lock().unwrap().push_back((addr, timestamp));
    }
}

impl SampleSource for SyntheticSampleSource {
    fn poll(&mut self) -> Vec<(u64, u64)> {
        self.queue.lock().unwrap().drain(..).collect()
    }
}

/// Lets a [`SyntheticSampleSource`] be shared with the test that's feeding
/// it while a [`crate::SamplingWorker`] owns the polling side.
impl SampleSource for Arc<SyntheticSampleSource> {
    fn poll(&mut self) -> Vec<(u64, u64)> {
        self.queue.lock().unwrap().drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drains_all_queued_records_once() {
        let mut source = SyntheticSampleSource::new([(1, 10), (2, 20)]);
        assert_eq!(source.poll(), vec![(1, 10), (2, 20)]);
        assert_eq!(source.poll(), vec![]);
        source.push(3, 30);
        assert_eq!(source.poll(), vec![(3, 30)]);
    }
}
