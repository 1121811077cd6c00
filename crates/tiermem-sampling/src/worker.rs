use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use tiermem_consumer::Event;
use tiermem_ring::Producer;

use crate::source::SampleSource;

/// A pinned, low-priority thread that polls a [`SampleSource`] at a fixed
/// frequency and turns every `(addr, timestamp)` record into a `TOUCH`
/// event on the shared ring. Mirrors `pebs_monitor`'s read-barrier-then-drain
/// loop (`original_source/src/pebs.c`), with the hardware mmap replaced by
/// the `SampleSource` boundary.
///
/// Ring overruns are silent by design (spec §4.I): a dropped `TOUCH` only
/// costs accuracy, since the decay rule treats a missed touch the same as
/// one that happened not to occur.
pub struct SamplingWorker {
    handle: Option<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
    enabled: Arc<AtomicBool>,
}

impl SamplingWorker {
    /// Spawns the worker, polling `source` at `pebs_freq_hz` times per
    /// second and pushing `TOUCH` events through `producer`.
    pub fn spawn(source: Box<dyn SampleSource>, producer: Producer<Event>, pebs_freq_hz: f64) -> Self {
        assert!(pebs_freq_hz > 0.0, "pebs_freq_hz must be positive");
        let shutdown = Arc::new(AtomicBool::new(false));
        let enabled = Arc::new(AtomicBool::new(true));
        let period = Duration::from_secs_f64(1.0 / pebs_freq_hz);

        let handle = spawn_loop(source, producer, period, Arc::clone(&shutdown), Arc::clone(&enabled));

        Self {
            handle: Some(handle),
            shutdown,
            enabled,
        }
    }

    /// Disables/enables sample processing without tearing down the thread
    /// (spec §4.I's `set_process_touches`).
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Re-initializes the worker for use in a forked child: the old
    /// thread doesn't exist in the child's address space (`fork()` only
    /// continues the calling thread), so this spawns an entirely fresh one
    /// against a freshly opened `source`/`producer` rather than reusing any
    /// state from `self`.
    pub fn reinit_after_fork(self, source: Box<dyn SampleSource>, producer: Producer<Event>, pebs_freq_hz: f64) -> Self {
        drop(self);
        Self::spawn(source, producer, pebs_freq_hz)
    }

    /// Signals shutdown and joins the polling thread.
    pub fn shutdown(mut self) {
        self.shutdown.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for SamplingWorker {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
    }
}

fn spawn_loop(
    mut source: Box<dyn SampleSource>,
    producer: Producer<Event>,
    period: Duration,
    shutdown: Arc<AtomicBool>,
    enabled: Arc<AtomicBool>,
) -> JoinHandle<()> {
    std::thread::Builder::new()
        .name("tiermem-sampling".into())
        .spawn(move || {
            lower_thread_priority();
            while !shutdown.load(Ordering::Acquire) {
                if enabled.load(Ordering::Acquire) {
                    for (addr, timestamp) in source.poll() {
                        if !producer.push(Event::Touch { addr, timestamp }) {
                            tracing::debug!(addr, timestamp, "sampling ring full, dropping touch");
                        }
                    }
                }
                std::thread::sleep(period);
            }
        })
        .expect("failed to spawn sampling thread")
}

#[cfg(target_os = "linux")]
fn lower_thread_priority() {
    // SAFETY: `nice()` with a small positive increment only ever lowers this
    // thread's scheduling priority; failure is harmless (best-effort, as in
    // `pebs_monitor`'s `pthread_setschedparam` call, which also ignores
    // errors).
    unsafe {
        libc::nice(5);
    }
}

#[cfg(not(target_os = "linux"))]
fn lower_thread_priority() {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SyntheticSampleSource;
    use std::sync::atomic::AtomicUsize;
    use tiermem_ring::{Channel, Config};

    #[test]
    fn polls_and_forwards_touch_events() {
        let channel = Channel::<Event>::new(Config::default());
        let producer = channel.register().unwrap();
        let source = Box::new(SyntheticSampleSource::new([(0x1000, 1), (0x2000, 2)]));

        let worker = SamplingWorker::spawn(source, producer, 1000.0);

        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = Arc::clone(&seen);
        for _ in 0..50 {
            let n = channel.consume_all(|_| {
                seen_clone.fetch_add(1, Ordering::Relaxed);
            });
            if n > 0 || seen.load(Ordering::Relaxed) >= 2 {
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }

        worker.shutdown();
        assert_eq!(seen.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn disabling_stops_forwarding_without_killing_the_thread() {
        let channel = Channel::<Event>::new(Config::default());
        let producer = channel.register().unwrap();
        let source = Arc::new(SyntheticSampleSource::new([]));
        let worker = SamplingWorker::spawn(Box::new(Arc::clone(&source)), producer, 2000.0);

        worker.set_enabled(false);
        source.push(0x3000, 3);
        std::thread::sleep(Duration::from_millis(20));
        let n = channel.consume_all(|_| {});
        assert_eq!(n, 0, "disabled worker must not forward samples");

        worker.set_enabled(true);
        let mut seen = 0;
        for _ in 0..50 {
            seen += channel.consume_all(|_| {});
            if seen > 0 {
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(seen, 1);
        worker.shutdown();
    }
}
