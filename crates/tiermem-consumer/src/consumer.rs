use std::sync::atomic::Ordering;
use std::sync::Arc;

use tiermem_controller::PiController;
use tiermem_ranking::HotnessRanking;
use tiermem_registry::{HotOrNot, Registry, TypeId};
use tiermem_ring::Channel;

use crate::config::ConsumerConfig;
use crate::event::Event;
use crate::observer::OccupancyObserver;

/// Hotness added per observed access (spec's `hotness=1` per PEBS/synthetic
/// touch, `tachanka.c`'s `touch()`).
const ADD_HOTNESS_PER_TOUCH: f64 = 1.0;

/// The single background consumer (spec component J): the sole writer of
/// the registry, ranking, and controller. Owns the consumer side of the
/// event channel; the placement fast path reads classification through
/// [`Consumer::registry_handle`]'s cached `HotOrNot` rather than the raw
/// controller threshold, which never leaves this struct.
pub struct Consumer {
    channel: Channel<Event>,
    registry: Arc<Registry>,
    ranking: HotnessRanking,
    controller: PiController,
    observer: Arc<dyn OccupancyObserver>,
    config: ConsumerConfig,
    ticks_since_control: u64,
    events_since_control: u64,
}

impl Consumer {
    pub fn new(channel: Channel<Event>, config: ConsumerConfig, observer: Arc<dyn OccupancyObserver>) -> Self {
        Self {
            channel,
            registry: Arc::new(Registry::new(config.max_types, config.max_blocks)),
            ranking: HotnessRanking::new(config.max_types, config.hotness_window, config.w_old),
            controller: PiController::new(config.target_hot_ratio, config.pi_gain),
            observer,
            config,
            ticks_since_control: 0,
            events_since_control: 0,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// A shared handle to the registry, for the placement fast path to run
    /// read-only `hotness_of_hash`/`hotness_of_addr` queries against while
    /// this consumer runs on its own thread and remains the sole writer.
    pub fn registry_handle(&self) -> Arc<Registry> {
        Arc::clone(&self.registry)
    }

    /// Changes the controller's target hot-tier occupancy ratio, taking
    /// effect at the next control step.
    pub fn set_target_hot_ratio(&mut self, ratio: f64) {
        self.controller.set_target_ratio(ratio);
    }

    /// Runs the steady-state loop until `shutdown` reports `true`, draining
    /// up to `batch_size` events per iteration and sleeping briefly when a
    /// drain comes back empty.
    pub fn run(&mut self, shutdown: &std::sync::atomic::AtomicBool) {
        while !shutdown.load(Ordering::Acquire) {
            let processed = self.run_once();
            if processed == 0 {
                std::thread::sleep(self.config.poll_sleep);
            }
        }
    }

    /// Drains and dispatches one batch, running a control step if the
    /// configured tick/event cadence has elapsed. Returns the number of
    /// events processed.
    pub fn run_once(&mut self) -> usize {
        let mut batch = Vec::new();
        self.channel
            .consume_all_up_to(self.config.batch_size, |event: &Event| batch.push(event.clone()));

        let processed = batch.len();
        for event in batch {
            self.dispatch(event);
        }

        self.ticks_since_control += 1;
        self.events_since_control += processed as u64;
        if self.ticks_since_control >= self.config.control_every_ticks
            || self.events_since_control >= self.config.control_every_events
        {
            self.run_control_step();
        }

        processed
    }

    fn dispatch(&mut self, event: Event) {
        match event {
            Event::CreateAdd { hash, addr, size } => match self.registry.register(hash, addr, size) {
                Ok(type_idx) => self.sync_ranking_weight(type_idx),
                Err(e) => tracing::warn!(hash, addr, size, error = %e, "dropping CREATE_ADD"),
            },
            Event::DestroyRemove { addr, size: _ } => {
                if let Some(type_idx) = self.registry.unregister(addr) {
                    self.sync_ranking_weight(type_idx);
                }
            }
            Event::Realloc {
                old_addr,
                new_addr,
                old_size: _,
                new_size,
            } => match self.registry.realloc(old_addr, new_addr, new_size) {
                Ok(type_idx) => self.sync_ranking_weight(type_idx),
                Err(e) => tracing::warn!(old_addr, new_addr, error = %e, "dropping REALLOC"),
            },
            Event::Touch { addr, timestamp } => {
                let Some(type_idx) = self.registry.type_of_addr(addr) else {
                    tracing::warn!(addr, "dropping TOUCH for unknown address");
                    return;
                };
                self.ranking.touch(type_idx, timestamp, ADD_HOTNESS_PER_TOUCH);
                self.reclassify(type_idx);
            }
            Event::SetTouchCallback { addr, callback } => {
                let Some(type_idx) = self.registry.type_of_addr(addr) else {
                    tracing::warn!(addr, "dropping SET_TOUCH_CB for unknown address");
                    return;
                };
                self.registry.set_touch_callback(type_idx, callback);
            }
        }
    }

    fn sync_ranking_weight(&mut self, type_idx: TypeId) {
        let (_, total_size) = self.registry.type_stats(type_idx);
        let frequency = self.ranking.frequency_of(type_idx);
        self.ranking.update(type_idx, frequency, total_size as f64);
    }

    /// Refreshes `type_idx`'s cached classification against the last
    /// computed threshold, invoking its touch callback exactly on the
    /// cold-to-hot transition.
    fn reclassify(&mut self, type_idx: TypeId) {
        let classification = if self.ranking.is_hot(type_idx) {
            HotOrNot::Hot
        } else {
            HotOrNot::Cold
        };
        let became_hot = self.registry.set_hot_or_not(type_idx, classification);
        if became_hot {
            if let Some(cb) = self.registry.touch_callback(type_idx) {
                cb(type_idx);
            }
        }
    }

    fn run_control_step(&mut self) {
        let found_dram_total = self.observer.hot_tier_occupancy_fraction();
        let target_ratio = self.controller.correct(found_dram_total);
        self.ranking.hot_threshold_for_ratio(target_ratio);

        for type_idx in 0..self.registry.type_count() {
            self.reclassify(type_idx);
        }

        self.ticks_since_control = 0;
        self.events_since_control = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU64};
    use tiermem_ring::Config as RingConfig;

    fn consumer_with(target_ratio: f64) -> (Consumer, tiermem_ring::Producer<Event>) {
        let channel = Channel::new(RingConfig::default());
        let producer = channel.register().unwrap();
        let config = ConsumerConfig {
            control_every_ticks: 1,
            control_every_events: 1,
            target_hot_ratio: target_ratio,
            ..ConsumerConfig::default()
        };
        let observer = Arc::new(crate::observer::FixedOccupancy(0.0));
        (Consumer::new(channel, config, observer), producer)
    }

    #[test]
    fn create_add_registers_and_tracks_weight() {
        let (mut consumer, producer) = consumer_with(0.5);
        producer.push(Event::CreateAdd {
            hash: 1,
            addr: 0x1000,
            size: 64,
        });
        assert_eq!(consumer.run_once(), 1);
        let type_idx = consumer.registry().type_of_addr(0x1000).unwrap();
        assert_eq!(consumer.registry().type_stats(type_idx), (1, 64));
    }

    #[test]
    fn destroy_remove_frees_block() {
        let (mut consumer, producer) = consumer_with(0.5);
        producer.push(Event::CreateAdd {
            hash: 1,
            addr: 0x1000,
            size: 64,
        });
        consumer.run_once();
        producer.push(Event::DestroyRemove { addr: 0x1000, size: 64 });
        consumer.run_once();
        assert_eq!(consumer.registry().type_of_addr(0x1000), None);
    }

    #[test]
    fn touch_marks_type_hot_and_fires_callback_once() {
        // target_hot_ratio = 0.0 forces the controller's output to 0 no
        // matter the observed occupancy, which drives the ranking
        // threshold to +inf (nothing qualifies as hot).
        let (mut consumer, producer) = consumer_with(0.0);
        producer.push(Event::CreateAdd {
            hash: 1,
            addr: 0x1000,
            size: 64,
        });
        consumer.run_once();

        let fired = Arc::new(AtomicU64::new(0));
        let fired_clone = Arc::clone(&fired);
        producer.push(Event::SetTouchCallback {
            addr: 0x1000,
            callback: Arc::new(move |_type_id| {
                fired_clone.fetch_add(1, Ordering::Relaxed);
            }),
        });
        consumer.run_once();

        producer.push(Event::Touch {
            addr: 0x1000,
            timestamp: 1,
        });
        consumer.run_once();
        assert_eq!(fired.load(Ordering::Relaxed), 0, "still below +inf threshold");

        // Now aim for ratio 1.0: r=1 always classifies everything hot.
        consumer.set_target_hot_ratio(1.0);
        producer.push(Event::Touch {
            addr: 0x1000,
            timestamp: 2,
        });
        consumer.run_once();
        assert_eq!(fired.load(Ordering::Relaxed), 1);

        producer.push(Event::Touch {
            addr: 0x1000,
            timestamp: 3,
        });
        consumer.run_once();
        assert_eq!(fired.load(Ordering::Relaxed), 1, "callback fires once per transition");
    }

    #[test]
    fn run_exits_promptly_on_shutdown() {
        let (mut consumer, _producer) = consumer_with(0.5);
        let shutdown = AtomicBool::new(true);
        consumer.run(&shutdown);
    }
}
