//! # feed::generator
//!
//! **TickGenerator** — the synthetic feed.  A `tokio::time::interval` task
//! fires every `config.interval`; each firing advances simulated time by
//! `config.step_secs`, steps the [`PricePath`] and delivers one [`Tick`].
//!
//! The generator is an owned handle (cheap to clone) built by
//! [`TickGenerator::new`]; the path, random source and task all live behind
//! it.  The cadence task starts on the first `subscribe`.

use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::FeedConfig;
use crate::engine::random::UniformSource;
use crate::engine::regime::PricePath;
use crate::feed::{lock, DeliverySlot, MarketFeed, TickHandler};
use crate::models::Tick;

struct GeneratorShared {
    config: FeedConfig,
    path: Mutex<PricePath>,
    source: Mutex<Box<dyn UniformSource>>,
    slot: DeliverySlot,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl GeneratorShared {
    fn next_tick(&self) -> Tick {
        let mut source = lock(&self.source);
        let mut path = lock(&self.path);
        path.advance(self.config.step_secs, &self.config, source.as_mut())
    }
}

#[derive(Clone)]
pub struct TickGenerator {
    shared: Arc<GeneratorShared>,
}

impl TickGenerator {
    /// Builds an idle generator continuing from `path`.
    pub fn new(config: FeedConfig, path: PricePath, source: Box<dyn UniformSource>) -> Self {
        Self {
            shared: Arc::new(GeneratorShared {
                config,
                path: Mutex::new(path),
                source: Mutex::new(source),
                slot: DeliverySlot::new(),
                task: Mutex::new(None),
            }),
        }
    }
}

impl MarketFeed for TickGenerator {
    fn subscribe(&self, on_tick: TickHandler) {
        if !self.shared.slot.install(self.name(), on_tick) {
            return;
        }

        let mut task = lock(&self.shared.task);
        if task.is_some() {
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                *task = Some(runtime.spawn(run_cadence(Arc::clone(&self.shared))));
                info!(
                    interval_ms = self.shared.config.interval.as_millis() as u64,
                    step_secs   = self.shared.config.step_secs,
                    "📈 Tick generator started"
                );
            }
            Err(_) => warn!("no tokio runtime, tick generator stays idle"),
        }
    }

    fn stop(&self) {
        if self.shared.slot.close() {
            info!("🛑 Tick generator stopped");
        }
        if let Some(task) = lock(&self.shared.task).take() {
            task.abort();
        }
    }

    fn name(&self) -> &'static str {
        "synthetic"
    }
}

async fn run_cadence(shared: Arc<GeneratorShared>) {
    let mut ticker = tokio::time::interval(shared.config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // The first interval tick completes immediately; samples start one interval in.
    ticker.tick().await;

    loop {
        ticker.tick().await;
        if shared.slot.is_stopped() {
            break;
        }
        let tick = shared.next_tick();
        debug!(time = tick.time, price = tick.price, "tick");
        if !shared.slot.deliver(tick) {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use crate::engine::random::SeededUniform;
    use crate::engine::regime::RegimeProcess;

    fn generator(seed: u64) -> TickGenerator {
        let cfg = FeedConfig::new(1.08);
        let mut src = SeededUniform::from_seed(seed);
        let process = RegimeProcess::new(&mut src);
        let path = PricePath::new(1_000, cfg.base_price, process);
        TickGenerator::new(cfg, path, Box::new(src))
    }

    fn collector() -> (Arc<Mutex<Vec<Tick>>>, TickHandler) {
        let ticks = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&ticks);
        let handler: TickHandler = Box::new(move |t| lock(&sink).push(t));
        (ticks, handler)
    }

    #[tokio::test(start_paused = true)]
    async fn one_tick_per_interval() {
        let gen = generator(1);
        let (ticks, handler) = collector();
        gen.subscribe(handler);
        tokio::time::sleep(Duration::from_millis(5_500)).await;
        gen.stop();

        let ticks = lock(&ticks).clone();
        assert_eq!(ticks.len(), 5);
        let times: Vec<i64> = ticks.iter().map(|t| t.time).collect();
        assert_eq!(times, vec![1_001, 1_002, 1_003, 1_004, 1_005]);
    }

    #[tokio::test(start_paused = true)]
    async fn path_waits_for_subscribe() {
        let gen = generator(2);
        tokio::time::sleep(Duration::from_secs(5)).await;
        let (ticks, handler) = collector();
        gen.subscribe(handler);
        tokio::time::sleep(Duration::from_millis(1_500)).await;
        gen.stop();
        assert_eq!(lock(&ticks)[0].time, 1_001);
    }

    #[tokio::test(start_paused = true)]
    async fn last_subscriber_wins() {
        let gen = generator(3);
        let (first, h1) = collector();
        let (second, h2) = collector();
        gen.subscribe(h1);
        tokio::time::sleep(Duration::from_millis(2_500)).await;
        gen.subscribe(h2);
        tokio::time::sleep(Duration::from_millis(2_000)).await;
        gen.stop();

        assert_eq!(lock(&first).len(), 2);
        assert_eq!(lock(&second).len(), 2);
        assert_eq!(lock(&second)[0].time, 1_003);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_from_inside_callback() {
        let gen = generator(4);
        let count = Arc::new(AtomicUsize::new(0));
        let (g, c) = (gen.clone(), Arc::clone(&count));
        gen.subscribe(Box::new(move |_| {
            if c.fetch_add(1, Ordering::SeqCst) + 1 == 3 {
                g.stop();
            }
        }));
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_is_idempotent_and_terminal() {
        let gen = generator(5);
        gen.stop();
        gen.stop();
        let (ticks, handler) = collector();
        gen.subscribe(handler);
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(lock(&ticks).is_empty());
    }

    #[test]
    fn subscribe_outside_runtime_stays_idle() {
        let gen = generator(6);
        let (ticks, handler) = collector();
        gen.subscribe(handler);
        gen.stop();
        assert!(lock(&ticks).is_empty());
    }
}
