//! # engine::history
//!
//! Seeds the initial chart view with `N` finished M5 bars ending at the most
//! recently closed bucket before `now`.
//!
//! The bars are produced by running the very same [`PricePath`] the live
//! generator uses, at one-second resolution, for `N × 300` simulated seconds.
//! The path state after the last second is handed back as `resume`, so the
//! live feed's first tick continues the seeded price path with no gap.

use tracing::debug;

use crate::config::FeedConfig;
use crate::engine::candle_builder::BarAggregator;
use crate::engine::random::UniformSource;
use crate::engine::regime::{PricePath, RegimeProcess};
use crate::models::{bucket_of, Bar, BAR_SECONDS};

/// Resolution of the seeding run.
const SEED_STEP_SECS: i64 = 1;

#[derive(Debug, Clone)]
pub struct SeededHistory {
    /// Oldest first.
    pub bars: Vec<Bar>,
    /// Path state after the last simulated second.
    pub resume: PricePath,
}

/// Runs the price path over the `count` buckets preceding `now`'s bucket.
pub fn seed_history<S: UniformSource + ?Sized>(
    count: usize,
    config: &FeedConfig,
    now: i64,
    source: &mut S,
) -> SeededHistory {
    let current_bucket = bucket_of(now);
    let first_bucket = current_bucket - count as i64 * BAR_SECONDS;

    let process = RegimeProcess::new(source);
    // The path emits `time + step`, so start one step before the first bucket.
    let mut path = PricePath::new(first_bucket - SEED_STEP_SECS, config.base_price, process);
    let mut aggregator = BarAggregator::new();
    let mut bars: Vec<Bar> = Vec::with_capacity(count);

    let total_secs = count as i64 * BAR_SECONDS;
    for _ in 0..total_secs / SEED_STEP_SECS {
        let tick = path.advance(SEED_STEP_SECS, config, source);
        let bar = aggregator.apply_tick(tick);
        match bars.last_mut() {
            Some(last) if last.time == bar.time => *last = bar,
            _ => bars.push(bar),
        }
    }

    debug!(
        bars        = bars.len(),
        resume_time = path.time,
        last_price  = path.price,
        "history seeded"
    );

    SeededHistory { bars, resume: path }
}

/// Bars-only projection of [`seed_history`], for feeds that do not continue
/// the seeded path.
pub fn generate_bars<S: UniformSource + ?Sized>(
    count: usize,
    config: &FeedConfig,
    now: i64,
    source: &mut S,
) -> Vec<Bar> {
    seed_history(count, config, now, source).bars
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::random::SeededUniform;

    const NOW: i64 = 1_760_000_123;

    #[test]
    fn twenty_four_bars_end_before_current_bucket() {
        let cfg = FeedConfig::new(1.08);
        let mut src = SeededUniform::from_seed(1);
        let bars = generate_bars(24, &cfg, NOW, &mut src);

        assert_eq!(bars.len(), 24);
        assert_eq!(bars.last().unwrap().time, (NOW / 300) * 300 - 300);
        for pair in bars.windows(2) {
            assert_eq!(pair[1].time - pair[0].time, BAR_SECONDS);
        }
        for bar in &bars {
            assert!(bar.is_consistent());
            assert!(bar.low >= cfg.min_price && bar.high <= cfg.max_price);
        }
    }

    #[test]
    fn resume_sits_on_last_seeded_second() {
        let cfg = FeedConfig::new(1.08);
        let mut src = SeededUniform::from_seed(5);
        let seeded = seed_history(3, &cfg, NOW, &mut src);
        assert_eq!(seeded.resume.time, bucket_of(NOW) - 1);
        assert_eq!(seeded.resume.price, seeded.bars.last().unwrap().close);
    }

    #[test]
    fn live_continuation_matches_longer_seed() {
        // Seeding 2 bars and then stepping 300 more seconds must equal seeding 3 bars
        // one bucket later: both walk the same path with the same draws.
        let cfg = FeedConfig::new(1.08);

        let mut a_src = SeededUniform::from_seed(8);
        let mut seeded = seed_history(2, &cfg, NOW, &mut a_src);
        let mut agg = BarAggregator::new();
        let mut last = None;
        for _ in 0..300 {
            let tick = seeded.resume.advance(1, &cfg, &mut a_src);
            last = Some(agg.apply_tick(tick));
        }

        let mut b_src = SeededUniform::from_seed(8);
        let longer = seed_history(3, &cfg, NOW + BAR_SECONDS, &mut b_src);

        assert_eq!(&longer.bars[..2], &seeded.bars[..]);
        assert_eq!(longer.bars[2], last.unwrap());
    }

    #[test]
    fn zero_bars() {
        let cfg = FeedConfig::new(1.08);
        let mut src = SeededUniform::from_seed(2);
        let seeded = seed_history(0, &cfg, NOW, &mut src);
        assert!(seeded.bars.is_empty());
        assert_eq!(seeded.resume.time, bucket_of(NOW) - 1);
        assert_eq!(seeded.resume.price, cfg.base_price);
    }
}
