//! # engine::candle_builder
//!
//! Folds an unbounded tick stream into M5 (300-second) OHLC bars.
//!
//! The aggregator holds exactly one in-progress bar.  A tick from a later
//! bucket hands that bar off (the caller already has it) and opens a new one.
//! A tick from an *earlier* bucket (clock skew / out-of-order delivery) is
//! ignored and the held bar is returned unchanged.

use tracing::debug;

use crate::models::{Bar, Tick};

#[derive(Debug, Default, Clone)]
pub struct BarAggregator {
    current: Option<Bar>,
}

impl BarAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one tick and returns the resulting in-progress bar.
    ///
    /// Callers tell "append new candle" from "update last candle" by comparing
    /// the returned `time` with the last one they saw.
    pub fn apply_tick(&mut self, tick: Tick) -> Bar {
        let bucket = tick.bucket();
        if let Some(bar) = self.current.as_mut() {
            if bucket == bar.time {
                bar.update(tick.price);
                debug_assert!(bar.is_consistent());
                return *bar;
            }
            if bucket < bar.time {
                debug!(
                    tick_time = tick.time,
                    bar_time  = bar.time,
                    "out-of-order tick ignored"
                );
                return *bar;
            }
        }

        let bar = Bar::open_at(tick);
        self.current = Some(bar);
        bar
    }

    /// The in-progress bar, if any tick has been applied.
    pub fn current(&self) -> Option<Bar> {
        self.current
    }
}
