//! # models::tick
//!
//! Defines [`Tick`], the raw market pulse every feed emits, and [`Bar`], the
//! OHLC summary the chart draws.
//!
//! Both are small `Copy` values: the tick path must hand them around without
//! heap allocation.

use serde::{Deserialize, Serialize};

/// Width of one chart bucket in seconds (M5).
pub const BAR_SECONDS: i64 = 300;

/// A single timestamped price sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    /// Unix time in whole seconds.
    pub time: i64,
    /// Price, rounded to 5 fractional digits.
    pub price: f64,
}

impl Tick {
    pub fn new(time: i64, price: f64) -> Self {
        Self { time, price }
    }

    /// Start of the 300-second bucket this tick falls in.
    #[inline]
    pub fn bucket(&self) -> i64 {
        bucket_of(self.time)
    }
}

/// `floor(time / 300) * 300`, also correct for negative times.
#[inline]
pub fn bucket_of(time: i64) -> i64 {
    time.div_euclid(BAR_SECONDS) * BAR_SECONDS
}

/// OHLC candle for one bucket.
///
/// Invariant: `low <= open, close <= high`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    /// Bucket start, always a multiple of [`BAR_SECONDS`].
    pub time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl Bar {
    /// Opens a new bar from the first tick of a bucket.
    pub fn open_at(tick: Tick) -> Self {
        Self {
            time: tick.bucket(),
            open: tick.price,
            high: tick.price,
            low: tick.price,
            close: tick.price,
        }
    }

    /// Folds a later tick of the same bucket into the bar.
    pub fn update(&mut self, price: f64) {
        if price > self.high {
            self.high = price;
        }
        if price < self.low {
            self.low = price;
        }
        self.close = price;
    }

    pub fn is_consistent(&self) -> bool {
        self.low <= self.open.min(self.close) && self.open.max(self.close) <= self.high
    }
}
