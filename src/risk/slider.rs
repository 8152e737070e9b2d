//! # risk::slider
//!
//! Percent ↔ slider ↔ price mapping for the SL/TP distance sliders.
//!
//! Distance from entry is a percent on a logarithmic domain
//! `[0.1 %, 100 %]`:
//!
//! ```text
//! percent = MIN · (MAX / MIN)^(slider / 100)        slider ∈ [0, 100]
//! slider  = 100 · ln(percent / MIN) / ln(MAX / MIN)
//! ```
//!
//! Pure numbers: nothing here knows about pixels.

use crate::engine::regime::round_price;
use crate::models::{LevelKind, Side};

pub const MIN_PERCENT: f64 = 0.1;
pub const MAX_PERCENT: f64 = 100.0;

/// Slider position (clamped to `[0, 100]`) → percent distance.
pub fn slider_to_percent(slider: f64) -> f64 {
    let s = slider.clamp(0.0, 100.0);
    MIN_PERCENT * (MAX_PERCENT / MIN_PERCENT).powf(s / 100.0)
}

/// Percent distance (clamped to the domain) → slider position.
pub fn percent_to_slider(percent: f64) -> f64 {
    let p = percent.clamp(MIN_PERCENT, MAX_PERCENT);
    100.0 * (p / MIN_PERCENT).ln() / (MAX_PERCENT / MIN_PERCENT).ln()
}

/// Level price `percent` away from `entry`, on the valid side for `kind`.
pub fn percent_to_price(entry: f64, side: Side, kind: LevelKind, percent: f64) -> f64 {
    round_price(entry * (1.0 + kind.direction(side) * percent / 100.0))
}

/// Unsigned percent distance of `price` from `entry`.
pub fn price_to_percent(entry: f64, price: f64) -> f64 {
    (price - entry).abs() / entry * 100.0
}
