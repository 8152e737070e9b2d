//! # engine::regime
//!
//! **RegimeProcess** — a 3-state stochastic machine (RANGE / TREND / SPIKE)
//! that shapes short-run price behaviour.
//!
//! ```text
//!            expire & resample (may pick the same kind)
//!   ┌────────────────────────────────────────────────────┐
//!   ▼                                                    │
//! RANGE 0.70 ──┐                                         │
//! TREND 0.25 ──┼─► step() × ticks_remaining ─► expired ──┘
//! SPIKE 0.05 ──┘
//! ```
//!
//! Every draw comes from an injected [`UniformSource`], in a fixed order, so a
//! given sequence of uniforms yields byte-identical prices everywhere.
//!
//! | Kind  | drift                      | volatility           | duration   |
//! |-------|----------------------------|----------------------|------------|
//! | RANGE | 0 (+ pull toward base)     | [0.00002, 0.00006]   | [60, 240]  |
//! | TREND | ±[0.000005, 0.00002]       | [0.00003, 0.00008]   | [30, 120]  |
//! | SPIKE | [−0.00005, 0.00005]        | [0.00015, 0.00040]   | [3, 10]    |

use serde::Serialize;

use crate::config::FeedConfig;
use crate::engine::random::UniformSource;
use crate::models::Tick;

// ─── Regime ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RegimeKind {
    Range,
    Trend,
    Spike,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Regime {
    pub kind: RegimeKind,
    pub drift: f64,
    /// Smoothed every step toward the realised noise magnitude.
    pub volatility: f64,
    pub ticks_remaining: u32,
}

struct KindParams {
    /// Drift magnitude range.
    drift: (f64, f64),
    /// Draw a 50/50 sign for the drift.
    signed: bool,
    volatility: (f64, f64),
    duration: (u32, u32),
}

const RANGE_PARAMS: KindParams = KindParams {
    drift: (0.0, 0.0),
    signed: false,
    volatility: (0.000_02, 0.000_06),
    duration: (60, 240),
};

const TREND_PARAMS: KindParams = KindParams {
    drift: (0.000_005, 0.000_02),
    signed: true,
    volatility: (0.000_03, 0.000_08),
    duration: (30, 120),
};

const SPIKE_PARAMS: KindParams = KindParams {
    drift: (-0.000_05, 0.000_05),
    signed: false,
    volatility: (0.000_15, 0.000_40),
    duration: (3, 10),
};

impl RegimeKind {
    fn params(self) -> &'static KindParams {
        match self {
            RegimeKind::Range => &RANGE_PARAMS,
            RegimeKind::Trend => &TREND_PARAMS,
            RegimeKind::Spike => &SPIKE_PARAMS,
        }
    }

    /// Kind selection table: RANGE 0.70, TREND 0.25, SPIKE 0.05.
    fn from_uniform(u: f64) -> Self {
        if u < 0.70 {
            RegimeKind::Range
        } else if u < 0.95 {
            RegimeKind::Trend
        } else {
            RegimeKind::Spike
        }
    }
}

/// Weight kept from the previous volatility on each step.
const VOL_SMOOTHING: f64 = 0.9;

// ─── Sampling ─────────────────────────────────────────────────────────────────

fn uniform_in<S: UniformSource + ?Sized>(source: &mut S, (lo, hi): (f64, f64)) -> f64 {
    lo + (hi - lo) * source.next_uniform()
}

fn duration_in<S: UniformSource + ?Sized>(source: &mut S, (lo, hi): (u32, u32)) -> u32 {
    let span = (hi - lo + 1) as f64;
    (lo + (source.next_uniform() * span).floor() as u32).min(hi)
}

/// Draws a fresh regime.
///
/// Draw order: kind, drift magnitude, drift sign (signed kinds only),
/// volatility, duration.
pub fn sample_regime<S: UniformSource + ?Sized>(source: &mut S) -> Regime {
    let kind = RegimeKind::from_uniform(source.next_uniform());
    let p = kind.params();

    let mut drift = uniform_in(source, p.drift);
    if p.signed && source.next_uniform() < 0.5 {
        drift = -drift;
    }
    let volatility = uniform_in(source, p.volatility);
    let ticks_remaining = duration_in(source, p.duration);

    Regime { kind, drift, volatility, ticks_remaining }
}

// ─── Step ─────────────────────────────────────────────────────────────────────

/// Rounds to 5 fractional digits, half away from zero.
#[inline]
pub fn round_price(price: f64) -> f64 {
    (price * 1e5).round() / 1e5
}

/// Standard normal via Box–Muller over two uniforms.
fn standard_normal<S: UniformSource + ?Sized>(source: &mut S) -> f64 {
    let u1 = source.next_uniform().max(f64::MIN_POSITIVE);
    let u2 = source.next_uniform();
    (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
}

/// One price step under `regime`.
///
/// `price + Normal(drift, volatility)`, pulled toward the base price for
/// RANGE, clamped to `[min_price, max_price]` snapped onto the 0.00001
/// grid, then rounded.  The regime's
/// volatility is smoothed toward `|noise|` (0.9 old / 0.1 new).
pub fn step<S: UniformSource + ?Sized>(
    price: f64,
    regime: &mut Regime,
    config: &FeedConfig,
    source: &mut S,
) -> f64 {
    let noise = regime.volatility * standard_normal(source);
    let mut next = price + regime.drift + noise;

    if regime.kind == RegimeKind::Range {
        next += (config.base_price - next) * config.mean_reversion;
    }

    regime.volatility = VOL_SMOOTHING * regime.volatility + (1.0 - VOL_SMOOTHING) * noise.abs();

    let (lo, hi) = (round_price(config.min_price), round_price(config.max_price));
    round_price(next.clamp(lo, hi))
}

// ─── RegimeProcess ────────────────────────────────────────────────────────────

/// Owns the active regime and resamples it when it expires.
#[derive(Debug, Clone, PartialEq)]
pub struct RegimeProcess {
    regime: Regime,
}

impl RegimeProcess {
    pub fn new<S: UniformSource + ?Sized>(source: &mut S) -> Self {
        Self { regime: sample_regime(source) }
    }

    pub fn with_regime(regime: Regime) -> Self {
        Self { regime }
    }

    pub fn regime(&self) -> &Regime {
        &self.regime
    }

    /// Resample if expired, step once, count the tick down.
    pub fn advance<S: UniformSource + ?Sized>(
        &mut self,
        price: f64,
        config: &FeedConfig,
        source: &mut S,
    ) -> f64 {
        if self.regime.ticks_remaining == 0 {
            self.regime = sample_regime(source);
        }
        let next = step(price, &mut self.regime, config, source);
        self.regime.ticks_remaining = self.regime.ticks_remaining.saturating_sub(1);
        next
    }
}

// ─── PricePath ────────────────────────────────────────────────────────────────

/// Simulated clock + price + regime.  Shared by historical seeding and the
/// live generator so the live path continues the seeded one.
#[derive(Debug, Clone, PartialEq)]
pub struct PricePath {
    pub time: i64,
    pub price: f64,
    pub process: RegimeProcess,
}

impl PricePath {
    pub fn new(time: i64, price: f64, process: RegimeProcess) -> Self {
        Self { time, price, process }
    }

    /// Moves the clock forward by `step_secs` and emits the next tick.
    pub fn advance<S: UniformSource + ?Sized>(
        &mut self,
        step_secs: i64,
        config: &FeedConfig,
        source: &mut S,
    ) -> Tick {
        self.time += step_secs;
        self.price = self.process.advance(self.price, config, source);
        Tick::new(self.time, self.price)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::random::{ScriptedUniform, SeededUniform};

    fn range_regime(vol: f64) -> Regime {
        Regime { kind: RegimeKind::Range, drift: 0.0, volatility: vol, ticks_remaining: 10 }
    }

    #[test]
    fn kind_table_boundaries() {
        assert_eq!(RegimeKind::from_uniform(0.0), RegimeKind::Range);
        assert_eq!(RegimeKind::from_uniform(0.6999), RegimeKind::Range);
        assert_eq!(RegimeKind::from_uniform(0.70), RegimeKind::Trend);
        assert_eq!(RegimeKind::from_uniform(0.9499), RegimeKind::Trend);
        assert_eq!(RegimeKind::from_uniform(0.95), RegimeKind::Spike);
        assert_eq!(RegimeKind::from_uniform(0.9999), RegimeKind::Spike);
    }

    #[test]
    fn sampled_parameters_stay_in_ranges() {
        let mut src = SeededUniform::from_seed(11);
        for _ in 0..2_000 {
            let r = sample_regime(&mut src);
            let p = r.kind.params();
            match r.kind {
                RegimeKind::Range => assert_eq!(r.drift, 0.0),
                RegimeKind::Trend => {
                    assert!(r.drift.abs() >= p.drift.0 && r.drift.abs() <= p.drift.1)
                }
                RegimeKind::Spike => assert!(r.drift >= p.drift.0 && r.drift <= p.drift.1),
            }
            assert!(r.volatility >= p.volatility.0 && r.volatility <= p.volatility.1);
            assert!(r.ticks_remaining >= p.duration.0 && r.ticks_remaining <= p.duration.1);
        }
    }

    #[test]
    fn trend_sign_comes_from_extra_draw() {
        // kind=TREND, magnitude=0.0 (→ 0.000005), sign draw 0.1 (< 0.5 → negative)
        let mut src = ScriptedUniform::new(&[0.8, 0.0, 0.1, 0.0, 0.0]);
        let r = sample_regime(&mut src);
        assert_eq!(r.kind, RegimeKind::Trend);
        assert_eq!(r.drift, -0.000_005);
        assert_eq!(r.ticks_remaining, 30);
    }

    #[test]
    fn range_step_pulls_toward_base() {
        let cfg = FeedConfig::new(1.08);
        // u2 = 0.25 → cos(π/2) ≈ 0, so the noise term vanishes.
        let mut src = ScriptedUniform::new(&[0.5, 0.25]);
        let mut regime = range_regime(0.0001);
        let next = step(1.09, &mut regime, &cfg, &mut src);
        assert_eq!(next, 1.0898);
        // Volatility decays toward the (zero) realised noise.
        assert!((regime.volatility - 0.00009).abs() < 1e-12);
    }

    #[test]
    fn trend_step_applies_drift_without_pull() {
        let cfg = FeedConfig::new(1.08);
        let mut src = ScriptedUniform::new(&[0.5, 0.25]);
        let mut regime = Regime {
            kind: RegimeKind::Trend,
            drift: 0.0001,
            volatility: 0.00005,
            ticks_remaining: 5,
        };
        assert_eq!(step(1.09, &mut regime, &cfg, &mut src), 1.0901);
    }

    #[test]
    fn step_clamps_to_band() {
        let cfg = FeedConfig::new(1.08);
        // u1 tiny → |z| large; u2 = 0 → cos = 1 (up), 0.5 → cos = -1 (down).
        let mut up = ScriptedUniform::new(&[1e-300, 0.0]);
        let mut down = ScriptedUniform::new(&[1e-300, 0.5]);
        let mut regime = Regime { kind: RegimeKind::Spike, drift: 0.0, volatility: 0.05, ticks_remaining: 3 };
        let high = step(1.08, &mut regime, &cfg, &mut up);
        let mut regime = Regime { kind: RegimeKind::Spike, drift: 0.0, volatility: 0.05, ticks_remaining: 3 };
        let low = step(1.08, &mut regime, &cfg, &mut down);

        assert_eq!(high, 1.134);
        assert_eq!(low, 1.026);
        // Bounds are snapped onto the price grid before clamping.
        assert_eq!(round_price(high), high);
        assert_eq!(round_price(low), low);
    }

    #[test]
    fn off_grid_bounds_still_emit_grid_prices() {
        let mut cfg = FeedConfig::new(1.08);
        cfg.min_price = 1.0700004;
        cfg.max_price = 1.0899996;
        let mut up = ScriptedUniform::new(&[1e-300, 0.0]);
        let mut regime = Regime { kind: RegimeKind::Spike, drift: 0.0, volatility: 0.05, ticks_remaining: 3 };
        let high = step(1.08, &mut regime, &cfg, &mut up);
        assert_eq!(high, 1.09);
        assert_eq!(round_price(high), high);
    }

    #[test]
    fn zero_uniform_does_not_produce_nan() {
        let cfg = FeedConfig::new(1.08);
        let mut src = ScriptedUniform::new(&[0.0, 0.0]);
        let mut regime = range_regime(0.00003);
        let next = step(1.08, &mut regime, &cfg, &mut src);
        assert!(next.is_finite());
        assert!(regime.volatility.is_finite());
    }

    #[test]
    fn stepped_prices_stay_in_band_and_rounded() {
        let cfg = FeedConfig::new(1.08);
        let mut src = SeededUniform::from_seed(42);
        let mut process = RegimeProcess::new(&mut src);
        let mut price = cfg.base_price;
        for _ in 0..20_000 {
            price = process.advance(price, &cfg, &mut src);
            assert!(price >= cfg.min_price && price <= cfg.max_price);
            assert_eq!(round_price(price), price);
        }
    }

    #[test]
    fn process_resamples_on_expiry() {
        let cfg = FeedConfig::new(1.08);
        let mut process = RegimeProcess::with_regime(Regime {
            kind: RegimeKind::Spike,
            drift: 0.0,
            volatility: 0.0002,
            ticks_remaining: 1,
        });
        let mut src = SeededUniform::from_seed(3);
        process.advance(1.08, &cfg, &mut src);
        assert_eq!(process.regime().ticks_remaining, 0);
        process.advance(1.08, &cfg, &mut src);
        // A fresh regime lasts at least 3 ticks, one of which was just spent.
        assert!(process.regime().ticks_remaining >= 2);
    }

    #[test]
    fn identical_draws_identical_paths() {
        let cfg = FeedConfig::new(1.08);
        let run = || {
            let mut src = SeededUniform::from_seed(99);
            let process = RegimeProcess::new(&mut src);
            let mut path = PricePath::new(0, cfg.base_price, process);
            (0..500).map(|_| path.advance(1, &cfg, &mut src)).collect::<Vec<_>>()
        };
        let a = run();
        let b = run();
        assert_eq!(a, b);
        assert_eq!(a[0].time, 1);
        assert_eq!(a[499].time, 500);
    }

    #[test]
    fn rounding_is_idempotent() {
        for x in [1.080004_9, 1.080005_1, 0.999_999_99, 1.23456] {
            let r = round_price(x);
            assert_eq!(round_price(r), r);
        }
        assert_eq!(round_price(1.080004_9), 1.08);
        assert_eq!(round_price(1.080005_1), 1.08001);
    }
}
