//! # config — read configuration from environment variables
//!
//! Every value has a default; an unparsable value falls back to it rather
//! than aborting start-up.  Component-specific configs (`LiveFeedConfig`,
//! `PreviewConfig`) live next to their consumers and are gathered here.

use std::str::FromStr;
use std::time::Duration;

use crate::error::FeedError;
use crate::feed::live::LiveFeedConfig;
use crate::risk::preview::PreviewConfig;

// ─── FeedConfig ───────────────────────────────────────────────────────────────

/// Parameters of the synthetic price process and its cadence.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedConfig {
    /// Initial price and RANGE mean-reversion anchor.
    pub base_price: f64,
    /// Lower clamp for every stepped price.
    pub min_price: f64,
    /// Upper clamp for every stepped price.
    pub max_price: f64,
    /// Fraction of the distance to `base_price` removed per RANGE step.
    pub mean_reversion: f64,
    /// Wall-clock time between generator firings.
    pub interval: Duration,
    /// Simulated seconds added per firing.
    pub step_secs: i64,
    /// Fixed RNG seed; `None` draws from entropy.
    pub seed: Option<u64>,
}

impl FeedConfig {
    /// Defaults around `base_price`: a ±5 % clamp band, 2 % pull, 1 s cadence.
    pub fn new(base_price: f64) -> Self {
        Self {
            base_price,
            min_price: base_price * 0.95,
            max_price: base_price * 1.05,
            mean_reversion: 0.02,
            interval: Duration::from_millis(1000),
            step_secs: 1,
            seed: None,
        }
    }

    pub fn from_env() -> Self {
        let base = env_or("FEED_BASE_PRICE", 1.08);
        let defaults = Self::new(base);
        Self {
            base_price:     base,
            min_price:      env_or("FEED_MIN_PRICE", defaults.min_price),
            max_price:      env_or("FEED_MAX_PRICE", defaults.max_price),
            mean_reversion: env_or("FEED_MEAN_REVERSION", defaults.mean_reversion),
            interval:       Duration::from_millis(env_or("FEED_INTERVAL_MS", 1000_u64)),
            step_secs:      env_or("FEED_STEP_SECS", defaults.step_secs),
            seed:           env_opt("FEED_SEED"),
        }
    }

    pub fn validate(&self) -> Result<(), FeedError> {
        let prices = [self.base_price, self.min_price, self.max_price, self.mean_reversion];
        if prices.iter().any(|v| !v.is_finite()) {
            return Err(FeedError::Config("prices must be finite".into()));
        }
        if self.min_price >= self.max_price {
            return Err(FeedError::Config(format!(
                "min_price {} must be below max_price {}",
                self.min_price, self.max_price
            )));
        }
        if !(self.min_price..=self.max_price).contains(&self.base_price) {
            return Err(FeedError::Config(format!(
                "base_price {} outside [{}, {}]",
                self.base_price, self.min_price, self.max_price
            )));
        }
        if !(0.0..=1.0).contains(&self.mean_reversion) {
            return Err(FeedError::Config("mean_reversion must be within [0, 1]".into()));
        }
        if self.interval.is_zero() || self.step_secs <= 0 {
            return Err(FeedError::Config("interval and step must be positive".into()));
        }
        Ok(())
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self::new(1.08)
    }
}

// ─── AppConfig ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedSource {
    Synthetic,
    Live,
}

impl FromStr for FeedSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "synthetic" | "sim" => Ok(FeedSource::Synthetic),
            "live" => Ok(FeedSource::Live),
            other => Err(format!("unknown FEED_SOURCE '{other}'")),
        }
    }
}

/// Everything the service reads at start-up.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr:    String,
    pub feed_source:  FeedSource,
    pub feed:         FeedConfig,
    pub history_bars: usize,
    pub live:         LiveFeedConfig,
    pub preview:      PreviewConfig,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            bind_addr:    std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string()),
            feed_source:  env_or("FEED_SOURCE", FeedSource::Synthetic),
            feed:         FeedConfig::from_env(),
            history_bars: env_or("HISTORY_BARS", 288_usize),
            live:         LiveFeedConfig::from_env(),
            preview:      PreviewConfig::from_env(),
        }
    }
}

// ─── Helpers ──────────────────────────────────────────────────────────────────

pub(crate) fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env_opt(key).unwrap_or(default)
}

pub(crate) fn env_opt<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let cfg = FeedConfig::default();
        assert!(cfg.validate().is_ok());
        assert!(cfg.min_price < cfg.base_price && cfg.base_price < cfg.max_price);
    }

    #[test]
    fn rejects_inverted_band() {
        let mut cfg = FeedConfig::new(1.08);
        cfg.min_price = 1.2;
        cfg.max_price = 1.0;
        assert!(matches!(cfg.validate(), Err(FeedError::Config(_))));
    }

    #[test]
    fn rejects_base_outside_band_and_zero_step() {
        let mut cfg = FeedConfig::new(1.08);
        cfg.base_price = 2.0;
        assert!(cfg.validate().is_err());

        let mut cfg = FeedConfig::new(1.08);
        cfg.step_secs = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn feed_source_parses() {
        assert_eq!("LIVE".parse::<FeedSource>(), Ok(FeedSource::Live));
        assert_eq!("synthetic".parse::<FeedSource>(), Ok(FeedSource::Synthetic));
        assert!("mt5".parse::<FeedSource>().is_err());
    }
}
