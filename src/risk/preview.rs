//! # risk::preview
//!
//! Draft SL/TP levels shown around the current price before a trade is
//! placed.  Drafts are pure visual feedback: no validity or capacity check
//! applies until [`DraftPosition::place`] turns them into a real position.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::env_or;
use crate::engine::regime::round_price;
use crate::error::RiskRejection;
use crate::models::{LevelKind, Side};
use crate::risk::manager::PositionRiskManager;
use crate::risk::slider::{percent_to_price, percent_to_slider, price_to_percent, slider_to_percent};

/// One pip under this instrument's quoting convention.
pub const PIP: f64 = 0.0001;

// ─── Config ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct PreviewConfig {
    /// Lots for a fresh draft when the client does not say.
    pub default_lots: f64,
    /// Default stop-loss distance in pips.
    pub sl_pips: f64,
    /// Default take-profit distance in pips.
    pub tp_pips: f64,
}

impl PreviewConfig {
    pub fn from_env() -> Self {
        Self {
            default_lots: env_or("RISK_DEFAULT_LOTS", 1.0),
            sl_pips:      env_or("RISK_PREVIEW_SL_PIPS", 20.0),
            tp_pips:      env_or("RISK_PREVIEW_TP_PIPS", 40.0),
        }
    }
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self { default_lots: 1.0, sl_pips: 20.0, tp_pips: 40.0 }
    }
}

// ─── Draft ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftLevel {
    pub price: f64,
    pub lots: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftPosition {
    pub side: Side,
    pub lots: f64,
    /// Price the draft was laid out around.
    pub reference_price: f64,
    pub stop_loss: Vec<DraftLevel>,
    pub take_profit: Vec<DraftLevel>,
}

impl DraftPosition {
    /// One SL and one TP at the configured pip distances from `price`.
    pub fn around(side: Side, lots: f64, price: f64, config: &PreviewConfig) -> Self {
        let at = |kind: LevelKind, pips: f64| DraftLevel {
            price: round_price(price + kind.direction(side) * pips * PIP),
            lots,
        };
        Self {
            side,
            lots,
            reference_price: price,
            stop_loss: vec![at(LevelKind::StopLoss, config.sl_pips)],
            take_profit: vec![at(LevelKind::TakeProfit, config.tp_pips)],
        }
    }

    /// One SL and one TP at slider-chosen percent distances from `price`.
    pub fn from_sliders(side: Side, lots: f64, price: f64, sl_slider: f64, tp_slider: f64) -> Self {
        let at = |kind: LevelKind, slider: f64| DraftLevel {
            price: percent_to_price(price, side, kind, slider_to_percent(slider)),
            lots,
        };
        Self {
            side,
            lots,
            reference_price: price,
            stop_loss: vec![at(LevelKind::StopLoss, sl_slider)],
            take_profit: vec![at(LevelKind::TakeProfit, tp_slider)],
        }
    }

    /// Slider position of the first draft level of `kind`, if any.
    pub fn slider(&self, kind: LevelKind) -> Option<f64> {
        let level = self.levels(kind).first()?;
        Some(percent_to_slider(price_to_percent(self.reference_price, level.price)))
    }

    pub fn levels(&self, kind: LevelKind) -> &[DraftLevel] {
        match kind {
            LevelKind::StopLoss => &self.stop_loss,
            LevelKind::TakeProfit => &self.take_profit,
        }
    }

    pub fn levels_mut(&mut self, kind: LevelKind) -> &mut Vec<DraftLevel> {
        match kind {
            LevelKind::StopLoss => &mut self.stop_loss,
            LevelKind::TakeProfit => &mut self.take_profit,
        }
    }

    /// Opens a position at `entry_price` and adds each draft level through
    /// the normal risk rules.  Drafts that fail validation are skipped and
    /// reported next to the new position.
    pub fn place(&self, entry_price: f64) -> Result<(PositionRiskManager, Vec<RiskRejection>), RiskRejection> {
        let mut manager = PositionRiskManager::open(self.side, self.lots, entry_price)?;
        let mut skipped = Vec::new();
        for kind in [LevelKind::StopLoss, LevelKind::TakeProfit] {
            for draft in self.levels(kind) {
                if let Err(e) = manager.add_level(kind, draft.price, draft.lots) {
                    skipped.push(e);
                }
            }
        }
        info!(
            position = %manager.id(),
            side     = %self.side,
            lots     = self.lots,
            entry    = manager.position().entry_price,
            skipped  = skipped.len(),
            "📌 Draft placed"
        );
        if manager.position().stop_loss.is_empty() {
            warn!(position = %manager.id(), "position placed without a stop loss");
        }
        Ok((manager, skipped))
    }
}
