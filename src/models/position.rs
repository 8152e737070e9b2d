//! # models::position
//!
//! Value types for an open simulated position and its stop-loss /
//! take-profit allocations.
//!
//! ## Ownership
//! `Position` exclusively owns two [`RiskLevelSet`]s (one per [`LevelKind`]);
//! each set exclusively owns its [`RiskLevel`]s.  All mutation goes through
//! [`crate::risk::PositionRiskManager`].

use std::fmt;
use std::iter::Sum;
use std::ops::{Add, Sub};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ─── Side ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Side {
    Buy,
    Sell,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

// ─── LevelKind ────────────────────────────────────────────────────────────────

/// Which side of the position a level protects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LevelKind {
    StopLoss,
    TakeProfit,
}

impl LevelKind {
    /// `+1` if valid prices for this kind lie above entry, `-1` if below.
    ///
    /// | Side | Kind       | Valid         |
    /// |------|------------|---------------|
    /// | BUY  | stopLoss   | price < entry |
    /// | BUY  | takeProfit | price > entry |
    /// | SELL | stopLoss   | price > entry |
    /// | SELL | takeProfit | price < entry |
    pub fn direction(self, side: Side) -> f64 {
        match (side, self) {
            (Side::Buy, LevelKind::TakeProfit) | (Side::Sell, LevelKind::StopLoss) => 1.0,
            (Side::Buy, LevelKind::StopLoss) | (Side::Sell, LevelKind::TakeProfit) => -1.0,
        }
    }

    /// Validity table check.  Prices equal to entry are never valid.
    pub fn accepts(self, side: Side, entry_price: f64, price: f64) -> bool {
        if !price.is_finite() {
            return false;
        }
        if self.direction(side) > 0.0 {
            price > entry_price
        } else {
            price < entry_price
        }
    }
}

impl fmt::Display for LevelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LevelKind::StopLoss => write!(f, "stop_loss"),
            LevelKind::TakeProfit => write!(f, "take_profit"),
        }
    }
}

// ─── Lots ─────────────────────────────────────────────────────────────────────

/// Position size in hundredths of a lot.
///
/// Stored as an integer so capacity sums are exact; serialized as a plain
/// decimal (`0.40`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "f64", try_from = "f64")]
pub struct Lots(u32);

impl Lots {
    pub const ZERO: Lots = Lots::from_hundredths(0);
    /// Smallest allocatable size, 0.01 lot.
    pub const MIN: Lots = Lots::from_hundredths(1);

    pub const fn from_hundredths(h: u32) -> Self {
        Lots(h)
    }

    /// Rounds to the nearest 0.01, saturating at the largest representable
    /// size.  `None` for negative / non-finite input.
    pub fn from_f64(value: f64) -> Option<Self> {
        if !value.is_finite() || value < 0.0 {
            return None;
        }
        let hundredths = (value * 100.0).round().min(u32::MAX as f64);
        Some(Lots(hundredths as u32))
    }

    pub fn as_f64(self) -> f64 {
        self.0 as f64 / 100.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl Add for Lots {
    type Output = Lots;
    fn add(self, rhs: Lots) -> Lots {
        Lots(self.0.saturating_add(rhs.0))
    }
}

/// Saturates at zero.
impl Sub for Lots {
    type Output = Lots;
    fn sub(self, rhs: Lots) -> Lots {
        Lots(self.0.saturating_sub(rhs.0))
    }
}

impl Sum for Lots {
    fn sum<I: Iterator<Item = Lots>>(iter: I) -> Lots {
        iter.fold(Lots::ZERO, |acc, l| acc + l)
    }
}

impl From<Lots> for f64 {
    fn from(lots: Lots) -> f64 {
        lots.as_f64()
    }
}

impl TryFrom<f64> for Lots {
    type Error = String;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Lots::from_f64(value).ok_or_else(|| format!("invalid lot size: {value}"))
    }
}

impl fmt::Display for Lots {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.as_f64())
    }
}

// ─── RiskLevel ────────────────────────────────────────────────────────────────

/// One price + lot allocation.
///
/// `locked` excludes the level from drag hit-testing and from lot changes;
/// programmatic price correction and removal remain allowed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskLevel {
    pub id: Uuid,
    pub price: f64,
    pub lots: Lots,
    pub locked: bool,
}

// ─── RiskLevelSet ─────────────────────────────────────────────────────────────

/// Ordered levels for one side of one position.
///
/// Invariant: `Σ level.lots ≤ position.lots`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskLevelSet {
    pub kind: LevelKind,
    pub levels: Vec<RiskLevel>,
}

impl RiskLevelSet {
    pub fn new(kind: LevelKind) -> Self {
        Self { kind, levels: Vec::new() }
    }

    pub fn total_lots(&self) -> Lots {
        self.levels.iter().map(|l| l.lots).sum()
    }

    /// Sum of every level's lots except `id`.
    pub fn total_lots_except(&self, id: Uuid) -> Lots {
        self.levels.iter().filter(|l| l.id != id).map(|l| l.lots).sum()
    }

    pub fn get(&self, id: Uuid) -> Option<&RiskLevel> {
        self.levels.iter().find(|l| l.id == id)
    }

    pub fn get_mut(&mut self, id: Uuid) -> Option<&mut RiskLevel> {
        self.levels.iter_mut().find(|l| l.id == id)
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}

// ─── Position ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub id: Uuid,
    pub side: Side,
    pub lots: Lots,
    pub entry_price: f64,
    pub stop_loss: RiskLevelSet,
    pub take_profit: RiskLevelSet,
    pub position_locked: bool,
    pub opened_at: DateTime<Utc>,
}

impl Position {
    pub fn new(side: Side, lots: Lots, entry_price: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            side,
            lots,
            entry_price,
            stop_loss: RiskLevelSet::new(LevelKind::StopLoss),
            take_profit: RiskLevelSet::new(LevelKind::TakeProfit),
            position_locked: false,
            opened_at: Utc::now(),
        }
    }

    pub fn levels(&self, kind: LevelKind) -> &RiskLevelSet {
        match kind {
            LevelKind::StopLoss => &self.stop_loss,
            LevelKind::TakeProfit => &self.take_profit,
        }
    }

    pub fn levels_mut(&mut self, kind: LevelKind) -> &mut RiskLevelSet {
        match kind {
            LevelKind::StopLoss => &mut self.stop_loss,
            LevelKind::TakeProfit => &mut self.take_profit,
        }
    }
}
