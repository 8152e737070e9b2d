//! # risk::manager — PositionRiskManager
//!
//! Allocation & validity engine for one open position.  Owns the
//! [`Position`] and with it both [`RiskLevelSet`](crate::models::RiskLevelSet)s;
//! every mutation goes through here.
//!
//! ## Rules
//! 1. **Capacity**: `Σ level.lots ≤ position.lots` per set, always.
//!    Over-asks are clamped to what is left, not rejected.
//! 2. **Minimum**: no level ever holds fewer than 0.01 lot.
//! 3. **Validity**: a level price must sit on the correct side of entry
//!    (see [`LevelKind::accepts`]).
//! 4. **Lock**: a locked level keeps its lots and cannot be dragged, but
//!    still accepts programmatic price correction and removal.
//!
//! Every operation returns `Ok(LevelChange)` or a [`RiskRejection`]; a
//! rejection never changes state.

use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::engine::regime::round_price;
use crate::error::RiskRejection;
use crate::models::{LevelKind, Lots, Position, RiskLevel, Side};

// ─── LevelChange ──────────────────────────────────────────────────────────────

/// What an accepted mutation did.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "change", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LevelChange {
    Added {
        kind: LevelKind,
        level: RiskLevel,
        /// Lots asked for; differs from `level.lots` when clamped.
        requested: Lots,
    },
    Removed {
        kind: LevelKind,
        level: RiskLevel,
    },
    LotsUpdated {
        kind: LevelKind,
        level: RiskLevel,
        requested: Lots,
    },
    PriceUpdated {
        kind: LevelKind,
        level: RiskLevel,
        previous: f64,
    },
    LockToggled {
        kind: LevelKind,
        level: RiskLevel,
    },
    PositionLockSet {
        locked: bool,
        levels: usize,
    },
}

impl LevelChange {
    /// Whether a lot request was reduced to fit.
    pub fn was_clamped(&self) -> bool {
        match self {
            LevelChange::Added { level, requested, .. }
            | LevelChange::LotsUpdated { level, requested, .. } => level.lots != *requested,
            _ => false,
        }
    }
}

// ─── PositionRiskManager ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct PositionRiskManager {
    position: Position,
}

impl PositionRiskManager {
    /// Opens a position with no levels.
    pub fn open(side: Side, lots: f64, entry_price: f64) -> Result<Self, RiskRejection> {
        if !entry_price.is_finite() || entry_price <= 0.0 {
            return Err(RiskRejection::ValidationRejected(format!(
                "entry price must be positive, got {entry_price}"
            )));
        }
        let lots = match Lots::from_f64(lots) {
            Some(l) if l >= Lots::MIN => l,
            _ => {
                return Err(RiskRejection::ValidationRejected(format!(
                    "position lots must be at least {}, got {lots}",
                    Lots::MIN
                )))
            }
        };
        Ok(Self { position: Position::new(side, lots, round_price(entry_price)) })
    }

    pub fn id(&self) -> Uuid {
        self.position.id
    }

    pub fn position(&self) -> &Position {
        &self.position
    }

    pub fn into_position(self) -> Position {
        self.position
    }

    /// Validity-table check for `kind` at `price`.
    pub fn validate_price(&self, kind: LevelKind, price: f64) -> Result<(), RiskRejection> {
        let p = &self.position;
        if kind.accepts(p.side, p.entry_price, price) {
            return Ok(());
        }
        let relation = if kind.direction(p.side) > 0.0 { "above" } else { "below" };
        Err(RiskRejection::ValidationRejected(format!(
            "{kind} for {} must be {relation} entry {:.5}, got {price}",
            p.side, p.entry_price
        )))
    }

    /// Lots still unallocated on `kind`.
    pub fn remaining(&self, kind: LevelKind) -> Lots {
        self.position.lots - self.position.levels(kind).total_lots()
    }

    // ─── addLevel ─────────────────────────────────────────────────────────

    /// Adds a level with `min(lots, remaining capacity)`.
    ///
    /// New levels start locked when the whole position is locked.
    pub fn add_level(&mut self, kind: LevelKind, price: f64, lots: f64) -> Result<LevelChange, RiskRejection> {
        let requested = match Lots::from_f64(lots) {
            Some(l) if !l.is_zero() => l,
            _ => return self.reject(RiskRejection::ValidationRejected(format!(
                "lots must be at least {}, got {lots}", Lots::MIN
            ))),
        };
        let price = round_price(price);
        if let Err(e) = self.validate_price(kind, price) {
            return self.reject(e);
        }

        let remaining = self.remaining(kind);
        if remaining.is_zero() {
            return self.reject(RiskRejection::NoOp(format!("no remaining {kind} capacity")));
        }

        let level = RiskLevel {
            id: Uuid::new_v4(),
            price,
            lots: requested.min(remaining),
            locked: self.position.position_locked,
        };
        self.position.levels_mut(kind).levels.push(level.clone());

        debug!(
            position  = %self.position.id,
            %kind,
            price,
            lots      = %level.lots,
            requested = %requested,
            "risk level added"
        );
        Ok(LevelChange::Added { kind, level, requested })
    }

    // ─── removeLevel ──────────────────────────────────────────────────────

    /// Removes regardless of lock state.
    pub fn remove_level(&mut self, kind: LevelKind, level_id: Uuid) -> Result<LevelChange, RiskRejection> {
        let set = self.position.levels_mut(kind);
        let Some(index) = set.levels.iter().position(|l| l.id == level_id) else {
            return self.reject(unknown_level(kind, level_id));
        };
        let level = set.levels.remove(index);
        debug!(position = %self.position.id, %kind, level = %level_id, "risk level removed");
        Ok(LevelChange::Removed { kind, level })
    }

    // ─── updateLots ───────────────────────────────────────────────────────

    /// Clamps to `[0.01, position.lots − Σ other levels]`.  No-op when locked.
    pub fn update_lots(&mut self, kind: LevelKind, level_id: Uuid, lots: f64) -> Result<LevelChange, RiskRejection> {
        if !lots.is_finite() {
            return self.reject(RiskRejection::ValidationRejected(format!("invalid lot size {lots}")));
        }
        let requested = Lots::from_f64(lots.max(0.0)).unwrap_or(Lots::MIN);

        let total = self.position.lots;
        let set = self.position.levels_mut(kind);
        let cap = total - set.total_lots_except(level_id);
        let Some(level) = set.get_mut(level_id) else {
            return self.reject(unknown_level(kind, level_id));
        };
        if level.locked {
            return self.reject(RiskRejection::NoOp(format!("{kind} level {level_id} is locked")));
        }

        level.lots = requested.max(Lots::MIN).min(cap);
        let level = level.clone();

        debug!(
            position  = %self.position.id,
            %kind,
            level     = %level_id,
            lots      = %level.lots,
            requested = %requested,
            "risk level lots updated"
        );
        Ok(LevelChange::LotsUpdated { kind, level, requested })
    }

    // ─── updatePrice ──────────────────────────────────────────────────────

    /// Validated against the side/type table; applied even to locked levels.
    pub fn update_price(&mut self, kind: LevelKind, level_id: Uuid, price: f64) -> Result<LevelChange, RiskRejection> {
        let price = round_price(price);
        if self.position.levels(kind).get(level_id).is_none() {
            return self.reject(unknown_level(kind, level_id));
        }
        if let Err(e) = self.validate_price(kind, price) {
            return self.reject(e);
        }

        let position_id = self.position.id;
        let Some(level) = self.position.levels_mut(kind).get_mut(level_id) else {
            return self.reject(unknown_level(kind, level_id));
        };
        let previous = level.price;
        level.price = price;
        let level = level.clone();

        debug!(position = %position_id, %kind, level = %level_id, previous, price, "risk level price updated");
        Ok(LevelChange::PriceUpdated { kind, level, previous })
    }

    // ─── toggleLock ───────────────────────────────────────────────────────

    pub fn toggle_lock(&mut self, kind: LevelKind, level_id: Uuid) -> Result<LevelChange, RiskRejection> {
        let position_id = self.position.id;
        let Some(level) = self.position.levels_mut(kind).get_mut(level_id) else {
            return self.reject(unknown_level(kind, level_id));
        };
        level.locked = !level.locked;
        let level = level.clone();

        debug!(position = %position_id, %kind, level = %level_id, locked = level.locked, "risk level lock toggled");
        Ok(LevelChange::LockToggled { kind, level })
    }

    // ─── togglePositionLock ───────────────────────────────────────────────

    /// Sets the position flag and cascades it to every level of both sides.
    pub fn toggle_position_lock(&mut self, locked: bool) -> Result<LevelChange, RiskRejection> {
        let p = &mut self.position;
        p.position_locked = locked;
        for level in p.stop_loss.levels.iter_mut().chain(p.take_profit.levels.iter_mut()) {
            level.locked = locked;
        }
        let levels = p.stop_loss.len() + p.take_profit.len();

        debug!(position = %p.id, locked, levels, "position lock set");
        Ok(LevelChange::PositionLockSet { locked, levels })
    }

    fn reject<T>(&self, rejection: RiskRejection) -> Result<T, RiskRejection> {
        warn!(position = %self.position.id, reason = %rejection, "⚠️ risk mutation rejected");
        Err(rejection)
    }
}

fn unknown_level(kind: LevelKind, level_id: Uuid) -> RiskRejection {
    RiskRejection::NoOp(format!("unknown {kind} level {level_id}"))
}
