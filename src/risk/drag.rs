//! # risk::drag — DragResolver
//!
//! Turns a stream of already-resolved target prices (the renderer converts
//! pointer coordinates) into updates on one risk level.
//!
//! * **Preview** targets (draft levels before placement) follow the pointer
//!   unchecked; every move is written straight into the draft.
//! * **Placed** targets move optimistically: the resolver remembers the
//!   pointer price but the position is untouched until [`DragResolver::end`],
//!   which commits once through [`PositionRiskManager::update_price`].  A
//!   rejected commit snaps the line back to where the drag started.
//!
//! Locked levels never hit-test and cannot be dragged.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::engine::regime::round_price;
use crate::error::RiskRejection;
use crate::models::LevelKind;
use crate::risk::manager::{LevelChange, PositionRiskManager};
use crate::risk::preview::DraftPosition;

/// Which line is being dragged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum DragTarget {
    Preview { kind: LevelKind, index: usize },
    Placed { trade_id: Uuid, kind: LevelKind, level_id: Uuid },
}

/// Where the dragged line should be drawn right now.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DragFrame {
    pub target: DragTarget,
    pub price: f64,
    /// `true` once the price is part of the position's real state.
    pub committed: bool,
}

/// Result of releasing a drag.
#[derive(Debug, Clone, PartialEq)]
pub enum DragRelease {
    /// Draft level left at its last preview price.
    Preview(DragFrame),
    /// Final price accepted by the risk manager.
    Committed { frame: DragFrame, change: LevelChange },
    /// Final price refused; `frame` carries the original price.
    Reverted { frame: DragFrame, rejection: RiskRejection },
}

#[derive(Debug, Clone, Copy)]
struct DragSession {
    target: DragTarget,
    original_price: f64,
    current_price: f64,
}

#[derive(Debug, Default)]
pub struct DragResolver {
    active: Option<DragSession>,
}

impl DragResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active(&self) -> Option<DragTarget> {
        self.active.map(|s| s.target)
    }

    /// Nearest draggable line within `tolerance` of `price`.
    pub fn hit_test(
        draft: Option<&DraftPosition>,
        positions: &HashMap<Uuid, PositionRiskManager>,
        price: f64,
        tolerance: f64,
    ) -> Option<DragTarget> {
        let mut best: Option<(f64, DragTarget)> = None;
        let mut consider = |distance: f64, target: DragTarget| {
            if distance <= tolerance && best.map_or(true, |(d, _)| distance < d) {
                best = Some((distance, target));
            }
        };

        for kind in [LevelKind::StopLoss, LevelKind::TakeProfit] {
            if let Some(draft) = draft {
                for (index, level) in draft.levels(kind).iter().enumerate() {
                    consider((level.price - price).abs(), DragTarget::Preview { kind, index });
                }
            }
            for manager in positions.values() {
                for level in manager.position().levels(kind).levels.iter().filter(|l| !l.locked) {
                    consider(
                        (level.price - price).abs(),
                        DragTarget::Placed { trade_id: manager.id(), kind, level_id: level.id },
                    );
                }
            }
        }
        best.map(|(_, target)| target)
    }

    /// Starts dragging `target`, replacing any drag in progress.
    pub fn begin(
        &mut self,
        target: DragTarget,
        draft: Option<&DraftPosition>,
        positions: &HashMap<Uuid, PositionRiskManager>,
    ) -> Result<DragFrame, RiskRejection> {
        let price = current_price(target, draft, positions)?;
        self.active = Some(DragSession { target, original_price: price, current_price: price });
        debug!(?target, price, "drag started");
        Ok(DragFrame { target, price, committed: false })
    }

    /// Follows the pointer.  `None` when no drag is active.
    pub fn move_to(&mut self, price: f64, draft: Option<&mut DraftPosition>) -> Option<DragFrame> {
        let session = self.active.as_mut()?;
        let price = round_price(price);
        if !price.is_finite() {
            return Some(DragFrame { target: session.target, price: session.current_price, committed: false });
        }
        session.current_price = price;

        if let DragTarget::Preview { kind, index } = session.target {
            if let Some(level) = draft.and_then(|d| d.levels_mut(kind).get_mut(index)) {
                level.price = price;
            }
        }
        Some(DragFrame { target: session.target, price, committed: false })
    }

    /// Releases the drag.  Placed targets are validated and committed here.
    pub fn end(
        &mut self,
        draft: Option<&mut DraftPosition>,
        positions: &mut HashMap<Uuid, PositionRiskManager>,
    ) -> Option<DragRelease> {
        let session = self.active.take()?;
        let release = match session.target {
            DragTarget::Preview { kind, index } => {
                if let Some(level) = draft.and_then(|d| d.levels_mut(kind).get_mut(index)) {
                    level.price = session.current_price;
                }
                DragRelease::Preview(DragFrame {
                    target:    session.target,
                    price:     session.current_price,
                    committed: false,
                })
            }
            DragTarget::Placed { trade_id, kind, level_id } => {
                match commit(positions, trade_id, kind, level_id, session.current_price) {
                    Ok(change) => DragRelease::Committed {
                        frame: DragFrame { target: session.target, price: session.current_price, committed: true },
                        change,
                    },
                    Err(rejection) => DragRelease::Reverted {
                        frame: DragFrame { target: session.target, price: session.original_price, committed: true },
                        rejection,
                    },
                }
            }
        };
        debug!(?release, "drag ended");
        Some(release)
    }

    /// Abandons the drag and restores the starting price.
    pub fn cancel(&mut self, draft: Option<&mut DraftPosition>) -> Option<DragFrame> {
        let session = self.active.take()?;
        if let DragTarget::Preview { kind, index } = session.target {
            if let Some(level) = draft.and_then(|d| d.levels_mut(kind).get_mut(index)) {
                level.price = session.original_price;
            }
        }
        debug!(target = ?session.target, "drag cancelled");
        Some(DragFrame { target: session.target, price: session.original_price, committed: false })
    }
}

fn current_price(
    target: DragTarget,
    draft: Option<&DraftPosition>,
    positions: &HashMap<Uuid, PositionRiskManager>,
) -> Result<f64, RiskRejection> {
    match target {
        DragTarget::Preview { kind, index } => draft
            .and_then(|d| d.levels(kind).get(index))
            .map(|l| l.price)
            .ok_or_else(|| RiskRejection::NoOp(format!("no preview {kind} level #{index}"))),
        DragTarget::Placed { trade_id, kind, level_id } => {
            let level = positions
                .get(&trade_id)
                .and_then(|m| m.position().levels(kind).get(level_id))
                .ok_or_else(|| RiskRejection::NoOp(format!("unknown {kind} level {level_id}")))?;
            if level.locked {
                return Err(RiskRejection::NoOp(format!("{kind} level {level_id} is locked")));
            }
            Ok(level.price)
        }
    }
}

fn commit(
    positions: &mut HashMap<Uuid, PositionRiskManager>,
    trade_id: Uuid,
    kind: LevelKind,
    level_id: Uuid,
    price: f64,
) -> Result<LevelChange, RiskRejection> {
    let manager = positions
        .get_mut(&trade_id)
        .ok_or_else(|| RiskRejection::NoOp(format!("position {trade_id} is closed")))?;
    // Locked mid-drag: the line goes back.
    if manager.position().levels(kind).get(level_id).is_some_and(|l| l.locked) {
        return Err(RiskRejection::NoOp(format!("{kind} level {level_id} was locked during drag")));
    }
    manager.update_price(kind, level_id, price)
}
