//! # routes::positions
//!
//! Preview drafts, placement and the risk-level mutation surface.
//!
//! | Method | Path                                               | Description              |
//! |--------|----------------------------------------------------|--------------------------|
//! | POST   | `/api/preview`                                     | Draft SL/TP around price |
//! | GET    | `/api/positions`                                   | Open positions           |
//! | POST   | `/api/positions`                                   | Place at market          |
//! | GET    | `/api/positions/:id`                               | One position             |
//! | DELETE | `/api/positions/:id`                               | Close                    |
//! | POST   | `/api/positions/:id/lock`                          | Set position lock        |
//! | POST   | `/api/positions/:id/levels/:kind`                  | Add level                |
//! | DELETE | `/api/positions/:id/levels/:kind/:level_id`        | Remove level             |
//! | PATCH  | `/api/positions/:id/levels/:kind/:level_id/lots`   | Resize level             |
//! | PATCH  | `/api/positions/:id/levels/:kind/:level_id/price`  | Move level               |
//! | POST   | `/api/positions/:id/levels/:kind/:level_id/lock`   | Toggle level lock        |
//!
//! Every mutation answers with the position after the call and an
//! `outcome`: `APPLIED`, `VALIDATION_REJECTED` or `NO_OP`.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::{
    error::{AppError, RiskRejection},
    models::{LevelKind, Side},
    risk::{preview::DraftLevel, DraftPosition},
    state::{Mutation, SharedState},
};

// ─── Outcome ──────────────────────────────────────────────────────────────────

/// `200` when applied or a no-op, `422` when the request broke a rule.
fn outcome(mutation: Mutation) -> (StatusCode, Json<Value>) {
    match mutation.result {
        Ok(change) => (
            StatusCode::OK,
            Json(json!({
                "ok":       true,
                "outcome":  "APPLIED",
                "clamped":  change.was_clamped(),
                "change":   change,
                "position": mutation.position,
            })),
        ),
        Err(rejection) => {
            let status = match rejection {
                RiskRejection::ValidationRejected(_) => StatusCode::UNPROCESSABLE_ENTITY,
                RiskRejection::NoOp(_) => StatusCode::OK,
            };
            (
                status,
                Json(json!({
                    "ok":       false,
                    "outcome":  rejection.label(),
                    "reason":   rejection.reason(),
                    "position": mutation.position,
                })),
            )
        }
    }
}

fn not_found(id: Uuid) -> AppError {
    AppError::NotFound(format!("position {id}"))
}

// ─── POST /api/preview ────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct PreviewBody {
    pub side: Side,
    pub lots: Option<f64>,
    /// Slider positions in `[0, 100]`; both or neither.
    pub sl_slider: Option<f64>,
    pub tp_slider: Option<f64>,
}

pub async fn preview(
    State(state): State<SharedState>,
    Json(body): Json<PreviewBody>,
) -> Result<impl IntoResponse, AppError> {
    let tick = state
        .last_tick()
        .ok_or_else(|| AppError::BadRequest("no market price yet".into()))?;
    let lots = body.lots.unwrap_or(state.preview.default_lots);

    let draft = match (body.sl_slider, body.tp_slider) {
        (Some(sl), Some(tp)) => DraftPosition::from_sliders(body.side, lots, tick.price, sl, tp),
        (None, None) => DraftPosition::around(body.side, lots, tick.price, &state.preview),
        _ => return Err(AppError::BadRequest("give both sl_slider and tp_slider, or neither".into())),
    };
    Ok(Json(json!({
        "ok":      true,
        "draft":   draft,
        "sliders": {
            "stop_loss":   draft.slider(LevelKind::StopLoss),
            "take_profit": draft.slider(LevelKind::TakeProfit),
        },
    })))
}

// ─── Positions ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct PlaceBody {
    pub side: Side,
    pub lots: Option<f64>,
    /// Explicit levels; omitted → default draft distances.
    pub stop_loss: Option<Vec<DraftLevel>>,
    pub take_profit: Option<Vec<DraftLevel>>,
}

/// POST /api/positions: places at the latest price.
pub async fn place_position(
    State(state): State<SharedState>,
    Json(body): Json<PlaceBody>,
) -> Result<impl IntoResponse, AppError> {
    let tick = state
        .last_tick()
        .ok_or_else(|| AppError::BadRequest("no market price yet".into()))?;
    let lots = body.lots.unwrap_or(state.preview.default_lots);

    let mut draft = DraftPosition::around(body.side, lots, tick.price, &state.preview);
    if body.stop_loss.is_some() || body.take_profit.is_some() {
        draft.stop_loss = body.stop_loss.unwrap_or_default();
        draft.take_profit = body.take_profit.unwrap_or_default();
    }

    match state.place(&draft).await {
        Ok((position, skipped)) => {
            let skipped: Vec<Value> = skipped
                .iter()
                .map(|r| json!({ "outcome": r.label(), "reason": r.reason() }))
                .collect();
            Ok((
                StatusCode::CREATED,
                Json(json!({ "ok": true, "position": position, "skipped": skipped })),
            ))
        }
        Err(rejection) => Err(AppError::BadRequest(rejection.to_string())),
    }
}

pub async fn list_positions(State(state): State<SharedState>) -> impl IntoResponse {
    let positions = state.list_positions().await;
    Json(json!({
        "ok":        true,
        "count":     positions.len(),
        "positions": positions,
    }))
}

pub async fn get_position(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let position = state.position(id).await.ok_or_else(|| not_found(id))?;
    Ok(Json(json!({ "ok": true, "position": position })))
}

pub async fn close_position(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let position = state.close_position(id).await.ok_or_else(|| not_found(id))?;
    Ok(Json(json!({ "ok": true, "position": position })))
}

#[derive(Debug, Deserialize)]
pub struct PositionLockBody {
    pub locked: bool,
}

pub async fn set_position_lock(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(body): Json<PositionLockBody>,
) -> Result<impl IntoResponse, AppError> {
    let mutation = state
        .mutate(id, |m| m.toggle_position_lock(body.locked))
        .await
        .ok_or_else(|| not_found(id))?;
    Ok(outcome(mutation))
}

// ─── Levels ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct AddLevelBody {
    pub price: f64,
    pub lots: f64,
}

pub async fn add_level(
    State(state): State<SharedState>,
    Path((id, kind)): Path<(Uuid, LevelKind)>,
    Json(body): Json<AddLevelBody>,
) -> Result<impl IntoResponse, AppError> {
    let mutation = state
        .mutate(id, |m| m.add_level(kind, body.price, body.lots))
        .await
        .ok_or_else(|| not_found(id))?;
    Ok(outcome(mutation))
}

pub async fn remove_level(
    State(state): State<SharedState>,
    Path((id, kind, level_id)): Path<(Uuid, LevelKind, Uuid)>,
) -> Result<impl IntoResponse, AppError> {
    let mutation = state
        .mutate(id, |m| m.remove_level(kind, level_id))
        .await
        .ok_or_else(|| not_found(id))?;
    Ok(outcome(mutation))
}

#[derive(Debug, Deserialize)]
pub struct LotsBody {
    pub lots: f64,
}

pub async fn update_lots(
    State(state): State<SharedState>,
    Path((id, kind, level_id)): Path<(Uuid, LevelKind, Uuid)>,
    Json(body): Json<LotsBody>,
) -> Result<impl IntoResponse, AppError> {
    let mutation = state
        .mutate(id, |m| m.update_lots(kind, level_id, body.lots))
        .await
        .ok_or_else(|| not_found(id))?;
    Ok(outcome(mutation))
}

#[derive(Debug, Deserialize)]
pub struct PriceBody {
    pub price: f64,
}

pub async fn update_price(
    State(state): State<SharedState>,
    Path((id, kind, level_id)): Path<(Uuid, LevelKind, Uuid)>,
    Json(body): Json<PriceBody>,
) -> Result<impl IntoResponse, AppError> {
    let mutation = state
        .mutate(id, |m| m.update_price(kind, level_id, body.price))
        .await
        .ok_or_else(|| not_found(id))?;
    Ok(outcome(mutation))
}

pub async fn toggle_level_lock(
    State(state): State<SharedState>,
    Path((id, kind, level_id)): Path<(Uuid, LevelKind, Uuid)>,
) -> Result<impl IntoResponse, AppError> {
    let mutation = state
        .mutate(id, |m| m.toggle_lock(kind, level_id))
        .await
        .ok_or_else(|| not_found(id))?;
    Ok(outcome(mutation))
}
