//! # routes::market
//!
//! | Method | Path               | Description                               |
//! |--------|--------------------|-------------------------------------------|
//! | GET    | `/api/health`      | Feed name, tick count, last tick, uptime  |
//! | GET    | `/api/market/bars` | Chart history (optionally `?limit=N`)     |

use std::sync::atomic::Ordering;

use axum::{
    extract::{Query, State},
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use crate::state::SharedState;

/// GET /api/health
pub async fn health_check(State(state): State<SharedState>) -> impl IntoResponse {
    let uptime = (Utc::now() - state.started_at).num_seconds();
    Json(json!({
        "ok":          true,
        "service":     "tickdesk",
        "feed":        state.feed.name(),
        "tick_count":  state.tick_count.load(Ordering::Relaxed),
        "last_tick":   state.last_tick(),
        "uptime_secs": uptime,
    }))
}

#[derive(Debug, Deserialize)]
pub struct BarsQuery {
    /// Most recent N bars only.
    pub limit: Option<usize>,
}

/// GET /api/market/bars: oldest first, the in-progress bar last.
pub async fn get_bars(
    State(state): State<SharedState>,
    Query(query): Query<BarsQuery>,
) -> impl IntoResponse {
    let mut bars = state.bars();
    if let Some(limit) = query.limit {
        let skip = bars.len().saturating_sub(limit);
        bars.drain(..skip);
    }
    Json(json!({
        "ok":    true,
        "count": bars.len(),
        "bars":  bars,
    }))
}
