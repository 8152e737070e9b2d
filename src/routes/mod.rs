pub mod market;
pub mod monitor;
pub mod positions;

use axum::{
    routing::{delete, get, patch, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::state::SharedState;

use market::{get_bars, health_check};
use monitor::ws_market;
use positions::{
    add_level, close_position, get_position, list_positions, place_position, preview,
    remove_level, set_position_lock, toggle_level_lock, update_lots, update_price,
};

/// Every HTTP and WebSocket route, with CORS and request tracing.
pub fn build_router(state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // ── Market ────────────────────────────────────────────────────────────
        .route("/api/health",                                    get(health_check))
        .route("/api/market/bars",                               get(get_bars))
        .route("/ws/market",                                     get(ws_market))
        // ── Positions ─────────────────────────────────────────────────────────
        .route("/api/preview",                                   post(preview))
        .route("/api/positions",                                 get(list_positions).post(place_position))
        .route("/api/positions/:id",                             get(get_position).delete(close_position))
        .route("/api/positions/:id/lock",                        post(set_position_lock))
        // ── Risk levels ───────────────────────────────────────────────────────
        .route("/api/positions/:id/levels/:kind",                post(add_level))
        .route("/api/positions/:id/levels/:kind/:level_id",      delete(remove_level))
        .route("/api/positions/:id/levels/:kind/:level_id/lots", patch(update_lots))
        .route("/api/positions/:id/levels/:kind/:level_id/price", patch(update_price))
        .route("/api/positions/:id/levels/:kind/:level_id/lock", post(toggle_level_lock))
        // ── Middleware ────────────────────────────────────────────────────────
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
