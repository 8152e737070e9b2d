//! # Tickdesk — Single-Instrument Trading Demo Backend
//!
//! ```text
//!  ┌──────────────────┐  on_tick   ┌───────────────────────────────┐
//!  │ MarketFeed       │ ─────────▶ │ AppState                      │
//!  │ ├─ synthetic 📈  │            │ ├─ BarBook (M5 aggregation)   │
//!  │ └─ live (WS)     │            │ ├─ positions  🛡️              │
//!  └──────────────────┘            │ └─ broadcast_tx ────────────┐ │
//!                                  └─────────────────────────────┼─┘
//!  ┌──────────────────┐  ws://host/ws/market  ◀──────────────────┘
//!  │  Chart client    │  GET  /api/market/bars
//!  └──────────────────┘  POST /api/positions, /api/preview …
//! ```
//!
//! ## Environment Variables
//!
//! | Variable          | Default               | Description                      |
//! |-------------------|-----------------------|----------------------------------|
//! | `BIND_ADDR`       | `0.0.0.0:3000`        | Address Axum listens on          |
//! | `FEED_SOURCE`     | `synthetic`           | `synthetic` or `live`            |
//! | `FEED_SEED`       | unset                 | Reproducible synthetic path      |
//! | `HISTORY_BARS`    | `288`                 | Seeded M5 bars                   |
//! | `MARKET_API_KEY`  | unset                 | Live stream credential           |
//! | `RUST_LOG`        | `tickdesk=debug`      | Tracing filter                   |
//!
//! The full list lives in [`config`].

use std::net::SocketAddr;

use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod config;
mod engine;
mod error;
mod events;
mod feed;
mod models;
mod risk;
mod routes;
mod state;

use config::AppConfig;
use routes::build_router;
use state::{build_state, start_feed, SharedState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Load .env ──────────────────────────────────────────────────────────
    dotenvy::dotenv().ok();

    // ── 2. Structured logging ─────────────────────────────────────────────────
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::from_default_env()
                .add_directive("tickdesk=debug".parse()?)
                .add_directive("tower_http=info".parse()?),
        )
        .init();

    info!(r#"

  ╔═══════════════════════════════════════════════════════╗
  ║              TICKDESK — Trading Demo Core             ║
  ║     Regime Feed · M5 Bars · SL/TP Risk Engine         ║
  ╚═══════════════════════════════════════════════════════╝"#);

    // ── 3. Config ─────────────────────────────────────────────────────────────
    let config = AppConfig::from_env();
    config.feed.validate()?;
    info!(
        feed_source  = ?config.feed_source,
        base_price   = config.feed.base_price,
        history_bars = config.history_bars,
        "Configuration loaded"
    );

    // ── 4. Shared state + feed ────────────────────────────────────────────────
    let state = build_state(&config);
    start_feed(&state);

    // ── 5. Router ─────────────────────────────────────────────────────────────
    let app = build_router(state.clone());

    // ── 6. Bind & Serve ───────────────────────────────────────────────────────
    let addr: SocketAddr = config.bind_addr.parse()?;

    info!(?addr, "🚀 Tickdesk server starting");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state))
        .await?;

    info!("👋 Server stopped");
    Ok(())
}

/// Resolves on Ctrl-C, after stopping the feed.
async fn shutdown_signal(state: SharedState) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for Ctrl-C");
    }
    info!("Shutdown requested");
    state.feed.stop();
}
