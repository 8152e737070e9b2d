//! # error
//!
//! Error taxonomy for the whole service.
//!
//! - [`RiskRejection`]: a risk-level mutation that left state unchanged.
//!   Never fatal; the caller gets it back next to the unchanged position.
//! - [`FeedError`]: the live market adapter could not connect / authenticate
//!   / parse.  Degrades to "no ticks arrive".
//! - [`AppError`]: what HTTP handlers return.  Axum's `IntoResponse` impl
//!   converts these into structured JSON error bodies so the chart client
//!   always gets a machine-readable response even on failure.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

// ─── Risk ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RiskRejection {
    /// Price violates the side/type rule, or the lot request is unusable.
    #[error("validation rejected: {0}")]
    ValidationRejected(String),

    /// Locked level, unknown level id, or zero remaining capacity.
    #[error("no-op: {0}")]
    NoOp(String),
}

impl RiskRejection {
    /// Stable wire label used in API responses.
    pub fn label(&self) -> &'static str {
        match self {
            RiskRejection::ValidationRejected(_) => "VALIDATION_REJECTED",
            RiskRejection::NoOp(_) => "NO_OP",
        }
    }

    pub fn reason(&self) -> &str {
        match self {
            RiskRejection::ValidationRejected(r) | RiskRejection::NoOp(r) => r,
        }
    }
}

// ─── Feed ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum FeedError {
    /// Connect / auth / stream failure on the external market connection.
    #[error("transport failure: {0}")]
    Transport(String),

    /// Invalid feed parameters.
    #[error("invalid feed config: {0}")]
    Config(String),
}

impl From<tokio_tungstenite::tungstenite::Error> for FeedError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        FeedError::Transport(err.to_string())
    }
}

// ─── HTTP ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum AppError {
    /// The request payload was syntactically correct but semantically invalid.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// The requested resource (e.g. a position) does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Catch-all for unexpected failures.
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Internal(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Internal error: {err}"),
            ),
        };

        let body = Json(json!({
            "ok":    false,
            "error": message,
        }));

        (status, body).into_response()
    }
}
