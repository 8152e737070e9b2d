//! # events
//!
//! Defines [`WsEvent`], every message the service pushes to chart clients
//! over WebSocket.
//!
//! Market and position events go through a
//! `tokio::sync::broadcast::Sender<String>` as pre-serialized JSON, so every
//! connection gets the same bytes without cloning the payload types.
//! Draft and drag events are per-connection and sent directly.

use serde::Serialize;
use uuid::Uuid;

use crate::models::{Bar, Position, Tick};
use crate::risk::{DragFrame, DraftPosition, LevelChange};

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WsEvent {
    /// Raw price sample from the active feed.
    Tick {
        tick: Tick,
    },

    /// A new 300 s bucket started; `bar` is its first state.
    BarAppended {
        bar: Bar,
    },

    /// The in-progress bar changed.
    BarUpdated {
        bar: Bar,
    },

    PositionOpened {
        position: Box<Position>,
    },

    PositionClosed {
        position_id: Uuid,
    },

    /// A risk mutation was applied; `position` is the state after it.
    LevelsChanged {
        position: Box<Position>,
        change:   LevelChange,
    },

    /// This connection's preview draft moved.
    DraftUpdated {
        draft: Box<DraftPosition>,
    },

    /// Where the dragged line should be drawn.
    DragPreview {
        frame: DragFrame,
    },

    /// A request from this connection changed nothing.
    Rejected {
        outcome: &'static str,
        reason:  String,
    },
}

impl WsEvent {
    #[inline]
    pub fn to_json(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|_| r#"{"event":"SERIALIZATION_ERROR"}"#.to_string())
    }
}
