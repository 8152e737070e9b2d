//! # risk
//!
//! Stop-loss / take-profit allocation for simulated positions: the mutation
//! engine, slider mapping, pre-placement drafts and drag resolution.

pub mod drag;
pub mod manager;
pub mod preview;
pub mod slider;

pub use drag::{DragFrame, DragRelease, DragResolver, DragTarget};
pub use manager::{LevelChange, PositionRiskManager};
pub use preview::{DraftPosition, PreviewConfig};
