pub mod position;
pub mod tick;

pub use position::{LevelKind, Lots, Position, RiskLevel, RiskLevelSet, Side};
pub use tick::{bucket_of, Bar, Tick, BAR_SECONDS};
