pub mod candle_builder;
pub mod history;
pub mod random;
pub mod regime;
