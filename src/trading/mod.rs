//! Trading logic: regime, targets, sizing, ledger and the position engine.

mod config;
mod engine;
mod ledger;
mod position_sizer;
mod regime;
mod strategy;
mod targets;

pub use config::{DrawdownBasis, EngineConfig, EntryMode, HighWaterPolicy};
pub use engine::PositionEngine;
pub use ledger::EquityLedger;
pub use position_sizer::RiskSizer;
pub use regime::VolatilityRegime;
pub use strategy::Strategy;
pub use targets::TargetPlanner;
