//! Data models for positions and closed trades.

mod position;
mod trade;

pub use position::{Position, Side};
pub use trade::{ClosedTrade, ExitReason};
