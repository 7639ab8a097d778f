//! Fixed-risk position sizing.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use super::EngineConfig;

/// Sizes positions so that hitting the stop loses a fixed share of equity.
#[derive(Debug, Clone)]
pub struct RiskSizer {
    risk_per_trade_pct: Decimal,
    min_size: Decimal,
}

impl RiskSizer {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            risk_per_trade_pct: config.risk_per_trade_pct,
            min_size: config.min_size,
        }
    }

    /// Position size in base units.
    ///
    /// # Arguments
    /// * `equity` - Current ledger equity
    /// * `entry` - Planned entry price
    /// * `stop` - Planned stop-loss price
    /// * `cap` - Largest size allowed
    ///
    /// Degenerate prices (non-positive, or entry equal to stop) fall back to the minimum size.
    pub fn size(&self, equity: Decimal, entry: Decimal, stop: Decimal, cap: Decimal) -> Decimal {
        if entry <= Decimal::ZERO || stop <= Decimal::ZERO || entry == stop {
            return self.min_size;
        }

        let risk_budget = equity * self.risk_per_trade_pct / dec!(100);
        let risk_per_unit = (entry - stop).abs();
        let raw = risk_budget / risk_per_unit;

        raw.min(cap).max(self.min_size)
    }
}
