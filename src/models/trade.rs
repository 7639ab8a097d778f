//! Record of a realized (partial or full) close.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::Side;

/// Why a position leg was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    /// One-shot partial close at TP1
    Partial,
    TakeProfit,
    StopLoss,
}

impl ExitReason {
    pub fn label(&self) -> &'static str {
        match self {
            ExitReason::Partial => "PARTIAL",
            ExitReason::TakeProfit => "TP",
            ExitReason::StopLoss => "SL",
        }
    }
}

/// A booked close.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClosedTrade {
    pub side: Side,
    pub reason: ExitReason,
    pub entry: Decimal,
    pub exit: Decimal,
    pub size: Decimal,

    /// Leveraged return on margin, percent
    pub roe_pct: Decimal,

    /// Price move net of fees, percent
    pub net_pct: Decimal,

    /// Realized P&L in quote currency
    pub pnl: Decimal,

    pub closed_at: DateTime<Utc>,
}

impl ClosedTrade {
    pub fn is_win(&self) -> bool {
        self.pnl > Decimal::ZERO
    }
}
