//! Open position held by the engine.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::api::OrderSide;

/// Direction of an open position. Flat is represented by the absence of a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Long,
    Short,
}

impl Side {
    /// +1 for long, -1 for short.
    pub fn sign(&self) -> Decimal {
        match self {
            Side::Long => Decimal::ONE,
            Side::Short => Decimal::NEGATIVE_ONE,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Side::Long => "LONG",
            Side::Short => "SHORT",
        }
    }

    /// Order side that opens a position in this direction.
    pub fn entry_order_side(&self) -> OrderSide {
        match self {
            Side::Long => OrderSide::Buy,
            Side::Short => OrderSide::Sell,
        }
    }

    /// Order side that reduces a position in this direction.
    pub fn exit_order_side(&self) -> OrderSide {
        match self {
            Side::Long => OrderSide::Sell,
            Side::Short => OrderSide::Buy,
        }
    }
}

impl std::str::FromStr for Side {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "long" | "buy" => Ok(Side::Long),
            "short" | "sell" => Ok(Side::Short),
            other => Err(format!("unknown side '{other}' (expected long or short)")),
        }
    }
}

/// State of an open position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub side: Side,

    /// Size at entry (base units)
    pub size: Decimal,

    /// Size still open after any partial exit
    pub remaining_size: Decimal,

    /// Observed mid at entry
    pub entry: Decimal,

    /// Current stop; only ever tightens
    pub stop_loss: Decimal,

    /// First target, where the partial exit happens
    pub tp1: Decimal,

    /// Final target
    pub tp2: Decimal,

    /// Trailing steps already applied
    pub trail_steps: u32,

    /// Whether the one-shot partial exit has been taken
    pub partial_done: bool,

    /// Share of the entry leg filled as taker (drives the fee blend on exit)
    pub entry_taker_ratio: Decimal,

    pub opened_at: DateTime<Utc>,
}

impl Position {
    /// Unlevered value of `size` units at the entry price.
    pub fn notional(&self, size: Decimal) -> Decimal {
        self.entry * size
    }

    /// Whether `price` is at or beyond `target` in this position's favorable direction.
    pub fn reached(&self, price: Decimal, target: Decimal) -> bool {
        match self.side {
            Side::Long => price >= target,
            Side::Short => price <= target,
        }
    }

    /// Whether `price` has hit the stop.
    pub fn stopped(&self, price: Decimal) -> bool {
        match self.side {
            Side::Long => price <= self.stop_loss,
            Side::Short => price >= self.stop_loss,
        }
    }
}
