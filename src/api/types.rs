//! Order and market-data types exchanged with the venue.

use std::fmt;
use std::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Significant figures the venue accepts in a limit price.
const MAX_PRICE_SIG_FIGS: u32 = 6;

/// Order side on the venue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

/// Time-in-force of a limit order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeInForce {
    /// Good-til-cancelled
    Gtc,
    /// Immediate-or-cancel
    Ioc,
    /// Add-liquidity-only (post only)
    Alo,
}

impl FromStr for TimeInForce {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gtc" => Ok(Self::Gtc),
            "ioc" => Ok(Self::Ioc),
            "alo" => Ok(Self::Alo),
            other => Err(format!("unknown time-in-force '{other}'")),
        }
    }
}

impl fmt::Display for TimeInForce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gtc => write!(f, "Gtc"),
            Self::Ioc => write!(f, "Ioc"),
            Self::Alo => write!(f, "Alo"),
        }
    }
}

/// A limit order ready to hand to an order gateway.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRequest {
    pub side: OrderSide,
    pub price: Decimal,
    pub size: Decimal,
    pub tif: TimeInForce,
    pub reduce_only: bool,
    /// Client order id (0x + 32 hex chars), used to query the order later
    pub correlation_id: String,
}

impl OrderRequest {
    pub fn new(side: OrderSide, price: Decimal, size: Decimal, tif: TimeInForce, reduce_only: bool) -> Self {
        Self {
            side,
            price,
            size,
            tif,
            reduce_only,
            correlation_id: Self::generate_correlation_id(),
        }
    }

    /// Generate a random 16-byte client order id.
    pub fn generate_correlation_id() -> String {
        format!("0x{}", uuid::Uuid::new_v4().simple())
    }
}

/// What the venue said about a submitted order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderOutcome {
    /// Venue acknowledged the order
    Accepted { order_id: Option<String> },
    /// Venue refused the order; nothing rests on the book
    Rejected { reason: String },
    /// The request may or may not have reached the venue (timeouts, dropped connections)
    Unknown { reason: String },
}

impl OrderOutcome {
    #[cfg(test)]
    pub fn is_accepted(&self) -> bool {
        matches!(self, OrderOutcome::Accepted { .. })
    }
}

impl fmt::Display for OrderOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Accepted { order_id: Some(id) } => write!(f, "accepted ({id})"),
            Self::Accepted { order_id: None } => write!(f, "accepted"),
            Self::Rejected { reason } => write!(f, "rejected: {reason}"),
            Self::Unknown { reason } => write!(f, "unknown: {reason}"),
        }
    }
}

/// Tradable asset metadata resolved from the venue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetMeta {
    pub name: String,
    pub index: usize,
    pub px_decimals: u32,
    pub sz_decimals: u32,
}

impl AssetMeta {
    /// Round a size down to the venue lot precision.
    pub fn format_size(&self, size: Decimal) -> Decimal {
        size.round_dp_with_strategy(self.sz_decimals, RoundingStrategy::ToZero)
            .normalize()
    }

    /// Round a price down to the venue tick precision.
    ///
    /// Prices with more than six significant figures are truncated to an integer.
    pub fn format_price(&self, price: Decimal) -> Decimal {
        let scale = self.px_decimals.min(MAX_PRICE_SIG_FIGS);
        let rounded = price
            .round_dp_with_strategy(scale, RoundingStrategy::ToZero)
            .normalize();
        if significant_figures(rounded) > MAX_PRICE_SIG_FIGS {
            price.trunc().normalize()
        } else {
            rounded
        }
    }
}

fn significant_figures(value: Decimal) -> u32 {
    let mantissa = value.normalize().mantissa().unsigned_abs();
    if mantissa == 0 {
        return 0;
    }
    mantissa.to_string().len() as u32
}

/// Perpetuals universe entry from the `meta` info request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UniverseEntry {
    pub name: String,
    #[serde(default)]
    pub sz_decimals: u32,
    #[serde(default)]
    pub px_decimals: Option<u32>,
}

/// Response body of the `meta` info request.
#[derive(Debug, Clone, Deserialize)]
pub struct MetaResponse {
    #[serde(default)]
    pub universe: Vec<UniverseEntry>,
}
