//! Venue access: price feed, order gateway and their adapters.

mod info_client;
mod paper;
mod types;

use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;

pub use info_client::InfoClient;
pub use paper::PaperGateway;
pub use types::*;

/// Source of the current mid price for the configured symbol.
#[async_trait]
pub trait PriceFeed: Send {
    /// Fetch the latest mid. Missing or non-numeric prices are errors.
    async fn mid(&mut self) -> Result<Decimal>;
}

/// Order submission and reconciliation.
///
/// Submissions never fail with an error: every failure mode is folded into
/// an [`OrderOutcome`] so callers can gate state changes on acceptance.
#[async_trait]
pub trait OrderGateway: Send {
    /// Submit a limit order.
    async fn submit(&mut self, order: &OrderRequest) -> OrderOutcome;

    /// Query a previously submitted order by its correlation id.
    async fn status(&mut self, correlation_id: &str) -> OrderOutcome;
}
