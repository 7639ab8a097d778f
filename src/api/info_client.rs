//! Hyperliquid-style info API client for mids and asset metadata.

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use backoff::ExponentialBackoff;
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use serde_json::json;
use tracing::{debug, warn};

use super::types::{AssetMeta, MetaResponse};
use super::PriceFeed;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
/// Total time spent retrying a single request.
const MAX_RETRY_ELAPSED: Duration = Duration::from_secs(5);
/// Price decimals assumed when the venue does not report them.
const DEFAULT_PX_DECIMALS: u32 = 1;

/// Client for the read-only info endpoint.
pub struct InfoClient {
    client: Client,
    base_url: String,
    asset: Option<AssetMeta>,
}

impl InfoClient {
    /// Create a client for the given API base URL (mainnet, testnet, local mock).
    pub fn with_base_url(base_url: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            asset: None,
        })
    }

    /// Look up the symbol in the perpetuals universe and remember it for mid queries.
    pub async fn resolve_asset(&mut self, symbol: &str) -> Result<AssetMeta> {
        let body = self.post_info(json!({ "type": "meta" })).await?;
        let meta: MetaResponse =
            serde_json::from_value(body).context("Failed to parse meta response")?;
        let asset = find_asset(&meta, symbol)?;

        debug!(
            symbol = %asset.name,
            index = asset.index,
            sz_decimals = asset.sz_decimals,
            px_decimals = asset.px_decimals,
            "Resolved asset"
        );

        self.asset = Some(asset.clone());
        Ok(asset)
    }

    async fn post_info(&self, payload: serde_json::Value) -> Result<serde_json::Value> {
        let url = format!("{}/info", self.base_url);
        let policy = ExponentialBackoff {
            max_elapsed_time: Some(MAX_RETRY_ELAPSED),
            ..ExponentialBackoff::default()
        };

        backoff::future::retry(policy, || async {
            let response = self
                .client
                .post(&url)
                .json(&payload)
                .send()
                .await
                .map_err(|e| backoff::Error::transient(anyhow!(e).context("Info request failed")))?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                let err = anyhow!("Info request failed: {} - {}", status, body);
                return if is_retryable(status) {
                    warn!(status = %status, "Info request will be retried");
                    Err(backoff::Error::transient(err))
                } else {
                    Err(backoff::Error::permanent(err))
                };
            }

            response
                .json::<serde_json::Value>()
                .await
                .map_err(|e| backoff::Error::permanent(anyhow!(e).context("Failed to parse info response")))
        })
        .await
    }
}

#[async_trait]
impl PriceFeed for InfoClient {
    async fn mid(&mut self) -> Result<Decimal> {
        let asset = self
            .asset
            .clone()
            .ok_or_else(|| anyhow!("Asset not resolved; call resolve_asset first"))?;

        let body = self.post_info(json!({ "type": "allMids" })).await?;
        let mids: HashMap<String, serde_json::Value> =
            serde_json::from_value(body).context("Failed to parse allMids response")?;

        parse_mid(&mids, &asset.name, asset.index)
    }
}

fn is_retryable(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

fn find_asset(meta: &MetaResponse, symbol: &str) -> Result<AssetMeta> {
    meta.universe
        .iter()
        .enumerate()
        .find(|(_, entry)| entry.name.eq_ignore_ascii_case(symbol))
        .map(|(index, entry)| AssetMeta {
            name: entry.name.clone(),
            index,
            px_decimals: entry.px_decimals.unwrap_or(DEFAULT_PX_DECIMALS),
            sz_decimals: entry.sz_decimals,
        })
        .ok_or_else(|| anyhow!("Symbol {} not found in venue universe", symbol))
}

/// Extract the mid for a symbol from an `allMids` map.
///
/// Mids are keyed by coin name, with `@index` as a fallback key.
pub(crate) fn parse_mid(
    mids: &HashMap<String, serde_json::Value>,
    symbol: &str,
    index: usize,
) -> Result<Decimal> {
    let raw = mids
        .get(symbol)
        .or_else(|| mids.get(&format!("@{index}")))
        .ok_or_else(|| anyhow!("No mid price for {}", symbol))?;

    let text = match raw {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Number(n) => n.to_string(),
        other => return Err(anyhow!("Mid price for {} is not numeric: {}", symbol, other)),
    };

    let mid = Decimal::from_str(&text)
        .with_context(|| format!("Mid price for {} is not numeric: {}", symbol, text))?;
    if mid <= Decimal::ZERO {
        return Err(anyhow!("Mid price for {} is not positive: {}", symbol, mid));
    }
    Ok(mid)
}
