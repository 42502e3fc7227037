//! Market-data collaborator client.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;

use crate::domain::MarketSnapshot;
use crate::error::{CatalystError, Result};

/// Quote provider the scanner validates candidates against.
#[async_trait]
pub trait MarketData: Send + Sync {
    async fn snapshot(&self, symbol: &str) -> Result<MarketSnapshot>;
}

#[derive(Debug, Deserialize)]
struct SnapshotPayload {
    price: Decimal,
    volume: i64,
    relative_volume: f64,
    price_change_pct: f64,
    #[serde(default)]
    premarket_volume: Option<i64>,
    #[serde(default)]
    premarket_change_pct: Option<f64>,
}

/// HTTP implementation against the configured quote endpoint.
pub struct HttpMarketData {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpMarketData {
    pub fn new(http: reqwest::Client, base_url: String, timeout: Duration) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        }
    }
}

#[async_trait]
impl MarketData for HttpMarketData {
    async fn snapshot(&self, symbol: &str) -> Result<MarketSnapshot> {
        let url = format!("{}/snapshot", self.base_url);
        let response = self
            .http
            .get(&url)
            .query(&[("symbol", symbol)])
            .timeout(self.timeout)
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(CatalystError::NotFound(format!("quote for {symbol}")));
        }
        let payload: SnapshotPayload = response.error_for_status()?.json().await?;

        Ok(MarketSnapshot {
            symbol: symbol.to_string(),
            price: payload.price,
            volume: payload.volume,
            relative_volume: payload.relative_volume,
            price_change_pct: payload.price_change_pct,
            premarket_volume: payload.premarket_volume,
            premarket_change_pct: payload.premarket_change_pct,
        })
    }
}
