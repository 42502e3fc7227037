//! Clients for the downstream collaborator services: pattern analysis,
//! technical signal generation, and paper-trade execution.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::config::CoordinatorConfig;
use crate::domain::TradingCandidate;
use crate::error::Result;
use crate::util::{retry_transient, with_deadline};

/// Pattern findings for one candidate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternReport {
    pub symbol: String,
    #[serde(default)]
    pub patterns: Vec<String>,
    #[serde(default)]
    pub confidence: f64,
}

/// A directional trading signal above the confidence floor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeSignal {
    pub symbol: String,
    pub action: String,
    pub confidence: f64,
    #[serde(default)]
    pub entry_price: Option<Decimal>,
    #[serde(default)]
    pub stop_loss: Option<Decimal>,
    #[serde(default)]
    pub take_profit: Option<Decimal>,
    #[serde(default)]
    pub catalyst_score: f64,
}

/// Acknowledgement from the paper-trading service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeExecution {
    pub trade_id: String,
    pub symbol: String,
    #[serde(default)]
    pub pnl: Option<Decimal>,
}

/// The collaborator surface the cycle stages call. Implemented over HTTP in
/// production and stubbed in tests.
#[async_trait]
pub trait Collaborators: Send + Sync {
    async fn analyze_pattern(&self, candidate: &TradingCandidate) -> Result<PatternReport>;

    async fn generate_signal(
        &self,
        candidate: &TradingCandidate,
        patterns: &PatternReport,
    ) -> Result<Option<TradeSignal>>;

    async fn execute_trade(&self, signal: &TradeSignal) -> Result<TradeExecution>;
}

#[derive(Debug, Deserialize)]
struct SignalPayload {
    signal: String,
    #[serde(default)]
    confidence: f64,
    #[serde(default)]
    entry_price: Option<Decimal>,
    #[serde(default)]
    stop_loss: Option<Decimal>,
    #[serde(default)]
    take_profit: Option<Decimal>,
}

pub struct HttpCollaborators {
    http: reqwest::Client,
    config: CoordinatorConfig,
}

impl HttpCollaborators {
    pub fn new(http: reqwest::Client, config: CoordinatorConfig) -> Self {
        Self { http, config }
    }

    async fn post_json<Req: Serialize, Resp: for<'de> Deserialize<'de>>(
        &self,
        label: &str,
        url: String,
        timeout: Duration,
        body: &Req,
    ) -> Result<Resp> {
        retry_transient(label, self.config.retry_attempts, self.config.retry_base_ms, || {
            let url = url.clone();
            async move {
                with_deadline(label, timeout, async {
                    let resp = self
                        .http
                        .post(&url)
                        .json(body)
                        .send()
                        .await?
                        .error_for_status()?;
                    Ok(resp.json::<Resp>().await?)
                })
                .await
            }
        })
        .await
    }
}

#[async_trait]
impl Collaborators for HttpCollaborators {
    async fn analyze_pattern(&self, candidate: &TradingCandidate) -> Result<PatternReport> {
        let body = serde_json::json!({
            "symbol": candidate.symbol,
            "timeframe": "5min",
            "context": {
                "has_catalyst": candidate.catalyst_score > 0.0,
                "catalyst_type": candidate
                    .primary_catalyst
                    .map(|c| c.as_str())
                    .unwrap_or("generic"),
                "market_state": if candidate.has_premarket_news { "pre-market" } else { "regular" },
            },
        });
        let mut report: PatternReport = self
            .post_json(
                "pattern analysis",
                format!("{}/analyze_pattern", self.config.pattern.url),
                Duration::from_secs(self.config.pattern.timeout_secs),
                &body,
            )
            .await?;
        report.symbol = candidate.symbol.clone();
        debug!(symbol = %report.symbol, patterns = report.patterns.len(), "pattern analysis done");
        Ok(report)
    }

    async fn generate_signal(
        &self,
        candidate: &TradingCandidate,
        patterns: &PatternReport,
    ) -> Result<Option<TradeSignal>> {
        let body = serde_json::json!({
            "symbol": candidate.symbol,
            "patterns": patterns.patterns,
            "catalyst_data": {
                "score": candidate.catalyst_score,
                "type": candidate
                    .primary_catalyst
                    .map(|c| c.as_str())
                    .unwrap_or("generic"),
            },
        });
        let payload: SignalPayload = self
            .post_json(
                "signal generation",
                format!("{}/generate_signal", self.config.technical.url),
                Duration::from_secs(self.config.technical.timeout_secs),
                &body,
            )
            .await?;

        let action = payload.signal.to_uppercase();
        if action != "BUY" && action != "SELL" {
            return Ok(None);
        }
        Ok(Some(TradeSignal {
            symbol: candidate.symbol.clone(),
            action,
            confidence: payload.confidence,
            entry_price: payload.entry_price,
            stop_loss: payload.stop_loss,
            take_profit: payload.take_profit,
            catalyst_score: candidate.catalyst_score,
        }))
    }

    async fn execute_trade(&self, signal: &TradeSignal) -> Result<TradeExecution> {
        self.post_json(
            "trade execution",
            format!("{}/execute_trade", self.config.trading.url),
            Duration::from_secs(self.config.trading.timeout_secs),
            signal,
        )
        .await
    }
}
