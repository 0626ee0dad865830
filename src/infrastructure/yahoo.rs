//! Yahoo Finance market-data provider.
//!
//! Daily bars come from the chart endpoint, fundamentals from the
//! quote-summary endpoint. Both are fetched per symbol; the fetcher layer
//! decides how per-symbol failures degrade.

use crate::domain::ports::MarketDataProvider;
use crate::domain::types::{Fundamentals, RawBar};
use crate::infrastructure::http::create_client;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::DateTime;
use reqwest_middleware::ClientWithMiddleware;
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use serde::Deserialize;
use tracing::trace;

pub struct YahooDataProvider {
    client: ClientWithMiddleware,
    base_url: String,
}

impl YahooDataProvider {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: create_client(),
            base_url: base_url.into(),
        }
    }
}

// ===== Chart endpoint =====

#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    chart: ChartBody,
}

#[derive(Debug, Deserialize)]
struct ChartBody {
    result: Option<Vec<ChartResult>>,
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: ChartIndicators,
}

#[derive(Debug, Deserialize)]
struct ChartIndicators {
    quote: Vec<QuoteBlock>,
}

/// Price arrays are index-aligned with `timestamp`; individual entries may
/// be null on halted or partial days.
#[derive(Debug, Deserialize)]
struct QuoteBlock {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

// ===== Quote-summary endpoint =====

#[derive(Debug, Deserialize)]
struct SummaryEnvelope {
    #[serde(rename = "quoteSummary")]
    quote_summary: SummaryBody,
}

#[derive(Debug, Deserialize)]
struct SummaryBody {
    result: Option<Vec<SummaryResult>>,
}

#[derive(Debug, Deserialize)]
struct SummaryResult {
    #[serde(rename = "summaryDetail")]
    summary_detail: Option<SummaryDetail>,
    #[serde(rename = "defaultKeyStatistics")]
    key_statistics: Option<KeyStatistics>,
}

#[derive(Debug, Deserialize)]
struct SummaryDetail {
    #[serde(rename = "trailingPE")]
    trailing_pe: Option<WrappedValue>,
    #[serde(rename = "marketCap")]
    market_cap: Option<WrappedValue>,
}

#[derive(Debug, Deserialize)]
struct KeyStatistics {
    #[serde(rename = "trailingEps")]
    trailing_eps: Option<WrappedValue>,
}

#[derive(Debug, Deserialize)]
struct WrappedValue {
    raw: Option<f64>,
}

fn opt_decimal(v: Option<f64>) -> Option<Decimal> {
    v.and_then(Decimal::from_f64)
}

#[async_trait]
impl MarketDataProvider for YahooDataProvider {
    async fn fetch_bars(&self, symbol: &str, lookback_days: u32) -> Result<Vec<RawBar>> {
        let url = format!(
            "{}/v8/finance/chart/{}?range={}d&interval=1d",
            self.base_url, symbol, lookback_days
        );
        trace!(%symbol, %url, "Fetching daily bars");

        let envelope: ChartEnvelope = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("chart request for {} failed", symbol))?
            .error_for_status()
            .with_context(|| format!("chart request for {} rejected", symbol))?
            .json()
            .await
            .with_context(|| format!("chart response for {} unparsable", symbol))?;

        if let Some(err) = envelope.chart.error {
            anyhow::bail!("chart API error for {}: {}", symbol, err);
        }
        let result = envelope
            .chart
            .result
            .and_then(|mut r| if r.is_empty() { None } else { Some(r.remove(0)) })
            .with_context(|| format!("chart response for {} has no result", symbol))?;
        let quote = result
            .indicators
            .quote
            .into_iter()
            .next()
            .with_context(|| format!("chart response for {} has no quote block", symbol))?;

        let bars = result
            .timestamp
            .iter()
            .enumerate()
            .filter_map(|(i, &ts)| {
                let date = DateTime::from_timestamp(ts, 0)?.date_naive();
                Some(RawBar {
                    symbol: symbol.to_string(),
                    date,
                    open: opt_decimal(quote.open.get(i).copied().flatten()),
                    high: opt_decimal(quote.high.get(i).copied().flatten()),
                    low: opt_decimal(quote.low.get(i).copied().flatten()),
                    close: opt_decimal(quote.close.get(i).copied().flatten()),
                    volume: opt_decimal(quote.volume.get(i).copied().flatten()),
                })
            })
            .collect();
        Ok(bars)
    }

    async fn fetch_fundamentals(&self, symbol: &str) -> Result<Fundamentals> {
        let url = format!(
            "{}/v10/finance/quoteSummary/{}?modules=summaryDetail,defaultKeyStatistics",
            self.base_url, symbol
        );
        trace!(%symbol, %url, "Fetching fundamentals");

        let envelope: SummaryEnvelope = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("quote-summary request for {} failed", symbol))?
            .error_for_status()
            .with_context(|| format!("quote-summary request for {} rejected", symbol))?
            .json()
            .await
            .with_context(|| format!("quote-summary response for {} unparsable", symbol))?;

        let result = envelope
            .quote_summary
            .result
            .and_then(|mut r| if r.is_empty() { None } else { Some(r.remove(0)) })
            .with_context(|| format!("quote-summary for {} has no result", symbol))?;

        let detail = result.summary_detail;
        Ok(Fundamentals {
            market_cap: detail
                .as_ref()
                .and_then(|d| d.market_cap.as_ref())
                .and_then(|v| v.raw),
            pe_ratio: detail
                .as_ref()
                .and_then(|d| d.trailing_pe.as_ref())
                .and_then(|v| v.raw),
            eps: result
                .key_statistics
                .as_ref()
                .and_then(|k| k.trailing_eps.as_ref())
                .and_then(|v| v.raw),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chart_payload_parsing() {
        let payload = r#"{
            "chart": {
                "result": [{
                    "timestamp": [1717027200, 1717113600],
                    "indicators": {
                        "quote": [{
                            "open": [101.0, null],
                            "high": [103.5, 104.0],
                            "low": [100.0, 101.0],
                            "close": [102.5, 103.0],
                            "volume": [1500000, 1600000]
                        }]
                    }
                }],
                "error": null
            }
        }"#;
        let envelope: ChartEnvelope = serde_json::from_str(payload).unwrap();
        let result = &envelope.chart.result.unwrap()[0];
        assert_eq!(result.timestamp.len(), 2);
        // A null in a price array stays None and is dropped by the fetcher.
        assert!(result.indicators.quote[0].open[1].is_none());
    }

    #[test]
    fn test_quote_summary_payload_parsing() {
        let payload = r#"{
            "quoteSummary": {
                "result": [{
                    "summaryDetail": {
                        "trailingPE": {"raw": 31.2, "fmt": "31.20"},
                        "marketCap": {"raw": 2.9e12, "fmt": "2.9T"}
                    },
                    "defaultKeyStatistics": {
                        "trailingEps": {"raw": 6.42, "fmt": "6.42"}
                    }
                }],
                "error": null
            }
        }"#;
        let envelope: SummaryEnvelope = serde_json::from_str(payload).unwrap();
        let result = &envelope.quote_summary.result.unwrap()[0];
        assert_eq!(
            result.summary_detail.as_ref().unwrap().trailing_pe.as_ref().unwrap().raw,
            Some(31.2)
        );
        assert_eq!(
            result.key_statistics.as_ref().unwrap().trailing_eps.as_ref().unwrap().raw,
            Some(6.42)
        );
    }
}
