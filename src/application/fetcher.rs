//! Raw data acquisition for one pipeline run.
//!
//! Bars are fetched sequentially per instrument; fundamentals fan out with a
//! bounded concurrency limit. Per-instrument failures degrade (an instrument
//! without bars is skipped, one without fundamentals scores anyway); only a
//! fetch that yields no bars at all is fatal.

use crate::domain::errors::PipelineError;
use crate::domain::ports::MarketDataProvider;
use crate::domain::types::{Bar, FundamentalsFetch};
use anyhow::Result;
use futures::StreamExt;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

/// Cleaned per-run input: bars per instrument in universe order (the stable
/// order that later breaks score ties), plus per-instrument fundamentals.
#[derive(Debug)]
pub struct FetchedData {
    pub bars_by_symbol: Vec<(String, Vec<Bar>)>,
    pub fundamentals: HashMap<String, FundamentalsFetch>,
}

pub struct RawDataFetcher<'a> {
    provider: &'a dyn MarketDataProvider,
    lookback_days: u32,
    fundamentals_concurrency: usize,
}

impl<'a> RawDataFetcher<'a> {
    pub fn new(
        provider: &'a dyn MarketDataProvider,
        lookback_days: u32,
        fundamentals_concurrency: usize,
    ) -> Self {
        Self {
            provider,
            lookback_days,
            fundamentals_concurrency: fundamentals_concurrency.max(1),
        }
    }

    pub async fn fetch(&self, universe: &[String]) -> Result<FetchedData> {
        let mut bars_by_symbol = Vec::with_capacity(universe.len());

        for symbol in universe {
            match self.provider.fetch_bars(symbol, self.lookback_days).await {
                Ok(raw) => {
                    let bars = clean_bars(symbol, raw);
                    if bars.is_empty() {
                        warn!(%symbol, "No usable bars; instrument excluded from this run");
                    } else {
                        debug!(%symbol, count = bars.len(), "Fetched bars");
                        bars_by_symbol.push((symbol.clone(), bars));
                    }
                }
                Err(e) => {
                    warn!(%symbol, error = %e, "Bar fetch failed; instrument excluded from this run");
                }
            }
        }

        if bars_by_symbol.is_empty() {
            return Err(PipelineError::NoUsableBars.into());
        }

        let fundamentals = self
            .fetch_fundamentals(bars_by_symbol.iter().map(|(s, _)| s.clone()).collect())
            .await;

        let missing = fundamentals
            .values()
            .filter(|f| matches!(f, FundamentalsFetch::Missing))
            .count();
        info!(
            instruments = bars_by_symbol.len(),
            fundamentals_missing = missing,
            "Fetch complete"
        );

        Ok(FetchedData {
            bars_by_symbol,
            fundamentals,
        })
    }

    async fn fetch_fundamentals(
        &self,
        symbols: Vec<String>,
    ) -> HashMap<String, FundamentalsFetch> {
        futures::stream::iter(symbols)
            .map(|symbol| async move {
                let outcome = match self.provider.fetch_fundamentals(&symbol).await {
                    Ok(f) => FundamentalsFetch::Available(f),
                    Err(e) => {
                        warn!(%symbol, error = %e, "Fundamentals fetch failed; degrading to missing");
                        FundamentalsFetch::Missing
                    }
                };
                (symbol, outcome)
            })
            .buffer_unordered(self.fundamentals_concurrency)
            .collect()
            .await
    }
}

/// Drop rows missing any of O/H/L/C, deduplicate by date (first occurrence
/// wins) and sort ascending by date.
fn clean_bars(symbol: &str, raw: Vec<crate::domain::types::RawBar>) -> Vec<Bar> {
    let total = raw.len();
    let mut seen: HashSet<chrono::NaiveDate> = HashSet::new();
    let mut bars: Vec<Bar> = raw
        .into_iter()
        .filter_map(|r| r.into_bar())
        .filter(|b| seen.insert(b.date))
        .collect();
    bars.sort_by_key(|b| b.date);

    let dropped = total - bars.len();
    if dropped > 0 {
        debug!(%symbol, dropped, "Dropped incomplete or duplicate bars");
    }
    bars
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{Fundamentals, RawBar};
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    struct ScriptedProvider {
        bars: HashMap<String, Vec<RawBar>>,
        failing_fundamentals: HashSet<String>,
    }

    #[async_trait]
    impl MarketDataProvider for ScriptedProvider {
        async fn fetch_bars(&self, symbol: &str, _lookback_days: u32) -> Result<Vec<RawBar>> {
            self.bars
                .get(symbol)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("no data for {}", symbol))
        }

        async fn fetch_fundamentals(&self, symbol: &str) -> Result<Fundamentals> {
            if self.failing_fundamentals.contains(symbol) {
                anyhow::bail!("fundamentals endpoint unavailable");
            }
            Ok(Fundamentals {
                market_cap: Some(1e9),
                pe_ratio: Some(20.0),
                eps: Some(5.0),
            })
        }
    }

    fn raw_bar(symbol: &str, day: u32, close: Option<i64>) -> RawBar {
        RawBar {
            symbol: symbol.to_string(),
            date: NaiveDate::from_ymd_opt(2024, 3, day).unwrap(),
            open: Some(Decimal::from(10)),
            high: Some(Decimal::from(12)),
            low: Some(Decimal::from(9)),
            close: close.map(Decimal::from),
            volume: Some(Decimal::from(1000)),
        }
    }

    #[tokio::test]
    async fn test_dedupe_and_drop_incomplete() {
        let provider = ScriptedProvider {
            bars: HashMap::from([(
                "AAPL".to_string(),
                vec![
                    raw_bar("AAPL", 5, Some(11)),
                    raw_bar("AAPL", 4, Some(10)),
                    raw_bar("AAPL", 5, Some(99)), // duplicate date, dropped
                    raw_bar("AAPL", 6, None),     // missing close, dropped
                ],
            )]),
            failing_fundamentals: HashSet::new(),
        };

        let fetcher = RawDataFetcher::new(&provider, 30, 4);
        let data = fetcher.fetch(&["AAPL".to_string()]).await.unwrap();

        let (_, bars) = &data.bars_by_symbol[0];
        assert_eq!(bars.len(), 2);
        assert!(bars[0].date < bars[1].date);
        // First occurrence of the duplicated date wins.
        assert_eq!(bars[1].close, Decimal::from(11));
    }

    #[tokio::test]
    async fn test_partial_fundamentals_failure_degrades() {
        let provider = ScriptedProvider {
            bars: HashMap::from([
                ("AAPL".to_string(), vec![raw_bar("AAPL", 4, Some(10))]),
                ("MSFT".to_string(), vec![raw_bar("MSFT", 4, Some(20))]),
            ]),
            failing_fundamentals: HashSet::from(["MSFT".to_string()]),
        };

        let fetcher = RawDataFetcher::new(&provider, 30, 4);
        let data = fetcher
            .fetch(&["AAPL".to_string(), "MSFT".to_string()])
            .await
            .unwrap();

        assert_eq!(data.bars_by_symbol.len(), 2);
        assert!(matches!(
            data.fundamentals["AAPL"],
            FundamentalsFetch::Available(_)
        ));
        assert_eq!(data.fundamentals["MSFT"], FundamentalsFetch::Missing);
    }

    #[tokio::test]
    async fn test_failed_instrument_does_not_abort_batch() {
        let provider = ScriptedProvider {
            bars: HashMap::from([("AAPL".to_string(), vec![raw_bar("AAPL", 4, Some(10))])]),
            failing_fundamentals: HashSet::new(),
        };

        let fetcher = RawDataFetcher::new(&provider, 30, 4);
        let data = fetcher
            .fetch(&["GONE".to_string(), "AAPL".to_string()])
            .await
            .unwrap();
        assert_eq!(data.bars_by_symbol.len(), 1);
        assert_eq!(data.bars_by_symbol[0].0, "AAPL");
    }

    #[tokio::test]
    async fn test_total_failure_is_fatal() {
        let provider = ScriptedProvider {
            bars: HashMap::new(),
            failing_fundamentals: HashSet::new(),
        };

        let fetcher = RawDataFetcher::new(&provider, 30, 4);
        let err = fetcher.fetch(&["A".to_string(), "B".to_string()]).await;
        assert!(err.is_err());
        assert!(
            err.unwrap_err()
                .downcast_ref::<PipelineError>()
                .is_some_and(|e| matches!(e, PipelineError::NoUsableBars))
        );
    }
}
