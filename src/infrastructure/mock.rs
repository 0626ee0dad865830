//! Deterministic synthetic market data for tests and `Mode::Mock`.
//!
//! Each symbol gets its own seeded random walk, derived from the provider
//! seed and the symbol name, so results are identical across runs and
//! independent of fetch order.

use crate::domain::ports::MarketDataProvider;
use crate::domain::types::{Fundamentals, RawBar};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{Datelike, Duration, NaiveDate, Weekday};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use std::collections::HashSet;
use std::hash::{DefaultHasher, Hash, Hasher};

pub struct MockMarketDataProvider {
    seed: u64,
    /// Last bar date of every generated series; fixed so the as-of date is
    /// reproducible.
    end_date: NaiveDate,
    failing_bars: HashSet<String>,
    failing_fundamentals: HashSet<String>,
}

impl MockMarketDataProvider {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            end_date: NaiveDate::from_ymd_opt(2024, 6, 28).expect("valid date"),
            failing_bars: HashSet::new(),
            failing_fundamentals: HashSet::new(),
        }
    }

    pub fn with_end_date(mut self, end_date: NaiveDate) -> Self {
        self.end_date = end_date;
        self
    }

    pub fn failing_bars_for(mut self, symbols: &[&str]) -> Self {
        self.failing_bars = symbols.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn failing_fundamentals_for(mut self, symbols: &[&str]) -> Self {
        self.failing_fundamentals = symbols.iter().map(|s| s.to_string()).collect();
        self
    }

    fn rng_for(&self, symbol: &str) -> StdRng {
        let mut hasher = DefaultHasher::new();
        self.seed.hash(&mut hasher);
        symbol.hash(&mut hasher);
        StdRng::seed_from_u64(hasher.finish())
    }
}

#[async_trait]
impl MarketDataProvider for MockMarketDataProvider {
    async fn fetch_bars(&self, symbol: &str, lookback_days: u32) -> Result<Vec<RawBar>> {
        if self.failing_bars.contains(symbol) {
            anyhow::bail!("mock: bar feed down for {}", symbol);
        }

        let mut rng = self.rng_for(symbol);
        let mut close: f64 = rng.random_range(20.0..400.0);
        let drift = rng.random_range(-0.001..0.002);

        let start = self.end_date - Duration::days(lookback_days as i64);
        let mut bars = Vec::new();
        let mut date = start;
        while date <= self.end_date {
            // Trading days only.
            if !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
                close *= 1.0 + drift + rng.random_range(-0.02..0.02);
                let open = close * (1.0 + rng.random_range(-0.01..0.01));
                let high = close.max(open) * (1.0 + rng.random_range(0.0..0.01));
                let low = close.min(open) * (1.0 - rng.random_range(0.0..0.01));
                let volume = rng.random_range(100_000.0..5_000_000.0_f64).round();

                bars.push(RawBar {
                    symbol: symbol.to_string(),
                    date,
                    open: Decimal::from_f64(open),
                    high: Decimal::from_f64(high),
                    low: Decimal::from_f64(low),
                    close: Decimal::from_f64(close),
                    volume: Decimal::from_f64(volume),
                });
            }
            date += Duration::days(1);
        }
        Ok(bars)
    }

    async fn fetch_fundamentals(&self, symbol: &str) -> Result<Fundamentals> {
        if self.failing_fundamentals.contains(symbol) {
            anyhow::bail!("mock: fundamentals endpoint down for {}", symbol);
        }
        let mut rng = self.rng_for(symbol);
        Ok(Fundamentals {
            market_cap: Some(rng.random_range(1e9..3e12)),
            pe_ratio: Some(rng.random_range(5.0..60.0)),
            eps: Some(rng.random_range(0.5..25.0)),
        })
    }
}
