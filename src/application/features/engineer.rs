//! Deterministic transform from cleaned bars to one [`FeatureRow`] per
//! instrument at the as-of date.
//!
//! The full per-instrument history exists only to make rolling computations
//! well-defined; after every column is materialized, only the latest-date
//! row per instrument survives. All columns look strictly backward — the
//! as-of date is the maximum date present in the fetched data, never the
//! wall clock.

use crate::application::features::indicators::technical_columns;
use crate::application::features::rolling::{
    self, EPSILON, forward_fill, lag, pct_change, rolling_beta, rolling_mean, rolling_std,
    zero_fill,
};
use crate::application::fetcher::FetchedData;
use crate::application::projector::TechnicalProjector;
use crate::domain::features::{FeatureRow, is_technical_column};
use crate::domain::ports::ArtifactStore;
use crate::domain::types::{Bar, FundamentalsFetch};
use anyhow::{Context, Result};
use chrono::{Datelike, NaiveDate};
use rust_decimal::prelude::ToPrimitive;
use std::collections::BTreeMap;
use tracing::info;

const LAGS: [usize; 3] = [1, 3, 5];
const MA_WINDOWS: [usize; 3] = [5, 10, 20];
const STD_WINDOW: usize = 10;
const BETA_WINDOW: usize = 30;
const MARKET_CAP_FALLBACK: f64 = 1e-6;
const EPS_FALLBACK: f64 = 0.0;

pub struct EngineeredFeatures {
    /// One row per instrument, in fetch order (the deterministic tie-break
    /// order downstream).
    pub rows: Vec<FeatureRow>,
    pub as_of: NaiveDate,
}

/// Full per-instrument feature table keyed by column name; every column has
/// one value per bar date.
struct InstrumentTable {
    symbol: String,
    dates: Vec<NaiveDate>,
    columns: Vec<(String, Vec<f64>)>,
}

pub struct FeatureEngineer<'a> {
    artifacts: &'a dyn ArtifactStore,
    injected: Option<&'a TechnicalProjector>,
}

impl<'a> FeatureEngineer<'a> {
    pub fn new(artifacts: &'a dyn ArtifactStore) -> Self {
        Self {
            artifacts,
            injected: None,
        }
    }

    /// Bypass the artifact-store lifecycle and use a specific projector.
    pub fn with_projector(mut self, projector: &'a TechnicalProjector) -> Self {
        self.injected = Some(projector);
        self
    }

    pub fn build(&self, data: &FetchedData) -> Result<EngineeredFeatures> {
        let as_of = data
            .bars_by_symbol
            .iter()
            .flat_map(|(_, bars)| bars.iter().map(|b| b.date))
            .max()
            .context("no bars to engineer features from")?;

        let market_return = market_return_by_date(&data.bars_by_symbol);

        let mut tables: Vec<InstrumentTable> = data
            .bars_by_symbol
            .iter()
            .map(|(symbol, bars)| {
                self.build_instrument_table(symbol, bars, &market_return, &data.fundamentals)
            })
            .collect();

        // Uniform missing-value policy over every computed column: forward
        // fill within the instrument's own history, then zero.
        for table in &mut tables {
            for (_, series) in &mut table.columns {
                forward_fill(series);
                zero_fill(series);
            }
        }

        let (tech_names, rows) = self.apply_projection(&tables)?;

        info!(
            %as_of,
            instruments = rows.len(),
            technical_columns = tech_names.len(),
            "Feature engineering complete"
        );

        Ok(EngineeredFeatures { rows, as_of })
    }

    fn build_instrument_table(
        &self,
        symbol: &str,
        bars: &[Bar],
        market_return: &BTreeMap<NaiveDate, f64>,
        fundamentals: &std::collections::HashMap<String, FundamentalsFetch>,
    ) -> InstrumentTable {
        let dates: Vec<NaiveDate> = bars.iter().map(|b| b.date).collect();
        let closes: Vec<f64> = bars
            .iter()
            .map(|b| b.close.to_f64().unwrap_or(0.0))
            .collect();
        let n = closes.len();

        let mut columns: Vec<(String, Vec<f64>)> = technical_columns(bars)
            .into_iter()
            .map(|(name, series)| (name.to_string(), series))
            .collect();

        for l in LAGS {
            columns.push((format!("close_lag_{}", l), lag(&closes, l)));
        }
        for w in MA_WINDOWS {
            columns.push((format!("sma_{}", w), rolling_mean(&closes, w)));
            columns.push((format!("ema_{}", w), rolling::ewm_mean(&closes, w)));
        }
        columns.push((
            format!("rolling_std_{}", STD_WINDOW),
            rolling_std(&closes, STD_WINDOW),
        ));

        // Cross-sectional market return aligned to this instrument's dates,
        // then the instrument's rolling beta against it.
        let market: Vec<f64> = dates
            .iter()
            .map(|d| market_return.get(d).copied().unwrap_or(0.0))
            .collect();
        columns.push((
            format!("beta_{}", BETA_WINDOW),
            rolling_beta(&closes, &market, BETA_WINDOW),
        ));
        columns.push(("market_return".to_string(), market));

        // Fundamentals are static per instrument: impute (mean of the
        // instrument's own non-missing values, then a fixed fallback) and
        // broadcast across all rows.
        let funds = fundamentals.get(symbol).and_then(|f| f.as_option());
        let eps = impute_static(funds.and_then(|f| f.eps), EPS_FALLBACK);
        let market_cap = impute_static(funds.and_then(|f| f.market_cap), MARKET_CAP_FALLBACK);
        let pe_ratio = funds.and_then(|f| f.pe_ratio).unwrap_or(0.0);
        columns.push(("eps".to_string(), vec![eps; n]));
        columns.push(("market_cap".to_string(), vec![market_cap; n]));
        columns.push(("pe_ratio".to_string(), vec![pe_ratio; n]));
        columns.push((
            "pe_to_eps".to_string(),
            vec![pe_ratio / (eps + EPSILON); n],
        ));

        // Calendar features from each row's own date.
        columns.push((
            "day_of_week".to_string(),
            dates
                .iter()
                .map(|d| d.weekday().num_days_from_monday() as f64)
                .collect(),
        ));
        columns.push((
            "month".to_string(),
            dates.iter().map(|d| d.month() as f64).collect(),
        ));
        columns.push((
            "quarter".to_string(),
            dates.iter().map(|d| ((d.month() - 1) / 3 + 1) as f64).collect(),
        ));

        InstrumentTable {
            symbol: symbol.to_string(),
            dates,
            columns,
        }
    }

    /// Standardize + project the technical columns through the persisted
    /// subspace and reduce each instrument to its latest-date row.
    fn apply_projection(
        &self,
        tables: &[InstrumentTable],
    ) -> Result<(Vec<String>, Vec<FeatureRow>)> {
        // Stable, sorted technical column order shared by fit and apply.
        let mut tech_names: Vec<String> = tables
            .first()
            .map(|t| {
                t.columns
                    .iter()
                    .map(|(name, _)| name.clone())
                    .filter(|name| is_technical_column(name))
                    .collect()
            })
            .unwrap_or_default();
        tech_names.sort();

        // Full historical technical matrix: the projector is fit on history,
        // not just the as-of rows.
        let mut fit_matrix: Vec<Vec<f64>> = Vec::new();
        for table in tables {
            for i in 0..table.dates.len() {
                fit_matrix.push(tech_row(table, &tech_names, i));
            }
        }

        let owned;
        let projector = match self.injected {
            Some(p) => p,
            None => {
                owned =
                    TechnicalProjector::load_or_fit(self.artifacts, tech_names.clone(), &fit_matrix)?;
                &owned
            }
        };

        let as_of_matrix: Vec<Vec<f64>> = tables
            .iter()
            .map(|t| tech_row(t, &tech_names, t.dates.len() - 1))
            .collect();
        let projected = projector.project(&tech_names, &as_of_matrix)?;

        let rows = tables
            .iter()
            .zip(projected)
            .map(|(table, components)| {
                let last = table.dates.len() - 1;
                let mut row = FeatureRow::new(table.symbol.clone(), table.dates[last]);
                for (name, series) in &table.columns {
                    row.set(name.clone(), series[last]);
                }
                for (i, value) in components.iter().enumerate() {
                    row.set(format!("pca_tech_{}", i + 1), *value);
                }
                row
            })
            .collect();

        Ok((tech_names, rows))
    }
}

/// Per date, the mean 1-day fractional close change across all instruments
/// present on that date. An instrument's first observation contributes
/// nothing; a date with no contributions is 0.
fn market_return_by_date(bars_by_symbol: &[(String, Vec<Bar>)]) -> BTreeMap<NaiveDate, f64> {
    let mut sums: BTreeMap<NaiveDate, (f64, usize)> = BTreeMap::new();
    for (_, bars) in bars_by_symbol {
        let closes: Vec<f64> = bars
            .iter()
            .map(|b| b.close.to_f64().unwrap_or(0.0))
            .collect();
        for (bar, change) in bars.iter().zip(pct_change(&closes)) {
            let entry = sums.entry(bar.date).or_insert((0.0, 0));
            if change.is_finite() {
                entry.0 += change;
                entry.1 += 1;
            }
        }
    }
    sums.into_iter()
        .map(|(date, (sum, count))| (date, if count > 0 { sum / count as f64 } else { 0.0 }))
        .collect()
}

/// Zeros count as missing; the per-instrument mean of a static value is the
/// value itself, so imputation collapses to value-or-fallback.
fn impute_static(value: Option<f64>, fallback: f64) -> f64 {
    match value {
        Some(v) if v != 0.0 && v.is_finite() => v,
        _ => fallback,
    }
}

fn tech_row(table: &InstrumentTable, tech_names: &[String], index: usize) -> Vec<f64> {
    tech_names
        .iter()
        .map(|name| {
            table
                .columns
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, series)| series[index])
                .unwrap_or(0.0)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::Fundamentals;
    use rust_decimal::Decimal;
    use rust_decimal::prelude::FromPrimitive;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemStore {
        files: Mutex<HashMap<String, Vec<u8>>>,
    }

    impl ArtifactStore for MemStore {
        fn exists(&self, name: &str) -> bool {
            self.files.lock().unwrap().contains_key(name)
        }
        fn load(&self, name: &str) -> Result<Vec<u8>> {
            self.files
                .lock()
                .unwrap()
                .get(name)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("missing {}", name))
        }
        fn store(&self, name: &str, bytes: &[u8]) -> Result<()> {
            self.files
                .lock()
                .unwrap()
                .insert(name.to_string(), bytes.to_vec());
            Ok(())
        }
    }

    fn bars(symbol: &str, closes: &[f64], start_day: i64) -> (String, Vec<Bar>) {
        let bars = closes
            .iter()
            .enumerate()
            .map(|(i, &c)| Bar {
                symbol: symbol.to_string(),
                date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
                    + chrono::Duration::days(start_day + i as i64),
                open: Decimal::from_f64(c).unwrap(),
                high: Decimal::from_f64(c * 1.02).unwrap(),
                low: Decimal::from_f64(c * 0.98).unwrap(),
                close: Decimal::from_f64(c).unwrap(),
                volume: Decimal::from(500),
            })
            .collect();
        (symbol.to_string(), bars)
    }

    fn fetched(bars_by_symbol: Vec<(String, Vec<Bar>)>) -> FetchedData {
        let fundamentals = bars_by_symbol
            .iter()
            .map(|(s, _)| {
                (
                    s.clone(),
                    FundamentalsFetch::Available(Fundamentals {
                        market_cap: Some(2e9),
                        pe_ratio: Some(25.0),
                        eps: Some(5.0),
                    }),
                )
            })
            .collect();
        FetchedData {
            bars_by_symbol,
            fundamentals,
        }
    }

    fn sample_closes(n: usize, base: f64) -> Vec<f64> {
        (0..n)
            .map(|i| base + (i as f64 * 0.7).sin() * 3.0 + i as f64 * 0.1)
            .collect()
    }

    #[test]
    fn test_as_of_is_max_date_not_wall_clock() {
        let store = MemStore::default();
        // Second instrument's history ends three days later.
        let data = fetched(vec![
            bars("AAA", &sample_closes(40, 50.0), 0),
            bars("BBB", &sample_closes(43, 80.0), 0),
        ]);
        let out = FeatureEngineer::new(&store).build(&data).unwrap();
        assert_eq!(
            out.as_of,
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + chrono::Duration::days(42)
        );
        // The stale instrument still produces a row, at its own last date.
        assert_eq!(out.rows.len(), 2);
    }

    #[test]
    fn test_expected_columns_present() {
        let store = MemStore::default();
        let data = fetched(vec![
            bars("AAA", &sample_closes(60, 50.0), 0),
            bars("BBB", &sample_closes(60, 80.0), 0),
        ]);
        let out = FeatureEngineer::new(&store).build(&data).unwrap();
        let row = &out.rows[0];

        for name in [
            "close_lag_1",
            "close_lag_3",
            "close_lag_5",
            "sma_5",
            "sma_10",
            "sma_20",
            "ema_5",
            "ema_10",
            "ema_20",
            "rolling_std_10",
            "market_return",
            "beta_30",
            "eps",
            "market_cap",
            "pe_ratio",
            "pe_to_eps",
            "day_of_week",
            "month",
            "quarter",
            "momentum_rsi_14",
            "trend_macd",
            "volatility_atr_14",
            "pca_tech_1",
            "pca_tech_5",
        ] {
            assert!(row.get(name).is_some(), "missing column {}", name);
            assert!(row.get(name).unwrap().is_finite(), "{} not finite", name);
        }
    }

    #[test]
    fn test_lag_and_sma_values_on_ramp() {
        let store = MemStore::default();
        let closes: Vec<f64> = (1..=30).map(|i| i as f64).collect();
        let data = fetched(vec![
            bars("AAA", &closes, 0),
            bars("BBB", &sample_closes(30, 70.0), 0),
        ]);
        let out = FeatureEngineer::new(&store).build(&data).unwrap();
        let row = out.rows.iter().find(|r| r.symbol == "AAA").unwrap();

        assert!((row.get("close_lag_1").unwrap() - 29.0).abs() < 1e-9);
        assert!((row.get("close_lag_5").unwrap() - 25.0).abs() < 1e-9);
        // SMA_5 over days 26..=30.
        assert!((row.get("sma_5").unwrap() - 28.0).abs() < 1e-9);
    }

    #[test]
    fn test_market_return_is_cross_sectional_mean_change() {
        // Two instruments, one rising 10%/day, one flat.
        let a: Vec<f64> = (0..10).map(|i| 100.0 * 1.1_f64.powi(i)).collect();
        let b = vec![50.0; 10];
        let (sa, ba) = bars("AAA", &a, 0);
        let (sb, bb) = bars("BBB", &b, 0);
        let map = market_return_by_date(&[(sa, ba), (sb, bb)]);
        let second_day = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        // mean(0.10, 0.0)
        assert!((map[&second_day] - 0.05).abs() < 1e-9);
        let first_day = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        assert_eq!(map[&first_day], 0.0);
    }

    #[test]
    fn test_missing_fundamentals_fall_back() {
        let store = MemStore::default();
        let mut data = fetched(vec![
            bars("AAA", &sample_closes(35, 40.0), 0),
            bars("BBB", &sample_closes(35, 60.0), 0),
        ]);
        data.fundamentals
            .insert("AAA".to_string(), FundamentalsFetch::Missing);

        let out = FeatureEngineer::new(&store).build(&data).unwrap();
        let row = out.rows.iter().find(|r| r.symbol == "AAA").unwrap();
        assert_eq!(row.get("eps").unwrap(), 0.0);
        assert_eq!(row.get("market_cap").unwrap(), 1e-6);
        // pe_to_eps stays finite through the epsilon guard.
        assert!(row.get("pe_to_eps").unwrap().is_finite());
    }

    #[test]
    fn test_injected_projector_bypasses_store() {
        let store = MemStore::default();
        let data = fetched(vec![
            bars("AAA", &sample_closes(45, 40.0), 0),
            bars("BBB", &sample_closes(45, 60.0), 0),
        ]);

        // Fit a projector through one engineer, then inject it elsewhere.
        let first = FeatureEngineer::new(&store).build(&data).unwrap();
        let bytes = store.load(crate::application::projector::PROJECTOR_ARTIFACT).unwrap();
        let projector: TechnicalProjector = serde_json::from_slice(&bytes).unwrap();

        let empty = MemStore::default();
        let second = FeatureEngineer::new(&empty)
            .with_projector(&projector)
            .build(&data)
            .unwrap();

        // Identical inputs and projector: identical projections, and the
        // bypass store was never written to.
        for (a, b) in first.rows.iter().zip(&second.rows) {
            assert_eq!(a.get("pca_tech_1"), b.get("pca_tech_1"));
        }
        assert!(!empty.exists(crate::application::projector::PROJECTOR_ARTIFACT));
    }
}
