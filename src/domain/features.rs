use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Column-name prefixes identifying the technical-indicator families. The
/// subspace projector operates on exactly the columns carrying one of these
/// prefixes, so they must stay stable across runs.
pub const TECHNICAL_PREFIXES: &[&str] = &["momentum_", "trend_", "volatility_"];

pub fn is_technical_column(name: &str) -> bool {
    TECHNICAL_PREFIXES.iter().any(|p| name.starts_with(p))
}

/// The fully derived feature vector for one instrument at one as-of date.
///
/// Values are keyed by column name; the scorer re-orders them against the
/// persisted schema, so map ordering here carries no meaning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureRow {
    pub symbol: String,
    pub as_of: NaiveDate,
    pub values: BTreeMap<String, f64>,
}

impl FeatureRow {
    pub fn new(symbol: impl Into<String>, as_of: NaiveDate) -> Self {
        Self {
            symbol: symbol.into(),
            as_of,
            values: BTreeMap::new(),
        }
    }

    pub fn set(&mut self, name: impl Into<String>, value: f64) {
        self.values.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }

    /// Names of the technical-family columns present on this row.
    pub fn technical_columns(&self) -> Vec<String> {
        self.values
            .keys()
            .filter(|k| is_technical_column(k))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_technical_prefix_matching() {
        assert!(is_technical_column("momentum_rsi_14"));
        assert!(is_technical_column("trend_macd"));
        assert!(is_technical_column("volatility_atr_14"));
        assert!(!is_technical_column("rolling_std_10"));
        assert!(!is_technical_column("sma_5"));
        assert!(!is_technical_column("pe_to_eps"));
    }

    #[test]
    fn test_technical_columns_sorted_and_filtered() {
        let mut row = FeatureRow::new("AAPL", NaiveDate::from_ymd_opt(2024, 6, 3).unwrap());
        row.set("volatility_atr_14", 1.0);
        row.set("close_lag_1", 2.0);
        row.set("momentum_rsi_14", 3.0);
        // BTreeMap keys come back sorted, giving a stable projection order.
        assert_eq!(
            row.technical_columns(),
            vec!["momentum_rsi_14".to_string(), "volatility_atr_14".to_string()]
        );
    }
}
