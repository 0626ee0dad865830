use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One daily OHLCV observation for a single instrument.
///
/// Prices use `Decimal` end to end; the feature layer converts to `f64`
/// at its boundary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Bar {
    pub symbol: String,
    pub date: NaiveDate,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

/// A bar as the upstream source reports it: any price field may be absent.
/// The fetcher drops rows missing open/high/low/close and defaults volume
/// to zero before promoting to [`Bar`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RawBar {
    pub symbol: String,
    pub date: NaiveDate,
    pub open: Option<Decimal>,
    pub high: Option<Decimal>,
    pub low: Option<Decimal>,
    pub close: Option<Decimal>,
    pub volume: Option<Decimal>,
}

impl RawBar {
    /// Promote to a complete [`Bar`], or `None` if any of O/H/L/C is absent.
    pub fn into_bar(self) -> Option<Bar> {
        Some(Bar {
            symbol: self.symbol,
            date: self.date,
            open: self.open?,
            high: self.high?,
            low: self.low?,
            close: self.close?,
            volume: self.volume.unwrap_or_default(),
        })
    }
}

/// Static fundamentals attached to an instrument. Any field may be absent
/// upstream; imputation happens in feature engineering, not here.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Fundamentals {
    pub market_cap: Option<f64>,
    pub pe_ratio: Option<f64>,
    pub eps: Option<f64>,
}

/// Outcome of a per-instrument fundamentals fetch. A failed fetch degrades
/// to `Missing` instead of aborting the batch.
#[derive(Debug, Clone, PartialEq)]
pub enum FundamentalsFetch {
    Available(Fundamentals),
    Missing,
}

impl FundamentalsFetch {
    pub fn as_option(&self) -> Option<&Fundamentals> {
        match self {
            FundamentalsFetch::Available(f) => Some(f),
            FundamentalsFetch::Missing => None,
        }
    }
}

/// Default instrument universe: a fixed 100-ticker large-cap list. The
/// universe is static configuration, never discovered at runtime.
pub const DEFAULT_UNIVERSE: &[&str] = &[
    // Mega-cap tech
    "NVDA", "MSFT", "AAPL", "GOOGL", "GOOG", "AMZN", "META", "TSLA", "AVGO", "ASML",
    // Growth & semis
    "NFLX", "AMD", "QCOM", "TXN", "AMAT", "INTU", "ADBE", "CRM", "INTC", "MU",
    "PYPL", "ZM", "OKTA", "SNOW", "PANW", "CDNS", "ANSS", "MRVL", "KLAC", "LRCX",
    // Retail & staples
    "COST", "PEP", "WMT", "HD", "MCD", "SBUX", "KO", "PG", "NKE", "TGT",
    // Healthcare
    "JNJ", "UNH", "LLY", "ABBV", "PFE", "MRK", "AMGN", "GILD", "BMY", "VRTX",
    // Financials & payments
    "JPM", "V", "MA", "BAC", "WFC", "GS", "MS", "AXP", "SPGI", "CME",
    // Industrials & materials
    "LIN", "GE", "CAT", "BA", "MMM", "RTX", "HON", "ECL", "SHW", "DE",
    // Energy & utilities
    "XOM", "CVX", "EOG", "SLB", "OXY", "COP", "DUK", "NEE", "SO", "AEP",
    // Real estate & telecom
    "T", "VZ", "TMUS", "DLR", "EQIX", "AMT", "CCI", "PLD", "PSA", "URI",
    // Diversified
    "BRK-B", "ORCL", "CMCSA", "DIS", "TMO", "DELL", "MOH", "ISRG", "LOW", "PGR",
];

pub fn default_universe() -> Vec<String> {
    DEFAULT_UNIVERSE.iter().map(|s| s.to_string()).collect()
}
