//! Technical-indicator families computed per instrument, ordered by date.
//!
//! Column names carry the stable family prefixes `momentum_`, `trend_` and
//! `volatility_`; the subspace projector selects on those prefixes, so the
//! set of names must be reproducible across runs.

use crate::domain::types::Bar;
use rust_decimal::prelude::ToPrimitive;
use ta::Next;
use ta::indicators::{
    AverageTrueRange, BollingerBands, MovingAverageConvergenceDivergence, RelativeStrengthIndex,
};

const RSI_PERIOD: usize = 14;
const ATR_PERIOD: usize = 14;
const ADX_PERIOD: usize = 14;
const BB_PERIOD: usize = 20;
const BB_STD_DEV: f64 = 2.0;
const ROC_PERIOD: usize = 10;

/// Wilder-smoothed ADX. Accumulates the first `period` true-range /
/// directional-movement values as plain sums, then switches to Wilder's
/// recursive smoothing. Returns 0 until enough observations accumulate.
pub struct WilderAdx {
    period: usize,
    prev: Option<(f64, f64, f64)>, // (high, low, close)
    tr_smooth: f64,
    plus_dm_smooth: f64,
    minus_dm_smooth: f64,
    adx: f64,
    count: usize,
}

impl WilderAdx {
    pub fn new(period: usize) -> Self {
        Self {
            period,
            prev: None,
            tr_smooth: 0.0,
            plus_dm_smooth: 0.0,
            minus_dm_smooth: 0.0,
            adx: 0.0,
            count: 0,
        }
    }

    pub fn next(&mut self, high: f64, low: f64, close: f64) -> f64 {
        let Some((prev_high, prev_low, prev_close)) = self.prev.replace((high, low, close)) else {
            return 0.0;
        };

        let tr = (high - low)
            .max((high - prev_close).abs())
            .max((low - prev_close).abs());
        let up_move = high - prev_high;
        let down_move = prev_low - low;
        let plus_dm = if up_move > down_move && up_move > 0.0 { up_move } else { 0.0 };
        let minus_dm = if down_move > up_move && down_move > 0.0 { down_move } else { 0.0 };

        self.count += 1;
        let n = self.period as f64;
        if self.count <= self.period {
            self.tr_smooth += tr;
            self.plus_dm_smooth += plus_dm;
            self.minus_dm_smooth += minus_dm;
        } else {
            self.tr_smooth = self.tr_smooth - (self.tr_smooth / n) + tr;
            self.plus_dm_smooth = self.plus_dm_smooth - (self.plus_dm_smooth / n) + plus_dm;
            self.minus_dm_smooth = self.minus_dm_smooth - (self.minus_dm_smooth / n) + minus_dm;
        }

        if self.count < self.period || self.tr_smooth <= 0.0 {
            return 0.0;
        }

        let plus_di = 100.0 * self.plus_dm_smooth / self.tr_smooth;
        let minus_di = 100.0 * self.minus_dm_smooth / self.tr_smooth;
        let sum_di = plus_di + minus_di;
        let dx = if sum_di > 0.0 {
            100.0 * (plus_di - minus_di).abs() / sum_di
        } else {
            0.0
        };

        self.adx = if self.count == self.period {
            dx
        } else {
            ((self.adx * (n - 1.0)) + dx) / n
        };
        self.adx
    }
}

/// One named technical column over the instrument's full bar history.
pub type TechnicalColumn = (&'static str, Vec<f64>);

/// Compute all technical-family columns for one instrument's ordered bars.
/// Every column has one value per bar; warm-up gaps are NaN and resolved by
/// the caller's missing-value policy.
pub fn technical_columns(bars: &[Bar]) -> Vec<TechnicalColumn> {
    let n = bars.len();

    let mut rsi = RelativeStrengthIndex::new(RSI_PERIOD).expect("RSI period must be > 0");
    let mut macd = MovingAverageConvergenceDivergence::new(12, 26, 9)
        .expect("MACD periods must be valid");
    let mut bb = BollingerBands::new(BB_PERIOD, BB_STD_DEV).expect("BB period must be > 0");
    let mut atr = AverageTrueRange::new(ATR_PERIOD).expect("ATR period must be > 0");
    let mut adx = WilderAdx::new(ADX_PERIOD);

    let mut momentum_rsi = Vec::with_capacity(n);
    let mut momentum_roc = Vec::with_capacity(n);
    let mut trend_macd = Vec::with_capacity(n);
    let mut trend_macd_signal = Vec::with_capacity(n);
    let mut trend_macd_hist = Vec::with_capacity(n);
    let mut trend_adx = Vec::with_capacity(n);
    let mut vol_bb_width = Vec::with_capacity(n);
    let mut vol_bb_position = Vec::with_capacity(n);
    let mut vol_atr = Vec::with_capacity(n);

    let closes: Vec<f64> = bars
        .iter()
        .map(|b| b.close.to_f64().unwrap_or(0.0))
        .collect();

    for (i, bar) in bars.iter().enumerate() {
        let open = bar.open.to_f64().unwrap_or(0.0);
        let high = bar.high.to_f64().unwrap_or(0.0);
        let low = bar.low.to_f64().unwrap_or(0.0);
        let close = closes[i];
        let volume = bar.volume.to_f64().unwrap_or(0.0);

        momentum_rsi.push(rsi.next(close));

        momentum_roc.push(if i >= ROC_PERIOD && closes[i - ROC_PERIOD].abs() > f64::EPSILON {
            (close - closes[i - ROC_PERIOD]) / closes[i - ROC_PERIOD]
        } else {
            f64::NAN
        });

        let macd_out = macd.next(close);
        trend_macd.push(macd_out.macd);
        trend_macd_signal.push(macd_out.signal);
        trend_macd_hist.push(macd_out.histogram);

        trend_adx.push(adx.next(high, low, close));

        let bb_out = bb.next(close);
        vol_bb_width.push(if bb_out.average > 0.0 {
            (bb_out.upper - bb_out.lower) / bb_out.average
        } else {
            0.0
        });
        vol_bb_position.push(if bb_out.upper - bb_out.lower > 1e-9 {
            (close - bb_out.lower) / (bb_out.upper - bb_out.lower)
        } else {
            0.5
        });

        let item = ta::DataItem::builder()
            .open(open)
            .high(high)
            .low(low)
            .close(close)
            .volume(volume)
            .build()
            .unwrap_or_else(|_| {
                // Degenerate bar (e.g. high < low from a bad feed): collapse
                // to the close so the indicator keeps its state consistent.
                ta::DataItem::builder()
                    .open(close)
                    .high(close)
                    .low(close)
                    .close(close)
                    .volume(0.0)
                    .build()
                    .expect("flat data item is always valid")
            });
        vol_atr.push(atr.next(&item));
    }

    vec![
        ("momentum_rsi_14", momentum_rsi),
        ("momentum_roc_10", momentum_roc),
        ("trend_macd", trend_macd),
        ("trend_macd_signal", trend_macd_signal),
        ("trend_macd_hist", trend_macd_hist),
        ("trend_adx_14", trend_adx),
        ("volatility_bb_width", vol_bb_width),
        ("volatility_bb_position", vol_bb_position),
        ("volatility_atr_14", vol_atr),
    ]
}
