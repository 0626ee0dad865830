//! Top-K selection over the scored as-of rows.

use crate::domain::features::FeatureRow;
use crate::domain::snapshot::{ExtraDisplayFields, RankingSnapshot, ScoredInstrument};
use crate::domain::types::FundamentalsFetch;
use chrono::NaiveDate;
use std::collections::HashMap;
use tracing::warn;

pub struct TopKSelector {
    k: usize,
    holding_period_days: u32,
}

impl TopKSelector {
    pub fn new(k: usize, holding_period_days: u32) -> Self {
        Self {
            k,
            holding_period_days,
        }
    }

    /// Rank by score descending and keep the first K. The sort is stable, so
    /// ties preserve the deterministic fetch/feature order and identical
    /// inputs always reproduce the same snapshot. Rows without a valid
    /// (finite) score are excluded.
    pub fn select(
        &self,
        as_of: NaiveDate,
        rows: &[FeatureRow],
        scores: &[f64],
        fundamentals: &HashMap<String, FundamentalsFetch>,
    ) -> RankingSnapshot {
        debug_assert_eq!(rows.len(), scores.len());

        let mut order: Vec<usize> = (0..rows.len())
            .filter(|&i| {
                if scores[i].is_finite() {
                    true
                } else {
                    warn!(symbol = %rows[i].symbol, "Dropping instrument with invalid score");
                    false
                }
            })
            .collect();
        order.sort_by(|&a, &b| {
            scores[b]
                .partial_cmp(&scores[a])
                .expect("non-finite scores were filtered")
        });

        let entries = order
            .into_iter()
            .take(self.k)
            .enumerate()
            .map(|(i, idx)| {
                let row = &rows[idx];
                let funds = fundamentals.get(&row.symbol).and_then(|f| f.as_option());
                ScoredInstrument {
                    symbol: row.symbol.clone(),
                    as_of,
                    score: scores[idx],
                    rank: (i + 1) as u32,
                    extra: ExtraDisplayFields {
                        pe_ratio: funds.and_then(|f| f.pe_ratio),
                        market_cap: funds.and_then(|f| f.market_cap),
                    },
                }
            })
            .collect();

        RankingSnapshot {
            as_of,
            entries,
            holding_period_days: self.holding_period_days,
        }
    }
}
