use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One ranked instrument inside a snapshot. `extra` carries display-only
/// fields (P/E, market cap) for serving layers; nothing downstream computes
/// on them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoredInstrument {
    pub symbol: String,
    pub as_of: NaiveDate,
    pub score: f64,
    /// 1-based rank position within the snapshot.
    pub rank: u32,
    pub extra: ExtraDisplayFields,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ExtraDisplayFields {
    pub pe_ratio: Option<f64>,
    pub market_cap: Option<f64>,
}

/// The immutable, date-keyed top-K ranking output. At most one snapshot may
/// exist per as-of date.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RankingSnapshot {
    pub as_of: NaiveDate,
    /// Ordered by ascending rank (rank 1 first).
    pub entries: Vec<ScoredInstrument>,
    /// Suggested holding period carried through to storage for monitoring.
    pub holding_period_days: u32,
}

impl RankingSnapshot {
    /// Scores must be non-increasing with rank.
    pub fn is_monotonic(&self) -> bool {
        self.entries.windows(2).all(|w| w[0].score >= w[1].score)
    }
}

/// Terminal status of one pipeline invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    /// A new snapshot was published.
    Success,
    /// A snapshot already existed for the as-of date; nothing was written.
    Skipped,
    Failed,
}

/// Result of `RankingPipeline::run_once`, consumed by the external scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    pub status: RunStatus,
    pub as_of: Option<NaiveDate>,
    pub reason: Option<String>,
}

impl RunResult {
    pub fn success(as_of: NaiveDate) -> Self {
        Self {
            status: RunStatus::Success,
            as_of: Some(as_of),
            reason: None,
        }
    }

    pub fn skipped(as_of: NaiveDate) -> Self {
        Self {
            status: RunStatus::Skipped,
            as_of: Some(as_of),
            reason: None,
        }
    }

    pub fn failed(as_of: Option<NaiveDate>, reason: impl Into<String>) -> Self {
        Self {
            status: RunStatus::Failed,
            as_of,
            reason: Some(reason.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(symbol: &str, score: f64, rank: u32) -> ScoredInstrument {
        ScoredInstrument {
            symbol: symbol.to_string(),
            as_of: NaiveDate::from_ymd_opt(2024, 6, 3).unwrap(),
            score,
            rank,
            extra: ExtraDisplayFields::default(),
        }
    }

    #[test]
    fn test_monotonic_detection() {
        let as_of = NaiveDate::from_ymd_opt(2024, 6, 3).unwrap();
        let good = RankingSnapshot {
            as_of,
            entries: vec![entry("A", 2.0, 1), entry("B", 2.0, 2), entry("C", 1.5, 3)],
            holding_period_days: 5,
        };
        assert!(good.is_monotonic());

        let bad = RankingSnapshot {
            as_of,
            entries: vec![entry("A", 1.0, 1), entry("B", 2.0, 2)],
            holding_period_days: 5,
        };
        assert!(!bad.is_monotonic());
    }
}
