//! Ports consumed by the pipeline core. Infrastructure provides the
//! implementations; tests inject mocks.

use crate::domain::snapshot::RankingSnapshot;
use crate::domain::types::{Fundamentals, RawBar};
use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;

/// Upstream market-data source. Both calls are fallible per instrument; the
/// fetcher decides what degrades and what aborts.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Daily bars for one symbol over a trailing window of calendar days.
    /// May return duplicates or incomplete bars; the fetcher cleans.
    async fn fetch_bars(&self, symbol: &str, lookback_days: u32) -> Result<Vec<RawBar>>;

    /// Latest known static fundamentals for one symbol.
    async fn fetch_fundamentals(&self, symbol: &str) -> Result<Fundamentals>;
}

/// Read/write store for opaque, versioned artifacts (model, scaler, feature
/// schema, projector). Reads are hot-path; writes happen only when the
/// projector is first created and must be atomic.
pub trait ArtifactStore: Send + Sync {
    fn exists(&self, name: &str) -> bool;

    fn load(&self, name: &str) -> Result<Vec<u8>>;

    /// Atomic write: a concurrent reader never observes a partial artifact.
    fn store(&self, name: &str, bytes: &[u8]) -> Result<()>;
}

/// Outcome of a snapshot write attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    /// A snapshot for the date already existed (possibly written by a
    /// concurrent invocation between our `exists` check and the insert).
    AlreadyExists,
}

/// Durable, date-keyed snapshot storage with an at-most-one-per-date
/// guarantee.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn exists(&self, as_of: NaiveDate) -> Result<bool>;

    /// Write the full snapshot transactionally. A uniqueness conflict is
    /// reported as `AlreadyExists`, never as an error or a partial write.
    async fn write(&self, snapshot: &RankingSnapshot) -> Result<WriteOutcome>;

    /// The read model for serving layers: the most recent snapshot, ordered
    /// by rank. `None` means "not yet available".
    async fn latest(&self) -> Result<Option<RankingSnapshot>>;
}
