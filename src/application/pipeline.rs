//! The daily ranking pipeline: one `run_once` per scheduler tick.
//!
//! Stage order is fixed: Fetching → FeatureEngineering → Scoring →
//! Selecting → (snapshot exists? Skipped : Publishing) → Done. Any stage
//! failure aborts the remaining stages and leaves no partial artifacts; the
//! next tick simply retries.

use crate::application::features::engineer::FeatureEngineer;
use crate::application::fetcher::RawDataFetcher;
use crate::application::projector::TechnicalProjector;
use crate::application::scorer::RankingScorer;
use crate::application::selector::TopKSelector;
use crate::config::Config;
use crate::domain::ports::{ArtifactStore, MarketDataProvider, SnapshotStore, WriteOutcome};
use crate::domain::snapshot::RunResult;
use anyhow::Result;
use std::sync::Arc;
use tracing::{error, info};

pub struct RankingPipeline {
    provider: Arc<dyn MarketDataProvider>,
    artifacts: Arc<dyn ArtifactStore>,
    snapshots: Arc<dyn SnapshotStore>,
    config: Config,
    projector_override: Option<TechnicalProjector>,
}

impl RankingPipeline {
    pub fn new(
        provider: Arc<dyn MarketDataProvider>,
        artifacts: Arc<dyn ArtifactStore>,
        snapshots: Arc<dyn SnapshotStore>,
        config: Config,
    ) -> Self {
        Self {
            provider,
            artifacts,
            snapshots,
            config,
            projector_override: None,
        }
    }

    /// Pin a specific projector version instead of the persisted artifact.
    pub fn with_projector(mut self, projector: TechnicalProjector) -> Self {
        self.projector_override = Some(projector);
        self
    }

    /// Entry point for the external scheduler. Never panics; failures come
    /// back as `RunStatus::Failed` with a reason.
    pub async fn run_once(&self) -> RunResult {
        match self.try_run().await {
            Ok(result) => result,
            Err(e) => {
                error!(error = %e, "Pipeline run failed");
                RunResult::failed(None, format!("{:#}", e))
            }
        }
    }

    async fn try_run(&self) -> Result<RunResult> {
        // Artifacts first: a missing model/scaler/schema is a configuration
        // error and must abort before any fetching or scoring work.
        let scorer = RankingScorer::load(self.artifacts.as_ref())?;

        info!(stage = "fetching", universe = self.config.universe.len(), "Pipeline started");
        let fetcher = RawDataFetcher::new(
            self.provider.as_ref(),
            self.config.lookback_days,
            self.config.fundamentals_concurrency,
        );
        let data = fetcher.fetch(&self.config.universe).await?;

        info!(stage = "feature_engineering", "Deriving features");
        let mut engineer = FeatureEngineer::new(self.artifacts.as_ref());
        if let Some(projector) = &self.projector_override {
            engineer = engineer.with_projector(projector);
        }
        let features = engineer.build(&data)?;
        let as_of = features.as_of;

        info!(stage = "scoring", %as_of, rows = features.rows.len(), "Scoring instruments");
        let scores = scorer.score(&features.rows)?;

        info!(stage = "selecting", "Selecting top {}", self.config.top_k);
        let selector = TopKSelector::new(self.config.top_k, self.config.holding_period_days);
        let snapshot = selector.select(as_of, &features.rows, &scores, &data.fundamentals);

        if self.snapshots.exists(as_of).await? {
            info!(%as_of, "Snapshot already exists; skipping publish");
            return Ok(RunResult::skipped(as_of));
        }

        info!(stage = "publishing", %as_of, entries = snapshot.entries.len(), "Publishing snapshot");
        match self.snapshots.write(&snapshot).await? {
            WriteOutcome::Written => {
                info!(%as_of, "Snapshot published");
                Ok(RunResult::success(as_of))
            }
            WriteOutcome::AlreadyExists => {
                // A concurrent invocation won the race between our existence
                // check and the insert; that is still a successful skip.
                info!(%as_of, "Snapshot written concurrently elsewhere; skipping");
                Ok(RunResult::skipped(as_of))
            }
        }
    }
}
