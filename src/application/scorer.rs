//! Scoring the as-of feature rows with the pre-trained ranking model.
//!
//! The model, its scaler and the feature schema are opaque, versioned
//! artifacts loaded once at startup; any load failure is fatal for the run.
//! Rows are re-ordered against the persisted schema — the fetched universe's
//! column order never reaches the model.

use crate::application::projector::ColumnScaler;
use crate::domain::errors::PipelineError;
use crate::domain::features::FeatureRow;
use crate::domain::ports::ArtifactStore;
use smartcore::ensemble::random_forest_regressor::RandomForestRegressor;
use smartcore::linalg::basic::matrix::DenseMatrix;
use std::collections::BTreeSet;
use tracing::{info, warn};

pub const MODEL_ARTIFACT: &str = "ranking_model.json";
pub const SCALER_ARTIFACT: &str = "scaler.json";
pub const FEATURE_SCHEMA_ARTIFACT: &str = "feature_cols.json";

type RankingModel = RandomForestRegressor<f64, f64, DenseMatrix<f64>, Vec<f64>>;

pub struct RankingScorer {
    model: RankingModel,
    scaler: ColumnScaler,
    feature_cols: Vec<String>,
}

impl RankingScorer {
    /// Load model + scaler + schema from the artifact store. Absence or
    /// corruption of any of the three aborts the run before scoring.
    pub fn load(store: &dyn ArtifactStore) -> Result<Self, PipelineError> {
        let model: RankingModel = load_json(store, MODEL_ARTIFACT)?;
        let scaler: ColumnScaler = load_json(store, SCALER_ARTIFACT)?;
        let feature_cols: Vec<String> = load_json(store, FEATURE_SCHEMA_ARTIFACT)?;

        if scaler.means.len() != feature_cols.len() {
            return Err(PipelineError::artifact(
                SCALER_ARTIFACT,
                format!(
                    "scaler covers {} columns but the schema has {}",
                    scaler.means.len(),
                    feature_cols.len()
                ),
            ));
        }

        info!(features = feature_cols.len(), "Loaded ranking model, scaler and feature schema");
        Ok(Self {
            model,
            scaler,
            feature_cols,
        })
    }

    pub fn feature_cols(&self) -> &[String] {
        &self.feature_cols
    }

    /// One score per input row, in input order.
    pub fn score(&self, rows: &[FeatureRow]) -> Result<Vec<f64>, PipelineError> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let aligned = align_rows(&self.feature_cols, rows);
        let scaled: Vec<Vec<f64>> = aligned
            .iter()
            .map(|r| self.scaler_transform(r))
            .collect();

        let matrix = DenseMatrix::from_2d_vec(&scaled)
            .map_err(|e| PipelineError::scoring(format!("matrix construction: {}", e)))?;
        let scores = self
            .model
            .predict(&matrix)
            .map_err(|e| PipelineError::scoring(format!("model invocation: {}", e)))?;

        if scores.len() != rows.len() {
            return Err(PipelineError::scoring(format!(
                "model returned {} scores for {} rows",
                scores.len(),
                rows.len()
            )));
        }
        Ok(scores)
    }

    fn scaler_transform(&self, row: &[f64]) -> Vec<f64> {
        row.iter()
            .enumerate()
            .map(|(c, v)| (v - self.scaler.means[c]) / self.scaler.stds[c].max(f64::MIN_POSITIVE))
            .collect()
    }
}

/// Select exactly the schema columns, in schema order, for every row. A
/// required column absent from a row is zero-filled and logged once per
/// column.
pub fn align_rows(feature_cols: &[String], rows: &[FeatureRow]) -> Vec<Vec<f64>> {
    let mut missing: BTreeSet<&str> = BTreeSet::new();
    let aligned = rows
        .iter()
        .map(|row| {
            feature_cols
                .iter()
                .map(|col| match row.get(col) {
                    Some(v) if v.is_finite() => v,
                    Some(_) => 0.0,
                    None => {
                        missing.insert(col.as_str());
                        0.0
                    }
                })
                .collect()
        })
        .collect();

    for col in missing {
        warn!(column = %col, "Required feature column absent; filled with 0");
    }
    aligned
}

fn load_json<T: serde::de::DeserializeOwned>(
    store: &dyn ArtifactStore,
    name: &str,
) -> Result<T, PipelineError> {
    let bytes = store
        .load(name)
        .map_err(|e| PipelineError::artifact(name, e))?;
    serde_json::from_slice(&bytes).map_err(|e| PipelineError::artifact(name, e))
}
