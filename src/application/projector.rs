//! Persisted subspace projector for the technical-indicator columns.
//!
//! Lifecycle: fit lazily on the first-ever run from the current batch's full
//! historical technical matrix, persist through the artifact store, and on
//! every later run load and apply only. The projector is never refit in
//! place — deleting the artifact is the explicit re-fit operation.

use crate::domain::ports::ArtifactStore;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use smartcore::decomposition::pca::{PCA, PCAParameters};
use smartcore::linalg::basic::arrays::{Array, Array2};
use smartcore::linalg::basic::matrix::DenseMatrix;
use statrs::statistics::Statistics;
use tracing::{info, warn};

pub const PROJECTOR_ARTIFACT: &str = "technical_projector.json";
pub const N_COMPONENTS: usize = 5;

/// Batch column means farther than this many fit-time sigmas from the
/// fit-time mean trigger a drift warning.
const DRIFT_SIGMAS: f64 = 3.0;

/// Whether this process fit the projector or loaded a persisted one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Provenance {
    Created,
    #[default]
    Loaded,
}

/// Per-column standardizer fit alongside the PCA (dedicated to the
/// projection; the scorer has its own, separately persisted scaler).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnScaler {
    pub means: Vec<f64>,
    pub stds: Vec<f64>,
}

impl ColumnScaler {
    fn fit(rows: &[Vec<f64>], n_cols: usize) -> Self {
        let mut means = Vec::with_capacity(n_cols);
        let mut stds = Vec::with_capacity(n_cols);
        for c in 0..n_cols {
            let col: Vec<f64> = rows.iter().map(|r| r[c]).collect();
            let mean = col.iter().mean();
            let std = col.iter().std_dev();
            means.push(mean);
            stds.push(if std.is_finite() && std > 0.0 { std } else { 1.0 });
        }
        Self { means, stds }
    }

    fn transform_row(&self, row: &[f64]) -> Vec<f64> {
        row.iter()
            .enumerate()
            .map(|(c, v)| (v - self.means[c]) / self.stds[c])
            .collect()
    }
}

#[derive(Serialize, Deserialize)]
pub struct TechnicalProjector {
    /// Ordered technical columns the transform was fit on.
    columns: Vec<String>,
    scaler: ColumnScaler,
    pca: PCA<f64, DenseMatrix<f64>>,
    #[serde(skip)]
    provenance: Provenance,
}

impl TechnicalProjector {
    /// Fit standardizer + PCA on a full historical technical matrix
    /// (`rows[i][c]` = value of `columns[c]`; NaNs already resolved).
    pub fn fit(columns: Vec<String>, rows: &[Vec<f64>]) -> Result<Self> {
        anyhow::ensure!(!rows.is_empty(), "cannot fit projector on an empty matrix");
        anyhow::ensure!(
            columns.len() >= N_COMPONENTS,
            "need at least {} technical columns to project, got {}",
            N_COMPONENTS,
            columns.len()
        );

        let scaler = ColumnScaler::fit(rows, columns.len());
        let scaled: Vec<Vec<f64>> = rows.iter().map(|r| scaler.transform_row(r)).collect();
        let matrix = DenseMatrix::from_2d_vec(&scaled)
            .map_err(|e| anyhow::anyhow!("projector fit matrix: {}", e))?;

        let pca = PCA::fit(
            &matrix,
            PCAParameters::default().with_n_components(N_COMPONENTS),
        )
        .map_err(|e| anyhow::anyhow!("PCA fit failed: {}", e))?;

        info!(
            rows = rows.len(),
            columns = columns.len(),
            components = N_COMPONENTS,
            "Fitted technical subspace projector"
        );

        Ok(Self {
            columns,
            scaler,
            pca,
            provenance: Provenance::Created,
        })
    }

    /// Load the persisted projector if present, otherwise fit on the given
    /// batch and persist atomically.
    pub fn load_or_fit(
        store: &dyn ArtifactStore,
        columns: Vec<String>,
        rows: &[Vec<f64>],
    ) -> Result<Self> {
        if store.exists(PROJECTOR_ARTIFACT) {
            let bytes = store.load(PROJECTOR_ARTIFACT)?;
            let projector: TechnicalProjector = serde_json::from_slice(&bytes)
                .context("failed to deserialize persisted projector")?;
            info!(
                columns = projector.columns.len(),
                "Loaded persisted technical projector"
            );
            return Ok(projector);
        }

        let projector = Self::fit(columns, rows)?;
        let bytes = serde_json::to_vec(&projector).context("failed to serialize projector")?;
        store.store(PROJECTOR_ARTIFACT, &bytes)?;
        info!("Persisted newly fitted technical projector");
        Ok(projector)
    }

    pub fn provenance(&self) -> Provenance {
        self.provenance
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Apply (never refit) the persisted transform. `columns` must match the
    /// fit-time column set; the indicator code derives both, so a mismatch
    /// means the artifact belongs to a different build.
    pub fn project(&self, columns: &[String], rows: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
        anyhow::ensure!(
            columns == self.columns.as_slice(),
            "technical columns differ from the persisted projector's (persisted: {:?}, batch: {:?})",
            self.columns,
            columns
        );
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        self.warn_on_drift(rows);

        let scaled: Vec<Vec<f64>> = rows.iter().map(|r| self.scaler.transform_row(r)).collect();
        let matrix = DenseMatrix::from_2d_vec(&scaled)
            .map_err(|e| anyhow::anyhow!("projection matrix: {}", e))?;
        let projected = self
            .pca
            .transform(&matrix)
            .map_err(|e| anyhow::anyhow!("PCA transform failed: {}", e))?;

        let (n_rows, n_cols) = projected.shape();
        let mut out = Vec::with_capacity(n_rows);
        for r in 0..n_rows {
            let mut row = Vec::with_capacity(n_cols);
            for c in 0..n_cols {
                row.push(*projected.get((r, c)));
            }
            out.push(row);
        }
        Ok(out)
    }

    /// The fit-once lifecycle deliberately keeps serving the persisted
    /// transform when the universe or distribution changes; surface a
    /// warning when the batch has moved materially from fit time.
    fn warn_on_drift(&self, rows: &[Vec<f64>]) {
        for (c, name) in self.columns.iter().enumerate() {
            let batch_mean = rows.iter().map(|r| r[c]).sum::<f64>() / rows.len() as f64;
            let delta = (batch_mean - self.scaler.means[c]).abs();
            if delta > DRIFT_SIGMAS * self.scaler.stds[c] {
                warn!(
                    column = %name,
                    fit_mean = self.scaler.means[c],
                    batch_mean,
                    "Feature distribution has drifted from projector fit time; \
                     delete the projector artifact to re-fit"
                );
            }
        }
    }
}
