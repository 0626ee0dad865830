use thiserror::Error;

/// Run-fatal errors of the ranking pipeline. Per-instrument fetch gaps and
/// absent schema columns are recovered locally (with a warning) and never
/// appear here; a snapshot that already exists is a successful skip, not an
/// error.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The entire fetch produced no usable bars for any instrument.
    #[error("no usable bars returned for any instrument in the universe")]
    NoUsableBars,

    /// A required model/scaler/schema/projector artifact is missing or
    /// corrupt. Aborts before any scoring happens.
    #[error("failed to load artifact '{name}': {reason}")]
    ArtifactLoad { name: String, reason: String },

    #[error("feature engineering failed: {reason}")]
    FeatureEngineering { reason: String },

    /// Model invocation failure. No partial scoring is attempted.
    #[error("scoring failed: {reason}")]
    Scoring { reason: String },

    /// Durable-write failure that is not a uniqueness conflict.
    #[error("failed to publish snapshot for {as_of}: {reason}")]
    Publish { as_of: chrono::NaiveDate, reason: String },
}

impl PipelineError {
    pub fn artifact(name: impl Into<String>, reason: impl ToString) -> Self {
        Self::ArtifactLoad {
            name: name.into(),
            reason: reason.to_string(),
        }
    }

    pub fn scoring(reason: impl ToString) -> Self {
        Self::Scoring {
            reason: reason.to_string(),
        }
    }
}
