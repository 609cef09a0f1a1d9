//! Error types for catalog loading
//!
//! The player and animator never fail; only turning external input into a
//! [`Catalog`](crate::catalog::Catalog) can.

use thiserror::Error;

/// Result alias for catalog operations
pub type CatalogResult<T> = Result<T, CatalogError>;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Unknown scenario '{id}' (available: {available})")]
    UnknownScenario { id: String, available: String },

    #[error("Catalog '{catalog}' has no steps")]
    Empty { catalog: String },

    #[error("Duplicate step id '{step_id}'")]
    DuplicateStepId { step_id: String },

    #[error("Step '{step_id}' is invalid: {reason}")]
    InvalidStep { step_id: String, reason: String },

    #[error("Failed to parse catalog: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CatalogError {
    pub fn invalid_step(step_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidStep {
            step_id: step_id.into(),
            reason: reason.into(),
        }
    }

    /// Whether the error comes from the catalog's content rather than from
    /// reading or locating it
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::Empty { .. } | Self::DuplicateStepId { .. } | Self::InvalidStep { .. }
        )
    }
}
