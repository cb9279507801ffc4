//! Manifest validation errors

use thiserror::Error;

/// Errors raised while parsing or validating a manifest
///
/// All of these are raised before any side effect.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// Manifest is not valid JSON or has the wrong shape
    #[error("Failed to parse manifest: {0}")]
    Parse(#[from] serde_json::Error),

    /// A required field is missing or empty
    #[error("Missing required field: {0}")]
    MissingField(String),

    /// The manifest declares no modules
    #[error("Manifest {0} has no modules")]
    EmptyPipeline(String),

    /// A field has an invalid value
    #[error("Invalid value for {field}: {reason}")]
    InvalidField { field: String, reason: String },
}

impl ManifestError {
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.into(),
            reason: reason.into(),
        }
    }
}
