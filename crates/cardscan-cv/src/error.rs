use crate::detection::SourceMethod;
use thiserror::Error;

/// Failures of the detection cascade.
///
/// Only [`CascadeError::MalformedInput`], [`CascadeError::ConfigurationInvalid`]
/// and [`CascadeError::Canceled`] reach callers of `detect`; the others are
/// recovered per region by moving on to the next tier.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CascadeError {
    #[error("Detector artifact unavailable: {0}")]
    ArtifactUnavailable(String),

    #[error("{method} stage timed out after {timeout_ms}ms")]
    InferenceTimeout { method: SourceMethod, timeout_ms: u64 },

    #[error("{method} inference failed: {message}")]
    Inference { method: SourceMethod, message: String },

    #[error("Malformed input: {0}")]
    MalformedInput(String),

    #[error("Invalid configuration: {0}")]
    ConfigurationInvalid(String),

    #[error("Detection canceled")]
    Canceled,
}

impl CascadeError {
    /// Whether the cascade absorbs this error locally instead of failing the request.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            CascadeError::ArtifactUnavailable(_)
                | CascadeError::InferenceTimeout { .. }
                | CascadeError::Inference { .. }
        )
    }
}
