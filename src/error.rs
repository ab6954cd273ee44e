//! Error taxonomy for the generation pipeline.
//!
//! Only [`GenerateError::Config`] is fatal. Everything else is caught by the
//! batch assembler, turned into retry feedback, and never reaches the caller.
//! Contract violations are not errors at all; they travel as a
//! [`crate::generate::assembler::ViolationReport`].

use thiserror::Error;

/// Result alias used across the model-facing half of the pipeline.
pub type Result<T> = std::result::Result<T, GenerateError>;

#[derive(Debug, Error)]
pub enum GenerateError {
    /// Missing credential or unusable configuration. Not retried.
    #[error("configuration error: {0}")]
    Config(String),

    /// Network failure or non-2xx status from the model endpoint.
    #[error("model transport failed: {0}")]
    Transport(String),

    /// The model call did not finish inside its wall-clock budget.
    #[error("model call exceeded {0} ms and was cancelled")]
    Timeout(u64),

    /// The model answered but produced no text.
    #[error("model responded without any text")]
    EmptyResponse,

    /// No JSON object with a posts array could be recovered.
    #[error("malformed model response: {0}")]
    MalformedResponse(String),
}

impl GenerateError {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, GenerateError::Config(_))
    }

    /// Stable short label used for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            GenerateError::Config(_) => "config",
            GenerateError::Transport(_) => "transport",
            GenerateError::Timeout(_) => "timeout",
            GenerateError::EmptyResponse => "empty",
            GenerateError::MalformedResponse(_) => "malformed",
        }
    }
}
