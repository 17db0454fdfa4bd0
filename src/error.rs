use thiserror::Error;

use crate::dsp::normalize::RangeAnomaly;

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Failures raised by the analysis/synthesis kernel.
///
/// Every variant is deterministic for a given input and configuration, so
/// retrying a failed call never helps.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A configuration value is inconsistent with the others.
    #[error("invalid parameter '{name}': {message}")]
    InvalidParameter { name: &'static str, message: String },

    #[error("input waveform is empty")]
    EmptyInput,

    #[error("input contains a non-finite value at index {index}")]
    NonFiniteInput { index: usize },

    #[error("dimension mismatch for {what}: expected {expected}, got {got}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("spectrogram has {got} frame(s); at least {min} are needed to synthesize a waveform")]
    InsufficientFrames { got: usize, min: usize },

    /// The mel filterbank has a zero row or its Gram matrix is singular.
    #[error("mel filterbank is degenerate at row {row}")]
    DegenerateFilterbank { row: usize },

    #[error("{0}")]
    OutOfRange(RangeAnomaly),

    #[error("no source spectrogram loaded")]
    MissingSource,
}

impl PipelineError {
    pub(crate) fn invalid(name: &'static str, message: impl Into<String>) -> Self {
        PipelineError::InvalidParameter {
            name,
            message: message.into(),
        }
    }
}
