// Pipeline error types and constants

use crate::error::{AudioError, ErrorCode};
use log::error;
use std::fmt;

/// Pipeline error code constants
///
/// Error code range: 2001-2004. Wrapped audio errors keep their own
/// 1001-1008 codes.
pub struct PipelineErrorCodes {}

impl PipelineErrorCodes {
    /// Classifier model could not be loaded
    pub const MODEL_UNAVAILABLE: i32 = 2001;

    /// Configuration rejected by validation
    pub const INVALID_CONFIG: i32 = 2002;

    /// Analysis window violated the window-buffer invariants
    pub const MALFORMED_WINDOW: i32 = 2003;

    /// Model inference failed for a single window
    pub const INFERENCE_FAILED: i32 = 2004;
}

/// Log a pipeline error with structured context
pub fn log_pipeline_error(err: &PipelineError, context: &str) {
    error!(
        "Pipeline error in {}: code={}, component=ClapPipeline, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Errors raised while building or running the detection pipeline
///
/// `ModelUnavailable` and `InvalidConfig` are fatal at startup.
/// `InferenceFailed` is per-window and handled locally by scoring the
/// window 0. `MalformedWindow` signals a programming error.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineError {
    /// Model handle could not be loaded
    ModelUnavailable { reason: String },

    /// Configuration field failed validation
    InvalidConfig { field: String, reason: String },

    /// Window length did not match the configured window size
    MalformedWindow { expected: usize, actual: usize },

    /// Inference failed for one window
    InferenceFailed { reason: String },

    /// Audio capture failure
    Audio(AudioError),
}

impl PipelineError {
    pub(crate) fn invalid_config(field: &str, reason: impl Into<String>) -> Self {
        PipelineError::InvalidConfig {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

impl ErrorCode for PipelineError {
    fn code(&self) -> i32 {
        match self {
            PipelineError::ModelUnavailable { .. } => PipelineErrorCodes::MODEL_UNAVAILABLE,
            PipelineError::InvalidConfig { .. } => PipelineErrorCodes::INVALID_CONFIG,
            PipelineError::MalformedWindow { .. } => PipelineErrorCodes::MALFORMED_WINDOW,
            PipelineError::InferenceFailed { .. } => PipelineErrorCodes::INFERENCE_FAILED,
            PipelineError::Audio(inner) => inner.code(),
        }
    }

    fn message(&self) -> String {
        match self {
            PipelineError::ModelUnavailable { reason } => {
                format!("Classifier model unavailable: {}", reason)
            }
            PipelineError::InvalidConfig { field, reason } => {
                format!("Invalid configuration for {}: {}", field, reason)
            }
            PipelineError::MalformedWindow { expected, actual } => {
                format!(
                    "Malformed analysis window: expected {} samples, got {}",
                    expected, actual
                )
            }
            PipelineError::InferenceFailed { reason } => {
                format!("Inference failed: {}", reason)
            }
            PipelineError::Audio(inner) => inner.message(),
        }
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::Audio(inner) => inner.fmt(f),
            _ => write!(
                f,
                "PipelineError::{:?} (code {}): {}",
                self,
                self.code(),
                self.message()
            ),
        }
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PipelineError::Audio(inner) => Some(inner),
            _ => None,
        }
    }
}

impl From<AudioError> for PipelineError {
    fn from(err: AudioError) -> Self {
        PipelineError::Audio(err)
    }
}
