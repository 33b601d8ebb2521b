// Error types for the clap-to-find pipeline
//
// This module defines custom error types for audio capture and pipeline
// operations, providing structured error handling with numeric error codes
// suitable for reporting across the platform boundary.

mod audio;
mod pipeline;

pub use audio::{log_audio_error, AudioError, AudioErrorCodes};
pub use pipeline::{log_pipeline_error, PipelineError, PipelineErrorCodes};

/// Error codes for structured error reporting
///
/// This trait provides a standard way to get error codes and messages
/// from custom error types, enabling consistent error handling on both
/// sides of the JNI boundary.
pub trait ErrorCode {
    /// Get the numeric error code
    fn code(&self) -> i32;

    /// Get the human-readable error message
    fn message(&self) -> String;
}
