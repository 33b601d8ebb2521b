// Audio capture error types and constants

use crate::error::ErrorCode;
use log::error;
use std::fmt;

/// Audio error code constants
///
/// Single source of truth for the numeric codes reported to the host
/// application when capture fails.
///
/// Error code range: 1001-1008
pub struct AudioErrorCodes {}

impl AudioErrorCodes {
    /// Microphone could not be opened (in use, permission revoked, missing)
    pub const DEVICE_UNAVAILABLE: i32 = 1001;

    /// Capture stopped unexpectedly while the session was running
    pub const STREAM_INTERRUPTED: i32 = 1002;

    /// Capture session is already running
    pub const ALREADY_RUNNING: i32 = 1003;

    /// Capture session is not running
    pub const NOT_RUNNING: i32 = 1004;

    /// Frame queue overflowed under the fail-on-overflow policy
    pub const QUEUE_OVERFLOW: i32 = 1005;

    /// Mutex/RwLock was poisoned
    pub const LOCK_POISONED: i32 = 1006;

    /// Android context was not initialized before capture start
    pub const CONTEXT_NOT_INITIALIZED: i32 = 1007;

    /// Device offers no sample format the pipeline can consume
    pub const UNSUPPORTED_FORMAT: i32 = 1008;
}

/// Log an audio error with structured context
///
/// Logs the numeric code, the component and the message together so the
/// line can be grepped out of logcat. Never panics.
pub fn log_audio_error(err: &AudioError, context: &str) {
    error!(
        "Audio error in {}: code={}, component=AudioSource, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Audio-related errors
///
/// These errors cover microphone acquisition, stream lifetime and the
/// hand-off queue between the capture callback and the analysis thread.
///
/// Error code range: 1001-1008
#[derive(Debug, Clone, PartialEq)]
pub enum AudioError {
    /// Microphone could not be opened
    DeviceUnavailable { reason: String },

    /// Capture stopped unexpectedly (call interruption, device unplugged)
    StreamInterrupted { reason: String },

    /// Capture session is already running
    AlreadyRunning,

    /// Capture session is not running
    NotRunning,

    /// Frame queue full while running with the fail-on-overflow policy
    QueueOverflow { capacity: usize },

    /// Mutex/RwLock was poisoned
    LockPoisoned { component: String },

    /// Android context was not initialized before capture start
    ContextNotInitialized,

    /// Device sample format not supported
    UnsupportedFormat { details: String },
}

impl ErrorCode for AudioError {
    fn code(&self) -> i32 {
        match self {
            AudioError::DeviceUnavailable { .. } => AudioErrorCodes::DEVICE_UNAVAILABLE,
            AudioError::StreamInterrupted { .. } => AudioErrorCodes::STREAM_INTERRUPTED,
            AudioError::AlreadyRunning => AudioErrorCodes::ALREADY_RUNNING,
            AudioError::NotRunning => AudioErrorCodes::NOT_RUNNING,
            AudioError::QueueOverflow { .. } => AudioErrorCodes::QUEUE_OVERFLOW,
            AudioError::LockPoisoned { .. } => AudioErrorCodes::LOCK_POISONED,
            AudioError::ContextNotInitialized => AudioErrorCodes::CONTEXT_NOT_INITIALIZED,
            AudioError::UnsupportedFormat { .. } => AudioErrorCodes::UNSUPPORTED_FORMAT,
        }
    }

    fn message(&self) -> String {
        match self {
            AudioError::DeviceUnavailable { reason } => {
                format!("Microphone unavailable: {}", reason)
            }
            AudioError::StreamInterrupted { reason } => {
                format!("Audio stream interrupted: {}", reason)
            }
            AudioError::AlreadyRunning => {
                "Capture already running. Call stop() first.".to_string()
            }
            AudioError::NotRunning => "Capture not running. Call start() first.".to_string(),
            AudioError::QueueOverflow { capacity } => {
                format!(
                    "Frame queue overflowed (capacity {} frames); analysis cannot keep up",
                    capacity
                )
            }
            AudioError::LockPoisoned { component } => {
                format!("Lock poisoned on {}", component)
            }
            AudioError::ContextNotInitialized => {
                "Android context not initialized. Load the native library first.".to_string()
            }
            AudioError::UnsupportedFormat { details } => {
                format!("Unsupported sample format: {}", details)
            }
        }
    }
}

impl fmt::Display for AudioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "AudioError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for AudioError {}

impl From<std::io::Error> for AudioError {
    fn from(err: std::io::Error) -> Self {
        AudioError::DeviceUnavailable {
            reason: err.to_string(),
        }
    }
}
