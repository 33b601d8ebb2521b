// Audio module - PCM capture and the lock-free hand-off to analysis

pub mod backend;
pub mod buffer_pool;
pub mod frame;
pub mod source;
pub mod wav;

// Re-export commonly used types for convenience
pub use backend::synthetic::{ClipEnd, Pacing};
pub use backend::{default_source, SyntheticSource};
pub use buffer_pool::{ErrorReporter, FrameConsumer, FramePool, FrameProducer};
pub use frame::PcmFrame;
pub use source::{AudioSource, CaptureParams};
pub use wav::{load_wav, WavClip};

#[cfg(not(target_os = "android"))]
pub use backend::cpal::CpalSource;
#[cfg(target_os = "android")]
pub use backend::oboe::OboeSource;
