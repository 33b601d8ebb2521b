// AudioSource - abstraction over anything that produces mono PCM frames

use super::buffer_pool::FrameProducer;
use crate::error::AudioError;

/// Capture parameters negotiated with a source at start
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureParams {
    pub sample_rate: u32,
    pub frame_size: usize,
}

/// A producer of PCM frames
///
/// `start` hands the source the capture end of the frame pool. The source
/// owns it until `stop`, and dropping it tells the analysis thread that no
/// more frames will arrive. Device failures after a successful start are
/// reported through `FrameProducer::error_reporter`.
///
/// Implementations must release the device on `stop` and on drop, and
/// `stop` must be safe to call more than once.
pub trait AudioSource: Send {
    /// Human-readable backend name for logs
    fn name(&self) -> &str;

    /// Open the device and begin delivering frames into `producer`
    ///
    /// # Errors
    /// * `AudioError::AlreadyRunning` if the source is already capturing
    /// * `AudioError::DeviceUnavailable` if the microphone cannot be opened
    fn start(&mut self, params: CaptureParams, producer: FrameProducer) -> Result<(), AudioError>;

    /// Stop delivering frames and release the device
    fn stop(&mut self);

    fn is_running(&self) -> bool;
}

impl<S: AudioSource + ?Sized> AudioSource for Box<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn start(&mut self, params: CaptureParams, producer: FrameProducer) -> Result<(), AudioError> {
        (**self).start(params, producer)
    }

    fn stop(&mut self) {
        (**self).stop()
    }

    fn is_running(&self) -> bool {
        (**self).is_running()
    }
}
