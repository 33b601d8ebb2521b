//! Android microphone capture through oboe (AAudio / OpenSL ES)
//!
//! The input callback runs on a realtime thread owned by the platform, so
//! it only copies samples into the frame pool. No locks, no allocation.

use oboe::{
    AudioInputCallback, AudioInputStreamSafe, AudioStream, AudioStreamBuilder, DataCallbackResult,
    Input, InputPreset, Mono, PerformanceMode, SharingMode,
};

use super::CaptureThread;
use crate::audio::buffer_pool::{ErrorReporter, FrameProducer};
use crate::audio::source::{AudioSource, CaptureParams};
use crate::error::AudioError;

/// Realtime input callback that forwards samples into the frame pool
struct InputCallback {
    producer: FrameProducer,
    reporter: ErrorReporter,
}

impl AudioInputCallback for InputCallback {
    type FrameType = (f32, Mono);

    fn on_error_before_close(&mut self, _stream: &mut dyn AudioInputStreamSafe, error: oboe::Error) {
        self.reporter.report(AudioError::StreamInterrupted {
            reason: format!("{:?}", error),
        });
    }

    fn on_audio_ready(
        &mut self,
        _stream: &mut dyn AudioInputStreamSafe,
        frames: &[f32],
    ) -> DataCallbackResult {
        if self.producer.is_closed() {
            return DataCallbackResult::Stop;
        }
        self.producer.write(frames);
        DataCallbackResult::Continue
    }
}

/// Microphone source using an oboe input stream
#[derive(Default)]
pub struct OboeSource {
    capture: Option<CaptureThread>,
}

impl OboeSource {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AudioSource for OboeSource {
    fn name(&self) -> &str {
        "oboe"
    }

    fn start(&mut self, params: CaptureParams, producer: FrameProducer) -> Result<(), AudioError> {
        if self.capture.is_some() {
            return Err(AudioError::AlreadyRunning);
        }
        if !crate::android::context_ready() {
            return Err(AudioError::ContextNotInitialized);
        }

        let capture = CaptureThread::spawn("clap-capture", move || {
            let reporter = producer.error_reporter();
            let callback = InputCallback { producer, reporter };

            let mut stream = AudioStreamBuilder::default()
                .set_performance_mode(PerformanceMode::LowLatency)
                .set_sharing_mode(SharingMode::Exclusive)
                .set_input_preset(InputPreset::VoiceRecognition)
                .set_direction::<Input>()
                .set_sample_rate(params.sample_rate as i32)
                .set_channel_count::<Mono>()
                .set_format::<f32>()
                .set_callback(callback)
                .open_stream()
                .map_err(|e| AudioError::DeviceUnavailable {
                    reason: format!("Input stream: {:?}", e),
                })?;

            stream.start().map_err(|e| AudioError::DeviceUnavailable {
                reason: format!("Failed to start input stream: {:?}", e),
            })?;

            log::info!(
                "[OboeSource] Input stream started at {} Hz",
                params.sample_rate
            );
            Ok(stream)
        })?;

        self.capture = Some(capture);
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(capture) = self.capture.take() {
            capture.shutdown();
            log::info!("[OboeSource] Capture stopped");
        }
    }

    fn is_running(&self) -> bool {
        self.capture.is_some()
    }
}

impl Drop for OboeSource {
    fn drop(&mut self) {
        self.stop();
    }
}
