// SyntheticSource - deterministic audio source for tests and offline runs
//
// Feeds a pre-recorded clip through the same frame pool a microphone would
// use. Chunks are pushed in `chunk_size` pieces so re-framing is exercised,
// either paced at real time or as fast as the consumer accepts them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::audio::buffer_pool::FrameProducer;
use crate::audio::source::{AudioSource, CaptureParams};
use crate::error::AudioError;

/// How the clip is delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pacing {
    /// Sleep so samples arrive at the capture sample rate
    Realtime,
    /// Push as fast as analysis keeps up, staying inside the backlog bound
    /// so no frame is dropped
    AsFastAsPossible,
}

/// What happens after the last sample of the clip
#[derive(Debug, Clone, PartialEq)]
pub enum ClipEnd {
    /// Close the stream; the pipeline drains and stops cleanly
    Close,
    /// Report `StreamInterrupted` with this reason, then close
    Interrupt(String),
    /// Keep the stream open, feeding silence until stopped
    HoldOpen,
}

pub struct SyntheticSource {
    clip: Arc<Vec<f32>>,
    chunk_size: usize,
    pacing: Pacing,
    end: ClipEnd,
    open_error: Option<AudioError>,
    running: Arc<AtomicBool>,
    cancel: Arc<AtomicBool>,
    feeder: Option<JoinHandle<()>>,
}

impl SyntheticSource {
    /// Deliver `clip` once as fast as possible, then close
    pub fn from_clip(clip: Vec<f32>) -> Self {
        Self {
            clip: Arc::new(clip),
            chunk_size: 256,
            pacing: Pacing::AsFastAsPossible,
            end: ClipEnd::Close,
            open_error: None,
            running: Arc::new(AtomicBool::new(false)),
            cancel: Arc::new(AtomicBool::new(false)),
            feeder: None,
        }
    }

    /// A source whose `start` always fails with `DeviceUnavailable`
    pub fn unavailable(reason: impl Into<String>) -> Self {
        let mut source = Self::from_clip(Vec::new());
        source.open_error = Some(AudioError::DeviceUnavailable {
            reason: reason.into(),
        });
        source
    }

    pub fn with_pacing(mut self, pacing: Pacing) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn with_end(mut self, end: ClipEnd) -> Self {
        self.end = end;
        self
    }

    /// Size of each simulated device callback
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// True while the feeder thread is delivering samples
    pub fn is_feeding(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

struct Feeder {
    clip: Arc<Vec<f32>>,
    chunk_size: usize,
    pacing: Pacing,
    end: ClipEnd,
    sample_rate: u32,
    running: Arc<AtomicBool>,
    cancel: Arc<AtomicBool>,
}

impl Feeder {
    fn run(self, mut producer: FrameProducer) {
        let started = Instant::now();
        let mut delivered = 0usize;

        for chunk in self.clip.chunks(self.chunk_size) {
            if self.cancel.load(Ordering::Acquire) || producer.is_closed() {
                break;
            }
            match self.pacing {
                Pacing::Realtime => {
                    self.pace(started, delivered);
                    producer.write(chunk);
                }
                Pacing::AsFastAsPossible => {
                    if !producer.write_blocking(chunk, &self.cancel) {
                        break;
                    }
                }
            }
            delivered += chunk.len();
        }

        if !self.cancel.load(Ordering::Acquire) {
            match &self.end {
                ClipEnd::Close => {}
                ClipEnd::Interrupt(reason) => {
                    producer.error_reporter().report(AudioError::StreamInterrupted {
                        reason: reason.clone(),
                    });
                }
                ClipEnd::HoldOpen => {
                    let silence = vec![0.0f32; self.chunk_size];
                    while !self.cancel.load(Ordering::Acquire) && !producer.is_closed() {
                        self.pace(started, delivered);
                        producer.write(&silence);
                        delivered += silence.len();
                    }
                }
            }
        }

        log::debug!(
            "[SyntheticSource] Feeder finished after {} samples",
            delivered
        );
        self.running.store(false, Ordering::SeqCst);
        // Dropping the producer closes the stream
    }

    fn pace(&self, started: Instant, delivered: usize) {
        let due = Duration::from_secs_f64(delivered as f64 / self.sample_rate as f64);
        let elapsed = started.elapsed();
        if due > elapsed {
            std::thread::sleep(due - elapsed);
        }
    }
}

impl AudioSource for SyntheticSource {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn start(&mut self, params: CaptureParams, producer: FrameProducer) -> Result<(), AudioError> {
        if let Some(err) = &self.open_error {
            return Err(err.clone());
        }
        if self.feeder.is_some() {
            return Err(AudioError::AlreadyRunning);
        }

        self.cancel.store(false, Ordering::SeqCst);
        self.running.store(true, Ordering::SeqCst);

        let feeder = Feeder {
            clip: Arc::clone(&self.clip),
            chunk_size: self.chunk_size,
            pacing: self.pacing,
            end: self.end.clone(),
            sample_rate: params.sample_rate.max(1),
            running: Arc::clone(&self.running),
            cancel: Arc::clone(&self.cancel),
        };

        let handle = std::thread::Builder::new()
            .name("clap-synthetic".to_string())
            .spawn(move || feeder.run(producer));
        match handle {
            Ok(handle) => {
                self.feeder = Some(handle);
                Ok(())
            }
            Err(err) => {
                self.running.store(false, Ordering::SeqCst);
                Err(err.into())
            }
        }
    }

    fn stop(&mut self) {
        self.cancel.store(true, Ordering::SeqCst);
        if let Some(handle) = self.feeder.take() {
            if handle.join().is_err() {
                log::error!("[SyntheticSource] Feeder thread panicked");
            }
        }
        self.running.store(false, Ordering::SeqCst);
    }

    fn is_running(&self) -> bool {
        self.feeder.is_some()
    }
}

impl Drop for SyntheticSource {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::buffer_pool::FramePool;
    use crate::config::BackpressurePolicy;

    fn params() -> CaptureParams {
        CaptureParams {
            sample_rate: 16_000,
            frame_size: 4,
        }
    }

    #[test]
    fn test_delivers_whole_clip_in_order() {
        let clip: Vec<f32> = (0..40).map(|i| i as f32).collect();
        let (producer, mut consumer) =
            FramePool::new(4, 4, BackpressurePolicy::DropOldest, 4);

        let mut source = SyntheticSource::from_clip(clip.clone()).with_chunk_size(3);
        source.start(params(), producer).unwrap();

        let mut received = Vec::new();
        while !consumer.is_closed() {
            match consumer.pop() {
                Some(frame) => {
                    assert_eq!(frame.start_sample, received.len() as u64);
                    received.extend_from_slice(&frame.samples);
                    consumer.recycle(frame);
                }
                None => std::thread::sleep(Duration::from_millis(1)),
            }
        }
        source.stop();

        assert_eq!(received, clip);
        assert_eq!(consumer.dropped_frames(), 0);
    }

    #[test]
    fn test_unavailable_source_fails_to_start() {
        let (producer, _consumer) = FramePool::new(4, 4, BackpressurePolicy::DropOldest, 4);
        let mut source = SyntheticSource::unavailable("no mic");
        let err = source.start(params(), producer).unwrap_err();
        assert!(matches!(err, AudioError::DeviceUnavailable { .. }));
        assert!(!source.is_running());
    }

    #[test]
    fn test_interrupt_is_reported() {
        let (producer, mut consumer) = FramePool::new(4, 4, BackpressurePolicy::DropOldest, 4);
        let mut source = SyntheticSource::from_clip(vec![0.0; 8])
            .with_end(ClipEnd::Interrupt("device unplugged".to_string()));
        source.start(params(), producer).unwrap();

        while !consumer.is_closed() {
            if let Some(frame) = consumer.pop() {
                consumer.recycle(frame);
            }
        }
        source.stop();

        assert!(matches!(
            consumer.take_error(),
            Some(AudioError::StreamInterrupted { .. })
        ));
    }

    #[test]
    fn test_stop_cancels_held_stream() {
        let (producer, _consumer) = FramePool::new(64, 4, BackpressurePolicy::DropOldest, 64);
        let mut source = SyntheticSource::from_clip(vec![0.0; 8])
            .with_pacing(Pacing::Realtime)
            .with_end(ClipEnd::HoldOpen);
        source.start(params(), producer).unwrap();
        assert!(source.is_running());

        source.stop();
        source.stop();
        assert!(!source.is_running());
        assert!(!source.is_feeding());
    }
}
