// Analysis module - DSP pipeline from PCM frames to clap triggers
//
// Architecture:
// - ClapDetector: synchronous core, usable offline on a clip or live
// - AnalysisWorker: thread loop that consumes frames from the frame pool
// - Pipeline: WindowBuffer → FeatureExtractor → ClapClassifier → TemporalPatternMatcher
// - Output: per-window scores and triggers, sent to the TriggerSink and the
//   PipelineEvent broadcast

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tokio::sync::broadcast;

use crate::audio::{FrameConsumer, PcmFrame};
use crate::config::AppConfig;
use crate::error::{log_audio_error, log_pipeline_error, PipelineError};
use crate::pipeline::{PipelineEvent, PipelineStats};
use crate::trigger::TriggerSink;

pub mod classifier;
pub mod features;
pub mod impulse;
#[cfg(feature = "onnx")]
pub mod onnx;
pub mod pattern;
pub mod window;

pub use classifier::{
    ClapClassifier, ClapModel, ClassificationScore, FnClapModel, HeuristicClapModel, ScoreSource,
};
pub use features::{FeatureExtractor, FeatureVector, ScalarFeatures};
pub use impulse::{GateRejection, ImpulseGate};
#[cfg(feature = "onnx")]
pub use onnx::{ModelInput, OnnxClapModel};
pub use pattern::{match_scores, MatcherState, TemporalPatternMatcher, TriggerEvent};
pub use window::{AnalysisWindow, WindowBuffer};

/// Outcome of analysing one window
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowReport {
    pub score: ClassificationScore,
    pub source: ScoreSource,
    pub trigger: Option<TriggerEvent>,
}

/// Synchronous clap detection core
///
/// Owns one instance of every per-window stage and the scratch buffers
/// they share. Feed frames in capture order; each complete window is
/// scored and run through the pattern matcher.
pub struct ClapDetector {
    window_buffer: WindowBuffer,
    extractor: FeatureExtractor,
    classifier: ClapClassifier,
    matcher: TemporalPatternMatcher,
    window: AnalysisWindow,
    features: FeatureVector,
    frame_size: usize,
}

impl ClapDetector {
    /// Build a detector from a validated configuration
    ///
    /// # Errors
    /// `PipelineError::InvalidConfig` if the configuration fails validation.
    pub fn new(config: &AppConfig, model: Arc<dyn ClapModel>) -> Result<Self, PipelineError> {
        config.validate()?;
        let detection = &config.detection;

        Ok(Self {
            window_buffer: WindowBuffer::new(detection.window_size, detection.hop_size),
            extractor: FeatureExtractor::new(config.audio.sample_rate, detection),
            classifier: ClapClassifier::new(model, &config.classifier),
            matcher: TemporalPatternMatcher::new(config.pattern.clone()),
            window: AnalysisWindow {
                start_sample: 0,
                samples: Vec::with_capacity(detection.window_size),
            },
            features: FeatureVector::default(),
            frame_size: config.audio.frame_size,
        })
    }

    /// Process one frame, calling `on_window` for every window it completes
    pub fn process_frame<F>(&mut self, frame: &PcmFrame, mut on_window: F) -> Result<(), PipelineError>
    where
        F: FnMut(&WindowReport),
    {
        self.window_buffer.push(frame);

        while self.window_buffer.pop_into(&mut self.window) {
            if let Err(err) = self.extractor.extract_into(&self.window, &mut self.features) {
                debug_assert!(false, "window buffer produced a malformed window: {}", err);
                return Err(err);
            }

            let (score, source) = self.classifier.classify(&self.features);
            let trigger = self.matcher.observe(&score);
            on_window(&WindowReport {
                score,
                source,
                trigger,
            });
        }

        Ok(())
    }

    /// Run a whole clip through the detector, starting at sample 0
    ///
    /// The clip is cut into `frame_size` frames like a capture stream would
    /// be; a trailing partial frame is processed as-is.
    pub fn process_clip(&mut self, samples: &[f32]) -> Result<Vec<WindowReport>, PipelineError> {
        let mut reports = Vec::new();
        let mut frame = PcmFrame::new(0, Vec::with_capacity(self.frame_size));

        for (n, chunk) in samples.chunks(self.frame_size.max(1)).enumerate() {
            frame.start_sample = (n * self.frame_size) as u64;
            frame.samples.clear();
            frame.samples.extend_from_slice(chunk);
            self.process_frame(&frame, |report| reports.push(*report))?;
        }

        Ok(reports)
    }

    /// Forget buffered samples, matcher state and warmup progress
    pub fn reset(&mut self) {
        self.window_buffer.reset();
        self.classifier.reset();
        self.matcher.reset();
    }

    pub fn matcher_state(&self) -> MatcherState {
        self.matcher.state()
    }

    /// Gaps seen in the frame sequence since construction
    pub fn discontinuities(&self) -> u64 {
        self.window_buffer.discontinuities()
    }
}

/// Idle poll interval when the frame queue is empty
const IDLE_POLL: Duration = Duration::from_millis(1);

/// Analysis thread state
struct AnalysisWorker {
    consumer: FrameConsumer,
    detector: ClapDetector,
    sink: Arc<dyn TriggerSink>,
    events: broadcast::Sender<PipelineEvent>,
    stats: Arc<PipelineStats>,
    shutdown: Arc<AtomicBool>,
    reported_drops: u64,
}

impl AnalysisWorker {
    fn run(mut self) -> Result<(), PipelineError> {
        tracing::info!("[AnalysisThread] Starting analysis loop");

        let result = self.run_loop();
        match &result {
            Ok(()) => tracing::info!("[AnalysisThread] Analysis loop finished"),
            Err(err) => log_pipeline_error(err, "analysis thread"),
        }

        let _ = self.events.send(PipelineEvent::Stopped {
            error: result.as_ref().err().cloned(),
        });
        result
    }

    fn run_loop(&mut self) -> Result<(), PipelineError> {
        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                tracing::info!("[AnalysisThread] Shutdown requested, exiting");
                return Ok(());
            }

            if let Some(err) = self.consumer.overflow() {
                log_audio_error(&err, "frame queue");
                return Err(err.into());
            }

            let frame = match self.consumer.pop() {
                Some(frame) => frame,
                None => {
                    // Queue drained: surface capture errors, then check for close
                    if let Some(err) = self.consumer.take_error() {
                        return Err(err.into());
                    }
                    if self.consumer.is_closed() {
                        tracing::info!("[AnalysisThread] Capture closed and queue drained");
                        return Ok(());
                    }
                    thread::sleep(IDLE_POLL);
                    continue;
                }
            };

            self.stats.record_frame();
            self.report_drops();

            let result = self.detector.process_frame(&frame, |report| {
                self.stats.record_window(report.source);
                tracing::trace!(
                    timestamp_ms = report.score.timestamp_ms,
                    score = report.score.score,
                    source = ?report.source,
                    "window scored"
                );
                let _ = self.events.send(PipelineEvent::Score(report.score));

                if let Some(trigger) = report.trigger {
                    self.stats.record_trigger();
                    self.sink.on_trigger(&trigger);
                    let _ = self.events.send(PipelineEvent::Triggered(trigger));
                }
            });

            self.consumer.recycle(frame);
            result?;
        }
    }

    fn report_drops(&mut self) {
        let dropped = self.consumer.dropped_frames();
        if dropped != self.reported_drops {
            self.reported_drops = dropped;
            self.stats.set_dropped(dropped);
            tracing::warn!("[AnalysisThread] {} frames dropped so far", dropped);
            let _ = self.events.send(PipelineEvent::FramesDropped { total: dropped });
        }
    }
}

/// Spawn the analysis thread
///
/// The thread runs until `shutdown` is raised, the capture side closes and
/// the queue drains, or a capture error is reported. It always emits a
/// final `PipelineEvent::Stopped` before exiting.
pub fn spawn_analysis_thread(
    consumer: FrameConsumer,
    detector: ClapDetector,
    sink: Arc<dyn TriggerSink>,
    events: broadcast::Sender<PipelineEvent>,
    stats: Arc<PipelineStats>,
    shutdown: Arc<AtomicBool>,
) -> Result<JoinHandle<Result<(), PipelineError>>, PipelineError> {
    let worker = AnalysisWorker {
        consumer,
        detector,
        sink,
        events,
        stats,
        shutdown,
        reported_drops: 0,
    };

    thread::Builder::new()
        .name("clap-analysis".to_string())
        .spawn(move || worker.run())
        .map_err(|err| PipelineError::Audio(err.into()))
}

#[cfg(test)]
mod tests;
