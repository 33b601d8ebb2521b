//! ClapPipeline - lifecycle of one listening session.
//!
//! ```text
//! AudioSource ──frames──> FramePool ──> analysis thread ──> TriggerSink
//!   (capture thread)     (rtrb SPSC)    (ClapDetector)   └─> PipelineEvent broadcast
//! ```
//!
//! `start` opens the source and spawns the analysis thread. `stop` releases
//! the device, joins the thread and reports how the session ended. Both are
//! safe to call from any thread and `stop` is idempotent.

use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tokio::sync::broadcast;

use crate::analysis::{
    spawn_analysis_thread, ClapDetector, ClapModel, ClassificationScore, ScoreSource,
    TriggerEvent,
};
use crate::audio::{AudioSource, CaptureParams, FramePool};
use crate::config::AppConfig;
use crate::error::{log_audio_error, AudioError, PipelineError};
use crate::trigger::TriggerSink;

/// Capacity of the event broadcast channel
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Poll interval used by `wait`
const WAIT_POLL: Duration = Duration::from_millis(5);

/// Everything the pipeline reports to subscribers
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    /// One analysis window was scored
    Score(ClassificationScore),
    /// A clap gesture was recognized
    Triggered(TriggerEvent),
    /// Total frames discarded so far under backpressure
    FramesDropped { total: u64 },
    /// The analysis thread exited; `error` is set when it stopped on a failure
    Stopped { error: Option<PipelineError> },
}

/// Live counters updated by the analysis thread
#[derive(Debug, Default)]
pub struct PipelineStats {
    frames_received: AtomicU64,
    frames_dropped: AtomicU64,
    windows_analyzed: AtomicU64,
    windows_skipped: AtomicU64,
    inference_fallbacks: AtomicU64,
    triggers: AtomicU64,
}

/// Point-in-time copy of `PipelineStats`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStatsSnapshot {
    pub frames_received: u64,
    pub frames_dropped: u64,
    pub windows_analyzed: u64,
    /// Windows scored 0 by warmup, silence or the impulse gate
    pub windows_skipped: u64,
    /// Windows whose inference failed or returned a non-finite score
    pub inference_fallbacks: u64,
    pub triggers: u64,
}

impl PipelineStats {
    pub(crate) fn record_frame(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_window(&self, source: ScoreSource) {
        self.windows_analyzed.fetch_add(1, Ordering::Relaxed);
        if source.is_skipped() {
            self.windows_skipped.fetch_add(1, Ordering::Relaxed);
        } else if source == ScoreSource::Fallback {
            self.inference_fallbacks.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_trigger(&self) {
        self.triggers.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn set_dropped(&self, total: u64) {
        self.frames_dropped.store(total, Ordering::Relaxed);
    }

    fn reset(&self) {
        for counter in [
            &self.frames_received,
            &self.frames_dropped,
            &self.windows_analyzed,
            &self.windows_skipped,
            &self.inference_fallbacks,
            &self.triggers,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> PipelineStatsSnapshot {
        PipelineStatsSnapshot {
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            windows_analyzed: self.windows_analyzed.load(Ordering::Relaxed),
            windows_skipped: self.windows_skipped.load(Ordering::Relaxed),
            inference_fallbacks: self.inference_fallbacks.load(Ordering::Relaxed),
            triggers: self.triggers.load(Ordering::Relaxed),
        }
    }
}

/// Resources owned by a running session
struct Session {
    source: Box<dyn AudioSource>,
    shutdown: Arc<AtomicBool>,
    analysis: JoinHandle<Result<(), PipelineError>>,
}

impl Session {
    /// Release the device, join the analysis thread and return its result
    ///
    /// When called from the analysis thread itself (a sink stopping the
    /// pipeline) the join is skipped; the raised shutdown flag ends the loop
    /// once the sink returns.
    fn finish(mut self) -> Result<(), PipelineError> {
        self.shutdown.store(true, Ordering::SeqCst);
        self.source.stop();
        if thread::current().id() == self.analysis.thread().id() {
            tracing::debug!("[ClapPipeline] Stopped from the analysis thread");
            return Ok(());
        }
        match self.analysis.join() {
            Ok(result) => result,
            Err(_) => Err(AudioError::StreamInterrupted {
                reason: "analysis thread panicked".to_string(),
            }
            .into()),
        }
    }
}

/// Real-time clap detection pipeline
///
/// # Example
/// ```ignore
/// let pipeline = ClapPipeline::new(config, Arc::new(HeuristicClapModel::new()), Arc::new(LogSink))?;
/// pipeline.start(audio::default_source())?;
/// // ... triggers are delivered to the sink
/// pipeline.stop()?;
/// ```
pub struct ClapPipeline {
    config: AppConfig,
    model: Arc<dyn ClapModel>,
    sink: Arc<dyn TriggerSink>,
    events: broadcast::Sender<PipelineEvent>,
    stats: Arc<PipelineStats>,
    session: Mutex<Option<Session>>,
}

impl ClapPipeline {
    /// Create an idle pipeline
    ///
    /// # Errors
    /// `PipelineError::InvalidConfig` if the configuration fails validation.
    pub fn new(
        config: AppConfig,
        model: Arc<dyn ClapModel>,
        sink: Arc<dyn TriggerSink>,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Ok(Self {
            config,
            model,
            sink,
            events,
            stats: Arc::new(PipelineStats::default()),
            session: Mutex::new(None),
        })
    }

    fn lock_session(&self) -> Result<MutexGuard<'_, Option<Session>>, PipelineError> {
        self.session.lock().map_err(|_| {
            AudioError::LockPoisoned {
                component: "pipeline session".to_string(),
            }
            .into()
        })
    }

    /// Open `source` and start detecting claps
    ///
    /// # Errors
    /// * `AudioError::AlreadyRunning` if a session is active
    /// * `AudioError::DeviceUnavailable` if the source cannot be opened; no
    ///   thread is left running and the device is released
    pub fn start(&self, mut source: Box<dyn AudioSource>) -> Result<(), PipelineError> {
        let mut session = self.lock_session()?;
        if session.is_some() {
            return Err(AudioError::AlreadyRunning.into());
        }

        let audio = &self.config.audio;
        let detector = ClapDetector::new(&self.config, Arc::clone(&self.model))?;
        let (producer, consumer) = FramePool::new(
            audio.queue_capacity,
            audio.frame_size,
            audio.backpressure,
            audio.max_backlog_frames,
        );
        self.stats.reset();

        let params = CaptureParams {
            sample_rate: audio.sample_rate,
            frame_size: audio.frame_size,
        };
        if let Err(err) = source.start(params, producer) {
            log_audio_error(&err, "ClapPipeline::start");
            source.stop();
            return Err(err.into());
        }

        let shutdown = Arc::new(AtomicBool::new(false));
        let analysis = match spawn_analysis_thread(
            consumer,
            detector,
            Arc::clone(&self.sink),
            self.events.clone(),
            Arc::clone(&self.stats),
            Arc::clone(&shutdown),
        ) {
            Ok(handle) => handle,
            Err(err) => {
                source.stop();
                return Err(err);
            }
        };

        tracing::info!(
            "[ClapPipeline] Listening via {} at {} Hz (window {}, hop {})",
            source.name(),
            audio.sample_rate,
            self.config.detection.window_size,
            self.config.detection.hop_size
        );

        *session = Some(Session {
            source,
            shutdown,
            analysis,
        });
        Ok(())
    }

    /// Stop the session and release the device
    ///
    /// Returns the error that ended the session, if it ended on one (for
    /// example `StreamInterrupted`). Calling `stop` on an idle pipeline is
    /// a no-op returning `Ok`.
    pub fn stop(&self) -> Result<(), PipelineError> {
        let session = self.lock_session()?.take();
        match session {
            Some(session) => {
                let result = session.finish();
                tracing::info!("[ClapPipeline] Stopped");
                result
            }
            None => Ok(()),
        }
    }

    /// Block until the session ends on its own, then clean it up
    ///
    /// Used with finite sources such as a clip; with a microphone this
    /// returns only after a capture error.
    pub fn wait(&self) -> Result<(), PipelineError> {
        loop {
            {
                let session = self.lock_session()?;
                match session.as_ref() {
                    None => return Ok(()),
                    Some(s) if s.analysis.is_finished() => break,
                    Some(_) => {}
                }
            }
            std::thread::sleep(WAIT_POLL);
        }
        self.stop()
    }

    /// True while the analysis thread is running
    pub fn is_running(&self) -> bool {
        self.lock_session()
            .map(|s| s.as_ref().is_some_and(|s| !s.analysis.is_finished()))
            .unwrap_or(false)
    }

    /// Receive scores, triggers, drop reports and the final stop event
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.events.subscribe()
    }

    pub fn stats(&self) -> PipelineStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }
}

impl Drop for ClapPipeline {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            log::warn!("[ClapPipeline] Session ended with error during drop: {}", err);
        }
    }
}
