use super::*;
use crate::audio::FramePool;
use crate::config::BackpressurePolicy;
use crate::error::AudioError;
use crate::testing::signals::{self, ImpulseShape};
use std::sync::atomic::AtomicUsize;

fn peak_model() -> Arc<dyn ClapModel> {
    Arc::new(FnClapModel::new("peak", |f: &FeatureVector| {
        if f.scalars.peak > 0.5 {
            0.9
        } else {
            0.0
        }
    }))
}

fn two_clap_clip() -> Vec<f32> {
    signals::impulse_clip(16_000, 600, &[100, 300], 5.0, 0.9, ImpulseShape::Rectangular)
}

struct CountingSink(AtomicUsize);

impl TriggerSink for CountingSink {
    fn on_trigger(&self, _event: &TriggerEvent) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn test_detector_triggers_once_for_two_claps() {
    let mut detector = ClapDetector::new(&AppConfig::default(), peak_model()).unwrap();
    let reports = detector.process_clip(&two_clap_clip()).unwrap();

    let triggers: Vec<TriggerEvent> = reports.iter().filter_map(|r| r.trigger).collect();
    assert_eq!(triggers.len(), 1, "triggers: {:?}", triggers);
    let trigger = triggers[0];
    assert!(trigger.timestamp_ms > 100 && trigger.timestamp_ms <= 300);
    assert!(trigger.first_clap_ms <= 100);
    assert_eq!(trigger.clap_count, 2);
}

#[test]
fn test_detector_window_count_and_timestamps() {
    let mut detector = ClapDetector::new(&AppConfig::default(), peak_model()).unwrap();
    let reports = detector.process_clip(&signals::silence(16_000, 600)).unwrap();

    // (9600 - 512) / 256 + 1
    assert_eq!(reports.len(), 36);
    assert!(reports.iter().all(|r| r.score.score == 0.0));
    assert!(reports.iter().all(|r| r.source == ScoreSource::Silence));
    let times: Vec<u64> = reports.iter().map(|r| r.score.timestamp_ms).collect();
    assert_eq!(times[0], 0);
    assert_eq!(times[1], 16);
    assert!(times.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn test_single_clap_does_not_trigger() {
    let mut detector = ClapDetector::new(&AppConfig::default(), peak_model()).unwrap();
    let clip = signals::impulse_clip(16_000, 1000, &[200], 5.0, 0.9, ImpulseShape::Rectangular);
    let reports = detector.process_clip(&clip).unwrap();

    assert!(reports.iter().all(|r| r.trigger.is_none()));
    assert!(reports.iter().any(|r| r.score.score > 0.5));
    assert_eq!(detector.matcher_state(), MatcherState::Idle);
}

#[test]
fn test_detector_resyncs_after_dropped_frames() {
    let mut detector = ClapDetector::new(&AppConfig::default(), peak_model()).unwrap();
    let mut starts = Vec::new();

    detector
        .process_frame(&PcmFrame::new(0, vec![0.0; 400]), |r| {
            starts.push(r.score.timestamp_ms)
        })
        .unwrap();
    // Samples 400..1600 never arrived
    detector
        .process_frame(&PcmFrame::new(1600, vec![0.0; 512]), |r| {
            starts.push(r.score.timestamp_ms)
        })
        .unwrap();

    assert_eq!(starts, vec![100]);
    assert_eq!(detector.discontinuities(), 1);
}

#[test]
fn test_detector_rejects_invalid_config() {
    let mut config = AppConfig::default();
    config.detection.hop_size = 0;
    assert!(matches!(
        ClapDetector::new(&config, peak_model()),
        Err(PipelineError::InvalidConfig { .. })
    ));
}

#[test]
fn test_reset_restarts_detection() {
    let mut detector = ClapDetector::new(&AppConfig::default(), peak_model()).unwrap();
    let clip = two_clap_clip();
    let first = detector.process_clip(&clip).unwrap();
    detector.reset();
    let second = detector.process_clip(&clip).unwrap();
    assert_eq!(first, second);
}

fn spawn_worker(
    config: &AppConfig,
    consumer: FrameConsumer,
) -> (
    JoinHandle<Result<(), PipelineError>>,
    Arc<CountingSink>,
    broadcast::Receiver<PipelineEvent>,
    Arc<AtomicBool>,
) {
    let detector = ClapDetector::new(config, peak_model()).unwrap();
    let sink = Arc::new(CountingSink(AtomicUsize::new(0)));
    let (events, rx) = broadcast::channel(1024);
    let shutdown = Arc::new(AtomicBool::new(false));
    let handle = spawn_analysis_thread(
        consumer,
        detector,
        sink.clone(),
        events,
        Arc::new(PipelineStats::default()),
        Arc::clone(&shutdown),
    )
    .unwrap();
    (handle, sink, rx, shutdown)
}

fn drain(rx: &mut broadcast::Receiver<PipelineEvent>) -> Vec<PipelineEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[test]
fn test_worker_drains_queue_and_stops_on_close() {
    let config = AppConfig::default();
    let (mut producer, consumer) = FramePool::new(
        128,
        config.audio.frame_size,
        BackpressurePolicy::DropOldest,
        128,
    );
    // 600ms is 60 frames; fits in the pool without drops
    producer.write(&two_clap_clip());
    drop(producer);

    let (handle, sink, mut rx, _shutdown) = spawn_worker(&config, consumer);
    assert!(handle.join().unwrap().is_ok());
    assert_eq!(sink.0.load(Ordering::SeqCst), 1);

    let events = drain(&mut rx);
    let scores = events
        .iter()
        .filter(|e| matches!(e, PipelineEvent::Score(_)))
        .count();
    assert_eq!(scores, 36);
    assert!(events
        .iter()
        .any(|e| matches!(e, PipelineEvent::Triggered(_))));
    assert_eq!(
        events.last(),
        Some(&PipelineEvent::Stopped { error: None })
    );
}

#[test]
fn test_worker_surfaces_capture_error() {
    let config = AppConfig::default();
    let (mut producer, consumer) =
        FramePool::new(16, config.audio.frame_size, BackpressurePolicy::DropOldest, 16);
    producer.write(&vec![0.0; 800]);
    producer.error_reporter().report(AudioError::StreamInterrupted {
        reason: "incoming call".to_string(),
    });

    let (handle, _sink, mut rx, _shutdown) = spawn_worker(&config, consumer);
    let result = handle.join().unwrap();
    assert!(matches!(
        result,
        Err(PipelineError::Audio(AudioError::StreamInterrupted { .. }))
    ));
    assert!(matches!(
        drain(&mut rx).last(),
        Some(PipelineEvent::Stopped { error: Some(_) })
    ));
    drop(producer);
}

#[test]
fn test_worker_fails_on_overflow() {
    let config = AppConfig::default();
    let (mut producer, consumer) =
        FramePool::new(2, config.audio.frame_size, BackpressurePolicy::FailOnOverflow, 2);
    producer.write(&vec![0.0; config.audio.frame_size * 3]);

    let (handle, _sink, _rx, _shutdown) = spawn_worker(&config, consumer);
    assert!(matches!(
        handle.join().unwrap(),
        Err(PipelineError::Audio(AudioError::QueueOverflow { capacity: 2 }))
    ));
    drop(producer);
}

#[test]
fn test_worker_honours_shutdown_flag() {
    let config = AppConfig::default();
    let (producer, consumer) =
        FramePool::new(16, config.audio.frame_size, BackpressurePolicy::DropOldest, 16);

    let (handle, _sink, _rx, shutdown) = spawn_worker(&config, consumer);
    thread::sleep(Duration::from_millis(20));
    assert!(!handle.is_finished());

    shutdown.store(true, Ordering::SeqCst);
    assert!(handle.join().unwrap().is_ok());
    drop(producer);
}
