// FramePool - lock-free frame hand-off between capture and analysis
//
// Two SPSC ring buffers carry pre-allocated sample buffers around a loop:
// - DATA queue: capture side pushes filled PcmFrames, analysis side pops them
// - POOL queue: analysis side returns empty buffers, capture side reuses them
//
// The capture side never allocates after construction. When it runs out of
// pooled buffers the frame is dropped and counted (DropOldest) or the
// overflow flag is raised (FailOnOverflow). The analysis side enforces the
// backlog bound by discarding the oldest queued frames.

use rtrb::{Consumer, Producer, PushError, RingBuffer};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::frame::PcmFrame;
use crate::config::BackpressurePolicy;
use crate::error::AudioError;

/// Poll interval used by `write_blocking` while waiting for a free buffer
const BLOCKING_POLL: Duration = Duration::from_millis(1);

/// State shared by both ends of the queue
#[derive(Debug, Default)]
struct QueueShared {
    dropped_frames: AtomicU64,
    overflowed: AtomicBool,
    capture_error: Mutex<Option<AudioError>>,
}

impl QueueShared {
    fn set_error(&self, err: AudioError) {
        if let Ok(mut slot) = self.capture_error.lock() {
            // First error wins
            if slot.is_none() {
                *slot = Some(err);
            }
        }
    }
}

/// Handle for reporting capture failures from a device callback
#[derive(Debug, Clone)]
pub struct ErrorReporter {
    shared: Arc<QueueShared>,
}

impl ErrorReporter {
    /// Record a capture failure; the analysis thread stops once the queue drains
    pub fn report(&self, err: AudioError) {
        log::error!("[FramePool] Capture error reported: {}", err);
        self.shared.set_error(err);
    }
}

/// Lock-free frame pool using dual SPSC ring buffers
pub struct FramePool;

impl FramePool {
    /// Create a producer/consumer pair with `capacity` pre-allocated frames
    ///
    /// # Arguments
    /// * `capacity` - Number of frames in circulation (>= 2)
    /// * `frame_size` - Samples per frame (> 0)
    /// * `policy` - What to do when analysis falls behind
    /// * `max_backlog` - Queued frames tolerated before the oldest are discarded
    ///
    /// Callers validate the geometry through `AppConfig::validate`.
    #[allow(clippy::new_ret_no_self)]
    pub fn new(
        capacity: usize,
        frame_size: usize,
        policy: BackpressurePolicy,
        max_backlog: usize,
    ) -> (FrameProducer, FrameConsumer) {
        let capacity = capacity.max(1);
        let frame_size = frame_size.max(1);

        let (mut pool_producer, pool_consumer) = RingBuffer::new(capacity);
        let (data_producer, data_consumer) = RingBuffer::new(capacity);

        for _ in 0..capacity {
            // Ring was created with exactly `capacity` slots
            let _ = pool_producer.push(Vec::with_capacity(frame_size));
        }

        let shared = Arc::new(QueueShared::default());

        let producer = FrameProducer {
            data: data_producer,
            pool: pool_consumer,
            staging: Vec::with_capacity(frame_size),
            frame_size,
            next_sample: 0,
            capacity,
            max_backlog: max_backlog.clamp(1, capacity),
            policy,
            shared: Arc::clone(&shared),
        };

        let consumer = FrameConsumer {
            data: data_consumer,
            pool: pool_producer,
            capacity,
            max_backlog: max_backlog.clamp(1, capacity),
            policy,
            shared,
        };

        (producer, consumer)
    }
}

/// Capture side of the frame pool
///
/// Accepts arbitrary-length sample slices and re-frames them into
/// `frame_size` chunks stamped with their absolute sample index.
pub struct FrameProducer {
    data: Producer<PcmFrame>,
    pool: Consumer<Vec<f32>>,
    staging: Vec<f32>,
    frame_size: usize,
    next_sample: u64,
    capacity: usize,
    max_backlog: usize,
    policy: BackpressurePolicy,
    shared: Arc<QueueShared>,
}

impl FrameProducer {
    /// Push samples without blocking. Safe to call from a realtime callback.
    pub fn write(&mut self, samples: &[f32]) {
        let mut rest = samples;
        while !rest.is_empty() {
            let take = (self.frame_size - self.staging.len()).min(rest.len());
            self.staging.extend_from_slice(&rest[..take]);
            rest = &rest[take..];
            if self.staging.len() == self.frame_size {
                self.flush_frame();
            }
        }
    }

    /// Push signed 16-bit samples, normalizing by 1/32768
    pub fn write_i16(&mut self, samples: &[i16]) {
        for &s in samples {
            self.staging.push(s as f32 * super::frame::I16_SCALE);
            if self.staging.len() == self.frame_size {
                self.flush_frame();
            }
        }
    }

    /// Push samples, waiting for free buffers instead of dropping frames
    ///
    /// Also waits while `max_backlog` frames are queued, so the consumer's
    /// backlog trimming never discards a frame written this way.
    /// Returns false if `cancel` was raised or the consumer went away
    /// before every sample was queued.
    pub fn write_blocking(&mut self, samples: &[f32], cancel: &AtomicBool) -> bool {
        let mut rest = samples;
        while !rest.is_empty() {
            let take = (self.frame_size - self.staging.len()).min(rest.len());
            self.staging.extend_from_slice(&rest[..take]);
            rest = &rest[take..];
            if self.staging.len() == self.frame_size {
                while self.pool.is_empty() || self.queued() >= self.max_backlog {
                    if cancel.load(Ordering::Acquire) || self.is_closed() {
                        return false;
                    }
                    std::thread::sleep(BLOCKING_POLL);
                }
                self.flush_frame();
            }
        }
        true
    }

    /// Handle for reporting device errors out of band
    pub fn error_reporter(&self) -> ErrorReporter {
        ErrorReporter {
            shared: Arc::clone(&self.shared),
        }
    }

    /// True once the analysis side has been dropped
    pub fn is_closed(&self) -> bool {
        self.data.is_abandoned()
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Absolute index of the next sample to be written
    pub fn position(&self) -> u64 {
        self.next_sample + self.staging.len() as u64
    }

    fn queued(&self) -> usize {
        self.capacity - self.data.slots()
    }

    fn flush_frame(&mut self) {
        let start_sample = self.next_sample;
        self.next_sample += self.frame_size as u64;

        match self.pool.pop() {
            Ok(mut buffer) => {
                buffer.clear();
                buffer.extend_from_slice(&self.staging);
                self.staging.clear();
                if let Err(PushError::Full(_)) = self.data.push(PcmFrame::new(start_sample, buffer))
                {
                    self.record_drop();
                }
            }
            Err(_) => {
                self.staging.clear();
                self.record_drop();
            }
        }
    }

    fn record_drop(&self) {
        match self.policy {
            BackpressurePolicy::DropOldest => {
                self.shared.dropped_frames.fetch_add(1, Ordering::Relaxed);
            }
            BackpressurePolicy::FailOnOverflow => {
                self.shared.overflowed.store(true, Ordering::Release);
            }
        }
    }
}

/// Analysis side of the frame pool
pub struct FrameConsumer {
    data: Consumer<PcmFrame>,
    pool: Producer<Vec<f32>>,
    capacity: usize,
    max_backlog: usize,
    policy: BackpressurePolicy,
    shared: Arc<QueueShared>,
}

impl FrameConsumer {
    /// Pop the next frame in capture order
    ///
    /// Under `DropOldest`, frames beyond the backlog bound are discarded
    /// first so the returned frame is at most `max_backlog` frames behind
    /// the capture head.
    pub fn pop(&mut self) -> Option<PcmFrame> {
        if self.policy == BackpressurePolicy::DropOldest {
            let backlog = self.data.slots();
            if backlog > self.max_backlog {
                let excess = backlog - self.max_backlog;
                for _ in 0..excess {
                    if let Ok(frame) = self.data.pop() {
                        self.recycle(frame);
                    }
                }
                self.shared
                    .dropped_frames
                    .fetch_add(excess as u64, Ordering::Relaxed);
                log::warn!(
                    "[FramePool] Analysis behind by {} frames, dropped {} oldest",
                    backlog,
                    excess
                );
            }
        }
        self.data.pop().ok()
    }

    /// Return a processed frame's buffer to the pool
    pub fn recycle(&mut self, frame: PcmFrame) {
        // Pool has room for every buffer in circulation
        let _ = self.pool.push(frame.samples);
    }

    /// Total frames discarded by either side
    pub fn dropped_frames(&self) -> u64 {
        self.shared.dropped_frames.load(Ordering::Relaxed)
    }

    /// `QueueOverflow` if the capture side ran out of buffers under `FailOnOverflow`
    pub fn overflow(&self) -> Option<AudioError> {
        if self.shared.overflowed.load(Ordering::Acquire) {
            Some(AudioError::QueueOverflow {
                capacity: self.capacity,
            })
        } else {
            None
        }
    }

    /// Take the capture error reported by the source, if any
    pub fn take_error(&self) -> Option<AudioError> {
        self.shared
            .capture_error
            .lock()
            .ok()
            .and_then(|mut slot| slot.take())
    }

    /// True once the capture side has been dropped and every frame consumed
    pub fn is_closed(&self) -> bool {
        self.data.is_abandoned() && self.data.is_empty()
    }

    /// Frames currently queued
    pub fn backlog(&self) -> usize {
        self.data.slots()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(capacity: usize, frame_size: usize) -> (FrameProducer, FrameConsumer) {
        FramePool::new(
            capacity,
            frame_size,
            BackpressurePolicy::DropOldest,
            capacity,
        )
    }

    #[test]
    fn test_reframes_arbitrary_writes() {
        let (mut producer, mut consumer) = pool(8, 4);

        producer.write(&[1.0, 2.0, 3.0]);
        assert!(consumer.pop().is_none(), "Partial frame must stay staged");

        producer.write(&[4.0, 5.0, 6.0, 7.0, 8.0, 9.0]);
        let first = consumer.pop().expect("First frame");
        assert_eq!(first.start_sample, 0);
        assert_eq!(first.samples, vec![1.0, 2.0, 3.0, 4.0]);

        let second = consumer.pop().expect("Second frame");
        assert_eq!(second.start_sample, 4);
        assert_eq!(second.samples, vec![5.0, 6.0, 7.0, 8.0]);

        assert!(consumer.pop().is_none());
        assert_eq!(producer.position(), 9);
    }

    #[test]
    fn test_buffers_circulate() {
        let (mut producer, mut consumer) = pool(2, 2);

        for round in 0..10 {
            producer.write(&[round as f32, round as f32]);
            let frame = consumer.pop().expect("Frame available");
            assert_eq!(frame.samples[0], round as f32);
            consumer.recycle(frame);
        }
        assert_eq!(consumer.dropped_frames(), 0);
    }

    #[test]
    fn test_exhausted_pool_drops_and_counts() {
        let (mut producer, mut consumer) = pool(2, 1);

        producer.write(&[0.0, 1.0, 2.0, 3.0]);
        assert_eq!(consumer.dropped_frames(), 2);

        let a = consumer.pop().unwrap();
        let b = consumer.pop().unwrap();
        assert_eq!((a.start_sample, b.start_sample), (0, 1));

        // Sample clock keeps advancing across the drop
        consumer.recycle(a);
        producer.write(&[4.0]);
        assert_eq!(consumer.pop().unwrap().start_sample, 4);
    }

    #[test]
    fn test_consumer_discards_oldest_beyond_backlog() {
        let (mut producer, mut consumer) =
            FramePool::new(8, 1, BackpressurePolicy::DropOldest, 3);

        producer.write(&[0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
        let frame = consumer.pop().expect("Frame after trimming");
        assert_eq!(frame.start_sample, 3, "Oldest frames are discarded first");
        assert_eq!(consumer.dropped_frames(), 3);
        assert_eq!(consumer.backlog(), 2);
    }

    #[test]
    fn test_fail_on_overflow_raises_flag() {
        let (mut producer, consumer) =
            FramePool::new(2, 1, BackpressurePolicy::FailOnOverflow, 2);

        producer.write(&[0.0, 1.0]);
        assert!(consumer.overflow().is_none());

        producer.write(&[2.0]);
        assert_eq!(
            consumer.overflow(),
            Some(AudioError::QueueOverflow { capacity: 2 })
        );
        assert_eq!(consumer.dropped_frames(), 0);
    }

    #[test]
    fn test_write_i16_normalizes() {
        let (mut producer, mut consumer) = pool(4, 2);
        producer.write_i16(&[16384, -32768]);
        let frame = consumer.pop().unwrap();
        assert_eq!(frame.samples, vec![0.5, -1.0]);
    }

    #[test]
    fn test_close_detection() {
        let (mut producer, mut consumer) = pool(4, 1);
        producer.write(&[0.5]);
        drop(producer);

        assert!(!consumer.is_closed(), "Queued frame must be drained first");
        assert!(consumer.pop().is_some());
        assert!(consumer.is_closed());

        let (producer, consumer) = pool(4, 1);
        drop(consumer);
        assert!(producer.is_closed());
    }

    #[test]
    fn test_error_reporter_first_error_wins() {
        let (producer, consumer) = pool(4, 1);
        let reporter = producer.error_reporter();
        reporter.report(AudioError::StreamInterrupted {
            reason: "call".to_string(),
        });
        reporter.report(AudioError::NotRunning);

        assert!(matches!(
            consumer.take_error(),
            Some(AudioError::StreamInterrupted { .. })
        ));
        assert!(consumer.take_error().is_none());
    }

    #[test]
    fn test_write_blocking_stops_on_cancel() {
        let (mut producer, _consumer) = pool(2, 1);
        let cancel = AtomicBool::new(true);
        assert!(!producer.write_blocking(&[0.0, 1.0, 2.0], &cancel));
    }

    #[test]
    fn test_write_blocking_respects_backlog_bound() {
        let (mut producer, mut consumer) =
            FramePool::new(8, 1, BackpressurePolicy::DropOldest, 3);
        let samples: Vec<f32> = (0..40).map(|n| n as f32).collect();

        let writer = std::thread::spawn(move || {
            let cancel = AtomicBool::new(false);
            producer.write_blocking(&samples, &cancel)
        });

        let mut seen = Vec::new();
        while seen.len() < 40 {
            match consumer.pop() {
                Some(frame) => {
                    assert!(consumer.backlog() <= 3, "Backlog exceeded the bound");
                    seen.push(frame.start_sample);
                    consumer.recycle(frame);
                    std::thread::sleep(Duration::from_micros(200));
                }
                None => std::thread::sleep(Duration::from_micros(50)),
            }
        }

        assert!(writer.join().unwrap());
        assert_eq!(seen, (0..40).collect::<Vec<u64>>());
        assert_eq!(consumer.dropped_frames(), 0);
    }

    #[test]
    fn test_send() {
        fn assert_send<T: Send>() {}
        assert_send::<FrameProducer>();
        assert_send::<FrameConsumer>();
        assert_send::<ErrorReporter>();
    }
}
