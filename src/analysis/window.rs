// WindowBuffer - overlapping analysis windows from a stream of PCM frames
//
// Frames are appended in capture order. Every time `window_size` samples
// are available a window is emitted and the buffer advances by `hop_size`,
// keeping the trailing `window_size - hop_size` samples as overlap.
//
// Windows never span a discontinuity: when a frame's start_sample does not
// follow the previous frame (frames were dropped upstream) the pending
// samples are discarded and windowing restarts at the new frame.

use crate::audio::PcmFrame;

/// Contiguous block of `window_size` samples handed to feature extraction
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnalysisWindow {
    /// Absolute index of `samples[0]`
    pub start_sample: u64,
    pub samples: Vec<f32>,
}

impl AnalysisWindow {
    /// Start time of the window in milliseconds since capture start
    pub fn timestamp_ms(&self, sample_rate: u32) -> u64 {
        self.start_sample * 1000 / sample_rate.max(1) as u64
    }
}

pub struct WindowBuffer {
    window_size: usize,
    hop_size: usize,
    pending: Vec<f32>,
    /// Absolute index of `pending[0]`
    pending_start: u64,
    /// start_sample expected for the next frame
    next_expected: Option<u64>,
    discontinuities: u64,
}

impl WindowBuffer {
    /// Create a buffer emitting `window_size` windows every `hop_size` samples
    ///
    /// Requires `0 < hop_size <= window_size`, enforced by `AppConfig::validate`.
    pub fn new(window_size: usize, hop_size: usize) -> Self {
        debug_assert!(hop_size > 0 && hop_size <= window_size);
        Self {
            window_size,
            hop_size: hop_size.clamp(1, window_size.max(1)),
            pending: Vec::with_capacity(window_size * 2),
            pending_start: 0,
            next_expected: None,
            discontinuities: 0,
        }
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Number of gaps observed in the frame sequence
    pub fn discontinuities(&self) -> u64 {
        self.discontinuities
    }

    /// Samples buffered but not yet released by a hop
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Append a frame, resynchronizing if it does not follow the previous one
    pub fn push(&mut self, frame: &PcmFrame) {
        self.push_samples(frame.start_sample, &frame.samples);
    }

    pub fn push_samples(&mut self, start_sample: u64, samples: &[f32]) {
        match self.next_expected {
            Some(expected) if expected == start_sample => {}
            Some(expected) => {
                self.discontinuities += 1;
                log::debug!(
                    "[WindowBuffer] Gap in frame sequence: expected sample {}, got {} ({} pending samples discarded)",
                    expected,
                    start_sample,
                    self.pending.len()
                );
                self.pending.clear();
                self.pending_start = start_sample;
            }
            None => {
                self.pending.clear();
                self.pending_start = start_sample;
            }
        }

        self.pending.extend_from_slice(samples);
        self.next_expected = Some(start_sample + samples.len() as u64);
    }

    /// Copy the next complete window into `out` and advance by one hop
    ///
    /// Returns false when fewer than `window_size` samples are pending.
    pub fn pop_into(&mut self, out: &mut AnalysisWindow) -> bool {
        if self.pending.len() < self.window_size {
            return false;
        }

        out.start_sample = self.pending_start;
        out.samples.clear();
        out.samples
            .extend_from_slice(&self.pending[..self.window_size]);

        self.pending.drain(..self.hop_size);
        self.pending_start += self.hop_size as u64;
        true
    }

    /// Next complete window, if any
    pub fn pop(&mut self) -> Option<AnalysisWindow> {
        let mut window = AnalysisWindow {
            start_sample: 0,
            samples: Vec::with_capacity(self.window_size),
        };
        self.pop_into(&mut window).then_some(window)
    }

    /// Forget all pending samples and the expected frame position
    pub fn reset(&mut self) {
        self.pending.clear();
        self.pending_start = 0;
        self.next_expected = None;
    }
}
