// FFT module - windowed magnitude spectrum computation
//
// The FFT plan, Hann window and scratch buffers are built once per
// extractor so the per-window path never allocates.

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::sync::Arc;

/// Windowed FFT that turns one analysis window into a magnitude spectrum
pub struct FftProcessor {
    fft: Arc<dyn Fft<f32>>,
    fft_size: usize,
    /// Hann window (pre-computed)
    window: Vec<f32>,
    /// Sum of window coefficients / 2, maps a full-scale sine peak to ~1.0
    norm: f32,
    buffer: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
}

impl FftProcessor {
    /// Create a processor for `fft_size`-sample windows
    pub fn new(fft_size: usize) -> Self {
        let window: Vec<f32> = (0..fft_size)
            .map(|i| {
                0.5 * (1.0
                    - ((2.0 * std::f32::consts::PI * i as f32) / (fft_size as f32 - 1.0)).cos())
            })
            .collect();
        let norm = (window.iter().sum::<f32>() / 2.0).max(f32::EPSILON);

        let fft = FftPlanner::new().plan_fft_forward(fft_size);
        let scratch = vec![Complex::new(0.0, 0.0); fft.get_inplace_scratch_len()];

        Self {
            fft,
            fft_size,
            window,
            norm,
            buffer: vec![Complex::new(0.0, 0.0); fft_size],
            scratch,
        }
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    /// Number of magnitude bins produced per window
    pub fn bin_count(&self) -> usize {
        self.fft_size / 2 + 1
    }

    /// Compute the normalized magnitude spectrum of `audio` into `out`
    ///
    /// Applies the Hann window, runs the FFT and writes |X[k]| for the
    /// `fft_size / 2 + 1` non-negative frequencies. Samples beyond
    /// `fft_size` are ignored and missing samples are zero-padded.
    pub fn magnitude_spectrum_into(&mut self, audio: &[f32], out: &mut Vec<f32>) {
        for (i, slot) in self.buffer.iter_mut().enumerate() {
            let sample = audio.get(i).copied().unwrap_or(0.0);
            *slot = Complex::new(sample * self.window[i], 0.0);
        }

        self.fft
            .process_with_scratch(&mut self.buffer, &mut self.scratch);

        out.clear();
        out.extend(
            self.buffer[..self.bin_count()]
                .iter()
                .map(|c| c.norm() / self.norm),
        );
    }
}
