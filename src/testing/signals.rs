//! Deterministic synthetic signals for tests, demos and offline runs.
//!
//! Everything here is seeded so a given call always yields the same
//! samples.

use rand::{rngs::StdRng, Rng, SeedableRng};
use std::f32::consts::PI;

/// Pure sine of `len` samples
pub fn sine(sample_rate: u32, frequency_hz: f32, amplitude: f32, len: usize) -> Vec<f32> {
    (0..len)
        .map(|i| amplitude * (2.0 * PI * frequency_hz * i as f32 / sample_rate as f32).sin())
        .collect()
}

/// Uniform white noise in [-amplitude, amplitude)
pub fn white_noise(seed: u64, amplitude: f32, len: usize) -> Vec<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..len)
        .map(|_| rng.gen_range(-amplitude..amplitude))
        .collect()
}

/// Silence of `duration_ms` at `sample_rate`
pub fn silence(sample_rate: u32, duration_ms: u32) -> Vec<f32> {
    vec![0.0; ms_to_samples(sample_rate, duration_ms as f32)]
}

pub fn ms_to_samples(sample_rate: u32, ms: f32) -> usize {
    (ms * sample_rate as f32 / 1000.0).round() as usize
}

/// Shape of an impulse written by `impulse_clip`
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ImpulseShape {
    /// Constant-amplitude rectangular burst
    Rectangular,
    /// White-noise burst with an exponential decay, close to a real clap
    DecayingNoise,
}

/// Silent clip of `duration_ms` with a burst starting at each of `onsets_ms`
///
/// Each burst lasts `impulse_ms` with peak `amplitude`.
pub fn impulse_clip(
    sample_rate: u32,
    duration_ms: u32,
    onsets_ms: &[u32],
    impulse_ms: f32,
    amplitude: f32,
    shape: ImpulseShape,
) -> Vec<f32> {
    let mut clip = silence(sample_rate, duration_ms);
    let burst_len = ms_to_samples(sample_rate, impulse_ms).max(1);

    for (n, &onset) in onsets_ms.iter().enumerate() {
        let start = ms_to_samples(sample_rate, onset as f32);
        let burst = match shape {
            ImpulseShape::Rectangular => vec![amplitude; burst_len],
            ImpulseShape::DecayingNoise => {
                let tau = burst_len as f32 / 4.0;
                white_noise(0xC1A9 + n as u64, 1.0, burst_len)
                    .into_iter()
                    .enumerate()
                    .map(|(i, s)| amplitude * s * (-(i as f32) / tau).exp())
                    .collect()
            }
        };
        for (slot, value) in clip.iter_mut().skip(start).zip(burst) {
            *slot = value;
        }
    }

    clip
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_impulse_clip_layout() {
        let clip = impulse_clip(16_000, 500, &[100, 300], 5.0, 0.9, ImpulseShape::Rectangular);
        assert_eq!(clip.len(), 8000);
        assert_eq!(clip[1599], 0.0);
        assert_eq!(clip[1600], 0.9);
        assert_eq!(clip[1679], 0.9);
        assert_eq!(clip[1680], 0.0);
        assert_eq!(clip[4800], 0.9);
    }

    #[test]
    fn test_noise_is_deterministic() {
        assert_eq!(white_noise(42, 1.0, 64), white_noise(42, 1.0, 64));
        assert_ne!(white_noise(42, 1.0, 64), white_noise(43, 1.0, 64));
    }

    #[test]
    fn test_sine_amplitude() {
        let wave = sine(16_000, 1000.0, 0.5, 160);
        let peak = wave.iter().fold(0.0f32, |a, &s| a.max(s.abs()));
        assert!((peak - 0.5).abs() < 0.01);
    }
}
