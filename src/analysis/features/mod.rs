// FeatureExtractor - turns analysis windows into feature vectors
//
// Module organization:
// - types: FeatureVector and ScalarFeatures
// - fft: Hann-windowed magnitude spectrum
// - spectral: centroid, flatness, HF ratio
// - temporal: peak, RMS, ZCR, attack/decay envelope
// - mel: optional triangular mel filterbank
// - mod.rs: coordinator (FeatureExtractor)
//
// Every buffer is allocated in `new`; `extract_into` reuses the caller's
// FeatureVector so the steady-state path does not allocate.

mod fft;
mod mel;
mod spectral;
mod temporal;
mod types;

pub use mel::MelFilterbank;
pub use temporal::EnvelopeTiming;
pub use types::{FeatureVector, ScalarFeatures};

use fft::FftProcessor;
use spectral::SpectralFeatures;
use temporal::TemporalFeatures;

use super::window::AnalysisWindow;
use crate::config::{DetectionConfig, SpectrumScale};
use crate::error::PipelineError;

/// FeatureExtractor coordinates the DSP feature pipeline
pub struct FeatureExtractor {
    fft_processor: FftProcessor,
    spectral_features: SpectralFeatures,
    temporal_features: TemporalFeatures,
    mel_filterbank: Option<MelFilterbank>,
    scale: SpectrumScale,
    log_floor_db: f32,
    sample_rate: u32,
    window_size: usize,
    /// Window samples with non-finite values replaced by 0
    sanitized: Vec<f32>,
    /// Linear magnitudes, reused per window
    magnitude: Vec<f32>,
    /// Power spectrum for the mel filterbank
    power: Vec<f32>,
}

impl FeatureExtractor {
    /// Create an extractor for the configured window geometry
    ///
    /// # Arguments
    /// * `sample_rate` - Capture sample rate in Hz
    /// * `config` - Detection config (window size, scale, log floor, mel bands)
    pub fn new(sample_rate: u32, config: &DetectionConfig) -> Self {
        let window_size = config.window_size;
        let mel_filterbank = (config.mel_bands > 0).then(|| {
            MelFilterbank::new(
                config.mel_bands,
                window_size,
                sample_rate,
                config.mel_fmin,
                config.mel_fmax,
            )
        });

        Self {
            fft_processor: FftProcessor::new(window_size),
            spectral_features: SpectralFeatures::new(sample_rate, window_size),
            temporal_features: TemporalFeatures::new(sample_rate),
            mel_filterbank,
            scale: config.spectrum_scale,
            log_floor_db: config.log_floor_db,
            sample_rate,
            window_size,
            sanitized: Vec::with_capacity(window_size),
            magnitude: Vec::with_capacity(window_size / 2 + 1),
            power: Vec::with_capacity(window_size / 2 + 1),
        }
    }

    /// Number of spectrum bins per feature vector
    pub fn bin_count(&self) -> usize {
        self.fft_processor.bin_count()
    }

    /// Number of log-mel bands per feature vector (0 when disabled)
    pub fn mel_bands(&self) -> usize {
        self.mel_filterbank.as_ref().map_or(0, |bank| bank.bands())
    }

    /// Extract features into a freshly allocated vector
    pub fn extract(&mut self, window: &AnalysisWindow) -> Result<FeatureVector, PipelineError> {
        let mut features = FeatureVector::default();
        self.extract_into(window, &mut features)?;
        Ok(features)
    }

    /// Extract features from `window` into `out`, reusing its buffers
    ///
    /// # Errors
    /// `PipelineError::MalformedWindow` if the window length differs from
    /// the configured window size.
    pub fn extract_into(
        &mut self,
        window: &AnalysisWindow,
        out: &mut FeatureVector,
    ) -> Result<(), PipelineError> {
        if window.samples.len() != self.window_size {
            return Err(PipelineError::MalformedWindow {
                expected: self.window_size,
                actual: window.samples.len(),
            });
        }

        self.sanitized.clear();
        self.sanitized.extend(
            window
                .samples
                .iter()
                .map(|&s| if s.is_finite() { s } else { 0.0 }),
        );

        self.fft_processor
            .magnitude_spectrum_into(&self.sanitized, &mut self.magnitude);

        let envelope = self.temporal_features.compute_envelope(&self.sanitized);
        out.scalars = ScalarFeatures {
            peak: self.temporal_features.compute_peak(&self.sanitized),
            rms: self.temporal_features.compute_rms(&self.sanitized),
            zcr: self.temporal_features.compute_zcr(&self.sanitized),
            centroid_hz: self.spectral_features.compute_centroid(&self.magnitude),
            flatness: self.spectral_features.compute_flatness(&self.magnitude),
            hf_ratio: self.spectral_features.compute_hf_ratio(&self.magnitude),
            attack_ms: envelope.attack_ms,
            decay_ms: envelope.decay_ms,
            ringing_ratio: envelope.ringing_ratio,
        };

        out.start_sample = window.start_sample;
        out.timestamp_ms = window.timestamp_ms(self.sample_rate);

        out.spectrum.clear();
        match self.scale {
            SpectrumScale::Magnitude => out.spectrum.extend_from_slice(&self.magnitude),
            SpectrumScale::LogMagnitude => {
                let floor = self.log_floor_db;
                out.spectrum.extend(self.magnitude.iter().map(|&m| {
                    if m > 0.0 {
                        (20.0 * m.log10()).max(floor)
                    } else {
                        floor
                    }
                }));
            }
        }

        out.mel.clear();
        if let Some(bank) = &self.mel_filterbank {
            self.power.clear();
            self.power.extend(self.magnitude.iter().map(|&m| m * m));
            bank.log_mel_into(&self.power, &mut out.mel);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::signals;

    fn extractor(scale: SpectrumScale) -> FeatureExtractor {
        let config = DetectionConfig {
            spectrum_scale: scale,
            ..DetectionConfig::default()
        };
        FeatureExtractor::new(16_000, &config)
    }

    fn window(samples: Vec<f32>) -> AnalysisWindow {
        AnalysisWindow {
            start_sample: 1600,
            samples,
        }
    }

    #[test]
    fn test_silence_sits_at_floor() {
        let mut extractor = extractor(SpectrumScale::LogMagnitude);
        let features = extractor.extract(&window(vec![0.0; 512])).unwrap();

        assert_eq!(features.spectrum.len(), 257);
        assert!(features.spectrum.iter().all(|&db| db <= -80.0));
        assert_eq!(features.scalars.peak, 0.0);
        assert_eq!(features.timestamp_ms, 100);
    }

    #[test]
    fn test_sine_peak_bin() {
        let mut extractor = extractor(SpectrumScale::Magnitude);
        // 1 kHz at 16 kHz with 512 bins -> bin 32
        let sine = signals::sine(16_000, 1000.0, 0.8, 512);
        let features = extractor.extract(&window(sine)).unwrap();

        let peak_bin = features
            .spectrum
            .iter()
            .enumerate()
            .fold((0, 0.0f32), |acc, (i, &m)| if m > acc.1 { (i, m) } else { acc })
            .0;
        assert!((31..=33).contains(&peak_bin), "peak bin {}", peak_bin);
        assert!(features.scalars.flatness < 0.3);
        assert!(features.scalars.hf_ratio < 0.1);
    }

    #[test]
    fn test_noise_is_flat_and_bright() {
        let mut extractor = extractor(SpectrumScale::LogMagnitude);
        let noise = signals::white_noise(7, 0.5, 512);
        let features = extractor.extract(&window(noise)).unwrap();

        assert!(features.scalars.flatness > 0.5, "{}", features.scalars.flatness);
        assert!(features.scalars.hf_ratio > 1.0, "{}", features.scalars.hf_ratio);
        assert!(features.scalars.zcr > 0.3);
    }

    #[test]
    fn test_non_finite_samples_are_zeroed() {
        let mut extractor = extractor(SpectrumScale::LogMagnitude);
        let mut samples = vec![0.0; 512];
        samples[10] = f32::NAN;
        samples[20] = f32::INFINITY;
        let features = extractor.extract(&window(samples)).unwrap();
        assert!(features.spectrum.iter().all(|v| v.is_finite()));
        assert_eq!(features.scalars.peak, 0.0);
    }

    #[test]
    fn test_wrong_length_is_malformed() {
        let mut extractor = extractor(SpectrumScale::LogMagnitude);
        match extractor.extract(&window(vec![0.0; 100])) {
            Err(PipelineError::MalformedWindow { expected, actual }) => {
                assert_eq!((expected, actual), (512, 100));
            }
            other => panic!("Expected MalformedWindow, got {:?}", other),
        }
    }

    #[test]
    fn test_mel_bands_when_enabled() {
        let config = DetectionConfig {
            mel_bands: 64,
            ..DetectionConfig::default()
        };
        let mut extractor = FeatureExtractor::new(16_000, &config);
        assert_eq!(extractor.mel_bands(), 64);

        let features = extractor
            .extract(&window(signals::white_noise(3, 0.5, 512)))
            .unwrap();
        assert_eq!(features.mel.len(), 64);
        assert!(features.mel.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_extract_into_reuses_buffers() {
        let mut extractor = extractor(SpectrumScale::LogMagnitude);
        let mut out = FeatureVector::default();
        extractor
            .extract_into(&window(vec![0.1; 512]), &mut out)
            .unwrap();
        let capacity = out.spectrum.capacity();
        extractor
            .extract_into(&window(vec![0.2; 512]), &mut out)
            .unwrap();
        assert_eq!(out.spectrum.capacity(), capacity);
        assert_eq!(out.spectrum.len(), 257);
    }
}
