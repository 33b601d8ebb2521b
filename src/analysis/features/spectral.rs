// Spectral module - Frequency-domain feature extraction
//
// All features are computed from the linear magnitude spectrum.

/// Lower edge of the high band used by the HF ratio
const HF_BAND_LOW_HZ: f32 = 2000.0;
/// Upper edge of the high band used by the HF ratio
const HF_BAND_HIGH_HZ: f32 = 8000.0;

/// Spectral feature computation functions
pub struct SpectralFeatures {
    sample_rate: u32,
    fft_size: usize,
}

impl SpectralFeatures {
    pub fn new(sample_rate: u32, fft_size: usize) -> Self {
        Self {
            sample_rate,
            fft_size,
        }
    }

    fn bin_width(&self) -> f32 {
        self.sample_rate as f32 / self.fft_size as f32
    }

    /// Compute spectral centroid (weighted mean frequency)
    ///
    /// Formula: centroid = Σ(f_i × |X[i]|) / Σ|X[i]|
    ///
    /// # Returns
    /// Spectral centroid in Hz, 0 for an empty spectrum
    pub fn compute_centroid(&self, spectrum: &[f32]) -> f32 {
        let freq_bin_width = self.bin_width();

        let weighted_sum: f32 = spectrum
            .iter()
            .enumerate()
            .map(|(i, &mag)| i as f32 * freq_bin_width * mag)
            .sum();
        let magnitude_sum: f32 = spectrum.iter().sum();

        if magnitude_sum > 1e-10 {
            weighted_sum / magnitude_sum
        } else {
            0.0
        }
    }

    /// Compute spectral flatness (tonality measure)
    ///
    /// Formula: flatness = geometric_mean(|X[i]|) / arithmetic_mean(|X[i]|)
    ///
    /// Returns a value between 0 (tonal, e.g. sine wave) and 1 (white
    /// noise). Near-zero bins are skipped so silence reads as 0.
    pub fn compute_flatness(&self, spectrum: &[f32]) -> f32 {
        let mut log_sum = 0.0f32;
        let mut sum = 0.0f32;
        let mut count = 0usize;
        for &mag in spectrum.iter().filter(|&&mag| mag > 1e-10) {
            log_sum += mag.ln();
            sum += mag;
            count += 1;
        }

        if count == 0 {
            return 0.0;
        }

        let geometric_mean = (log_sum / count as f32).exp();
        let arithmetic_mean = sum / count as f32;

        if arithmetic_mean > 1e-10 {
            (geometric_mean / arithmetic_mean).min(1.0)
        } else {
            0.0
        }
    }

    /// Ratio of 2-8 kHz energy to energy below 2 kHz
    ///
    /// Hand claps put most of their energy above 2 kHz, thuds and voices
    /// below it. Band edges are clamped to the Nyquist bin.
    pub fn compute_hf_ratio(&self, spectrum: &[f32]) -> f32 {
        if spectrum.is_empty() {
            return 0.0;
        }
        let last = spectrum.len() - 1;
        let idx_low = ((HF_BAND_LOW_HZ / self.bin_width()) as usize).min(last);
        let idx_high = ((HF_BAND_HIGH_HZ / self.bin_width()) as usize).min(last);

        let energy_low: f32 = spectrum[..idx_low].iter().map(|&m| m * m).sum();
        let energy_high: f32 = spectrum[idx_low..idx_high].iter().map(|&m| m * m).sum();

        energy_high / energy_low.max(1e-10)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_centroid_of_single_bin() {
        let spectral = SpectralFeatures::new(16_000, 512);
        let mut spectrum = vec![0.0; 257];
        spectrum[64] = 1.0;
        assert!((spectral.compute_centroid(&spectrum) - 2000.0).abs() < 1e-3);
    }

    #[test]
    fn test_flatness_extremes() {
        let spectral = SpectralFeatures::new(16_000, 512);
        let flat = vec![0.5; 257];
        assert!((spectral.compute_flatness(&flat) - 1.0).abs() < 1e-4);

        let mut peaked = vec![1e-4; 257];
        peaked[10] = 10.0;
        assert!(spectral.compute_flatness(&peaked) < 0.1);

        assert_eq!(spectral.compute_flatness(&[0.0; 8]), 0.0);
    }

    #[test]
    fn test_hf_ratio_separates_bands() {
        let spectral = SpectralFeatures::new(16_000, 512);
        let mut low = vec![0.0; 257];
        low[10] = 1.0;
        assert!(spectral.compute_hf_ratio(&low) < 1e-6);

        let mut high = vec![0.0; 257];
        high[10] = 0.1;
        high[128] = 1.0;
        assert!(spectral.compute_hf_ratio(&high) > 10.0);
    }
}
