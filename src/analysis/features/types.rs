// Types module - data structures produced by feature extraction

use serde::Serialize;

/// Scalar descriptors of one analysis window
///
/// Used by the silence pre-filter, the impulse gate and the heuristic
/// model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ScalarFeatures {
    /// Peak absolute amplitude in the window
    pub peak: f32,
    /// Root-mean-square level
    pub rms: f32,
    /// Zero-crossing rate (0.0 to 1.0)
    pub zcr: f32,
    /// Spectral centroid in Hz
    pub centroid_hz: f32,
    /// Spectral flatness (0.0 tonal to 1.0 white noise)
    pub flatness: f32,
    /// 2-8 kHz energy over <2 kHz energy
    pub hf_ratio: f32,
    /// Rise time of the loudest transient
    pub attack_ms: f32,
    /// Fall time of the loudest transient
    pub decay_ms: f32,
    /// Loudest sample outside that transient, relative to the peak
    pub ringing_ratio: f32,
}

/// Spectral representation of one analysis window
///
/// `spectrum` holds `window_size / 2 + 1` bins in the configured scale.
/// `mel` is empty unless log-mel bands are enabled.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureVector {
    pub start_sample: u64,
    pub timestamp_ms: u64,
    pub spectrum: Vec<f32>,
    pub mel: Vec<f32>,
    pub scalars: ScalarFeatures,
}
