//! Configuration management for the clap detection pipeline
//!
//! This module provides runtime configuration loading from JSON files so
//! thresholds and window geometry can be tuned without recompiling. Every
//! field has a default; partial JSON documents are completed from the
//! defaults.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::PipelineError;

/// Complete application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub audio: AudioConfig,
    pub detection: DetectionConfig,
    pub classifier: ClassifierConfig,
    pub pattern: PatternConfig,
    pub model: ModelConfig,
}

/// What the analysis thread does when it cannot keep up with capture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackpressurePolicy {
    /// Discard the oldest unconsumed frames and keep listening
    DropOldest,
    /// Stop the pipeline with `AudioError::QueueOverflow`
    FailOnOverflow,
}

/// Audio capture configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Capture sample rate in Hz
    pub sample_rate: u32,
    /// Samples per PCM frame delivered by the audio source
    pub frame_size: usize,
    /// Number of pre-allocated frames in the capture queue
    pub queue_capacity: usize,
    /// Backlog (in frames) at which the oldest frames are discarded
    pub max_backlog_frames: usize,
    /// Overflow handling between capture and analysis
    pub backpressure: BackpressurePolicy,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            // 10ms at 16kHz
            frame_size: 160,
            queue_capacity: 64,
            max_backlog_frames: 48,
            backpressure: BackpressurePolicy::DropOldest,
        }
    }
}

/// Scale of the spectrum values placed in the feature vector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpectrumScale {
    /// Linear magnitude |X[k]|
    Magnitude,
    /// 20 * log10(|X[k]|), clamped at `log_floor_db`
    LogMagnitude,
}

/// Window geometry and spectral feature parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Analysis window length in samples (power of two)
    pub window_size: usize,
    /// Samples advanced between consecutive windows
    pub hop_size: usize,
    pub spectrum_scale: SpectrumScale,
    /// Floor for log-magnitude values in dB
    pub log_floor_db: f32,
    /// Number of log-mel bands to compute (0 disables the filterbank)
    pub mel_bands: usize,
    pub mel_fmin: f32,
    pub mel_fmax: f32,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            window_size: 512,
            hop_size: 256,
            spectrum_scale: SpectrumScale::LogMagnitude,
            log_floor_db: -80.0,
            mel_bands: 0,
            mel_fmin: 125.0,
            mel_fmax: 7500.0,
        }
    }
}

/// Shape constraints applied before a window reaches the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImpulseGateConfig {
    pub enabled: bool,
    /// Minimum peak amplitude for a window to count as an impulse
    pub peak_threshold: f32,
    /// Longest allowed rise from 10% of peak to peak
    pub max_attack_ms: f32,
    /// Longest allowed fall from peak to 20% of peak
    pub max_decay_ms: f32,
    /// Minimum spectral flatness (0 disables the check)
    pub min_flatness: f32,
    /// Minimum 2-8kHz / <2kHz energy ratio (0 disables the check)
    pub min_hf_ratio: f32,
    /// Largest allowed secondary peak relative to the main one (unset
    /// disables the check)
    pub max_ringing_ratio: Option<f32>,
}

impl Default for ImpulseGateConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            peak_threshold: 0.05,
            max_attack_ms: 30.0,
            max_decay_ms: 200.0,
            min_flatness: 0.0,
            min_hf_ratio: 0.0,
            max_ringing_ratio: None,
        }
    }
}

/// Classifier pre-filter configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Peak amplitude below which classification is skipped (score 0)
    pub silence_threshold: f32,
    /// Windows scored 0 after start while the input settles
    pub warmup_windows: u32,
    pub impulse_gate: ImpulseGateConfig,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            silence_threshold: 0.05,
            warmup_windows: 0,
            impulse_gate: ImpulseGateConfig::default(),
        }
    }
}

/// Temporal clap pattern parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternConfig {
    /// Score at or above which a window counts as a clap
    pub clap_score_threshold: f32,
    /// Refractory period between two distinct claps
    pub min_inter_clap_gap_ms: u64,
    /// Longest gap between consecutive claps of one gesture
    pub max_inter_clap_gap_ms: u64,
    /// Minimum time between two emitted triggers
    pub debounce_ms: u64,
    /// Claps that make up one gesture
    pub clap_count: u32,
    /// Longest span from first to last clap of one gesture (unset: only
    /// the per-gap bound applies)
    pub max_gesture_ms: Option<u64>,
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            clap_score_threshold: 0.5,
            min_inter_clap_gap_ms: 80,
            max_inter_clap_gap_ms: 500,
            debounce_ms: 2000,
            clap_count: 2,
            max_gesture_ms: None,
        }
    }
}

/// Input and output layout of a trained clap model
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Log-mel frames stacked into one model input (0 feeds single windows)
    pub stacked_frames: usize,
    /// Position of the clap class in the model output
    pub output_index: usize,
    /// Apply a sigmoid to the selected output
    pub output_is_logit: bool,
}

impl AppConfig {
    /// Load configuration from JSON file
    ///
    /// # Arguments
    /// * `path` - Path to JSON config file
    ///
    /// # Returns
    /// The loaded configuration, or the defaults if the file is missing,
    /// unparseable or fails validation
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(&path) {
            Ok(contents) => match Self::from_json_str(&contents) {
                Ok(config) => {
                    log::info!("[Config] Loaded configuration from {:?}", path.as_ref());
                    config
                }
                Err(err) => {
                    log::warn!(
                        "[Config] Rejected configuration from {:?}: {}. Using defaults.",
                        path.as_ref(),
                        err
                    );
                    Self::default()
                }
            },
            Err(err) => {
                log::warn!(
                    "[Config] Failed to read config file {:?}: {}. Using defaults.",
                    path.as_ref(),
                    err
                );
                Self::default()
            }
        }
    }

    /// Parse and validate a JSON document
    pub fn from_json_str(json: &str) -> Result<Self, PipelineError> {
        let config: AppConfig = serde_json::from_str(json)
            .map_err(|err| PipelineError::invalid_config("json", err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check every cross-field invariant the pipeline relies on
    pub fn validate(&self) -> Result<(), PipelineError> {
        let audio = &self.audio;
        if audio.sample_rate == 0 {
            return Err(PipelineError::invalid_config("sample_rate", "must be > 0"));
        }
        if audio.frame_size == 0 {
            return Err(PipelineError::invalid_config("frame_size", "must be > 0"));
        }
        if audio.queue_capacity < 2 {
            return Err(PipelineError::invalid_config(
                "queue_capacity",
                "must hold at least 2 frames",
            ));
        }
        if audio.max_backlog_frames == 0 || audio.max_backlog_frames > audio.queue_capacity {
            return Err(PipelineError::invalid_config(
                "max_backlog_frames",
                format!("must be in 1..={}", audio.queue_capacity),
            ));
        }

        let detection = &self.detection;
        if detection.window_size < 2 || !detection.window_size.is_power_of_two() {
            return Err(PipelineError::invalid_config(
                "window_size",
                format!("must be a power of two >= 2 (got {})", detection.window_size),
            ));
        }
        if detection.hop_size == 0 || detection.hop_size > detection.window_size {
            return Err(PipelineError::invalid_config(
                "hop_size",
                format!("must be in 1..={}", detection.window_size),
            ));
        }
        if !detection.log_floor_db.is_finite() || detection.log_floor_db >= 0.0 {
            return Err(PipelineError::invalid_config(
                "log_floor_db",
                "must be a finite negative dB value",
            ));
        }
        if detection.mel_bands > 0 {
            let nyquist = audio.sample_rate as f32 / 2.0;
            if !(detection.mel_fmin >= 0.0
                && detection.mel_fmin < detection.mel_fmax
                && detection.mel_fmax <= nyquist)
            {
                return Err(PipelineError::invalid_config(
                    "mel_fmax",
                    format!("mel range must satisfy 0 <= fmin < fmax <= {}", nyquist),
                ));
            }
        }

        let classifier = &self.classifier;
        if !(0.0..=1.0).contains(&classifier.silence_threshold) {
            return Err(PipelineError::invalid_config(
                "silence_threshold",
                "must be within [0, 1]",
            ));
        }
        let gate = &classifier.impulse_gate;
        if !(0.0..=1.0).contains(&gate.peak_threshold) {
            return Err(PipelineError::invalid_config(
                "peak_threshold",
                "must be within [0, 1]",
            ));
        }
        if gate.enabled && (gate.max_attack_ms <= 0.0 || gate.max_decay_ms <= 0.0) {
            return Err(PipelineError::invalid_config(
                "impulse_gate",
                "attack and decay limits must be > 0",
            ));
        }
        if gate
            .max_ringing_ratio
            .is_some_and(|ratio| !(ratio.is_finite() && ratio >= 0.0))
        {
            return Err(PipelineError::invalid_config(
                "max_ringing_ratio",
                "must be a finite ratio >= 0",
            ));
        }

        let pattern = &self.pattern;
        if !(0.0..=1.0).contains(&pattern.clap_score_threshold) {
            return Err(PipelineError::invalid_config(
                "clap_score_threshold",
                "must be within [0, 1]",
            ));
        }
        if pattern.min_inter_clap_gap_ms > pattern.max_inter_clap_gap_ms {
            return Err(PipelineError::invalid_config(
                "min_inter_clap_gap_ms",
                "must not exceed max_inter_clap_gap_ms",
            ));
        }
        if pattern.clap_count == 0 {
            return Err(PipelineError::invalid_config("clap_count", "must be >= 1"));
        }
        if pattern.max_gesture_ms == Some(0) {
            return Err(PipelineError::invalid_config("max_gesture_ms", "must be > 0"));
        }

        if self.model.stacked_frames > 0 && detection.mel_bands == 0 {
            return Err(PipelineError::invalid_config(
                "stacked_frames",
                "stacking needs mel_bands > 0",
            ));
        }

        Ok(())
    }
}
