// Classifier - scores each analysis window with a clap probability
//
// ClapClassifier wraps a pluggable ClapModel with cheap pre-filters that
// short-circuit to a score of 0 before inference:
// - warmup: the first N windows after start, while input levels settle
// - silence: peak amplitude below silence_threshold
// - impulse gate: optional shape checks (see impulse.rs)
//
// Model output is clamped to [0, 1]. A failed or non-finite inference is
// logged and scored 0; one bad window never stops the pipeline.

use serde::Serialize;
use std::sync::Arc;

use super::features::FeatureVector;
use super::impulse::{GateRejection, ImpulseGate};
use crate::config::ClassifierConfig;
use crate::error::PipelineError;

/// Clap probability for one window
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClassificationScore {
    /// Start time of the scored window in ms since capture start
    pub timestamp_ms: u64,
    /// Probability in [0, 1] that the window contains a clap
    pub score: f32,
}

/// Where a score came from
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScoreSource {
    Model,
    Warmup,
    Silence,
    Gated(GateRejection),
    /// Inference failed or returned a non-finite value
    Fallback,
}

impl ScoreSource {
    /// True when the model was not consulted
    pub fn is_skipped(&self) -> bool {
        !matches!(self, ScoreSource::Model | ScoreSource::Fallback)
    }
}

/// A trained (or hand-written) clap scorer
///
/// Implementations must be safe to call from the analysis thread while
/// being owned elsewhere, hence `Send + Sync`. `predict` should return a
/// probability, but the classifier clamps whatever comes back.
pub trait ClapModel: Send + Sync {
    fn name(&self) -> &str;

    /// Clap probability for one feature vector
    fn predict(&self, features: &FeatureVector) -> Result<f32, PipelineError>;

    /// Called for every window before the pre-filters, including windows
    /// that are never scored. Models with temporal context update it here.
    fn observe(&self, _features: &FeatureVector) {}

    /// Forget any temporal context
    fn reset(&self) {}
}

/// Per-window classifier with pre-filters around a ClapModel
pub struct ClapClassifier {
    model: Arc<dyn ClapModel>,
    silence_threshold: f32,
    gate: Option<ImpulseGate>,
    warmup_windows: u32,
    windows_seen: u64,
}

impl ClapClassifier {
    pub fn new(model: Arc<dyn ClapModel>, config: &ClassifierConfig) -> Self {
        let gate = config
            .impulse_gate
            .enabled
            .then(|| ImpulseGate::new(config.impulse_gate.clone()));

        log::info!(
            "[ClapClassifier] Using model '{}' (silence<{}, gate={}, warmup={})",
            model.name(),
            config.silence_threshold,
            gate.is_some(),
            config.warmup_windows
        );

        Self {
            model,
            silence_threshold: config.silence_threshold,
            gate,
            warmup_windows: config.warmup_windows,
            windows_seen: 0,
        }
    }

    /// Score one window
    ///
    /// # Returns
    /// Tuple of (score carrying the window timestamp, source of the score)
    pub fn classify(&mut self, features: &FeatureVector) -> (ClassificationScore, ScoreSource) {
        self.windows_seen += 1;
        self.model.observe(features);
        let timestamp_ms = features.timestamp_ms;
        let skipped = |source| (ClassificationScore { timestamp_ms, score: 0.0 }, source);

        if self.windows_seen <= self.warmup_windows as u64 {
            return skipped(ScoreSource::Warmup);
        }

        if features.scalars.peak < self.silence_threshold {
            return skipped(ScoreSource::Silence);
        }

        if let Some(gate) = &self.gate {
            if let Err(rejection) = gate.check(&features.scalars) {
                log::trace!(
                    "[ClapClassifier] Gate rejected window at {}ms: {}",
                    timestamp_ms,
                    rejection
                );
                return skipped(ScoreSource::Gated(rejection));
            }
        }

        match self.model.predict(features) {
            Ok(score) if score.is_finite() => (
                ClassificationScore {
                    timestamp_ms,
                    score: score.clamp(0.0, 1.0),
                },
                ScoreSource::Model,
            ),
            Ok(score) => {
                log::warn!(
                    "[ClapClassifier] Model returned non-finite score {} at {}ms, using 0",
                    score,
                    timestamp_ms
                );
                skipped(ScoreSource::Fallback)
            }
            Err(err) => {
                log::warn!(
                    "[ClapClassifier] Inference failed at {}ms, using 0: {}",
                    timestamp_ms,
                    err
                );
                skipped(ScoreSource::Fallback)
            }
        }
    }

    /// Restart the warmup count and the model's temporal context
    pub fn reset(&mut self) {
        self.windows_seen = 0;
        self.model.reset();
    }
}

/// Feature-based clap scorer that needs no trained weights
///
/// Combines three cues, each mapped to [0, 1]: spectral flatness (claps
/// are noise-like), high-band energy ratio (claps are bright) and crest
/// factor (claps are impulsive). The score is their mean.
#[derive(Debug, Clone, Default)]
pub struct HeuristicClapModel;

impl HeuristicClapModel {
    pub fn new() -> Self {
        Self
    }
}

impl ClapModel for HeuristicClapModel {
    fn name(&self) -> &str {
        "heuristic"
    }

    fn predict(&self, features: &FeatureVector) -> Result<f32, PipelineError> {
        let s = &features.scalars;
        let flatness = ((s.flatness - 0.1) / 0.3).clamp(0.0, 1.0);
        let brightness = (s.hf_ratio / 1.5).clamp(0.0, 1.0);
        let crest = if s.rms > 1e-6 { s.peak / s.rms } else { 0.0 };
        let impulsiveness = ((crest - 2.0) / 4.0).clamp(0.0, 1.0);
        Ok((flatness + brightness + impulsiveness) / 3.0)
    }
}

/// ClapModel backed by a closure, for tests and custom scorers
pub struct FnClapModel<F> {
    name: String,
    predict: F,
}

impl<F> FnClapModel<F>
where
    F: Fn(&FeatureVector) -> f32 + Send + Sync,
{
    pub fn new(name: impl Into<String>, predict: F) -> Self {
        Self {
            name: name.into(),
            predict,
        }
    }
}

impl<F> ClapModel for FnClapModel<F>
where
    F: Fn(&FeatureVector) -> f32 + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn predict(&self, features: &FeatureVector) -> Result<f32, PipelineError> {
        Ok((self.predict)(features))
    }
}
