// ImpulseGate - rejects windows whose shape cannot be a hand clap
//
// A clap is a short broadband transient. The gate checks, in order:
// 1. Peak amplitude above a floor
// 2. Attack (10% -> peak) shorter than max_attack_ms
// 3. Decay (peak -> 20%) shorter than max_decay_ms
// 4. Secondary peak / peak at most max_ringing_ratio (unset disables)
// 5. Spectral flatness above min_flatness (0 disables)
// 6. 2-8 kHz / <2 kHz energy ratio above min_hf_ratio (0 disables)
// Windows failing any check are scored 0 without running the model.

use std::fmt;

use super::features::ScalarFeatures;
use crate::config::ImpulseGateConfig;

/// Why the gate rejected a window
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GateRejection {
    LowPeak { peak: f32 },
    SlowAttack { attack_ms: f32 },
    SlowDecay { decay_ms: f32 },
    Ringing { ratio: f32 },
    Tonal { flatness: f32 },
    Thud { hf_ratio: f32 },
}

impl fmt::Display for GateRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GateRejection::LowPeak { peak } => write!(f, "low peak ({:.3})", peak),
            GateRejection::SlowAttack { attack_ms } => {
                write!(f, "slow attack ({:.1}ms)", attack_ms)
            }
            GateRejection::SlowDecay { decay_ms } => write!(f, "slow decay ({:.1}ms)", decay_ms),
            GateRejection::Ringing { ratio } => write!(f, "ringing ({:.2})", ratio),
            GateRejection::Tonal { flatness } => write!(f, "tonal (flatness {:.2})", flatness),
            GateRejection::Thud { hf_ratio } => write!(f, "thud (HF ratio {:.2})", hf_ratio),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ImpulseGate {
    config: ImpulseGateConfig,
}

impl ImpulseGate {
    pub fn new(config: ImpulseGateConfig) -> Self {
        Self { config }
    }

    /// Check a window's scalar features against the gate
    pub fn check(&self, features: &ScalarFeatures) -> Result<(), GateRejection> {
        let c = &self.config;

        if features.peak < c.peak_threshold {
            return Err(GateRejection::LowPeak {
                peak: features.peak,
            });
        }
        if features.attack_ms > c.max_attack_ms {
            return Err(GateRejection::SlowAttack {
                attack_ms: features.attack_ms,
            });
        }
        if features.decay_ms > c.max_decay_ms {
            return Err(GateRejection::SlowDecay {
                decay_ms: features.decay_ms,
            });
        }
        if let Some(max_ratio) = c.max_ringing_ratio {
            if features.ringing_ratio > max_ratio {
                return Err(GateRejection::Ringing {
                    ratio: features.ringing_ratio,
                });
            }
        }
        if c.min_flatness > 0.0 && features.flatness < c.min_flatness {
            return Err(GateRejection::Tonal {
                flatness: features.flatness,
            });
        }
        if c.min_hf_ratio > 0.0 && features.hf_ratio < c.min_hf_ratio {
            return Err(GateRejection::Thud {
                hf_ratio: features.hf_ratio,
            });
        }
        Ok(())
    }
}
