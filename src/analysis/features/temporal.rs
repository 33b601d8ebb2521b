// Temporal module - Time-domain feature extraction
//
// Level, zero-crossing rate and the attack/decay envelope of the loudest
// transient in a window, plus how loud the window is outside it.

/// Attack is measured back to the first sample below this fraction of peak
const ATTACK_FRACTION: f32 = 0.1;
/// Decay is measured forward to the first sample below this fraction of peak
const DECAY_FRACTION: f32 = 0.2;
/// Longest lookback when searching for the attack start
const ATTACK_LOOKBACK_MS: f32 = 50.0;
/// Longest lookahead when searching for the decay end
const DECAY_LOOKAHEAD_MS: f32 = 200.0;
/// Margin around the transient excluded from the secondary peak search
const RINGING_MARGIN_MS: f32 = 10.0;

/// Attack and decay of the loudest sample in a window
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EnvelopeTiming {
    pub peak_index: usize,
    pub attack_ms: f32,
    pub decay_ms: f32,
    /// Secondary peak outside the transient over the main peak
    pub ringing_ratio: f32,
}

/// Temporal feature computation functions
pub struct TemporalFeatures {
    sample_rate: u32,
}

impl TemporalFeatures {
    pub fn new(sample_rate: u32) -> Self {
        Self { sample_rate }
    }

    /// Peak absolute amplitude
    pub fn compute_peak(&self, audio: &[f32]) -> f32 {
        audio.iter().fold(0.0f32, |acc, &x| acc.max(x.abs()))
    }

    /// Root-mean-square level
    pub fn compute_rms(&self, audio: &[f32]) -> f32 {
        if audio.is_empty() {
            return 0.0;
        }
        (audio.iter().map(|&x| x * x).sum::<f32>() / audio.len() as f32).sqrt()
    }

    /// Compute zero-crossing rate (ZCR)
    ///
    /// Formula: ZCR = crossings / (N - 1)
    ///
    /// # Returns
    /// Zero-crossing rate (0.0 to 1.0)
    pub fn compute_zcr(&self, audio: &[f32]) -> f32 {
        if audio.len() < 2 {
            return 0.0;
        }

        let crossings = audio
            .windows(2)
            .filter(|pair| (pair[1] >= 0.0) != (pair[0] >= 0.0))
            .count();

        crossings as f32 / (audio.len() - 1) as f32
    }

    /// Attack and decay times around the peak sample
    ///
    /// Attack scans backwards from the peak (at most 50 ms) for the first
    /// sample under 10% of peak; if none is found the whole lookback counts
    /// as attack. Decay scans forwards (at most 200 ms) for the first sample
    /// under 20% of peak; if none is found the decay runs to the window end.
    /// The ringing ratio compares the loudest sample more than 10 ms away
    /// from that attack/decay span with the peak.
    pub fn compute_envelope(&self, audio: &[f32]) -> EnvelopeTiming {
        let Some((peak_index, peak)) = audio
            .iter()
            .map(|x| x.abs())
            .enumerate()
            .fold(None, |best: Option<(usize, f32)>, (i, a)| match best {
                Some((_, b)) if b >= a => best,
                _ => Some((i, a)),
            })
        else {
            return EnvelopeTiming::default();
        };

        if peak < 1e-6 {
            return EnvelopeTiming::default();
        }

        let samples_per_ms = self.sample_rate as f32 / 1000.0;

        let lookback = (ATTACK_LOOKBACK_MS * samples_per_ms) as usize;
        let scan_start = peak_index.saturating_sub(lookback);
        let attack_threshold = peak * ATTACK_FRACTION;
        let start = (scan_start..=peak_index)
            .rev()
            .find(|&i| audio[i].abs() < attack_threshold)
            .unwrap_or(scan_start);

        let lookahead = (DECAY_LOOKAHEAD_MS * samples_per_ms) as usize;
        let scan_end = (peak_index + lookahead).min(audio.len());
        let decay_threshold = peak * DECAY_FRACTION;
        let end = (peak_index..scan_end)
            .find(|&i| audio[i].abs() < decay_threshold)
            .unwrap_or(audio.len() - 1);

        let margin = (RINGING_MARGIN_MS * samples_per_ms) as usize;
        let excluded = start.saturating_sub(margin)..=(end + margin);
        let secondary = audio
            .iter()
            .enumerate()
            .filter(|(i, _)| !excluded.contains(i))
            .fold(0.0f32, |acc, (_, x)| acc.max(x.abs()));

        EnvelopeTiming {
            peak_index,
            attack_ms: (peak_index - start) as f32 / samples_per_ms,
            decay_ms: (end - peak_index) as f32 / samples_per_ms,
            ringing_ratio: secondary / peak,
        }
    }
}
