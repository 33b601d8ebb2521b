// Mel module - triangular mel filterbank and log-mel energies
//
// Uses the HTK mel scale, mel = 2595 * log10(1 + f / 700). Filters are
// triangles with unit peak, spaced evenly in mel between fmin and fmax.

/// Power floor applied before taking the log
const LOG_MEL_EPSILON: f32 = 1e-10;

fn hz_to_mel(hz: f32) -> f32 {
    2595.0 * (1.0 + hz / 700.0).log10()
}

fn mel_to_hz(mel: f32) -> f32 {
    700.0 * (10f32.powf(mel / 2595.0) - 1.0)
}

/// One triangular filter stored as its non-zero span
#[derive(Debug, Clone)]
struct MelFilter {
    first_bin: usize,
    weights: Vec<f32>,
}

/// Pre-computed filterbank mapping a power spectrum to log-mel bands
#[derive(Debug, Clone)]
pub struct MelFilterbank {
    filters: Vec<MelFilter>,
}

impl MelFilterbank {
    /// Build `bands` filters for an FFT of `fft_size` at `sample_rate`
    pub fn new(bands: usize, fft_size: usize, sample_rate: u32, fmin: f32, fmax: f32) -> Self {
        let bin_count = fft_size / 2 + 1;
        let bin_hz = sample_rate as f32 / fft_size as f32;

        let mel_min = hz_to_mel(fmin);
        let mel_max = hz_to_mel(fmax);
        let edges: Vec<f32> = (0..bands + 2)
            .map(|i| mel_to_hz(mel_min + (mel_max - mel_min) * i as f32 / (bands + 1) as f32))
            .collect();

        let filters = edges
            .windows(3)
            .map(|edge| {
                let (left, centre, right) = (edge[0], edge[1], edge[2]);
                let mut first_bin = None;
                let mut weights = Vec::new();
                for bin in 0..bin_count {
                    let hz = bin as f32 * bin_hz;
                    let weight = if hz > left && hz <= centre {
                        (hz - left) / (centre - left).max(f32::EPSILON)
                    } else if hz > centre && hz < right {
                        (right - hz) / (right - centre).max(f32::EPSILON)
                    } else {
                        0.0
                    };
                    if weight > 0.0 {
                        first_bin.get_or_insert(bin);
                        weights.push(weight);
                    } else if first_bin.is_some() {
                        break;
                    }
                }
                MelFilter {
                    first_bin: first_bin.unwrap_or(0),
                    weights,
                }
            })
            .collect();

        Self { filters }
    }

    pub fn bands(&self) -> usize {
        self.filters.len()
    }

    /// Log-mel energies in dB, 10 * log10(max(E, 1e-10)), written into `out`
    pub fn log_mel_into(&self, power: &[f32], out: &mut Vec<f32>) {
        out.clear();
        out.extend(self.filters.iter().map(|filter| {
            let energy: f32 = filter
                .weights
                .iter()
                .zip(power.iter().skip(filter.first_bin))
                .map(|(w, p)| w * p)
                .sum();
            10.0 * energy.max(LOG_MEL_EPSILON).log10()
        }));
    }
}
