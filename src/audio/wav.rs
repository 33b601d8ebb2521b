// WAV clip loading for offline detection and replay through SyntheticSource

use std::path::Path;

use crate::error::AudioError;

/// Mono f32 clip decoded from a WAV file
#[derive(Debug, Clone, PartialEq)]
pub struct WavClip {
    pub sample_rate: u32,
    pub samples: Vec<f32>,
}

impl WavClip {
    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        self.samples.len() as u64 * 1000 / self.sample_rate as u64
    }
}

fn read_failed(path: &Path, err: impl std::fmt::Display) -> AudioError {
    AudioError::UnsupportedFormat {
        details: format!("error reading {}: {err}", path.display()),
    }
}

fn int_samples<T, R>(
    reader: &mut hound::WavReader<R>,
    path: &Path,
    scale: f32,
) -> Result<Vec<f32>, AudioError>
where
    T: hound::Sample + Into<i32>,
    R: std::io::Read,
{
    reader
        .samples::<T>()
        .map(|sample| {
            sample
                .map(|v| v.into() as f32 * scale)
                .map_err(|err| read_failed(path, err))
        })
        .collect()
}

/// Load a WAV file and downmix it to mono
///
/// Integer PCM is normalized by its full-scale value (1/32768 for 16-bit).
///
/// # Errors
/// `AudioError::UnsupportedFormat` if the file cannot be opened or decoded,
/// has zero channels or uses an unsupported bit depth.
pub fn load_wav(path: impl AsRef<Path>) -> Result<WavClip, AudioError> {
    let path = path.as_ref();
    let mut reader = hound::WavReader::open(path).map_err(|err| AudioError::UnsupportedFormat {
        details: format!("failed to open {}: {err}", path.display()),
    })?;
    let spec = reader.spec();
    if spec.channels == 0 {
        return Err(AudioError::UnsupportedFormat {
            details: format!("{} has zero channels", path.display()),
        });
    }

    let interleaved = match (spec.sample_format, spec.bits_per_sample) {
        (hound::SampleFormat::Float, 32) => reader
            .samples::<f32>()
            .map(|sample| sample.map_err(|err| read_failed(path, err)))
            .collect::<Result<Vec<f32>, _>>()?,
        (hound::SampleFormat::Int, 16) => {
            int_samples::<i16, _>(&mut reader, path, super::frame::I16_SCALE)?
        }
        (hound::SampleFormat::Int, 24) => {
            int_samples::<i32, _>(&mut reader, path, 1.0 / (1 << 23) as f32)?
        }
        (hound::SampleFormat::Int, 32) => {
            int_samples::<i32, _>(&mut reader, path, 1.0 / 2_147_483_648.0)?
        }
        (format, bits) => {
            return Err(AudioError::UnsupportedFormat {
                details: format!(
                    "{:?} with {} bits per sample in {}",
                    format,
                    bits,
                    path.display()
                ),
            })
        }
    };

    let channels = spec.channels as usize;
    let samples = if channels == 1 {
        interleaved
    } else {
        interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    };

    log::debug!(
        "[wav] Loaded {} ({} Hz, {} channels, {} samples)",
        path.display(),
        spec.sample_rate,
        spec.channels,
        samples.len()
    );

    Ok(WavClip {
        sample_rate: spec.sample_rate,
        samples,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn temp_wav(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("clap_to_find_{}_{}.wav", std::process::id(), name))
    }

    fn write_i16(path: &Path, channels: u16, samples: &[i16]) {
        let spec = hound::WavSpec {
            channels,
            sample_rate: 16_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for &s in samples {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_load_mono_i16() {
        let path = temp_wav("mono");
        write_i16(&path, 1, &[0, 16_384, -32_768]);

        let clip = load_wav(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(clip.sample_rate, 16_000);
        assert_eq!(clip.samples, vec![0.0, 0.5, -1.0]);
    }

    #[test]
    fn test_stereo_is_downmixed() {
        let path = temp_wav("stereo");
        write_i16(&path, 2, &[16_384, 0, -16_384, -16_384]);

        let clip = load_wav(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(clip.samples, vec![0.25, -0.5]);
    }

    #[test]
    fn test_duration() {
        let clip = WavClip {
            sample_rate: 16_000,
            samples: vec![0.0; 8_000],
        };
        assert_eq!(clip.duration_ms(), 500);
    }

    #[test]
    fn test_missing_file_is_rejected() {
        let err = load_wav("/nonexistent/clip.wav").unwrap_err();
        assert!(matches!(err, AudioError::UnsupportedFormat { .. }));
    }
}
