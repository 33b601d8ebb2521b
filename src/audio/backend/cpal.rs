// Desktop microphone capture through cpal

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SampleRate, StreamConfig};

use super::CaptureThread;
use crate::audio::buffer_pool::FrameProducer;
use crate::audio::frame::I16_SCALE;
use crate::audio::source::{AudioSource, CaptureParams};
use crate::error::AudioError;

/// Microphone source backed by the host's default (or a named) input device
///
/// The device is asked for mono at the pipeline sample rate. Multi-channel
/// devices are downmixed by averaging.
pub struct CpalSource {
    device_name: Option<String>,
    capture: Option<CaptureThread>,
}

impl CpalSource {
    pub fn default_device() -> Self {
        Self {
            device_name: None,
            capture: None,
        }
    }

    /// Capture from the input device whose name matches `name`
    pub fn with_device(name: impl Into<String>) -> Self {
        Self {
            device_name: Some(name.into()),
            capture: None,
        }
    }
}

fn find_device(name: Option<&str>) -> Result<cpal::Device, AudioError> {
    let host = cpal::default_host();
    match name {
        None => host
            .default_input_device()
            .ok_or_else(|| AudioError::DeviceUnavailable {
                reason: "No default input device found".to_string(),
            }),
        Some(wanted) => {
            let devices = host
                .input_devices()
                .map_err(|e| AudioError::DeviceUnavailable {
                    reason: format!("Failed to enumerate input devices: {}", e),
                })?;
            for device in devices {
                if device.name().map(|n| n == wanted).unwrap_or(false) {
                    return Ok(device);
                }
            }
            Err(AudioError::DeviceUnavailable {
                reason: format!("Input device '{}' not found", wanted),
            })
        }
    }
}

/// Pick a supported config at `sample_rate`, preferring f32 then i16
fn resolve_config(
    device: &cpal::Device,
    sample_rate: u32,
) -> Result<(StreamConfig, SampleFormat), AudioError> {
    let desired = SampleRate(sample_rate);
    let ranges: Vec<_> = device
        .supported_input_configs()
        .map_err(|e| AudioError::DeviceUnavailable {
            reason: format!("Failed to query input configs: {}", e),
        })?
        .filter(|c| c.min_sample_rate() <= desired && desired <= c.max_sample_rate())
        .collect();

    for format in [SampleFormat::F32, SampleFormat::I16] {
        let mut candidates: Vec<_> = ranges
            .iter()
            .filter(|c| c.sample_format() == format)
            .collect();
        // Fewest channels first so mono wins when offered
        candidates.sort_by_key(|c| c.channels());
        if let Some(range) = candidates.first() {
            let config: StreamConfig = (*range).clone().with_sample_rate(desired).into();
            return Ok((config, format));
        }
    }

    Err(AudioError::UnsupportedFormat {
        details: format!("no f32 or i16 input config at {} Hz", sample_rate),
    })
}

fn open_stream(
    device_name: Option<&str>,
    params: CaptureParams,
    mut producer: FrameProducer,
) -> Result<cpal::Stream, AudioError> {
    let device = find_device(device_name)?;
    let (config, format) = resolve_config(&device, params.sample_rate)?;
    let channels = config.channels.max(1) as usize;

    log::info!(
        "[CpalSource] Opening '{}' at {} Hz, {} channel(s), {:?}",
        device.name().unwrap_or_else(|_| "unknown".to_string()),
        config.sample_rate.0,
        channels,
        format
    );

    let reporter = producer.error_reporter();
    let err_fn = move |err: cpal::StreamError| {
        reporter.report(AudioError::StreamInterrupted {
            reason: err.to_string(),
        });
    };

    // Scratch for downmixing, sized on first callback
    let mut mono: Vec<f32> = Vec::new();

    let stream = match format {
        SampleFormat::F32 => device.build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                if channels == 1 {
                    producer.write(data);
                } else {
                    downmix_f32(data, channels, &mut mono);
                    producer.write(&mono);
                }
            },
            err_fn,
            None,
        ),
        SampleFormat::I16 => device.build_input_stream(
            &config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                if channels == 1 {
                    producer.write_i16(data);
                } else {
                    downmix_i16(data, channels, &mut mono);
                    producer.write(&mono);
                }
            },
            err_fn,
            None,
        ),
        other => {
            return Err(AudioError::UnsupportedFormat {
                details: format!("{:?}", other),
            })
        }
    }
    .map_err(|e| AudioError::DeviceUnavailable {
        reason: format!("Failed to build input stream: {}", e),
    })?;

    stream.play().map_err(|e| AudioError::DeviceUnavailable {
        reason: format!("Failed to start input stream: {}", e),
    })?;

    Ok(stream)
}

/// Average interleaved channels into `out`
fn downmix_f32(data: &[f32], channels: usize, out: &mut Vec<f32>) {
    out.clear();
    out.extend(
        data.chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32),
    );
}

fn downmix_i16(data: &[i16], channels: usize, out: &mut Vec<f32>) {
    out.clear();
    out.extend(data.chunks(channels).map(|frame| {
        frame.iter().map(|&s| s as f32 * I16_SCALE).sum::<f32>() / channels as f32
    }));
}

impl AudioSource for CpalSource {
    fn name(&self) -> &str {
        "cpal"
    }

    fn start(&mut self, params: CaptureParams, producer: FrameProducer) -> Result<(), AudioError> {
        if self.capture.is_some() {
            return Err(AudioError::AlreadyRunning);
        }

        let device_name = self.device_name.clone();
        let capture = CaptureThread::spawn("clap-capture", move || {
            open_stream(device_name.as_deref(), params, producer)
        })?;
        self.capture = Some(capture);
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(capture) = self.capture.take() {
            capture.shutdown();
            log::info!("[CpalSource] Capture stopped");
        }
    }

    fn is_running(&self) -> bool {
        self.capture.is_some()
    }
}

impl Drop for CpalSource {
    fn drop(&mut self) {
        self.stop();
    }
}
