// PcmFrame - fixed-size block of mono samples produced by an audio source

/// Scale factor mapping signed 16-bit PCM onto [-1.0, 1.0)
pub const I16_SCALE: f32 = 1.0 / 32768.0;

/// One block of mono PCM samples
///
/// `start_sample` is the absolute index of `samples[0]` counted from the
/// moment capture started. Consecutive frames from one source are
/// contiguous, so a jump in `start_sample` means frames were dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct PcmFrame {
    pub start_sample: u64,
    pub samples: Vec<f32>,
}

impl PcmFrame {
    pub fn new(start_sample: u64, samples: Vec<f32>) -> Self {
        Self {
            start_sample,
            samples,
        }
    }

    /// Build a frame from signed 16-bit PCM, normalizing by 1/32768
    pub fn from_i16(start_sample: u64, pcm: &[i16]) -> Self {
        Self {
            start_sample,
            samples: pcm.iter().map(|&s| s as f32 * I16_SCALE).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Index of the first sample after this frame
    pub fn end_sample(&self) -> u64 {
        self.start_sample + self.samples.len() as u64
    }
}
