//! ONNX Runtime clap model.
//!
//! Loads a clap classifier exported to ONNX. The model takes either one
//! feature vector of shape `[1, N]` (the spectrum or the log-mel bands) or a
//! rolling log-mel matrix of shape `[1, mels, frames]`. It may return one
//! value or a whole class vector; `output_index` selects the clap class,
//! which is read as a probability or a logit.

use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use super::classifier::ClapModel;
use super::features::FeatureVector;
use crate::error::PipelineError;

/// Level the mel history holds before real frames arrive (dB)
const STACK_SILENCE_DB: f32 = -100.0;

/// Which part of the feature vector the model consumes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelInput {
    Spectrum,
    LogMel,
    /// The last `frames` log-mel vectors, oldest first
    StackedLogMel { frames: usize },
}

/// Rolling log-mel history, stored frame after frame
#[derive(Debug)]
struct MelStack {
    bands: usize,
    frames: usize,
    history: Vec<f32>,
    next: usize,
}

impl MelStack {
    fn new(bands: usize, frames: usize) -> Self {
        Self {
            bands,
            frames,
            history: vec![STACK_SILENCE_DB; bands * frames],
            next: 0,
        }
    }

    fn push(&mut self, mel: &[f32]) {
        let start = self.next * self.bands;
        self.history[start..start + self.bands].copy_from_slice(mel);
        self.next = (self.next + 1) % self.frames;
    }

    /// Lay the history out as `[mels][frames]`, oldest frame first
    fn write_ordered(&self, out: &mut Vec<f32>) {
        out.clear();
        for band in 0..self.bands {
            for t in 0..self.frames {
                let frame = (self.next + t) % self.frames;
                out.push(self.history[frame * self.bands + band]);
            }
        }
    }

    fn clear(&mut self) {
        self.history.fill(STACK_SILENCE_DB);
        self.next = 0;
    }
}

/// Everything inference mutates, behind one lock
#[derive(Debug)]
struct InferenceState {
    session: Session,
    /// Input tensor data, reused across windows
    input: Vec<f32>,
    stack: Option<MelStack>,
}

#[derive(Debug)]
pub struct OnnxClapModel {
    state: Mutex<InferenceState>,
    input_name: String,
    output_name: String,
    input: ModelInput,
    input_len: usize,
    output_len: usize,
    output_index: usize,
    output_is_logit: bool,
}

fn unavailable(e: impl std::fmt::Display) -> PipelineError {
    PipelineError::ModelUnavailable {
        reason: e.to_string(),
    }
}

fn inference(e: impl std::fmt::Display) -> PipelineError {
    PipelineError::InferenceFailed {
        reason: e.to_string(),
    }
}

impl OnnxClapModel {
    /// Load the model and run one warmup inference on a silent input
    ///
    /// # Arguments
    /// * `model_path` - Path to the `.onnx` file
    /// * `input` - Feature vector field fed to the model
    /// * `input_len` - Expected length of that field (bins or mel bands)
    ///
    /// # Errors
    /// `PipelineError::ModelUnavailable` if the file cannot be loaded, the
    /// stacked geometry is empty or the warmup inference fails.
    pub fn load(
        model_path: impl AsRef<Path>,
        input: ModelInput,
        input_len: usize,
    ) -> Result<Self, PipelineError> {
        let path = model_path.as_ref();
        if !path.exists() {
            return Err(unavailable(format!("{} does not exist", path.display())));
        }
        if input_len == 0 {
            return Err(unavailable("model input length must be > 0"));
        }
        let stack = match input {
            ModelInput::StackedLogMel { frames: 0 } => {
                return Err(unavailable("stacked input needs at least one frame"));
            }
            ModelInput::StackedLogMel { frames } => Some(MelStack::new(input_len, frames)),
            ModelInput::Spectrum | ModelInput::LogMel => None,
        };

        let session = Session::builder()
            .map_err(unavailable)?
            .with_inter_threads(1)
            .map_err(unavailable)?
            .with_intra_threads(1)
            .map_err(unavailable)?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(unavailable)?
            .commit_from_file(path)
            .map_err(unavailable)?;

        let input_name = session
            .inputs
            .first()
            .map(|i| i.name.clone())
            .ok_or_else(|| unavailable("model has no inputs"))?;
        let output_name = session
            .outputs
            .first()
            .map(|o| o.name.clone())
            .ok_or_else(|| unavailable("model has no outputs"))?;

        let mut state = InferenceState {
            session,
            input: Vec::with_capacity(input_len * stack.as_ref().map_or(1, |s| s.frames)),
            stack,
        };
        match &state.stack {
            Some(stack) => stack.write_ordered(&mut state.input),
            None => state.input.resize(input_len, 0.0),
        }
        let (output_len, _) = run_session(&mut state, &input_name, &output_name, 0)
            .map_err(|e| unavailable(format!("warmup inference failed: {}", e)))?;
        if output_len == 0 {
            return Err(unavailable("model output is empty"));
        }

        log::info!(
            "[OnnxClapModel] Loaded {} ({:?} input, {} values, {} outputs)",
            path.display(),
            input,
            input_len,
            output_len
        );
        Ok(Self {
            state: Mutex::new(state),
            input_name,
            output_name,
            input,
            input_len,
            output_len,
            output_index: 0,
            output_is_logit: false,
        })
    }

    /// Read the clap score from this position of the output tensor
    ///
    /// # Errors
    /// `PipelineError::ModelUnavailable` if the model has fewer outputs.
    pub fn with_output_index(mut self, output_index: usize) -> Result<Self, PipelineError> {
        if output_index >= self.output_len {
            return Err(unavailable(format!(
                "output index {} out of range, model has {} outputs",
                output_index, self.output_len
            )));
        }
        self.output_index = output_index;
        Ok(self)
    }

    /// Treat the model output as a logit and apply a sigmoid
    pub fn with_logit_output(mut self, output_is_logit: bool) -> Self {
        self.output_is_logit = output_is_logit;
        self
    }

    fn lock(&self) -> Result<MutexGuard<'_, InferenceState>, PipelineError> {
        self.state
            .lock()
            .map_err(|_| inference("session lock poisoned"))
    }
}

/// Run the session on `state.input`
///
/// Returns the length of the first output tensor and its value at `index`.
fn run_session(
    state: &mut InferenceState,
    input_name: &str,
    output_name: &str,
    index: usize,
) -> Result<(usize, Option<f32>), PipelineError> {
    let tensor = match &state.stack {
        Some(stack) => {
            TensorRef::from_array_view(([1usize, stack.bands, stack.frames], state.input.as_slice()))
        }
        None => TensorRef::from_array_view(([1usize, state.input.len()], state.input.as_slice())),
    }
    .map_err(inference)?;

    let outputs = state
        .session
        .run(ort::inputs![input_name => tensor])
        .map_err(inference)?;
    let output = outputs
        .get(output_name)
        .ok_or_else(|| inference("missing model output"))?;
    let (_shape, data) = output.try_extract_tensor::<f32>().map_err(inference)?;
    Ok((data.len(), data.get(index).copied()))
}

impl ClapModel for OnnxClapModel {
    fn name(&self) -> &str {
        "onnx"
    }

    fn predict(&self, features: &FeatureVector) -> Result<f32, PipelineError> {
        let mut guard = self.lock()?;
        let state = &mut *guard;

        match self.input {
            ModelInput::Spectrum | ModelInput::LogMel => {
                let values = if self.input == ModelInput::Spectrum {
                    &features.spectrum
                } else {
                    &features.mel
                };
                if values.len() != self.input_len {
                    return Err(inference(format!(
                        "expected {} input values, got {}",
                        self.input_len,
                        values.len()
                    )));
                }
                state.input.clear();
                state.input.extend_from_slice(values);
            }
            ModelInput::StackedLogMel { .. } => {
                if let Some(stack) = &state.stack {
                    stack.write_ordered(&mut state.input);
                }
            }
        }

        let raw = run_session(state, &self.input_name, &self.output_name, self.output_index)?
            .1
            .ok_or_else(|| inference("output shorter than at load time"))?;
        Ok(if self.output_is_logit {
            1.0 / (1.0 + (-raw).exp())
        } else {
            raw
        })
    }

    fn observe(&self, features: &FeatureVector) {
        if !matches!(self.input, ModelInput::StackedLogMel { .. }) {
            return;
        }
        if features.mel.len() != self.input_len {
            log::warn!(
                "[OnnxClapModel] Skipping mel frame of {} bands, expected {}",
                features.mel.len(),
                self.input_len
            );
            return;
        }
        if let Ok(mut state) = self.state.lock() {
            if let Some(stack) = state.stack.as_mut() {
                stack.push(&features.mel);
            }
        }
    }

    fn reset(&self) {
        if let Ok(mut state) = self.state.lock() {
            if let Some(stack) = state.stack.as_mut() {
                stack.clear();
            }
        }
    }
}
