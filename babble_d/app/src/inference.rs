use anyhow::{Context, Result};
use api::PipelineError;
use log::{info, warn};
use ndarray::Array4;
use ort::execution_providers::{CPUExecutionProvider, ExecutionProviderDispatch};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::{Tensor, ValueType};
use std::path::Path;

/// One forward pass per call, returning the model's flat output vector.
pub trait InferenceRunner: Send {
    /// `(width, height)` the model expects, taken from its declared input.
    fn input_size(&self) -> (u32, u32);
    fn run(&mut self, input: Array4<f32>) -> Result<Vec<f32>>;
}

/// Accelerators to try in order before settling on the CPU.
fn gpu_providers() -> Vec<(&'static str, ExecutionProviderDispatch)> {
    #[allow(unused_mut)]
    let mut providers: Vec<(&'static str, ExecutionProviderDispatch)> = Vec::new();

    #[cfg(target_os = "android")]
    {
        use ort::execution_providers::NNAPIExecutionProvider;
        providers.push(("NNAPI", NNAPIExecutionProvider::default().build().error_on_failure()));
    }

    #[cfg(any(target_os = "macos", target_os = "ios"))]
    {
        use ort::execution_providers::CoreMLExecutionProvider;
        providers.push(("CoreML", CoreMLExecutionProvider::default().build().error_on_failure()));
    }

    #[cfg(not(any(target_os = "android", target_os = "macos", target_os = "ios")))]
    {
        use ort::execution_providers::{CUDAExecutionProvider, ROCmExecutionProvider};

        #[cfg(target_os = "windows")]
        {
            use ort::execution_providers::DirectMLExecutionProvider;
            providers.push(("DirectML", DirectMLExecutionProvider::default().build().error_on_failure()));
        }
        providers.push(("CUDA", CUDAExecutionProvider::default().build().error_on_failure()));
        providers.push(("ROCm", ROCmExecutionProvider::default().build().error_on_failure()));
    }

    providers
}

fn build_session(model_path: &Path, provider: Option<ExecutionProviderDispatch>) -> Result<Session> {
    let mut builder = Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .with_inter_threads(1)?
        .with_memory_pattern(true)?;
    if let Some(provider) = provider {
        builder = builder.with_execution_providers([provider])?;
    }
    let session = builder
        .commit_from_file(model_path)
        .context("Failed to load ONNX model")?;
    Ok(session)
}

pub struct OrtInferenceRunner {
    session: Session,
    input_name: String,
    output_name: String,
    input_size: (u32, u32),
    provider: &'static str,
}

impl OrtInferenceRunner {
    /// Loads `model_path`, walking the accelerator chain when `use_gpu` is set.
    /// The CPU session is the last resort and its failure is the only one returned.
    pub fn setup(model_path: impl AsRef<Path>, use_gpu: bool) -> Result<Self> {
        let model_path = model_path.as_ref();
        if !model_path.is_file() {
            return Err(PipelineError::ModelNotFound(model_path.to_path_buf()).into());
        }

        let mut chosen = None;
        if use_gpu {
            for (name, provider) in gpu_providers() {
                match build_session(model_path, Some(provider)) {
                    Ok(session) => {
                        chosen = Some((name, session));
                        break;
                    }
                    Err(e) => warn!("{} backend unavailable for {:?}: {:#}", name, model_path, e),
                }
            }
        }

        let (provider, session) = match chosen {
            Some(found) => found,
            None => (
                "CPU",
                build_session(model_path, Some(CPUExecutionProvider::default().build()))
                    .with_context(|| format!("CPU session for {:?} failed", model_path))?,
            ),
        };

        let input = session
            .inputs
            .first()
            .ok_or_else(|| PipelineError::TensorShape(format!("{:?} declares no inputs", model_path)))?;
        let input_size = match &input.input_type {
            ValueType::Tensor { shape, .. } if shape.len() >= 4 => {
                (shape[3].max(1) as u32, shape[2].max(1) as u32)
            }
            other => {
                return Err(PipelineError::TensorShape(format!(
                    "{:?} input is not a 4D tensor: {:?}",
                    model_path, other
                ))
                .into())
            }
        };
        let input_name = input.name.clone();
        let output_name = session
            .outputs
            .first()
            .map(|o| o.name.clone())
            .ok_or_else(|| PipelineError::TensorShape(format!("{:?} declares no outputs", model_path)))?;

        info!(
            "Loaded {:?} on {} (input '{}' {}x{})",
            model_path, provider, input_name, input_size.0, input_size.1
        );

        Ok(Self {
            session,
            input_name,
            output_name,
            input_size,
            provider,
        })
    }

    pub fn provider(&self) -> &'static str {
        self.provider
    }
}

impl InferenceRunner for OrtInferenceRunner {
    fn input_size(&self) -> (u32, u32) {
        self.input_size
    }

    fn run(&mut self, input: Array4<f32>) -> Result<Vec<f32>> {
        let input_tensor = Tensor::from_array(input)?;
        let outputs = self
            .session
            .run(ort::inputs![self.input_name.as_str() => input_tensor])
            .map_err(|e| PipelineError::Inference(e.to_string()))?;
        let output: ndarray::ArrayViewD<f32> = outputs[self.output_name.as_str()]
            .try_extract_array()
            .context("Failed to extract output")?;
        Ok(output.iter().copied().collect())
    }
}
