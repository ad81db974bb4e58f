//! [`InferenceEngine`] backed by ONNX Runtime.

use crate::{
    model::{InferenceEngine, ModelSource},
    tensor::Tensor,
};
use ort::{
    session::{Session, builder::GraphOptimizationLevel},
    value::Tensor as OrtTensor,
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OnnxError {
    #[error(transparent)]
    Ort(#[from] ort::Error),

    #[error("model declares no inputs")]
    NoInput,

    #[error("model declares no outputs")]
    NoOutput,
}

/// Graph optimization applied when a session is committed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OptimizationLevel {
    Disable,
    Basic,
    Extended,
    #[default]
    All,
}

impl OptimizationLevel {
    fn to_ort(self) -> GraphOptimizationLevel {
        match self {
            OptimizationLevel::Disable => GraphOptimizationLevel::Disable,
            OptimizationLevel::Basic => GraphOptimizationLevel::Level1,
            OptimizationLevel::Extended => GraphOptimizationLevel::Level2,
            OptimizationLevel::All => GraphOptimizationLevel::Level3,
        }
    }
}

/// A committed ONNX Runtime session plus the tensor names it is fed through.
pub struct OnnxSession {
    session: Session,
    input_name: String,
    output_name: String,
}

impl OnnxSession {
    pub fn input_name(&self) -> &str {
        &self.input_name
    }

    pub fn output_name(&self) -> &str {
        &self.output_name
    }
}

/// Runs single-image classification graphs: `[1, C, H, W]` f32 in, one score
/// per class out.
#[derive(Debug, Clone, Default)]
pub struct OnnxEngine {
    optimization: OptimizationLevel,
    intra_threads: Option<usize>,
}

impl OnnxEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_optimization(mut self, level: OptimizationLevel) -> Self {
        self.optimization = level;
        self
    }

    pub fn with_intra_threads(mut self, threads: usize) -> Self {
        self.intra_threads = Some(threads);
        self
    }
}

impl InferenceEngine for OnnxEngine {
    type Session = OnnxSession;
    type Error = OnnxError;

    fn load(&self, source: &ModelSource) -> Result<OnnxSession, OnnxError> {
        let mut builder = Session::builder()?.with_optimization_level(self.optimization.to_ort())?;
        if let Some(threads) = self.intra_threads {
            builder = builder.with_intra_threads(threads)?;
        }

        let session = match source {
            ModelSource::Path(path) => builder.commit_from_file(path)?,
            ModelSource::Bytes(bytes) => builder.commit_from_memory(bytes)?,
        };

        let input_name = session
            .inputs
            .first()
            .map(|input| input.name.clone())
            .ok_or(OnnxError::NoInput)?;
        let output_name = session
            .outputs
            .first()
            .map(|output| output.name.clone())
            .ok_or(OnnxError::NoOutput)?;
        log::debug!("ONNX session ready: input '{input_name}', output '{output_name}'");

        Ok(OnnxSession {
            session,
            input_name,
            output_name,
        })
    }

    fn run(&self, session: &mut OnnxSession, tensor: &Tensor) -> Result<Vec<f32>, OnnxError> {
        let input = OrtTensor::from_array((tensor.batched_shape(), tensor.as_slice().to_vec()))?;

        let OnnxSession {
            session,
            input_name,
            output_name,
        } = session;
        let outputs = session.run(ort::inputs![input_name.as_str() => input])?;
        let (_, scores) = outputs[output_name.as_str()].try_extract_tensor::<f32>()?;
        Ok(scores.to_vec())
    }
}
