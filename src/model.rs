use crate::tensor::Tensor;
use std::{fmt, path::PathBuf, sync::Arc};

/// Where a serialized model graph comes from. Only the engine interprets it.
#[derive(Clone)]
pub enum ModelSource {
    Path(PathBuf),
    Bytes(Arc<[u8]>),
}

impl ModelSource {
    /// Short human readable description for logs and errors.
    pub fn describe(&self) -> String {
        match self {
            ModelSource::Path(path) => path.display().to_string(),
            ModelSource::Bytes(bytes) => format!("<{} in-memory bytes>", bytes.len()),
        }
    }
}

impl fmt::Debug for ModelSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

impl From<PathBuf> for ModelSource {
    fn from(path: PathBuf) -> Self {
        ModelSource::Path(path)
    }
}

impl From<Vec<u8>> for ModelSource {
    fn from(bytes: Vec<u8>) -> Self {
        ModelSource::Bytes(bytes.into())
    }
}

/// Backend able to load a model and execute forward passes.
///
/// Implement this to plug a runtime into the pipeline. `load` is expensive and
/// is called lazily; `run` is called once per image with the session it returned.
pub trait InferenceEngine {
    /// A loaded, runnable model.
    type Session;
    /// The error type that can be returned by `load` and `run`.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Parses and validates the model graph behind `source`.
    fn load(&self, source: &ModelSource) -> Result<Self::Session, Self::Error>;

    /// Executes a forward pass, returning one raw score per class.
    fn run(&self, session: &mut Self::Session, tensor: &Tensor) -> Result<Vec<f32>, Self::Error>;

    /// Number of scores the session produces, when the backend can tell
    /// without running it.
    fn output_len(&self, _session: &Self::Session) -> Option<usize> {
        None
    }
}
