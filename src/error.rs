//! Error taxonomy of the scan pipeline.
//!
//! Errors are split by how far their damage reaches:
//!
//! * [`PreprocessError`] concerns a single image and never touches shared state.
//! * [`LoadError`] means no session could be constructed; the next call retries.
//! * [`InferError`] is a failed forward pass; the session that produced it is dropped.
//! * [`ConfigError`] is a deployment mistake (catalog and model disagree, bad
//!   constants) and must abort rather than retry.

use thiserror::Error;

/// Boxed error produced by an inference backend.
pub type BoxedError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failure turning encoded image bytes into a tensor.
#[derive(Error, Debug)]
pub enum PreprocessError {
    /// The bytes are corrupt or in a format no decoder understands.
    #[error("failed to decode image ({mime}): {source}")]
    DecodeFailed {
        mime: String,
        #[source]
        source: image::ImageError,
    },

    /// The image decoded to an empty pixel grid.
    #[error("invalid image dimensions {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },
}

/// The inference engine could not construct a session.
#[derive(Error, Debug)]
#[error("failed to load model from {source_desc}: {source}")]
pub struct LoadError {
    pub source_desc: String,
    #[source]
    pub source: BoxedError,
}

impl LoadError {
    pub fn new(source_desc: impl Into<String>, source: impl Into<BoxedError>) -> Self {
        Self {
            source_desc: source_desc.into(),
            source: source.into(),
        }
    }
}

/// A forward pass failed.
#[derive(Error, Debug)]
#[error("forward pass failed: {source}")]
pub struct InferError {
    #[source]
    pub source: BoxedError,
}

impl InferError {
    pub fn new(source: impl Into<BoxedError>) -> Self {
        Self {
            source: source.into(),
        }
    }
}

/// Non-recoverable configuration mistake.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("class catalog is empty")]
    EmptyCatalog,

    #[error("class catalog lists '{0}' more than once")]
    DuplicateLabel(String),

    #[error("model produced {actual} scores but the catalog has {expected} classes")]
    OutputMismatch { expected: usize, actual: usize },

    /// A raw score was NaN or infinite, so no probability can be derived from it.
    #[error("model score at index {index} is not finite")]
    NonFiniteScore { index: usize },

    #[error("invalid preprocessing parameters: {0}")]
    InvalidPreprocess(String),

    #[error("failed to read class catalog {path}: {message}")]
    CatalogUnreadable { path: String, message: String },
}

/// Everything that can go wrong in a single prediction.
#[derive(Error, Debug)]
pub enum PredictError {
    /// The session could not be loaded; the pipeline stays uninitialized.
    #[error("inference engine unavailable: {0}")]
    EngineUnavailable(#[from] LoadError),

    #[error("preprocessing failed: {0}")]
    Preprocess(#[from] PreprocessError),

    /// The forward pass failed and the session was discarded.
    #[error("inference failed: {0}")]
    InferenceFailed(#[from] InferError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl PredictError {
    /// Whether this error caused the cached session to be dropped.
    pub fn invalidates_session(&self) -> bool {
        matches!(self, PredictError::InferenceFailed(_))
    }

    /// Whether this error must abort a batch instead of being recorded per image.
    pub fn is_fatal(&self) -> bool {
        matches!(self, PredictError::Config(_))
    }

    /// Whether the image itself was rejected before reaching the engine.
    ///
    /// Such errors leave the session untouched. Every non-fatal error is
    /// still recorded against its image in a batch.
    pub fn is_preprocess(&self) -> bool {
        matches!(self, PredictError::Preprocess(_))
    }

    /// Short machine-friendly tag for reports.
    pub fn kind(&self) -> &'static str {
        match self {
            PredictError::EngineUnavailable(_) => "engine_unavailable",
            PredictError::Preprocess(PreprocessError::DecodeFailed { .. }) => "decode_failed",
            PredictError::Preprocess(PreprocessError::InvalidDimensions { .. }) => {
                "invalid_dimensions"
            }
            PredictError::InferenceFailed(_) => "inference_failed",
            PredictError::Config(_) => "config",
        }
    }
}
