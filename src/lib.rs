//! On-device crop disease classification.
//!
//! A photograph goes through four stages:
//!
//! 1. [`TensorBuilder`] decodes it and produces the normalised CHW tensor the
//!    model was trained on.
//! 2. An [`InferenceEngine`] runs the forward pass on a lazily loaded session.
//! 3. The [`Classifier`] turns raw scores into a [`Prediction`] through softmax.
//! 4. [`PredictionPipeline`] ties these together for one image;
//!    [`BatchOrchestrator`] runs it over many and aggregates the outcomes.
//!
//! The engine is a trait so that any runtime can be plugged in. With the
//! `onnx` feature, [`onnx::OnnxEngine`] runs ONNX models through ONNX Runtime.
//!
//! ```no_run
//! # #[cfg(feature = "onnx")]
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use cropscan::{ClassCatalog, PipelineConfig, PredictionPipeline, RawImage};
//! use cropscan::onnx::OnnxEngine;
//!
//! let config = PipelineConfig::new(
//!     std::path::PathBuf::from("model/mobilenet_mobile.onnx"),
//!     ClassCatalog::crops(),
//! );
//! let pipeline = PredictionPipeline::new(OnnxEngine::new(), config);
//!
//! let bytes = std::fs::read("leaf.jpg")?;
//! let prediction = pipeline.predict(&RawImage::new(bytes, "image/jpeg"))?;
//! println!("{} ({:.1}%)", prediction.label, prediction.confidence * 100.0);
//! # Ok(())
//! # }
//! # #[cfg(not(feature = "onnx"))]
//! # fn main() {}
//! ```

pub mod batch;
pub mod catalog;
pub mod classifier;
pub mod engine;
pub mod error;
pub mod model;
pub mod pipeline;
pub mod tensor;

#[cfg(feature = "onnx")]
pub mod onnx;

pub use batch::{
    AggregateStats, BatchOrchestrator, BatchProgress, BatchReport, BatchResult, BatchSummary,
    HighestConfidence, ImageOutcome, ImageReport,
};
pub use catalog::{ClassCatalog, ClassLabel};
pub use classifier::{Classifier, ConfidenceLevel, Prediction, softmax};
pub use engine::{ActiveSession, SessionSlot, SessionState};
pub use error::{ConfigError, InferError, LoadError, PredictError, PreprocessError};
pub use model::{InferenceEngine, ModelSource};
pub use pipeline::{PipelineConfig, PredictionPipeline, TimedPrediction};
pub use tensor::{PreprocessConfig, RawImage, Tensor, TensorBuilder};
