//! Single-image prediction: preprocess, run, classify.

use crate::{
    catalog::ClassCatalog,
    classifier::{Classifier, Prediction},
    engine::{SessionSlot, SessionState},
    error::PredictError,
    model::{InferenceEngine, ModelSource},
    tensor::{PreprocessConfig, RawImage, TensorBuilder},
};
use serde::Serialize;
use std::time::{Duration, Instant};

/// Everything needed to assemble a [`PredictionPipeline`].
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub model: ModelSource,
    pub catalog: ClassCatalog,
    pub preprocess: PreprocessConfig,
}

impl PipelineConfig {
    /// Default preprocessing with the given model and catalog.
    pub fn new(model: impl Into<ModelSource>, catalog: ClassCatalog) -> Self {
        Self {
            model: model.into(),
            catalog,
            preprocess: PreprocessConfig::default(),
        }
    }

    pub fn with_preprocess(mut self, preprocess: PreprocessConfig) -> Self {
        self.preprocess = preprocess;
        self
    }
}

/// A prediction together with the wall-clock time it took.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimedPrediction {
    #[serde(flatten)]
    pub prediction: Prediction,
    /// From call entry until the prediction was classified.
    #[serde(serialize_with = "serialize_millis", rename = "duration_ms")]
    pub duration: Duration,
}

pub(crate) fn serialize_millis<S: serde::Serializer>(
    duration: &Duration,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_secs_f64() * 1000.0)
}

/// Composes preprocessing, the cached inference session and classification.
///
/// The session is loaded on the first call, reused afterwards and discarded
/// whenever a forward pass fails, so the next call starts from a fresh load.
/// A bad image never affects the session.
pub struct PredictionPipeline<E: InferenceEngine> {
    builder: TensorBuilder,
    slot: SessionSlot<E>,
    classifier: Classifier,
}

impl<E: InferenceEngine> PredictionPipeline<E> {
    pub fn new(engine: E, config: PipelineConfig) -> Self {
        let PipelineConfig {
            model,
            catalog,
            preprocess,
        } = config;
        Self {
            builder: TensorBuilder::new(preprocess),
            slot: SessionSlot::new(engine, model, catalog.len()),
            classifier: Classifier::new(catalog),
        }
    }

    pub fn catalog(&self) -> &ClassCatalog {
        self.classifier.catalog()
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    pub fn engine(&self) -> &E {
        self.slot.engine()
    }

    pub fn state(&self) -> SessionState {
        self.slot.state()
    }

    /// Number of model loads performed so far.
    pub fn load_count(&self) -> usize {
        self.slot.load_count()
    }

    /// Loads the session now instead of on the first prediction.
    pub fn warm_up(&self) -> Result<(), PredictError> {
        self.slot.acquire().map(drop)
    }

    /// Drops the cached session.
    pub fn invalidate(&self) {
        self.slot.invalidate();
    }

    /// Classifies one image.
    pub fn predict(&self, image: &RawImage) -> Result<Prediction, PredictError> {
        self.predict_timed(image).map(|timed| timed.prediction)
    }

    /// Classifies one image and reports how long it took.
    pub fn predict_timed(&self, image: &RawImage) -> Result<TimedPrediction, PredictError> {
        let start = Instant::now();

        let mut session = self.slot.acquire()?;
        let tensor = self.builder.build(image)?;
        let scores = session.run(&tensor)?;
        drop(session);

        let prediction = self.classifier.interpret(&scores)?;
        let duration = start.elapsed();
        log::debug!(
            "Predicted {} ({:.4}) in {:?}",
            prediction.label,
            prediction.confidence,
            duration
        );

        Ok(TimedPrediction {
            prediction,
            duration,
        })
    }
}
