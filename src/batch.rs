//! Sequential, failure-tolerant scanning of many images.

use crate::{
    catalog::ClassLabel,
    error::{ConfigError, PredictError},
    model::InferenceEngine,
    pipeline::{PredictionPipeline, TimedPrediction, serialize_millis},
    tensor::RawImage,
};
use serde::Serialize;
use std::time::{Duration, Instant};

/// What happened to one image of a batch.
pub type ImageOutcome = Result<TimedPrediction, PredictError>;

/// Reported after each image of a batch has been processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchProgress {
    /// Zero-based position of the image just processed.
    pub index: usize,
    pub total: usize,
    pub succeeded: bool,
}

impl BatchProgress {
    /// Fraction of the batch done, in `[0, 1]`.
    pub fn fraction(&self) -> f32 {
        if self.total == 0 {
            1.0
        } else {
            (self.index + 1) as f32 / self.total as f32
        }
    }
}

/// The most confident successful prediction of a batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HighestConfidence {
    /// Position of the image in the batch.
    pub image_index: usize,
    pub prediction: TimedPrediction,
}

/// Statistics over the successful predictions of a batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateStats {
    /// Distinct labels in the order they were first seen.
    pub labels: Vec<ClassLabel>,
    pub mean_confidence: f32,
    /// Ties go to the label seen first.
    pub most_frequent: ClassLabel,
    pub most_frequent_count: usize,
    /// Ties go to the earliest image.
    pub highest: HighestConfidence,
}

/// Summary of a batch; explicit when nothing succeeded.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BatchSummary {
    NoSuccessfulPredictions,
    Aggregate(AggregateStats),
}

impl BatchSummary {
    pub fn stats(&self) -> Option<&AggregateStats> {
        match self {
            BatchSummary::NoSuccessfulPredictions => None,
            BatchSummary::Aggregate(stats) => Some(stats),
        }
    }

    fn from_outcomes(outcomes: &[ImageOutcome]) -> Self {
        let successes: Vec<(usize, &TimedPrediction)> = outcomes
            .iter()
            .enumerate()
            .filter_map(|(i, outcome)| outcome.as_ref().ok().map(|p| (i, p)))
            .collect();

        let Some(&(first_index, first)) = successes.first() else {
            return BatchSummary::NoSuccessfulPredictions;
        };

        let mut counts: Vec<(&ClassLabel, usize)> = Vec::new();
        for (_, timed) in &successes {
            let label = &timed.prediction.label;
            match counts.iter_mut().find(|(seen, _)| *seen == label) {
                Some((_, count)) => *count += 1,
                None => counts.push((label, 1)),
            }
        }

        let (most_frequent, most_frequent_count) = counts
            .iter()
            .skip(1)
            .fold(counts[0], |best, &(label, count)| {
                if count > best.1 { (label, count) } else { best }
            });

        let (highest_index, highest) =
            successes
                .iter()
                .skip(1)
                .fold((first_index, first), |best, &(i, timed)| {
                    if timed.prediction.confidence > best.1.prediction.confidence {
                        (i, timed)
                    } else {
                        best
                    }
                });

        let total: f64 = successes
            .iter()
            .map(|(_, t)| f64::from(t.prediction.confidence))
            .sum();

        BatchSummary::Aggregate(AggregateStats {
            labels: counts.iter().map(|(label, _)| (*label).clone()).collect(),
            mean_confidence: (total / successes.len() as f64) as f32,
            most_frequent: most_frequent.clone(),
            most_frequent_count,
            highest: HighestConfidence {
                image_index: highest_index,
                prediction: highest.clone(),
            },
        })
    }
}

/// Result of one batch: one outcome per input image, in input order.
#[derive(Debug)]
pub struct BatchResult {
    pub outcomes: Vec<ImageOutcome>,
    pub total_requested: usize,
    pub total_succeeded: usize,
    pub summary: BatchSummary,
    pub duration: Duration,
}

impl BatchResult {
    pub fn total_failed(&self) -> usize {
        self.total_requested - self.total_succeeded
    }

    pub fn successes(&self) -> impl Iterator<Item = (usize, &TimedPrediction)> {
        self.outcomes
            .iter()
            .enumerate()
            .filter_map(|(i, o)| o.as_ref().ok().map(|p| (i, p)))
    }

    pub fn failures(&self) -> impl Iterator<Item = (usize, &PredictError)> {
        self.outcomes
            .iter()
            .enumerate()
            .filter_map(|(i, o)| o.as_ref().err().map(|e| (i, e)))
    }

    /// JSON-friendly view of the batch.
    pub fn report(&self) -> BatchReport<'_> {
        BatchReport {
            total_requested: self.total_requested,
            total_succeeded: self.total_succeeded,
            duration: self.duration,
            images: self
                .outcomes
                .iter()
                .enumerate()
                .map(|(index, outcome)| match outcome {
                    Ok(prediction) => ImageReport::Success { index, prediction },
                    Err(e) => ImageReport::Failure {
                        index,
                        kind: e.kind(),
                        message: e.to_string(),
                    },
                })
                .collect(),
            summary: &self.summary,
        }
    }
}

/// Serializable form of a [`BatchResult`].
#[derive(Debug, Serialize)]
pub struct BatchReport<'a> {
    pub total_requested: usize,
    pub total_succeeded: usize,
    #[serde(serialize_with = "serialize_millis", rename = "duration_ms")]
    pub duration: Duration,
    pub images: Vec<ImageReport<'a>>,
    pub summary: &'a BatchSummary,
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ImageReport<'a> {
    Success {
        index: usize,
        prediction: &'a TimedPrediction,
    },
    Failure {
        index: usize,
        kind: &'static str,
        message: String,
    },
}

/// Drives a [`PredictionPipeline`] over an ordered list of images.
///
/// Images go through strictly one at a time on the pipeline's shared session.
/// A failed image is recorded and the batch carries on; only a configuration
/// error stops it.
pub struct BatchOrchestrator<'a, E: InferenceEngine> {
    pipeline: &'a PredictionPipeline<E>,
}

impl<'a, E: InferenceEngine> BatchOrchestrator<'a, E> {
    pub fn new(pipeline: &'a PredictionPipeline<E>) -> Self {
        Self { pipeline }
    }

    pub fn run_batch(&self, images: &[RawImage]) -> Result<BatchResult, ConfigError> {
        self.run_batch_with_progress(images, |_| {})
    }

    /// Like [`BatchOrchestrator::run_batch`], calling `on_progress` after every image.
    pub fn run_batch_with_progress<F>(
        &self,
        images: &[RawImage],
        mut on_progress: F,
    ) -> Result<BatchResult, ConfigError>
    where
        F: FnMut(BatchProgress),
    {
        let start = Instant::now();
        let total = images.len();
        log::info!("Starting batch of {total} images");

        let outcomes = images.iter().enumerate().try_fold(
            Vec::with_capacity(total),
            |mut outcomes, (index, image)| {
                let outcome = match self.pipeline.predict_timed(image) {
                    Err(PredictError::Config(e)) => {
                        log::error!("Aborting batch at image {} of {total}: {e}", index + 1);
                        return Err(e);
                    }
                    outcome => outcome,
                };
                if let Err(e) = &outcome {
                    log::warn!("Image {} of {total} failed: {e}", index + 1);
                }
                on_progress(BatchProgress {
                    index,
                    total,
                    succeeded: outcome.is_ok(),
                });
                outcomes.push(outcome);
                Ok(outcomes)
            },
        )?;

        let total_succeeded = outcomes.iter().filter(|o| o.is_ok()).count();
        let summary = BatchSummary::from_outcomes(&outcomes);
        let duration = start.elapsed();
        log::info!("Batch finished: {total_succeeded}/{total} succeeded in {duration:?}");

        Ok(BatchResult {
            outcomes,
            total_requested: total,
            total_succeeded,
            summary,
            duration,
        })
    }
}
