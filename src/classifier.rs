//! Turns raw model scores into a calibrated [`Prediction`].

use crate::{
    catalog::{ClassCatalog, ClassLabel},
    error::ConfigError,
};
use serde::Serialize;

/// Confidence at or above which a prediction counts as [`ConfidenceLevel::High`].
pub const HIGH_CONFIDENCE: f32 = 0.9;
/// Confidence at or above which a prediction counts as [`ConfidenceLevel::Medium`].
pub const MEDIUM_CONFIDENCE: f32 = 0.7;

/// Coarse bucket of a prediction's confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceLevel {
    Low,
    Medium,
    High,
}

impl ConfidenceLevel {
    pub fn from_confidence(confidence: f32) -> Self {
        if confidence >= HIGH_CONFIDENCE {
            ConfidenceLevel::High
        } else if confidence >= MEDIUM_CONFIDENCE {
            ConfidenceLevel::Medium
        } else {
            ConfidenceLevel::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConfidenceLevel::Low => "low",
            ConfidenceLevel::Medium => "medium",
            ConfidenceLevel::High => "high",
        }
    }
}

/// The winning class of one inference and its softmax probability.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    pub label: ClassLabel,
    /// Position of `label` in the catalog.
    pub index: usize,
    /// Probability in `[0, 1]`.
    pub confidence: f32,
}

impl Prediction {
    pub fn confidence_level(&self) -> ConfidenceLevel {
        ConfidenceLevel::from_confidence(self.confidence)
    }
}

/// Numerically stable softmax.
///
/// The maximum is subtracted before exponentiating so large scores do not
/// overflow. An empty input yields an empty output.
pub fn softmax(scores: &[f32]) -> Vec<f32> {
    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = scores.iter().map(|s| (s - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

/// Index of the first maximum, so ties resolve to the lowest index.
fn argmax(values: &[f32]) -> Option<usize> {
    values
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, f32)>, (i, &v)| match best {
            Some((_, b)) if v <= b => best,
            _ => Some((i, v)),
        })
        .map(|(i, _)| i)
}

/// Interprets output vectors against a fixed catalog.
#[derive(Debug, Clone)]
pub struct Classifier {
    catalog: ClassCatalog,
}

impl Classifier {
    pub fn new(catalog: ClassCatalog) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &ClassCatalog {
        &self.catalog
    }

    /// Full probability distribution over the catalog.
    ///
    /// NaN or infinite scores are rejected rather than propagated into the
    /// distribution.
    pub fn probabilities(&self, raw: &[f32]) -> Result<Vec<f32>, ConfigError> {
        self.catalog.check_output_len(raw.len())?;
        if let Some(index) = raw.iter().position(|s| !s.is_finite()) {
            return Err(ConfigError::NonFiniteScore { index });
        }
        Ok(softmax(raw))
    }

    /// Best class and its probability.
    ///
    /// A vector whose length differs from the catalog is a deployment error,
    /// never defaulted to some class.
    pub fn interpret(&self, raw: &[f32]) -> Result<Prediction, ConfigError> {
        let probabilities = self.probabilities(raw)?;
        let index = argmax(&probabilities).ok_or(ConfigError::OutputMismatch {
            expected: self.catalog.len(),
            actual: raw.len(),
        })?;
        let label = self
            .catalog
            .get(index)
            .cloned()
            .ok_or(ConfigError::OutputMismatch {
                expected: self.catalog.len(),
                actual: raw.len(),
            })?;

        Ok(Prediction {
            label,
            index,
            confidence: probabilities[index],
        })
    }

    /// The `k` most probable classes, best first. Ties keep catalog order.
    pub fn top_k(&self, raw: &[f32], k: usize) -> Result<Vec<(ClassLabel, f32)>, ConfigError> {
        let probabilities = self.probabilities(raw)?;
        let mut ranked: Vec<(usize, f32)> = probabilities.into_iter().enumerate().collect();
        // Stable sort keeps lower indices first among equal probabilities.
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        Ok(ranked
            .into_iter()
            .take(k)
            .filter_map(|(i, p)| self.catalog.get(i).cloned().map(|label| (label, p)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn ab() -> Classifier {
        Classifier::new(ClassCatalog::new(["A", "B"]).unwrap())
    }

    #[test]
    fn softmax_of_two_zero() {
        let p = ab().interpret(&[2.0, 0.0]).unwrap();
        assert_eq!(p.label.as_str(), "A");
        assert_eq!(p.index, 0);
        assert!((p.confidence - 0.880_797).abs() < 1e-5, "{}", p.confidence);
    }

    #[test]
    fn ties_resolve_to_first_index() {
        let p = ab().interpret(&[0.0, 0.0]).unwrap();
        assert_eq!(p.label.as_str(), "A");
        assert_eq!(p.confidence, 0.5);
    }

    #[rstest]
    #[case(vec![1.0, 2.0, 3.0])]
    #[case(vec![1000.0, 999.0, -1000.0])]
    #[case(vec![-50.0, -50.0, -50.0])]
    #[case(vec![0.0, 88.7, 0.1])]
    fn softmax_is_a_distribution(#[case] scores: Vec<f32>) {
        let p = softmax(&scores);
        let sum: f32 = p.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5, "sum {sum}");
        assert!(p.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn large_scores_do_not_overflow() {
        let p = ab().interpret(&[10_000.0, 9_999.0]).unwrap();
        assert!(p.confidence.is_finite());
        assert!((p.confidence - 0.731_058_6).abs() < 1e-5);
    }

    #[rstest]
    #[case(vec![1.0])]
    #[case(vec![1.0, 2.0, 3.0])]
    #[case(vec![])]
    fn wrong_length_is_config_error(#[case] scores: Vec<f32>) {
        let err = ab().interpret(&scores).unwrap_err();
        assert_eq!(
            err,
            ConfigError::OutputMismatch {
                expected: 2,
                actual: scores.len()
            }
        );
    }

    #[rstest]
    #[case(vec![f32::INFINITY, 0.0], 0)]
    #[case(vec![f32::NEG_INFINITY, f32::NEG_INFINITY], 0)]
    #[case(vec![f32::NAN, 1.0], 0)]
    #[case(vec![1.0, f32::NAN], 1)]
    fn non_finite_scores_are_rejected(#[case] scores: Vec<f32>, #[case] index: usize) {
        let classifier = ab();
        assert_eq!(
            classifier.interpret(&scores).unwrap_err(),
            ConfigError::NonFiniteScore { index }
        );
        assert!(classifier.top_k(&scores, 1).is_err());
    }

    #[test]
    fn top_k_is_sorted_with_stable_ties() {
        let classifier = Classifier::new(ClassCatalog::new(["A", "B", "C", "D"]).unwrap());
        let top = classifier.top_k(&[1.0, 3.0, 1.0, 2.0], 3).unwrap();
        let names: Vec<_> = top.iter().map(|(l, _)| l.as_str()).collect();
        assert_eq!(names, ["B", "D", "A"]);
        assert!(top[0].1 > top[1].1 && top[1].1 > top[2].1);
    }

    #[rstest]
    #[case(0.95, ConfidenceLevel::High)]
    #[case(0.9, ConfidenceLevel::High)]
    #[case(0.75, ConfidenceLevel::Medium)]
    #[case(0.7, ConfidenceLevel::Medium)]
    #[case(0.69, ConfidenceLevel::Low)]
    fn confidence_levels(#[case] confidence: f32, #[case] level: ConfidenceLevel) {
        assert_eq!(ConfidenceLevel::from_confidence(confidence), level);
    }
}
