//! Ordered class catalog shared by the classifier and the model.
//!
//! The catalog order is the model's output order. Swapping the model means
//! swapping the catalog with it.

use crate::error::ConfigError;
use serde::Serialize;
use std::{collections::HashSet, fmt, path::Path, sync::Arc};

/// Classes of the deployed crop model, in training order.
const CROP_CLASSES: [&str; 22] = [
    "Cashew_anthracnose",
    "Cashew_gumosis",
    "Cashew_healthy",
    "Cashew_leaf_miner",
    "Cashew_red_rust",
    "Cassava_bacterial_blight",
    "Cassava_brown_spot",
    "Cassava_green_mite",
    "Cassava_healthy",
    "Cassava_mosaic",
    "Maize_fall_armyworm",
    "Maize_grasshopper",
    "Maize_healthy",
    "Maize_leaf_beetle",
    "Maize_leaf_blight",
    "Maize_leaf_spot",
    "Maize_streak_virus",
    "Tomato_healthy",
    "Tomato_leaf_blight",
    "Tomato_leaf_curl",
    "Tomato_septoria_leaf_spot",
    "Tomato_verticulium_wilt",
];

/// A class name from a [`ClassCatalog`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ClassLabel(Arc<str>);

impl ClassLabel {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lower-case, hyphenated key (`Cassava_mosaic` -> `cassava-mosaic`).
    pub fn slug(&self) -> String {
        self.0.to_lowercase().replace('_', "-")
    }
}

impl fmt::Display for ClassLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Immutable, ordered list of class labels.
///
/// Cloning is cheap: labels are reference counted.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassCatalog {
    labels: Vec<ClassLabel>,
}

impl ClassCatalog {
    /// Builds a catalog, rejecting empty lists and duplicate names.
    pub fn new<I, S>(labels: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for label in labels {
            let label = label.as_ref().trim();
            if !seen.insert(label.to_string()) {
                return Err(ConfigError::DuplicateLabel(label.to_string()));
            }
            out.push(ClassLabel(Arc::from(label)));
        }
        if out.is_empty() {
            return Err(ConfigError::EmptyCatalog);
        }
        Ok(Self { labels: out })
    }

    /// One label per line; blank lines and `#` comments are skipped.
    pub fn from_lines(text: &str) -> Result<Self, ConfigError> {
        Self::new(
            text.lines()
                .map(str::trim)
                .filter(|line| !line.is_empty() && !line.starts_with('#')),
        )
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::CatalogUnreadable {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_lines(&text)
    }

    /// The 22-class cashew, cassava, maize and tomato catalog.
    pub fn crops() -> Self {
        Self {
            labels: CROP_CLASSES
                .iter()
                .map(|name| ClassLabel(Arc::from(*name)))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&ClassLabel> {
        self.labels.get(index)
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.labels.iter().position(|l| l.as_str() == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ClassLabel> {
        self.labels.iter()
    }

    /// Fails unless a model with `output_len` scores fits this catalog.
    pub fn check_output_len(&self, output_len: usize) -> Result<(), ConfigError> {
        if output_len != self.len() {
            return Err(ConfigError::OutputMismatch {
                expected: self.len(),
                actual: output_len,
            });
        }
        Ok(())
    }
}
