//! Bijective mapping between emotion label strings and class indices.
//!
//! The encoding is fitted once, persisted as JSON and reused verbatim by every
//! later training, evaluation and export run so class indices never drift.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum LabelError {
    #[error("Unknown label '{0}' is not part of the fitted label encoding")]
    UnknownLabel(String),
    #[error("Class index {index} out of range for {len} classes")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("Cannot fit a label encoding on an empty label set")]
    Empty,
    #[error("Duplicate label '{0}' in persisted label encoding")]
    Duplicate(String),
    #[error("Failed to access label encoding at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid label encoding at {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Ordered class list; index `i` always maps to `classes[i]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelEncoding {
    classes: Vec<String>,
}

impl LabelEncoding {
    /// Fit an encoding from every label seen, assigning indices in sorted order.
    pub fn fit<I, S>(labels: I) -> Result<Self, LabelError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let set: BTreeSet<String> = labels
            .into_iter()
            .map(|label| label.as_ref().to_string())
            .collect();
        if set.is_empty() {
            return Err(LabelError::Empty);
        }
        Ok(Self {
            classes: set.into_iter().collect(),
        })
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn encode(&self, label: &str) -> Result<usize, LabelError> {
        // Classes are kept sorted by `fit`, but a hand-edited file may not be.
        self.classes
            .iter()
            .position(|class| class == label)
            .ok_or_else(|| LabelError::UnknownLabel(label.to_string()))
    }

    pub fn decode(&self, index: usize) -> Result<&str, LabelError> {
        self.classes
            .get(index)
            .map(String::as_str)
            .ok_or(LabelError::IndexOutOfRange {
                index,
                len: self.classes.len(),
            })
    }

    /// Read a persisted encoding.
    pub fn load(path: &Path) -> Result<Self, LabelError> {
        let bytes = fs::read(path).map_err(|source| LabelError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let encoding: Self = serde_json::from_slice(&bytes).map_err(|source| LabelError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        encoding.validate()?;
        Ok(encoding)
    }

    pub fn save(&self, path: &Path) -> Result<(), LabelError> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| LabelError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|source| LabelError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        fs::write(path, json).map_err(|source| LabelError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Reuse the persisted encoding when present, otherwise fit and persist one.
    ///
    /// `labels` is only consumed on the fit path.
    pub fn load_or_fit<I, S>(path: &Path, labels: I) -> Result<Self, LabelError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if path.exists() {
            let encoding = Self::load(path)?;
            info!(
                "Loaded label encoding with {} classes from {}",
                encoding.len(),
                path.display()
            );
            return Ok(encoding);
        }
        let encoding = Self::fit(labels)?;
        encoding.save(path)?;
        info!(
            "Fitted label encoding with {} classes, saved to {}",
            encoding.len(),
            path.display()
        );
        Ok(encoding)
    }

    fn validate(&self) -> Result<(), LabelError> {
        if self.classes.is_empty() {
            return Err(LabelError::Empty);
        }
        let mut seen = BTreeSet::new();
        for class in &self.classes {
            if !seen.insert(class.as_str()) {
                return Err(LabelError::Duplicate(class.clone()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn fit_sorts_and_deduplicates() {
        let encoding = LabelEncoding::fit(["neutral", "angry", "happy", "angry"]).unwrap();
        assert_eq!(encoding.classes(), &["angry", "happy", "neutral"]);
    }

    #[test]
    fn encode_decode_round_trips_every_class() {
        let encoding = LabelEncoding::fit(["neutral", "angry", "happy"]).unwrap();
        for label in encoding.classes() {
            let index = encoding.encode(label).unwrap();
            assert_eq!(encoding.decode(index).unwrap(), label);
        }
    }

    #[test]
    fn unknown_label_is_rejected() {
        let encoding = LabelEncoding::fit(["neutral", "angry"]).unwrap();
        let err = encoding.encode("sad").unwrap_err();
        assert!(matches!(err, LabelError::UnknownLabel(label) if label == "sad"));
    }

    #[test]
    fn decode_out_of_range_is_rejected() {
        let encoding = LabelEncoding::fit(["neutral"]).unwrap();
        assert!(matches!(
            encoding.decode(3),
            Err(LabelError::IndexOutOfRange { index: 3, len: 1 })
        ));
    }

    #[test]
    fn empty_fit_is_an_error() {
        let labels: Vec<String> = Vec::new();
        assert!(matches!(LabelEncoding::fit(labels), Err(LabelError::Empty)));
    }

    #[test]
    fn persisted_encoding_is_reused_instead_of_refit() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("labels.json");
        let first = LabelEncoding::load_or_fit(&path, ["sad", "angry"]).unwrap();
        let second = LabelEncoding::load_or_fit(&path, ["happy", "neutral", "zen"]).unwrap();
        assert_eq!(first, second);
        assert!(matches!(
            second.encode("happy"),
            Err(LabelError::UnknownLabel(_))
        ));
    }

    #[test]
    fn duplicate_classes_on_disk_are_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("labels.json");
        std::fs::write(&path, r#"{"classes":["angry","angry"]}"#).unwrap();
        assert!(matches!(
            LabelEncoding::load(&path),
            Err(LabelError::Duplicate(_))
        ));
    }
}
