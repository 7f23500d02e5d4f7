//! Checkpoint persistence for the classifier.
//!
//! Parameters go to a burnpack file that is overwritten every epoch. Writes
//! land in a sibling temp file first and are renamed over the target, so a
//! killed run always leaves the previous complete checkpoint behind. A JSON
//! sidecar (`<checkpoint>.meta.json`) records the class list and the progress
//! needed to resume the epoch counter and learning-rate schedule.

use std::fs;
use std::path::{Path, PathBuf};

use burn::prelude::*;
use burn_store::{BurnpackStore, ModuleSnapshot};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use super::schedule::CosineSchedule;
use crate::model::Classifier;

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("Checkpoint not found at {0}")]
    Missing(PathBuf),
    #[error(
        "Checkpoint {path} was trained for {found} classes but the label encoding has {expected}"
    )]
    ClassCountMismatch {
        path: PathBuf,
        expected: usize,
        found: usize,
    },
    #[error("Checkpoint {path} class list {found:?} does not match label encoding {expected:?}")]
    ClassListMismatch {
        path: PathBuf,
        expected: Vec<String>,
        found: Vec<String>,
    },
    #[error("Checkpoint {path} has incompatible parameters: {detail}")]
    Store { path: PathBuf, detail: String },
    #[error("Checkpoint io error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid checkpoint metadata at {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Training progress stored next to the parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMeta {
    pub classes: Vec<String>,
    pub num_classes: usize,
    pub epochs_completed: usize,
    pub schedule: CosineSchedule,
}

pub fn meta_path(checkpoint: &Path) -> PathBuf {
    let mut name = checkpoint.as_os_str().to_owned();
    name.push(".meta.json");
    PathBuf::from(name)
}

fn temp_path(checkpoint: &Path, suffix: &str) -> PathBuf {
    let stem = checkpoint
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "checkpoint".to_string());
    checkpoint.with_file_name(format!("{stem}.tmp.{suffix}"))
}

/// Atomically write parameters and sidecar.
pub fn save<B: Backend>(
    model: &Classifier<B>,
    meta: &CheckpointMeta,
    path: &Path,
) -> Result<(), CheckpointError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| io_error(parent, source))?;
    }

    let tmp = temp_path(path, "bpk");
    let mut store = BurnpackStore::from_file(&tmp).overwrite(true);
    model
        .save_into(&mut store)
        .map_err(|err| CheckpointError::Store {
            path: tmp.clone(),
            detail: format!("{err:?}"),
        })?;
    fs::rename(&tmp, path).map_err(|source| io_error(path, source))?;

    let meta_tmp = temp_path(path, "meta.json");
    let json = serde_json::to_vec_pretty(meta).map_err(|source| CheckpointError::Json {
        path: meta_tmp.clone(),
        source,
    })?;
    fs::write(&meta_tmp, json).map_err(|source| io_error(&meta_tmp, source))?;
    let meta_final = meta_path(path);
    fs::rename(&meta_tmp, &meta_final).map_err(|source| io_error(&meta_final, source))?;
    Ok(())
}

/// Read the sidecar if present.
pub fn load_meta(path: &Path) -> Result<Option<CheckpointMeta>, CheckpointError> {
    let meta = meta_path(path);
    if !meta.is_file() {
        return Ok(None);
    }
    let bytes = fs::read(&meta).map_err(|source| io_error(&meta, source))?;
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|source| CheckpointError::Json { path: meta, source })
}

/// Build a classifier for `classes` and load the checkpoint into it.
///
/// Class count and class order recorded in the sidecar must match; the loaded
/// tensors must also keep the freshly built output layer shape.
pub fn load<B: Backend>(
    path: &Path,
    classes: &[String],
    device: &B::Device,
) -> Result<(Classifier<B>, Option<CheckpointMeta>), CheckpointError> {
    if !path.is_file() {
        return Err(CheckpointError::Missing(path.to_path_buf()));
    }
    let meta = load_meta(path)?;
    if let Some(meta) = &meta {
        check_classes(path, meta, classes)?;
    }

    let mut model = Classifier::<B>::new(classes.len(), device);
    let expected_head = model.fc2.weight.val().dims();
    let mut store = BurnpackStore::from_file(path);
    model
        .load_from(&mut store)
        .map_err(|err| CheckpointError::Store {
            path: path.to_path_buf(),
            detail: format!("{err:?}"),
        })?;
    let loaded_head = model.fc2.weight.val().dims();
    if loaded_head != expected_head {
        return Err(CheckpointError::Store {
            path: path.to_path_buf(),
            detail: format!("output layer shape {loaded_head:?}, expected {expected_head:?}"),
        });
    }
    info!(
        "Loaded checkpoint {} ({} classes)",
        path.display(),
        classes.len()
    );
    Ok((model, meta))
}

fn check_classes(
    path: &Path,
    meta: &CheckpointMeta,
    classes: &[String],
) -> Result<(), CheckpointError> {
    if meta.num_classes != classes.len() || meta.classes.len() != classes.len() {
        return Err(CheckpointError::ClassCountMismatch {
            path: path.to_path_buf(),
            expected: classes.len(),
            found: meta.num_classes,
        });
    }
    if meta.classes != classes {
        return Err(CheckpointError::ClassListMismatch {
            path: path.to_path_buf(),
            expected: classes.to_vec(),
            found: meta.classes.clone(),
        });
    }
    Ok(())
}

fn io_error(path: &Path, source: std::io::Error) -> CheckpointError {
    CheckpointError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{CpuBackend, CpuDevice};
    use tempfile::tempdir;

    fn classes(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    fn meta(names: &[&str], epochs_completed: usize) -> CheckpointMeta {
        CheckpointMeta {
            classes: classes(names),
            num_classes: names.len(),
            epochs_completed,
            schedule: CosineSchedule::new(1e-4, 30),
        }
    }

    #[test]
    fn save_then_load_restores_predictions() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("model.bpk");
        let device = CpuDevice::default();
        let model = Classifier::<CpuBackend>::new(3, &device);
        save(&model, &meta(&["angry", "happy", "neutral"], 1), &path).unwrap();
        assert!(path.is_file());
        assert!(meta_path(&path).is_file());
        assert!(!temp_path(&path, "bpk").exists());

        let (loaded, loaded_meta) =
            load::<CpuBackend>(&path, &classes(&["angry", "happy", "neutral"]), &device).unwrap();
        assert_eq!(loaded_meta.unwrap().epochs_completed, 1);
        let input = Tensor::<CpuBackend, 4>::ones([1, 1, 64, 40], &device);
        let a = model.forward(input.clone()).into_data().to_vec::<f32>().unwrap();
        let b = loaded.forward(input).into_data().to_vec::<f32>().unwrap();
        for (x, y) in a.iter().zip(&b) {
            assert!((x - y).abs() < 1e-5);
        }
    }

    #[test]
    fn class_count_change_is_fatal() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("model.bpk");
        let device = CpuDevice::default();
        save(
            &Classifier::<CpuBackend>::new(3, &device),
            &meta(&["a", "b", "c"], 1),
            &path,
        )
        .unwrap();
        let err = load::<CpuBackend>(&path, &classes(&["a", "b", "c", "d"]), &device).unwrap_err();
        assert!(matches!(
            err,
            CheckpointError::ClassCountMismatch {
                expected: 4,
                found: 3,
                ..
            }
        ));
    }

    #[test]
    fn shape_mismatch_without_sidecar_is_fatal() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("model.bpk");
        let device = CpuDevice::default();
        save(
            &Classifier::<CpuBackend>::new(3, &device),
            &meta(&["a", "b", "c"], 1),
            &path,
        )
        .unwrap();
        fs::remove_file(meta_path(&path)).unwrap();
        let err = load::<CpuBackend>(&path, &classes(&["a", "b", "c", "d"]), &device).unwrap_err();
        assert!(matches!(err, CheckpointError::Store { .. }));
    }

    #[test]
    fn missing_checkpoint_is_reported() {
        let dir = tempdir().unwrap();
        let err = load::<CpuBackend>(
            &dir.path().join("absent.bpk"),
            &classes(&["a"]),
            &CpuDevice::default(),
        )
        .unwrap_err();
        assert!(matches!(err, CheckpointError::Missing(_)));
    }

    #[test]
    fn meta_path_appends_suffix() {
        assert_eq!(
            meta_path(Path::new("out/emotion_model.bpk")),
            PathBuf::from("out/emotion_model.bpk.meta.json")
        );
    }
}
