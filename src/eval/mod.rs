//! Evaluation over a held-out set.
//!
//! Both inference paths (the native burn model and the exported ONNX graph)
//! implement [`InferenceBackend`] and are driven by the same [`evaluate`]
//! loop, so their reports are directly comparable.

pub mod native;
#[cfg(feature = "onnx-runtime")]
pub mod onnx;

use thiserror::Error;
use tracing::info;

use crate::batch::{Batch, BatchError};
use crate::labels::{LabelEncoding, LabelError};
use crate::metrics::{ConfusionMatrix, ConfusionStats};
use crate::model::argmax_rows;

pub use native::NativeBackend;
#[cfg(feature = "onnx-runtime")]
pub use onnx::OnnxBackend;

#[derive(Debug, Error)]
pub enum EvalError {
    #[error(transparent)]
    Labels(#[from] LabelError),
    #[error("Model has {model} classes but the label encoding has {labels}")]
    ClassCountMismatch { model: usize, labels: usize },
    #[error("{backend} returned {found} logits for {rows} rows of {classes} classes")]
    OutputShape {
        backend: &'static str,
        rows: usize,
        classes: usize,
        found: usize,
    },
    #[error("Tensor data error: {0}")]
    Tensor(String),
    #[error("Inference runtime error: {0}")]
    Runtime(String),
    #[error(transparent)]
    Batch(#[from] BatchError),
    #[error("No samples to evaluate")]
    Empty,
}

/// A model that maps a collated batch to per-class logits.
pub trait InferenceBackend {
    fn name(&self) -> &'static str;

    fn num_classes(&self) -> usize;

    /// Row-major `[batch.len(), num_classes]` logits.
    fn logits(&mut self, batch: &Batch) -> Result<Vec<f32>, EvalError>;
}

/// Arg-max class index for every sample in `batch`.
pub fn predict<I: InferenceBackend + ?Sized>(
    backend: &mut I,
    batch: &Batch,
) -> Result<Vec<usize>, EvalError> {
    let classes = backend.num_classes();
    let logits = backend.logits(batch)?;
    if logits.len() != batch.len() * classes {
        return Err(EvalError::OutputShape {
            backend: backend.name(),
            rows: batch.len(),
            classes,
            found: logits.len(),
        });
    }
    Ok(argmax_rows(&logits, classes))
}

/// Decoded predictions and derived statistics of one evaluation run.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub truths: Vec<String>,
    pub predictions: Vec<String>,
    pub stats: ConfusionStats,
}

/// Run every batch through `backend` and score it against the true labels.
///
/// Indices on both sides are decoded through `labels`, so an index the
/// encoding cannot decode fails the run.
pub fn evaluate<I, It>(
    backend: &mut I,
    batches: It,
    labels: &LabelEncoding,
) -> Result<Evaluation, EvalError>
where
    I: InferenceBackend + ?Sized,
    It: IntoIterator<Item = Result<Batch, BatchError>>,
{
    if backend.num_classes() != labels.len() {
        return Err(EvalError::ClassCountMismatch {
            model: backend.num_classes(),
            labels: labels.len(),
        });
    }
    let mut truths = Vec::new();
    let mut predictions = Vec::new();
    let mut cm = ConfusionMatrix::new(labels.len());
    for batch in batches {
        let batch = batch?;
        if batch.is_empty() {
            continue;
        }
        let predicted = predict(backend, &batch)?;
        for (&truth, &pred) in batch.labels().iter().zip(&predicted) {
            truths.push(labels.decode(truth)?.to_string());
            predictions.push(labels.decode(pred)?.to_string());
            cm.add(truth, pred);
        }
    }
    if truths.is_empty() {
        return Err(EvalError::Empty);
    }
    let stats = ConfusionStats::from_matrix(labels.classes(), &cm);
    info!(
        "{} evaluation: {} samples, accuracy {:.4}",
        backend.name(),
        truths.len(),
        stats.accuracy
    );
    Ok(Evaluation {
        truths,
        predictions,
        stats,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Predicts `label + shift` (mod classes) for every sample.
    struct Shifted {
        classes: usize,
        shift: usize,
    }

    impl InferenceBackend for Shifted {
        fn name(&self) -> &'static str {
            "shifted"
        }

        fn num_classes(&self) -> usize {
            self.classes
        }

        fn logits(&mut self, batch: &Batch) -> Result<Vec<f32>, EvalError> {
            let mut out = vec![0.0; batch.len() * self.classes];
            for (row, &label) in batch.labels().iter().enumerate() {
                out[row * self.classes + (label + self.shift) % self.classes] = 1.0;
            }
            Ok(out)
        }
    }

    fn batch(labels: Vec<usize>) -> Result<Batch, BatchError> {
        Ok(Batch::from_parts(2, 3, vec![0.0; labels.len() * 6], labels).unwrap())
    }

    fn encoding() -> LabelEncoding {
        LabelEncoding::fit(["angry", "happy", "neutral"]).unwrap()
    }

    #[test]
    fn perfect_backend_scores_one() {
        let mut backend = Shifted { classes: 3, shift: 0 };
        let eval = evaluate(
            &mut backend,
            vec![batch(vec![0, 1, 2]), batch(vec![2, 2])],
            &encoding(),
        )
        .unwrap();
        assert_eq!(eval.stats.accuracy, 1.0);
        assert_eq!(eval.truths, eval.predictions);
        assert_eq!(eval.truths[3], "neutral");
        assert_eq!(eval.stats.matrix[2][2], 3);
    }

    #[test]
    fn shifted_backend_fills_off_diagonal() {
        let mut backend = Shifted { classes: 3, shift: 1 };
        let eval = evaluate(&mut backend, vec![batch(vec![0, 1])], &encoding()).unwrap();
        assert_eq!(eval.stats.accuracy, 0.0);
        assert_eq!(eval.predictions, vec!["happy", "neutral"]);
        assert_eq!(eval.stats.matrix[0][1], 1);
    }

    #[test]
    fn class_count_mismatch_is_fatal() {
        let mut backend = Shifted { classes: 4, shift: 0 };
        assert!(matches!(
            evaluate(&mut backend, vec![batch(vec![0])], &encoding()),
            Err(EvalError::ClassCountMismatch { model: 4, labels: 3 })
        ));
    }

    #[test]
    fn collation_failure_stops_evaluation() {
        let mut backend = Shifted { classes: 3, shift: 0 };
        let failed = Err(BatchError::MelBins {
            index: 0,
            expected: 2,
            found: 1,
        });
        assert!(matches!(
            evaluate(&mut backend, vec![batch(vec![0]), failed], &encoding()),
            Err(EvalError::Batch(_))
        ));
    }

    #[test]
    fn no_samples_is_an_error() {
        let mut backend = Shifted { classes: 3, shift: 0 };
        assert!(matches!(
            evaluate(&mut backend, Vec::<Result<Batch, BatchError>>::new(), &encoding()),
            Err(EvalError::Empty)
        ));
    }
}
