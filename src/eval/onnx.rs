use std::path::Path;

use ndarray::Array4;
use ort::session::Session;
use ort::value::Tensor;
use tracing::info;

use super::{EvalError, InferenceBackend};
use crate::batch::Batch;
use crate::export::{INPUT_NAME, OUTPUT_NAME};

/// Inference through ONNX Runtime on the exported graph.
pub struct OnnxBackend {
    session: Session,
    num_classes: usize,
}

impl OnnxBackend {
    pub fn load(path: &Path, num_classes: usize) -> Result<Self, EvalError> {
        if !path.is_file() {
            return Err(EvalError::Runtime(format!(
                "ONNX model not found at {}",
                path.display()
            )));
        }
        let session = Session::builder()
            .and_then(|b| b.with_intra_threads(1))
            .and_then(|b| b.commit_from_file(path))
            .map_err(|e| EvalError::Runtime(format!("Failed to load {}: {e}", path.display())))?;
        info!("Loaded ONNX model {}", path.display());
        Ok(Self {
            session,
            num_classes,
        })
    }
}

impl InferenceBackend for OnnxBackend {
    fn name(&self) -> &'static str {
        "onnx"
    }

    fn num_classes(&self) -> usize {
        self.num_classes
    }

    fn logits(&mut self, batch: &Batch) -> Result<Vec<f32>, EvalError> {
        let [n, c, h, w] = batch.shape();
        let input = Array4::from_shape_vec((n, c, h, w), batch.features().to_vec())
            .map_err(|e| EvalError::Tensor(format!("input shape error: {e}")))?;
        let input_tensor = Tensor::from_array(input)
            .map_err(|e| EvalError::Runtime(format!("tensor creation error: {e}")))?;
        let outputs = self
            .session
            .run(ort::inputs![INPUT_NAME => input_tensor])
            .map_err(|e| EvalError::Runtime(format!("inference error: {e}")))?;
        let (_shape, data) = outputs[OUTPUT_NAME]
            .try_extract_tensor::<f32>()
            .map_err(|e| EvalError::Runtime(format!("output extraction error: {e}")))?;
        Ok(data.to_vec())
    }
}
