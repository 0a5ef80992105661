//! ONNX model loading and inference via the `ort` crate.
//!
//! Expects an exported binary classifier taking a `float32[N, 3]` input and
//! producing an `int64` label tensor as its first output.

use std::path::Path;
use std::sync::Mutex;

use ndarray::Array2;
use ort::session::Session;
use ort::value::TensorRef;

use crate::classifier::Classify;
use crate::error::{ClassifierError, ClassifierResult};
use crate::features::{FeatureVector, FEATURE_COUNT};
use crate::report::Verdict;

pub struct OnnxClassifier {
    session: Mutex<Session>,
    input_name: String,
    label_output: String,
}

fn onnx_err(e: impl std::fmt::Display) -> ClassifierError {
    ClassifierError::Onnx(e.to_string())
}

impl OnnxClassifier {
    pub fn load(model_path: &Path) -> ClassifierResult<Self> {
        if !model_path.is_file() {
            return Err(ClassifierError::Io {
                path: model_path.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "model file not found"),
            });
        }

        let session = Session::builder()
            .map_err(onnx_err)?
            .with_intra_threads(1)
            .map_err(onnx_err)?
            .commit_from_file(model_path)
            .map_err(onnx_err)?;

        let input_name = session
            .inputs
            .first()
            .map(|i| i.name.clone())
            .ok_or_else(|| ClassifierError::InvalidModel("model has no inputs".into()))?;
        let label_output = session
            .outputs
            .first()
            .map(|o| o.name.clone())
            .ok_or_else(|| ClassifierError::InvalidModel("model has no outputs".into()))?;

        Ok(Self {
            session: Mutex::new(session),
            input_name,
            label_output,
        })
    }
}

impl Classify for OnnxClassifier {
    fn backend(&self) -> &'static str {
        "onnx"
    }

    fn predict(&self, features: &FeatureVector) -> ClassifierResult<Verdict> {
        let row = features.to_array().map(|v| v as f32);
        let input = Array2::from_shape_vec((1, FEATURE_COUNT), row.to_vec())
            .map_err(|e| ClassifierError::InvalidInput(e.to_string()))?;
        let input_tensor = TensorRef::from_array_view(&input).map_err(onnx_err)?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| ClassifierError::Onnx(format!("lock error: {e}")))?;
        let outputs = session
            .run(ort::inputs![self.input_name.as_str() => input_tensor])
            .map_err(onnx_err)?;

        let labels = outputs[self.label_output.as_str()]
            .try_extract_array::<i64>()
            .map_err(onnx_err)?;
        let label = labels
            .iter()
            .next()
            .copied()
            .ok_or_else(|| ClassifierError::Onnx("empty label output".into()))?;

        Verdict::from_label(label)
    }
}
