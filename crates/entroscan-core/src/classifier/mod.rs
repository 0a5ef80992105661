//! Classifier adapter around a pre-trained binary model.
//!
//! The model is loaded once by the caller and handed to the orchestrator as
//! a [`Classifier`]. A failed load is not fatal: the handle becomes
//! [`Classifier::Absent`] and every classification degrades to benign.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};

use crate::error::{ClassifierError, ClassifierResult};
use crate::features::FeatureVector;
use crate::outcome::{DegradedReason, Outcome};
use crate::report::Verdict;

#[cfg(feature = "onnx")]
pub mod onnx;
pub mod svm;

/// Well-known artifact name looked up in the working directory.
pub const DEFAULT_MODEL_FILE: &str = "svm_model.onnx";

/// Environment variable overriding [`DEFAULT_MODEL_FILE`].
pub const MODEL_ENV_VAR: &str = "ENTROSCAN_MODEL";

/// A trained binary model. Implementations must be safe to share across
/// scan workers.
pub trait Classify: Send + Sync {
    /// Short backend name for logs.
    fn backend(&self) -> &'static str;

    fn predict(&self, features: &FeatureVector) -> ClassifierResult<Verdict>;
}

#[derive(Clone)]
pub enum Classifier {
    Present(Arc<dyn Classify>),
    Absent { reason: String },
}

impl Classifier {
    pub fn new(model: impl Classify + 'static) -> Self {
        Self::Present(Arc::new(model))
    }

    pub fn absent(reason: impl Into<String>) -> Self {
        Self::Absent {
            reason: reason.into(),
        }
    }

    /// Load the model at `path`, picking the backend by file extension.
    ///
    /// Failures are logged once here and produce [`Classifier::Absent`].
    pub fn load(path: &Path) -> Self {
        match load_model(path) {
            Ok(model) => {
                info!(path = %path.display(), backend = model.backend(), "classifier loaded");
                Self::Present(model)
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to load classifier, statistical verdicts disabled"
                );
                Self::absent(err.to_string())
            }
        }
    }

    pub fn is_present(&self) -> bool {
        matches!(self, Self::Present(_))
    }

    /// Classify one feature vector. Absence and prediction failures both
    /// come back as a degraded benign verdict.
    pub fn classify(&self, features: &FeatureVector) -> Outcome<Verdict> {
        match self {
            Self::Absent { .. } => {
                Outcome::degraded(Verdict::Benign, DegradedReason::ClassifierUnavailable)
            }
            Self::Present(model) => match model.predict(features) {
                Ok(verdict) => Outcome::Success(verdict),
                Err(err) => {
                    warn!(error = %err, ?features, "prediction failed, treating as benign");
                    Outcome::degraded(
                        Verdict::Benign,
                        DegradedReason::PredictionFailed {
                            message: err.to_string(),
                        },
                    )
                }
            },
        }
    }
}

impl fmt::Debug for Classifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Present(model) => f.debug_tuple("Present").field(&model.backend()).finish(),
            Self::Absent { reason } => f.debug_struct("Absent").field("reason", reason).finish(),
        }
    }
}

/// Resolve the artifact path: explicit value, then `ENTROSCAN_MODEL`,
/// then the well-known default.
pub fn resolve_model_path(explicit: Option<&Path>) -> std::path::PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    match std::env::var_os(MODEL_ENV_VAR) {
        Some(value) if !value.is_empty() => value.into(),
        _ => DEFAULT_MODEL_FILE.into(),
    }
}

fn load_model(path: &Path) -> ClassifierResult<Arc<dyn Classify>> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);

    match ext.as_deref() {
        Some("json") => Ok(Arc::new(svm::SvmModel::from_file(path)?)),
        #[cfg(feature = "onnx")]
        Some("onnx") => Ok(Arc::new(onnx::OnnxClassifier::load(path)?)),
        _ => Err(ClassifierError::UnsupportedFormat(path.to_path_buf())),
    }
}
