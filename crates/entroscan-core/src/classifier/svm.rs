//! Support vector classifier persisted as JSON.
//!
//! Holds the fitted parameters of a binary SVC (support vectors, dual
//! coefficients, intercept, kernel) and evaluates the decision function
//! directly:
//!
//! ```text
//! f(x) = sum_i dual_coef[i] * K(sv_i, x) + intercept
//! ```
//!
//! `f(x) > 0` selects `classes[1]`, otherwise `classes[0]`.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::classifier::Classify;
use crate::error::{ClassifierError, ClassifierResult};
use crate::features::{FeatureVector, FEATURE_COUNT};
use crate::report::Verdict;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Kernel {
    Linear,
    Rbf { gamma: f64 },
}

impl Kernel {
    fn eval(&self, a: &[f64; FEATURE_COUNT], b: &[f64; FEATURE_COUNT]) -> f64 {
        match *self {
            Kernel::Linear => a.iter().zip(b).map(|(x, y)| x * y).sum(),
            Kernel::Rbf { gamma } => {
                let dist2: f64 = a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum();
                (-gamma * dist2).exp()
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SvmModel {
    pub kernel: Kernel,
    pub support_vectors: Vec<[f64; FEATURE_COUNT]>,
    pub dual_coef: Vec<f64>,
    pub intercept: f64,
    #[serde(default = "default_classes")]
    pub classes: [i64; 2],
}

fn default_classes() -> [i64; 2] {
    [0, 1]
}

impl SvmModel {
    pub fn from_file(path: &Path) -> ClassifierResult<Self> {
        let data = fs::read_to_string(path).map_err(|source| ClassifierError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let model: SvmModel = serde_json::from_str(&data)?;
        model.validate()?;
        Ok(model)
    }

    pub fn validate(&self) -> ClassifierResult<()> {
        if self.support_vectors.is_empty() {
            return Err(ClassifierError::InvalidModel("no support vectors".into()));
        }
        if self.support_vectors.len() != self.dual_coef.len() {
            return Err(ClassifierError::InvalidModel(format!(
                "{} support vectors but {} dual coefficients",
                self.support_vectors.len(),
                self.dual_coef.len()
            )));
        }
        if let Kernel::Rbf { gamma } = self.kernel {
            if !(gamma.is_finite() && gamma > 0.0) {
                return Err(ClassifierError::InvalidModel(format!(
                    "rbf gamma must be positive, got {gamma}"
                )));
            }
        }
        Ok(())
    }

    pub fn decision_function(&self, x: &[f64; FEATURE_COUNT]) -> f64 {
        self.support_vectors
            .iter()
            .zip(&self.dual_coef)
            .map(|(sv, coef)| coef * self.kernel.eval(sv, x))
            .sum::<f64>()
            + self.intercept
    }

    /// Predicted class label.
    pub fn predict_label(&self, x: &[f64; FEATURE_COUNT]) -> i64 {
        if self.decision_function(x) > 0.0 {
            self.classes[1]
        } else {
            self.classes[0]
        }
    }
}

impl Classify for SvmModel {
    fn backend(&self) -> &'static str {
        "svm-json"
    }

    fn predict(&self, features: &FeatureVector) -> ClassifierResult<Verdict> {
        let x = features.to_array();
        if x.iter().any(|v| !v.is_finite()) {
            return Err(ClassifierError::InvalidInput(format!("{x:?}")));
        }
        Verdict::from_label(self.predict_label(&x))
    }
}
