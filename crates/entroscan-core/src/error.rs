//! Error types for classifier loading and prediction.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("cannot read model {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed model file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid model: {0}")]
    InvalidModel(String),

    #[error("unsupported model format: {}", .0.display())]
    UnsupportedFormat(PathBuf),

    #[error("onnx runtime error: {0}")]
    Onnx(String),

    #[error("classifier returned label {0}, expected 0 or 1")]
    InvalidLabel(i64),

    #[error("invalid feature vector: {0}")]
    InvalidInput(String),
}

pub type ClassifierResult<T> = std::result::Result<T, ClassifierError>;
