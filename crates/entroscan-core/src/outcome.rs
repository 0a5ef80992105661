//! Per-file results that always carry a usable value.
//!
//! Nothing the orchestrator calls per file may abort a scan. Instead of
//! swallowing failures, every per-file operation returns an [`Outcome`]:
//! either the real value, or a safe default together with the reason the
//! default was used.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DegradedReason {
    /// The file (or its metadata) could not be read.
    Unreadable {
        path: PathBuf,
        #[serde(skip)]
        error_kind: io::ErrorKind,
        message: String,
    },
    /// No classifier was loaded at startup.
    ClassifierUnavailable,
    /// The classifier was present but failed on this input.
    PredictionFailed { message: String },
}

impl DegradedReason {
    pub fn unreadable(path: &Path, err: &io::Error) -> Self {
        Self::Unreadable {
            path: path.to_path_buf(),
            error_kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl fmt::Display for DegradedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unreadable { path, message, .. } => {
                write!(f, "cannot read {}: {}", path.display(), message)
            }
            Self::ClassifierUnavailable => write!(f, "classifier unavailable"),
            Self::PredictionFailed { message } => write!(f, "prediction failed: {}", message),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Success(T),
    Degraded { value: T, reason: DegradedReason },
}

impl<T> Outcome<T> {
    pub fn degraded(value: T, reason: DegradedReason) -> Self {
        Self::Degraded { value, reason }
    }

    pub fn value(&self) -> &T {
        match self {
            Self::Success(value) | Self::Degraded { value, .. } => value,
        }
    }

    pub fn into_value(self) -> T {
        match self {
            Self::Success(value) | Self::Degraded { value, .. } => value,
        }
    }

    pub fn reason(&self) -> Option<&DegradedReason> {
        match self {
            Self::Success(_) => None,
            Self::Degraded { reason, .. } => Some(reason),
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded { .. })
    }

    /// Split into the value and the optional degradation reason.
    pub fn into_parts(self) -> (T, Option<DegradedReason>) {
        match self {
            Self::Success(value) => (value, None),
            Self::Degraded { value, reason } => (value, Some(reason)),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Self::Success(value) => Outcome::Success(f(value)),
            Self::Degraded { value, reason } => Outcome::Degraded {
                value: f(value),
                reason,
            },
        }
    }
}
