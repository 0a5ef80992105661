//! Feature extraction: each file becomes a fixed `[size, entropy, file_type]`
//! vector, the same shape the classifier was trained on.

use std::fs;
use std::path::Path;

use tracing::debug;

use crate::entropy::file_entropy;
use crate::outcome::{DegradedReason, Outcome};

/// Number of features fed to the classifier per file.
pub const FEATURE_COUNT: usize = 3;

/// Coarse file category derived from the extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileType {
    Executable,
    Driver,
    Document,
    Image,
    Archive,
    Other,
}

impl FileType {
    pub const ALL: [FileType; 6] = [
        FileType::Executable,
        FileType::Driver,
        FileType::Document,
        FileType::Image,
        FileType::Archive,
        FileType::Other,
    ];

    /// Map an extension (with or without the leading dot) to a category.
    /// Matching is case-insensitive.
    pub fn from_extension(ext: &str) -> Self {
        let ext = ext.strip_prefix('.').unwrap_or(ext).to_ascii_lowercase();
        match ext.as_str() {
            "exe" | "com" | "bat" | "scr" | "msi" => Self::Executable,
            "dll" | "sys" | "drv" | "ocx" => Self::Driver,
            "txt" | "doc" | "pdf" | "csv" | "xml" => Self::Document,
            "jpg" | "png" | "gif" | "bmp" | "svg" => Self::Image,
            "zip" | "rar" | "7z" | "tar" | "gz" => Self::Archive,
            _ => Self::Other,
        }
    }

    pub fn from_path(path: &Path) -> Self {
        path.extension()
            .and_then(|e| e.to_str())
            .map(Self::from_extension)
            .unwrap_or(Self::Other)
    }

    /// Numeric code the classifier was trained with (1..=6).
    pub fn code(self) -> u8 {
        match self {
            Self::Executable => 1,
            Self::Driver => 2,
            Self::Document => 3,
            Self::Image => 4,
            Self::Archive => 5,
            Self::Other => 6,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.code() == code)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureVector {
    pub size: u64,
    pub entropy: f64,
    pub file_type: FileType,
}

impl FeatureVector {
    /// Used when a file cannot be examined at all.
    pub const DEFAULT: FeatureVector = FeatureVector {
        size: 0,
        entropy: 0.0,
        file_type: FileType::Other,
    };

    pub fn to_array(&self) -> [f64; FEATURE_COUNT] {
        [self.size as f64, self.entropy, f64::from(self.file_type.code())]
    }
}

impl Default for FeatureVector {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Extract the feature vector of a single file.
///
/// A metadata failure yields [`FeatureVector::DEFAULT`]; a content read
/// failure after a successful metadata read keeps the size and type but
/// reports an entropy of 0.0. Both cases come back degraded.
pub fn extract_features(path: &Path) -> Outcome<FeatureVector> {
    let size = match fs::metadata(path) {
        Ok(meta) => meta.len(),
        Err(err) => {
            debug!(path = %path.display(), error = %err, "feature extraction failed");
            return Outcome::degraded(
                FeatureVector::DEFAULT,
                DegradedReason::unreadable(path, &err),
            );
        }
    };

    let file_type = FileType::from_path(path);
    file_entropy(path).map(|entropy| FeatureVector {
        size,
        entropy,
        file_type,
    })
}
