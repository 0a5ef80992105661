//! entroscan-core: file scanning pipeline.
//!
//! Walks a directory tree, checks each file for a known test signature and
//! otherwise classifies a `[size, entropy, file_type]` fingerprint with a
//! pre-trained SVM. Scans run on a worker thread with cooperative
//! cancellation and per-file progress events.

pub mod classifier;
pub mod digest;
pub mod entropy;
pub mod error;
pub mod features;
pub mod outcome;
pub mod report;
pub mod scan;
pub mod signature;

pub use classifier::{Classifier, Classify};
pub use features::{extract_features, FeatureVector, FileType};
pub use outcome::{DegradedReason, Outcome};
pub use report::{ScanReport, Verdict};
pub use scan::{run_scan, spawn_scan, ScanConfig, ScanEvent, ScanHandle, ScanSession, ScanState};
