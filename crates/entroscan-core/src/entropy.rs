//! Shannon entropy over whole-file byte content.
//!
//! The estimate is taken over every byte of the file; no sampling or
//! windowing, so two files with the same byte histogram always score the
//! same.

use std::fs;
use std::path::Path;

use tracing::debug;

use crate::outcome::{DegradedReason, Outcome};

/// Upper bound of the estimate, in bits per byte.
pub const MAX_ENTROPY: f64 = 8.0;

/// Compute Shannon entropy of `data` in bits per byte.
///
/// Returns exactly 0.0 for empty input.
pub fn shannon_entropy(data: &[u8]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }

    let mut counts = [0u64; 256];
    for &b in data {
        counts[b as usize] += 1;
    }

    let total = data.len() as f64;
    let mut entropy = 0.0f64;
    for &c in &counts {
        if c > 0 {
            let p = c as f64 / total;
            entropy -= p * p.log2();
        }
    }

    entropy
}

/// Read the whole file and compute its entropy. Read failures map to 0.0.
pub fn file_entropy(path: &Path) -> Outcome<f64> {
    match fs::read(path) {
        Ok(data) => Outcome::Success(shannon_entropy(&data)),
        Err(err) => {
            debug!(path = %path.display(), error = %err, "entropy read failed");
            Outcome::degraded(0.0, DegradedReason::unreadable(path, &err))
        }
    }
}
