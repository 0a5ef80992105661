//! Exact known-signature check.

use std::fs;
use std::path::Path;

use tracing::debug;

use crate::outcome::{DegradedReason, Outcome};

/// The EICAR anti-virus test string.
pub const EICAR_SIGNATURE: &[u8] =
    b"X5O!P%@AP[4\\PZX54(P^)7CC)7}$EICAR-STANDARD-ANTIVIRUS-TEST-FILE!$H+H*";

/// True iff the signature occurs as a contiguous run anywhere in `content`.
pub fn contains_signature(content: &[u8]) -> bool {
    content.len() >= EICAR_SIGNATURE.len()
        && content
            .windows(EICAR_SIGNATURE.len())
            .any(|w| w == EICAR_SIGNATURE)
}

/// Read the file and check it for the signature. Unreadable files never match.
pub fn file_matches_signature(path: &Path) -> Outcome<bool> {
    match fs::read(path) {
        Ok(content) => Outcome::Success(contains_signature(&content)),
        Err(err) => {
            debug!(path = %path.display(), error = %err, "signature read failed");
            Outcome::degraded(false, DegradedReason::unreadable(path, &err))
        }
    }
}
