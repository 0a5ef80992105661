//! SHA-256 fingerprints attached to flagged files in the report.

use std::path::Path;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 of the file content.
pub fn sha256_file(path: &Path) -> Result<String> {
    let data = std::fs::read(path)
        .with_context(|| format!("cannot hash flagged file {}", path.display()))?;
    Ok(format!("{:x}", Sha256::digest(&data)))
}
