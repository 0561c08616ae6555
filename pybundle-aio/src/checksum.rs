// pybundle-aio/src/checksum.rs
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use pybundle_common::error::{BundleError, Result};
use sha2::{Digest, Sha256};
use tracing::debug;

/// Hex-encoded SHA256 of the file at `path`.
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let bytes_copied = io::copy(&mut file, &mut hasher)?;
    let actual = hex::encode(hasher.finalize());
    debug!(
        "Calculated SHA256 for {}: {} ({} bytes read)",
        path.display(),
        actual,
        bytes_copied
    );
    Ok(actual)
}

/// Hashes on the blocking pool so large archives don't stall the runtime.
pub async fn sha256_file_async(path: &Path) -> Result<String> {
    let path: PathBuf = path.to_path_buf();
    tokio::task::spawn_blocking(move || sha256_file(&path))
        .await
        .map_err(|e| BundleError::Generic(format!("JoinError while hashing: {e}")))?
}

pub async fn verify_checksum(path: &Path, expected: &str) -> Result<()> {
    debug!("Verifying checksum for: {}", path.display());
    let actual = sha256_file_async(path).await?;
    debug!("Expected SHA256:   {}", expected);
    if actual.eq_ignore_ascii_case(expected) {
        Ok(())
    } else {
        Err(BundleError::ChecksumMismatch(format!(
            "Checksum mismatch for {}: expected {}, got {}",
            path.display(),
            expected,
            actual
        )))
    }
}
