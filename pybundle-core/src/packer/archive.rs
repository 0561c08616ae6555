// pybundle-core/src/packer/archive.rs
use std::path::{Path, PathBuf};

use pybundle_aio::extract::zip_directory;
use pybundle_common::error::{BundleError, Result};
use tracing::info;

pub const ARCHIVE_NAME: &str = "dist.zip";

/// Zips `dist_dir` into `dist.zip` next to it.
pub async fn archive_dist(dist_dir: &Path) -> Result<PathBuf> {
    let parent = dist_dir.parent().ok_or_else(|| {
        BundleError::Generic(format!("{} has no parent directory", dist_dir.display()))
    })?;
    let dest = parent.join(ARCHIVE_NAME);
    let source = dist_dir.to_path_buf();
    let out = dest.clone();
    let count = tokio::task::spawn_blocking(move || zip_directory(&source, &out))
        .await
        .map_err(|e| BundleError::Generic(format!("JoinError in archiving: {e}")))??;
    info!("Archived {} file(s) into {}", count, dest.display());
    Ok(dest)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[tokio::test]
    async fn archive_is_reproducible() {
        let dir = tempfile::tempdir().unwrap();
        let dist = dir.path().join("dist");
        fs::create_dir_all(dist.join("source")).unwrap();
        fs::write(dist.join("source/main.py"), "print('hi')\n").unwrap();
        fs::write(dist.join("main.bat"), "@echo off\r\n").unwrap();

        let first = archive_dist(&dist).await.unwrap();
        assert_eq!(first, dir.path().join(ARCHIVE_NAME));
        let bytes = fs::read(&first).unwrap();
        archive_dist(&dist).await.unwrap();
        assert_eq!(fs::read(&first).unwrap(), bytes);
    }
}
