// pybundle-aio/src/fs.rs
// Primitive synchronous filesystem operations.
use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use pybundle_common::error::{BundleError, Result};
use tempfile::NamedTempFile;
use tracing::{debug, error};
use walkdir::WalkDir;

/// Creates a directory and all its parent components if they are missing.
pub fn create_dir_all(path: &Path) -> Result<()> {
    fs::create_dir_all(path).map_err(|e| {
        error!("Failed create dir {}: {}", path.display(), e);
        BundleError::from(e)
    })
}

/// Atomically writes data to a file using a temporary file in the same directory.
pub fn atomic_write_file(target: &Path, content: &[u8]) -> Result<()> {
    let dir = target.parent().ok_or_else(|| {
        BundleError::IoError(format!(
            "Cannot get parent directory for {}",
            target.display()
        ))
    })?;
    create_dir_all(dir)?;

    let mut temp_file = NamedTempFile::new_in(dir)?;
    let temp_path = temp_file.path().to_path_buf();
    debug!(
        "Atomically writing {} bytes to {} via temp file {}",
        content.len(),
        target.display(),
        temp_path.display()
    );

    temp_file.write_all(content)?;
    temp_file.flush()?;
    temp_file.as_file().sync_all()?;

    temp_file.persist(target).map_err(|e| {
        error!(
            "Failed to persist temporary file {} over {}: {}",
            temp_path.display(),
            target.display(),
            e.error
        );
        BundleError::Io(Arc::new(e.error))
    })?;
    Ok(())
}

/// Copies a single file, creating the destination's parent directories.
pub fn copy_file(src: &Path, dest: &Path) -> Result<u64> {
    if let Some(parent) = dest.parent() {
        create_dir_all(parent)?;
    }
    fs::copy(src, dest).map_err(|e| {
        BundleError::IoError(format!(
            "Failed to copy {} to {}: {e}",
            src.display(),
            dest.display()
        ))
    })
}

/// Mirrors `src` into `dest`, skipping any entry whose name satisfies `skip`.
/// Returns the number of files copied.
pub fn copy_dir_filtered<F>(src: &Path, dest: &Path, skip: F) -> Result<usize>
where
    F: Fn(&str) -> bool,
{
    debug!("Copying tree {} -> {}", src.display(), dest.display());
    let mut copied = 0;
    let walker = WalkDir::new(src)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !skip(&e.file_name().to_string_lossy()));
    for entry in walker {
        let entry = entry.map_err(|e| BundleError::IoError(format!("Walk error: {e}")))?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| BundleError::Generic(format!("Path prefix error: {e}")))?;
        let target = dest.join(relative);
        if entry.file_type().is_dir() {
            create_dir_all(&target)?;
        } else if entry.file_type().is_file() {
            copy_file(entry.path(), &target)?;
            copied += 1;
        }
    }
    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atomic_write_replaces_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/out.txt");
        atomic_write_file(&path, b"first").unwrap();
        atomic_write_file(&path, b"second").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "second");
    }

    #[test]
    fn copy_dir_filtered_skips_matching_names() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("pkg");
        fs::create_dir_all(src.join("__pycache__")).unwrap();
        fs::write(src.join("__init__.py"), "").unwrap();
        fs::write(src.join("__pycache__/x.pyc"), "").unwrap();

        let dest = dir.path().join("out");
        let copied = copy_dir_filtered(&src, &dest, |n| n == "__pycache__").unwrap();
        assert_eq!(copied, 1);
        assert!(dest.join("__init__.py").is_file());
        assert!(!dest.join("__pycache__").exists());
    }
}
