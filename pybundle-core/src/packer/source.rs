// pybundle-core/src/packer/source.rs
use pybundle_aio::fs::{copy_dir_filtered, copy_file};
use pybundle_common::error::{BundleError, Result};
use pybundle_common::model::BuildTarget;
use tracing::{debug, warn};

use crate::analyzer::is_ignored_dir;

/// Copies the entry script and its local modules into `dist/source`.
/// Returns the number of files copied.
pub fn pack_sources(target: &BuildTarget) -> Result<usize> {
    let root = target.root_dir();
    let dest = target.source_dir();
    let entry_name = target.entry_path.file_name().ok_or_else(|| {
        BundleError::Generic(format!("Entry {} has no file name", target.entry_path.display()))
    })?;
    copy_file(&target.entry_path, &dest.join(entry_name))?;
    let mut copied = 1;

    for local in &target.local_sources {
        let module = root.join(format!("{local}.py"));
        let package = root.join(local);
        if module.is_file() {
            copy_file(&module, &dest.join(format!("{local}.py")))?;
            copied += 1;
        } else if package.is_dir() {
            copied += copy_dir_filtered(&package, &dest.join(local), is_ignored_dir)?;
        } else {
            warn!("Local source [{}] not found under {}", local, root.display());
        }
    }
    debug!("Copied {} source file(s) into {}", copied, dest.display());
    Ok(copied)
}
