// pybundle-core/src/packer/tkinter.rs
use std::path::Path;

use pybundle_aio::extract::extract_zip_archive_async;
use pybundle_common::error::Result;
use pybundle_common::model::{BuildTarget, TargetExtra};
use tracing::{debug, info, warn};

pub const TKINTER_LIB_ARCHIVE: &str = "tkinter-lib.zip";
pub const TKINTER_ARCHIVE: &str = "tkinter.zip";

/// Unpacks the Tk runtime files for targets that use tkinter. Returns warnings
/// for archives missing from `assets_dir`.
pub async fn pack_tkinter(assets_dir: &Path, target: &BuildTarget) -> Result<Vec<String>> {
    let mut warnings = Vec::new();
    if !target.has_extra(TargetExtra::Tkinter) {
        return Ok(warnings);
    }
    if target.packages_dir().join("tkinter").exists() {
        debug!("tkinter already present for [{}], skipping", target.stem());
        return Ok(warnings);
    }

    for (archive, dest) in [
        (TKINTER_LIB_ARCHIVE, target.dist_dir()),
        (TKINTER_ARCHIVE, target.packages_dir()),
    ] {
        let path = assets_dir.join(archive);
        if !path.is_file() {
            let msg = format!("{} not found in {}", archive, assets_dir.display());
            warn!("{}", msg);
            warnings.push(msg);
            continue;
        }
        info!("Unpacking [{}] -> {}", archive, dest.display());
        extract_zip_archive_async(&path, &dest).await?;
    }
    Ok(warnings)
}
