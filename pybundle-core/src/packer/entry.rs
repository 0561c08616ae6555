// pybundle-core/src/packer/entry.rs
use std::path::Path;

use pybundle_aio::fs::{atomic_write_file, copy_file};
use pybundle_common::error::{BundleError, Result};
use pybundle_common::model::BuildTarget;
use tracing::{debug, info};

use super::is_gui;

const GUI_LAUNCHER: &str = "gui.exe";
const CONSOLE_LAUNCHER: &str = "console.exe";

fn bootstrap_script(entry_file: &str) -> String {
    format!(
        r#"import os
import runpy
import sys

base = os.path.dirname(os.path.abspath(__file__))
for sub in ("packages", "source"):
    sys.path.insert(0, os.path.join(base, sub))
runpy.run_path(os.path.join(base, "source", "{entry_file}"), run_name="__main__")
"#
    )
}

fn batch_launcher(stem: &str, gui: bool) -> String {
    let command = if gui {
        format!("start \"\" \"%~dp0runtime\\pythonw.exe\" \"%~dp0{stem}.int\" %*")
    } else {
        format!("\"%~dp0runtime\\python.exe\" \"%~dp0{stem}.int\" %*")
    };
    format!("@echo off\r\n{command}\r\n")
}

/// Writes the bootstrap script and launchers into `dist/`.
pub fn pack_entry(assets_dir: &Path, target: &BuildTarget) -> Result<()> {
    let stem = target.stem();
    let dist = target.dist_dir();
    let entry_file = target
        .entry_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| {
            BundleError::Generic(format!("Entry {} has no file name", target.entry_path.display()))
        })?;
    let gui = is_gui(target);
    info!("Target [{}] is {}", stem, if gui { "GUI" } else { "CONSOLE" });

    atomic_write_file(&dist.join(format!("{stem}.int")), bootstrap_script(&entry_file).as_bytes())?;
    atomic_write_file(&dist.join(format!("{stem}.bat")), batch_launcher(&stem, gui).as_bytes())?;

    let launcher = assets_dir.join(if gui { GUI_LAUNCHER } else { CONSOLE_LAUNCHER });
    let exe = dist.join(format!("{stem}.exe"));
    if exe.exists() {
        debug!("Launcher {} already exists, skip", exe.display());
    } else if launcher.is_file() {
        info!("Copy launcher [{}] -> [{}]", launcher.display(), exe.display());
        copy_file(&launcher, &exe)?;
    } else {
        debug!("No prebuilt launcher at {}", launcher.display());
    }
    Ok(())
}
