// pybundle-core/src/packer/mod.rs
//! Steps that assemble a target's `dist/` tree.
pub mod archive;
pub mod entry;
pub mod library;
pub mod source;
pub mod tkinter;

use pybundle_aio::fs::create_dir_all;
use pybundle_common::error::Result;
use pybundle_common::model::{BuildTarget, TargetExtra};

/// Libraries whose presence makes a program windowed rather than console.
pub const GUI_LIBS: &[&str] = &["pyside2", "pyqt5", "pygame", "matplotlib", "tkinter"];

pub fn is_gui(target: &BuildTarget) -> bool {
    target.has_extra(TargetExtra::Tkinter)
        || target
            .external_libs
            .iter()
            .any(|lib| GUI_LIBS.contains(&lib.as_str()))
}

/// Creates the fixed `dist/` skeleton for `target`.
pub fn prepare_layout(target: &BuildTarget) -> Result<()> {
    for dir in [
        target.dist_dir(),
        target.source_dir(),
        target.packages_dir(),
        target.runtime_dir(),
    ] {
        create_dir_all(&dir)?;
    }
    Ok(())
}
