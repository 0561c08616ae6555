// pybundle-core/src/analyzer/folder.rs
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use pybundle_common::model::BuildTarget;
use tracing::{debug, info};

/// Directory names never treated as project sources.
const IGNORE_SYMBOLS: &[&str] = &[
    "dist-info",
    "__pycache__",
    "site-packages",
    "runtime",
    "dist",
    ".git",
    ".venv",
];

pub fn is_ignored_dir(name: &str) -> bool {
    let lower = name.to_lowercase();
    IGNORE_SYMBOLS
        .iter()
        .any(|s| lower == *s || (s.starts_with("dist-") && lower.ends_with(s)))
}

/// Attaches the directory at `folder` to every target whose merged source
/// mentions its name.
///
/// The test is plain substring containment, so a folder named `io` matches any
/// program containing the letters "io". Such a folder is merely copied along.
pub fn observe_folder(folder: &Path, targets: &mut BTreeMap<PathBuf, BuildTarget>) {
    let Some(name) = folder.file_name().map(|n| n.to_string_lossy().into_owned()) else {
        return;
    };
    if is_ignored_dir(&name) {
        debug!("Skip parsing folder: [{}]", name);
        return;
    }
    for target in targets.values_mut() {
        if target.merged_text.contains(name.as_str()) {
            let was_external = target.mark_local(&name);
            info!(
                "Folder [{}] attached to target [{}]{}",
                name,
                target.stem(),
                if was_external { " (was external)" } else { "" }
            );
        }
    }
}
