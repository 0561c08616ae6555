// pybundle-core/src/analyzer/mod.rs
//! Static classification of a program's imports into local, standard-library
//! and third-party names.
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use pybundle_common::error::{BundleError, Result};
use pybundle_common::model::{normalize_name, BuildTarget, TargetExtra};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::stdlib::StdlibIndex;

pub mod folder;
pub mod imports;

pub use folder::{is_ignored_dir, observe_folder};

/// Imports that pull the embedded Tk toolkit into the bundle.
const TKINTER_LIBS: &[&str] = &["tkinter", "matplotlib"];

/// True when the text looks like a runnable program rather than a library module.
pub fn is_entry_point(text: &str) -> bool {
    text.contains("def main") || text.contains("__main__")
}

/// Reads a source file as UTF-8.
pub fn read_source(path: &Path) -> Result<String> {
    let bytes = fs::read(path)?;
    String::from_utf8(bytes).map_err(|e| {
        BundleError::Encoding(format!("{} is not valid UTF-8: {e}", path.display()))
    })
}

pub struct ImportAnalyzer {
    stdlib: StdlibIndex,
}

impl ImportAnalyzer {
    pub fn new(stdlib: StdlibIndex) -> Self {
        Self { stdlib }
    }

    /// Builds a target for `entry` if it qualifies as an entry point.
    ///
    /// Errors only for the entry file itself; unreadable or unparsable local
    /// modules reached from it are logged and skipped.
    pub fn analyze(&self, entry: &Path) -> Result<Option<BuildTarget>> {
        let text = read_source(entry)?;
        if !is_entry_point(&text) {
            debug!("{} has no entry point, skipping", entry.display());
            return Ok(None);
        }

        let mut target = BuildTarget::new(entry, text.clone());
        let mut merged = HashSet::from([canonical(entry)]);
        self.collect(entry, &text, &mut target, &mut merged)?;

        // A name reached as local anywhere in the tree is never external.
        let locals: Vec<String> = target.local_sources.iter().map(|s| normalize_name(s)).collect();
        for local in locals {
            target.external_libs.remove(&local);
        }
        debug!(
            "Analyzed {}: external={:?} local={:?} extras={:?}",
            entry.display(),
            target.external_libs,
            target.local_sources,
            target.extras
        );
        Ok(Some(target))
    }

    fn collect(
        &self,
        file: &Path,
        text: &str,
        target: &mut BuildTarget,
        merged: &mut HashSet<PathBuf>,
    ) -> Result<()> {
        let names = imports::imported_names(text, file)?;
        let dir = file.parent().unwrap_or_else(|| Path::new("."));
        let siblings = sibling_modules(dir);
        // Only the entry's own directory contributes top-level local sources.
        let at_root = dir == target.root_dir();

        for import in names {
            let name = import.name;
            if TKINTER_LIBS.contains(&name.as_str()) {
                target.extras.insert(TargetExtra::Tkinter);
            }

            if let Some(sibling) = siblings.get(&name) {
                if at_root {
                    target.local_sources.insert(sibling_name(sibling));
                }
                if sibling.is_dir() {
                    for module in python_files(sibling) {
                        self.merge_local(&module, target, merged);
                    }
                } else {
                    self.merge_local(sibling, target, merged);
                }
            } else if import.relative || self.stdlib.contains(&name) {
                continue;
            } else {
                target.external_libs.insert(normalize_name(&name));
            }
        }
        Ok(())
    }

    /// Appends a local module to the merged text and follows its imports.
    fn merge_local(&self, module: &Path, target: &mut BuildTarget, merged: &mut HashSet<PathBuf>) {
        if !merged.insert(canonical(module)) {
            return;
        }
        let text = match read_source(module) {
            Ok(text) => text,
            Err(e) => {
                warn!("Skipping local module {}: {}", module.display(), e);
                return;
            }
        };
        target.merged_text.push('\n');
        target.merged_text.push_str(&text);
        if let Err(e) = self.collect(module, &text, target, merged) {
            warn!("Skipping imports of {}: {}", module.display(), e);
        }
    }
}

fn canonical(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

fn sibling_name(path: &Path) -> String {
    let stem = if path.is_dir() {
        path.file_name()
    } else {
        path.file_stem()
    };
    stem.map(|s| s.to_string_lossy().into_owned()).unwrap_or_default()
}

/// Importable entries of `dir`, keyed by lower-cased module name: `.py` files
/// by stem and non-ignored subdirectories by name.
fn sibling_modules(dir: &Path) -> BTreeMap<String, PathBuf> {
    let mut out = BTreeMap::new();
    let Ok(entries) = fs::read_dir(dir) else {
        return out;
    };
    let mut paths: Vec<PathBuf> = entries.filter_map(|e| e.ok().map(|e| e.path())).collect();
    paths.sort();
    for path in paths {
        if path.is_dir() {
            let name = sibling_name(&path);
            if !is_ignored_dir(&name) {
                out.entry(name.to_lowercase()).or_insert(path);
            }
        } else if path.extension().is_some_and(|ext| ext == "py") {
            out.entry(sibling_name(&path).to_lowercase()).or_insert(path);
        }
    }
    out
}

/// Every `.py` file under `dir`, sorted, skipping ignored directories.
fn python_files(dir: &Path) -> Vec<PathBuf> {
    WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            e.depth() == 0
                || !e.file_type().is_dir()
                || !is_ignored_dir(&e.file_name().to_string_lossy())
        })
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && e.path().extension().is_some_and(|x| x == "py"))
        .map(|e| e.into_path())
        .collect()
}
