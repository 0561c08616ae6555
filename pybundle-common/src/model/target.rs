// pybundle-common/src/model/target.rs
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use super::package::normalize_name;

/// Capability tags that alter packaging without naming a package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TargetExtra {
    /// The program needs the embedded Tk toolkit shipped next to the runtime.
    Tkinter,
}

/// One packageable entry script and everything it needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildTarget {
    pub entry_path: PathBuf,
    /// Normalized third-party distribution names.
    pub external_libs: BTreeSet<String>,
    /// Sibling modules and folders copied next to the entry script.
    pub local_sources: BTreeSet<String>,
    pub extras: BTreeSet<TargetExtra>,
    /// Entry text with every local sibling module appended.
    pub merged_text: String,
}

impl BuildTarget {
    pub fn new(entry_path: impl Into<PathBuf>, text: impl Into<String>) -> Self {
        Self {
            entry_path: entry_path.into(),
            external_libs: BTreeSet::new(),
            local_sources: BTreeSet::new(),
            extras: BTreeSet::new(),
            merged_text: text.into(),
        }
    }

    pub fn stem(&self) -> String {
        self.entry_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn root_dir(&self) -> &Path {
        self.entry_path.parent().unwrap_or_else(|| Path::new("."))
    }

    pub fn dist_dir(&self) -> PathBuf {
        self.root_dir().join("dist")
    }

    pub fn runtime_dir(&self) -> PathBuf {
        self.dist_dir().join("runtime")
    }

    pub fn packages_dir(&self) -> PathBuf {
        self.dist_dir().join("packages")
    }

    pub fn source_dir(&self) -> PathBuf {
        self.dist_dir().join("source")
    }

    pub fn has_extra(&self, extra: TargetExtra) -> bool {
        self.extras.contains(&extra)
    }

    /// Marks `name` as local source, retracting any external classification.
    /// Records `name` as a local source. Returns whether it had been taken
    /// for a third-party library.
    pub fn mark_local(&mut self, name: &str) -> bool {
        let was_external = self.external_libs.remove(&normalize_name(name));
        self.local_sources.insert(name.to_string());
        was_external
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_directories_follow_entry_parent() {
        let target = BuildTarget::new("/work/app/main.py", "");
        assert_eq!(target.stem(), "main");
        assert_eq!(target.dist_dir(), PathBuf::from("/work/app/dist"));
        assert_eq!(target.runtime_dir(), PathBuf::from("/work/app/dist/runtime"));
        assert_eq!(target.packages_dir(), PathBuf::from("/work/app/dist/packages"));
        assert_eq!(target.source_dir(), PathBuf::from("/work/app/dist/source"));
    }

    #[test]
    fn mark_local_moves_name_out_of_external() {
        let mut target = BuildTarget::new("/work/app/main.py", "");
        target.external_libs.insert("utils".to_string());
        assert!(target.mark_local("utils"));
        assert!(target.external_libs.is_empty());
        assert!(target.local_sources.contains("utils"));
    }
}
