// pybundle-common/src/model/package.rs
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Canonical form of a distribution name: lower-case with `_` folded to `-`.
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase().replace('_', "-")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArchiveKind {
    Wheel,
    Sdist,
}

impl ArchiveKind {
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?.to_ascii_lowercase();
        if name.ends_with(".whl") {
            Some(Self::Wheel)
        } else if name.ends_with(".tar.gz") {
            Some(Self::Sdist)
        } else {
            None
        }
    }
}

impl fmt::Display for ArchiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Wheel => write!(f, "wheel"),
            Self::Sdist => write!(f, "sdist"),
        }
    }
}

/// A resolved archive on disk.
#[derive(Debug)]
pub struct PackageRecord {
    pub name: String,
    pub version: String,
    pub filepath: PathBuf,
    pub kind: ArchiveKind,
    requires: OnceLock<BTreeSet<String>>,
}

impl PackageRecord {
    pub fn new(
        name: &str,
        version: impl Into<String>,
        filepath: impl Into<PathBuf>,
        kind: ArchiveKind,
    ) -> Self {
        Self {
            name: normalize_name(name),
            version: version.into(),
            filepath: filepath.into(),
            kind,
            requires: OnceLock::new(),
        }
    }

    /// Dependency names, computed on first access by `load`.
    pub fn requires_with<F>(&self, load: F) -> &BTreeSet<String>
    where
        F: FnOnce(&PackageRecord) -> BTreeSet<String>,
    {
        self.requires.get_or_init(|| load(self))
    }
}

impl fmt::Display for PackageRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{} ({})", self.name, self.version, self.kind)
    }
}

/// Descriptive fields from an archive's METADATA / PKG-INFO record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageMetadata {
    pub name: String,
    pub version: String,
    pub summary: Option<String>,
    pub homepage: Option<String>,
    pub author: Option<String>,
    pub license: Option<String>,
    pub requires: BTreeSet<String>,
}

impl fmt::Display for PackageMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, self.version)?;
        if let Some(summary) = &self.summary {
            write!(f, ": {summary}")?;
        }
        let field = |value: &Option<String>| value.as_deref().unwrap_or("-").to_string();
        write!(
            f,
            " [license: {}, author: {}, homepage: {}]",
            field(&self.license),
            field(&self.author),
            field(&self.homepage)
        )
    }
}
