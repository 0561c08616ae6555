// pybundle-common/src/model/runtime.rs
use std::path::PathBuf;

use crate::config::Config;

/// The embeddable runtime archive for one (version, arch) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeArtifact {
    pub version: String,
    pub arch: String,
    pub archive_path: PathBuf,
    pub checksum: Option<String>,
    pub source_mirror: Option<String>,
}

impl RuntimeArtifact {
    pub fn from_config(config: &Config) -> Self {
        Self {
            version: config.runtime_version.clone(),
            arch: config.arch.clone(),
            archive_path: config.runtime_archive_path(),
            checksum: None,
            source_mirror: None,
        }
    }

    pub fn archive_name(&self) -> String {
        format!("python-{}-embed-{}.zip", self.version, self.arch)
    }

    /// Download location of the archive under `mirror`.
    pub fn url_on(&self, mirror: &str) -> String {
        let base = if mirror.ends_with('/') {
            mirror.to_string()
        } else {
            format!("{mirror}/")
        };
        format!("{base}{}/{}", self.version, self.archive_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_joins_mirror_version_and_archive() {
        let artifact = RuntimeArtifact::from_config(&Config::with_cache_dir("/c"));
        assert_eq!(
            artifact.url_on("https://www.python.org/ftp/python"),
            "https://www.python.org/ftp/python/3.8.10/python-3.8.10-embed-amd64.zip"
        );
    }
}
