// pybundle-common/src/config.rs
use std::env;
use std::path::{Path, PathBuf};

use directories::UserDirs;
use tracing::debug;

use super::error::{BundleError, Result};

pub const DEFAULT_RUNTIME_VERSION: &str = "3.8.10";
pub const DEFAULT_ARCH: &str = "amd64";
const SETTINGS_FILENAME: &str = "config.toml";

#[derive(Debug, Clone)]
pub struct Config {
    pub cache_dir: PathBuf,
    pub libs_dir: PathBuf,
    pub assets_dir: PathBuf,
    pub runtime_version: String,
    pub arch: String,
    /// Interpreter used to drive pip on the build machine.
    pub host_python: String,
}

impl Config {
    pub fn load() -> Result<Self> {
        debug!("Loading pybundle configuration");

        let cache_dir = match non_empty_env("PYBUNDLE_CACHE") {
            Some(dir) => PathBuf::from(dir),
            None => {
                let home = UserDirs::new()
                    .map(|ud| ud.home_dir().to_path_buf())
                    .ok_or_else(|| {
                        BundleError::Config("Could not determine home directory".to_string())
                    })?;
                debug!("PYBUNDLE_CACHE not set, falling back to ~/.cache/pybundle");
                home.join(".cache").join("pybundle")
            }
        };
        debug!("Effective cache directory: {}", cache_dir.display());

        let libs_dir = non_empty_env("PYBUNDLE_LIBS")
            .map(PathBuf::from)
            .unwrap_or_else(|| cache_dir.join("libs-repo"));
        let assets_dir = non_empty_env("PYBUNDLE_ASSETS")
            .map(PathBuf::from)
            .unwrap_or_else(|| cache_dir.join("assets"));

        let runtime_version = non_empty_env("PYBUNDLE_PYTHON")
            .unwrap_or_else(|| DEFAULT_RUNTIME_VERSION.to_string());
        validate_version(&runtime_version)?;
        let arch = non_empty_env("PYBUNDLE_ARCH").unwrap_or_else(|| DEFAULT_ARCH.to_string());
        let host_python =
            non_empty_env("PYBUNDLE_HOST_PYTHON").unwrap_or_else(|| default_host_python().to_string());

        debug!("Configuration loaded successfully.");
        Ok(Self {
            cache_dir,
            libs_dir,
            assets_dir,
            runtime_version,
            arch,
            host_python,
        })
    }

    /// Builds a configuration rooted at `cache_dir` with default runtime settings.
    pub fn with_cache_dir(cache_dir: impl Into<PathBuf>) -> Self {
        let cache_dir = cache_dir.into();
        Self {
            libs_dir: cache_dir.join("libs-repo"),
            assets_dir: cache_dir.join("assets"),
            cache_dir,
            runtime_version: DEFAULT_RUNTIME_VERSION.to_string(),
            arch: DEFAULT_ARCH.to_string(),
            host_python: default_host_python().to_string(),
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn libs_dir(&self) -> &Path {
        &self.libs_dir
    }

    pub fn assets_dir(&self) -> &Path {
        &self.assets_dir
    }

    pub fn runtime_repo_dir(&self) -> PathBuf {
        self.cache_dir.join("runtime-repo")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.cache_dir.join("logs")
    }

    pub fn settings_path(&self) -> PathBuf {
        self.cache_dir.join(SETTINGS_FILENAME)
    }

    pub fn runtime_archive_name(&self) -> String {
        format!("python-{}-embed-{}.zip", self.runtime_version, self.arch)
    }

    pub fn runtime_archive_path(&self) -> PathBuf {
        self.runtime_repo_dir().join(self.runtime_archive_name())
    }

    /// `major.minor` of the configured runtime, e.g. `3.8`.
    pub fn runtime_version_short(&self) -> String {
        self.runtime_version
            .split('.')
            .take(2)
            .collect::<Vec<_>>()
            .join(".")
    }

    /// `38` for 3.8, as pip's `--python-version` expects.
    pub fn pip_python_version(&self) -> String {
        self.runtime_version_short().replace('.', "")
    }

    /// Platform tag handed to pip when fetching binary wheels.
    pub fn pip_platform(&self) -> &'static str {
        match self.arch.as_str() {
            "win32" => "win32",
            "arm64" => "win_arm64",
            _ => "win_amd64",
        }
    }
}

fn default_host_python() -> &'static str {
    if cfg!(windows) {
        "python"
    } else {
        "python3"
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.trim().is_empty())
}

fn validate_version(version: &str) -> Result<()> {
    let parts: Vec<&str> = version.split('.').collect();
    if parts.len() < 2 || parts.iter().any(|p| p.parse::<u32>().is_err()) {
        return Err(BundleError::Config(format!(
            "Invalid runtime version '{version}', expected e.g. 3.8.10"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_paths_hang_off_cache_dir() {
        let config = Config::with_cache_dir("/tmp/pb-cache");
        assert_eq!(config.libs_dir(), Path::new("/tmp/pb-cache/libs-repo"));
        assert_eq!(
            config.runtime_archive_path(),
            PathBuf::from("/tmp/pb-cache/runtime-repo/python-3.8.10-embed-amd64.zip")
        );
        assert_eq!(config.settings_path(), PathBuf::from("/tmp/pb-cache/config.toml"));
        assert_eq!(config.runtime_version_short(), "3.8");
    }

    #[test]
    fn rejects_malformed_versions() {
        assert!(validate_version("3.8.10").is_ok());
        assert!(validate_version("3.11").is_ok());
        assert!(validate_version("3").is_err());
        assert!(validate_version("3.x.1").is_err());
    }
}
