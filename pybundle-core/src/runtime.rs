// pybundle-core/src/runtime.rs
//! Fetching, caching and unpacking of the embeddable runtime.
use std::path::{Path, PathBuf};
use std::sync::Arc;

use pybundle_aio::checksum::{sha256_file_async, verify_checksum};
use pybundle_aio::extract::{extract_zip_archive_async, validate_zip};
use pybundle_common::config::Config;
use pybundle_common::error::{BundleError, Result};
use pybundle_common::model::RuntimeArtifact;
use pybundle_common::settings::{keys, Settings};
use pybundle_net::http::{build_http_client, download_file, DownloadOptions};
use pybundle_net::mirror::{MirrorPurpose, MirrorSelector};
use reqwest::Client;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// File whose presence marks an unpacked runtime.
pub const RUNTIME_MARKER: &str = "python.exe";

pub struct RuntimeProvisioner {
    config: Config,
    settings: Arc<Settings>,
    mirrors: Arc<MirrorSelector>,
    client: Client,
    offline: bool,
    show_progress: bool,
    fetch_lock: Mutex<()>,
}

impl RuntimeProvisioner {
    pub fn new(
        config: Config,
        settings: Arc<Settings>,
        mirrors: Arc<MirrorSelector>,
        offline: bool,
        show_progress: bool,
    ) -> Result<Self> {
        Ok(Self {
            config,
            settings,
            mirrors,
            client: build_http_client(None)?,
            offline,
            show_progress,
            fetch_lock: Mutex::new(()),
        })
    }

    pub fn archive_path(&self) -> PathBuf {
        self.config.runtime_archive_path()
    }

    /// Makes sure `dest` holds an unpacked runtime.
    pub async fn ensure_runtime(&self, dest: &Path) -> Result<()> {
        if dest.join(RUNTIME_MARKER).exists() {
            debug!("Runtime already present in {}", dest.display());
            return Ok(());
        }
        let archive = if self.offline {
            let cached = self.archive_path();
            if !cached.is_file() {
                return Err(BundleError::Offline(format!(
                    "runtime archive {} is not cached",
                    cached.display()
                )));
            }
            debug!("Offline mode, using cached runtime {}", cached.display());
            cached
        } else {
            self.fetch_runtime().await?.archive_path
        };

        info!("Unpacking runtime {} -> {}", archive.display(), dest.display());
        extract_zip_archive_async(&archive, dest).await?;
        if !dest.join(RUNTIME_MARKER).exists() {
            warn!(
                "Runtime archive {} did not contain {}",
                archive.display(),
                RUNTIME_MARKER
            );
        }
        Ok(())
    }

    /// Returns a verified runtime archive, downloading it when the cached copy
    /// is missing or no longer matches its recorded checksum.
    pub async fn fetch_runtime(&self) -> Result<RuntimeArtifact> {
        let _guard = self.fetch_lock.lock().await;
        let mut artifact = RuntimeArtifact::from_config(&self.config);
        let checksum_key = keys::runtime_checksum(&artifact.archive_name());

        if artifact.archive_path.is_file() {
            match self.settings.get_str(&checksum_key) {
                Some(recorded) => match verify_checksum(&artifact.archive_path, &recorded).await {
                    Ok(()) => {
                        debug!("Cached runtime {} verified", artifact.archive_path.display());
                        artifact.checksum = Some(recorded.to_ascii_lowercase());
                        return Ok(artifact);
                    }
                    Err(BundleError::ChecksumMismatch(reason)) => {
                        info!("{}, fetching again", reason)
                    }
                    Err(e) => return Err(e),
                },
                None => info!("No checksum recorded for cached runtime, fetching again"),
            }
        }

        let archive_path = artifact.archive_path.clone();
        let (mirror, ()) = self
            .mirrors
            .with_fallback(MirrorPurpose::Runtime, &self.settings, |mirror| {
                let url = artifact.url_on(&mirror);
                let archive_path = archive_path.as_path();
                async move { self.download_with_retry(&url, archive_path).await }
            })
            .await?;

        let checksum = sha256_file_async(&artifact.archive_path).await?;
        self.settings.set(&checksum_key, checksum.clone())?;
        artifact.checksum = Some(checksum);
        artifact.source_mirror = Some(mirror);
        Ok(artifact)
    }

    /// Downloads `url` to `path`, fetching once more when the file fails its
    /// integrity check.
    async fn download_with_retry(&self, url: &str, path: &Path) -> Result<()> {
        let mut last_error: Option<BundleError> = None;
        for attempt in 1..=2 {
            info!("Downloading runtime from {} (attempt {})", url, attempt);
            match self.download_validated(url, path).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_integrity_failure() => {
                    warn!("Runtime download from {} failed integrity check: {}", url, e);
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_error.unwrap_or_else(|| {
            BundleError::DownloadError(
                path.display().to_string(),
                url.to_string(),
                "All download attempts failed.".to_string(),
            )
        }))
    }

    async fn download_validated(&self, url: &str, path: &Path) -> Result<()> {
        let options = DownloadOptions {
            show_progress: self.show_progress,
            ..DownloadOptions::default()
        };
        download_file(&self.client, url, path, &options).await?;
        if let Err(e) = validate_zip(path) {
            let _ = tokio::fs::remove_file(path).await;
            return Err(e);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::fs::{self, File};
    use std::io::Write;
    use std::time::Duration;

    use pybundle_aio::checksum::sha256_file;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    use super::*;

    fn runtime_zip(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        let mut writer = ZipWriter::new(File::create(path).unwrap());
        for name in ["python.exe", "pythonw.exe", "python38.zip"] {
            writer
                .start_file(name.to_string(), SimpleFileOptions::default())
                .unwrap();
            writer.write_all(b"stub").unwrap();
        }
        writer.finish().unwrap();
    }

    fn provisioner(config: Config, settings: Arc<Settings>, offline: bool) -> RuntimeProvisioner {
        let mirrors = Arc::new(MirrorSelector::new(Duration::from_millis(50)).unwrap());
        RuntimeProvisioner::new(config, settings, mirrors, offline, false).unwrap()
    }

    #[tokio::test]
    async fn offline_unpacks_cached_archive() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::with_cache_dir(dir.path().join("cache"));
        runtime_zip(&config.runtime_archive_path());
        let runtime = provisioner(config, Arc::new(Settings::in_memory()), true);

        let dest = dir.path().join("dist/runtime");
        runtime.ensure_runtime(&dest).await.unwrap();
        assert!(dest.join("python.exe").is_file());
        // Already provisioned: returns without touching the archive.
        fs::remove_file(runtime.archive_path()).unwrap();
        runtime.ensure_runtime(&dest).await.unwrap();
    }

    #[tokio::test]
    async fn offline_without_cache_fails() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::with_cache_dir(dir.path().join("cache"));
        let runtime = provisioner(config, Arc::new(Settings::in_memory()), true);
        let err = runtime
            .ensure_runtime(&dir.path().join("dist/runtime"))
            .await
            .unwrap_err();
        assert!(matches!(err, BundleError::Offline(_)));
    }

    #[tokio::test]
    async fn matching_checksum_reuses_cache() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::with_cache_dir(dir.path().join("cache"));
        let archive = config.runtime_archive_path();
        runtime_zip(&archive);
        let settings = Arc::new(Settings::in_memory());
        settings
            .set(
                &keys::runtime_checksum(&config.runtime_archive_name()),
                sha256_file(&archive).unwrap(),
            )
            .unwrap();

        let runtime = provisioner(config, settings, false);
        let artifact = runtime.fetch_runtime().await.unwrap();
        assert_eq!(artifact.archive_path, archive);
        assert!(artifact.checksum.is_some());
        assert!(artifact.source_mirror.is_none());
    }

    #[tokio::test]
    async fn dead_cached_mirror_is_forgotten() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::with_cache_dir(dir.path().join("cache"));
        let settings = Arc::new(Settings::in_memory());
        settings
            .set(keys::FASTEST_RUNTIME_MIRROR, "https://127.0.0.1:9/")
            .unwrap();
        settings
            .set("mirrors.runtime.local", "https://127.0.0.1:9/")
            .unwrap();

        let runtime = provisioner(config, Arc::clone(&settings), false);
        let err = runtime.fetch_runtime().await.unwrap_err();
        assert!(err.is_network_failure());
        assert!(settings.get_str(keys::FASTEST_RUNTIME_MIRROR).is_none());
        assert!(!runtime.archive_path().exists());
    }
}
