// pybundle-core/src/repository.rs
//! Index of package archives available in the local libs cache, extended on
//! demand by downloading from a package index.
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, Once, RwLock};

use futures::future::BoxFuture;
use pybundle_aio::process::run_checked;
use pybundle_common::config::Config;
use pybundle_common::error::{BundleError, Result};
use pybundle_common::model::{normalize_name, PackageRecord};
use pybundle_common::settings::Settings;
use pybundle_net::mirror::{MirrorPurpose, MirrorSelector};
use pybundle_net::validation::host_of;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::metadata::parse_archive_filename;

/// Fetches a distribution's archive into a directory.
pub trait PackageDownloader: Send + Sync {
    fn download<'a>(
        &'a self,
        name: &'a str,
        dest_dir: &'a Path,
        index_url: &'a str,
    ) -> BoxFuture<'a, Result<()>>;
}

/// Drives `python -m pip download` on the build machine.
pub struct PipDownloader {
    python: String,
    platform: String,
    python_version: String,
}

impl PipDownloader {
    pub fn from_config(config: &Config) -> Self {
        Self {
            python: config.host_python.clone(),
            platform: config.pip_platform().to_string(),
            python_version: config.pip_python_version(),
        }
    }

    fn base_args(&self, name: &str, dest_dir: &Path, index_url: &str) -> Vec<String> {
        let mut args = vec![
            "-m".to_string(),
            "pip".to_string(),
            "download".to_string(),
            name.to_string(),
            "--no-deps".to_string(),
            "-d".to_string(),
            dest_dir.to_string_lossy().into_owned(),
            "-i".to_string(),
            index_url.to_string(),
        ];
        if let Some(host) = host_of(index_url) {
            args.push("--trusted-host".to_string());
            args.push(host);
        }
        args
    }
}

impl PackageDownloader for PipDownloader {
    fn download<'a>(
        &'a self,
        name: &'a str,
        dest_dir: &'a Path,
        index_url: &'a str,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let mut binary_args = self.base_args(name, dest_dir, index_url);
            binary_args.extend([
                "--only-binary=:all:".to_string(),
                "--platform".to_string(),
                self.platform.clone(),
                "--python-version".to_string(),
                self.python_version.clone(),
            ]);
            match run_checked(&self.python, &binary_args, None).await {
                Ok(_) => Ok(()),
                Err(e) => {
                    debug!("No binary wheel for {} ({}), trying source", name, e);
                    let source_args = self.base_args(name, dest_dir, index_url);
                    run_checked(&self.python, &source_args, None)
                        .await
                        .map(|_| ())
                }
            }
        })
    }
}

pub struct PackageRepository {
    libs_dir: PathBuf,
    index: RwLock<HashMap<String, Arc<PackageRecord>>>,
    scanned: Once,
    fetch_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    offline: bool,
    mirrors: Arc<MirrorSelector>,
    settings: Arc<Settings>,
    downloader: Arc<dyn PackageDownloader>,
}

impl PackageRepository {
    pub fn new(
        libs_dir: impl Into<PathBuf>,
        offline: bool,
        mirrors: Arc<MirrorSelector>,
        settings: Arc<Settings>,
        downloader: Arc<dyn PackageDownloader>,
    ) -> Self {
        Self {
            libs_dir: libs_dir.into(),
            index: RwLock::new(HashMap::new()),
            scanned: Once::new(),
            fetch_locks: Mutex::new(HashMap::new()),
            offline,
            mirrors,
            settings,
            downloader,
        }
    }

    pub fn libs_dir(&self) -> &Path {
        &self.libs_dir
    }

    /// Indexes every archive under the libs directory. Names already indexed
    /// keep their first record. Returns the number of new records.
    pub fn scan(&self) -> usize {
        if !self.libs_dir.is_dir() {
            debug!("Libs directory {} does not exist yet", self.libs_dir.display());
            return 0;
        }
        let Ok(mut index) = self.index.write() else {
            warn!("Package index lock poisoned, skipping scan");
            return 0;
        };
        let mut added = 0;
        for entry in WalkDir::new(&self.libs_dir)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
        {
            let Some((name, version, kind)) = parse_archive_filename(entry.path()) else {
                continue;
            };
            if let Some(existing) = index.get(&name) {
                if existing.filepath != entry.path() {
                    debug!(
                        "Duplicate archive for {}: keeping {}, ignoring {}",
                        name,
                        existing.filepath.display(),
                        entry.path().display()
                    );
                }
                continue;
            }
            let record = PackageRecord::new(&name, version, entry.path(), kind);
            debug!("Indexed {}", record);
            index.insert(name, Arc::new(record));
            added += 1;
        }
        debug!("Scan of {} added {} record(s)", self.libs_dir.display(), added);
        added
    }

    fn ensure_scanned(&self) {
        self.scanned.call_once(|| {
            self.scan();
        });
    }

    /// The cached record for `name`, without touching the network.
    pub fn lookup(&self, name: &str) -> Option<Arc<PackageRecord>> {
        self.ensure_scanned();
        let index = self.index.read().ok()?;
        index.get(&normalize_name(name)).cloned()
    }

    pub fn is_offline(&self) -> bool {
        self.offline
    }

    /// Forgets `record` and deletes its archive so the next `resolve`
    /// downloads it again.
    pub async fn evict(&self, record: &PackageRecord) -> Result<()> {
        if let Ok(mut index) = self.index.write() {
            if index
                .get(&record.name)
                .is_some_and(|indexed| indexed.filepath == record.filepath)
            {
                index.remove(&record.name);
            }
        }
        match tokio::fs::remove_file(&record.filepath).await {
            Ok(()) => {
                info!("Evicted {}", record.filepath.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn fetch_lock(&self, name: &str) -> Result<Arc<tokio::sync::Mutex<()>>> {
        let mut locks = self
            .fetch_locks
            .lock()
            .map_err(|_| BundleError::Generic("Fetch lock table poisoned".to_string()))?;
        Ok(locks.entry(name.to_string()).or_default().clone())
    }

    /// Resolves `name` to an archive, downloading it when it is not cached.
    /// Concurrent calls for the same name share a single download.
    pub async fn resolve(&self, name: &str) -> Result<Arc<PackageRecord>> {
        let name = normalize_name(name);
        if let Some(record) = self.lookup(&name) {
            return Ok(record);
        }
        if self.offline {
            return Err(BundleError::NotFound(format!(
                "{name} is not in {} and offline mode is enabled",
                self.libs_dir.display()
            )));
        }

        let lock = self.fetch_lock(&name)?;
        let _guard = lock.lock().await;
        if let Some(record) = self.lookup(&name) {
            return Ok(record);
        }

        tokio::fs::create_dir_all(&self.libs_dir).await?;
        self.mirrors
            .with_fallback(MirrorPurpose::Packages, &self.settings, |index_url| {
                let name = name.as_str();
                async move {
                    info!("Downloading {} from {}", name, index_url);
                    self.downloader
                        .download(name, &self.libs_dir, &index_url)
                        .await
                        .map_err(|e| {
                            BundleError::DownloadError(
                                name.to_string(),
                                index_url.clone(),
                                e.to_string(),
                            )
                        })
                }
            })
            .await?;
        self.scan();
        self.lookup(&name).ok_or_else(|| {
            BundleError::NotFound(format!(
                "{name} was downloaded but no matching archive appeared in {}",
                self.libs_dir.display()
            ))
        })
    }
}
