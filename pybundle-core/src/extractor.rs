// pybundle-core/src/extractor.rs
//! Selective installation of package archives into a bundle's packages dir.
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use async_recursion::async_recursion;
use pybundle_aio::extract::extract_zip_filtered;
use pybundle_aio::process::run_checked;
use pybundle_common::error::{BundleError, Result};
use pybundle_common::model::{ArchiveKind, PackageRecord};
use tracing::{debug, info, warn};

use crate::metadata;
use crate::repository::PackageRepository;
use crate::rules::{resolve_alias, ExtractionRule, RuleTable};

/// How many levels of dependencies are followed below a requested package.
pub const DEFAULT_MAX_DEPTH: usize = 2;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct InstallReport {
    pub installed: Vec<String>,
    pub skipped: Vec<String>,
    /// (distribution name, reason)
    pub failed: Vec<(String, String)>,
}

impl InstallReport {
    pub fn merge(&mut self, other: InstallReport) {
        self.installed.extend(other.installed);
        self.skipped.extend(other.skipped);
        self.failed.extend(other.failed);
    }

    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

impl fmt::Display for InstallReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} installed, {} already present, {} failed",
            self.installed.len(),
            self.skipped.len(),
            self.failed.len()
        )
    }
}

pub struct PackageExtractor {
    repository: Arc<PackageRepository>,
    rules: &'static RuleTable,
    max_depth: usize,
    host_python: String,
}

impl PackageExtractor {
    pub fn new(
        repository: Arc<PackageRepository>,
        rules: &'static RuleTable,
        host_python: impl Into<String>,
    ) -> Self {
        Self {
            repository,
            rules,
            max_depth: DEFAULT_MAX_DEPTH,
            host_python: host_python.into(),
        }
    }

    /// Installs `name` and its dependencies into `dest`. Failures are recorded
    /// in the report; they never abort the remaining work.
    pub async fn install(&self, name: &str, dest: &Path) -> InstallReport {
        let mut report = InstallReport::default();
        let mut seen = HashSet::new();
        self.install_inner(name, dest, self.max_depth, &mut seen, &mut report)
            .await;
        report
    }

    #[async_recursion]
    async fn install_inner(
        &self,
        import_name: &str,
        dest: &Path,
        depth: usize,
        seen: &mut HashSet<String>,
        report: &mut InstallReport,
    ) {
        let dist = resolve_alias(import_name);
        if !seen.insert(dist.clone()) {
            return;
        }
        let rule = match self.rules.rule_for(&dist) {
            Ok(rule) => rule,
            Err(e) => {
                report.failed.push((dist, e.to_string()));
                return;
            }
        };
        if is_installed(dest, import_name, &dist, &rule) {
            debug!("{} already present in {}, skipping", dist, dest.display());
            report.skipped.push(dist);
            return;
        }

        let record = match self.fetch_and_extract(&dist, &rule, dest).await {
            Ok(record) => record,
            Err(e) => {
                warn!("Could not install {}: {}", dist, e);
                report.failed.push((dist, e.to_string()));
                return;
            }
        };
        info!("Installed {} into {}", record, dest.display());
        report.installed.push(dist);

        let requires = dependencies_of(&record).await;
        if depth == 0 {
            return;
        }
        let mut deps: BTreeSet<String> = rule.children.iter().cloned().collect();
        deps.extend(requires);
        for dep in deps {
            self.install_inner(&dep, dest, depth - 1, seen, report).await;
        }
    }

    /// Resolves and extracts `dist`. An archive that fails to open is evicted
    /// and fetched once more while online.
    async fn fetch_and_extract(
        &self,
        dist: &str,
        rule: &ExtractionRule,
        dest: &Path,
    ) -> Result<Arc<PackageRecord>> {
        let record = self.repository.resolve(dist).await?;
        match self.extract(&record, rule, dest).await {
            Ok(()) => Ok(record),
            Err(e) if e.is_integrity_failure() && !self.repository.is_offline() => {
                warn!("Archive {} is damaged ({}), fetching it again", record, e);
                self.repository.evict(&record).await?;
                let record = self.repository.resolve(dist).await?;
                self.extract(&record, rule, dest).await?;
                Ok(record)
            }
            Err(e) => Err(e),
        }
    }

    async fn extract(&self, record: &PackageRecord, rule: &ExtractionRule, dest: &Path) -> Result<()> {
        match record.kind {
            ArchiveKind::Wheel => {
                let archive = record.filepath.clone();
                let target = dest.to_path_buf();
                let filter = rule.clone();
                let extracted = tokio::task::spawn_blocking(move || {
                    extract_zip_filtered(&archive, &target, |entry| filter.allows(entry))
                })
                .await
                .map_err(|e| BundleError::Generic(format!("JoinError in extraction: {e}")))??;
                if extracted.is_empty() && rule.has_includes() {
                    warn!("Trimming rule for {} matched no files in {}", rule.name, record);
                }
                debug!("Extracted {} file(s) from {}", extracted.len(), record);
                Ok(())
            }
            ArchiveKind::Sdist => {
                debug!("Installing sdist {} via pip", record);
                let args = vec![
                    "-m".to_string(),
                    "pip".to_string(),
                    "install".to_string(),
                    record.filepath.to_string_lossy().into_owned(),
                    "--no-deps".to_string(),
                    "--no-compile".to_string(),
                    "-t".to_string(),
                    dest.to_string_lossy().into_owned(),
                ];
                run_checked(&self.host_python, &args, None).await.map(|_| ())
            }
        }
    }
}

async fn dependencies_of(record: &Arc<PackageRecord>) -> BTreeSet<String> {
    let record = Arc::clone(record);
    let name = record.name.clone();
    match tokio::task::spawn_blocking(move || metadata::requires(&record).clone()).await {
        Ok(requires) => requires,
        Err(e) => {
            warn!("Reading metadata of {} failed: {}", name, e);
            BTreeSet::new()
        }
    }
}

/// True when `dest` already holds a top-level entry for the package.
fn is_installed(dest: &Path, import_name: &str, dist: &str, rule: &ExtractionRule) -> bool {
    let underscored = dist.replace('-', "_");
    let mut candidates: Vec<String> = Vec::new();
    if let Some(marker) = &rule.marker {
        candidates.push(marker.clone());
    }
    candidates.push(import_name.to_string());
    candidates.push(format!("{import_name}.py"));
    candidates.push(dist.to_string());
    candidates.push(format!("{underscored}.py"));
    candidates.push(underscored);
    candidates.iter().any(|c| dest.join(c).exists())
}

#[cfg(test)]
mod tests {
    use std::fs::{self, File};
    use std::io::Write;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use futures::future::BoxFuture;
    use pybundle_common::settings::{keys, Settings};
    use pybundle_net::mirror::MirrorSelector;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    use super::*;
    use crate::repository::PackageDownloader;

    struct NoDownloads;

    impl PackageDownloader for NoDownloads {
        fn download<'a>(&'a self, name: &'a str, _: &'a Path, _: &'a str) -> BoxFuture<'a, Result<()>> {
            Box::pin(async move { Err(BundleError::NotFound(name.to_string())) })
        }
    }

    /// Serves a freshly built `foo` wheel and counts downloads.
    struct FooIndex {
        downloads: AtomicUsize,
    }

    impl PackageDownloader for FooIndex {
        fn download<'a>(&'a self, _: &'a str, dest: &'a Path, _: &'a str) -> BoxFuture<'a, Result<()>> {
            Box::pin(async move {
                self.downloads.fetch_add(1, Ordering::SeqCst);
                wheel(
                    &dest.join("foo-1.0-py3-none-any.whl"),
                    &[
                        ("foo/__init__.py", "VALUE = 1"),
                        ("foo-1.0.dist-info/METADATA", "Name: foo\nVersion: 1.0\n"),
                    ],
                );
                Ok(())
            })
        }
    }

    fn wheel(path: &Path, files: &[(&str, &str)]) {
        let mut writer = ZipWriter::new(File::create(path).unwrap());
        for (name, body) in files {
            writer
                .start_file(name.to_string(), SimpleFileOptions::default())
                .unwrap();
            writer.write_all(body.as_bytes()).unwrap();
        }
        writer.finish().unwrap();
    }

    fn extractor(libs: &Path) -> PackageExtractor {
        let repo = PackageRepository::new(
            libs,
            true,
            Arc::new(MirrorSelector::new(Duration::from_millis(50)).unwrap()),
            Arc::new(Settings::in_memory()),
            Arc::new(NoDownloads),
        );
        PackageExtractor::new(Arc::new(repo), RuleTable::builtin().unwrap(), "python3")
    }

    fn seed_libs(libs: &Path) {
        fs::create_dir_all(libs).unwrap();
        wheel(
            &libs.join("requests-2.31.0-py3-none-any.whl"),
            &[
                ("requests/__init__.py", "import urllib3"),
                (
                    "requests-2.31.0.dist-info/METADATA",
                    "Name: requests\nVersion: 2.31.0\nRequires-Dist: urllib3<3,>=1.21.1\n\
                     Requires-Dist: PySocks!=1.5.7,>=1.5.6; extra == \"socks\"\n",
                ),
            ],
        );
        wheel(
            &libs.join("urllib3-2.0.7-py3-none-any.whl"),
            &[
                ("urllib3/__init__.py", ""),
                ("urllib3-2.0.7.dist-info/METADATA", "Name: urllib3\nVersion: 2.0.7\n"),
            ],
        );
        wheel(
            &libs.join("Pillow-10.0.0-cp38-cp38-win_amd64.whl"),
            &[
                ("PIL/__init__.py", ""),
                ("PIL/Image.pyi", ""),
                ("Pillow-10.0.0.dist-info/METADATA", "Name: Pillow\nVersion: 10.0.0\n"),
            ],
        );
    }

    #[tokio::test]
    async fn installs_package_and_requirements() {
        let dir = tempfile::tempdir().unwrap();
        let libs = dir.path().join("libs");
        seed_libs(&libs);
        let dest = dir.path().join("packages");

        let report = extractor(&libs).install("requests", &dest).await;
        assert_eq!(report.installed, vec!["requests", "urllib3"]);
        assert!(report.is_complete());
        assert!(dest.join("requests/__init__.py").is_file());
        assert!(dest.join("urllib3/__init__.py").is_file());
        assert!(!dest.join("requests-2.31.0.dist-info").exists());
    }

    #[tokio::test]
    async fn second_install_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let libs = dir.path().join("libs");
        seed_libs(&libs);
        let dest = dir.path().join("packages");
        let extractor = extractor(&libs);

        extractor.install("requests", &dest).await;
        let before: Vec<_> = walkdir::WalkDir::new(&dest)
            .sort_by_file_name()
            .into_iter()
            .map(|e| e.unwrap().into_path())
            .collect();

        let again = extractor.install("requests", &dest).await;
        assert!(again.installed.is_empty());
        assert_eq!(again.skipped, vec!["requests"]);
        let after: Vec<_> = walkdir::WalkDir::new(&dest)
            .sort_by_file_name()
            .into_iter()
            .map(|e| e.unwrap().into_path())
            .collect();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn aliases_and_rules_apply() {
        let dir = tempfile::tempdir().unwrap();
        let libs = dir.path().join("libs");
        seed_libs(&libs);
        let dest = dir.path().join("packages");

        let report = extractor(&libs).install("PIL", &dest).await;
        assert_eq!(report.installed, vec!["pillow"]);
        assert!(dest.join("PIL/__init__.py").is_file());
        assert!(!dest.join("PIL/Image.pyi").exists());
    }

    #[tokio::test]
    async fn unresolvable_names_are_reported_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let libs = dir.path().join("libs");
        seed_libs(&libs);
        let dest = dir.path().join("packages");

        let report = extractor(&libs).install("no_such_pkg", &dest).await;
        assert!(report.installed.is_empty());
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "no-such-pkg");
    }

    #[tokio::test]
    async fn damaged_archive_is_fetched_again() {
        let dir = tempfile::tempdir().unwrap();
        let libs = dir.path().join("libs");
        fs::create_dir_all(&libs).unwrap();
        fs::write(libs.join("foo-1.0-py3-none-any.whl"), b"not a zip").unwrap();
        let dest = dir.path().join("packages");

        let settings = Arc::new(Settings::in_memory());
        settings
            .set(keys::FASTEST_PACKAGE_MIRROR, "https://pypi.example/simple/")
            .unwrap();
        let index = Arc::new(FooIndex {
            downloads: AtomicUsize::new(0),
        });
        let repo = PackageRepository::new(
            &libs,
            false,
            Arc::new(MirrorSelector::new(Duration::from_millis(50)).unwrap()),
            settings,
            index.clone(),
        );
        let extractor =
            PackageExtractor::new(Arc::new(repo), RuleTable::builtin().unwrap(), "python3");

        let report = extractor.install("foo", &dest).await;
        assert_eq!(report.installed, vec!["foo"]);
        assert!(report.is_complete());
        assert_eq!(index.downloads.load(Ordering::SeqCst), 1);
        assert_eq!(fs::read_to_string(dest.join("foo/__init__.py")).unwrap(), "VALUE = 1");
    }

    #[tokio::test]
    async fn damaged_archive_offline_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let libs = dir.path().join("libs");
        fs::create_dir_all(&libs).unwrap();
        fs::write(libs.join("foo-1.0-py3-none-any.whl"), b"not a zip").unwrap();

        let report = extractor(&libs).install("foo", &dir.path().join("packages")).await;
        assert!(report.installed.is_empty());
        assert_eq!(report.failed[0].0, "foo");
        assert!(libs.join("foo-1.0-py3-none-any.whl").is_file());
    }
}
