// pybundle-core/src/processor.rs
//! Drives analysis and packing for every entry script under a project root.
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use pybundle_common::error::{BundleError, Result};
use pybundle_common::model::BuildTarget;
use tracing::{debug, error, info, instrument, warn};

use crate::analyzer::observe_folder;
use crate::context::BuildContext;
use crate::extractor::InstallReport;
use crate::packer::{self, archive, entry, library, source, tkinter};

#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub root: PathBuf,
    /// Restricts the build to one entry script.
    pub file: Option<PathBuf>,
    /// Also produce `dist.zip` beside each `dist/`.
    pub archive: bool,
}

#[derive(Debug, Clone)]
pub struct TargetOutcome {
    pub entry: PathBuf,
    pub stem: String,
    pub report: InstallReport,
    pub warnings: Vec<String>,
    pub error: Option<String>,
    pub elapsed: Duration,
}

impl TargetOutcome {
    pub fn succeeded(&self) -> bool {
        self.error.is_none() && self.report.is_complete()
    }
}

#[derive(Debug, Clone, Default)]
pub struct BuildSummary {
    pub targets: Vec<TargetOutcome>,
    /// Files that could not be analyzed, with the reason.
    pub skipped_files: Vec<(PathBuf, String)>,
    pub archives: Vec<PathBuf>,
    pub archive_errors: Vec<(PathBuf, String)>,
    pub elapsed: Duration,
}

impl BuildSummary {
    pub fn succeeded(&self) -> bool {
        self.archive_errors.is_empty() && self.targets.iter().all(TargetOutcome::succeeded)
    }

    pub fn failed_count(&self) -> usize {
        self.targets.iter().filter(|t| !t.succeeded()).count()
    }
}

pub struct Processor {
    ctx: Arc<BuildContext>,
}

impl Processor {
    pub fn new(ctx: Arc<BuildContext>) -> Self {
        Self { ctx }
    }

    #[instrument(skip_all, fields(root = %options.root.display()))]
    pub async fn run(&self, options: &BuildOptions) -> Result<BuildSummary> {
        let started = Instant::now();
        let root = &options.root;
        if !root.is_dir() {
            return Err(BundleError::ValidationError(format!(
                "Source root {} is not a directory",
                root.display()
            )));
        }

        let mut summary = BuildSummary::default();
        let (files, folders) = collect_entries(root, options.file.as_deref())?;
        let targets = self.analyze(&files, &folders, &mut summary);
        if targets.is_empty() {
            warn!("No entry points found under {}", root.display());
        }

        for target in targets.values() {
            summary.targets.push(self.pack_target(target).await);
        }

        if options.archive {
            let dists: BTreeSet<PathBuf> = targets
                .values()
                .filter(|t| t.dist_dir().is_dir())
                .map(BuildTarget::dist_dir)
                .collect();
            for dist in dists {
                match archive::archive_dist(&dist).await {
                    Ok(path) => summary.archives.push(path),
                    Err(e) => {
                        error!("Failed to archive {}: {}", dist.display(), e);
                        summary.archive_errors.push((dist, e.to_string()));
                    }
                }
            }
        }

        summary.elapsed = started.elapsed();
        info!(
            "Built {} target(s), {} failed, in {:.2?}",
            summary.targets.len(),
            summary.failed_count(),
            summary.elapsed
        );
        Ok(summary)
    }

    fn analyze(
        &self,
        files: &[PathBuf],
        folders: &[PathBuf],
        summary: &mut BuildSummary,
    ) -> BTreeMap<PathBuf, BuildTarget> {
        let mut targets = BTreeMap::new();
        for file in files {
            match self.ctx.analyzer.analyze(file) {
                Ok(Some(target)) => {
                    info!("Found entry point [{}]", file.display());
                    targets.insert(file.clone(), target);
                }
                Ok(None) => {}
                Err(e) => {
                    warn!("Skipping {}: {}", file.display(), e);
                    summary.skipped_files.push((file.clone(), e.to_string()));
                }
            }
        }
        for folder in folders {
            observe_folder(folder, &mut targets);
        }
        targets
    }

    async fn pack_target(&self, target: &BuildTarget) -> TargetOutcome {
        let started = Instant::now();
        let stem = target.stem();
        info!("Packing [{}]", stem);
        let mut outcome = TargetOutcome {
            entry: target.entry_path.clone(),
            stem: stem.clone(),
            report: InstallReport::default(),
            warnings: Vec::new(),
            error: None,
            elapsed: Duration::ZERO,
        };
        if let Err(e) = self.pack_steps(target, &mut outcome).await {
            error!("Packing [{}] failed: {}", stem, e);
            outcome.error = Some(e.to_string());
        }
        outcome.elapsed = started.elapsed();
        outcome
    }

    async fn pack_steps(&self, target: &BuildTarget, outcome: &mut TargetOutcome) -> Result<()> {
        let assets = self.ctx.config.assets_dir();

        let step = Instant::now();
        packer::prepare_layout(target)?;
        step_done("layout", &outcome.stem, step);

        let step = Instant::now();
        source::pack_sources(target)?;
        step_done("source", &outcome.stem, step);

        let step = Instant::now();
        self.ctx.runtime.ensure_runtime(&target.runtime_dir()).await?;
        step_done("runtime", &outcome.stem, step);

        let step = Instant::now();
        outcome.report = library::pack_libraries(&self.ctx.extractor, target).await;
        step_done("library", &outcome.stem, step);

        let step = Instant::now();
        outcome.warnings = tkinter::pack_tkinter(assets, target).await?;
        step_done("tkinter", &outcome.stem, step);

        let step = Instant::now();
        entry::pack_entry(assets, target)?;
        step_done("entry", &outcome.stem, step);
        Ok(())
    }
}

fn step_done(step: &str, stem: &str, started: Instant) {
    debug!("[{}] {} step took {:.2?}", stem, step, started.elapsed());
}

/// Splits the build inputs into entry candidates and folders. Files come
/// first, each group sorted by name.
fn collect_entries(root: &Path, file: Option<&Path>) -> Result<(Vec<PathBuf>, Vec<PathBuf>)> {
    let mut files = Vec::new();
    let mut folders = Vec::new();
    for entry in fs::read_dir(root)? {
        let path = entry?.path();
        if path.is_dir() {
            folders.push(path);
        } else if path.extension().is_some_and(|ext| ext == "py") {
            files.push(path);
        }
    }
    files.sort();
    folders.sort();

    if let Some(file) = file {
        let file = if file.is_absolute() {
            file.to_path_buf()
        } else {
            root.join(file)
        };
        if !file.is_file() {
            return Err(BundleError::NotFound(format!(
                "Entry file {} does not exist",
                file.display()
            )));
        }
        files = vec![file];
    }
    debug!(
        "Collected {} file(s) and {} folder(s) under {}",
        files.len(),
        folders.len(),
        root.display()
    );
    Ok((files, folders))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_are_sorted_files_then_folders() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("b.py"), "").unwrap();
        fs::write(root.join("a.py"), "").unwrap();
        fs::write(root.join("notes.txt"), "").unwrap();
        fs::create_dir_all(root.join("pkg")).unwrap();

        let (files, folders) = collect_entries(root, None).unwrap();
        assert_eq!(files, vec![root.join("a.py"), root.join("b.py")]);
        assert_eq!(folders, vec![root.join("pkg")]);

        let (files, _) = collect_entries(root, Some(Path::new("b.py"))).unwrap();
        assert_eq!(files, vec![root.join("b.py")]);
        assert!(collect_entries(root, Some(Path::new("missing.py"))).is_err());
    }
}
