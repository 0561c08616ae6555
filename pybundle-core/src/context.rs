// pybundle-core/src/context.rs
//! The services a build runs against, wired once per process.
use std::sync::Arc;
use std::time::Duration;

use pybundle_common::config::Config;
use pybundle_common::error::Result;
use pybundle_common::settings::{keys, Settings};
use pybundle_net::mirror::{MirrorSelector, DEFAULT_PROBE_TIMEOUT};
use tracing::{debug, info};

use crate::analyzer::ImportAnalyzer;
use crate::extractor::PackageExtractor;
use crate::repository::{PackageDownloader, PackageRepository, PipDownloader};
use crate::rules::RuleTable;
use crate::runtime::RuntimeProvisioner;
use crate::stdlib::StdlibIndex;

#[derive(Debug, Clone)]
pub struct ContextOptions {
    /// Forces offline mode regardless of the stored setting.
    pub offline: bool,
    /// Drops cached mirror winners so they are probed again.
    pub refresh_mirrors: bool,
    pub probe_timeout: Duration,
    pub show_progress: bool,
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self {
            offline: false,
            refresh_mirrors: false,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            show_progress: true,
        }
    }
}

pub struct BuildContext {
    pub config: Config,
    pub settings: Arc<Settings>,
    pub offline: bool,
    pub mirrors: Arc<MirrorSelector>,
    pub repository: Arc<PackageRepository>,
    pub extractor: PackageExtractor,
    pub runtime: RuntimeProvisioner,
    pub analyzer: ImportAnalyzer,
}

impl BuildContext {
    pub fn new(config: Config, settings: Arc<Settings>, options: ContextOptions) -> Result<Self> {
        let downloader = Arc::new(PipDownloader::from_config(&config));
        Self::with_downloader(config, settings, options, downloader)
    }

    pub fn with_downloader(
        config: Config,
        settings: Arc<Settings>,
        options: ContextOptions,
        downloader: Arc<dyn PackageDownloader>,
    ) -> Result<Self> {
        let offline = options.offline || settings.get_bool(keys::OFFLINE).unwrap_or(false);
        if offline {
            info!("Offline mode: only cached packages and runtimes are used");
        }
        if options.refresh_mirrors {
            debug!("Clearing cached mirror selections");
            MirrorSelector::clear_cached(&settings)?;
        }

        let mirrors = Arc::new(MirrorSelector::new(options.probe_timeout)?);
        let repository = Arc::new(PackageRepository::new(
            config.libs_dir(),
            offline,
            Arc::clone(&mirrors),
            Arc::clone(&settings),
            downloader,
        ));
        let extractor = PackageExtractor::new(
            Arc::clone(&repository),
            RuleTable::builtin()?,
            config.host_python.clone(),
        );
        let runtime = RuntimeProvisioner::new(
            config.clone(),
            Arc::clone(&settings),
            Arc::clone(&mirrors),
            offline,
            options.show_progress,
        )?;
        let analyzer = ImportAnalyzer::new(StdlibIndex::for_version(&config.runtime_version));

        Ok(Self {
            config,
            settings,
            offline,
            mirrors,
            repository,
            extractor,
            runtime,
            analyzer,
        })
    }
}
