// pybundle-core/src/packer/library.rs
use pybundle_common::model::BuildTarget;
use tracing::{info, warn};

use crate::extractor::{InstallReport, PackageExtractor};

/// Installs every external library of `target` into `dist/packages`.
pub async fn pack_libraries(extractor: &PackageExtractor, target: &BuildTarget) -> InstallReport {
    let dest = target.packages_dir();
    let mut report = InstallReport::default();
    for lib in &target.external_libs {
        info!("Packing library [{}] for [{}]", lib, target.stem());
        report.merge(extractor.install(lib, &dest).await);
    }
    for (name, reason) in &report.failed {
        warn!("Bundle [{}] is missing [{}]: {}", target.stem(), name, reason);
    }
    report
}
