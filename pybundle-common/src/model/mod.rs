// pybundle-common/src/model/mod.rs
// Declares the modules within the model directory.
pub mod package;
pub mod runtime;
pub mod target;

// Re-export
pub use package::{normalize_name, ArchiveKind, PackageMetadata, PackageRecord};
pub use runtime::RuntimeArtifact;
pub use target::{BuildTarget, TargetExtra};
