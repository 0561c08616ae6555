// pybundle-core/src/lib.rs
pub mod analyzer;
pub mod context;
pub mod extractor;
pub mod metadata;
pub mod packer;
pub mod processor;
pub mod repository;
pub mod rules;
pub mod runtime;
pub mod stdlib;

// Re-export key types for the CLI crate
pub use analyzer::ImportAnalyzer;
pub use context::{BuildContext, ContextOptions};
pub use extractor::{InstallReport, PackageExtractor};
pub use processor::{BuildOptions, BuildSummary, Processor, TargetOutcome};
pub use repository::{PackageDownloader, PackageRepository};
pub use runtime::RuntimeProvisioner;
