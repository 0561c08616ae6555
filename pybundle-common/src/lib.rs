// pybundle-common/src/lib.rs
pub mod config;
pub mod error;
pub mod model;
pub mod settings;

// Re-export key types
pub use config::Config;
pub use error::{BundleError, Result};
pub use model::{BuildTarget, PackageRecord};
pub use settings::Settings;
