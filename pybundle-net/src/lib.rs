// pybundle-net/src/lib.rs
pub mod http;
pub mod mirror;
pub mod validation;

pub use http::{build_http_client, download_file, DownloadOptions};
pub use mirror::{Mirror, MirrorPurpose, MirrorSelector, ProbeResult};
pub use validation::validate_url;
