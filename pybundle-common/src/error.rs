use std::sync::Arc;

use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum BundleError {
    #[error("I/O Error: {0}")]
    Io(#[from] Arc<std::io::Error>),

    #[error("HTTP Request Error: {0}")]
    Http(#[from] Arc<reqwest::Error>),

    #[error("Settings Parsing Error: {0}")]
    TomlDe(#[from] Arc<toml::de::Error>),

    #[error("Settings Serialization Error: {0}")]
    TomlSer(#[from] Arc<toml::ser::Error>),

    #[error("Configuration Error: {0}")]
    Config(String),

    #[error("Resource Not Found: {0}")]
    NotFound(String),

    #[error("Offline mode: {0}")]
    Offline(String),

    #[error("Syntax Error in {0}: {1}")]
    Syntax(String, String),

    #[error("Encoding Error: {0}")]
    Encoding(String),

    #[error("Metadata Error: {0}")]
    Metadata(String),

    #[error("DownloadError: Failed to download '{0}' from '{1}': {2}")]
    DownloadError(String, String, String),

    #[error("HttpError: {0}")]
    HttpError(String),

    #[error("Mirror Error: {0}")]
    Mirror(String),

    #[error("Checksum Mismatch: {0}")]
    ChecksumMismatch(String),

    #[error("Archive Error: {0}")]
    Archive(String),

    #[error("Validation Error: {0}")]
    ValidationError(String),

    #[error("IoError: {0}")]
    IoError(String),

    #[error("Failed to execute command: {0}")]
    CommandExecError(String),

    #[error("Generic Error: {0}")]
    Generic(String),
}

impl From<std::io::Error> for BundleError {
    fn from(err: std::io::Error) -> Self {
        BundleError::Io(Arc::new(err))
    }
}

impl From<reqwest::Error> for BundleError {
    fn from(err: reqwest::Error) -> Self {
        BundleError::Http(Arc::new(err))
    }
}

impl From<toml::de::Error> for BundleError {
    fn from(err: toml::de::Error) -> Self {
        BundleError::TomlDe(Arc::new(err))
    }
}

impl From<toml::ser::Error> for BundleError {
    fn from(err: toml::ser::Error) -> Self {
        BundleError::TomlSer(Arc::new(err))
    }
}

impl BundleError {
    /// True for failures where fetching the same artifact again may succeed.
    pub fn is_integrity_failure(&self) -> bool {
        matches!(self, Self::ChecksumMismatch(_) | Self::Archive(_))
    }

    /// True for failures tied to the endpoint that was contacted, which
    /// another mirror may not share.
    pub fn is_network_failure(&self) -> bool {
        matches!(
            self,
            Self::Http(_) | Self::HttpError(_) | Self::DownloadError(..) | Self::Mirror(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, BundleError>;
