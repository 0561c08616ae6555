// pybundle-net/src/http.rs
use std::path::{Path, PathBuf};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use pybundle_common::error::{BundleError, Result};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use reqwest::{Client, StatusCode};
use tokio::fs::{self, File as TokioFile};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::validation::validate_url;

const DOWNLOAD_TIMEOUT_SECS: u64 = 300;
const CONNECT_TIMEOUT_SECS: u64 = 30;
const USER_AGENT_STRING: &str = "pybundle (Rust; python application bundler)";

/// Hard ceiling on a single download.
pub const MAX_DOWNLOAD_BYTES: u64 = 100 * 1024 * 1024;

pub fn build_http_client(timeout: Option<Duration>) -> Result<Client> {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_STRING));
    headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
    Client::builder()
        .timeout(timeout.unwrap_or(Duration::from_secs(DOWNLOAD_TIMEOUT_SECS)))
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
        .default_headers(headers)
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()
        .map_err(|e| BundleError::HttpError(format!("Failed to build HTTP client: {e}")))
}

#[derive(Debug, Clone)]
pub struct DownloadOptions {
    pub max_bytes: u64,
    pub show_progress: bool,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            max_bytes: MAX_DOWNLOAD_BYTES,
            show_progress: false,
        }
    }
}

/// Streams `url` into `final_path`. Bytes land in a sibling temp file that is
/// renamed over the destination only once the body is complete.
pub async fn download_file(
    client: &Client,
    url: &str,
    final_path: &Path,
    options: &DownloadOptions,
) -> Result<PathBuf> {
    validate_url(url)?;
    let file_label = final_path
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let temp_path = final_path.with_file_name(format!(".{file_label}.download"));
    if let Some(parent) = final_path.parent() {
        fs::create_dir_all(parent).await?;
    }
    if fs::try_exists(&temp_path).await.unwrap_or(false) {
        if let Err(e) = fs::remove_file(&temp_path).await {
            warn!(
                "Could not remove existing temporary file {}: {}",
                temp_path.display(),
                e
            );
        }
    }

    debug!("Downloading {} to temporary path: {}", url, temp_path.display());
    let mut response = client.get(url).send().await.map_err(|e| {
        debug!("HTTP request failed for {url}: {e}");
        BundleError::HttpError(format!("HTTP request failed for {url}: {e}"))
    })?;
    let status = response.status();
    debug!("Received HTTP status: {} for {}", status, url);
    if !status.is_success() {
        let reason = match status {
            StatusCode::NOT_FOUND => "Resource not found (404)".to_string(),
            StatusCode::FORBIDDEN => "Access forbidden (403)".to_string(),
            other => format!("HTTP error {other}"),
        };
        return Err(BundleError::DownloadError(file_label, url.to_string(), reason));
    }
    if let Some(len) = response.content_length() {
        if len > options.max_bytes {
            return Err(BundleError::DownloadError(
                file_label,
                url.to_string(),
                format!("Content length {len} exceeds limit of {} bytes", options.max_bytes),
            ));
        }
    }

    let progress = options.show_progress.then(|| {
        let pb = ProgressBar::new(response.content_length().unwrap_or(0));
        pb.set_style(
            ProgressStyle::with_template("{msg} [{bar:30}] {bytes}/{total_bytes} ({eta})")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );
        pb.set_message(file_label.clone());
        pb
    });

    let mut temp_file = TokioFile::create(&temp_path).await.map_err(|e| {
        BundleError::IoError(format!(
            "Failed to create temp file {}: {}",
            temp_path.display(),
            e
        ))
    })?;
    let mut written: u64 = 0;
    let result: Result<()> = async {
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| BundleError::HttpError(format!("Failed to read body of {url}: {e}")))?
        {
            written += chunk.len() as u64;
            if written > options.max_bytes {
                return Err(BundleError::DownloadError(
                    file_label.clone(),
                    url.to_string(),
                    format!("Body exceeds limit of {} bytes", options.max_bytes),
                ));
            }
            temp_file.write_all(&chunk).await?;
            if let Some(pb) = &progress {
                pb.set_position(written);
            }
        }
        temp_file.flush().await?;
        Ok(())
    }
    .await;
    drop(temp_file);
    if let Some(pb) = progress {
        pb.finish_and_clear();
    }
    if let Err(e) = result {
        let _ = fs::remove_file(&temp_path).await;
        return Err(e);
    }
    debug!("Finished writing {} bytes to temp file.", written);

    fs::rename(&temp_path, final_path).await.map_err(|e| {
        BundleError::IoError(format!(
            "Failed to move temp file {} to {}: {}",
            temp_path.display(),
            final_path.display(),
            e
        ))
    })?;
    debug!("Moved download to final location: {}", final_path.display());
    Ok(final_path.to_path_buf())
}
