// pybundle-net/src/validation.rs
use pybundle_common::error::{BundleError, Result};
use url::Url;

/// Validates a URL, ensuring it uses the HTTPS scheme.
pub fn validate_url(url_str: &str) -> Result<Url> {
    let url = Url::parse(url_str).map_err(|e| {
        BundleError::ValidationError(format!("Failed to parse URL '{url_str}': {e}"))
    })?;
    if url.scheme() == "https" {
        Ok(url)
    } else {
        Err(BundleError::ValidationError(format!(
            "Invalid URL scheme for '{}': Must be https, but got '{}'",
            url_str,
            url.scheme()
        )))
    }
}

/// Host portion of a URL, as handed to pip's `--trusted-host`.
pub fn host_of(url_str: &str) -> Option<String> {
    Url::parse(url_str)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_https_is_accepted() {
        assert!(validate_url("https://www.python.org/ftp/python/").is_ok());
        assert!(matches!(
            validate_url("http://www.python.org/ftp/python/"),
            Err(BundleError::ValidationError(_))
        ));
        assert!(validate_url("not a url").is_err());
    }

    #[test]
    fn extracts_host() {
        assert_eq!(
            host_of("https://pypi.tuna.tsinghua.edu.cn/simple/").as_deref(),
            Some("pypi.tuna.tsinghua.edu.cn")
        );
        assert_eq!(host_of("::"), None);
    }
}
