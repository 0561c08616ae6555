// pybundle-net/src/mirror.rs
//! Latency-based selection between equivalent download endpoints.
use std::fmt;
use std::future::Future;
use std::time::{Duration, Instant};

use futures::future::join_all;
use pybundle_common::error::{BundleError, Result};
use pybundle_common::settings::{keys, Settings};
use reqwest::Client;
use tracing::{debug, info, warn};

use crate::http::build_http_client;

pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

const RUNTIME_MIRRORS: &[(&str, &str)] = &[
    ("official", "https://www.python.org/ftp/python/"),
    ("huawei", "https://mirrors.huaweicloud.com/python/"),
];

const PACKAGE_MIRRORS: &[(&str, &str)] = &[
    ("pypi", "https://pypi.org/simple/"),
    ("tsinghua", "https://pypi.tuna.tsinghua.edu.cn/simple/"),
    ("aliyun", "https://mirrors.aliyun.com/pypi/simple/"),
    ("huawei", "https://repo.huaweicloud.com/repository/pypi/simple/"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorPurpose {
    /// Embeddable runtime archives.
    Runtime,
    /// Package index used by pip.
    Packages,
}

impl MirrorPurpose {
    pub fn cache_key(&self) -> &'static str {
        match self {
            Self::Runtime => keys::FASTEST_RUNTIME_MIRROR,
            Self::Packages => keys::FASTEST_PACKAGE_MIRROR,
        }
    }

    fn override_key(&self) -> &'static str {
        match self {
            Self::Runtime => keys::RUNTIME_MIRRORS,
            Self::Packages => keys::PACKAGE_MIRRORS,
        }
    }

    fn defaults(&self) -> &'static [(&'static str, &'static str)] {
        match self {
            Self::Runtime => RUNTIME_MIRRORS,
            Self::Packages => PACKAGE_MIRRORS,
        }
    }

    /// Candidate endpoints, taken from settings when a table is configured.
    pub fn candidates(&self, settings: &Settings) -> Vec<Mirror> {
        match settings.get_table(self.override_key()) {
            Some(table) if !table.is_empty() => table
                .into_iter()
                .map(|(name, url)| Mirror { name, url })
                .collect(),
            _ => self
                .defaults()
                .iter()
                .map(|(name, url)| Mirror {
                    name: name.to_string(),
                    url: url.to_string(),
                })
                .collect(),
        }
    }
}

impl fmt::Display for MirrorPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Runtime => write!(f, "runtime"),
            Self::Packages => write!(f, "packages"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mirror {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct ProbeResult {
    pub mirror: Mirror,
    /// `None` when the probe failed or timed out.
    pub latency: Option<Duration>,
}

/// Runs `probe` against every candidate concurrently, bounding each by
/// `timeout`, and returns per-candidate latencies in input order.
pub async fn probe_with<F, Fut>(candidates: &[Mirror], timeout: Duration, probe: F) -> Vec<ProbeResult>
where
    F: Fn(String) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let probes = candidates.iter().map(|mirror| {
        let fut = probe(mirror.url.clone());
        async move {
            let start = Instant::now();
            let latency = match tokio::time::timeout(timeout, fut).await {
                Ok(Ok(())) => Some(start.elapsed()),
                Ok(Err(e)) => {
                    debug!("Mirror probe failed for {}: {}", mirror.url, e);
                    None
                }
                Err(_) => {
                    debug!("Mirror probe timed out for {}", mirror.url);
                    None
                }
            };
            ProbeResult {
                mirror: mirror.clone(),
                latency,
            }
        }
    });
    join_all(probes).await
}

/// Reachable candidates, fastest first. Ties keep input order.
pub fn ranked(results: &[ProbeResult]) -> Vec<&Mirror> {
    let mut reachable: Vec<(Duration, &Mirror)> = results
        .iter()
        .filter_map(|r| r.latency.map(|l| (l, &r.mirror)))
        .collect();
    reachable.sort_by_key(|(latency, _)| *latency);
    reachable.into_iter().map(|(_, mirror)| mirror).collect()
}

/// The lowest-latency reachable candidate. Ties go to the earlier candidate.
pub fn fastest_of(results: &[ProbeResult]) -> Option<&Mirror> {
    ranked(results).into_iter().next()
}

/// Runs `op` against `first`. When that fails with a network error the cached
/// winner for `purpose` is forgotten, the candidates are measured through
/// `measure`, and the remaining reachable ones are tried fastest first. The
/// mirror that succeeds becomes the cached winner.
///
/// Errors that are not network failures are returned without trying further
/// mirrors.
pub async fn fall_through<T, P, PFut, F, Fut>(
    purpose: MirrorPurpose,
    settings: &Settings,
    first: String,
    measure: P,
    mut op: F,
) -> Result<(String, T)>
where
    P: FnOnce(Vec<Mirror>) -> PFut,
    PFut: Future<Output = Vec<ProbeResult>>,
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last_error = match op(first.clone()).await {
        Ok(value) => return Ok((first, value)),
        Err(e) if e.is_network_failure() => e,
        Err(e) => return Err(e),
    };
    warn!("{} mirror {} failed: {}", purpose, first, last_error);
    settings.remove(purpose.cache_key())?;

    let results = measure(purpose.candidates(settings)).await;
    for mirror in ranked(&results) {
        if mirror.url == first {
            continue;
        }
        info!("Trying {} mirror {} ({})", purpose, mirror.name, mirror.url);
        match op(mirror.url.clone()).await {
            Ok(value) => {
                info!("Selected {} mirror: {}", purpose, mirror.url);
                settings.set(purpose.cache_key(), mirror.url.clone())?;
                return Ok((mirror.url.clone(), value));
            }
            Err(e) if e.is_network_failure() => {
                warn!("{} mirror {} failed: {}", purpose, mirror.url, e);
                last_error = e;
            }
            Err(e) => return Err(e),
        }
    }
    Err(last_error)
}

pub struct MirrorSelector {
    client: Client,
    timeout: Duration,
}

impl MirrorSelector {
    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_http_client(Some(timeout))?,
            timeout,
        })
    }

    /// Measures time to response headers; the body is never read.
    async fn probe_url(client: Client, url: String) -> Result<()> {
        let response = client.get(&url).send().await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(BundleError::Mirror(format!(
                "{} answered {}",
                url,
                response.status()
            )))
        }
    }

    pub async fn probe_all(&self, candidates: &[Mirror]) -> Vec<ProbeResult> {
        let client = self.client.clone();
        probe_with(candidates, self.timeout, move |url| {
            Self::probe_url(client.clone(), url)
        })
        .await
    }

    pub async fn fastest(&self, candidates: &[Mirror]) -> Option<String> {
        let results = self.probe_all(candidates).await;
        fastest_of(&results).map(|m| m.url.clone())
    }

    /// Returns the cached winner for `purpose`, probing when nothing is cached
    /// or `refresh` is set. A fresh winner is written back to `settings`.
    pub async fn select(
        &self,
        purpose: MirrorPurpose,
        settings: &Settings,
        refresh: bool,
    ) -> Result<String> {
        if refresh {
            settings.remove(purpose.cache_key())?;
        } else if let Some(cached) = settings.get_str(purpose.cache_key()) {
            debug!("Using cached {} mirror: {}", purpose, cached);
            return Ok(cached);
        }

        let candidates = purpose.candidates(settings);
        debug!("Probing {} {} mirror(s)", candidates.len(), purpose);
        let fastest = self.fastest(&candidates).await.ok_or_else(|| {
            BundleError::Mirror(format!("No {purpose} mirror answered within {:?}", self.timeout))
        })?;
        info!("Selected {} mirror: {}", purpose, fastest);
        settings.set(purpose.cache_key(), fastest.clone())?;
        Ok(fastest)
    }

    /// Runs `op` with the selected mirror URL for `purpose`, falling through
    /// to the other candidates on network errors. Returns the URL that worked
    /// along with the result.
    pub async fn with_fallback<T, F, Fut>(
        &self,
        purpose: MirrorPurpose,
        settings: &Settings,
        op: F,
    ) -> Result<(String, T)>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let first = self.select(purpose, settings, false).await?;
        let client = self.client.clone();
        let timeout = self.timeout;
        let measure = move |candidates: Vec<Mirror>| async move {
            probe_with(&candidates, timeout, move |url| {
                Self::probe_url(client.clone(), url)
            })
            .await
        };
        fall_through(purpose, settings, first, measure, op).await
    }

    pub fn clear_cached(settings: &Settings) -> Result<()> {
        for purpose in [MirrorPurpose::Runtime, MirrorPurpose::Packages] {
            settings.remove(purpose.cache_key())?;
        }
        Ok(())
    }
}
