// pybundle-core/src/metadata.rs
//! Archive filename conventions and METADATA / PKG-INFO parsing.
use std::collections::BTreeSet;
use std::path::Path;

use pybundle_aio::extract::{read_tar_gz_entry, read_zip_entry};
use pybundle_common::error::{BundleError, Result};
use pybundle_common::model::{normalize_name, ArchiveKind, PackageMetadata, PackageRecord};
use tracing::{debug, warn};

/// Characters that end the name part of a requirement specifier.
const REQUIREMENT_STOP: &[char] = &['<', '>', '!', '=', '~', '[', '(', ',', '@', ';'];

/// Splits an archive filename into (normalized name, version, kind).
///
/// Wheels follow `name-version(-build)?-py-abi-platform.whl`, sdists
/// `name-version.tar.gz`. Anything else yields `None`.
pub fn parse_archive_filename(path: &Path) -> Option<(String, String, ArchiveKind)> {
    let kind = ArchiveKind::from_path(path)?;
    let filename = path.file_name()?.to_str()?;
    let (name, version) = match kind {
        ArchiveKind::Wheel => {
            let stem = &filename[..filename.len() - ".whl".len()];
            let mut parts = stem.split('-');
            let name = parts.next()?;
            let version = parts.next()?;
            (name, version)
        }
        ArchiveKind::Sdist => {
            let stem = &filename[..filename.len() - ".tar.gz".len()];
            stem.rsplit_once('-')?
        }
    };
    if name.is_empty() || version.is_empty() {
        return None;
    }
    Some((normalize_name(name), version.to_string(), kind))
}

/// Reduces a `Requires-Dist` value to a bare normalized name.
/// Returns `None` for empty input and for requirements gated on an extra.
pub fn strip_requirement(spec: &str) -> Option<String> {
    let spec = spec.trim();
    if let Some((_, marker)) = spec.split_once(';') {
        if marker.contains("extra") {
            return None;
        }
    }
    let end = spec
        .find(|c: char| c.is_whitespace() || REQUIREMENT_STOP.contains(&c))
        .unwrap_or(spec.len());
    let name = &spec[..end];
    if name.is_empty() {
        None
    } else {
        Some(normalize_name(name))
    }
}

/// Parses the RFC 822 style header block of a METADATA / PKG-INFO record.
pub fn parse_metadata_text(text: &str) -> PackageMetadata {
    let mut meta = PackageMetadata::default();
    for line in text.lines() {
        if line.trim().is_empty() {
            // Headers end at the first blank line; the long description follows.
            break;
        }
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        let non_empty = || (!value.is_empty() && value != "UNKNOWN").then(|| value.to_string());
        match key.trim().to_ascii_lowercase().as_str() {
            "name" => meta.name = normalize_name(value),
            "version" => meta.version = value.to_string(),
            "summary" => meta.summary = non_empty(),
            "home-page" => meta.homepage = non_empty(),
            "project-url" if meta.homepage.is_none() => {
                if let Some((label, url)) = value.split_once(',') {
                    if label.trim().eq_ignore_ascii_case("homepage") {
                        meta.homepage = Some(url.trim().to_string());
                    }
                }
            }
            "author" => meta.author = non_empty(),
            "license" => meta.license = non_empty(),
            "requires-dist" => {
                if let Some(dep) = strip_requirement(value) {
                    meta.requires.insert(dep);
                }
            }
            _ => {}
        }
    }
    meta
}

fn is_wheel_metadata(entry: &str) -> bool {
    match entry.split_once('/') {
        Some((dir, rest)) => dir.ends_with(".dist-info") && rest == "METADATA",
        None => false,
    }
}

fn is_sdist_pkg_info(entry: &str) -> bool {
    match entry.split_once('/') {
        Some((_, rest)) => rest == "PKG-INFO",
        None => false,
    }
}

/// Reads the embedded metadata record of an archive.
pub fn read_metadata(record: &PackageRecord) -> Result<PackageMetadata> {
    let text = match record.kind {
        ArchiveKind::Wheel => read_zip_entry(&record.filepath, is_wheel_metadata)?,
        ArchiveKind::Sdist => read_tar_gz_entry(&record.filepath, is_sdist_pkg_info)?,
    };
    let text = text.ok_or_else(|| {
        BundleError::Metadata(format!(
            "No metadata record found in {}",
            record.filepath.display()
        ))
    })?;
    let mut meta = parse_metadata_text(&text);
    if meta.name.is_empty() {
        meta.name = record.name.clone();
    }
    if meta.version.is_empty() {
        meta.version = record.version.clone();
    }
    Ok(meta)
}

/// Dependency names of `record`, read once and cached on the record.
/// Unreadable metadata is logged and treated as having no dependencies.
pub fn requires(record: &PackageRecord) -> &BTreeSet<String> {
    record.requires_with(|r| match read_metadata(r) {
        Ok(meta) => {
            debug!("{}", meta);
            debug!("{} requires {:?}", r.name, meta.requires);
            meta.requires
        }
        Err(e) => {
            warn!("Could not read dependencies of {}: {}", r.name, e);
            BTreeSet::new()
        }
    })
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn parses_wheel_and_sdist_filenames() {
        assert_eq!(
            parse_archive_filename(&PathBuf::from(
                "/libs/typing_extensions-4.12.2-py3-none-any.whl"
            )),
            Some((
                "typing-extensions".to_string(),
                "4.12.2".to_string(),
                ArchiveKind::Wheel
            ))
        );
        assert_eq!(
            parse_archive_filename(&PathBuf::from("python-docx-0.8.11.tar.gz")),
            Some((
                "python-docx".to_string(),
                "0.8.11".to_string(),
                ArchiveKind::Sdist
            ))
        );
        assert_eq!(parse_archive_filename(&PathBuf::from("broken.whl")), None);
        assert_eq!(parse_archive_filename(&PathBuf::from("notes.txt")), None);
    }

    #[test]
    fn strips_requirement_constraints() {
        assert_eq!(strip_requirement("urllib3<3,>=1.21.1").as_deref(), Some("urllib3"));
        assert_eq!(strip_requirement("chardet<6,>=3.0.2").as_deref(), Some("chardet"));
        assert_eq!(strip_requirement("pkg[extra]>=1.0").as_deref(), Some("pkg"));
        assert_eq!(
            strip_requirement("importlib_metadata ; python_version < \"3.10\"").as_deref(),
            Some("importlib-metadata")
        );
        assert_eq!(strip_requirement("cffi (>=1.0)").as_deref(), Some("cffi"));
        assert_eq!(strip_requirement("   "), None);
    }

    #[test]
    fn skips_extra_gated_requirements() {
        assert_eq!(strip_requirement("PySocks!=1.5.7,>=1.5.6; extra == \"socks\""), None);
    }

    #[test]
    fn parses_metadata_headers_only() {
        let text = "Metadata-Version: 2.1\n\
                    Name: requests\n\
                    Version: 2.25.1\n\
                    Summary: Python HTTP for Humans.\n\
                    Home-page: https://requests.readthedocs.io\n\
                    Author: Kenneth Reitz\n\
                    License: Apache 2.0\n\
                    Requires-Dist: chardet<5,>=3.0.2\n\
                    Requires-Dist: urllib3<1.27,>=1.21.1\n\
                    Requires-Dist: PySocks!=1.5.7,>=1.5.6; extra == \"socks\"\n\
                    \n\
                    Requires-Dist: not-a-header\n";
        let meta = parse_metadata_text(text);
        assert_eq!(meta.name, "requests");
        assert_eq!(meta.version, "2.25.1");
        assert_eq!(meta.summary.as_deref(), Some("Python HTTP for Humans."));
        assert_eq!(meta.homepage.as_deref(), Some("https://requests.readthedocs.io"));
        assert_eq!(meta.author.as_deref(), Some("Kenneth Reitz"));
        assert_eq!(meta.license.as_deref(), Some("Apache 2.0"));
        assert_eq!(
            meta.requires.into_iter().collect::<Vec<_>>(),
            vec!["chardet", "urllib3"]
        );
    }

    #[test]
    fn reads_sdist_pkg_info_requirements() {
        use flate2::write::GzEncoder;
        use flate2::Compression;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("docopt-0.6.2.tar.gz");
        let body = b"Metadata-Version: 1.1\nName: docopt\nVersion: 0.6.2\nRequires-Dist: six\n";
        let gz = GzEncoder::new(std::fs::File::create(&path).unwrap(), Compression::default());
        let mut builder = tar::Builder::new(gz);
        let mut header = tar::Header::new_gnu();
        header.set_size(body.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, "docopt-0.6.2/PKG-INFO", &body[..])
            .unwrap();
        builder.into_inner().unwrap().finish().unwrap();

        let record = PackageRecord::new("docopt", "0.6.2", &path, ArchiveKind::Sdist);
        assert_eq!(read_metadata(&record).unwrap().name, "docopt");
        assert!(requires(&record).contains("six"));
    }

    #[test]
    fn metadata_entry_matchers() {
        assert!(is_wheel_metadata("requests-2.25.1.dist-info/METADATA"));
        assert!(!is_wheel_metadata("requests/vendor/x.dist-info/METADATA"));
        assert!(is_sdist_pkg_info("docopt-0.6.2/PKG-INFO"));
        assert!(!is_sdist_pkg_info("docopt-0.6.2/docopt.egg-info/PKG-INFO"));
    }
}
