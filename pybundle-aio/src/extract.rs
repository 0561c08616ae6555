// pybundle-aio/src/extract.rs
// Zip and tarball helpers used for wheels, sdists, the runtime and bundle output.
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use pybundle_common::error::{BundleError, Result};
use tracing::{debug, warn};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipArchive, ZipWriter};

fn open_zip(archive_path: &Path) -> Result<ZipArchive<File>> {
    let file = File::open(archive_path)?;
    ZipArchive::new(file).map_err(|e| {
        BundleError::Archive(format!(
            "Failed to open zip archive {}: {e}",
            archive_path.display()
        ))
    })
}

/// Returns `Ok` if the file parses as a zip archive with a readable directory.
pub fn validate_zip(archive_path: &Path) -> Result<()> {
    let archive = open_zip(archive_path)?;
    debug!(
        "Validated zip {} ({} entries)",
        archive_path.display(),
        archive.len()
    );
    Ok(())
}

/// Extracts the whole archive into `target_dir`.
pub fn extract_zip_archive(archive_path: &Path, target_dir: &Path) -> Result<Vec<String>> {
    extract_zip_filtered(archive_path, target_dir, |_| true)
}

/// Extracts entries whose archive-internal path satisfies `keep`.
/// Returns the names of the extracted file entries.
pub fn extract_zip_filtered<F>(
    archive_path: &Path,
    target_dir: &Path,
    keep: F,
) -> Result<Vec<String>>
where
    F: Fn(&str) -> bool,
{
    debug!(
        "Extracting ZIP archive {} to {}",
        archive_path.display(),
        target_dir.display()
    );
    let mut archive = open_zip(archive_path)?;
    fs::create_dir_all(target_dir)?;
    let mut extracted = Vec::new();

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(|e| {
            BundleError::Archive(format!(
                "Failed to read entry {i} of {}: {e}",
                archive_path.display()
            ))
        })?;
        let name = entry.name().to_string();
        if !keep(&name) {
            continue;
        }
        let Some(relative) = entry.enclosed_name() else {
            warn!("Skipping unsafe zip entry path: {}", name);
            continue;
        };
        if relative
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)))
        {
            warn!("Skipping zip entry escaping target: {}", name);
            continue;
        }
        let outpath = target_dir.join(&relative);

        if entry.is_dir() {
            fs::create_dir_all(&outpath)?;
            continue;
        }
        if let Some(parent) = outpath.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut outfile = File::create(&outpath).map_err(|e| {
            BundleError::IoError(format!("Failed to create {}: {e}", outpath.display()))
        })?;
        io::copy(&mut entry, &mut outfile).map_err(|e| {
            BundleError::IoError(format!("Failed to write {}: {e}", outpath.display()))
        })?;

        #[cfg(unix)]
        if let Some(mode) = entry.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            if let Err(e) = fs::set_permissions(&outpath, fs::Permissions::from_mode(mode)) {
                debug!("Could not set mode on {}: {}", outpath.display(), e);
            }
        }
        extracted.push(name);
    }
    debug!(
        "Extracted {} entries from {}",
        extracted.len(),
        archive_path.display()
    );
    Ok(extracted)
}

/// Async wrapper running a full extraction on the blocking pool.
pub async fn extract_zip_archive_async(archive_path: &Path, target_dir: &Path) -> Result<Vec<String>> {
    let archive_path = archive_path.to_path_buf();
    let target_dir = target_dir.to_path_buf();
    tokio::task::spawn_blocking(move || extract_zip_archive(&archive_path, &target_dir))
        .await
        .map_err(|e| BundleError::Generic(format!("JoinError in ZIP extraction: {e}")))?
}

/// Reads the first entry whose name satisfies `matches` as UTF-8 text.
pub fn read_zip_entry<F>(archive_path: &Path, matches: F) -> Result<Option<String>>
where
    F: Fn(&str) -> bool,
{
    let mut archive = open_zip(archive_path)?;
    let Some(name) = archive.file_names().find(|n| matches(n)).map(str::to_string) else {
        return Ok(None);
    };
    let mut entry = archive
        .by_name(&name)
        .map_err(|e| BundleError::Archive(format!("Failed to read {name}: {e}")))?;
    let mut content = String::new();
    entry.read_to_string(&mut content).map_err(|e| {
        BundleError::Encoding(format!("{name} in {} is not UTF-8: {e}", archive_path.display()))
    })?;
    Ok(Some(content))
}

/// Reads the first member of a `.tar.gz` whose path satisfies `matches`.
pub fn read_tar_gz_entry<F>(archive_path: &Path, matches: F) -> Result<Option<String>>
where
    F: Fn(&str) -> bool,
{
    let file = File::open(archive_path)?;
    let mut archive = tar::Archive::new(GzDecoder::new(file));
    let entries = archive.entries().map_err(|e| {
        BundleError::Archive(format!(
            "Failed to read tarball {}: {e}",
            archive_path.display()
        ))
    })?;
    for entry in entries {
        let mut entry =
            entry.map_err(|e| BundleError::Archive(format!("Corrupt tar entry: {e}")))?;
        let path = entry
            .path()
            .map_err(|e| BundleError::Archive(format!("Invalid tar entry path: {e}")))?
            .to_string_lossy()
            .replace('\\', "/");
        if matches(&path) {
            let mut content = String::new();
            entry.read_to_string(&mut content).map_err(|e| {
                BundleError::Encoding(format!("{path} is not UTF-8: {e}"))
            })?;
            return Ok(Some(content));
        }
    }
    Ok(None)
}

/// Packs `source_dir` into a zip at `dest`. Entries are sorted and carry a
/// fixed timestamp so the output is reproducible.
pub fn zip_directory(source_dir: &Path, dest: &Path) -> Result<usize> {
    debug!("Zipping {} -> {}", source_dir.display(), dest.display());
    let tmp: PathBuf = dest.with_file_name(format!(
        ".{}.partial",
        dest.file_name().unwrap_or_default().to_string_lossy()
    ));
    let file = File::create(&tmp)?;
    let mut writer = ZipWriter::new(file);
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default())
        .unix_permissions(0o644);
    let mut count = 0;

    for entry in WalkDir::new(source_dir).sort_by_file_name().min_depth(1) {
        let entry = entry.map_err(|e| BundleError::IoError(format!("Walk error: {e}")))?;
        let relative = entry
            .path()
            .strip_prefix(source_dir)
            .map_err(|e| BundleError::Generic(format!("Path prefix error: {e}")))?;
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        let zip_err = |e: zip::result::ZipError| BundleError::Archive(format!("{name}: {e}"));
        if entry.file_type().is_dir() {
            writer.add_directory(name.clone(), options).map_err(zip_err)?;
        } else if entry.file_type().is_file() {
            writer.start_file(name.clone(), options).map_err(zip_err)?;
            let mut src = File::open(entry.path())?;
            io::copy(&mut src, &mut writer)?;
            count += 1;
        }
    }
    let mut file = writer
        .finish()
        .map_err(|e| BundleError::Archive(format!("Failed to finish {}: {e}", dest.display())))?;
    file.flush()?;
    fs::rename(&tmp, dest)?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_zip(path: &Path, files: &[(&str, &str)]) {
        let mut writer = ZipWriter::new(File::create(path).unwrap());
        for (name, body) in files {
            writer
                .start_file(name.to_string(), SimpleFileOptions::default())
                .unwrap();
            writer.write_all(body.as_bytes()).unwrap();
        }
        writer.finish().unwrap();
    }

    #[test]
    fn filtered_extraction_keeps_only_matches() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("pkg.whl");
        write_zip(
            &archive,
            &[
                ("pkg/__init__.py", "x = 1"),
                ("pkg/tests/test_a.py", ""),
                ("pkg-1.0.dist-info/METADATA", "Name: pkg"),
            ],
        );
        let dest = dir.path().join("out");
        let extracted =
            extract_zip_filtered(&archive, &dest, |n| !n.contains("/tests/") && !n.contains(".dist-info/"))
                .unwrap();
        assert_eq!(extracted, vec!["pkg/__init__.py".to_string()]);
        assert!(dest.join("pkg/__init__.py").is_file());
        assert!(!dest.join("pkg/tests").exists());
    }

    #[test]
    fn reads_matching_entry_text() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("a.zip");
        write_zip(&archive, &[("a-1.0.dist-info/METADATA", "Name: a\n")]);
        let body = read_zip_entry(&archive, |n| n.ends_with(".dist-info/METADATA")).unwrap();
        assert_eq!(body.as_deref(), Some("Name: a\n"));
        assert!(read_zip_entry(&archive, |n| n == "missing").unwrap().is_none());
    }

    #[test]
    fn validate_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let bogus = dir.path().join("bogus.zip");
        fs::write(&bogus, b"<html>not found</html>").unwrap();
        assert!(matches!(validate_zip(&bogus), Err(BundleError::Archive(_))));
    }

    #[test]
    fn zip_directory_is_reproducible() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("dist");
        fs::create_dir_all(src.join("source")).unwrap();
        fs::write(src.join("source/main.py"), "print(1)").unwrap();
        fs::write(src.join("main.bat"), "@echo off").unwrap();

        let a = dir.path().join("a.zip");
        let b = dir.path().join("b.zip");
        assert_eq!(zip_directory(&src, &a).unwrap(), 2);
        zip_directory(&src, &b).unwrap();
        assert_eq!(fs::read(&a).unwrap(), fs::read(&b).unwrap());
        let archive = open_zip(&a).unwrap();
        let names: Vec<&str> = archive.file_names().collect();
        assert_eq!(names, vec!["main.bat", "source/", "source/main.py"]);
    }
}
