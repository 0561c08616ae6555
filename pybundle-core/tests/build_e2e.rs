// pybundle-core/tests/build_e2e.rs
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::future::BoxFuture;
use pybundle_common::config::Config;
use pybundle_common::error::{BundleError, Result};
use pybundle_common::settings::Settings;
use pybundle_core::context::{BuildContext, ContextOptions};
use pybundle_core::processor::{BuildOptions, Processor};
use pybundle_core::repository::PackageDownloader;
use zip::write::SimpleFileOptions;
use walkdir::WalkDir;
use zip::ZipWriter;

struct NoDownloads;

impl PackageDownloader for NoDownloads {
    fn download<'a>(&'a self, name: &'a str, _: &'a Path, _: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move { Err(BundleError::NotFound(name.to_string())) })
    }
}

fn write_zip(path: &Path, files: &[(&str, &str)]) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let mut writer = ZipWriter::new(File::create(path).unwrap());
    for (name, body) in files {
        writer
            .start_file(name.to_string(), SimpleFileOptions::default())
            .unwrap();
        writer.write_all(body.as_bytes()).unwrap();
    }
    writer.finish().unwrap();
}

/// Relative path and contents of every file under `root`, in name order.
fn snapshot(root: &Path) -> Vec<(PathBuf, Vec<u8>)> {
    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .map(|e| e.unwrap())
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            let relative = e.path().strip_prefix(root).unwrap().to_path_buf();
            (relative, fs::read(e.path()).unwrap())
        })
        .collect()
}

struct Fixture {
    _dir: tempfile::TempDir,
    project: PathBuf,
    ctx: Arc<BuildContext>,
}

fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let config = Config::with_cache_dir(dir.path().join("cache"));

    write_zip(
        &config.runtime_archive_path(),
        &[("python.exe", "MZ"), ("python38.zip", "")],
    );
    write_zip(
        &config.libs_dir().join("requests-2.31.0-py3-none-any.whl"),
        &[
            ("requests/__init__.py", "import urllib3\n"),
            (
                "requests-2.31.0.dist-info/METADATA",
                "Name: requests\nVersion: 2.31.0\nRequires-Dist: urllib3<3,>=1.21.1\n",
            ),
        ],
    );
    write_zip(
        &config.libs_dir().join("urllib3-2.0.7-py3-none-any.whl"),
        &[
            ("urllib3/__init__.py", ""),
            ("urllib3-2.0.7.dist-info/METADATA", "Name: urllib3\nVersion: 2.0.7\n"),
        ],
    );

    let project = dir.path().join("project");
    fs::create_dir_all(&project).unwrap();
    fs::write(
        project.join("main.py"),
        "import os\nimport utils\nimport requests\n\n\
         def main():\n    utils.greet()\n\n\
         if __name__ == \"__main__\":\n    main()\n",
    )
    .unwrap();
    fs::write(project.join("utils.py"), "def greet():\n    print('hi')\n").unwrap();

    let options = ContextOptions {
        offline: true,
        show_progress: false,
        ..ContextOptions::default()
    };
    let ctx = BuildContext::with_downloader(
        config,
        Arc::new(Settings::in_memory()),
        options,
        Arc::new(NoDownloads),
    )
    .unwrap();
    Fixture {
        _dir: dir,
        project,
        ctx: Arc::new(ctx),
    }
}

#[tokio::test]
async fn builds_complete_layout() {
    let fx = fixture();
    let processor = Processor::new(fx.ctx.clone());
    let options = BuildOptions {
        root: fx.project.clone(),
        file: None,
        archive: true,
    };

    let summary = processor.run(&options).await.unwrap();
    assert!(summary.succeeded(), "{:?}", summary);
    assert_eq!(summary.targets.len(), 1);
    assert_eq!(summary.targets[0].report.installed, vec!["requests", "urllib3"]);

    let dist = fx.project.join("dist");
    assert!(dist.join("source/main.py").is_file());
    assert!(dist.join("source/utils.py").is_file());
    assert!(dist.join("packages/requests/__init__.py").is_file());
    assert!(dist.join("packages/urllib3/__init__.py").is_file());
    assert!(!dist.join("packages/requests-2.31.0.dist-info").exists());
    assert!(dist.join("runtime/python.exe").is_file());
    assert!(dist.join("main.int").is_file());
    assert!(dist.join("main.bat").is_file());
    assert_eq!(summary.archives, vec![fx.project.join("dist.zip")]);
    assert!(fx.project.join("dist.zip").is_file());
}

#[tokio::test]
async fn second_build_installs_nothing_new() {
    let fx = fixture();
    let processor = Processor::new(fx.ctx.clone());
    let options = BuildOptions {
        root: fx.project.clone(),
        file: Some("main.py".into()),
        archive: false,
    };

    processor.run(&options).await.unwrap();
    let again = processor.run(&options).await.unwrap();
    assert!(again.succeeded());
    let report = &again.targets[0].report;
    assert!(report.installed.is_empty());
    assert_eq!(report.skipped, vec!["requests"]);
}

#[tokio::test]
async fn rebuild_produces_identical_output() {
    let fx = fixture();
    let processor = Processor::new(fx.ctx.clone());
    let options = BuildOptions {
        root: fx.project.clone(),
        file: None,
        archive: true,
    };

    processor.run(&options).await.unwrap();
    let first = snapshot(&fx.project.join("dist"));
    let first_archive = fs::read(fx.project.join("dist.zip")).unwrap();
    assert!(first.iter().any(|(p, _)| p == Path::new("packages/urllib3/__init__.py")));

    let again = processor.run(&options).await.unwrap();
    assert!(again.succeeded());
    assert_eq!(snapshot(&fx.project.join("dist")), first);
    assert_eq!(fs::read(fx.project.join("dist.zip")).unwrap(), first_archive);
}

#[tokio::test]
async fn missing_library_fails_target_only() {
    let fx = fixture();
    fs::write(
        fx.project.join("tool.py"),
        "import yaml\n\nif __name__ == \"__main__\":\n    pass\n",
    )
    .unwrap();
    let processor = Processor::new(fx.ctx.clone());
    let options = BuildOptions {
        root: fx.project.clone(),
        file: None,
        archive: false,
    };

    let summary = processor.run(&options).await.unwrap();
    assert!(!summary.succeeded());
    assert_eq!(summary.failed_count(), 1);
    let tool = summary.targets.iter().find(|t| t.stem == "tool").unwrap();
    assert_eq!(tool.report.failed[0].0, "pyyaml");
    assert!(fx.project.join("dist/tool.bat").is_file());
}

#[tokio::test]
async fn invalid_root_is_fatal() {
    let fx = fixture();
    let processor = Processor::new(fx.ctx.clone());
    let options = BuildOptions {
        root: fx.project.join("nope"),
        file: None,
        archive: false,
    };
    assert!(processor.run(&options).await.is_err());
}
