// pybundle/src/cli/build.rs
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use colored::Colorize;
use prettytable::{format, Cell, Row, Table};
use pybundle_common::config::Config;
use pybundle_common::error::{BundleError, Result};
use pybundle_common::settings::Settings;
use pybundle_core::context::{BuildContext, ContextOptions};
use pybundle_core::processor::{BuildOptions, BuildSummary, Processor};
use tracing::instrument;

#[derive(Debug, Args)]
pub struct BuildArgs {
    /// Project directory containing the entry scripts
    #[arg(short, long, default_value = ".")]
    dir: PathBuf,

    /// Build only this entry script
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Also write dist.zip next to each dist directory
    #[arg(long)]
    zip: bool,

    /// Use only cached packages and runtimes
    #[arg(long)]
    offline: bool,

    /// Probe mirrors again instead of using the cached choice
    #[arg(long)]
    refresh_mirrors: bool,
}

impl BuildArgs {
    #[instrument(skip(self, config, settings), fields(dir = %self.dir.display()))]
    pub async fn run(&self, config: &Config, settings: Arc<Settings>) -> Result<()> {
        let root = self.dir.canonicalize().map_err(|e| {
            BundleError::ValidationError(format!("Invalid project directory {}: {e}", self.dir.display()))
        })?;
        println!(
            "{}{}",
            "==> ".bold().blue(),
            format!("Bundling {}", root.display()).bold()
        );

        let options = ContextOptions {
            offline: self.offline,
            refresh_mirrors: self.refresh_mirrors,
            ..ContextOptions::default()
        };
        let ctx = Arc::new(BuildContext::new(config.clone(), settings, options)?);
        let summary = Processor::new(ctx)
            .run(&BuildOptions {
                root,
                file: self.file.clone(),
                archive: self.zip,
            })
            .await?;

        print_summary(&summary);
        if summary.succeeded() {
            Ok(())
        } else {
            Err(BundleError::Generic(format!(
                "{} of {} target(s) are incomplete",
                summary.failed_count(),
                summary.targets.len()
            )))
        }
    }
}

fn rounded(d: Duration) -> Duration {
    Duration::from_millis(d.as_millis() as u64)
}

fn print_summary(summary: &BuildSummary) {
    for (file, reason) in &summary.skipped_files {
        println!("{} {}: {}", "Skipped".yellow(), file.display(), reason);
    }
    if summary.targets.is_empty() {
        println!("{}", "No entry points found".yellow());
        return;
    }

    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_NO_BORDER_LINE_SEPARATOR);
    table.add_row(Row::new(vec![
        Cell::new("Target").style_spec("b"),
        Cell::new("Installed").style_spec("b"),
        Cell::new("Present").style_spec("b"),
        Cell::new("Missing").style_spec("b"),
        Cell::new("Time").style_spec("b"),
        Cell::new("Status").style_spec("b"),
    ]));
    for target in &summary.targets {
        let missing: Vec<&str> = target.report.failed.iter().map(|(n, _)| n.as_str()).collect();
        let status = match (&target.error, target.succeeded()) {
            (Some(_), _) => Cell::new("failed").style_spec("Fr"),
            (None, false) => Cell::new("incomplete").style_spec("Fy"),
            (None, true) => Cell::new("ok").style_spec("Fg"),
        };
        table.add_row(Row::new(vec![
            Cell::new(&target.stem),
            Cell::new(&target.report.installed.len().to_string()),
            Cell::new(&target.report.skipped.len().to_string()),
            Cell::new(&missing.join(", ")),
            Cell::new(&humantime::format_duration(rounded(target.elapsed)).to_string()),
            status,
        ]));
    }
    table.printstd();

    for target in &summary.targets {
        if let Some(error) = &target.error {
            println!("{} {}: {}", "Error".red().bold(), target.stem, error);
        }
        for warning in &target.warnings {
            println!("{} {}: {}", "Warning".yellow(), target.stem, warning);
        }
    }
    for archive in &summary.archives {
        println!("{}Archived {}", "==> ".bold().blue(), archive.display());
    }
    for (dist, reason) in &summary.archive_errors {
        println!("{} {}: {}", "Error".red().bold(), dist.display(), reason);
    }
    println!(
        "{}{}",
        "==> ".bold().blue(),
        format!(
            "Finished {} target(s) in {}",
            summary.targets.len(),
            humantime::format_duration(rounded(summary.elapsed))
        )
        .bold()
    );
}
