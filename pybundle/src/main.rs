// pybundle/src/main.rs
use std::fs;
use std::process;
use std::sync::Arc;

use clap::Parser;
use colored::Colorize;
use pybundle_common::config::Config;
use pybundle_common::error::Result;
use pybundle_common::settings::Settings;
use tracing::level_filters::LevelFilter;
use tracing::{debug, error};
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

mod cli;
use cli::CliArgs;

fn init_logging(config: &Config, verbosity: u8) {
    let level_filter = match verbosity {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    let max_log_level = level_filter.into_level().unwrap_or(tracing::Level::INFO);
    let env_filter = EnvFilter::builder()
        .with_default_directive(level_filter.into())
        .with_env_var("PYBUNDLE_LOG")
        .from_env_lossy();

    let log_dir = config.logs_dir();
    if verbosity > 0 && fs::create_dir_all(&log_dir).is_ok() {
        let file_appender = tracing_appender::rolling::daily(&log_dir, "pybundle.log");
        let (non_blocking_appender, guard) = tracing_appender::non_blocking(file_appender);
        let stderr_writer = std::io::stderr.with_max_level(max_log_level);
        let file_writer = non_blocking_appender.with_max_level(max_log_level);

        let _ = tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(stderr_writer.and(file_writer))
            .with_ansi(true)
            .without_time()
            .try_init();
        Box::leak(Box::new(guard));
        debug!(
            "Verbose logging enabled. Writing logs to: {}/pybundle.log",
            log_dir.display()
        );
    } else {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .with_ansi(true)
            .without_time()
            .try_init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}: {:#}", "Error".red().bold(), e);
            process::exit(1);
        }
    };
    init_logging(&config, cli_args.verbosity());

    let settings = match Settings::load(&config.settings_path()) {
        Ok(settings) => Arc::new(settings),
        Err(e) => {
            eprintln!("{}: {:#}", "Error".red().bold(), e);
            process::exit(1);
        }
    };

    let result = cli_args.command.run(&config, Arc::clone(&settings)).await;

    if let Err(e) = settings.save() {
        error!("Failed to save settings: {}", e);
    }
    if let Err(e) = result {
        error!("Command failed: {:#}", e);
        eprintln!("{}: {:#}", "Error".red().bold(), e);
        process::exit(1);
    }

    debug!("Command completed successfully.");
    Ok(())
}
