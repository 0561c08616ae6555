// pybundle/src/cli.rs
//! Defines the command-line argument structure using clap.
use std::sync::Arc;

use clap::{ArgAction, Parser, Subcommand};
use pybundle_common::error::Result;
use pybundle_common::{Config, Settings};

pub mod build;
pub mod config;
pub mod mirrors;

use crate::cli::build::BuildArgs;
use crate::cli::config::ConfigCommand;
use crate::cli::mirrors::Mirrors;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None, name = "pybundle", bin_name = "pybundle")]
#[command(propagate_version = true)]
pub struct CliArgs {
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Same as a single -v
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl CliArgs {
    pub fn verbosity(&self) -> u8 {
        if self.debug {
            self.verbose.max(1)
        } else {
            self.verbose
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Bundle every entry script in a project directory
    Build(BuildArgs),
    /// Probe runtime and package index mirrors
    Mirrors(Mirrors),
    /// Read or change persisted settings
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Command {
    pub async fn run(&self, config: &Config, settings: Arc<Settings>) -> Result<()> {
        match self {
            Self::Build(command) => command.run(config, settings).await,
            Self::Mirrors(command) => command.run(settings).await,
            Self::Config(command) => command.run(&settings),
        }
    }
}
