// pybundle/src/cli/mirrors.rs
use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use colored::Colorize;
use prettytable::{format, Cell, Row, Table};
use pybundle_common::error::Result;
use pybundle_common::settings::Settings;
use pybundle_net::mirror::{fastest_of, MirrorPurpose, MirrorSelector, DEFAULT_PROBE_TIMEOUT};

#[derive(Args, Debug)]
pub struct Mirrors {
    /// Forget the cached fastest mirrors and store the new winners
    #[arg(long)]
    pub refresh: bool,

    /// Per-mirror probe timeout in milliseconds
    #[arg(long, value_name = "MS")]
    pub timeout: Option<u64>,
}

impl Mirrors {
    pub async fn run(&self, settings: Arc<Settings>) -> Result<()> {
        if self.refresh {
            MirrorSelector::clear_cached(&settings)?;
        }
        let timeout = self
            .timeout
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_PROBE_TIMEOUT);
        let selector = MirrorSelector::new(timeout)?;

        let mut table = Table::new();
        table.set_format(*format::consts::FORMAT_NO_BORDER_LINE_SEPARATOR);
        table.add_row(Row::new(vec![
            Cell::new("Kind").style_spec("b"),
            Cell::new("Name").style_spec("b"),
            Cell::new("URL").style_spec("b"),
            Cell::new("Latency").style_spec("b"),
        ]));

        for purpose in [MirrorPurpose::Runtime, MirrorPurpose::Packages] {
            let candidates = purpose.candidates(&settings);
            let results = selector.probe_all(&candidates).await;
            let winner = fastest_of(&results).cloned();
            let cached = settings.get_str(purpose.cache_key());

            for result in &results {
                let latency = match result.latency {
                    Some(d) => Cell::new(&format!("{} ms", d.as_millis())),
                    None => Cell::new("unreachable").style_spec("Fr"),
                };
                let mut name = result.mirror.name.clone();
                if winner.as_ref() == Some(&result.mirror) {
                    name.push_str(" *");
                }
                table.add_row(Row::new(vec![
                    Cell::new(&purpose.to_string()),
                    Cell::new(&name),
                    Cell::new(&result.mirror.url),
                    latency,
                ]));
            }

            match (winner, cached) {
                (Some(mirror), None) => settings.set(purpose.cache_key(), mirror.url)?,
                (Some(_), Some(url)) => println!("{} {} mirror stays {}", "Cached".dimmed(), purpose, url),
                (None, _) => println!("{} no {} mirror answered", "Warning".yellow(), purpose),
            }
        }
        table.printstd();
        Ok(())
    }
}
