// pybundle/src/cli/config.rs
use clap::Subcommand;
use colored::Colorize;
use prettytable::{format, Cell, Row, Table};
use pybundle_common::error::{BundleError, Result};
use pybundle_common::settings::{parse_value, Settings};

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print the value stored under a dotted key
    Get { key: String },
    /// Store a value; `true`, `false` and integers keep their type
    Set { key: String, value: String },
    /// Remove a key
    Unset { key: String },
    /// Print every stored setting
    List,
}

impl ConfigCommand {
    pub fn run(&self, settings: &Settings) -> Result<()> {
        match self {
            Self::Get { key } => {
                let value = settings
                    .get(key)
                    .ok_or_else(|| BundleError::NotFound(format!("No setting named '{key}'")))?;
                println!("{value}");
            }
            Self::Set { key, value } => {
                settings.set(key, parse_value(value))?;
                println!("{} {} = {}", "Set".green(), key, value);
            }
            Self::Unset { key } => match settings.remove(key)? {
                Some(_) => println!("{} {}", "Removed".green(), key),
                None => println!("{} {} was not set", "Note:".yellow(), key),
            },
            Self::List => {
                let entries = settings.entries();
                if entries.is_empty() {
                    println!("{}", "No settings stored".yellow());
                    return Ok(());
                }
                let mut table = Table::new();
                table.set_format(*format::consts::FORMAT_NO_BORDER_LINE_SEPARATOR);
                table.add_row(Row::new(vec![
                    Cell::new("Key").style_spec("b"),
                    Cell::new("Value").style_spec("b"),
                ]));
                for (key, value) in entries {
                    table.add_row(Row::new(vec![Cell::new(&key), Cell::new(&value.to_string())]));
                }
                table.printstd();
            }
        }
        Ok(())
    }
}
