//! Output formatting

use anyhow::Result;
use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
    Yaml,
}

impl OutputFormat {
    /// Print `data` as JSON or YAML; table output renders `rows` instead
    pub fn print<T, R, F>(&self, data: &T, rows: F) -> Result<()>
    where
        T: Serialize + ?Sized,
        R: Tabled,
        F: FnOnce() -> Vec<R>,
    {
        match self {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(data)?),
            OutputFormat::Yaml => print!("{}", serde_yaml::to_string(data)?),
            OutputFormat::Table => println!("{}", table(rows())),
        }
        Ok(())
    }

    pub fn is_table(&self) -> bool {
        matches!(self, OutputFormat::Table)
    }
}

pub fn table<R: Tabled>(rows: Vec<R>) -> String {
    Table::new(rows).with(Style::rounded()).to_string()
}

/// Colored yes/no cell
pub fn flag(value: bool) -> String {
    if value {
        "yes".green().to_string()
    } else {
        "no".dimmed().to_string()
    }
}
