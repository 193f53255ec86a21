//! Config commands

use crate::config::Config;
use crate::output::OutputFormat;
use crate::ConfigCommands;
use anyhow::Result;
use tabled::Tabled;

#[derive(Tabled)]
struct EntryRow {
    #[tabled(rename = "Key")]
    key: String,
    #[tabled(rename = "Value")]
    value: String,
}

pub fn handle(action: ConfigCommands, profile: Option<&str>, format: OutputFormat) -> Result<()> {
    match action {
        ConfigCommands::Init => {
            let path = Config::default().save(profile)?;
            println!("Configuration initialized at {}", path.display());
        }
        ConfigCommands::Set { key, value } => {
            let mut config = Config::load(profile)?;
            config.set(&key, &value)?;
            config.save(profile)?;
            println!("Set {} successfully", key);
        }
        ConfigCommands::Get { key } => {
            let config = Config::load(profile)?;
            println!("{}: {}", key, config.get(&key)?);
        }
        ConfigCommands::List => {
            let config = Config::load(profile)?;
            let entries = config.entries()?;
            format.print(&config, || {
                entries
                    .into_iter()
                    .map(|(key, value)| EntryRow { key, value })
                    .collect()
            })?;
        }
    }
    Ok(())
}
