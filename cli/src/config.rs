//! CLI Configuration

use crate::output::OutputFormat;
use anyhow::{anyhow, bail, Context, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use timeport_forms::EngineConfig;

const DEFAULT_LOG_LEVEL: &str = "warn";

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub default_format: Option<String>,
    pub log_level: Option<String>,
    pub engine: EngineConfig,
}

impl Config {
    pub fn load(profile: Option<&str>) -> Result<Self> {
        Self::load_from(&Self::config_path(profile)?)
    }

    pub fn save(&self, profile: Option<&str>) -> Result<PathBuf> {
        let path = Self::config_path(profile)?;
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content).with_context(|| format!("writing {}", path.display()))
    }

    pub fn log_level(&self) -> &str {
        self.log_level.as_deref().unwrap_or(DEFAULT_LOG_LEVEL)
    }

    /// Configured output format; unknown names fall back to table
    pub fn output_format(&self) -> OutputFormat {
        self.default_format
            .as_deref()
            .and_then(|f| OutputFormat::from_str(f, true).ok())
            .unwrap_or(OutputFormat::Table)
    }

    /// Every key with its current value, `engine.*` keys flattened
    pub fn entries(&self) -> Result<Vec<(String, String)>> {
        let mut entries = vec![
            ("default_format".to_string(), display(self.default_format.as_deref())),
            ("log_level".to_string(), display(self.log_level.as_deref())),
        ];
        if let Value::Object(engine) = serde_json::to_value(&self.engine)? {
            for (key, value) in engine {
                let value = match value {
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                entries.push((format!("engine.{}", key), value));
            }
        }
        Ok(entries)
    }

    pub fn get(&self, key: &str) -> Result<String> {
        self.entries()?
            .into_iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
            .ok_or_else(|| anyhow!("Unknown config key: {}", key))
    }

    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "default_format" => {
                OutputFormat::from_str(value, true)
                    .map_err(|_| anyhow!("unknown output format: {}", value))?;
                self.default_format = Some(value.to_lowercase());
            }
            "log_level" => self.log_level = Some(value.to_string()),
            _ => {
                let Some(engine_key) = key.strip_prefix("engine.") else {
                    bail!("Unknown config key: {}", key);
                };
                self.set_engine(engine_key, value)?;
            }
        }
        Ok(())
    }

    /// Parse `value` as the type the engine setting already has
    fn set_engine(&mut self, key: &str, value: &str) -> Result<()> {
        let mut engine = serde_json::to_value(&self.engine)?;
        let slot = engine
            .get_mut(key)
            .ok_or_else(|| anyhow!("Unknown config key: engine.{}", key))?;
        let parsed = match &*slot {
            Value::Bool(_) => Value::Bool(
                value
                    .parse()
                    .with_context(|| format!("engine.{} expects true or false", key))?,
            ),
            Value::Number(_) => Value::from(
                value
                    .parse::<u64>()
                    .with_context(|| format!("engine.{} expects a whole number", key))?,
            ),
            _ => Value::String(value.to_string()),
        };
        *slot = parsed;
        self.engine = serde_json::from_value(engine)?;
        Ok(())
    }

    fn config_path(profile: Option<&str>) -> Result<PathBuf> {
        let home = dirs::home_dir().ok_or_else(|| anyhow!("Cannot find home directory"))?;
        let filename = match profile {
            Some(p) => format!("config.{}.toml", p),
            None => "config.toml".to_string(),
        };
        Ok(home.join(".timeport").join(filename))
    }
}

fn display(value: Option<&str>) -> String {
    value.unwrap_or("(not set)").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_engine_keys_typed() {
        let mut config = Config::default();
        config.set("engine.time_diff_wraps_midnight", "false").unwrap();
        config.set("engine.max_formula_depth", "16").unwrap();
        config.set("engine.fallback_message", "Check this field").unwrap();

        assert!(!config.engine.time_diff_wraps_midnight);
        assert_eq!(config.engine.max_formula_depth, 16);
        assert_eq!(config.get("engine.fallback_message").unwrap(), "Check this field");

        assert!(config.set("engine.max_formula_depth", "deep").is_err());
        assert!(config.set("engine.nope", "1").is_err());
        assert!(config.set("api_key", "x").is_err());
    }

    #[test]
    fn test_format_and_defaults() {
        let mut config = Config::default();
        assert_eq!(config.output_format(), OutputFormat::Table);
        assert_eq!(config.log_level(), "warn");
        assert_eq!(config.get("default_format").unwrap(), "(not set)");

        config.set("default_format", "YAML").unwrap();
        assert_eq!(config.output_format(), OutputFormat::Yaml);
        assert!(config.set("default_format", "xml").is_err());
    }

    #[test]
    fn test_round_trip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.set("log_level", "debug").unwrap();
        config.set("engine.strip_hidden_values", "false").unwrap();
        config.save_to(&path).unwrap();

        assert_eq!(Config::load_from(&path).unwrap(), config);
        assert_eq!(Config::load_from(&dir.path().join("missing.toml")).unwrap(), Config::default());
    }
}
