//! TimePort Forms CLI
//!
//! Command-line front end for the form configuration engine.
//!
//! # Usage
//!
//! ```bash
//! tpforms check -f leave_request.yaml
//! tpforms evaluate -f leave_request.yaml --values submission.json
//! tpforms fields add -f daily_report.json --type number --name hours --label Hours
//! tpforms fields move -f daily_report.json 3 0
//! tpforms formula "(hours - break) * rate" --var hours=8 --var break=0.5 --var rate=20
//! tpforms --format json config list
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use timeport_forms::FieldType;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod config;
mod output;

#[derive(Parser)]
#[command(name = "tpforms")]
#[command(author = "TimePort")]
#[command(version)]
#[command(about = "TimePort form schema tooling", long_about = None)]
struct Cli {
    /// Output format (defaults to the configured format, then table)
    #[arg(long, short, env = "TIMEPORT_FORMAT")]
    format: Option<output::OutputFormat>,

    /// Profile name from config file
    #[arg(long, short, env = "TIMEPORT_PROFILE")]
    profile: Option<String>,

    /// Log filter, e.g. `debug` or `timeport_forms=trace`; RUST_LOG wins when set
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check a schema for integrity problems
    Check {
        /// Schema file (JSON or YAML field list)
        #[arg(short, long)]
        file: PathBuf,
    },
    /// Evaluate a value set against a schema
    Evaluate {
        /// Schema file
        #[arg(short, long)]
        file: PathBuf,
        /// Values file (JSON or YAML object keyed by field id or name)
        #[arg(long)]
        values: PathBuf,
        /// Print the name-keyed payload instead of the full result
        #[arg(long)]
        payload: bool,
        /// Exit non-zero when the submission is invalid
        #[arg(long)]
        strict: bool,
    },
    /// Evaluate a calculation formula
    Formula {
        /// Expression, e.g. `round(hours * rate, 2)`
        expression: String,
        /// Variable binding `name=value`
        #[arg(long = "var", value_parser = commands::formula::parse_var)]
        vars: Vec<(String, f64)>,
    },
    /// Edit the field list of a schema file
    Fields {
        #[command(subcommand)]
        action: FieldCommands,
    },
    /// Configure CLI
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum FieldCommands {
    /// List fields in display order
    List {
        #[arg(short, long)]
        file: PathBuf,
    },
    /// Append a field
    Add {
        #[arg(short, long)]
        file: PathBuf,
        #[arg(long = "type", value_parser = parse_field_type)]
        field_type: FieldType,
        #[arg(long)]
        name: String,
        #[arg(long)]
        label: String,
        #[arg(long)]
        required: bool,
    },
    /// Remove a field; rules pointing at it become inert
    Remove {
        #[arg(short, long)]
        file: PathBuf,
        id: String,
    },
    /// Append a copy of a field
    Duplicate {
        #[arg(short, long)]
        file: PathBuf,
        id: String,
    },
    /// Move the field at one zero-based position to another
    Move {
        #[arg(short, long)]
        file: PathBuf,
        from: usize,
        to: usize,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Set configuration value
    Set { key: String, value: String },
    /// Get configuration value
    Get { key: String },
    /// List all configuration
    List,
    /// Initialize configuration
    Init,
}

fn parse_field_type(s: &str) -> Result<FieldType, String> {
    s.parse::<FieldType>().map_err(|e| e.to_string())
}

fn init_tracing(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() {
    let cli = Cli::parse();

    let config = match config::Config::load(cli.profile.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Warning: ignoring unreadable config: {:#}", e);
            config::Config::default()
        }
    };
    init_tracing(cli.log_level.as_deref().unwrap_or(config.log_level()));

    let format = cli.format.unwrap_or_else(|| config.output_format());
    let profile = cli.profile.as_deref();

    let result = match cli.command {
        Commands::Check { file } => commands::check::handle(&file, format),
        Commands::Evaluate { file, values, payload, strict } => {
            let options = commands::evaluate::Options { payload, strict };
            commands::evaluate::handle(&file, &values, options, &config, format)
        }
        Commands::Formula { expression, vars } => {
            commands::formula::handle(&expression, &vars, &config, format)
        }
        Commands::Fields { action } => commands::fields::handle(action, format),
        Commands::Config { action } => commands::config::handle(action, profile, format),
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
