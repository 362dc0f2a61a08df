use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use dashkit::config::{apply_card_defaults, AppConfig};
use dashkit::core::validator;
use dashkit_core::{global_registry, ValidationContext};
use dashkit_types::TableSchema;
use log::{info, warn};
use serde_json::Value;
use std::path::PathBuf;

/// dashkit - inspect card types and validate card configurations
#[derive(Parser, Debug, Clone)]
#[command(name = "dashkit")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Debug verbosity level (0=quiet, 1=info, 2=debug, 3=trace)
    #[arg(short = 'd', long = "debug", value_name = "LEVEL", default_value = "0")]
    debug: u8,

    /// Configuration file (defaults to the platform config directory)
    #[arg(short = 'c', long = "config", value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone)]
enum Command {
    /// List registered card types and their options
    Cards,

    /// Print the default configuration of a card type
    Defaults {
        #[arg(value_name = "TYPE")]
        type_key: String,
    },

    /// Validate a card configuration file
    Validate {
        #[arg(value_name = "CONFIG_FILE")]
        file: PathBuf,

        /// Card type; taken from the file's "type" field when omitted
        #[arg(long = "type", value_name = "TYPE")]
        type_key: Option<String>,

        /// Table schema of the bound datasource
        #[arg(long = "schema", value_name = "SCHEMA_FILE")]
        schema: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Level 0 warn, 1 info, 2 debug, 3+ trace; RUST_LOG overrides
    let log_level = match cli.debug {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    info!("Starting dashkit v{}", env!("CARGO_PKG_VERSION"));

    let config = match &cli.config {
        Some(path) => AppConfig::load_from_path(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => AppConfig::load().unwrap_or_else(|e| {
            warn!("Failed to load config, using defaults: {:#}", e);
            AppConfig::default()
        }),
    };

    dashkit::init_with(&config)?;

    match cli.command {
        Command::Cards => list_cards(),
        Command::Defaults { type_key } => print_defaults(&config, &type_key),
        Command::Validate {
            file,
            type_key,
            schema,
        } => {
            let valid = validate_file(&config, &file, type_key, schema)?;
            if !valid {
                std::process::exit(1);
            }
            Ok(())
        }
    }
}

fn list_cards() -> Result<()> {
    for descriptor in global_registry().list_all() {
        println!("{} ({})", descriptor.type_key, descriptor.name);
        for option in descriptor.config_factory.config_schema().options {
            println!(
                "    {:<22} {:<10} {}",
                option.key, option.value_type, option.description
            );
        }
    }
    Ok(())
}

fn print_defaults(config: &AppConfig, type_key: &str) -> Result<()> {
    let base = global_registry().lookup(type_key)?.default_config();
    let card = match config.card_defaults.get(type_key) {
        Some(overrides) => apply_card_defaults(base, overrides)?,
        None => base,
    };
    println!("{}", serde_json::to_string_pretty(&card)?);
    Ok(())
}

fn validate_file(
    config: &AppConfig,
    file: &PathBuf,
    type_key: Option<String>,
    schema: Option<PathBuf>,
) -> Result<bool> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let value: Value = serde_json::from_str(&content)
        .with_context(|| format!("{} is not valid JSON", file.display()))?;

    let type_key = type_key
        .or_else(|| value.get("type").and_then(Value::as_str).map(str::to_string))
        .ok_or_else(|| anyhow!("No card type given and the file has no \"type\" field"))?;

    let schema: Option<TableSchema> = match schema {
        Some(path) => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            Some(serde_json::from_str(&content)?)
        }
        None => None,
    };

    let ctx = ValidationContext {
        schema: schema.as_ref(),
        min_refresh_interval_secs: config.refresh.min_interval_secs,
    };
    let result = validator::validate_value_with(&global_registry(), &type_key, &value, &ctx);

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(result.is_valid)
}
