//! Binary entry point for flagwise.
//!
//! Offline tooling over exported flag configurations and analytics batches.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
// Allow print_stderr in main binary for CLI output
#![allow(clippy::print_stderr)]
#![allow(clippy::print_stdout)]
// Allow multiple crate versions from transitive dependencies
#![allow(clippy::multiple_crate_versions)]

use anyhow::{Context, bail};
use chrono::Utc;
use clap::{Parser, Subcommand};
use flagwise::analytics::{FlushPayload, compute_usage_statistics, summarize};
use flagwise::config::FlagwiseConfig;
use flagwise::observability;
use flagwise::services::{ConfigurationManager, RolloutStrategy};
use flagwise::validation::{validate_document, validate_environment_constraints};
use flagwise::{Environment, FeatureMap};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

/// Flagwise - feature flag validation, rollout, and analytics tooling.
#[derive(Parser)]
#[command(name = "flagwise")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to configuration file.
    #[arg(short, long, global = true, env = "FLAGWISE_CONFIG_PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Validate an exported flag configuration.
    Validate {
        /// JSON file mapping flag keys to flags.
        file: PathBuf,

        /// Also check environment constraints for this environment.
        #[arg(short, long)]
        environment: Option<String>,

        /// Print the result as JSON instead of a report.
        #[arg(long)]
        json: bool,
    },

    /// Show the rollout state of one flag.
    Rollout {
        /// JSON file mapping flag keys to flags.
        file: PathBuf,

        /// Flag key.
        key: String,

        /// User to decide for.
        #[arg(short, long)]
        user: Option<String>,

        /// Sampling strategy: random or stable_hash.
        #[arg(short, long)]
        strategy: Option<String>,
    },

    /// Compute usage statistics from a flushed analytics batch.
    Stats {
        /// JSON file holding one flush payload.
        batch: PathBuf,
    },
}

fn main() -> ExitCode {
    // A missing .env is fine.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let mut config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        },
    };
    if cli.verbose && config.logging.directive.is_none() {
        config.logging.directive = Some("debug".to_string());
    }

    if let Err(e) = observability::init(&config.logging) {
        eprintln!("Failed to initialize logging: {e}");
        return ExitCode::FAILURE;
    }
    let _metrics = match observability::install_prometheus(&config.metrics) {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("Failed to initialize metrics: {e}");
            return ExitCode::FAILURE;
        },
    };

    match run_command(cli.command, &config) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        },
    }
}

/// Loads configuration from an explicit path or the default location.
fn load_config(path: Option<&Path>) -> flagwise::Result<FlagwiseConfig> {
    match path {
        Some(path) => FlagwiseConfig::load_from_file(path),
        None => Ok(FlagwiseConfig::load_default()),
    }
}

/// Runs the selected command.
fn run_command(command: Commands, config: &FlagwiseConfig) -> anyhow::Result<ExitCode> {
    match command {
        Commands::Validate {
            file,
            environment,
            json,
        } => cmd_validate(&file, environment.as_deref(), json),
        Commands::Rollout {
            file,
            key,
            user,
            strategy,
        } => cmd_rollout(config, &file, &key, user.as_deref(), strategy.as_deref()),
        Commands::Stats { batch } => cmd_stats(&batch),
    }
}

fn read_json(path: &Path) -> anyhow::Result<serde_json::Value> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("{} is not valid JSON", path.display()))
}

fn parse_environment(name: &str) -> anyhow::Result<Environment> {
    match Environment::parse(name) {
        Some(environment) => Ok(environment),
        None => bail!("unknown environment: {name}"),
    }
}

/// Validates a configuration document.
fn cmd_validate(file: &Path, environment: Option<&str>, json: bool) -> anyhow::Result<ExitCode> {
    let document = read_json(file)?;
    let mut result = validate_document(&document);

    if let Some(name) = environment {
        let environment = parse_environment(name)?;
        match serde_json::from_value::<FeatureMap>(document) {
            Ok(config) => result.merge(validate_environment_constraints(&config, environment)),
            Err(e) => tracing::debug!(error = %e, "Skipping environment checks"),
        }
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print!("{}", result.report());
    }

    Ok(if result.is_valid {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Shows the rollout status and decision for one flag.
fn cmd_rollout(
    config: &FlagwiseConfig,
    file: &Path,
    key: &str,
    user: Option<&str>,
    strategy: Option<&str>,
) -> anyhow::Result<ExitCode> {
    let strategy = match strategy {
        Some(name) => RolloutStrategy::parse(name)
            .with_context(|| format!("unknown rollout strategy: {name}"))?,
        None => config.rollout_strategy,
    };

    let contents = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let manager = ConfigurationManager::new().with_strategy(strategy);
    manager
        .import_json(&contents)
        .with_context(|| format!("failed to import {}", file.display()))?;

    let Some(flag) = manager.get(key) else {
        bail!("feature not found: {key}");
    };
    println!("Feature:   {key} ({})", flag.name);
    println!("Enabled:   {}", flag.is_enabled());

    let (Some(status), Some(percentage)) = (manager.rollout_status(key), manager.rollout_percentage(key))
    else {
        println!("Rollout:   none");
        return Ok(ExitCode::SUCCESS);
    };
    println!("Rollout:   {status}");
    println!("Effective: {percentage:.1}%");
    println!("Strategy:  {strategy}");
    let decision = manager.is_rolled_out(key, user);
    println!(
        "Decision:  {} for {}",
        if decision { "in" } else { "out" },
        user.unwrap_or("anonymous user")
    );
    Ok(ExitCode::SUCCESS)
}

/// Prints per-feature statistics and a summary for a flushed batch.
fn cmd_stats(batch: &Path) -> anyhow::Result<ExitCode> {
    let payload: FlushPayload = serde_json::from_value(read_json(batch)?)
        .with_context(|| format!("{} is not an analytics batch", batch.display()))?;

    let now = Utc::now();
    let statistics =
        compute_usage_statistics(&payload.events, &payload.performance, &payload.engagement, now);
    let summary = summarize(
        &payload.events,
        &payload.performance,
        &payload.engagement,
        &statistics,
        now,
    );

    let output = serde_json::json!({
        "summary": summary,
        "statistics": statistics,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(ExitCode::SUCCESS)
}
