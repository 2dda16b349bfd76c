// SPDX-FileCopyrightText: 2026 Quire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Quire - webhook subscription and delivery engine.
//!
//! This is the binary entry point: it runs the delivery workers and the
//! management API, checks configuration, and verifies received signatures.

mod serve;
mod shutdown;
mod verify;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use quire_config::model::QuireConfig;

/// Quire - webhook subscription and delivery engine.
#[derive(Parser, Debug)]
#[command(name = "quire", version, about, long_about = None)]
struct Cli {
    /// Read configuration from this file instead of the standard locations.
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the delivery workers and, if enabled, the management API.
    Serve,
    /// Inspect Quire configuration.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Check a received webhook signature against its raw body.
    Verify(verify::VerifyArgs),
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Load and validate configuration, reporting every problem found.
    Check,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(errors) => {
            quire_config::render_errors(&errors);
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Commands::Serve => {
            init_tracing(&config.service.log_level);
            match serve::run_serve(config).await {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) => {
                    tracing::error!(error = %e, "quire serve failed");
                    eprintln!("error: {e}");
                    ExitCode::FAILURE
                }
            }
        }
        Commands::Config {
            action: ConfigAction::Check,
        } => {
            println!("{}", config_summary(&config));
            ExitCode::SUCCESS
        }
        Commands::Verify(args) => verify::run_verify(&config, args),
    }
}

fn load_config(
    path: Option<&std::path::Path>,
) -> Result<QuireConfig, Vec<quire_config::ConfigError>> {
    match path {
        Some(path) => quire_config::load_and_validate_path(path),
        None => quire_config::load_and_validate(),
    }
}

/// One-paragraph summary printed by `quire config check`. Never includes
/// key material.
fn config_summary(config: &QuireConfig) -> String {
    let master_key = if config.webhooks.signing_master_key.is_some() {
        "set"
    } else {
        "missing (required by serve)"
    };
    let gateway = if config.gateway.enabled {
        format!(
            "{}:{} ({} api keys)",
            config.gateway.host,
            config.gateway.port,
            config.gateway.api_keys.len()
        )
    } else {
        "disabled".to_string()
    };
    format!(
        "config ok\n  service: {}\n  database: {}\n  signing master key: {master_key}\n  workers: {} (poll {}ms)\n  gateway: {gateway}",
        config.service.name,
        config.storage.database_path,
        config.webhooks.worker_concurrency,
        config.webhooks.poll_interval_ms,
    )
}

/// Initialize the tracing subscriber. `RUST_LOG` wins over the configured level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("quire={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}
