// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # nginx warden
//!
//! The `warden` binary serves the HTTP control surface for one nginx
//! instance and offers the same certificate operations from the shell.
//!
//! ## Commands
//!
//! - `warden serve` - Run the HTTP API
//! - `warden config show|validate|generate` - Configuration management
//! - `warden certs list|obtain|delete` - Certificate inventory and issuance

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

mod commands;

use commands::{CertsCommand, ConfigCommand, Overrides};

/// nginx warden - sandboxed nginx configuration and certificate management
#[derive(Parser)]
#[command(name = "warden")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "WARDEN_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// Sandbox root every file operation is confined to
    #[arg(long, global = true, value_name = "DIR")]
    root: Option<PathBuf>,

    /// HTTP API port (default: from config, 8080)
    #[arg(long, global = true, env = "WARDEN_PORT")]
    port: Option<u16>,

    /// HTTP API host (default: from config, 0.0.0.0)
    #[arg(long, global = true, env = "WARDEN_HOST")]
    host: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "WARDEN_LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API
    #[command(name = "serve")]
    Serve,

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },

    /// Certificate inventory and issuance
    #[command(name = "certs")]
    Certs {
        #[command(subcommand)]
        command: CertsCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli.log_level)?;

    let overrides = Overrides {
        config: cli.config,
        root: cli.root,
        host: cli.host,
        port: cli.port,
    };

    match cli.command {
        Some(Commands::Serve) => commands::serve::run(overrides).await,
        Some(Commands::Config { command }) => {
            commands::config::handle_command(command, overrides).await
        }
        Some(Commands::Certs { command }) => {
            commands::certs::handle_command(command, overrides).await
        }
        None => {
            eprintln!("{}", "No command specified. Use --help for usage.".yellow());
            std::process::exit(1);
        }
    }
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();

    Ok(())
}
