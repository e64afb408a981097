// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::{Path, PathBuf};

use warden_core::domain::config::WardenConfigManifest;

use super::Overrides;

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate sample configuration
    Generate {
        /// Output path (default: ./warden-config.yaml)
        #[arg(short, long, default_value = "./warden-config.yaml")]
        output: PathBuf,

        /// Write every setting with its default value
        #[arg(long)]
        full: bool,
    },
}

pub async fn handle_command(command: ConfigCommand, overrides: Overrides) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(overrides, paths).await,
        ConfigCommand::Validate { file } => {
            let overrides = Overrides {
                config: file.or(overrides.config),
                ..overrides
            };
            validate(overrides).await
        }
        ConfigCommand::Generate { output, full } => generate(&output, full).await,
    }
}

async fn show(overrides: Overrides, show_paths: bool) -> Result<()> {
    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        if let Some(path) = &overrides.config {
            println!("  1. --config flag: {}", path.display());
        } else {
            println!("  1. --config flag: {}", "(not set)".dimmed());
        }
        println!(
            "  2. WARDEN_CONFIG_PATH: {}",
            std::env::var("WARDEN_CONFIG_PATH")
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./warden-config.yaml");
        println!("  4. ~/.warden/config.yaml");
        println!("  5. /etc/warden/config.yaml");
        println!();
    }

    let config = overrides.load()?;
    let spec = &config.spec;

    println!("{}", "Current configuration:".bold());
    println!();

    println!("{}", "Server:".bold());
    println!("  Name: {}", config.metadata.name);
    println!("  Listen: {}:{}", spec.server.bind_address, spec.server.port);
    println!();

    println!("{}", "Sandbox:".bold());
    println!("  Root: {}", spec.sandbox.root.display());
    println!("  Max path length: {}", spec.sandbox.max_path_length);
    println!();

    println!("{}", "nginx:".bold());
    println!("  Command: {}", spec.nginx.command.join(" "));
    println!("  Primary config: {}", spec.nginx.primary_config.display());
    println!("  System config: {}", spec.nginx.system_config.display());
    println!();

    println!("{}", "ACME client:".bold());
    println!("  Command: {}", spec.acme.command.join(" "));
    println!("  Home: {}", spec.acme.home.display());
    println!("  Webroot: {}", spec.acme.webroot.display());
    println!(
        "  Servers: {} / {} (staging)",
        spec.acme.production_server, spec.acme.staging_server
    );
    println!(
        "  Deadlines: {:?} (http-01, tls-alpn-01) / {:?} (dns-01)",
        spec.acme.short_deadline, spec.acme.long_deadline
    );
    println!();

    println!("{}", "Certificates:".bold());
    println!("  Directory: {}", spec.certificates.directory.display());
    println!("  Operation log: {}", spec.logs.operation_log.display());
    println!();

    Ok(())
}

async fn validate(overrides: Overrides) -> Result<()> {
    println!("Validating configuration...");

    let config = overrides.load()?;
    config
        .validate()
        .context("Configuration validation failed")?;

    if !config.spec.sandbox.root.is_dir() {
        println!(
            "{}",
            format!(
                "⚠ Sandbox root {} does not exist yet",
                config.spec.sandbox.root.display()
            )
            .yellow()
        );
    }

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

async fn generate(output: &Path, full: bool) -> Result<()> {
    if full {
        WardenConfigManifest::default()
            .to_yaml_file(output)
            .with_context(|| format!("Failed to write config to {:?}", output))?;
    } else {
        std::fs::write(output, include_str!("../../templates/config-minimal.yaml"))
            .with_context(|| format!("Failed to write config to {:?}", output))?;
    }

    println!(
        "{}",
        format!("✓ Configuration generated: {}", output.display()).green()
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_generated_configs_are_valid() {
        let dir = tempfile::TempDir::new().unwrap();

        for full in [false, true] {
            let path = dir.path().join(format!("config-{}.yaml", full));
            generate(&path, full).await.unwrap();

            let manifest = WardenConfigManifest::from_yaml_file(&path).unwrap();
            manifest.validate().unwrap();
        }
    }
}
