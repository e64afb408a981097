// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Certificate commands
//!
//! Commands: list, obtain, delete. They run against the local sandbox with
//! the same services the HTTP API uses.

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::collections::BTreeMap;

use warden_core::application::WardenServices;
use warden_core::domain::issuance::IssuanceRequest;

use super::Overrides;

#[derive(Subcommand)]
pub enum CertsCommand {
    /// List certificates in the certificate directory
    List,

    /// Obtain a certificate through the ACME client
    Obtain {
        /// Domain to include; the first one names the artifacts
        #[arg(short, long = "domain", required = true)]
        domains: Vec<String>,

        /// Account email registered with the CA
        #[arg(short, long)]
        email: String,

        /// Challenge type (http-01, dns-01, tls-alpn-01)
        #[arg(long, default_value = "http-01")]
        challenge: String,

        /// DNS provider for dns-01 (cloudflare, duckdns, ...)
        #[arg(long, default_value = "")]
        provider: String,

        /// Provider credential as KEY=VALUE (repeatable)
        #[arg(long = "credential", value_name = "KEY=VALUE", value_parser = parse_credential)]
        credentials: Vec<(String, String)>,

        /// Use the staging CA
        #[arg(long)]
        staging: bool,

        /// Reissue even if the current certificate is still valid
        #[arg(long)]
        force: bool,
    },

    /// Delete a certificate and optionally its key
    Delete {
        /// Certificate path relative to the sandbox root
        #[arg(value_name = "CERT")]
        cert_file: String,

        /// Key path relative to the sandbox root
        #[arg(long = "key", value_name = "KEY")]
        key_file: Option<String>,
    },
}

pub async fn handle_command(command: CertsCommand, overrides: Overrides) -> Result<()> {
    let config = overrides.load()?;
    let services = WardenServices::from_config(&config)
        .context("Failed to initialize warden services")?;

    match command {
        CertsCommand::List => list(&services).await,
        CertsCommand::Obtain {
            domains,
            email,
            challenge,
            provider,
            credentials,
            staging,
            force,
        } => {
            let request = IssuanceRequest {
                domains,
                email,
                challenge,
                provider,
                credentials: credentials.into_iter().collect::<BTreeMap<_, _>>(),
                staging,
                force,
            };
            obtain(&services, request).await
        }
        CertsCommand::Delete {
            cert_file,
            key_file,
        } => delete(&services, &cert_file, key_file.as_deref()).await,
    }
}

async fn list(services: &WardenServices) -> Result<()> {
    let records = services
        .inventory
        .scan()
        .await
        .context("Failed to scan certificate directory")?;

    if records.is_empty() {
        println!("{}", "No certificates found".dimmed());
        return Ok(());
    }

    println!(
        "{:<40} {:>9}  {:<26} {}",
        "DOMAIN".bold(),
        "DAYS".bold(),
        "EXPIRES".bold(),
        "FILE".bold()
    );
    for record in records {
        let days = format!("{:>9}", record.days_left);
        let days = match record.days_left {
            d if d < 0 => days.red(),
            d if d < 30 => days.yellow(),
            _ => days.green(),
        };
        println!(
            "{:<40} {}  {:<26} {}",
            record.domain,
            days,
            record.not_after.to_rfc3339(),
            record.cert_file
        );
    }

    Ok(())
}

async fn obtain(services: &WardenServices, request: IssuanceRequest) -> Result<()> {
    println!(
        "Requesting certificate for {} ({})...",
        request.domains.join(", ").bold(),
        request.challenge
    );

    let outcome = services
        .issuer
        .obtain(request)
        .await
        .context("Certificate request rejected")?;

    println!("Operation: {}", outcome.operation_id);
    for warning in &outcome.warnings {
        println!("{}", format!("⚠ {}", warning.message).yellow());
    }

    if let Some(error) = &outcome.error {
        eprintln!("{}", outcome.output);
        anyhow::bail!("Certificate obtain failed ({}): {}", error.kind, error.message);
    }

    println!("{}", "✓ Certificate obtained".green());
    if let Some(cert) = &outcome.cert_file {
        println!("  Certificate: {}", cert);
    }
    if let Some(key) = &outcome.key_file {
        println!("  Key: {}", key);
    }

    Ok(())
}

async fn delete(services: &WardenServices, cert_file: &str, key_file: Option<&str>) -> Result<()> {
    let report = services
        .inventory
        .delete(cert_file, key_file)
        .await
        .with_context(|| format!("Failed to delete {}", cert_file))?;

    for warning in &report.warnings {
        println!("{}", format!("⚠ {}", warning.message).yellow());
    }
    println!("{}", format!("✓ {}", report.message).green());

    Ok(())
}

fn parse_credential(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", raw))?;
    if key.is_empty() {
        return Err("credential key cannot be empty".to_string());
    }
    Ok((key.to_string(), value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_credential() {
        assert_eq!(
            parse_credential("token=abc=def").unwrap(),
            ("token".to_string(), "abc=def".to_string())
        );
        assert!(parse_credential("token").is_err());
        assert!(parse_credential("=value").is_err());
    }
}
