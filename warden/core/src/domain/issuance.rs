// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Certificate Issuance Domain
//!
//! Request validation, ACME client argument construction and the DNS
//! provider credential table used by the issuance orchestrator.
//!
//! # Lifecycle
//!
//! ```text
//! Validating → Preparing → Executing → {Completed, TimedOut, Failed}
//!            → ArtifactPlacement → Done
//! ```
//!
//! Validation happens before any directory is created or process spawned.

use crate::domain::error::{ErrorKind, ErrorReport};
use crate::domain::path_guard::PathGuardError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Domain-control verification method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChallengeType {
    #[serde(rename = "http-01")]
    Http01,
    #[serde(rename = "dns-01")]
    Dns01,
    #[serde(rename = "tls-alpn-01")]
    TlsAlpn01,
}

impl ChallengeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChallengeType::Http01 => "http-01",
            ChallengeType::Dns01 => "dns-01",
            ChallengeType::TlsAlpn01 => "tls-alpn-01",
        }
    }

    /// DNS propagation makes dns-01 the only slow challenge
    pub fn needs_long_deadline(&self) -> bool {
        matches!(self, ChallengeType::Dns01)
    }
}

impl fmt::Display for ChallengeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChallengeType {
    type Err = IssuanceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "http-01" => Ok(ChallengeType::Http01),
            "dns-01" => Ok(ChallengeType::Dns01),
            "tls-alpn-01" => Ok(ChallengeType::TlsAlpn01),
            other => Err(IssuanceError::InvalidRequest(format!(
                "challenge must be http-01, dns-01 or tls-alpn-01, got '{}'",
                other
            ))),
        }
    }
}

/// Stage of a single issuance, as recorded in the operation log
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssuanceStage {
    Validating,
    Preparing,
    Executing,
    Completed,
    TimedOut,
    Failed,
    ArtifactPlacement,
    Done,
}

impl fmt::Display for IssuanceStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IssuanceStage::Validating => "validating",
            IssuanceStage::Preparing => "preparing",
            IssuanceStage::Executing => "executing",
            IssuanceStage::Completed => "completed",
            IssuanceStage::TimedOut => "timed_out",
            IssuanceStage::Failed => "failed",
            IssuanceStage::ArtifactPlacement => "artifact_placement",
            IssuanceStage::Done => "done",
        };
        f.write_str(name)
    }
}

/// Issuance request as received from callers
///
/// The challenge is kept as a raw string so an unknown value is reported as
/// an invalid request instead of a decoding failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuanceRequest {
    #[serde(default)]
    pub domains: Vec<String>,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub challenge: String,
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub credentials: BTreeMap<String, String>,
    #[serde(default)]
    pub staging: bool,
    #[serde(default)]
    pub force: bool,
}

/// A request that passed validation
#[derive(Debug, Clone)]
pub struct ValidatedRequest {
    pub domains: Vec<String>,
    pub email: String,
    pub challenge: ChallengeType,
    /// Lowercased provider identifier, present only for dns-01
    pub provider: Option<String>,
    pub credentials: BTreeMap<String, String>,
    pub staging: bool,
    pub force: bool,
}

impl IssuanceRequest {
    /// Check the request before anything touches the disk or spawns
    pub fn validate(&self) -> Result<ValidatedRequest, IssuanceError> {
        if self.domains.is_empty() {
            return Err(IssuanceError::InvalidRequest(
                "at least one domain is required".to_string(),
            ));
        }
        for domain in &self.domains {
            if !is_valid_domain(domain) {
                return Err(IssuanceError::InvalidRequest(format!(
                    "invalid domain name '{}'",
                    domain
                )));
            }
        }

        let email = self.email.trim();
        if email.is_empty() {
            return Err(IssuanceError::InvalidRequest(
                "contact email is required".to_string(),
            ));
        }
        if !email.contains('@') || email.starts_with('-') || email.chars().any(char::is_whitespace)
        {
            return Err(IssuanceError::InvalidRequest(format!(
                "invalid contact email '{}'",
                email
            )));
        }

        let challenge: ChallengeType = self.challenge.trim().parse()?;

        let provider = if challenge == ChallengeType::Dns01 {
            let provider = self.provider.trim().to_lowercase();
            if provider.is_empty() {
                return Err(IssuanceError::InvalidRequest(
                    "DNS provider is required for dns-01 challenge".to_string(),
                ));
            }
            if !provider
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
            {
                return Err(IssuanceError::InvalidRequest(format!(
                    "invalid DNS provider '{}'",
                    self.provider
                )));
            }
            for key in self.credentials.keys() {
                if !is_valid_credential_key(key) {
                    return Err(IssuanceError::InvalidRequest(format!(
                        "invalid credential key '{}'",
                        key
                    )));
                }
            }
            Some(provider)
        } else {
            None
        };

        Ok(ValidatedRequest {
            domains: self.domains.clone(),
            email: email.to_string(),
            challenge,
            provider,
            credentials: self.credentials.clone(),
            staging: self.staging,
            force: self.force,
        })
    }
}

/// Host-side settings that shape the ACME client invocation
#[derive(Debug, Clone)]
pub struct AcmeProfile {
    pub debug: bool,
    pub webroot: PathBuf,
    pub production_server: String,
    pub staging_server: String,
}

impl ValidatedRequest {
    /// First requested domain; names the client's store and the artifacts
    pub fn primary_domain(&self) -> &str {
        &self.domains[0]
    }

    /// Primary domain without its wildcard marker
    pub fn artifact_stem(&self) -> &str {
        let primary = self.primary_domain();
        primary.strip_prefix("*.").unwrap_or(primary)
    }

    /// Order-insensitive identity of the requested domain set
    pub fn domain_set_key(&self) -> String {
        let mut names: Vec<String> = self.domains.iter().map(|d| d.to_lowercase()).collect();
        names.sort();
        names.dedup();
        names.join(",")
    }

    pub fn server<'a>(&self, profile: &'a AcmeProfile) -> &'a str {
        if self.staging {
            &profile.staging_server
        } else {
            &profile.production_server
        }
    }

    /// Arguments for the ACME client, in the order it is invoked with
    ///
    /// `--issue --email E [--debug] [--force] (--domain D)+ --server S <challenge>`
    pub fn acme_arguments(&self, profile: &AcmeProfile) -> Vec<String> {
        let mut args = vec![
            "--issue".to_string(),
            "--email".to_string(),
            self.email.clone(),
        ];
        if profile.debug {
            args.push("--debug".to_string());
        }
        if self.force {
            args.push("--force".to_string());
        }
        for domain in &self.domains {
            args.push("--domain".to_string());
            args.push(domain.clone());
        }
        args.push("--server".to_string());
        args.push(self.server(profile).to_string());

        match self.challenge {
            ChallengeType::Http01 => {
                args.push("--webroot".to_string());
                args.push(profile.webroot.to_string_lossy().into_owned());
            }
            ChallengeType::Dns01 => {
                args.push("--dns".to_string());
                args.push(format!(
                    "dns_{}",
                    self.provider.as_deref().unwrap_or_default()
                ));
            }
            ChallengeType::TlsAlpn01 => args.push("--alpn".to_string()),
        }

        args
    }

    /// Environment variables carrying provider credentials
    ///
    /// Only dns-01 injects credentials; empty values are skipped.
    pub fn credential_environment(&self) -> Vec<(String, String)> {
        let Some(provider) = self.provider.as_deref() else {
            return Vec::new();
        };

        self.credentials
            .iter()
            .filter(|(_, value)| !value.is_empty())
            .map(|(key, value)| (credential_variable(provider, key), value.clone()))
            .collect()
    }

    /// Where the ACME client leaves its output for the primary domain
    pub fn client_artifacts(&self, acme_home: &Path) -> (PathBuf, PathBuf) {
        let primary = self.primary_domain();
        let store = acme_home.join(format!("{}_ecc", primary));
        (
            store.join("fullchain.cer"),
            store.join(format!("{}.key", primary)),
        )
    }
}

/// Environment variables a DNS plugin of the ACME client reads
struct ProviderVariables {
    provider: &'static str,
    /// Credential key → environment variable
    variables: &'static [(&'static str, &'static str)],
}

const PROVIDER_VARIABLES: &[ProviderVariables] = &[
    ProviderVariables {
        provider: "duckdns",
        variables: &[("token", "DuckDNS_Token")],
    },
    ProviderVariables {
        provider: "cloudflare",
        variables: &[
            ("token", "CF_Token"),
            ("key", "CF_Key"),
            ("email", "CF_Email"),
            ("account_id", "CF_Account_ID"),
        ],
    },
    ProviderVariables {
        provider: "digitalocean",
        variables: &[("key", "DO_API_KEY")],
    },
    ProviderVariables {
        provider: "godaddy",
        variables: &[("key", "GD_Key"), ("secret", "GD_Secret")],
    },
    ProviderVariables {
        provider: "namecheap",
        variables: &[
            ("user", "NAMECHEAP_USERNAME"),
            ("key", "NAMECHEAP_API_KEY"),
            ("sourceip", "NAMECHEAP_SOURCEIP"),
        ],
    },
    ProviderVariables {
        provider: "namesilo",
        variables: &[("key", "Namesilo_Key")],
    },
];

/// Map a provider credential key to the variable the ACME client expects
///
/// Known keys map through the table. A known provider with a single variable
/// accepts any key for it. Everything else is used verbatim.
pub fn credential_variable(provider: &str, key: &str) -> String {
    let provider = provider.to_lowercase();
    let Some(entry) = PROVIDER_VARIABLES.iter().find(|p| p.provider == provider) else {
        return key.to_string();
    };

    let lowered = key.to_lowercase();
    if let Some((_, variable)) = entry.variables.iter().find(|(k, _)| *k == lowered) {
        return variable.to_string();
    }
    if let [(_, only)] = entry.variables {
        return only.to_string();
    }
    key.to_string()
}

/// `[*.]label(.label)*` with labels of alphanumerics, `-` and `_`
pub fn is_valid_domain(domain: &str) -> bool {
    let name = domain.strip_prefix("*.").unwrap_or(domain);
    if name.is_empty() || name.len() > 253 {
        return false;
    }
    name.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && label
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    })
}

fn is_valid_credential_key(key: &str) -> bool {
    !key.is_empty() && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Result of one issuance attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuanceOutcome {
    pub operation_id: Uuid,
    pub success: bool,
    /// Combined ACME client output, including what was captured before a kill
    pub output: String,
    /// Root-relative path of the placed certificate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cert_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorReport>,
    /// Non-fatal problems such as a failed artifact copy
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<ErrorReport>,
}

/// Failures that end a request before the ACME client runs
#[derive(Debug, Error)]
pub enum IssuanceError {
    #[error("Invalid issuance request: {0}")]
    InvalidRequest(String),

    #[error("Issuance already in progress for {0}")]
    InProgress(String),

    #[error(transparent)]
    Sandbox(#[from] PathGuardError),

    #[error("Failed to prepare {what}: {message}")]
    Preparation { what: String, message: String },
}

impl IssuanceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            IssuanceError::InvalidRequest(_) | IssuanceError::InProgress(_) => {
                ErrorKind::InvalidRequest
            }
            IssuanceError::Sandbox(e) => e.kind(),
            IssuanceError::Preparation { .. } => ErrorKind::IoError,
        }
    }
}
