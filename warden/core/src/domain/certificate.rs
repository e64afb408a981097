// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Certificate Inventory Domain
//!
//! Records describing certificates found under the sandboxed certificate
//! directory, and parsing of the text an X.509 reader produces for them.
//!
//! Records are built at request time and never cached: `daysLeft` drifts with
//! the wall clock and the directory may have changed since the last scan.

use crate::domain::error::ErrorKind;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::OnceLock;
use thiserror::Error;

/// File suffixes recognized as certificate bodies
pub const CERTIFICATE_EXTENSIONS: [&str; 2] = ["crt", "pem"];

/// Suffix of the private key paired with a certificate
pub const KEY_EXTENSION: &str = "key";

/// A certificate found on disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateRecord {
    /// Subject common name, or the file stem when the subject has none
    pub domain: String,
    pub is_wildcard: bool,
    /// Root-relative path of the certificate body
    pub path: String,
    pub cert_file: String,
    /// Root-relative path of the paired key, if present
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_file: Option<String>,
    pub not_before: Option<DateTime<Utc>>,
    pub not_after: DateTime<Utc>,
    /// Whole days until expiry, truncated toward zero; negative once expired
    pub days_left: i64,
}

/// Subject and validity window extracted from a certificate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateDetails {
    pub subject: String,
    pub not_before: Option<DateTime<Utc>>,
    pub not_after: DateTime<Utc>,
}

impl CertificateDetails {
    pub fn common_name(&self) -> Option<String> {
        common_name(&self.subject)
    }
}

#[derive(Debug, Error)]
pub enum CertificateError {
    #[error("Certificate reader failed: {0}")]
    Reader(String),

    #[error("Unparseable certificate text: {0}")]
    Unparseable(String),

    #[error("Invalid certificate path: {0}")]
    InvalidPath(String),

    #[error(transparent)]
    Sandbox(#[from] crate::domain::path_guard::PathGuardError),

    #[error("Not inside the certificate directory: {0}")]
    OutsideCertificateDirectory(String),

    #[error("Failed to delete {path}: {source}")]
    Delete {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to scan certificate directory: {0}")]
    Scan(String),
}

impl CertificateError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CertificateError::Reader(_) | CertificateError::Unparseable(_) => {
                ErrorKind::ExternalProcessFailure
            }
            CertificateError::InvalidPath(_) => ErrorKind::InvalidRequest,
            CertificateError::Sandbox(e) => e.kind(),
            CertificateError::OutsideCertificateDirectory(_) => ErrorKind::SandboxViolation,
            CertificateError::Delete { source, .. } => match source.kind() {
                std::io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied,
                _ => ErrorKind::IoError,
            },
            CertificateError::Scan(_) => ErrorKind::IoError,
        }
    }
}

/// Source of certificate details for one file
#[async_trait]
pub trait CertificateReader: Send + Sync {
    async fn read(&self, path: &Path) -> Result<CertificateDetails, CertificateError>;
}

/// Parse `-subject -dates` style reader output
///
/// ```text
/// subject=CN = example.com
/// notBefore=Jan  1 00:00:00 2026 GMT
/// notAfter=Apr  1 23:59:59 2026 GMT
/// ```
///
/// `notAfter` is mandatory; a missing or malformed `notBefore` is tolerated.
pub fn parse_reader_output(text: &str) -> Result<CertificateDetails, CertificateError> {
    let mut subject = String::new();
    let mut not_before = None;
    let mut not_after = None;

    for line in text.lines() {
        let line = line.trim();
        if let Some(value) = line.strip_prefix("subject=") {
            subject = value.trim().to_string();
        } else if let Some(value) = line.strip_prefix("notBefore=") {
            not_before = parse_validity_date(value);
        } else if let Some(value) = line.strip_prefix("notAfter=") {
            not_after = Some(parse_validity_date(value).ok_or_else(|| {
                CertificateError::Unparseable(format!("notAfter '{}'", value.trim()))
            })?);
        }
    }

    let not_after =
        not_after.ok_or_else(|| CertificateError::Unparseable("missing notAfter".to_string()))?;

    Ok(CertificateDetails {
        subject,
        not_before,
        not_after,
    })
}

/// Extract the common name from either subject rendering
///
/// Handles `CN = example.com, O = Org` and `/C=US/CN=example.com`.
pub fn common_name(subject: &str) -> Option<String> {
    static CN: OnceLock<Regex> = OnceLock::new();
    let re = CN.get_or_init(|| {
        Regex::new(r"(?:^|[,/]\s*)CN\s*=\s*([^,/\n]+)").expect("invalid common name pattern")
    });

    re.captures(subject)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|cn| !cn.is_empty())
}

/// Parse `Mon DD HH:MM:SS YYYY [TZ]`; the timezone is always GMT in practice
pub fn parse_validity_date(value: &str) -> Option<DateTime<Utc>> {
    let mut tokens: Vec<&str> = value.split_whitespace().collect();
    if tokens.len() == 5 {
        tokens.pop();
    }
    if tokens.len() != 4 {
        return None;
    }

    NaiveDateTime::parse_from_str(&tokens.join(" "), "%b %d %H:%M:%S %Y")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Whole days from `now` until `not_after`, truncated toward zero
pub fn days_remaining(not_after: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (not_after - now).num_days()
}

/// Whether a file name carries a certificate body suffix
pub fn is_certificate_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| CERTIFICATE_EXTENSIONS.contains(&e))
        .unwrap_or(false)
}
