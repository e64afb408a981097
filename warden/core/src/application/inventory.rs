// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Certificate Inventory Application Service
//!
//! Scans the sandboxed certificate directory and deletes certificate/key
//! pairs from it.
//!
//! A scan always reflects the filesystem at call time, including files the
//! issuance orchestrator placed moments earlier. Files the reader cannot
//! parse are left out of the result rather than failing the scan.

use crate::domain::certificate::{
    days_remaining, is_certificate_file, CertificateError, CertificateReader, CertificateRecord,
    KEY_EXTENSION,
};
use crate::domain::error::{ErrorKind, ErrorReport};
use crate::domain::path_guard::{PathGuard, SymlinkPolicy};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Result of a certificate deletion
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletionReport {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<ErrorReport>,
}

pub struct CertificateInventory {
    guard: Arc<PathGuard>,
    /// Certificate directory relative to the sandbox root
    directory: PathBuf,
    reader: Arc<dyn CertificateReader>,
}

impl CertificateInventory {
    pub fn new(
        guard: Arc<PathGuard>,
        directory: impl Into<PathBuf>,
        reader: Arc<dyn CertificateReader>,
    ) -> Self {
        Self {
            guard,
            directory: directory.into(),
            reader,
        }
    }

    /// Absolute certificate directory, confined to the sandbox
    pub fn certificate_root(&self) -> Result<PathBuf, CertificateError> {
        Ok(self
            .guard
            .confine(&self.directory.to_string_lossy(), SymlinkPolicy::FollowFinal)?)
    }

    pub async fn scan(&self) -> Result<Vec<CertificateRecord>, CertificateError> {
        self.scan_at(Utc::now()).await
    }

    /// Scan with an explicit clock for `daysLeft`
    pub async fn scan_at(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<CertificateRecord>, CertificateError> {
        let cert_root = self.certificate_root()?;
        if !tokio::fs::metadata(&cert_root)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
        {
            debug!(directory = %self.directory.display(), "No certificate directory");
            return Ok(Vec::new());
        }

        let walk_root = cert_root.clone();
        let candidates = tokio::task::spawn_blocking(move || candidate_files(&walk_root))
            .await
            .map_err(|e| CertificateError::Scan(e.to_string()))?;

        let mut records = Vec::with_capacity(candidates.len());
        for path in candidates {
            match self.record_for(&path, now).await {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {}
                Err(e) => debug!(file = %path.display(), error = %e, "Skipping certificate"),
            }
        }

        Ok(records)
    }

    async fn record_for(
        &self,
        path: &Path,
        now: DateTime<Utc>,
    ) -> Result<Option<CertificateRecord>, CertificateError> {
        let sandbox_path = self.guard.to_sandbox_path(path)?;

        // Links are followed only while they stay inside the sandbox
        let resolved = self.guard.confine(&sandbox_path, SymlinkPolicy::FollowFinal)?;
        if !tokio::fs::metadata(&resolved)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false)
        {
            return Ok(None);
        }

        let details = self.reader.read(&resolved).await?;

        let domain = details.common_name().unwrap_or_else(|| {
            path.file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default()
        });

        let key_path = path.with_extension(KEY_EXTENSION);
        let key_file = self.existing_key(&key_path).await;

        Ok(Some(CertificateRecord {
            is_wildcard: domain.starts_with("*."),
            domain,
            path: sandbox_path.clone(),
            cert_file: sandbox_path,
            key_file,
            not_before: details.not_before,
            not_after: details.not_after,
            days_left: days_remaining(details.not_after, now),
        }))
    }

    /// Root-relative path of a key file, if one exists inside the sandbox
    async fn existing_key(&self, key_path: &Path) -> Option<String> {
        let relative = self.guard.to_sandbox_path(key_path).ok()?;
        let resolved = self
            .guard
            .confine(&relative, SymlinkPolicy::FollowFinal)
            .ok()?;
        let metadata = tokio::fs::metadata(&resolved).await.ok()?;
        metadata.is_file().then_some(relative)
    }

    /// Delete a certificate and, optionally, its key
    ///
    /// Both paths are root-relative and must lie inside the certificate
    /// directory; both are checked before anything is removed. A missing
    /// certificate counts as deleted. Failing to remove the key is reported
    /// as a warning only.
    pub async fn delete(
        &self,
        cert_file: &str,
        key_file: Option<&str>,
    ) -> Result<DeletionReport, CertificateError> {
        if cert_file.trim().is_empty() {
            return Err(CertificateError::InvalidPath(
                "certificate file path is required".to_string(),
            ));
        }

        let cert_root = self.certificate_root()?;
        let cert_path = self.confine_to_directory(&cert_root, cert_file)?;
        let key_path = match key_file.filter(|k| !k.trim().is_empty()) {
            Some(key) => Some((key, self.confine_to_directory(&cert_root, key)?)),
            None => None,
        };

        match tokio::fs::remove_file(&cert_path).await {
            Ok(()) => info!(cert_file = %cert_file, "Certificate deleted"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(cert_file = %cert_file, "Certificate already absent");
            }
            Err(source) => {
                return Err(CertificateError::Delete {
                    path: cert_file.to_string(),
                    source,
                })
            }
        }

        let mut warnings = Vec::new();
        if let Some((key, path)) = key_path {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => info!(key_file = %key, "Key deleted"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(key_file = %key, error = %e, "Failed to delete key file");
                    warnings.push(ErrorReport::new(
                        ErrorKind::PartialArtifactFailure,
                        format!("Failed to delete key file {}: {}", key, e),
                    ));
                }
            }
        }

        Ok(DeletionReport {
            success: true,
            message: "Certificate deleted successfully".to_string(),
            warnings,
        })
    }

    fn confine_to_directory(
        &self,
        cert_root: &Path,
        user_path: &str,
    ) -> Result<PathBuf, CertificateError> {
        let resolved = self.guard.confine(user_path, SymlinkPolicy::NoFollowFinal)?;
        if resolved == cert_root || !PathGuard::contains(cert_root, &resolved) {
            return Err(CertificateError::OutsideCertificateDirectory(
                user_path.to_string(),
            ));
        }
        Ok(resolved)
    }
}

/// Certificate-suffixed files and links under `root`, in path order
fn candidate_files(root: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| !entry.file_type().is_dir())
        .map(|entry| entry.into_path())
        .filter(|path| is_certificate_file(path))
        .collect();
    files.sort();
    files
}
