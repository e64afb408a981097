// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod certificate_service;
pub mod inventory;
pub mod log_service;

pub use certificate_service::IssuanceOrchestrator;
pub use inventory::{CertificateInventory, DeletionReport};
pub use log_service::{LogDirectiveLocator, LogService};

use crate::domain::config::WardenConfigManifest;
use crate::domain::path_guard::PathGuard;
use crate::domain::storage::FileStore;
use crate::infrastructure::nginx::NginxController;
use crate::infrastructure::openssl::OpensslCertificateReader;
use crate::infrastructure::operation_log::OperationLog;
use crate::infrastructure::storage::create_file_store;
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

/// Every service the warden exposes, built once at startup
///
/// The sandbox root is established here and shared by every component for
/// the lifetime of the process.
#[derive(Clone)]
pub struct WardenServices {
    pub guard: Arc<PathGuard>,
    pub files: Arc<dyn FileStore>,
    pub nginx: Arc<NginxController>,
    pub logs: Arc<LogService>,
    pub inventory: Arc<CertificateInventory>,
    pub issuer: Arc<IssuanceOrchestrator>,
}

impl WardenServices {
    pub fn from_config(config: &WardenConfigManifest) -> Result<Self> {
        config.validate().context("Invalid warden configuration")?;
        let spec = &config.spec;

        let guard = Arc::new(
            PathGuard::with_max_length(&spec.sandbox.root, spec.sandbox.max_path_length)
                .with_context(|| {
                    format!("Failed to establish sandbox root {:?}", spec.sandbox.root)
                })?,
        );
        info!(root = %guard.root().display(), "Sandbox root established");

        let files = create_file_store(guard.clone());

        let nginx = Arc::new(NginxController::new(
            spec.nginx.command.clone(),
            spec.nginx.deadline,
        ));

        let locator = LogDirectiveLocator::new(guard.clone(), &spec.nginx);
        let logs = Arc::new(LogService::new(locator, spec.logs.clone()));

        let reader = Arc::new(OpensslCertificateReader::new(
            spec.certificates.openssl_command.clone(),
            spec.certificates.reader_deadline,
        ));
        let inventory = Arc::new(CertificateInventory::new(
            guard.clone(),
            spec.certificates.directory.clone(),
            reader,
        ));

        let operation_log = Arc::new(OperationLog::new(spec.logs.operation_log.clone()));
        let issuer = Arc::new(IssuanceOrchestrator::new(
            guard.clone(),
            spec.certificates.directory.clone(),
            spec.acme.clone(),
            operation_log,
        ));

        Ok(Self {
            guard,
            files,
            nginx,
            logs,
            inventory,
            issuer,
        })
    }
}
