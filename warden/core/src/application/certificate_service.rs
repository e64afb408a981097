// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Certificate Issuance Application Service
//!
//! Drives the external ACME client to obtain a certificate and places the
//! resulting certificate/key pair into the sandboxed certificate directory.
//!
//! # Flow
//!
//! 1. **Validating**: request checked, nothing touched on failure
//! 2. **Preparing**: client home and certificate directory ensured, argument
//!    list and credential environment built
//! 3. **Executing**: client raced against a challenge-dependent deadline;
//!    on expiry its process group is killed
//! 4. **ArtifactPlacement**: certificate and key copied independently; a
//!    failed copy becomes a warning, not a failure
//!
//! Every step is appended to the operation log under the request's
//! operation id. Credential variable names are logged, their values never.
//! If the caller abandons the request (the `obtain` future is dropped), the
//! client's process group is killed and a terminal `failed` entry is still
//! written.

use crate::domain::config::AcmeConfig;
use crate::domain::error::{ErrorKind, ErrorReport};
use crate::domain::issuance::{
    IssuanceError, IssuanceOutcome, IssuanceRequest, IssuanceStage, ValidatedRequest,
};
use crate::domain::path_guard::{PathGuard, SymlinkPolicy};
use crate::infrastructure::operation_log::OperationLog;
use crate::infrastructure::process::{run_with_deadline, ProcessError};
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{info, warn};
use uuid::Uuid;

const CERTIFICATE_MODE: u32 = 0o644;
const KEY_MODE: u32 = 0o600;

/// Issues certificates through the ACME client
pub struct IssuanceOrchestrator {
    guard: Arc<PathGuard>,
    /// Certificate directory relative to the sandbox root
    cert_directory: PathBuf,
    acme: AcmeConfig,
    operation_log: Arc<OperationLog>,
    /// Domain sets currently being issued, keyed by normalized set
    in_flight: DashMap<String, Uuid>,
}

/// Removes its domain set from the in-flight table when dropped
struct InFlightGuard<'a> {
    table: &'a DashMap<String, Uuid>,
    key: String,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.table.remove(&self.key);
    }
}

/// Writes the terminal log entry for a request dropped before it finished
struct Abandonment {
    operation_log: Arc<OperationLog>,
    operation_id: Uuid,
    finished: bool,
}

impl Abandonment {
    fn finish(&mut self) {
        self.finished = true;
    }
}

impl Drop for Abandonment {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        warn!(operation_id = %self.operation_id, "Certificate obtain abandoned by caller");
        metrics::counter!("warden_certificate_issuance_total", "outcome" => "cancelled")
            .increment(1);

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let operation_log = self.operation_log.clone();
        let operation_id = self.operation_id;
        runtime.spawn(async move {
            operation_log
                .record(
                    &operation_id,
                    &format!(
                        "[{}] ERROR: certificate obtain cancelled before completion",
                        IssuanceStage::Failed
                    ),
                )
                .await;
        });
    }
}

/// Destination of one artifact copy
struct Placement<'a> {
    label: &'static str,
    source: &'a Path,
    destination: &'a Path,
    mode: u32,
}

impl IssuanceOrchestrator {
    pub fn new(
        guard: Arc<PathGuard>,
        cert_directory: impl Into<PathBuf>,
        acme: AcmeConfig,
        operation_log: Arc<OperationLog>,
    ) -> Self {
        Self {
            guard,
            cert_directory: cert_directory.into(),
            acme,
            operation_log,
            in_flight: DashMap::new(),
        }
    }

    /// Deadline applied to a challenge type
    pub fn deadline_for(&self, request: &ValidatedRequest) -> Duration {
        if request.challenge.needs_long_deadline() {
            self.acme.long_deadline
        } else {
            self.acme.short_deadline
        }
    }

    /// Obtain a certificate
    ///
    /// `Err` is returned only when the request is rejected before the ACME
    /// client runs. Once the client has been started, every result
    /// (including timeouts and client failures) is an [`IssuanceOutcome`].
    pub async fn obtain(&self, request: IssuanceRequest) -> Result<IssuanceOutcome, IssuanceError> {
        let operation_id = Uuid::new_v4();
        let mut abandonment = Abandonment {
            operation_log: self.operation_log.clone(),
            operation_id,
            finished: false,
        };

        self.stage(
            &operation_id,
            IssuanceStage::Validating,
            &format!(
                "Certificate obtain request started - domains: {:?}, challenge: {}, provider: {}, staging: {}, force: {}",
                request.domains, request.challenge, request.provider, request.staging, request.force
            ),
        )
        .await;

        let validated = match request.validate() {
            Ok(v) => v,
            Err(e) => return Err(self.reject(&operation_id, e, &mut abandonment).await),
        };

        let _in_flight = match self.claim(&validated, operation_id) {
            Ok(guard) => guard,
            Err(e) => return Err(self.reject(&operation_id, e, &mut abandonment).await),
        };

        let (cert_destination, key_destination) =
            match self.prepare(&operation_id, &validated).await {
                Ok(destinations) => destinations,
                Err(e) => return Err(self.reject(&operation_id, e, &mut abandonment).await),
            };

        let outcome = self
            .execute(&operation_id, &validated, &cert_destination, &key_destination)
            .await;

        let label = match &outcome.error {
            None => "success",
            Some(report) if report.kind == ErrorKind::ExternalProcessTimeout => "timeout",
            Some(_) => "failed",
        };
        metrics::counter!("warden_certificate_issuance_total", "outcome" => label).increment(1);
        abandonment.finish();

        Ok(outcome)
    }

    async fn reject(
        &self,
        operation_id: &Uuid,
        error: IssuanceError,
        abandonment: &mut Abandonment,
    ) -> IssuanceError {
        self.operation_log
            .record(operation_id, &format!("ERROR: {}", error))
            .await;
        abandonment.finish();
        metrics::counter!("warden_certificate_issuance_total", "outcome" => "rejected")
            .increment(1);
        error
    }

    fn claim(
        &self,
        request: &ValidatedRequest,
        operation_id: Uuid,
    ) -> Result<InFlightGuard<'_>, IssuanceError> {
        let key = request.domain_set_key();
        match self.in_flight.entry(key.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(IssuanceError::InProgress(key)),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(operation_id);
                Ok(InFlightGuard {
                    table: &self.in_flight,
                    key,
                })
            }
        }
    }

    /// Ensure directories exist and resolve the artifact destinations
    async fn prepare(
        &self,
        operation_id: &Uuid,
        request: &ValidatedRequest,
    ) -> Result<(PathBuf, PathBuf), IssuanceError> {
        self.stage(operation_id, IssuanceStage::Preparing, "Preparing directories")
            .await;

        let cert_dir = self.cert_directory.to_string_lossy().into_owned();
        let stem = request.artifact_stem();
        let cert_destination = self.guard.confine(
            &format!("{}/{}.crt", cert_dir, stem),
            SymlinkPolicy::FollowFinal,
        )?;
        let key_destination = self.guard.confine(
            &format!("{}/{}.key", cert_dir, stem),
            SymlinkPolicy::FollowFinal,
        )?;

        tokio::fs::create_dir_all(&self.acme.home)
            .await
            .map_err(|e| IssuanceError::Preparation {
                what: "ACME client home".to_string(),
                message: e.to_string(),
            })?;

        let cert_root = self.guard.confine(&cert_dir, SymlinkPolicy::FollowFinal)?;
        tokio::fs::create_dir_all(&cert_root)
            .await
            .map_err(|e| IssuanceError::Preparation {
                what: "certificate directory".to_string(),
                message: e.to_string(),
            })?;

        Ok((cert_destination, key_destination))
    }

    async fn execute(
        &self,
        operation_id: &Uuid,
        request: &ValidatedRequest,
        cert_destination: &Path,
        key_destination: &Path,
    ) -> IssuanceOutcome {
        let args = request.acme_arguments(&self.acme.profile());
        let display_program = self.acme.command.join(" ");

        if request.force {
            self.log(operation_id, "Force renewal enabled").await;
        }
        for domain in &request.domains {
            self.log(operation_id, &format!("Adding domain: {}", domain)).await;
        }
        self.log(
            operation_id,
            &format!(
                "Using {} server: {}",
                if request.staging { "STAGING" } else { "production" },
                request.server(&self.acme.profile())
            ),
        )
        .await;
        self.log(
            operation_id,
            &format!("ACME client command: {} {}", display_program, args.join(" ")),
        )
        .await;

        let environment = request.credential_environment();
        for (name, _) in &environment {
            self.log(operation_id, &format!("Setting environment variable: {}", name))
                .await;
        }

        let deadline = self.deadline_for(request);
        self.log(
            operation_id,
            &format!(
                "Using {:?} deadline for {} challenge",
                deadline, request.challenge
            ),
        )
        .await;

        let mut outcome = IssuanceOutcome {
            operation_id: *operation_id,
            success: false,
            output: String::new(),
            cert_file: None,
            key_file: None,
            error: None,
            warnings: Vec::new(),
        };

        let Some((program, prefix)) = self.acme.command.split_first() else {
            let report = ErrorReport::new(
                ErrorKind::ExternalProcessFailure,
                "ACME client command is not configured",
            );
            self.stage(operation_id, IssuanceStage::Failed, &report.message).await;
            outcome.error = Some(report);
            return outcome;
        };

        let mut command = Command::new(program);
        command
            .args(prefix)
            .args(&args)
            .envs(environment)
            .current_dir(&self.acme.home);

        self.stage(operation_id, IssuanceStage::Executing, "Executing ACME client")
            .await;

        match run_with_deadline(command, deadline).await {
            Ok(result) if result.success => {
                outcome.output = result.output;
                self.stage(
                    operation_id,
                    IssuanceStage::Completed,
                    &format!(
                        "ACME client completed. Output length: {} bytes",
                        outcome.output.len()
                    ),
                )
                .await;
                self.log(operation_id, &format!("ACME client output:\n{}", outcome.output))
                    .await;
            }
            Ok(result) => {
                outcome.output = result.output;
                let report = ErrorReport::new(
                    ErrorKind::ExternalProcessFailure,
                    match result.exit_code {
                        Some(code) => format!("ACME client exited with status {}", code),
                        None => "ACME client was terminated by a signal".to_string(),
                    },
                );
                self.finish_failed(operation_id, IssuanceStage::Failed, &mut outcome, report)
                    .await;
                return outcome;
            }
            Err(e) => {
                outcome.output = e.captured_output().to_string();
                let stage = match e {
                    ProcessError::TimedOut { .. } => IssuanceStage::TimedOut,
                    _ => IssuanceStage::Failed,
                };
                let report = match &e {
                    ProcessError::TimedOut { deadline, .. } => ErrorReport::new(
                        e.kind(),
                        format!("certificate obtain timeout after {:?}", deadline),
                    ),
                    _ => ErrorReport::new(e.kind(), e.to_string()),
                };
                self.finish_failed(operation_id, stage, &mut outcome, report).await;
                return outcome;
            }
        }

        self.place_artifacts(operation_id, request, cert_destination, key_destination, &mut outcome)
            .await;

        outcome.success = true;
        self.stage(
            operation_id,
            IssuanceStage::Done,
            &format!(
                "Certificate obtain completed successfully for domains: {:?}",
                request.domains
            ),
        )
        .await;
        info!(operation_id = %operation_id, domains = ?request.domains, "Certificate issued");

        outcome
    }

    async fn finish_failed(
        &self,
        operation_id: &Uuid,
        stage: IssuanceStage,
        outcome: &mut IssuanceOutcome,
        report: ErrorReport,
    ) {
        self.stage(operation_id, stage, &format!("ERROR: {}", report.message))
            .await;
        self.log(operation_id, &format!("ACME client output:\n{}", outcome.output))
            .await;
        warn!(operation_id = %operation_id, kind = %report.kind, "Certificate obtain failed: {}", report.message);
        outcome.error = Some(report);
    }

    async fn place_artifacts(
        &self,
        operation_id: &Uuid,
        request: &ValidatedRequest,
        cert_destination: &Path,
        key_destination: &Path,
        outcome: &mut IssuanceOutcome,
    ) {
        self.stage(
            operation_id,
            IssuanceStage::ArtifactPlacement,
            &format!("Placing artifacts for primary domain {}", request.primary_domain()),
        )
        .await;

        let (cert_source, key_source) = request.client_artifacts(&self.acme.home);

        let placements = [
            Placement {
                label: "certificate",
                source: &cert_source,
                destination: cert_destination,
                mode: CERTIFICATE_MODE,
            },
            Placement {
                label: "key",
                source: &key_source,
                destination: key_destination,
                mode: KEY_MODE,
            },
        ];

        for placement in placements {
            match copy_artifact(placement.source, placement.destination, placement.mode).await {
                Ok(()) => {
                    let relative = self.guard.to_sandbox_path(placement.destination).ok();
                    self.log(
                        operation_id,
                        &format!(
                            "Successfully copied {} to {}",
                            placement.label,
                            relative.as_deref().unwrap_or_default()
                        ),
                    )
                    .await;
                    match placement.label {
                        "certificate" => outcome.cert_file = relative,
                        _ => outcome.key_file = relative,
                    }
                }
                Err(e) => {
                    let message = format!(
                        "Failed to copy {} from {}: {}",
                        placement.label,
                        placement.source.display(),
                        e
                    );
                    self.log(operation_id, &format!("ERROR: {}", message)).await;
                    outcome
                        .warnings
                        .push(ErrorReport::new(ErrorKind::PartialArtifactFailure, message));
                }
            }
        }
    }

    async fn stage(&self, operation_id: &Uuid, stage: IssuanceStage, message: &str) {
        self.log(operation_id, &format!("[{}] {}", stage, message)).await;
    }

    async fn log(&self, operation_id: &Uuid, message: &str) {
        self.operation_log.record(operation_id, message).await;
    }
}

/// Copy one artifact, replacing any previous file and applying `mode`
///
/// The data is written to a staging file created with `mode` next to the
/// destination and renamed over it, so a previous file with looser
/// permissions never holds the new contents.
async fn copy_artifact(source: &Path, destination: &Path, mode: u32) -> std::io::Result<()> {
    let data = tokio::fs::read(source).await?;

    let file_name = destination.file_name().ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "artifact destination has no file name",
        )
    })?;
    let mut staging_name = std::ffi::OsString::from(".");
    staging_name.push(file_name);
    staging_name.push(".partial");
    let staging = destination.with_file_name(staging_name);

    match tokio::fs::remove_file(&staging).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }

    let result = write_staged(&staging, destination, &data, mode).await;
    if result.is_err() {
        let _ = tokio::fs::remove_file(&staging).await;
    }
    result
}

async fn write_staged(
    staging: &Path,
    destination: &Path,
    data: &[u8],
    mode: u32,
) -> std::io::Result<()> {
    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    options.mode(mode);

    let mut file = options.open(staging).await?;
    file.write_all(data).await?;
    file.flush().await?;
    drop(file);

    // The umask may have narrowed `mode` further
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(staging, std::fs::Permissions::from_mode(mode)).await?;
    }
    #[cfg(not(unix))]
    let _ = mode;

    tokio::fs::rename(staging, destination).await
}
