// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! [`CertificateReader`] backed by `openssl x509 -noout -subject -dates`.

use crate::domain::certificate::{
    parse_reader_output, CertificateDetails, CertificateError, CertificateReader,
};
use crate::infrastructure::process::run_with_deadline;
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use tokio::process::Command;

pub struct OpensslCertificateReader {
    /// Program and leading arguments, normally `["openssl"]`
    command: Vec<String>,
    deadline: Duration,
}

impl OpensslCertificateReader {
    pub fn new(command: Vec<String>, deadline: Duration) -> Self {
        Self { command, deadline }
    }
}

impl Default for OpensslCertificateReader {
    fn default() -> Self {
        Self::new(vec!["openssl".to_string()], Duration::from_secs(10))
    }
}

#[async_trait]
impl CertificateReader for OpensslCertificateReader {
    async fn read(&self, path: &Path) -> Result<CertificateDetails, CertificateError> {
        let (program, prefix) = self
            .command
            .split_first()
            .ok_or_else(|| CertificateError::Reader("openssl command is empty".to_string()))?;

        let mut cmd = Command::new(program);
        cmd.args(prefix)
            .args(["x509", "-in"])
            .arg(path)
            .args(["-noout", "-subject", "-dates"]);

        let out = run_with_deadline(cmd, self.deadline)
            .await
            .map_err(|e| CertificateError::Reader(e.to_string()))?;

        if !out.success {
            return Err(CertificateError::Reader(format!(
                "exit code {:?}: {}",
                out.exit_code,
                out.output.trim()
            )));
        }

        parse_reader_output(&out.output)
    }
}
