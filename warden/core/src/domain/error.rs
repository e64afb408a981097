// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Error Taxonomy
//!
//! Machine-readable error kinds surfaced to callers alongside a
//! human-readable message. Every module-level error type maps onto exactly
//! one of these through a `kind()` method.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Machine-readable error classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Path escapes the sandboxed root. Always detected before any I/O.
    SandboxViolation,
    NotFound,
    PermissionDenied,
    /// Malformed or semantically invalid input, detected before side effects
    InvalidRequest,
    /// Non-zero exit, spawn failure or unparseable output of an external tool
    ExternalProcessFailure,
    /// Deadline exceeded; the external process was forcibly killed
    ExternalProcessTimeout,
    /// One of two related files failed to copy or delete
    PartialArtifactFailure,
    /// Any other I/O failure
    IoError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::SandboxViolation => "sandbox_violation",
            ErrorKind::NotFound => "not_found",
            ErrorKind::PermissionDenied => "permission_denied",
            ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::ExternalProcessFailure => "external_process_failure",
            ErrorKind::ExternalProcessTimeout => "external_process_timeout",
            ErrorKind::PartialArtifactFailure => "partial_artifact_failure",
            ErrorKind::IoError => "io_error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error kind plus message, as recorded in issuance outcomes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub kind: ErrorKind,
    pub message: String,
}

impl ErrorReport {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_wire_format_matches_display() {
        for kind in [
            ErrorKind::SandboxViolation,
            ErrorKind::NotFound,
            ErrorKind::PermissionDenied,
            ErrorKind::InvalidRequest,
            ErrorKind::ExternalProcessFailure,
            ErrorKind::ExternalProcessTimeout,
            ErrorKind::PartialArtifactFailure,
            ErrorKind::IoError,
        ] {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind));
        }
    }
}
