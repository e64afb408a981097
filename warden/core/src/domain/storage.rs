// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Sandboxed File Store Trait
//!
//! Abstraction over the filesystem operations exposed to callers. Every
//! operation takes root-relative paths and must pass them through the
//! [`PathGuard`](crate::domain::path_guard::PathGuard) before any I/O.
//!
//! Operations are not transactional: a `move` that fails halfway leaves
//! whatever state the filesystem reached.

use crate::domain::error::ErrorKind;
use crate::domain::path_guard::PathGuardError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single filesystem object surfaced to callers
///
/// Derived on every listing call and never cached. Field names follow the
/// HTTP surface (`isDir`, `linkTarget`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    /// Base name
    pub name: String,
    /// Root-relative path (`/conf.d/site.conf`)
    pub path: String,
    #[serde(rename = "isDir")]
    pub is_directory: bool,
    pub is_symlink: bool,
    /// Literal link target, never dereferenced
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link_target: Option<String>,
    #[serde(rename = "size")]
    pub size_bytes: u64,
    #[serde(rename = "modTime")]
    pub modified_at: DateTime<Utc>,
}

/// Sandboxed file store
///
/// Paths are always relative to the sandbox root; a leading `/` is allowed
/// and means the same thing.
#[async_trait]
pub trait FileStore: Send + Sync {
    /// List a directory in iteration order
    async fn list(&self, path: &str) -> Result<Vec<Entry>, StorageError>;

    /// Read a whole file
    async fn read(&self, path: &str) -> Result<Vec<u8>, StorageError>;

    /// Replace a file's content, creating it if absent
    ///
    /// Missing parent directories are not created.
    async fn write(&self, path: &str, content: &[u8]) -> Result<(), StorageError>;

    /// Create a directory (with parents) or an empty file (parents first)
    ///
    /// An existing target of the same type is left untouched.
    async fn create(&self, path: &str, is_directory: bool) -> Result<(), StorageError>;

    /// Remove a file, a symlink, or a directory tree
    ///
    /// Removing a path that does not exist succeeds.
    async fn delete(&self, path: &str) -> Result<(), StorageError>;

    /// Rename an entry
    async fn rename(&self, old_path: &str, new_path: &str) -> Result<(), StorageError>;

    /// Move an entry; an existing directory target receives the source under its own name
    ///
    /// Returns the root-relative path the source ended up at.
    async fn move_entry(&self, source_path: &str, target_path: &str)
        -> Result<String, StorageError>;

    /// Create a symbolic link at `link_path`
    ///
    /// A target starting with `/` is interpreted as root-relative and stored
    /// as a relative link from the link's directory; anything else is stored
    /// verbatim.
    async fn create_symlink(&self, link_path: &str, target: &str) -> Result<(), StorageError>;
}

/// Storage errors
///
/// Messages only ever carry the caller-supplied relative path.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error(transparent)]
    Sandbox(#[from] PathGuardError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Not a directory: {0}")]
    NotADirectory(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("{path} already exists as a {existing}")]
    TypeMismatch { path: String, existing: &'static str },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Unsupported on this platform: {0}")]
    Unsupported(String),

    #[error("IO error on {path}: {message}")]
    IoError { path: String, message: String },
}

impl StorageError {
    /// Classify an I/O error against the caller-supplied path
    pub fn from_io(path: &str, err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => StorageError::NotFound(path.to_string()),
            std::io::ErrorKind::PermissionDenied => {
                StorageError::PermissionDenied(path.to_string())
            }
            std::io::ErrorKind::AlreadyExists => StorageError::AlreadyExists(path.to_string()),
            _ => StorageError::IoError {
                path: path.to_string(),
                // io::Error's Display never includes the path it failed on
                message: err.to_string(),
            },
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            StorageError::Sandbox(e) => e.kind(),
            StorageError::NotFound(_) => ErrorKind::NotFound,
            StorageError::PermissionDenied(_) => ErrorKind::PermissionDenied,
            StorageError::NotADirectory(_)
            | StorageError::AlreadyExists(_)
            | StorageError::TypeMismatch { .. }
            | StorageError::InvalidRequest(_)
            | StorageError::Unsupported(_) => ErrorKind::InvalidRequest,
            StorageError::IoError { .. } => ErrorKind::IoError,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_classification() {
        let err = StorageError::from_io(
            "/missing.conf",
            std::io::Error::from(std::io::ErrorKind::NotFound),
        );
        assert!(matches!(err, StorageError::NotFound(ref p) if p == "/missing.conf"));
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = StorageError::from_io(
            "/locked.conf",
            std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        );
        assert_eq!(err.kind(), ErrorKind::PermissionDenied);

        let err = StorageError::from_io("/x", std::io::Error::other("disk on fire"));
        assert_eq!(err.kind(), ErrorKind::IoError);
    }

    #[test]
    fn test_sandbox_kind_passthrough() {
        let err = StorageError::from(PathGuardError::OutsideSandbox("../x".to_string()));
        assert_eq!(err.kind(), ErrorKind::SandboxViolation);
    }

    #[test]
    fn test_entry_wire_names() {
        let entry = Entry {
            name: "default".to_string(),
            path: "/sites-enabled/default".to_string(),
            is_directory: false,
            is_symlink: true,
            link_target: Some("../sites-available/default".to_string()),
            size_bytes: 26,
            modified_at: Utc::now(),
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["isDir"], false);
        assert_eq!(json["isSymlink"], true);
        assert_eq!(json["linkTarget"], "../sites-available/default");
        assert_eq!(json["size"], 26);
        assert!(json.get("modTime").is_some());
    }
}
