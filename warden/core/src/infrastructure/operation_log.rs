// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Operation Log
//!
//! Append-only audit trail for certificate issuance. Each entry is one line:
//!
//! ```text
//! 2026-03-01T12:00:00.000000000+00:00: [3f0c...] Executing ACME client
//! ```
//!
//! Continuation lines of multi-line messages (captured process output) are
//! indented by four spaces. The file is never truncated or rotated here.

use chrono::Utc;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

/// Shared append-only operation log
pub struct OperationLog {
    path: PathBuf,
    /// Serializes appends so concurrent requests never interleave within an entry
    write_lock: Mutex<()>,
}

impl OperationLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one entry tagged with the operation id
    ///
    /// The entry is mirrored to the tracing subscriber even when the file
    /// write fails.
    pub async fn append(&self, operation_id: &Uuid, message: &str) -> std::io::Result<()> {
        info!(operation_id = %operation_id, "{}", message);

        let entry = format!(
            "{}: [{}] {}\n",
            Utc::now().to_rfc3339(),
            operation_id,
            message.trim_end().replace('\n', "\n    ")
        );

        let _guard = self.write_lock.lock().await;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(entry.as_bytes()).await?;
        file.flush().await
    }

    /// Append, downgrading a write failure to a warning
    pub async fn record(&self, operation_id: &Uuid, message: &str) {
        if let Err(e) = self.append(operation_id, message).await {
            warn!(
                path = %self.path.display(),
                error = %e,
                "Failed to append to operation log"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_entries_are_appended() {
        let dir = TempDir::new().unwrap();
        let log = OperationLog::new(dir.path().join("logs/cert-obtain.log"));
        let id = Uuid::new_v4();

        log.append(&id, "first").await.unwrap();
        log.append(&id, "second").await.unwrap();

        let content = std::fs::read_to_string(log.path()).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with(&format!("[{}] first", id)));
        assert!(lines[1].ends_with(&format!("[{}] second", id)));
    }

    #[tokio::test]
    async fn test_existing_content_is_kept() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ops.log");
        std::fs::write(&path, "earlier entry\n").unwrap();

        let log = OperationLog::new(&path);
        log.append(&Uuid::new_v4(), "later entry").await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("earlier entry\n"));
        assert!(content.contains("later entry"));
    }

    #[tokio::test]
    async fn test_multiline_message_is_indented() {
        let dir = TempDir::new().unwrap();
        let log = OperationLog::new(dir.path().join("ops.log"));

        log.append(&Uuid::new_v4(), "output:\nline one\nline two\n")
            .await
            .unwrap();

        let content = std::fs::read_to_string(log.path()).unwrap();
        assert!(content.contains("output:\n    line one\n    line two\n"));
    }

    #[tokio::test]
    async fn test_concurrent_appends_do_not_interleave() {
        let dir = TempDir::new().unwrap();
        let log = Arc::new(OperationLog::new(dir.path().join("ops.log")));

        let mut handles = Vec::new();
        for worker in 0..8 {
            let log = log.clone();
            handles.push(tokio::spawn(async move {
                let id = Uuid::new_v4();
                for n in 0..25 {
                    log.append(&id, &format!("worker {} step {}", worker, n))
                        .await
                        .unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let content = std::fs::read_to_string(log.path()).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 200);
        assert!(lines.iter().all(|l| l.contains("] worker ")));
    }
}
