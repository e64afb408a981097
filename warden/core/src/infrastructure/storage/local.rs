// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Local Filesystem Store
//!
//! [`FileStore`] over the host filesystem, confined to the sandbox root.
//!
//! Every operation resolves its caller-supplied paths through the shared
//! [`PathGuard`] before the first I/O call. Operations that dereference the
//! target (list, read, write, create) use [`SymlinkPolicy::FollowFinal`];
//! operations acting on the entry itself (delete, rename, move source, link
//! creation) use [`SymlinkPolicy::NoFollowFinal`].

use crate::domain::path_guard::{PathGuard, SymlinkPolicy};
use crate::domain::storage::{Entry, FileStore, StorageError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, info};

/// Local filesystem store
pub struct LocalFileStore {
    guard: Arc<PathGuard>,
}

impl LocalFileStore {
    pub fn new(guard: Arc<PathGuard>) -> Self {
        Self { guard }
    }

    fn reject_root(&self, resolved: &Path, path: &str, operation: &str) -> Result<(), StorageError> {
        if resolved == self.guard.root() {
            return Err(StorageError::InvalidRequest(format!(
                "refusing to {} the sandbox root ({})",
                operation, path
            )));
        }
        Ok(())
    }

    async fn list_inner(&self, path: &str) -> Result<Vec<Entry>, StorageError> {
        let dir = self.guard.confine(path, SymlinkPolicy::FollowFinal)?;

        let metadata = tokio::fs::metadata(&dir)
            .await
            .map_err(|e| StorageError::from_io(path, e))?;
        if !metadata.is_dir() {
            return Err(StorageError::NotADirectory(path.to_string()));
        }

        let mut reader = tokio::fs::read_dir(&dir)
            .await
            .map_err(|e| StorageError::from_io(path, e))?;

        let mut entries = Vec::new();
        while let Some(dir_entry) = reader
            .next_entry()
            .await
            .map_err(|e| StorageError::from_io(path, e))?
        {
            // Does not traverse symlinks
            let metadata = match dir_entry.metadata().await {
                Ok(m) => m,
                Err(e) => {
                    debug!(path = %path, error = %e, "Skipping unreadable entry");
                    continue;
                }
            };

            let entry_path = dir_entry.path();
            let is_symlink = metadata.file_type().is_symlink();
            let link_target = if is_symlink {
                tokio::fs::read_link(&entry_path)
                    .await
                    .ok()
                    .map(|t| t.to_string_lossy().into_owned())
            } else {
                None
            };

            entries.push(Entry {
                name: dir_entry.file_name().to_string_lossy().into_owned(),
                path: self.guard.to_sandbox_path(&entry_path)?,
                is_directory: metadata.is_dir(),
                is_symlink,
                link_target,
                size_bytes: metadata.len(),
                modified_at: DateTime::<Utc>::from(
                    metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
                ),
            });
        }

        Ok(entries)
    }

    async fn read_inner(&self, path: &str) -> Result<Vec<u8>, StorageError> {
        let file = self.guard.confine(path, SymlinkPolicy::FollowFinal)?;
        tokio::fs::read(&file)
            .await
            .map_err(|e| StorageError::from_io(path, e))
    }

    async fn write_inner(&self, path: &str, content: &[u8]) -> Result<(), StorageError> {
        let file = self.guard.confine(path, SymlinkPolicy::FollowFinal)?;
        tokio::fs::write(&file, content)
            .await
            .map_err(|e| StorageError::from_io(path, e))?;

        info!(path = %path, bytes = content.len(), "File written");
        Ok(())
    }

    async fn create_inner(&self, path: &str, is_directory: bool) -> Result<(), StorageError> {
        let target = self.guard.confine(path, SymlinkPolicy::FollowFinal)?;

        match tokio::fs::metadata(&target).await {
            Ok(existing) if existing.is_dir() == is_directory => {
                debug!(path = %path, "Create target already exists");
                return Ok(());
            }
            Ok(existing) => {
                return Err(StorageError::TypeMismatch {
                    path: path.to_string(),
                    existing: if existing.is_dir() { "directory" } else { "file" },
                });
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(StorageError::from_io(path, e)),
        }

        if is_directory {
            tokio::fs::create_dir_all(&target)
                .await
                .map_err(|e| StorageError::from_io(path, e))?;
        } else {
            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| StorageError::from_io(path, e))?;
            }
            match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&target)
                .await
            {
                Ok(_) => {}
                // Lost a race with another creator; same outcome
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
                Err(e) => return Err(StorageError::from_io(path, e)),
            }
        }

        info!(path = %path, is_directory, "Entry created");
        Ok(())
    }

    async fn delete_inner(&self, path: &str) -> Result<(), StorageError> {
        let target = self.guard.confine(path, SymlinkPolicy::NoFollowFinal)?;
        self.reject_root(&target, path, "delete")?;

        let metadata = match tokio::fs::symlink_metadata(&target).await {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path, "Delete target already absent");
                return Ok(());
            }
            Err(e) => return Err(StorageError::from_io(path, e)),
        };

        let result = if metadata.is_dir() {
            tokio::fs::remove_dir_all(&target).await
        } else {
            tokio::fs::remove_file(&target).await
        };

        match result {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(StorageError::from_io(path, e)),
        }

        info!(path = %path, "Entry deleted");
        Ok(())
    }

    async fn rename_inner(&self, old_path: &str, new_path: &str) -> Result<(), StorageError> {
        let from = self.guard.confine(old_path, SymlinkPolicy::NoFollowFinal)?;
        let to = self.guard.confine(new_path, SymlinkPolicy::NoFollowFinal)?;
        self.reject_root(&from, old_path, "rename")?;
        self.reject_root(&to, new_path, "replace")?;

        tokio::fs::rename(&from, &to)
            .await
            .map_err(|e| StorageError::from_io(old_path, e))?;

        info!(from = %old_path, to = %new_path, "Entry renamed");
        Ok(())
    }

    async fn move_inner(&self, source_path: &str, target_path: &str) -> Result<String, StorageError> {
        let source = self.guard.confine(source_path, SymlinkPolicy::NoFollowFinal)?;
        self.reject_root(&source, source_path, "move")?;

        let target = self.guard.confine(target_path, SymlinkPolicy::NoFollowFinal)?;
        let target_is_dir = match tokio::fs::metadata(&target).await {
            Ok(m) => m.is_dir(),
            Err(_) => false,
        };

        let destination = if target_is_dir {
            // Re-check the directory itself now that it will be entered
            let dir = self.guard.confine(target_path, SymlinkPolicy::FollowFinal)?;
            let base = source.file_name().ok_or_else(|| {
                StorageError::InvalidRequest(format!("source has no name: {}", source_path))
            })?;
            dir.join(base)
        } else {
            self.reject_root(&target, target_path, "replace")?;
            target
        };

        tokio::fs::rename(&source, &destination)
            .await
            .map_err(|e| StorageError::from_io(source_path, e))?;

        let landed = self.guard.to_sandbox_path(&destination)?;
        info!(from = %source_path, to = %landed, "Entry moved");
        Ok(landed)
    }

    async fn symlink_inner(&self, link_path: &str, target: &str) -> Result<(), StorageError> {
        let link = self.guard.confine(link_path, SymlinkPolicy::NoFollowFinal)?;
        self.reject_root(&link, link_path, "replace")?;

        if target.is_empty() {
            return Err(StorageError::InvalidRequest(
                "symlink target is required".to_string(),
            ));
        }

        // Root-relative targets are rewritten relative to the link's directory;
        // relative targets are stored as given and checked when dereferenced.
        let stored = if target.starts_with('/') {
            let absolute = self.guard.resolve(target)?;
            let link_dir = link.parent().unwrap_or(self.guard.root());
            PathGuard::relative_link_target(link_dir, &absolute)
        } else {
            std::path::PathBuf::from(target)
        };

        create_symlink(&stored, &link)
            .await
            .map_err(|e| StorageError::from_io(link_path, e))?;

        info!(link = %link_path, target = %stored.display(), "Symlink created");
        Ok(())
    }
}

#[cfg(unix)]
async fn create_symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    tokio::fs::symlink(target, link).await
}

#[cfg(not(unix))]
async fn create_symlink(_target: &Path, _link: &Path) -> std::io::Result<()> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "symbolic links are only supported on unix hosts",
    ))
}

/// Count an operation outcome and pass the result through
fn observe<T>(operation: &'static str, result: Result<T, StorageError>) -> Result<T, StorageError> {
    let outcome = match &result {
        Ok(_) => "ok",
        Err(e) => e.kind().as_str(),
    };
    metrics::counter!(
        "warden_file_operations_total",
        "operation" => operation,
        "outcome" => outcome
    )
    .increment(1);
    result
}

#[async_trait]
impl FileStore for LocalFileStore {
    async fn list(&self, path: &str) -> Result<Vec<Entry>, StorageError> {
        observe("list", self.list_inner(path).await)
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>, StorageError> {
        observe("read", self.read_inner(path).await)
    }

    async fn write(&self, path: &str, content: &[u8]) -> Result<(), StorageError> {
        observe("write", self.write_inner(path, content).await)
    }

    async fn create(&self, path: &str, is_directory: bool) -> Result<(), StorageError> {
        observe("create", self.create_inner(path, is_directory).await)
    }

    async fn delete(&self, path: &str) -> Result<(), StorageError> {
        observe("delete", self.delete_inner(path).await)
    }

    async fn rename(&self, old_path: &str, new_path: &str) -> Result<(), StorageError> {
        observe("rename", self.rename_inner(old_path, new_path).await)
    }

    async fn move_entry(
        &self,
        source_path: &str,
        target_path: &str,
    ) -> Result<String, StorageError> {
        observe("move", self.move_inner(source_path, target_path).await)
    }

    async fn create_symlink(&self, link_path: &str, target: &str) -> Result<(), StorageError> {
        observe("symlink", self.symlink_inner(link_path, target).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::error::ErrorKind;
    use tempfile::TempDir;

    fn store() -> (TempDir, LocalFileStore) {
        let temp_dir = TempDir::new().unwrap();
        let guard = Arc::new(PathGuard::new(temp_dir.path()).unwrap());
        (temp_dir, LocalFileStore::new(guard))
    }

    #[tokio::test]
    async fn test_write_then_read_roundtrip() {
        let (_dir, store) = store();

        store.write("/nginx.conf", b"worker_processes 1;\n").await.unwrap();
        assert_eq!(store.read("nginx.conf").await.unwrap(), b"worker_processes 1;\n");

        store.write("/empty.conf", b"").await.unwrap();
        assert!(store.read("/empty.conf").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_write_replaces_content_in_full() {
        let (_dir, store) = store();

        store.write("a.conf", b"a much longer original body").await.unwrap();
        store.write("a.conf", b"short").await.unwrap();
        assert_eq!(store.read("a.conf").await.unwrap(), b"short");
    }

    #[tokio::test]
    async fn test_write_does_not_create_parents() {
        let (dir, store) = store();

        let result = store.write("/missing/site.conf", b"x").await;
        assert!(matches!(result, Err(StorageError::NotFound(_))));
        assert!(!dir.path().join("missing").exists());
    }

    #[tokio::test]
    async fn test_read_missing_is_not_found() {
        let (_dir, store) = store();
        let err = store.read("/nope.conf").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_create_directory_idempotent() {
        let (dir, store) = store();

        store.create("/conf.d/extra", true).await.unwrap();
        store.create("/conf.d/extra", true).await.unwrap();
        assert!(dir.path().join("conf.d/extra").is_dir());
    }

    #[tokio::test]
    async fn test_create_file_with_parents_keeps_existing_content() {
        let (dir, store) = store();

        store.create("/sites-available/new.conf", false).await.unwrap();
        assert!(dir.path().join("sites-available/new.conf").is_file());

        store.write("/sites-available/new.conf", b"server {}").await.unwrap();
        store.create("/sites-available/new.conf", false).await.unwrap();
        assert_eq!(store.read("/sites-available/new.conf").await.unwrap(), b"server {}");
    }

    #[tokio::test]
    async fn test_create_type_mismatch() {
        let (_dir, store) = store();

        store.create("/thing", true).await.unwrap();
        let result = store.create("/thing", false).await;
        assert!(matches!(result, Err(StorageError::TypeMismatch { existing: "directory", .. })));
    }

    #[tokio::test]
    async fn test_list_reports_entries() {
        let (_dir, store) = store();

        store.create("/conf.d", true).await.unwrap();
        store.write("/conf.d/a.conf", b"abc").await.unwrap();
        store.create("/conf.d/sub", true).await.unwrap();

        let mut entries = store.list("/conf.d").await.unwrap();
        entries.sort_by(|a, b| a.name.cmp(&b.name));

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "a.conf");
        assert_eq!(entries[0].path, "/conf.d/a.conf");
        assert_eq!(entries[0].size_bytes, 3);
        assert!(!entries[0].is_directory);
        assert!(entries[1].is_directory);
        assert_eq!(entries[1].path, "/conf.d/sub");
    }

    #[tokio::test]
    async fn test_list_file_is_not_a_directory() {
        let (_dir, store) = store();
        store.write("/nginx.conf", b"").await.unwrap();

        let result = store.list("/nginx.conf").await;
        assert!(matches!(result, Err(StorageError::NotADirectory(_))));
    }

    #[tokio::test]
    async fn test_delete_missing_is_success() {
        let (_dir, store) = store();
        store.delete("/already-gone.conf").await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_directory_recursively() {
        let (dir, store) = store();
        store.create("/tree/branch", true).await.unwrap();
        store.write("/tree/branch/leaf.conf", b"x").await.unwrap();

        store.delete("/tree").await.unwrap();
        assert!(!dir.path().join("tree").exists());
    }

    #[tokio::test]
    async fn test_delete_root_refused() {
        let (dir, store) = store();
        store.write("/keep.conf", b"x").await.unwrap();

        for path in ["/", "", "conf.d/.."] {
            let err = store.delete(path).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidRequest);
        }
        assert!(dir.path().join("keep.conf").exists());
    }

    #[tokio::test]
    async fn test_rename() {
        let (dir, store) = store();
        store.write("/old.conf", b"x").await.unwrap();

        store.rename("/old.conf", "/new.conf").await.unwrap();
        assert!(!dir.path().join("old.conf").exists());
        assert!(dir.path().join("new.conf").exists());
    }

    #[tokio::test]
    async fn test_move_into_existing_directory() {
        let (dir, store) = store();
        store.write("/site.conf", b"x").await.unwrap();
        store.create("/sites-available", true).await.unwrap();

        let landed = store.move_entry("/site.conf", "/sites-available").await.unwrap();
        assert_eq!(landed, "/sites-available/site.conf");
        assert!(dir.path().join("sites-available/site.conf").is_file());
        assert!(dir.path().join("sites-available").is_dir());
    }

    #[tokio::test]
    async fn test_move_to_new_name() {
        let (dir, store) = store();
        store.write("/site.conf", b"x").await.unwrap();

        let landed = store.move_entry("/site.conf", "/renamed.conf").await.unwrap();
        assert_eq!(landed, "/renamed.conf");
        assert!(dir.path().join("renamed.conf").is_file());
    }

    #[tokio::test]
    async fn test_escapes_rejected_without_side_effects() {
        let parent = TempDir::new().unwrap();
        let root = parent.path().join("site");
        std::fs::create_dir(&root).unwrap();
        let store = LocalFileStore::new(Arc::new(PathGuard::new(&root).unwrap()));

        let err = store.write("../site2/x", b"pwned").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SandboxViolation);
        assert!(!parent.path().join("site2").exists());

        let err = store.create("../../outside", true).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SandboxViolation);

        std::fs::write(parent.path().join("victim"), b"x").unwrap();
        let err = store.delete("../victim").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SandboxViolation);
        assert!(parent.path().join("victim").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlink_absolute_target_is_rewritten_relative() {
        let (dir, store) = store();
        store.create("/sites-available", true).await.unwrap();
        store.create("/sites-enabled", true).await.unwrap();
        store.write("/sites-available/default", b"server {}").await.unwrap();

        store
            .create_symlink("/sites-enabled/default", "/sites-available/default")
            .await
            .unwrap();

        let target = std::fs::read_link(dir.path().join("sites-enabled/default")).unwrap();
        assert_eq!(target, std::path::PathBuf::from("../sites-available/default"));
        assert_eq!(store.read("/sites-enabled/default").await.unwrap(), b"server {}");

        let entries = store.list("/sites-enabled").await.unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].is_symlink);
        assert_eq!(entries[0].link_target.as_deref(), Some("../sites-available/default"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_relative_symlink_escape_caught_on_access() {
        let parent = TempDir::new().unwrap();
        let root = parent.path().join("root");
        std::fs::create_dir(&root).unwrap();
        std::fs::write(parent.path().join("secret"), b"top secret").unwrap();
        let store = LocalFileStore::new(Arc::new(PathGuard::new(&root).unwrap()));

        // Stored verbatim at creation time
        store.create_symlink("/peek", "../secret").await.unwrap();

        let err = store.read("/peek").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SandboxViolation);

        let err = store.write("/peek", b"overwrite").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SandboxViolation);
        assert_eq!(std::fs::read(parent.path().join("secret")).unwrap(), b"top secret");

        // The link itself can still be removed
        store.delete("/peek").await.unwrap();
        assert!(parent.path().join("secret").exists());
    }
}
