// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Path Guard Domain Service
//!
//! Resolves user-supplied paths against the sandboxed root and rejects any
//! result that would escape it. Every file-touching operation passes its raw
//! path string through here before the first I/O call.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Enforces the root-confinement invariant for all file operations
//!
//! # Confinement
//!
//! Confinement is decided on path *components*, never on raw strings: with a
//! root of `/etc/nginx`, the path `/etc/nginx-evil/x` is outside the sandbox
//! even though the string starts with `/etc/nginx`.

use crate::domain::error::ErrorKind;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Default maximum accepted length of a user-supplied path
pub const DEFAULT_MAX_PATH_LEN: usize = 4096;

/// Symlink hops followed while checking a dangling link before giving up
const MAX_SYMLINK_HOPS: u8 = 40;

/// Path guard errors
#[derive(Debug, Error)]
pub enum PathGuardError {
    #[error("Path escapes sandbox: {0}")]
    OutsideSandbox(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Path too long: {0} bytes")]
    PathTooLong(usize),

    #[error("Sandbox root unavailable: {0}")]
    RootUnavailable(String),

    #[error("Cannot inspect {path}: {source}")]
    Inspect {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl PathGuardError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PathGuardError::OutsideSandbox(_) => ErrorKind::SandboxViolation,
            PathGuardError::InvalidPath(_) | PathGuardError::PathTooLong(_) => {
                ErrorKind::InvalidRequest
            }
            PathGuardError::RootUnavailable(_) => ErrorKind::IoError,
            PathGuardError::Inspect { source, .. } => match source.kind() {
                std::io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied,
                _ => ErrorKind::IoError,
            },
        }
    }
}

/// How the physical check treats the final path component
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymlinkPolicy {
    /// The operation dereferences the final component (read, write, list)
    FollowFinal,
    /// The operation acts on the entry itself (delete, rename, link creation)
    NoFollowFinal,
}

/// Path guard domain service
///
/// Holds the canonical sandbox root, established once at startup and
/// immutable afterwards.
///
/// # Security Guarantees
/// - `..` segments are resolved lexically and the result must stay under the root
/// - Leading separators are treated as root-relative, never as host-absolute
/// - NUL bytes and oversized paths are rejected
/// - [`PathGuard::confine`] additionally canonicalizes the deepest existing
///   ancestor so a symlink planted inside the root cannot redirect I/O outside it
#[derive(Debug, Clone)]
pub struct PathGuard {
    /// Canonical (absolute, symlink-free) sandbox root
    root: PathBuf,

    /// Maximum allowed user path length
    max_path_len: usize,
}

impl PathGuard {
    /// Establish a guard over an existing directory
    pub fn new(root: impl AsRef<Path>) -> Result<Self, PathGuardError> {
        Self::with_max_length(root, DEFAULT_MAX_PATH_LEN)
    }

    /// Establish a guard with a custom max path length
    pub fn with_max_length(
        root: impl AsRef<Path>,
        max_path_len: usize,
    ) -> Result<Self, PathGuardError> {
        let root = root.as_ref();
        let canonical = std::fs::canonicalize(root).map_err(|e| {
            PathGuardError::RootUnavailable(format!("{}: {}", root.display(), e))
        })?;

        if !canonical.is_dir() {
            return Err(PathGuardError::RootUnavailable(format!(
                "{} is not a directory",
                root.display()
            )));
        }

        Ok(Self {
            root: canonical,
            max_path_len,
        })
    }

    /// Canonical sandbox root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Lexically resolve a user path against the root
    ///
    /// Joins `user_path` onto the root, resolves `.` and `..` without touching
    /// the filesystem, and requires the root's components to be a prefix of the
    /// result's components.
    ///
    /// # Examples
    /// ```
    /// use warden_core::domain::path_guard::PathGuard;
    ///
    /// let dir = tempfile::tempdir().unwrap();
    /// let guard = PathGuard::new(dir.path()).unwrap();
    ///
    /// let safe = guard.resolve("conf.d/site.conf").unwrap();
    /// assert_eq!(safe, guard.root().join("conf.d/site.conf"));
    ///
    /// assert!(guard.resolve("../../etc/passwd").is_err());
    /// ```
    pub fn resolve(&self, user_path: &str) -> Result<PathBuf, PathGuardError> {
        if user_path.len() > self.max_path_len {
            return Err(PathGuardError::PathTooLong(user_path.len()));
        }

        if user_path.contains('\0') {
            tracing::warn!(path = %user_path.escape_debug(), "Path contains null byte");
            return Err(PathGuardError::InvalidPath(
                "Path contains null byte".to_string(),
            ));
        }

        // Host-absolute prefixes are stripped: "/ssl" means "<root>/ssl"
        let mut joined = self.root.clone();
        for component in Path::new(user_path).components() {
            match component {
                Component::Prefix(_) | Component::RootDir => {}
                other => joined.push(other.as_os_str()),
            }
        }

        let normalized = normalize(&joined);
        if !is_within(&normalized, &self.root) {
            metrics::counter!("warden_sandbox_violations_total").increment(1);
            tracing::warn!(path = %user_path, "Path escapes sandbox root");
            return Err(PathGuardError::OutsideSandbox(user_path.to_string()));
        }

        Ok(normalized)
    }

    /// Resolve a user path and verify it physically stays inside the root
    ///
    /// With [`SymlinkPolicy::FollowFinal`] the target itself is checked after
    /// symlink resolution; with [`SymlinkPolicy::NoFollowFinal`] only its parent
    /// chain is, so a link can be listed, renamed or deleted without being
    /// dereferenced.
    pub fn confine(
        &self,
        user_path: &str,
        policy: SymlinkPolicy,
    ) -> Result<PathBuf, PathGuardError> {
        let resolved = self.resolve(user_path)?;

        let probe = match policy {
            SymlinkPolicy::FollowFinal => resolved.clone(),
            SymlinkPolicy::NoFollowFinal if resolved == self.root => resolved.clone(),
            SymlinkPolicy::NoFollowFinal => resolved
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| self.root.clone()),
        };

        self.check_physical(probe, user_path, 0)?;
        Ok(resolved)
    }

    /// Whether an already-resolved path lies under `base` (component-wise)
    pub fn contains(base: &Path, path: &Path) -> bool {
        is_within(path, base)
    }

    /// Render an absolute in-sandbox path as a root-relative path (`/a/b`)
    ///
    /// The absolute root never appears in the result.
    pub fn to_sandbox_path(&self, absolute_path: &Path) -> Result<String, PathGuardError> {
        let relative = absolute_path.strip_prefix(&self.root).map_err(|_| {
            PathGuardError::OutsideSandbox(
                absolute_path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
            )
        })?;

        let mut rendered = String::from("/");
        let parts: Vec<_> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        rendered.push_str(&parts.join("/"));
        Ok(rendered)
    }

    /// Relative symlink target leading from `link_dir` to `target`
    ///
    /// Both paths must already be absolute and normalized.
    pub fn relative_link_target(link_dir: &Path, target: &Path) -> PathBuf {
        let from: Vec<_> = link_dir.components().collect();
        let to: Vec<_> = target.components().collect();

        let common = from
            .iter()
            .zip(to.iter())
            .take_while(|(a, b)| a == b)
            .count();

        let mut relative = PathBuf::new();
        for _ in common..from.len() {
            relative.push("..");
        }
        for component in &to[common..] {
            relative.push(component.as_os_str());
        }

        if relative.as_os_str().is_empty() {
            relative.push(".");
        }
        relative
    }

    fn check_physical(
        &self,
        probe: PathBuf,
        user_path: &str,
        hops: u8,
    ) -> Result<(), PathGuardError> {
        if hops > MAX_SYMLINK_HOPS {
            return Err(PathGuardError::InvalidPath(format!(
                "Too many levels of symbolic links: {}",
                user_path
            )));
        }

        let mut current = probe.as_path();
        loop {
            match std::fs::canonicalize(current) {
                Ok(real) => {
                    if is_within(&real, &self.root) {
                        return Ok(());
                    }
                    metrics::counter!("warden_sandbox_violations_total").increment(1);
                    tracing::warn!(path = %user_path, "Symlink redirects outside sandbox root");
                    return Err(PathGuardError::OutsideSandbox(user_path.to_string()));
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    // A dangling link still decides where a write would land
                    if let Ok(meta) = std::fs::symlink_metadata(current) {
                        if meta.file_type().is_symlink() {
                            let target = std::fs::read_link(current).map_err(|source| {
                                PathGuardError::Inspect {
                                    path: user_path.to_string(),
                                    source,
                                }
                            })?;
                            let base = current.parent().unwrap_or(&self.root);
                            let next = normalize(&base.join(target));
                            return self.check_physical(next, user_path, hops + 1);
                        }
                    }

                    current = match current.parent() {
                        Some(parent) => parent,
                        None => {
                            return Err(PathGuardError::OutsideSandbox(user_path.to_string()))
                        }
                    };
                }
                Err(source) => {
                    return Err(PathGuardError::Inspect {
                        path: user_path.to_string(),
                        source,
                    })
                }
            }
        }
    }
}

/// Lexically normalize an absolute path (`.` dropped, `..` pops)
fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => normalized.push(component),
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            Component::Normal(part) => normalized.push(part),
        }
    }
    normalized
}

/// Component-wise descendant check; `Path::starts_with` never matches partial names
fn is_within(path: &Path, root: &Path) -> bool {
    path.starts_with(root)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn guard() -> (TempDir, PathGuard) {
        let dir = TempDir::new().unwrap();
        let guard = PathGuard::new(dir.path()).unwrap();
        (dir, guard)
    }

    #[test]
    fn test_simple_path() {
        let (_dir, guard) = guard();
        let result = guard.resolve("sites-enabled/default").unwrap();
        assert_eq!(result, guard.root().join("sites-enabled/default"));
    }

    #[test]
    fn test_leading_slash_is_root_relative() {
        let (_dir, guard) = guard();
        let result = guard.resolve("/ssl/example.com.crt").unwrap();
        assert_eq!(result, guard.root().join("ssl/example.com.crt"));
    }

    #[test]
    fn test_empty_and_slash_resolve_to_root() {
        let (_dir, guard) = guard();
        assert_eq!(guard.resolve("").unwrap(), guard.root());
        assert_eq!(guard.resolve("/").unwrap(), guard.root());
    }

    #[test]
    fn test_reject_parent_dir_escape() {
        let (_dir, guard) = guard();
        let result = guard.resolve("../../etc/passwd");
        assert!(matches!(result, Err(PathGuardError::OutsideSandbox(_))));
    }

    #[test]
    fn test_inner_parent_dir_allowed() {
        let (_dir, guard) = guard();
        let result = guard.resolve("conf.d/../nginx.conf").unwrap();
        assert_eq!(result, guard.root().join("nginx.conf"));
    }

    #[test]
    fn test_reject_sibling_with_shared_prefix() {
        let parent = TempDir::new().unwrap();
        let root = parent.path().join("site");
        std::fs::create_dir(&root).unwrap();
        std::fs::create_dir(parent.path().join("site2")).unwrap();
        let guard = PathGuard::new(&root).unwrap();

        // "<parent>/site2/x" starts with "<parent>/site" as a string
        let result = guard.resolve("../site2/x");
        assert!(matches!(result, Err(PathGuardError::OutsideSandbox(_))));

        let result = guard.resolve("../site-other/x");
        assert!(matches!(result, Err(PathGuardError::OutsideSandbox(_))));
    }

    #[test]
    fn test_normalize_current_dir() {
        let (_dir, guard) = guard();
        let result = guard.resolve("./conf.d/./site.conf").unwrap();
        assert_eq!(result, guard.root().join("conf.d/site.conf"));
    }

    #[test]
    fn test_path_too_long() {
        let dir = TempDir::new().unwrap();
        let guard = PathGuard::with_max_length(dir.path(), 10).unwrap();
        let result = guard.resolve("very/long/path/that/exceeds/limit");
        assert!(matches!(result, Err(PathGuardError::PathTooLong(_))));
    }

    #[test]
    fn test_null_byte_rejected() {
        let (_dir, guard) = guard();
        let result = guard.resolve("conf\0.d");
        assert!(matches!(result, Err(PathGuardError::InvalidPath(_))));
        assert_eq!(result.unwrap_err().kind(), ErrorKind::InvalidRequest);
    }

    #[test]
    fn test_missing_root_rejected() {
        let dir = TempDir::new().unwrap();
        let result = PathGuard::new(dir.path().join("missing"));
        assert!(matches!(result, Err(PathGuardError::RootUnavailable(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_confine_rejects_symlinked_directory_outside_root() {
        let (_dir, guard) = guard();
        let outside = TempDir::new().unwrap();
        std::os::unix::fs::symlink(outside.path(), guard.root().join("escape")).unwrap();

        // Lexically fine, physically outside
        assert!(guard.resolve("escape/new.conf").is_ok());
        let result = guard.confine("escape/new.conf", SymlinkPolicy::FollowFinal);
        assert!(matches!(result, Err(PathGuardError::OutsideSandbox(_))));
        let result = guard.confine("escape/new.conf", SymlinkPolicy::NoFollowFinal);
        assert!(matches!(result, Err(PathGuardError::OutsideSandbox(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_confine_link_itself_without_following() {
        let (_dir, guard) = guard();
        let outside = TempDir::new().unwrap();
        std::os::unix::fs::symlink(outside.path(), guard.root().join("escape")).unwrap();

        assert!(guard.confine("escape", SymlinkPolicy::NoFollowFinal).is_ok());
        assert!(guard.confine("escape", SymlinkPolicy::FollowFinal).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_confine_rejects_dangling_link_pointing_outside() {
        let (_dir, guard) = guard();
        let outside = TempDir::new().unwrap();
        std::os::unix::fs::symlink(
            outside.path().join("not-yet-created"),
            guard.root().join("dangling"),
        )
        .unwrap();

        let result = guard.confine("dangling", SymlinkPolicy::FollowFinal);
        assert!(matches!(result, Err(PathGuardError::OutsideSandbox(_))));
    }

    #[test]
    fn test_to_sandbox_path() {
        let (_dir, guard) = guard();
        let abs = guard.root().join("ssl").join("example.com.crt");
        assert_eq!(guard.to_sandbox_path(&abs).unwrap(), "/ssl/example.com.crt");
        assert_eq!(guard.to_sandbox_path(guard.root()).unwrap(), "/");
    }

    #[test]
    fn test_relative_link_target() {
        let target = PathGuard::relative_link_target(
            Path::new("/etc/nginx/sites-enabled"),
            Path::new("/etc/nginx/sites-available/default"),
        );
        assert_eq!(target, PathBuf::from("../sites-available/default"));

        let same = PathGuard::relative_link_target(
            Path::new("/etc/nginx"),
            Path::new("/etc/nginx/nginx.conf"),
        );
        assert_eq!(same, PathBuf::from("nginx.conf"));
    }
}
