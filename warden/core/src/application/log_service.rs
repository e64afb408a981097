// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Log Application Service
//!
//! Locates the nginx access and error logs from the active configuration and
//! serves the tail of those logs and of the issuance operation log.

use crate::domain::config::{LogsConfig, NginxConfig};
use crate::domain::log_directive::{find_directive, LogDirective, LogStream};
use crate::domain::path_guard::{PathGuard, SymlinkPolicy};
use crate::infrastructure::tail::read_last_lines;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Finds where nginx writes a log stream
///
/// Looks in the primary configuration inside the sandbox root, then in the
/// system configuration, then falls back to a fixed default per stream.
pub struct LogDirectiveLocator {
    guard: Arc<PathGuard>,
    primary_config: PathBuf,
    system_config: PathBuf,
    default_access: PathBuf,
    default_error: PathBuf,
}

impl LogDirectiveLocator {
    pub fn new(guard: Arc<PathGuard>, nginx: &NginxConfig) -> Self {
        Self {
            guard,
            primary_config: nginx.primary_config.clone(),
            system_config: nginx.system_config.clone(),
            default_access: nginx.default_access_log.clone(),
            default_error: nginx.default_error_log.clone(),
        }
    }

    pub async fn locate(&self, stream: LogStream) -> LogDirective {
        let directive = stream.directive();

        for config in self.candidates() {
            let Ok(text) = tokio::fs::read_to_string(&config).await else {
                continue;
            };
            let config_dir = config.parent().unwrap_or(Path::new("/"));
            if let Some(path) = find_directive(&text, directive, config_dir) {
                debug!(directive, config = %config.display(), path = %path.display(), "Log directive located");
                return LogDirective {
                    directive_name: directive.to_string(),
                    resolved_path: path,
                };
            }
        }

        let fallback = match stream {
            LogStream::Access => self.default_access.clone(),
            LogStream::Error => self.default_error.clone(),
        };
        debug!(directive, path = %fallback.display(), "Using default log location");
        LogDirective {
            directive_name: directive.to_string(),
            resolved_path: fallback,
        }
    }

    fn candidates(&self) -> Vec<PathBuf> {
        let mut candidates = Vec::with_capacity(2);
        match self
            .guard
            .confine(&self.primary_config.to_string_lossy(), SymlinkPolicy::FollowFinal)
        {
            Ok(primary) => candidates.push(primary),
            Err(e) => debug!(error = %e, "Primary nginx config not usable"),
        }
        candidates.push(self.system_config.clone());
        candidates
    }
}

/// Tails the nginx logs and the issuance operation log
pub struct LogService {
    locator: LogDirectiveLocator,
    operation_log: PathBuf,
    limits: LogsConfig,
}

impl LogService {
    pub fn new(locator: LogDirectiveLocator, limits: LogsConfig) -> Self {
        Self {
            locator,
            operation_log: limits.operation_log.clone(),
            limits,
        }
    }

    pub async fn access_log(&self, lines: Option<usize>) -> String {
        let directive = self.locator.locate(LogStream::Access).await;
        read_last_lines(
            directive.resolved_path,
            lines.unwrap_or(self.limits.access_lines),
        )
        .await
    }

    pub async fn error_log(&self, lines: Option<usize>) -> String {
        let directive = self.locator.locate(LogStream::Error).await;
        read_last_lines(
            directive.resolved_path,
            lines.unwrap_or(self.limits.error_lines),
        )
        .await
    }

    pub async fn operation_log(&self, lines: Option<usize>) -> String {
        read_last_lines(
            self.operation_log.clone(),
            lines.unwrap_or(self.limits.operation_lines),
        )
        .await
    }
}
