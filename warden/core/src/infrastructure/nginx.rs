// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! nginx Controller
//!
//! Syntax check (`nginx -t`) and reload (`nginx -s reload`). Both always
//! produce a [`CommandResult`]: spawn failures and timeouts surface as
//! `success: false` with a descriptive output rather than an error.

use crate::infrastructure::process::run_with_deadline;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::process::Command;
use tracing::{info, warn};

/// Combined output and success flag of an nginx invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResult {
    pub output: String,
    pub success: bool,
}

pub struct NginxController {
    /// Program and leading arguments, e.g. `["nginx"]` or `["sudo", "nginx"]`
    command: Vec<String>,
    deadline: Duration,
}

impl NginxController {
    pub fn new(command: Vec<String>, deadline: Duration) -> Self {
        Self { command, deadline }
    }

    /// Check configuration syntax
    pub async fn test(&self) -> CommandResult {
        self.run("test", &["-t"]).await
    }

    /// Signal the master process to reload its configuration
    pub async fn reload(&self) -> CommandResult {
        self.run("reload", &["-s", "reload"]).await
    }

    async fn run(&self, action: &'static str, args: &[&str]) -> CommandResult {
        let Some((program, prefix)) = self.command.split_first() else {
            return CommandResult {
                output: "nginx command is not configured".to_string(),
                success: false,
            };
        };

        let mut cmd = Command::new(program);
        cmd.args(prefix).args(args);

        let result = match run_with_deadline(cmd, self.deadline).await {
            Ok(out) => CommandResult {
                output: out.output,
                success: out.success,
            },
            Err(e) => {
                let mut output = e.captured_output().to_string();
                if !output.is_empty() && !output.ends_with('\n') {
                    output.push('\n');
                }
                output.push_str(&e.to_string());
                CommandResult {
                    output,
                    success: false,
                }
            }
        };

        if result.success {
            info!(action, "nginx {} succeeded", action);
        } else {
            warn!(action, output = %result.output, "nginx {} failed", action);
        }
        metrics::counter!(
            "warden_nginx_commands_total",
            "action" => action,
            "outcome" => if result.success { "ok" } else { "failed" }
        )
        .increment(1);

        result
    }
}
