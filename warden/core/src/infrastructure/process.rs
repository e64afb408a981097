// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! External Process Runner
//!
//! Spawn-then-race execution of external tools (`nginx`, `openssl`, the ACME
//! client) against a deadline.
//!
//! The child is started in its own process group. When the deadline expires
//! the whole group is sent `SIGKILL`, so helpers forked by the tool (`curl`,
//! `dig`, ...) do not outlive it while holding credentials in their
//! environment. Output produced before the kill is preserved. The same
//! happens when the runner itself is dropped before the child is reaped,
//! e.g. because the caller that awaited it went away.
//!
//! stdout and stderr are captured into a single buffer in arrival order,
//! mirroring what an operator sees in a terminal.

use crate::domain::error::ErrorKind;
use parking_lot::Mutex;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Time allowed for the output pumps to drain after the child is gone
const DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Result of a process that ran to completion
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    /// Combined stdout and stderr
    pub output: String,
    /// `None` when the process was terminated by a signal
    pub exit_code: Option<i32>,
    pub success: bool,
    pub duration: Duration,
}

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed waiting on {program}: {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} timed out after {deadline:?}")]
    TimedOut {
        program: String,
        deadline: Duration,
        /// Output captured before the process was killed
        output: String,
    },
}

impl ProcessError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProcessError::Spawn { .. } | ProcessError::Wait { .. } => {
                ErrorKind::ExternalProcessFailure
            }
            ProcessError::TimedOut { .. } => ErrorKind::ExternalProcessTimeout,
        }
    }

    /// Output captured before the failure, if any
    pub fn captured_output(&self) -> &str {
        match self {
            ProcessError::TimedOut { output, .. } => output,
            _ => "",
        }
    }
}

/// Run `command` to completion or until `deadline` expires
///
/// A non-zero exit is not an error here; callers inspect
/// [`ProcessOutput::success`]. On expiry the process group is killed and
/// reaped before [`ProcessError::TimedOut`] is returned.
pub async fn run_with_deadline(
    mut command: Command,
    deadline: Duration,
) -> Result<ProcessOutput, ProcessError> {
    let program = command
        .as_std()
        .get_program()
        .to_string_lossy()
        .into_owned();

    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    #[cfg(unix)]
    command.process_group(0);

    let started = Instant::now();
    let mut child = command.spawn().map_err(|source| ProcessError::Spawn {
        program: program.clone(),
        source,
    })?;

    let mut group = ProcessGroup { pgid: child.id() };

    let buffer = Arc::new(Mutex::new(Vec::new()));
    let mut pumps = Vec::with_capacity(2);
    if let Some(stdout) = child.stdout.take() {
        pumps.push(pump(stdout, buffer.clone()));
    }
    if let Some(stderr) = child.stderr.take() {
        pumps.push(pump(stderr, buffer.clone()));
    }

    debug!(program = %program, pid = ?child.id(), deadline = ?deadline, "Process started");

    match tokio::time::timeout(deadline, child.wait()).await {
        Ok(Ok(status)) => {
            group.release();
            drain(pumps).await;
            let output = String::from_utf8_lossy(&buffer.lock()).into_owned();
            debug!(program = %program, status = %status, "Process exited");
            Ok(ProcessOutput {
                output,
                exit_code: status.code(),
                success: status.success(),
                duration: started.elapsed(),
            })
        }
        Ok(Err(source)) => {
            group.kill();
            drain(pumps).await;
            Err(ProcessError::Wait { program, source })
        }
        Err(_) => {
            warn!(program = %program, deadline = ?deadline, "Deadline exceeded, killing process group");

            group.kill();
            if let Err(e) = child.kill().await {
                debug!(program = %program, error = %e, "Child already gone");
            }

            drain(pumps).await;
            let output = String::from_utf8_lossy(&buffer.lock()).into_owned();
            Err(ProcessError::TimedOut {
                program,
                deadline,
                output,
            })
        }
    }
}

/// Process group led by a spawned child
///
/// Killed on drop unless released after the child was reaped.
struct ProcessGroup {
    pgid: Option<u32>,
}

impl ProcessGroup {
    fn kill(&mut self) {
        if let Some(pgid) = self.pgid.take() {
            #[cfg(unix)]
            kill_group(pgid);
            #[cfg(not(unix))]
            let _ = pgid;
        }
    }

    fn release(&mut self) {
        self.pgid = None;
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        if self.pgid.is_some() {
            debug!(pgid = ?self.pgid, "Runner dropped before the process exited, killing its group");
            self.kill();
        }
    }
}

fn pump<R>(mut reader: R, buffer: Arc<Mutex<Vec<u8>>>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut chunk = [0u8; 4096];
        loop {
            match reader.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => buffer.lock().extend_from_slice(&chunk[..n]),
            }
        }
    })
}

/// Wait for the pumps; a surviving grandchild may keep a pipe open
async fn drain(pumps: Vec<JoinHandle<()>>) {
    for handle in pumps {
        let abort = handle.abort_handle();
        if tokio::time::timeout(DRAIN_GRACE, handle).await.is_err() {
            abort.abort();
        }
    }
}

#[cfg(unix)]
fn kill_group(pid: u32) {
    // The child leads its own group, so its pid is the group id
    unsafe {
        if libc::kill(-(pid as i32), libc::SIGKILL) != 0 {
            debug!(pgid = pid, "Process group already gone");
        }
    }
}
