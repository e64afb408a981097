// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod storage;
pub mod process;
pub mod operation_log;
pub mod tail;
pub mod nginx;
pub mod openssl;

pub use operation_log::OperationLog;
pub use process::{run_with_deadline, ProcessError, ProcessOutput};
pub use nginx::{CommandResult, NginxController};
pub use openssl::OpensslCertificateReader;
