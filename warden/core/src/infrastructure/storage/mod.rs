// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Storage Infrastructure Module
//!
//! Provides the concrete [`FileStore`] implementation backed by the host
//! filesystem.

pub mod local;

pub use local::LocalFileStore;

use crate::domain::path_guard::PathGuard;
use crate::domain::storage::FileStore;
use std::sync::Arc;

/// Create the file store for a sandbox guard
pub fn create_file_store(guard: Arc<PathGuard>) -> Arc<dyn FileStore> {
    Arc::new(LocalFileStore::new(guard))
}
