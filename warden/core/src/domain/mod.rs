// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Mod
//!
//! Domain types and rules shared by every warden component.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Implements mod

pub mod error;
pub mod path_guard;
pub mod storage;
pub mod log_directive;
pub mod certificate;
pub mod issuance;
pub mod config;
