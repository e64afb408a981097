// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the warden CLI

pub mod certs;
pub mod config;
pub mod serve;

pub use self::certs::CertsCommand;
pub use self::config::ConfigCommand;

use anyhow::{Context, Result};
use std::path::PathBuf;
use warden_core::domain::config::WardenConfigManifest;

/// Global flags that take precedence over the configuration file
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub config: Option<PathBuf>,
    pub root: Option<PathBuf>,
    pub host: Option<String>,
    pub port: Option<u16>,
}

impl Overrides {
    /// Load the configuration and apply the command-line overrides
    pub fn load(&self) -> Result<WardenConfigManifest> {
        let mut config = WardenConfigManifest::load_or_default(self.config.clone())
            .context("Failed to load configuration")?;
        self.apply(&mut config);
        Ok(config)
    }

    fn apply(&self, config: &mut WardenConfigManifest) {
        if let Some(root) = &self.root {
            config.spec.sandbox.root = root.clone();
        }
        if let Some(host) = &self.host {
            config.spec.server.bind_address = host.clone();
        }
        if let Some(port) = self.port {
            config.spec.server.port = port;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_config() {
        let overrides = Overrides {
            root: Some(PathBuf::from("/srv/nginx")),
            port: Some(9090),
            ..Overrides::default()
        };
        let mut config = WardenConfigManifest::default();
        overrides.apply(&mut config);

        assert_eq!(config.spec.sandbox.root, PathBuf::from("/srv/nginx"));
        assert_eq!(config.spec.server.port, 9090);
        assert_eq!(config.spec.server.bind_address, "0.0.0.0");
    }
}
