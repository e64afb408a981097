// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Warden Configuration Types
//
// Defines the configuration schema for an nginx warden instance:
// - Kubernetes-style manifest format (apiVersion/kind/metadata/spec)
// - Sandbox root and path limits
// - nginx binary and log locations
// - ACME client invocation and deadlines
// - Certificate and operation log locations

use crate::domain::issuance::AcmeProfile;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

pub const API_VERSION: &str = "nginx-warden/v1";
pub const KIND: &str = "WardenConfig";

/// Top-level Kubernetes-style warden configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WardenConfigManifest {
    /// API version (must be "nginx-warden/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "WardenConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    #[serde(default)]
    pub spec: WardenConfigSpec,
}

/// Manifest metadata (Kubernetes-style)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WardenConfigSpec {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub sandbox: SandboxConfig,

    #[serde(default)]
    pub nginx: NginxConfig,

    #[serde(default)]
    pub acme: AcmeConfig,

    #[serde(default)]
    pub certificates: CertificatesConfig,

    #[serde(default)]
    pub logs: LogsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// Directory every file operation is confined to
    #[serde(default = "default_root")]
    pub root: PathBuf,

    /// Longest accepted user-supplied path, in bytes
    #[serde(default = "default_max_path_length")]
    pub max_path_length: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NginxConfig {
    /// Program and leading arguments used for `-t` and `-s reload`
    #[serde(default = "default_nginx_command")]
    pub command: Vec<String>,

    #[serde(default = "default_nginx_deadline", with = "humantime_serde")]
    pub deadline: Duration,

    /// Configuration file looked up inside the sandbox root first
    #[serde(default = "default_primary_config")]
    pub primary_config: PathBuf,

    /// Fallback configuration outside the sandbox
    #[serde(default = "default_system_config")]
    pub system_config: PathBuf,

    #[serde(default = "default_access_log")]
    pub default_access_log: PathBuf,

    #[serde(default = "default_error_log")]
    pub default_error_log: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcmeConfig {
    /// Program and leading arguments of the ACME client
    #[serde(default = "default_acme_command")]
    pub command: Vec<String>,

    /// Client working directory holding its per-domain stores
    #[serde(default = "default_acme_home")]
    pub home: PathBuf,

    /// Document root served for http-01 challenges
    #[serde(default = "default_webroot")]
    pub webroot: PathBuf,

    #[serde(default = "default_production_server")]
    pub production_server: String,

    #[serde(default = "default_staging_server")]
    pub staging_server: String,

    /// Deadline for http-01 and tls-alpn-01
    #[serde(default = "default_short_deadline", with = "humantime_serde")]
    pub short_deadline: Duration,

    /// Deadline for dns-01
    #[serde(default = "default_long_deadline", with = "humantime_serde")]
    pub long_deadline: Duration,

    #[serde(default = "default_true")]
    pub debug: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertificatesConfig {
    /// Certificate directory, relative to the sandbox root
    #[serde(default = "default_cert_directory")]
    pub directory: PathBuf,

    /// Program and leading arguments of the X.509 text reader
    #[serde(default = "default_openssl_command")]
    pub openssl_command: Vec<String>,

    #[serde(default = "default_openssl_deadline", with = "humantime_serde")]
    pub reader_deadline: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogsConfig {
    /// Append-only issuance audit log
    #[serde(default = "default_operation_log")]
    pub operation_log: PathBuf,

    #[serde(default = "default_access_lines")]
    pub access_lines: usize,

    #[serde(default = "default_error_lines")]
    pub error_lines: usize,

    #[serde(default = "default_operation_lines")]
    pub operation_lines: usize,
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_root() -> PathBuf {
    PathBuf::from("/etc/nginx")
}

fn default_max_path_length() -> usize {
    crate::domain::path_guard::DEFAULT_MAX_PATH_LEN
}

fn default_nginx_command() -> Vec<String> {
    vec!["nginx".to_string()]
}

fn default_nginx_deadline() -> Duration {
    Duration::from_secs(30)
}

fn default_primary_config() -> PathBuf {
    PathBuf::from("nginx.conf")
}

fn default_system_config() -> PathBuf {
    PathBuf::from("/etc/nginx/nginx.conf")
}

fn default_access_log() -> PathBuf {
    PathBuf::from("/var/log/nginx/access.log")
}

fn default_error_log() -> PathBuf {
    PathBuf::from("/var/log/nginx/error.log")
}

fn default_acme_command() -> Vec<String> {
    vec!["acme.sh".to_string()]
}

fn default_acme_home() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".acme.sh"))
        .unwrap_or_else(|| PathBuf::from("/root/.acme.sh"))
}

fn default_webroot() -> PathBuf {
    PathBuf::from("/var/www/html")
}

fn default_production_server() -> String {
    "letsencrypt".to_string()
}

fn default_staging_server() -> String {
    "letsencrypt_test".to_string()
}

fn default_short_deadline() -> Duration {
    Duration::from_secs(2 * 60)
}

fn default_long_deadline() -> Duration {
    Duration::from_secs(10 * 60)
}

fn default_cert_directory() -> PathBuf {
    PathBuf::from("ssl")
}

fn default_openssl_command() -> Vec<String> {
    vec!["openssl".to_string()]
}

fn default_openssl_deadline() -> Duration {
    Duration::from_secs(10)
}

fn default_operation_log() -> PathBuf {
    PathBuf::from("/var/log/cert-obtain.log")
}

fn default_access_lines() -> usize {
    100
}

fn default_error_lines() -> usize {
    100
}

fn default_operation_lines() -> usize {
    500
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            max_path_length: default_max_path_length(),
        }
    }
}

impl Default for NginxConfig {
    fn default() -> Self {
        Self {
            command: default_nginx_command(),
            deadline: default_nginx_deadline(),
            primary_config: default_primary_config(),
            system_config: default_system_config(),
            default_access_log: default_access_log(),
            default_error_log: default_error_log(),
        }
    }
}

impl Default for AcmeConfig {
    fn default() -> Self {
        Self {
            command: default_acme_command(),
            home: default_acme_home(),
            webroot: default_webroot(),
            production_server: default_production_server(),
            staging_server: default_staging_server(),
            short_deadline: default_short_deadline(),
            long_deadline: default_long_deadline(),
            debug: true,
        }
    }
}

impl Default for CertificatesConfig {
    fn default() -> Self {
        Self {
            directory: default_cert_directory(),
            openssl_command: default_openssl_command(),
            reader_deadline: default_openssl_deadline(),
        }
    }
}

impl Default for LogsConfig {
    fn default() -> Self {
        Self {
            operation_log: default_operation_log(),
            access_lines: default_access_lines(),
            error_lines: default_error_lines(),
            operation_lines: default_operation_lines(),
        }
    }
}

impl Default for WardenConfigManifest {
    fn default() -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: "nginx-warden".to_string(),
                labels: None,
            },
            spec: WardenConfigSpec::default(),
        }
    }
}

impl AcmeConfig {
    pub fn profile(&self) -> AcmeProfile {
        AcmeProfile {
            debug: self.debug,
            webroot: self.webroot.clone(),
            production_server: self.production_server.clone(),
            staging_server: self.staging_server.clone(),
        }
    }
}

impl WardenConfigManifest {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to YAML file
    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Parse configuration from YAML string
    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. WARDEN_CONFIG_PATH environment variable
    /// 2. ./warden-config.yaml (working directory)
    /// 3. ~/.warden/config.yaml (user home)
    /// 4. /etc/warden/config.yaml (system)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("WARDEN_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./warden-config.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".warden").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        let system_config = PathBuf::from("/etc/warden/config.yaml");
        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // Explicit CLI path (fail if missing/invalid)
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path).map_err(|e| {
                anyhow::anyhow!("Failed to load config at {:?}: {}", path, e)
            })?;
            config.apply_env_overrides();
            return Ok(config);
        }

        if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            let mut config = Self::from_yaml_file(&config_path).map_err(|e| {
                anyhow::anyhow!("Failed to load config at {:?}: {}", config_path, e)
            })?;
            config.apply_env_overrides();
            Ok(config)
        } else {
            tracing::warn!("No configuration file found in standard locations. Using defaults.");
            let mut config = Self::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("WARDEN_ROOT") {
            if !val.is_empty() {
                tracing::info!("Environment override: WARDEN_ROOT={}", val);
                self.spec.sandbox.root = PathBuf::from(val);
            }
        }

        if let Ok(val) = std::env::var("WARDEN_OPERATION_LOG") {
            if !val.is_empty() {
                tracing::info!("Environment override: WARDEN_OPERATION_LOG={}", val);
                self.spec.logs.operation_log = PathBuf::from(val);
            }
        }

        if let Ok(val) = std::env::var("WARDEN_ACME_HOME") {
            if !val.is_empty() {
                tracing::info!("Environment override: WARDEN_ACME_HOME={}", val);
                self.spec.acme.home = PathBuf::from(val);
            }
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!(
                "Invalid apiVersion: '{}'. Must be '{}'",
                self.api_version,
                API_VERSION
            );
        }

        if self.kind != KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, KIND);
        }

        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        if !self.spec.sandbox.root.is_absolute() {
            anyhow::bail!(
                "spec.sandbox.root must be absolute: {:?}",
                self.spec.sandbox.root
            );
        }

        if self.spec.sandbox.max_path_length == 0 {
            anyhow::bail!("spec.sandbox.max_path_length must be positive");
        }

        if self.spec.nginx.command.is_empty() {
            anyhow::bail!("spec.nginx.command cannot be empty");
        }

        if self.spec.acme.command.is_empty() {
            anyhow::bail!("spec.acme.command cannot be empty");
        }

        if self.spec.certificates.openssl_command.is_empty() {
            anyhow::bail!("spec.certificates.openssl_command cannot be empty");
        }

        let cert_dir = &self.spec.certificates.directory;
        if cert_dir.as_os_str().is_empty()
            || cert_dir.is_absolute()
            || cert_dir
                .components()
                .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            anyhow::bail!(
                "spec.certificates.directory must be a relative path inside the root: {:?}",
                cert_dir
            );
        }

        for (name, deadline) in [
            ("spec.nginx.deadline", self.spec.nginx.deadline),
            ("spec.acme.short_deadline", self.spec.acme.short_deadline),
            ("spec.acme.long_deadline", self.spec.acme.long_deadline),
            ("spec.certificates.reader_deadline", self.spec.certificates.reader_deadline),
        ] {
            if deadline.is_zero() {
                anyhow::bail!("{} must be greater than zero", name);
            }
        }

        Ok(())
    }
}
