//! Configuration module for the OSS proxy
//!
//! Configuration is read once at startup, validated, and then shared
//! read-only with the router, signer and forwarder. Two sources are
//! supported:
//!
//! - A YAML file with `${VAR}` / `${VAR:-default}` expansion
//! - The `OSS_*` environment variables alone (no file)

use serde::Deserialize;
use std::fmt;
use std::net::SocketAddr;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

mod loader;

pub use loader::ConfigLoader;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Missing required setting: {0}")]
    Missing(&'static str),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Config {
    /// Load configuration from a YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        ConfigLoader::load(path)
    }

    /// Build configuration from the `OSS_*` process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        ConfigLoader::from_lookup(|name| std::env::var(name).ok())
    }

    /// Validate the configuration
    ///
    /// Credentials are checked here so that a misconfigured process never
    /// starts; signing itself assumes they are present.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.upstream.region.trim().is_empty() {
            return Err(ConfigError::Missing("upstream.region"));
        }
        if self.upstream.access_key.is_empty() {
            return Err(ConfigError::Missing("upstream.access_key"));
        }
        if self.upstream.secret_key.is_empty() {
            return Err(ConfigError::Missing("upstream.secret_key"));
        }
        if self.upstream.domain.trim().is_empty() {
            return Err(ConfigError::Missing("upstream.domain"));
        }

        match self.upstream.scheme.as_str() {
            "http" | "https" => {}
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid upstream scheme '{}': must be 'http' or 'https'",
                    other
                )))
            }
        }

        if self.upstream.signer == SignerKind::DerivedKey && self.upstream.service.is_empty() {
            return Err(ConfigError::ValidationError(
                "upstream.service cannot be empty for the v4 signer".into(),
            ));
        }

        self.server.address.parse::<SocketAddr>().map_err(|e| {
            ConfigError::ValidationError(format!(
                "Invalid server address '{}': {}",
                self.server.address, e
            ))
        })?;

        if self.server.max_body_bytes == Some(0) {
            return Err(ConfigError::ValidationError(
                "server.max_body_bytes must be greater than zero".into(),
            ));
        }

        if self.metrics.enabled {
            self.metrics.address.parse::<SocketAddr>().map_err(|e| {
                ConfigError::ValidationError(format!(
                    "Invalid metrics address '{}': {}",
                    self.metrics.address, e
                ))
            })?;
        }

        Ok(())
    }
}

/// Listener configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_server_address")]
    pub address: String,
    /// Upper bound for a buffered request body. Unlimited when unset.
    #[serde(default)]
    pub max_body_bytes: Option<usize>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: default_server_address(),
            max_body_bytes: None,
        }
    }
}

fn default_server_address() -> String {
    "0.0.0.0:9000".to_string()
}

/// Which signing scheme is applied to upstream requests
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub enum SignerKind {
    /// `AWS4-HMAC-SHA256` with a date/region/service derived key
    #[default]
    #[serde(rename = "v4")]
    DerivedKey,
    /// `OSS <ak>:<sig>` HMAC-SHA1 over the canonical string
    #[serde(rename = "v1")]
    SharedSecret,
}

impl SignerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignerKind::DerivedKey => "v4",
            SignerKind::SharedSecret => "v1",
        }
    }
}

impl fmt::Display for SignerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignerKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "v4" | "sigv4" | "derived-key" => Ok(SignerKind::DerivedKey),
            "v1" | "hmac-sha1" | "shared-secret" => Ok(SignerKind::SharedSecret),
            other => Err(ConfigError::ValidationError(format!(
                "Unknown signer '{}': must be 'v4' or 'v1'",
                other
            ))),
        }
    }
}

/// Upstream object storage configuration
#[derive(Clone, Deserialize)]
pub struct UpstreamConfig {
    /// Region segment of the upstream host, e.g. `oss-cn-hangzhou`
    pub region: String,
    pub access_key: String,
    pub secret_key: String,
    /// Route to `<bucket>.<region>-internal.<domain>` instead of the public host
    #[serde(default)]
    pub use_internal_endpoint: bool,
    #[serde(default)]
    pub signer: SignerKind,
    /// Service identifier in the v4 credential scope
    #[serde(default = "default_service")]
    pub service: String,
    #[serde(default = "default_scheme")]
    pub scheme: String,
    #[serde(default = "default_domain")]
    pub domain: String,
}

// The secret key must never reach a log line.
impl fmt::Debug for UpstreamConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpstreamConfig")
            .field("region", &self.region)
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .field("use_internal_endpoint", &self.use_internal_endpoint)
            .field("signer", &self.signer)
            .field("service", &self.service)
            .field("scheme", &self.scheme)
            .field("domain", &self.domain)
            .finish()
    }
}

pub(crate) fn default_service() -> String {
    "s3".to_string()
}

pub(crate) fn default_scheme() -> String {
    "https".to_string()
}

pub(crate) fn default_domain() -> String {
    "aliyuncs.com".to_string()
}

/// Metrics configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_metrics_address")]
    pub address: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            address: default_metrics_address(),
        }
    }
}

fn default_metrics_address() -> String {
    "0.0.0.0:9090".to_string()
}
