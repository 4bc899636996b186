//! Configuration loader with environment variable expansion

use super::{
    default_domain, default_scheme, default_service, Config, ConfigError, MetricsConfig,
    ServerConfig, SignerKind, UpstreamConfig,
};
use lazy_static::lazy_static;
use regex_lite::Regex;
use std::path::Path;

lazy_static! {
    // ${VAR} or ${VAR:-default}
    static ref ENV_VAR: Regex =
        Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]*))?\}").expect("valid env var pattern");
}

pub const ENV_REGION: &str = "OSS_REGION";
pub const ENV_ACCESS_KEY: &str = "OSS_ACCESS_KEY";
pub const ENV_SECRET_KEY: &str = "OSS_SECRET_KEY";
pub const ENV_USE_INTERNAL: &str = "OSS_USE_INTERNAL";
pub const ENV_SIGNER: &str = "OSS_SIGNER";
pub const ENV_LISTEN: &str = "OSS_LISTEN";
pub const ENV_DOMAIN: &str = "OSS_ENDPOINT_DOMAIN";
pub const ENV_MAX_BODY_BYTES: &str = "OSS_MAX_BODY_BYTES";

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content, |name| std::env::var(name).ok())
    }

    /// Parse YAML content, expanding variables through `lookup`
    pub fn from_yaml_str<F>(content: &str, lookup: F) -> Result<Config, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let expanded = Self::expand_env_vars(content, &lookup);
        let config: Config = serde_yaml::from_str(&expanded)?;
        config.validate()?;
        Ok(config)
    }

    /// Build configuration from `OSS_*` variables resolved through `lookup`
    pub fn from_lookup<F>(lookup: F) -> Result<Config, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &'static str| {
            lookup(name)
                .filter(|v| !v.is_empty())
                .ok_or(ConfigError::Missing(name))
        };

        let signer = match lookup(ENV_SIGNER) {
            Some(value) if !value.is_empty() => value.parse()?,
            _ => SignerKind::default(),
        };

        let max_body_bytes = match lookup(ENV_MAX_BODY_BYTES) {
            Some(value) if !value.is_empty() => Some(value.parse::<usize>().map_err(|e| {
                ConfigError::ValidationError(format!("{}: {}", ENV_MAX_BODY_BYTES, e))
            })?),
            _ => None,
        };

        let mut server = ServerConfig {
            max_body_bytes,
            ..ServerConfig::default()
        };
        if let Some(address) = lookup(ENV_LISTEN).filter(|v| !v.is_empty()) {
            server.address = address;
        }

        let config = Config {
            server,
            upstream: UpstreamConfig {
                region: required(ENV_REGION)?,
                access_key: required(ENV_ACCESS_KEY)?,
                secret_key: required(ENV_SECRET_KEY)?,
                use_internal_endpoint: lookup(ENV_USE_INTERNAL).as_deref() == Some("true"),
                signer,
                service: default_service(),
                scheme: default_scheme(),
                domain: lookup(ENV_DOMAIN)
                    .filter(|v| !v.is_empty())
                    .unwrap_or_else(default_domain),
            },
            metrics: MetricsConfig::default(),
        };

        config.validate()?;
        Ok(config)
    }

    /// Expand `${VAR}` and `${VAR:-default}`.
    ///
    /// A variable that is unset and has no default keeps its placeholder, so
    /// validation reports the setting instead of silently accepting "".
    fn expand_env_vars<F>(content: &str, lookup: &F) -> String
    where
        F: Fn(&str) -> Option<String>,
    {
        ENV_VAR
            .replace_all(content, |caps: &regex_lite::Captures<'_>| {
                match lookup(&caps[1]) {
                    Some(value) => value,
                    None => match caps.get(2) {
                        Some(default) => default.as_str().to_string(),
                        None => caps[0].to_string(),
                    },
                }
            })
            .into_owned()
    }
}
