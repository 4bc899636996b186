//! Upstream credentials
//!
//! Loaded once from [`UpstreamConfig`] and shared read-only between
//! requests. The secret key is redacted in `Debug` output.

use crate::config::UpstreamConfig;
use std::fmt;
use thiserror::Error;

/// Credential loading errors
#[derive(Error, Debug)]
pub enum CredentialsError {
    #[error("Missing credentials: {0}")]
    MissingCredentials(String),
}

/// Access key, secret key and signing region
#[derive(Clone)]
pub struct Credentials {
    access_key_id: String,
    secret_access_key: String,
    region: String,
}

impl Credentials {
    pub fn new(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            region: region.into(),
        }
    }

    /// Build credentials from the upstream configuration.
    ///
    /// Empty keys are refused so that a signer can never be constructed
    /// without key material.
    pub fn from_config(config: &UpstreamConfig) -> Result<Self, CredentialsError> {
        if config.access_key.is_empty() {
            return Err(CredentialsError::MissingCredentials(
                "access_key not set".into(),
            ));
        }
        if config.secret_key.is_empty() {
            return Err(CredentialsError::MissingCredentials(
                "secret_key not set".into(),
            ));
        }

        Ok(Self::new(
            config.access_key.clone(),
            config.secret_key.clone(),
            config.region.clone(),
        ))
    }

    pub fn access_key_id(&self) -> &str {
        &self.access_key_id
    }

    pub fn secret_access_key(&self) -> &str {
        &self.secret_access_key
    }

    pub fn region(&self) -> &str {
        &self.region
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("region", &self.region)
            .finish()
    }
}
