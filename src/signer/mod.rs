//! Request signing
//!
//! Both schemes implement [`Signer`] and are selected by configuration, so
//! one binary can talk to either API flavor:
//!
//! - [`DerivedKeySigner`]: `AWS4-HMAC-SHA256`, signing key derived from the
//!   secret through date, region and service
//! - [`SharedSecretSigner`]: `OSS <ak>:<sig>`, HMAC-SHA1 over a canonical
//!   string with the raw secret
//!
//! Signers mutate only the headers of a [`ProxyRequest`]. The timestamp is
//! passed in rather than read from the system clock so that signing is
//! reproducible.

use crate::config::{SignerKind, UpstreamConfig};
use crate::request::ProxyRequest;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;

pub mod credentials;
pub mod v1;
pub mod v4;

pub use credentials::{Credentials, CredentialsError};
pub use v1::SharedSecretSigner;
pub use v4::DerivedKeySigner;

/// Signing errors
#[derive(Error, Debug)]
pub enum SignerError {
    #[error("Header {0} has a value that cannot be canonicalized")]
    InvalidHeaderValue(String),

    #[error("Computed header is not a valid header value: {0}")]
    InvalidComputedHeader(String),
}

/// Adds authentication headers to an outbound request
pub trait Signer: Send + Sync {
    fn kind(&self) -> SignerKind;

    /// Sign `request` as of `now`. On error the request must not be sent.
    fn sign(&self, request: &mut ProxyRequest, now: DateTime<Utc>) -> Result<(), SignerError>;
}

/// Build the signer named by the configuration
pub fn build_signer(config: &UpstreamConfig) -> Result<Arc<dyn Signer>, CredentialsError> {
    let credentials = Arc::new(Credentials::from_config(config)?);
    let signer: Arc<dyn Signer> = match config.signer {
        SignerKind::DerivedKey => Arc::new(DerivedKeySigner::new(credentials, &config.service)),
        SignerKind::SharedSecret => Arc::new(SharedSecretSigner::new(credentials)),
    };
    Ok(signer)
}

/// Source of signing timestamps
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Always returns the same instant
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}
