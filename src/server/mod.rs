//! HTTP server module
//!
//! Accepts client connections and hands every request to the proxy handler.

use crate::router::RouterError;
use crate::signer::CredentialsError;
use crate::upstream::UpstreamError;
use hyper::StatusCode;
use thiserror::Error;

pub mod proxy;

pub use proxy::{ProxyServer, ProxyState};

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Failed to bind to address: {0}")]
    BindError(String),

    #[error("Invalid credentials: {0}")]
    Credentials(#[from] CredentialsError),

    #[error("Failed to build upstream client: {0}")]
    Upstream(#[from] UpstreamError),

    #[error("Server error: {0}")]
    RuntimeError(String),
}

/// Per-request failures, each mapped to the status the caller sees
#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("{0}")]
    BadRequest(#[from] RouterError),

    #[error("Failed to read request body: {0}")]
    BodyRead(String),

    #[error("Request body exceeds {0} bytes")]
    PayloadTooLarge(usize),

    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::BadRequest(_) | ProxyError::BodyRead(_) => StatusCode::BAD_REQUEST,
            ProxyError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ProxyError::Upstream(e) if e.is_local() => StatusCode::INTERNAL_SERVER_ERROR,
            ProxyError::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// Label for the errors counter
    pub fn kind(&self) -> &'static str {
        match self {
            ProxyError::BadRequest(_) => "bad_request",
            ProxyError::BodyRead(_) => "body_read",
            ProxyError::PayloadTooLarge(_) => "payload_too_large",
            ProxyError::Upstream(UpstreamError::Signing(_)) => "signing",
            ProxyError::Upstream(e) if e.is_local() => "request_build",
            ProxyError::Upstream(_) => "upstream",
        }
    }
}
