//! Upstream forwarder
//!
//! Turns an inbound request into a signed upstream request, sends it and
//! hands back the upstream response untouched.
//!
//! # Flow
//!
//! 1. Copy inbound headers, minus credentials and hop-by-hop framing
//! 2. Set `Host` to the virtual-hosted bucket endpoint
//! 3. Sign (a signing failure aborts; nothing is sent unsigned)
//! 4. Send with the shared `reqwest::Client`
//! 5. Buffer the response body and return status, headers and bytes
//!
//! Redirects are not followed: a `3xx` from upstream is relayed to the
//! caller like any other status.

use crate::config::{SignerKind, UpstreamConfig};
use crate::metrics;
use crate::request::ProxyRequest;
use crate::router::{ProxyTarget, UpstreamEndpoint};
use crate::signer::{Clock, Signer, SignerError, SystemClock};
use bytes::Bytes;
use hyper::header::{HeaderMap, HeaderValue, HOST};
use hyper::{Method, StatusCode};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::info;

/// Inbound headers that are never copied upstream.
///
/// `authorization` and `date` are recomputed by the signer; `host` and
/// `content-length` are derived from the target and the buffered body.
const STRIPPED_REQUEST_HEADERS: &[&str] = &[
    "authorization",
    "date",
    "host",
    "content-length",
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Upstream response headers that describe the upstream connection rather
/// than the payload.
const STRIPPED_RESPONSE_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Forwarding errors
#[derive(Error, Debug)]
pub enum UpstreamError {
    #[error("Client configuration error: {0}")]
    ClientError(String),

    #[error("Invalid upstream request: {0}")]
    InvalidRequest(String),

    #[error("Signing failed: {0}")]
    Signing(#[from] SignerError),

    #[error("Upstream request failed: {0}")]
    Request(#[source] reqwest::Error),

    #[error("Failed to read upstream response: {0}")]
    ResponseBody(#[source] reqwest::Error),
}

impl UpstreamError {
    /// Whether the failure happened before anything reached the network
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            UpstreamError::ClientError(_)
                | UpstreamError::InvalidRequest(_)
                | UpstreamError::Signing(_)
        )
    }
}

/// Response relayed back to the caller
#[derive(Debug)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Signs and sends requests to the storage service
pub struct Forwarder {
    client: reqwest::Client,
    endpoint: UpstreamEndpoint,
    signer: Arc<dyn Signer>,
    clock: Arc<dyn Clock>,
}

impl Forwarder {
    /// Create a forwarder with a default client for `config`
    pub fn new(config: &UpstreamConfig, signer: Arc<dyn Signer>) -> Result<Self, UpstreamError> {
        let client = Self::client_builder()
            .build()
            .map_err(|e| UpstreamError::ClientError(e.to_string()))?;

        Ok(Self::with_client(
            client,
            UpstreamEndpoint::from_config(config),
            signer,
        ))
    }

    /// Client settings the forwarder relies on. Default timeouts.
    pub fn client_builder() -> reqwest::ClientBuilder {
        reqwest::Client::builder().redirect(reqwest::redirect::Policy::none())
    }

    pub fn with_client(
        client: reqwest::Client,
        endpoint: UpstreamEndpoint,
        signer: Arc<dyn Signer>,
    ) -> Self {
        Self {
            client,
            endpoint,
            signer,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the signing clock
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn signer_kind(&self) -> SignerKind {
        self.signer.kind()
    }

    pub fn endpoint(&self) -> &UpstreamEndpoint {
        &self.endpoint
    }

    /// Build the unsigned upstream draft
    pub fn prepare(
        &self,
        method: Method,
        target: ProxyTarget,
        inbound_headers: &HeaderMap,
        body: Bytes,
    ) -> Result<ProxyRequest, UpstreamError> {
        let mut headers = HeaderMap::with_capacity(inbound_headers.len() + 4);
        for (name, value) in inbound_headers.iter() {
            if STRIPPED_REQUEST_HEADERS.contains(&name.as_str()) {
                continue;
            }
            headers.append(name.clone(), value.clone());
        }

        let host = HeaderValue::from_str(&self.endpoint.host(&target.bucket))
            .map_err(|e| UpstreamError::InvalidRequest(format!("bad host: {}", e)))?;
        headers.insert(HOST, host);

        Ok(ProxyRequest::new(method, target, headers, body))
    }

    /// Sign and send one request, returning the full upstream response
    #[tracing::instrument(
        name = "upstream.forward",
        skip(self, target, inbound_headers, body),
        fields(
            bucket = %target.bucket,
            http.method = %method,
            request.bytes = body.len(),
            http.status_code = tracing::field::Empty
        )
    )]
    pub async fn forward(
        &self,
        method: Method,
        target: ProxyTarget,
        inbound_headers: &HeaderMap,
        body: Bytes,
    ) -> Result<UpstreamResponse, UpstreamError> {
        let url = self.endpoint.url(&target);
        let url = reqwest::Url::parse(&url)
            .map_err(|e| UpstreamError::InvalidRequest(format!("{}: {}", url, e)))?;

        let mut request = self.prepare(method, target, inbound_headers, body)?;
        self.signer.sign(&mut request, self.clock.now())?;
        metrics::record_signature(self.signer.kind().as_str());

        info!(method = %request.method, target = %url, "Proxying request");

        let (method, headers, body) = request.into_parts();
        let start = Instant::now();

        let response = self
            .client
            .request(method.clone(), url)
            .headers(headers)
            .body(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_builder() {
                    UpstreamError::InvalidRequest(e.to_string())
                } else {
                    UpstreamError::Request(e)
                }
            })?;

        let status = response.status();
        let mut headers = response.headers().clone();
        for name in STRIPPED_RESPONSE_HEADERS {
            headers.remove(*name);
        }
        let body = response.bytes().await.map_err(UpstreamError::ResponseBody)?;

        metrics::record_upstream_duration(method.as_str(), start.elapsed().as_secs_f64());
        tracing::Span::current().record("http.status_code", status.as_u16());

        Ok(UpstreamResponse {
            status,
            headers,
            body,
        })
    }
}
