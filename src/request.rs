//! Outbound request draft shared by the forwarder and the signers

use crate::router::ProxyTarget;
use bytes::Bytes;
use hyper::header::{HeaderMap, HeaderName, HeaderValue};
use hyper::Method;

/// A request on its way upstream.
///
/// Signers add headers but never see a mutable body: the signature covers a
/// digest of these exact bytes.
#[derive(Debug, Clone)]
pub struct ProxyRequest {
    pub method: Method,
    pub target: ProxyTarget,
    pub headers: HeaderMap,
    body: Bytes,
}

impl ProxyRequest {
    pub fn new(method: Method, target: ProxyTarget, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            method,
            target,
            headers,
            body,
        }
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// First value of `name` as a string, empty when absent or not UTF-8
    pub fn header_str(&self, name: &HeaderName) -> &str {
        self.headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
    }

    /// Replace any existing values of `name`
    pub fn set_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.headers.insert(name, value);
    }

    pub fn into_parts(self) -> (Method, HeaderMap, Bytes) {
        (self.method, self.headers, self.body)
    }
}
