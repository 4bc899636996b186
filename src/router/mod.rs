//! Path router
//!
//! Maps `/<bucket>/<object>` request paths onto the virtual-hosted upstream
//! form `<bucket>.<region>[-internal].<domain>/<object>`.
//!
//! Paths are never decoded or normalized here. Object keys are arbitrary
//! byte sequences to the storage service, so the bytes the client sent are
//! the bytes that go upstream.
//!
//! The one exception is `.` and `..` segments, literal or percent-encoded.
//! URL parsing resolves them, so the key sent would differ from the key
//! requested. Such paths are rejected.

use crate::config::UpstreamConfig;
use percent_encoding::percent_decode_str;
use thiserror::Error;

/// Router errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum RouterError {
    #[error("missing bucket")]
    MissingBucket,

    #[error("path contains a dot segment: {0}")]
    DotSegment(String),
}

/// Bucket, object key and query of one proxied request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyTarget {
    pub bucket: String,
    /// Object key, possibly empty for bucket-level operations
    pub object: String,
    /// Raw query string without the leading `?`
    pub raw_query: Option<String>,
}

impl ProxyTarget {
    /// Parse a request path and raw query.
    ///
    /// The path is split on the first separator only, so `a/b/c.txt` stays
    /// one object key.
    pub fn parse(path: &str, query: Option<&str>) -> Result<Self, RouterError> {
        let path = path.strip_prefix('/').unwrap_or(path);
        let mut parts = path.splitn(2, '/');

        let bucket = match parts.next() {
            Some(bucket) if !bucket.is_empty() => bucket.to_string(),
            _ => return Err(RouterError::MissingBucket),
        };
        let object = parts.next().unwrap_or_default().to_string();

        if is_dot_segment(&bucket) || object.split('/').any(is_dot_segment) {
            return Err(RouterError::DotSegment(format!("/{}", path)));
        }

        Ok(Self {
            bucket,
            object,
            raw_query: query.filter(|q| !q.is_empty()).map(str::to_string),
        })
    }

    /// Upstream request path, always starting with `/`
    pub fn upstream_path(&self) -> String {
        format!("/{}", self.object)
    }
}

/// `.` or `..`, including `%2e` spellings
fn is_dot_segment(segment: &str) -> bool {
    let decoded: Vec<u8> = percent_decode_str(segment).collect();
    decoded == b"." || decoded == b".."
}

/// Upstream host layout
#[derive(Debug, Clone)]
pub struct UpstreamEndpoint {
    scheme: String,
    region: String,
    domain: String,
    use_internal: bool,
}

impl UpstreamEndpoint {
    pub fn new(
        scheme: impl Into<String>,
        region: impl Into<String>,
        domain: impl Into<String>,
        use_internal: bool,
    ) -> Self {
        Self {
            scheme: scheme.into(),
            region: region.into(),
            domain: domain.into(),
            use_internal,
        }
    }

    pub fn from_config(config: &UpstreamConfig) -> Self {
        Self::new(
            config.scheme.clone(),
            config.region.clone(),
            config.domain.clone(),
            config.use_internal_endpoint,
        )
    }

    /// `<bucket>.<region>[-internal].<domain>`
    pub fn host(&self, bucket: &str) -> String {
        let suffix = if self.use_internal { "-internal" } else { "" };
        format!("{}.{}{}.{}", bucket, self.region, suffix, self.domain)
    }

    /// Full upstream URL, query appended verbatim
    pub fn url(&self, target: &ProxyTarget) -> String {
        let mut url = format!(
            "{}://{}{}",
            self.scheme,
            self.host(&target.bucket),
            target.upstream_path()
        );
        if let Some(query) = &target.raw_query {
            url.push('?');
            url.push_str(query);
        }
        url
    }
}
