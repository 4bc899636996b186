//! Shared-secret signer (`OSS <AccessKeyId>:<Signature>`)
//!
//! ```text
//! StringToSign = VERB \n Content-MD5 \n Content-Type \n Date \n
//!                CanonicalizedHeaders CanonicalizedResource
//! Signature    = Base64(HMAC-SHA1(AccessKeySecret, StringToSign))
//! ```

use super::{Credentials, Signer, SignerError};
use crate::config::SignerKind;
use crate::request::ProxyRequest;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use hyper::header::{HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE, DATE};
use percent_encoding::percent_decode_str;
use sha1::Sha1;
use std::sync::Arc;

type HmacSha1 = Hmac<Sha1>;

pub const SCHEME_TAG: &str = "OSS";
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

const CONTENT_MD5: HeaderName = HeaderName::from_static("content-md5");

const HTTP_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// Query parameters that name an operation and so belong to the resource.
/// Kept sorted.
const SUB_RESOURCES: &[&str] = &[
    "acl",
    "append",
    "bucketInfo",
    "callback",
    "callback-var",
    "cname",
    "comp",
    "continuation-token",
    "cors",
    "delete",
    "encryption",
    "endTime",
    "img",
    "inventory",
    "inventoryId",
    "lifecycle",
    "live",
    "location",
    "logging",
    "objectMeta",
    "partNumber",
    "policy",
    "position",
    "qos",
    "referer",
    "replication",
    "replicationLocation",
    "replicationProgress",
    "requestPayment",
    "response-cache-control",
    "response-content-disposition",
    "response-content-encoding",
    "response-content-language",
    "response-content-type",
    "response-expires",
    "restore",
    "security-token",
    "sequential",
    "startTime",
    "stat",
    "status",
    "style",
    "styleName",
    "symlink",
    "tagging",
    "uploadId",
    "uploads",
    "versionId",
    "versioning",
    "versions",
    "website",
    "worm",
    "wormExtend",
    "wormId",
    "x-oss-process",
];

/// Signs the canonical string directly with the secret key
pub struct SharedSecretSigner {
    credentials: Arc<Credentials>,
}

impl SharedSecretSigner {
    pub fn new(credentials: Arc<Credentials>) -> Self {
        Self { credentials }
    }
}

impl Signer for SharedSecretSigner {
    fn kind(&self) -> SignerKind {
        SignerKind::SharedSecret
    }

    #[tracing::instrument(
        name = "signer.v1",
        skip(self, request),
        fields(bucket = %request.target.bucket, method = %request.method)
    )]
    fn sign(&self, request: &mut ProxyRequest, now: DateTime<Utc>) -> Result<(), SignerError> {
        // One timestamp feeds both the header and the signature.
        let date = http_date(now);

        // The default must be in place before canonicalization.
        if !request.headers.contains_key(CONTENT_TYPE) {
            request.set_header(CONTENT_TYPE, HeaderValue::from_static(DEFAULT_CONTENT_TYPE));
        }

        let resource = canonicalized_resource(
            &request.target.bucket,
            &request.target.object,
            request.target.raw_query.as_deref(),
        );
        let string_to_sign = canonical_string(
            request.method.as_str(),
            request.header_str(&CONTENT_MD5),
            request.header_str(&CONTENT_TYPE),
            &date,
            &canonicalized_headers(request),
            &resource,
        );
        let signature = signature(self.credentials.secret_access_key(), &string_to_sign);

        tracing::debug!(resource = %resource, "Computed v1 signature");

        let authorization = format!(
            "{} {}:{}",
            SCHEME_TAG,
            self.credentials.access_key_id(),
            signature
        );
        request.set_header(
            AUTHORIZATION,
            HeaderValue::from_str(&authorization)
                .map_err(|e| SignerError::InvalidComputedHeader(e.to_string()))?,
        );
        request.set_header(
            DATE,
            HeaderValue::from_str(&date)
                .map_err(|e| SignerError::InvalidComputedHeader(e.to_string()))?,
        );

        Ok(())
    }
}

/// RFC 1123 date in GMT, e.g. `Sun, 06 Nov 1994 08:49:37 GMT`
pub fn http_date(now: DateTime<Utc>) -> String {
    now.format(HTTP_DATE_FORMAT).to_string()
}

/// Provider metadata headers do not take part in the signature yet; the
/// component is always empty.
fn canonicalized_headers(_request: &ProxyRequest) -> String {
    String::new()
}

pub fn canonical_string(
    method: &str,
    content_md5: &str,
    content_type: &str,
    date: &str,
    canonicalized_headers: &str,
    canonicalized_resource: &str,
) -> String {
    format!(
        "{}\n{}\n{}\n{}\n{}{}",
        method, content_md5, content_type, date, canonicalized_headers, canonicalized_resource
    )
}

/// `/<bucket>/<object>` plus any sub-resources from the query, sorted.
///
/// The service signs the decoded object name, so `a%20b` appears as `a b`.
/// Only the canonical string is decoded; the request path is sent as is.
pub fn canonicalized_resource(bucket: &str, object: &str, raw_query: Option<&str>) -> String {
    let object = percent_decode_str(object).decode_utf8_lossy();
    let mut resource = format!("/{}/{}", bucket, object);

    let Some(raw_query) = raw_query else {
        return resource;
    };

    let mut sub_resources: Vec<(&str, Option<String>)> = raw_query
        .split('&')
        .filter_map(|pair| {
            let (key, value) = match pair.split_once('=') {
                Some((key, value)) => (key, Some(value)),
                None => (pair, None),
            };
            SUB_RESOURCES.binary_search(&key).ok().map(|_| {
                let value = value.map(|v| percent_decode_str(v).decode_utf8_lossy().into_owned());
                (key, value)
            })
        })
        .collect();
    sub_resources.sort();

    for (i, (key, value)) in sub_resources.iter().enumerate() {
        resource.push(if i == 0 { '?' } else { '&' });
        resource.push_str(key);
        if let Some(value) = value {
            resource.push('=');
            resource.push_str(value);
        }
    }

    resource
}

pub fn signature(secret: &str, string_to_sign: &str) -> String {
    let mut mac =
        HmacSha1::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(string_to_sign.as_bytes());
    BASE64.encode(mac.finalize().into_bytes())
}
