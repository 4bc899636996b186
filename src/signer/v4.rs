//! Derived-key signer (`AWS4-HMAC-SHA256`)
//!
//! ```text
//! CanonicalRequest = Method \n CanonicalURI \n CanonicalQuery \n
//!                    CanonicalHeaders \n SignedHeaders \n HexPayloadHash
//! StringToSign     = "AWS4-HMAC-SHA256" \n AmzDate \n Scope \n Hex(SHA256(CanonicalRequest))
//! SigningKey       = HMAC(HMAC(HMAC(HMAC("AWS4" + secret, date), region), service), "aws4_request")
//! ```

use super::{Credentials, Signer, SignerError};
use crate::config::SignerKind;
use crate::request::ProxyRequest;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use hyper::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, HOST};
use percent_encoding::{percent_decode_str, percent_encode, AsciiSet, NON_ALPHANUMERIC};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::Arc;

type HmacSha256 = Hmac<Sha256>;

pub const ALGORITHM: &str = "AWS4-HMAC-SHA256";
pub const X_AMZ_DATE: &str = "x-amz-date";
pub const X_AMZ_CONTENT_SHA256: &str = "x-amz-content-sha256";

const AMZ_DATE_FORMAT: &str = "%Y%m%dT%H%M%SZ";
const SCOPE_DATE_FORMAT: &str = "%Y%m%d";

/// Headers that intermediaries may rewrite and are therefore left unsigned
const UNSIGNED_HEADERS: &[&str] = &[
    "authorization",
    "content-length",
    "expect",
    "user-agent",
    "x-amzn-trace-id",
];

/// RFC 3986 unreserved characters pass through, everything else is encoded
const URI_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Signs with a key derived from the secret for one day, region and service
pub struct DerivedKeySigner {
    credentials: Arc<Credentials>,
    service: String,
}

impl DerivedKeySigner {
    pub fn new(credentials: Arc<Credentials>, service: &str) -> Self {
        Self {
            credentials,
            service: service.to_string(),
        }
    }

    /// `<date>/<region>/<service>/aws4_request`
    pub fn credential_scope(&self, now: DateTime<Utc>) -> String {
        format!(
            "{}/{}/{}/aws4_request",
            now.format(SCOPE_DATE_FORMAT),
            self.credentials.region(),
            self.service
        )
    }
}

impl Signer for DerivedKeySigner {
    fn kind(&self) -> SignerKind {
        SignerKind::DerivedKey
    }

    #[tracing::instrument(
        name = "signer.v4",
        skip(self, request),
        fields(bucket = %request.target.bucket, method = %request.method)
    )]
    fn sign(&self, request: &mut ProxyRequest, now: DateTime<Utc>) -> Result<(), SignerError> {
        let amz_date = now.format(AMZ_DATE_FORMAT).to_string();
        let payload_hash = hex_sha256(request.body());

        request.set_header(
            HeaderName::from_static(X_AMZ_CONTENT_SHA256),
            header_value(&payload_hash)?,
        );
        request.set_header(HeaderName::from_static(X_AMZ_DATE), header_value(&amz_date)?);

        let (canonical_headers, signed_headers) = canonical_headers(&request.headers)?;
        let canonical_request = format!(
            "{}\n{}\n{}\n{}\n{}\n{}",
            request.method.as_str(),
            canonical_uri(&request.target.upstream_path()),
            canonical_query(request.target.raw_query.as_deref()),
            canonical_headers,
            signed_headers,
            payload_hash
        );

        let scope = self.credential_scope(now);
        let string_to_sign = string_to_sign(&amz_date, &scope, &canonical_request);
        let key = signing_key(
            self.credentials.secret_access_key(),
            &now.format(SCOPE_DATE_FORMAT).to_string(),
            self.credentials.region(),
            &self.service,
        );
        let signature = hex::encode(hmac_sha256(&key, string_to_sign.as_bytes()));

        tracing::debug!(
            canonical_request = %canonical_request,
            signed_headers = %signed_headers,
            "Computed v4 signature"
        );

        let authorization = format!(
            "{} Credential={}/{}, SignedHeaders={}, Signature={}",
            ALGORITHM,
            self.credentials.access_key_id(),
            scope,
            signed_headers,
            signature
        );
        request.set_header(AUTHORIZATION, header_value(&authorization)?);

        Ok(())
    }
}

fn header_value(value: &str) -> Result<HeaderValue, SignerError> {
    HeaderValue::from_str(value).map_err(|e| SignerError::InvalidComputedHeader(e.to_string()))
}

pub fn hex_sha256(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// Derive the signing key for one day, region and service
pub fn signing_key(secret: &str, date: &str, region: &str, service: &str) -> Vec<u8> {
    let k_date = hmac_sha256(format!("AWS4{}", secret).as_bytes(), date.as_bytes());
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, service.as_bytes());
    hmac_sha256(&k_service, b"aws4_request")
}

pub fn string_to_sign(amz_date: &str, scope: &str, canonical_request: &str) -> String {
    format!(
        "{}\n{}\n{}\n{}",
        ALGORITHM,
        amz_date,
        scope,
        hex_sha256(canonical_request.as_bytes())
    )
}

/// Decode each path segment, then encode it with the unreserved set.
///
/// Decoding per segment keeps an encoded `%2F` inside a key distinct from a
/// real separator.
pub fn canonical_uri(path: &str) -> String {
    if path.is_empty() {
        return "/".to_string();
    }

    path.split('/')
        .map(|segment| {
            let decoded: Vec<u8> = percent_decode_str(segment).collect();
            percent_encode(&decoded, URI_ENCODE_SET).to_string()
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Sorted `key=value` pairs joined by `&`, each side decoded then re-encoded.
///
/// A bare `key` becomes `key=`; `+` decodes to a space.
pub fn canonical_query(raw_query: Option<&str>) -> String {
    let Some(raw_query) = raw_query else {
        return String::new();
    };

    let mut pairs: Vec<(String, String)> = raw_query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            (encode_query_component(key), encode_query_component(value))
        })
        .collect();
    pairs.sort();

    pairs
        .into_iter()
        .map(|(key, value)| format!("{}={}", key, value))
        .collect::<Vec<_>>()
        .join("&")
}

fn encode_query_component(raw: &str) -> String {
    let plus_as_space = raw.replace('+', " ");
    let decoded: Vec<u8> = percent_decode_str(&plus_as_space).collect();
    percent_encode(&decoded, URI_ENCODE_SET).to_string()
}

/// Canonical header block and the `;`-joined signed header list.
///
/// Names are already lower-case in a `HeaderMap`. Values are trimmed with
/// inner whitespace runs collapsed, repeated headers joined with `,`.
pub fn canonical_headers(headers: &HeaderMap) -> Result<(String, String), SignerError> {
    let mut entries: BTreeMap<&str, Vec<String>> = BTreeMap::new();

    for (name, value) in headers.iter() {
        let name = name.as_str();
        if UNSIGNED_HEADERS.contains(&name) {
            continue;
        }
        let value = value
            .to_str()
            .map_err(|_| SignerError::InvalidHeaderValue(name.to_string()))?;
        entries
            .entry(name)
            .or_default()
            .push(value.split_whitespace().collect::<Vec<_>>().join(" "));
    }

    if !entries.contains_key(HOST.as_str()) {
        return Err(SignerError::InvalidHeaderValue(HOST.to_string()));
    }

    let mut canonical = String::new();
    for (name, values) in &entries {
        canonical.push_str(name);
        canonical.push(':');
        canonical.push_str(&values.join(","));
        canonical.push('\n');
    }
    let signed = entries.keys().copied().collect::<Vec<_>>().join(";");

    Ok((canonical, signed))
}
