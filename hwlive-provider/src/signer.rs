//! AK/SK request signing (`SDK-HMAC-SHA256`)
//!
//! Huawei Cloud API gateways authenticate requests with an HMAC over a
//! canonical form of the request:
//!
//! ```text
//! METHOD
//! /canonical/uri/
//! sorted=query&string=
//! lowercase-header:value
//! ...
//!
//! signed;header;names
//! hex(sha256(body))
//! ```

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::header::{AUTHORIZATION, HOST, HeaderValue};
use sha2::{Digest, Sha256};
use url::Url;

use crate::error::ClientError;

pub const ALGORITHM: &str = "SDK-HMAC-SHA256";
pub const HEADER_SDK_DATE: &str = "X-Sdk-Date";
const DATE_FORMAT: &str = "%Y%m%dT%H%M%SZ";

type HmacSha256 = Hmac<Sha256>;

/// Access key credentials
#[derive(Clone)]
pub struct Signer {
    access_key: String,
    secret_key: String,
}

impl std::fmt::Debug for Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signer")
            .field("access_key", &self.access_key)
            .finish_non_exhaustive()
    }
}

impl Signer {
    pub fn new(access_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            access_key: access_key.into(),
            secret_key: secret_key.into(),
        }
    }

    /// Sign a request in place
    ///
    /// Adds `Host` and `X-Sdk-Date`, rewrites the query string into its
    /// canonical order and sets `Authorization`. Every header present on the
    /// request at this point is signed.
    pub fn sign(&self, request: &mut reqwest::Request, now: DateTime<Utc>) -> Result<(), ClientError> {
        let date = now.format(DATE_FORMAT).to_string();
        let host = host_header(request.url());

        let query = canonical_query(request.url());
        request
            .url_mut()
            .set_query(if query.is_empty() { None } else { Some(&query) });

        let headers = request.headers_mut();
        headers.insert(HOST, HeaderValue::from_str(&host)?);
        headers.insert(HEADER_SDK_DATE, HeaderValue::from_str(&date)?);

        let mut signed: Vec<(String, String)> = request
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_ascii_lowercase(),
                    String::from_utf8_lossy(value.as_bytes()).trim().to_string(),
                )
            })
            .collect();
        signed.sort();

        let body = request
            .body()
            .and_then(|b| b.as_bytes())
            .unwrap_or_default();
        let canonical = canonical_request(
            request.method().as_str(),
            request.url(),
            &signed,
            body,
        );
        let signature = self.signature(&string_to_sign(&date, &canonical))?;

        let signed_headers = signed_header_names(&signed);
        let authorization = format!(
            "{} Access={}, SignedHeaders={}, Signature={}",
            ALGORITHM, self.access_key, signed_headers, signature
        );
        request
            .headers_mut()
            .insert(AUTHORIZATION, HeaderValue::from_str(&authorization)?);
        Ok(())
    }

    /// Hex HMAC-SHA256 of `string_to_sign` keyed with the secret key
    pub fn signature(&self, string_to_sign: &str) -> Result<String, ClientError> {
        let mut mac = HmacSha256::new_from_slice(self.secret_key.as_bytes())
            .map_err(|_| ClientError::Signing)?;
        mac.update(string_to_sign.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }
}

/// `host[:port]`, the port only when it is not the scheme default
fn host_header(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    }
}

/// Path with every segment percent-encoded, always ending with `/`
pub fn canonical_uri(path: &str) -> String {
    let mut uri = path
        .split('/')
        .map(|segment| {
            let decoded = urlencoding::decode(segment)
                .map(|s| s.into_owned())
                .unwrap_or_else(|_| segment.to_string());
            urlencoding::encode(&decoded).into_owned()
        })
        .collect::<Vec<_>>()
        .join("/");
    if !uri.ends_with('/') {
        uri.push('/');
    }
    uri
}

/// Query pairs sorted by key, then value, each side percent-encoded
pub fn canonical_query(url: &Url) -> String {
    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    pairs.sort();
    pairs
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

fn signed_header_names(headers: &[(String, String)]) -> String {
    headers
        .iter()
        .map(|(name, _)| name.as_str())
        .collect::<Vec<_>>()
        .join(";")
}

/// Canonical request for already lowercased, sorted headers
pub fn canonical_request(
    method: &str,
    url: &Url,
    headers: &[(String, String)],
    body: &[u8],
) -> String {
    let canonical_headers: String = headers
        .iter()
        .map(|(name, value)| format!("{}:{}\n", name, value))
        .collect();
    format!(
        "{}\n{}\n{}\n{}\n{}\n{}",
        method,
        canonical_uri(url.path()),
        canonical_query(url),
        canonical_headers,
        signed_header_names(headers),
        hex::encode(Sha256::digest(body))
    )
}

pub fn string_to_sign(date: &str, canonical_request: &str) -> String {
    format!(
        "{}\n{}\n{}",
        ALGORITHM,
        date,
        hex::encode(Sha256::digest(canonical_request.as_bytes()))
    )
}
