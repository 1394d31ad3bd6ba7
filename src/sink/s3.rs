//! Minimal S3 `PutObject` client signed with AWS Signature Version 4

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

use super::ObjectStore;
use crate::config::S3Config;
use crate::error::UploadError;

type HmacSha256 = Hmac<Sha256>;

const DEFAULT_REGION: &str = "us-east-1";
const SERVICE: &str = "s3";

#[derive(Debug, Clone)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl Credentials {
    /// Read the standard `AWS_*` environment variables.
    pub fn from_env() -> Result<Self, UploadError> {
        let access_key_id = std::env::var("AWS_ACCESS_KEY_ID")
            .map_err(|_| UploadError::MissingCredential("AWS_ACCESS_KEY_ID"))?;
        let secret_access_key = std::env::var("AWS_SECRET_ACCESS_KEY")
            .map_err(|_| UploadError::MissingCredential("AWS_SECRET_ACCESS_KEY"))?;
        Ok(Self {
            access_key_id,
            secret_access_key,
            session_token: std::env::var("AWS_SESSION_TOKEN").ok().filter(|t| !t.is_empty()),
        })
    }
}

pub struct S3Client {
    agent: ureq::Agent,
    credentials: Credentials,
    region: String,
    endpoint: Option<String>,
}

impl S3Client {
    pub fn new(
        credentials: Credentials,
        region: impl Into<String>,
        endpoint: Option<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
            credentials,
            region: region.into(),
            endpoint: endpoint.map(|e| e.trim_end_matches('/').to_string()),
        }
    }

    /// Client from config plus environment credentials. Missing credentials
    /// fail here, before any upload is attempted.
    pub fn from_config(config: &S3Config, timeout: Duration) -> Result<Self, UploadError> {
        let credentials = Credentials::from_env()?;
        let region = config
            .region
            .clone()
            .or_else(|| std::env::var("AWS_REGION").ok())
            .or_else(|| std::env::var("AWS_DEFAULT_REGION").ok())
            .unwrap_or_else(|| DEFAULT_REGION.to_string());
        Ok(Self::new(credentials, region, config.endpoint.clone(), timeout))
    }

    /// Request URL and `Host` header for an object.
    fn locate(&self, bucket: &str, key: &str) -> (String, String, String) {
        let encoded_key = uri_encode(key, false);
        match &self.endpoint {
            Some(endpoint) => {
                let host = endpoint
                    .split_once("://")
                    .map(|(_, rest)| rest)
                    .unwrap_or(endpoint)
                    .split('/')
                    .next()
                    .unwrap_or_default()
                    .to_string();
                let path = format!("/{}/{}", uri_encode(bucket, true), encoded_key);
                (format!("{endpoint}{path}"), host, path)
            }
            None => {
                let host = format!("{bucket}.s3.{}.amazonaws.com", self.region);
                let path = format!("/{encoded_key}");
                (format!("https://{host}{path}"), host, path)
            }
        }
    }
}

impl ObjectStore for S3Client {
    fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: &[u8],
        content_type: &str,
        metadata: &[(&str, String)],
    ) -> Result<()> {
        let (url, host, path) = self.locate(bucket, key);
        let payload_hash = hex::encode(Sha256::digest(body));
        let now = Utc::now();

        let mut headers = BTreeMap::new();
        headers.insert("content-type".to_string(), content_type.to_string());
        headers.insert("host".to_string(), host);
        headers.insert("x-amz-content-sha256".to_string(), payload_hash.clone());
        headers.insert("x-amz-date".to_string(), amz_date(now));
        if let Some(token) = &self.credentials.session_token {
            headers.insert("x-amz-security-token".to_string(), token.clone());
        }
        for (name, value) in metadata {
            headers.insert(format!("x-amz-meta-{}", name.to_ascii_lowercase()), value.clone());
        }

        let authorization = authorization_header(
            &self.credentials,
            &self.region,
            now,
            "PUT",
            &path,
            &headers,
            &payload_hash,
        );

        debug!("PUT {}", url);
        let mut request = self.agent.put(&url).set("Authorization", &authorization);
        for (name, value) in &headers {
            // ureq derives Host from the URL.
            if name != "host" {
                request = request.set(name, value);
            }
        }

        match request.send_bytes(body) {
            Ok(_) => Ok(()),
            Err(ureq::Error::Status(code, response)) => {
                let body = response.into_string().unwrap_or_default();
                bail!("S3 returned {code}: {body}")
            }
            Err(e) => Err(e).with_context(|| format!("PUT {url}")),
        }
    }
}

fn amz_date(now: DateTime<Utc>) -> String {
    now.format("%Y%m%dT%H%M%SZ").to_string()
}

/// RFC 3986 encoding as S3 expects: unreserved characters pass through,
/// `/` is kept unless `encode_slash`.
fn uri_encode(input: &str, encode_slash: bool) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            b'/' if !encode_slash => out.push('/'),
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

fn hmac_sha256(key: &[u8], data: &str) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts keys of any length");
    mac.update(data.as_bytes());
    mac.finalize().into_bytes().to_vec()
}

fn canonical_request(
    method: &str,
    path: &str,
    headers: &BTreeMap<String, String>,
    payload_hash: &str,
) -> String {
    let canonical_headers: String = headers
        .iter()
        .map(|(name, value)| format!("{}:{}\n", name, value.trim()))
        .collect();
    let signed_headers = signed_headers(headers);
    format!("{method}\n{path}\n\n{canonical_headers}\n{signed_headers}\n{payload_hash}")
}

fn signed_headers(headers: &BTreeMap<String, String>) -> String {
    headers.keys().map(String::as_str).collect::<Vec<_>>().join(";")
}

/// `Authorization` header value for a request whose headers are already
/// lower-cased and include `host` and `x-amz-date`.
fn authorization_header(
    credentials: &Credentials,
    region: &str,
    now: DateTime<Utc>,
    method: &str,
    path: &str,
    headers: &BTreeMap<String, String>,
    payload_hash: &str,
) -> String {
    let date = now.format("%Y%m%d").to_string();
    let scope = format!("{date}/{region}/{SERVICE}/aws4_request");

    let request = canonical_request(method, path, headers, payload_hash);
    let string_to_sign = format!(
        "AWS4-HMAC-SHA256\n{}\n{}\n{}",
        amz_date(now),
        scope,
        hex::encode(Sha256::digest(request.as_bytes()))
    );

    let k_date = hmac_sha256(format!("AWS4{}", credentials.secret_access_key).as_bytes(), &date);
    let k_region = hmac_sha256(&k_date, region);
    let k_service = hmac_sha256(&k_region, SERVICE);
    let k_signing = hmac_sha256(&k_service, "aws4_request");
    let signature = hex::encode(hmac_sha256(&k_signing, &string_to_sign));

    format!(
        "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
        credentials.access_key_id,
        scope,
        signed_headers(headers),
        signature
    )
}
