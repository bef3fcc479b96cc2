//! Durable object storage for uploaded files.
//!
//! Uploads raw document bytes to an S3-compatible bucket under the key
//! `{namespace}/{file_name}` using the S3 REST API with AWS Signature V4
//! authentication, and returns the stored path for provenance stamping.
//! Re-uploading the same key overwrites the object.
//!
//! Uses only pure-Rust dependencies (`hmac`, `sha2`) for AWS signing — no
//! C library dependencies, so it builds everywhere. Custom endpoints
//! (MinIO, LocalStack) are supported via `storage.endpoint_url`.
//!
//! Credentials come from `AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY`, and
//! optionally `AWS_SESSION_TOKEN`.

use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use crate::config::StorageConfig;
use crate::error::{Error, Result};

type HmacSha256 = Hmac<Sha256>;

/// AWS credentials loaded from environment variables.
struct AwsCredentials {
    access_key_id: String,
    secret_access_key: String,
    session_token: Option<String>,
}

impl AwsCredentials {
    fn from_env() -> Result<Self> {
        let access_key_id = std::env::var("AWS_ACCESS_KEY_ID")
            .map_err(|_| Error::StorageWrite("AWS_ACCESS_KEY_ID not set".into()))?;
        let secret_access_key = std::env::var("AWS_SECRET_ACCESS_KEY")
            .map_err(|_| Error::StorageWrite("AWS_SECRET_ACCESS_KEY not set".into()))?;
        let session_token = std::env::var("AWS_SESSION_TOKEN").ok();

        Ok(Self {
            access_key_id,
            secret_access_key,
            session_token,
        })
    }
}

/// Client that persists uploaded files before ingestion proceeds.
pub struct ObjectStore {
    http: reqwest::Client,
    config: StorageConfig,
}

impl ObjectStore {
    pub fn new(config: StorageConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    /// Upload `bytes` as `{namespace}/{file_name}` and return that path.
    ///
    /// This is the first side effect of every ingestion; a failure here
    /// surfaces as [`Error::StorageWrite`] and nothing else runs.
    pub async fn put(&self, namespace: &str, file_name: &str, bytes: &[u8]) -> Result<String> {
        let creds = AwsCredentials::from_env()?;
        let key = format!("{namespace}/{file_name}");
        let encoded_key = key.split('/').map(uri_encode).collect::<Vec<_>>().join("/");

        let (scheme, host) = self.scheme_and_host();
        let url = format!("{scheme}://{host}/{encoded_key}");

        let now = Utc::now();
        let date_stamp = now.format("%Y%m%d").to_string();
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();

        let payload_hash = hex_sha256(bytes);

        let mut headers = vec![
            ("host".to_string(), host.clone()),
            ("x-amz-content-sha256".to_string(), payload_hash.clone()),
            ("x-amz-date".to_string(), amz_date.clone()),
        ];
        if let Some(ref token) = creds.session_token {
            headers.push(("x-amz-security-token".to_string(), token.clone()));
        }
        headers.sort_by(|a, b| a.0.cmp(&b.0));

        let signed_headers: String = headers
            .iter()
            .map(|(k, _)| k.as_str())
            .collect::<Vec<_>>()
            .join(";");

        let canonical_headers: String = headers
            .iter()
            .map(|(k, v)| format!("{}:{}\n", k, v))
            .collect();

        let canonical_uri = format!("/{encoded_key}");
        let canonical_request = format!(
            "PUT\n{}\n\n{}\n{}\n{}",
            canonical_uri, canonical_headers, signed_headers, payload_hash
        );

        let credential_scope = format!("{}/{}/s3/aws4_request", date_stamp, self.config.region);
        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{}\n{}\n{}",
            amz_date,
            credential_scope,
            hex_sha256(canonical_request.as_bytes())
        );

        let signing_key = derive_signing_key(
            &creds.secret_access_key,
            &date_stamp,
            &self.config.region,
            "s3",
        );
        let signature = hex_hmac_sha256(&signing_key, string_to_sign.as_bytes());

        let authorization = format!(
            "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
            creds.access_key_id, credential_scope, signed_headers, signature
        );

        let mut req = self
            .http
            .put(&url)
            .header("Authorization", &authorization)
            .header("x-amz-content-sha256", &payload_hash)
            .header("x-amz-date", &amz_date)
            .body(bytes.to_vec());

        if let Some(ref token) = creds.session_token {
            req = req.header("x-amz-security-token", token);
        }

        let response = req
            .send()
            .await
            .map_err(|e| Error::StorageWrite(format!("PUT {key}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::StorageWrite(format!(
                "S3 PutObject failed (HTTP {status}) for key '{key}': {}",
                body.chars().take(500).collect::<String>()
            )));
        }

        tracing::debug!(%key, "stored uploaded file");
        Ok(key)
    }

    /// Scheme and host for the bucket, honoring a custom endpoint.
    fn scheme_and_host(&self) -> (&'static str, String) {
        match self.config.endpoint_url {
            Some(ref endpoint) => {
                let (scheme, rest) = if let Some(rest) = endpoint.strip_prefix("http://") {
                    ("http", rest)
                } else {
                    ("https", endpoint.trim_start_matches("https://"))
                };
                (scheme, rest.trim_end_matches('/').to_string())
            }
            None => (
                "https",
                format!(
                    "{}.s3.{}.amazonaws.com",
                    self.config.bucket, self.config.region
                ),
            ),
        }
    }
}

// ============ AWS SigV4 Helpers ============

/// Compute the hex-encoded SHA-256 hash of data.
fn hex_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Compute HMAC-SHA256 of data with the given key.
fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// Compute hex-encoded HMAC-SHA256.
fn hex_hmac_sha256(key: &[u8], data: &[u8]) -> String {
    hex::encode(hmac_sha256(key, data))
}

/// Derive the AWS SigV4 signing key for a given date, region, and service.
///
/// ```text
/// kDate    = HMAC("AWS4" + secret, dateStamp)
/// kRegion  = HMAC(kDate, region)
/// kService = HMAC(kRegion, service)
/// kSigning = HMAC(kService, "aws4_request")
/// ```
fn derive_signing_key(secret_key: &str, date_stamp: &str, region: &str, service: &str) -> Vec<u8> {
    let k_date = hmac_sha256(
        format!("AWS4{}", secret_key).as_bytes(),
        date_stamp.as_bytes(),
    );
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, service.as_bytes());
    hmac_sha256(&k_service, b"aws4_request")
}

/// URI-encode a string per RFC 3986 (used in SigV4 canonical requests).
fn uri_encode(s: &str) -> String {
    let mut result = String::new();
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                result.push(byte as char);
            }
            _ => {
                result.push_str(&format!("%{:02X}", byte));
            }
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signing_key_matches_aws_test_vector() {
        // Example from the AWS SigV4 documentation.
        let key = derive_signing_key(
            "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY",
            "20150830",
            "us-east-1",
            "iam",
        );
        assert_eq!(
            hex::encode(key),
            "c4afb1cc5771d871763a393e44b703571b55cc28424d1a5e86da6ed3c154a4b9"
        );
    }

    #[test]
    fn uri_encode_preserves_unreserved() {
        assert_eq!(uri_encode("manual.pdf"), "manual.pdf");
        assert_eq!(uri_encode("a b"), "a%20b");
        assert_eq!(uri_encode("ü"), "%C3%BC");
    }

    #[test]
    fn default_host_is_virtual_hosted_style() {
        let store = ObjectStore::new(StorageConfig {
            bucket: "docent-docs".into(),
            region: "eu-west-1".into(),
            endpoint_url: None,
        });
        let (scheme, host) = store.scheme_and_host();
        assert_eq!(scheme, "https");
        assert_eq!(host, "docent-docs.s3.eu-west-1.amazonaws.com");
    }

    #[test]
    fn custom_endpoint_keeps_scheme() {
        let store = ObjectStore::new(StorageConfig {
            bucket: "docent-docs".into(),
            region: "us-east-1".into(),
            endpoint_url: Some("http://127.0.0.1:9000/".into()),
        });
        let (scheme, host) = store.scheme_and_host();
        assert_eq!(scheme, "http");
        assert_eq!(host, "127.0.0.1:9000");
    }
}
