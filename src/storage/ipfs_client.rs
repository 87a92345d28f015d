// src/storage/ipfs_client.rs
//! IPFS content storage for uploaded identity documents.
//!
//! Uploads are pinned through the Pinata pinning API; reads go through public
//! HTTP gateways.
//!
//! # Features
//! - Content-addressed storage: the returned CID is the document's identity
//! - Multi-gateway reads: gateways are tried in configured order, the first
//!   successful payload wins, and if every gateway fails the error carries the
//!   last gateway's failure reason
//! - Fixed per-gateway timeout
//!
//! # Security Considerations
//! - All pinned data is public (IPFS is a public network)
//! - For private data, encrypt before storage

use async_trait::async_trait;
use bytes::Bytes;
use log::{debug, info, warn};
use reqwest::header::CONTENT_TYPE;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

use crate::config::AppConfig;

/// Errors raised by the content adapter.
#[derive(Debug, Error)]
pub enum IpfsError {
    #[error("Pinata credentials not properly configured")]
    NotConfigured,

    #[error("Invalid content identifier: {0}")]
    InvalidCid(String),

    #[error("Failed to upload to IPFS: {0}")]
    Upload(String),

    #[error("Failed to retrieve from IPFS: {gateway}: {reason}")]
    AllGatewaysFailed { gateway: String, reason: String },

    #[error("Failed to retrieve from IPFS: no gateways configured")]
    NoGateways,
}

/// Result of pinning a file.
#[derive(Debug, Clone)]
pub struct PinnedContent {
    /// Content identifier
    pub cid: String,
    pub size: u64,
    /// Gateway URL of the pinned content
    pub url: String,
}

/// Bytes fetched from a gateway.
#[derive(Debug, Clone)]
pub struct RetrievedContent {
    pub data: Bytes,
    /// `Content-Type` reported by the gateway, if any
    pub content_type: Option<String>,
    /// Gateway URL that served the content
    pub source: String,
}

/// Content storage seam used by the document workflow.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Pins `data` and returns its content identifier.
    async fn upload(&self, file_name: &str, data: Vec<u8>) -> Result<PinnedContent, IpfsError>;

    /// Fetches content by CID, falling back across gateways.
    async fn retrieve(&self, cid: &str) -> Result<RetrievedContent, IpfsError>;
}

/// How the service authenticates against Pinata.
#[derive(Debug, Clone)]
enum PinataCredentials {
    Jwt(String),
    ApiKey { key: String, secret: String },
}

/// Pinata response body for `pinFileToIPFS`.
#[derive(Debug, Deserialize)]
struct PinResponse {
    #[serde(rename = "IpfsHash")]
    ipfs_hash: String,
    #[serde(rename = "PinSize", default)]
    pin_size: u64,
}

/// Pinata + public gateway client.
///
/// Uses `reqwest` under the hood with:
/// - Connection pooling shared across clones
/// - A fixed per-request timeout on gateway reads
#[derive(Clone)]
pub struct IpfsStorage {
    client: reqwest::Client,
    pinata_api_url: String,
    credentials: Option<PinataCredentials>,
    gateways: Vec<String>,
    gateway_timeout: Duration,
}

impl IpfsStorage {
    /// Creates a client from the injected configuration.
    ///
    /// A JWT takes precedence over an API key/secret pair. Without either,
    /// uploads fail with [`IpfsError::NotConfigured`] while reads still work.
    pub fn new(config: &AppConfig) -> Self {
        let credentials = match (&config.pinata_jwt, &config.pinata_api_key, &config.pinata_api_secret) {
            (Some(jwt), _, _) => Some(PinataCredentials::Jwt(jwt.clone())),
            (None, Some(key), Some(secret)) => Some(PinataCredentials::ApiKey {
                key: key.clone(),
                secret: secret.clone(),
            }),
            _ => None,
        };

        IpfsStorage {
            client: reqwest::Client::new(),
            pinata_api_url: config.pinata_api_url.trim_end_matches('/').to_string(),
            credentials,
            gateways: config
                .ipfs_gateways
                .iter()
                .map(|g| g.trim_end_matches('/').to_string())
                .collect(),
            gateway_timeout: config.gateway_timeout(),
        }
    }

    /// CIDs are base-encoded multihashes: plain alphanumerics only.
    fn validate_cid(cid: &str) -> Result<(), IpfsError> {
        if cid.is_empty() || !cid.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(IpfsError::InvalidCid(cid.to_string()));
        }
        Ok(())
    }

    async fn fetch(&self, url: &str) -> Result<RetrievedContent, reqwest::Error> {
        let response = self
            .client
            .get(url)
            .timeout(self.gateway_timeout)
            .send()
            .await?
            .error_for_status()?;

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string());
        let data = response.bytes().await?;

        Ok(RetrievedContent {
            data,
            content_type,
            source: url.to_string(),
        })
    }
}

#[async_trait]
impl ContentStore for IpfsStorage {
    async fn upload(&self, file_name: &str, data: Vec<u8>) -> Result<PinnedContent, IpfsError> {
        let credentials = self.credentials.as_ref().ok_or(IpfsError::NotConfigured)?;
        let timestamp = chrono::Utc::now().timestamp_millis();

        let metadata = serde_json::json!({
            "name": format!("Upload_{}", timestamp),
            "keyvalues": {
                "source": "kyc-system",
                "fileName": file_name,
                "timestamp": timestamp.to_string(),
            }
        });
        let form = Form::new()
            .part("file", Part::bytes(data).file_name(file_name.to_string()))
            .text("pinataMetadata", metadata.to_string());

        let request = self
            .client
            .post(format!("{}/pinning/pinFileToIPFS", self.pinata_api_url))
            .multipart(form);
        let request = match credentials {
            PinataCredentials::Jwt(jwt) => request.bearer_auth(jwt),
            PinataCredentials::ApiKey { key, secret } => request
                .header("pinata_api_key", key)
                .header("pinata_secret_api_key", secret),
        };

        let response = request
            .send()
            .await
            .map_err(|e| IpfsError::Upload(e.to_string()))?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(IpfsError::Upload(format!("Pinata responded {}: {}", status, body)));
        }
        let pinned: PinResponse = response
            .json()
            .await
            .map_err(|e| IpfsError::Upload(e.to_string()))?;

        info!("Pinata upload successful: {}", pinned.ipfs_hash);
        let url = match self.gateways.first() {
            Some(gateway) => format!("{}/ipfs/{}", gateway, pinned.ipfs_hash),
            None => format!("ipfs://{}", pinned.ipfs_hash),
        };
        Ok(PinnedContent {
            cid: pinned.ipfs_hash,
            size: pinned.pin_size,
            url,
        })
    }

    async fn retrieve(&self, cid: &str) -> Result<RetrievedContent, IpfsError> {
        Self::validate_cid(cid)?;

        let mut last_failure: Option<(String, String)> = None;
        for gateway in &self.gateways {
            let url = format!("{}/ipfs/{}", gateway, cid);
            debug!("Trying IPFS gateway: {}", url);

            match self.fetch(&url).await {
                Ok(content) => {
                    info!("Retrieved {} bytes from {}", content.data.len(), url);
                    return Ok(content);
                }
                Err(e) => {
                    warn!("Failed to retrieve from {}: {}", url, e);
                    last_failure = Some((url, e.to_string()));
                }
            }
        }

        Err(match last_failure {
            Some((gateway, reason)) => IpfsError::AllGatewaysFailed { gateway, reason },
            None => IpfsError::NoGateways,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::mock;

    fn storage_with_gateways(prefixes: &[&str]) -> IpfsStorage {
        let config = AppConfig {
            ipfs_gateways: prefixes
                .iter()
                .map(|p| format!("{}/{}", mockito::server_url(), p))
                .collect(),
            gateway_timeout_secs: 2,
            ..AppConfig::default()
        };
        IpfsStorage::new(&config)
    }

    #[tokio::test]
    async fn test_falls_through_to_first_healthy_gateway() {
        let _down = mock("GET", "/gw-a/ipfs/QmFallback").with_status(502).create();
        let _up = mock("GET", "/gw-b/ipfs/QmFallback")
            .with_status(200)
            .with_header("content-type", "application/pdf")
            .with_body("from-b")
            .create();
        let _never = mock("GET", "/gw-c/ipfs/QmFallback")
            .with_status(200)
            .with_body("from-c")
            .expect(0)
            .create();

        let storage = storage_with_gateways(&["gw-a", "gw-b", "gw-c"]);
        let content = storage.retrieve("QmFallback").await.unwrap();

        assert_eq!(&content.data[..], b"from-b");
        assert_eq!(content.content_type.as_deref(), Some("application/pdf"));
        assert!(content.source.contains("/gw-b/"));
        _never.assert();
    }

    #[tokio::test]
    async fn test_all_gateways_failing_reports_last_one() {
        let _a = mock("GET", "/gw-x/ipfs/QmMissing").with_status(500).create();
        let _b = mock("GET", "/gw-y/ipfs/QmMissing").with_status(404).create();

        let storage = storage_with_gateways(&["gw-x", "gw-y"]);
        match storage.retrieve("QmMissing").await {
            Err(IpfsError::AllGatewaysFailed { gateway, reason }) => {
                assert!(gateway.contains("/gw-y/"));
                assert!(reason.contains("404"));
            }
            other => panic!("expected AllGatewaysFailed, got {:?}", other.map(|c| c.source)),
        }
    }

    #[tokio::test]
    async fn test_rejects_path_like_cid() {
        let storage = storage_with_gateways(&["gw-z"]);
        assert!(matches!(
            storage.retrieve("../admin").await,
            Err(IpfsError::InvalidCid(_))
        ));
    }

    #[tokio::test]
    async fn test_upload_uses_jwt_and_returns_cid() {
        let _pin = mock("POST", "/pinning/pinFileToIPFS")
            .match_header("authorization", "Bearer test-jwt")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"IpfsHash":"QmUploaded","PinSize":7,"Timestamp":"2024-01-01T00:00:00Z"}"#)
            .create();

        let config = AppConfig {
            pinata_api_url: mockito::server_url(),
            pinata_jwt: Some("test-jwt".into()),
            ..AppConfig::default()
        };
        let pinned = IpfsStorage::new(&config)
            .upload("passport.pdf", b"content".to_vec())
            .await
            .unwrap();

        assert_eq!(pinned.cid, "QmUploaded");
        assert_eq!(pinned.size, 7);
        assert_eq!(pinned.url, "https://gateway.pinata.cloud/ipfs/QmUploaded");
    }

    #[tokio::test]
    async fn test_upload_without_credentials() {
        let storage = IpfsStorage::new(&AppConfig::default());
        assert!(matches!(
            storage.upload("a.txt", vec![1]).await,
            Err(IpfsError::NotConfigured)
        ));
    }
}
