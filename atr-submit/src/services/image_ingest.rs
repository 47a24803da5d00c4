//! Image ingestion collaborator
//!
//! Accepts raw image bytes and returns a durable absolute URL. The submission
//! service only sees the [`ImageIngestor`] trait; [`CloudinaryIngestor`] is the
//! production implementation (signed upload API).

use async_trait::async_trait;
use atr_common::config::ImageStoreCredentials;
use axum::body::Bytes;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::time::Duration;
use thiserror::Error;
use url::Url;

const CLOUDINARY_API_BASE: &str = "https://api.cloudinary.com/v1_1";
const USER_AGENT: &str = concat!("atr-submit/", env!("CARGO_PKG_VERSION"));
const UPLOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// Stored images are re-encoded as JPEG, bounded to 1200x1200
const UPLOAD_FORMAT: &str = "jpg";
const UPLOAD_TRANSFORMATION: &str = "c_limit,w_1200,h_1200,q_auto:good";

/// Image ingestion errors
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Image store is not configured")]
    NotConfigured,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Image store error {0}: {1}")]
    Api(u16, String),

    #[error("Invalid image store response: {0}")]
    InvalidResponse(String),
}

/// Uploads an image and returns where it can be retrieved
#[async_trait]
pub trait ImageIngestor: Send + Sync {
    async fn upload(&self, bytes: Bytes, media_type: &str) -> Result<Url, IngestError>;
}

/// Used when no image store credentials are configured; every upload fails
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledIngestor;

#[async_trait]
impl ImageIngestor for DisabledIngestor {
    async fn upload(&self, _bytes: Bytes, _media_type: &str) -> Result<Url, IngestError> {
        Err(IngestError::NotConfigured)
    }
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    secure_url: String,
}

/// Signed uploads to a Cloudinary-compatible image API
pub struct CloudinaryIngestor {
    http_client: reqwest::Client,
    upload_url: String,
    api_key: String,
    api_secret: String,
    folder: String,
}

impl CloudinaryIngestor {
    pub fn new(credentials: ImageStoreCredentials<'_>, folder: &str) -> Result<Self, IngestError> {
        Self::with_api_base(CLOUDINARY_API_BASE, credentials, folder)
    }

    /// Same as [`CloudinaryIngestor::new`] against a different API root
    pub fn with_api_base(
        api_base: &str,
        credentials: ImageStoreCredentials<'_>,
        folder: &str,
    ) -> Result<Self, IngestError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(UPLOAD_TIMEOUT)
            .build()
            .map_err(|e| IngestError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            upload_url: format!(
                "{}/{}/image/upload",
                api_base.trim_end_matches('/'),
                credentials.cloud_name
            ),
            api_key: credentials.api_key.to_string(),
            api_secret: credentials.api_secret.to_string(),
            folder: folder.to_string(),
        })
    }

    pub fn upload_url(&self) -> &str {
        &self.upload_url
    }

    /// Parameters covered by the signature, sorted by key
    fn signed_params(&self, timestamp: i64) -> Vec<(&'static str, String)> {
        vec![
            ("folder", self.folder.clone()),
            ("format", UPLOAD_FORMAT.to_string()),
            ("timestamp", timestamp.to_string()),
            ("transformation", UPLOAD_TRANSFORMATION.to_string()),
        ]
    }
}

/// SHA-256 over `k1=v1&k2=v2...` (keys sorted) followed by the API secret
pub fn sign_params(params: &[(&str, String)], api_secret: &str) -> String {
    let mut sorted: Vec<_> = params.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(b.0));

    let to_sign = sorted
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");

    format!("{:x}", Sha256::digest(format!("{}{}", to_sign, api_secret).as_bytes()))
}

/// The store must hand back an absolute http(s) URL
pub fn parse_secure_url(raw: &str) -> Result<Url, IngestError> {
    let url = Url::parse(raw).map_err(|e| IngestError::InvalidResponse(format!("{}: {:?}", e, raw)))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(IngestError::InvalidResponse(format!(
            "unexpected URL scheme in {:?}",
            raw
        )));
    }
    Ok(url)
}

#[async_trait]
impl ImageIngestor for CloudinaryIngestor {
    async fn upload(&self, bytes: Bytes, media_type: &str) -> Result<Url, IngestError> {
        let size = bytes.len();
        let timestamp = chrono::Utc::now().timestamp();
        let params = self.signed_params(timestamp);
        let signature = sign_params(&params, &self.api_secret);

        let file = reqwest::multipart::Part::stream_with_length(bytes, size as u64)
            .file_name("capture")
            .mime_str(media_type)
            .map_err(|e| IngestError::Network(e.to_string()))?;

        let mut form = reqwest::multipart::Form::new()
            .part("file", file)
            .text("api_key", self.api_key.clone())
            .text("signature", signature)
            .text("signature_algorithm", "sha256");
        for (key, value) in params {
            form = form.text(key, value);
        }

        tracing::debug!(size, media_type, folder = %self.folder, "Uploading image");

        let response = self
            .http_client
            .post(&self.upload_url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| IngestError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(IngestError::Api(status.as_u16(), error_text));
        }

        let body: UploadResponse = response
            .json()
            .await
            .map_err(|e| IngestError::InvalidResponse(e.to_string()))?;

        let url = parse_secure_url(&body.secure_url)?;
        tracing::info!(url = %url, size, "Image uploaded");
        Ok(url)
    }
}
