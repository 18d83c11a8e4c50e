//! Client for the external object-storage host that keeps profile pictures
//! and message images. The server never stores media bytes itself.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("media host is not configured")]
    NotConfigured,

    #[error("media host request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("media host answered {0}")]
    Status(reqwest::StatusCode),

    #[error("media host response carried no URL")]
    MissingUrl,
}

/// Uploads a base64 data URL and returns the public URL it is served from.
#[async_trait]
pub trait MediaStore: Send + Sync {
    async fn upload(&self, data: &str) -> Result<String, MediaError>;
}

/// Used when no upload endpoint is configured. Text-only chat keeps working;
/// anything carrying an image is refused.
pub struct DisabledMediaStore;

#[async_trait]
impl MediaStore for DisabledMediaStore {
    async fn upload(&self, _data: &str) -> Result<String, MediaError> {
        Err(MediaError::NotConfigured)
    }
}

#[derive(Serialize)]
struct UploadRequest<'a> {
    file: &'a str,
}

#[derive(Deserialize)]
struct UploadResponse {
    secure_url: Option<String>,
    url: Option<String>,
}

/// Posts `{"file": <data url>}` to an upload endpoint and reads back
/// `secure_url` (falling back to `url`).
pub struct HttpMediaStore {
    client: reqwest::Client,
    upload_url: String,
    api_key: Option<String>,
}

impl HttpMediaStore {
    pub fn new(upload_url: String, api_key: Option<String>) -> Result<Self, MediaError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        info!("Media uploads go to {}", upload_url);
        Ok(Self {
            client,
            upload_url,
            api_key,
        })
    }
}

#[async_trait]
impl MediaStore for HttpMediaStore {
    async fn upload(&self, data: &str) -> Result<String, MediaError> {
        let mut request = self.client.post(&self.upload_url).json(&UploadRequest { file: data });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(MediaError::Status(response.status()));
        }

        let body: UploadResponse = response.json().await?;
        let url = body.secure_url.or(body.url).ok_or(MediaError::MissingUrl)?;
        debug!("Uploaded {} bytes of media to {}", data.len(), url);
        Ok(url)
    }
}
