use async_trait::async_trait;
use log::info;
use reqwest::Client as HttpClient;
use std::time::Duration;
use url::Url;

use crate::payload::ImagePayload;

/// The classifier only ever sees the bytes under this name.
const FETCHED_FILE_NAME: &str = "image.jpg";

#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Image download returned HTTP {0}")]
    Status(u16),
    #[error("Image exceeds {limit} bytes")]
    TooLarge { limit: usize },
    #[error("Image download returned an empty body")]
    Empty,
}

#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch(&self, url: &Url) -> Result<ImagePayload, DownloadError>;
}

#[derive(Clone)]
pub struct HttpImageFetcher {
    http_client: HttpClient,
    timeout: Duration,
    max_bytes: usize,
}

impl HttpImageFetcher {
    pub fn new(http_client: HttpClient, timeout: Duration, max_bytes: usize) -> Self {
        Self {
            http_client,
            timeout,
            max_bytes,
        }
    }
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch(&self, url: &Url) -> Result<ImagePayload, DownloadError> {
        info!("Downloading image: {}", url);

        let mut response = self
            .http_client
            .get(url.clone())
            .timeout(self.timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::Status(status.as_u16()));
        }

        if response
            .content_length()
            .is_some_and(|len| len as usize > self.max_bytes)
        {
            return Err(DownloadError::TooLarge {
                limit: self.max_bytes,
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_string());

        let mut bytes = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            if bytes.len() + chunk.len() > self.max_bytes {
                return Err(DownloadError::TooLarge {
                    limit: self.max_bytes,
                });
            }
            bytes.extend_from_slice(&chunk);
        }

        if bytes.is_empty() {
            return Err(DownloadError::Empty);
        }

        Ok(ImagePayload::new(
            bytes,
            content_type.as_deref(),
            Some(FETCHED_FILE_NAME),
        ))
    }
}

/// Accepts only absolute http(s) URLs.
pub fn parse_image_url(raw: &str) -> Option<Url> {
    let url = Url::parse(raw.trim()).ok()?;
    match url.scheme() {
        "http" | "https" if url.has_host() => Some(url),
        _ => None,
    }
}
