use async_trait::async_trait;
use log::{debug, info, warn};
use reqwest::multipart::{Form, Part};
use reqwest::Client as HttpClient;
use serde_json::Value;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

use super::{Classifier, ClassifierError, Prediction};
use crate::payload::ImagePayload;

const BODY_PREVIEW_CHARS: usize = 200;

/// How the image travels to the model endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestFormat {
    /// `multipart/form-data` with the file in an `image` part.
    Multipart,
    /// The bytes as the whole request body, as hosted inference APIs expect.
    RawBytes,
}

impl FromStr for RequestFormat {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "multipart" => Ok(RequestFormat::Multipart),
            "raw" | "binary" => Ok(RequestFormat::RawBytes),
            _ => Err(()),
        }
    }
}

#[derive(Clone)]
pub struct HttpClassifier {
    http_client: HttpClient,
    endpoint: Url,
    api_token: Option<String>,
    format: RequestFormat,
    timeout: Duration,
}

impl HttpClassifier {
    pub fn new(
        http_client: HttpClient,
        endpoint: Url,
        api_token: Option<String>,
        format: RequestFormat,
        timeout: Duration,
    ) -> Self {
        Self {
            http_client,
            endpoint,
            api_token,
            format,
            timeout,
        }
    }
}

#[async_trait]
impl Classifier for HttpClassifier {
    async fn classify(&self, image: &ImagePayload) -> Result<Prediction, ClassifierError> {
        info!("Sending {} bytes to model: {}", image.len(), self.endpoint);

        let mut request = self
            .http_client
            .post(self.endpoint.clone())
            .timeout(self.timeout);

        request = match self.format {
            RequestFormat::Multipart => {
                let part = Part::bytes(image.bytes.clone())
                    .file_name(image.file_name.clone())
                    .mime_str(image.upload_content_type())?;
                request.multipart(Form::new().part("image", part))
            }
            RequestFormat::RawBytes => request
                .header("Content-Type", image.upload_content_type())
                .body(image.bytes.clone()),
        };

        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            warn!("Model responded with {}", status);
            return Err(ClassifierError::Status {
                status: status.as_u16(),
                body: preview(&body),
            });
        }

        let value: Value =
            serde_json::from_str(&body).map_err(|_| ClassifierError::InvalidJson(preview(&body)))?;
        debug!("Model response: {}", value);

        Ok(Prediction::from_json(&value))
    }
}

fn preview(body: &str) -> String {
    body.chars().take(BODY_PREVIEW_CHARS).collect()
}
