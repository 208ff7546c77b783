pub mod http_classifier;
pub mod prediction;

use async_trait::async_trait;

use crate::payload::ImagePayload;
pub use prediction::Prediction;

#[derive(Debug, thiserror::Error)]
pub enum ClassifierError {
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Model returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Model returned invalid JSON: {0}")]
    InvalidJson(String),
}

/// The external image-classification endpoint.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, image: &ImagePayload) -> Result<Prediction, ClassifierError>;
}
