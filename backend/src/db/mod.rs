pub mod dynamodb_repository;
pub mod model;
pub mod supabase_repository;

use async_trait::async_trait;
use shared::CaptureStatus;

use model::{CapturedImage, LabeledImage, NewCapturedImage, NewLabeledImage};

pub const CAPTURED_IMAGES_TABLE: &str = "captured_images";
pub const LABELED_IMAGES_TABLE: &str = "labeled_images";

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("DynamoDB error: {0}")]
    DynamoDb(String),
    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Record store returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Insert into {0} returned no row")]
    NoRowReturned(String),
}

/// Relational side of the hosted store: the two image tables.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Filtered update of one `captured_images` row. `metadata` is left untouched when `None`.
    async fn set_capture_status(
        &self,
        id: &str,
        status: CaptureStatus,
        metadata: Option<&str>,
    ) -> Result<(), RepositoryError>;

    async fn insert_captured_image(
        &self,
        image: NewCapturedImage,
    ) -> Result<CapturedImage, RepositoryError>;

    async fn insert_labeled_image(
        &self,
        image: NewLabeledImage,
    ) -> Result<LabeledImage, RepositoryError>;
}
