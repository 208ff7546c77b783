pub mod s3_service;
pub mod supabase_storage;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("S3 error: {0}")]
    S3(String),
    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Storage returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Empty upload")]
    Empty,
}

/// Object side of the hosted store. Buckets must already exist.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn upload(&self, key: &str, data: &[u8], content_type: &str)
    -> Result<(), StorageError>;

    fn public_url(&self, key: &str) -> String;
}

/// `<user>/<timestamp>_<suffix>.<ext>`; the suffix keeps same-millisecond uploads apart.
pub fn object_key(user_id: &str, extension: &str, now: DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!(
        "{}/{}_{}.{}",
        sanitize_path_component(user_id),
        now.format("%Y%m%dT%H%M%S%3fZ"),
        &suffix[..12],
        extension
    )
}

fn sanitize_path_component(component: &str) -> String {
    let cleaned: String = component
        .trim()
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' => c,
            _ => '_',
        })
        .collect();
    if cleaned.is_empty() {
        "anonymous".to_string()
    } else {
        cleaned
    }
}
