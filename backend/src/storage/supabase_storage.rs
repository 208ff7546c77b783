use async_trait::async_trait;

use super::{ObjectStore, StorageError};
use crate::supabase::SupabaseClient;

#[derive(Clone)]
pub struct SupabaseStorage {
    supabase: SupabaseClient,
    bucket: String,
}

impl SupabaseStorage {
    pub fn new(supabase: SupabaseClient, bucket: String) -> Self {
        Self { supabase, bucket }
    }
}

#[async_trait]
impl ObjectStore for SupabaseStorage {
    async fn upload(
        &self,
        key: &str,
        data: &[u8],
        content_type: &str,
    ) -> Result<(), StorageError> {
        if data.is_empty() {
            return Err(StorageError::Empty);
        }

        let request = self
            .supabase
            .http()
            .post(self.supabase.object_url(&self.bucket, key))
            .header("Content-Type", content_type)
            .header("x-upsert", "false")
            .body(data.to_vec());

        let response = self.supabase.authorize(request).send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            log::error!("Storage upload of {} failed with {}: {}", key, status, body);
            return Err(StorageError::Status { status, body });
        }

        log::info!("Uploaded {} bytes to {}/{}", data.len(), self.bucket, key);
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        self.supabase.public_object_url(&self.bucket, key)
    }
}
