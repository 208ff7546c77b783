use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;

use super::{ObjectStore, StorageError};

#[derive(Clone)]
pub struct S3Service {
    client: Client,
    bucket_name: String,
    public_base_url: String,
}

impl S3Service {
    /// Without an explicit base URL, objects are addressed virtual-host style.
    pub fn new(
        client: Client,
        bucket_name: String,
        region: &str,
        public_base_url: Option<String>,
    ) -> Self {
        let public_base_url = public_base_url
            .unwrap_or_else(|| format!("https://{}.s3.{}.amazonaws.com", bucket_name, region));
        Self {
            client,
            bucket_name,
            public_base_url,
        }
    }
}

#[async_trait]
impl ObjectStore for S3Service {
    async fn upload(
        &self,
        key: &str,
        data: &[u8],
        content_type: &str,
    ) -> Result<(), StorageError> {
        if data.is_empty() {
            return Err(StorageError::Empty);
        }

        let body = ByteStream::from(data.to_vec());

        self.client
            .put_object()
            .bucket(&self.bucket_name)
            .key(key)
            .body(body)
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| StorageError::S3(e.to_string()))?;

        log::info!("Uploaded {} bytes to s3://{}/{}", data.len(), self.bucket_name, key);
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_base_url, key)
    }
}
