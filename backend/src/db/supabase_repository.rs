use async_trait::async_trait;
use log::{debug, error, info};
use reqwest::Response;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use shared::CaptureStatus;

use super::model::{CapturedImage, LabeledImage, NewCapturedImage, NewLabeledImage};
use super::{RecordStore, RepositoryError, CAPTURED_IMAGES_TABLE, LABELED_IMAGES_TABLE};
use crate::supabase::SupabaseClient;

/// `RecordStore` over Supabase's PostgREST interface.
#[derive(Clone)]
pub struct SupabaseRepository {
    supabase: SupabaseClient,
}

impl SupabaseRepository {
    pub fn new(supabase: SupabaseClient) -> Self {
        Self { supabase }
    }

    async fn insert_row<T, R>(&self, table: &str, row: &T) -> Result<R, RepositoryError>
    where
        T: serde::Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let request = self
            .supabase
            .http()
            .post(self.supabase.rest_url(table))
            .header("Prefer", "return=representation")
            .json(row);

        let response = self.supabase.authorize(request).send().await?;
        let rows: Vec<Value> = read_success(response).await?.json().await?;

        let created = rows.into_iter().next().ok_or_else(|| {
            error!("Insert into {} returned an empty representation", table);
            RepositoryError::NoRowReturned(table.to_string())
        })?;
        Ok(serde_json::from_value(created)?)
    }
}

async fn read_success(response: Response) -> Result<Response, RepositoryError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(RepositoryError::Status {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl RecordStore for SupabaseRepository {
    async fn set_capture_status(
        &self,
        id: &str,
        status: CaptureStatus,
        metadata: Option<&str>,
    ) -> Result<(), RepositoryError> {
        debug!("Setting captured image {} to {}", id, status);

        let mut patch = json!({ "status": status });
        if let Some(metadata) = metadata {
            patch["metadata"] = Value::String(metadata.to_string());
        }

        let request = self
            .supabase
            .http()
            .patch(self.supabase.rest_url(CAPTURED_IMAGES_TABLE))
            .query(&[("id", format!("eq.{}", id))])
            .header("Prefer", "return=representation")
            .json(&patch);

        let response = self.supabase.authorize(request).send().await?;
        let updated: Vec<Value> = read_success(response).await?.json().await?;
        if updated.is_empty() {
            return Err(RepositoryError::NotFound(format!(
                "{} row with id {}",
                CAPTURED_IMAGES_TABLE, id
            )));
        }

        info!("Captured image {} is now {}", id, status);
        Ok(())
    }

    async fn insert_captured_image(
        &self,
        image: NewCapturedImage,
    ) -> Result<CapturedImage, RepositoryError> {
        let row: CapturedImage = self.insert_row(CAPTURED_IMAGES_TABLE, &image).await?;
        info!("Inserted captured image {} for user {}", row.id, row.user_id);
        Ok(row)
    }

    async fn insert_labeled_image(
        &self,
        image: NewLabeledImage,
    ) -> Result<LabeledImage, RepositoryError> {
        let row: LabeledImage = self.insert_row(LABELED_IMAGES_TABLE, &image).await?;
        info!(
            "Inserted labeled image {} ({} at {:.2}%)",
            row.id, row.animal_detected, row.confidence_score
        );
        Ok(row)
    }
}
