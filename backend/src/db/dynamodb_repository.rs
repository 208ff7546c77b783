use async_trait::async_trait;
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client;
use chrono::Utc;
use shared::CaptureStatus;
use std::collections::HashMap;
use uuid::Uuid;

use super::model::{CapturedImage, LabeledImage, NewCapturedImage, NewLabeledImage};
use super::{RecordStore, RepositoryError};

#[derive(Clone)]
pub struct DynamoDbRepository {
    client: Client,
    captured_table: String,
    labeled_table: String,
}

impl DynamoDbRepository {
    pub fn new(client: Client, captured_table: String, labeled_table: String) -> Self {
        Self {
            client,
            captured_table,
            labeled_table,
        }
    }

    async fn put(
        &self,
        table: &str,
        item: HashMap<String, AttributeValue>,
    ) -> Result<(), RepositoryError> {
        match self
            .client
            .put_item()
            .table_name(table)
            .set_item(Some(item))
            .send()
            .await
        {
            Ok(_) => Ok(()),
            Err(e) => {
                log::error!("DynamoDB put_item failed for table {}: {:?}", table, e);
                Err(RepositoryError::DynamoDb(e.to_string()))
            }
        }
    }
}

fn captured_item(id: &str, image: &NewCapturedImage) -> HashMap<String, AttributeValue> {
    let now = Utc::now().to_rfc3339();
    let mut item = HashMap::new();
    item.insert("id".to_string(), AttributeValue::S(id.to_string()));
    item.insert(
        "user_id".to_string(),
        AttributeValue::S(image.user_id.clone()),
    );
    item.insert(
        "image_url".to_string(),
        AttributeValue::S(image.image_url.clone()),
    );
    item.insert(
        "status".to_string(),
        AttributeValue::S(image.status.to_string()),
    );
    item.insert("created_at".to_string(), AttributeValue::S(now.clone()));
    item.insert("updated_at".to_string(), AttributeValue::S(now));
    item
}

fn labeled_item(id: &str, image: &NewLabeledImage) -> HashMap<String, AttributeValue> {
    let mut item = HashMap::new();
    item.insert("id".to_string(), AttributeValue::S(id.to_string()));
    if let Some(captured_image_id) = &image.captured_image_id {
        item.insert(
            "captured_image_id".to_string(),
            AttributeValue::S(captured_image_id.clone()),
        );
    }
    item.insert(
        "user_id".to_string(),
        AttributeValue::S(image.user_id.clone()),
    );
    item.insert(
        "labeled_image_url".to_string(),
        AttributeValue::S(image.labeled_image_url.clone()),
    );
    item.insert(
        "animal_detected".to_string(),
        AttributeValue::S(image.animal_detected.clone()),
    );
    item.insert(
        "confidence_score".to_string(),
        AttributeValue::N(image.confidence_score.to_string()),
    );
    item.insert(
        "created_at".to_string(),
        AttributeValue::S(Utc::now().to_rfc3339()),
    );
    item
}

/// Builds the `SET` clause for a status transition. `status` is a reserved word.
fn status_update(
    status: CaptureStatus,
    metadata: Option<&str>,
) -> (
    String,
    HashMap<String, String>,
    HashMap<String, AttributeValue>,
) {
    let mut parts = vec!["#status = :status", "updated_at = :updated_at"];
    let mut names = HashMap::new();
    let mut values = HashMap::new();

    names.insert("#status".to_string(), "status".to_string());
    values.insert(":status".to_string(), AttributeValue::S(status.to_string()));
    values.insert(
        ":updated_at".to_string(),
        AttributeValue::S(Utc::now().to_rfc3339()),
    );

    if let Some(metadata) = metadata {
        parts.push("metadata = :metadata");
        values.insert(
            ":metadata".to_string(),
            AttributeValue::S(metadata.to_string()),
        );
    }

    (format!("SET {}", parts.join(", ")), names, values)
}

#[async_trait]
impl RecordStore for DynamoDbRepository {
    async fn set_capture_status(
        &self,
        id: &str,
        status: CaptureStatus,
        metadata: Option<&str>,
    ) -> Result<(), RepositoryError> {
        let (update_expression, names, values) = status_update(status, metadata);
        log::debug!("Update expression for {}: {}", id, update_expression);

        let result = self
            .client
            .update_item()
            .table_name(&self.captured_table)
            .key("id", AttributeValue::S(id.to_string()))
            .update_expression(update_expression)
            .condition_expression("attribute_exists(id)")
            .set_expression_attribute_names(Some(names))
            .set_expression_attribute_values(Some(values))
            .send()
            .await;

        match result {
            Ok(_) => {
                log::info!("Captured image {} is now {}", id, status);
                Ok(())
            }
            Err(e) => {
                let missing = e
                    .as_service_error()
                    .map(|se| se.is_conditional_check_failed_exception())
                    .unwrap_or(false);
                if missing {
                    return Err(RepositoryError::NotFound(format!(
                        "{} item with id {}",
                        self.captured_table, id
                    )));
                }

                log::error!("DynamoDB update_item failed for captured image {}: {:?}", id, e);
                let error_msg = if let Some(service_err) = e.as_service_error() {
                    format!("Service error: {:?}", service_err)
                } else {
                    format!("SDK error: {}", e)
                };
                Err(RepositoryError::DynamoDb(error_msg))
            }
        }
    }

    async fn insert_captured_image(
        &self,
        image: NewCapturedImage,
    ) -> Result<CapturedImage, RepositoryError> {
        let id = Uuid::new_v4().to_string();
        self.put(&self.captured_table, captured_item(&id, &image))
            .await?;
        log::info!("Inserted captured image {} for user {}", id, image.user_id);
        Ok(image.into_row(id))
    }

    async fn insert_labeled_image(
        &self,
        image: NewLabeledImage,
    ) -> Result<LabeledImage, RepositoryError> {
        let id = Uuid::new_v4().to_string();
        self.put(&self.labeled_table, labeled_item(&id, &image))
            .await?;
        log::info!(
            "Inserted labeled image {} ({} at {:.2}%)",
            id,
            image.animal_detected,
            image.confidence_score
        );
        Ok(image.into_row(id))
    }
}
