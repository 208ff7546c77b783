use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use shared::CaptureStatus;

// Hosted tables hand ids back either as uuid strings or as bigint columns.
fn deserialize_identifier<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "Expected string or number identifier, got {}",
            other
        ))),
    }
}

fn deserialize_optional_identifier<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "Expected string or number identifier, got {}",
            other
        ))),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapturedImage {
    #[serde(deserialize_with = "deserialize_identifier")]
    pub id: String,
    #[serde(deserialize_with = "deserialize_identifier")]
    pub user_id: String,
    pub image_url: String,
    #[serde(default)]
    pub status: CaptureStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledImage {
    #[serde(deserialize_with = "deserialize_identifier")]
    pub id: String,
    #[serde(
        default,
        deserialize_with = "deserialize_optional_identifier",
        skip_serializing_if = "Option::is_none"
    )]
    pub captured_image_id: Option<String>,
    #[serde(deserialize_with = "deserialize_identifier")]
    pub user_id: String,
    pub labeled_image_url: String,
    pub animal_detected: String,
    pub confidence_score: f64,
}

/// Insert payload for `captured_images`; the store assigns the id.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewCapturedImage {
    pub user_id: String,
    pub image_url: String,
    pub status: CaptureStatus,
}

/// Insert payload for `labeled_images`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewLabeledImage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub captured_image_id: Option<String>,
    pub user_id: String,
    pub labeled_image_url: String,
    pub animal_detected: String,
    pub confidence_score: f64,
}

impl NewCapturedImage {
    pub fn completed(user_id: String, image_url: String) -> Self {
        Self {
            user_id,
            image_url,
            status: CaptureStatus::Completed,
        }
    }

    pub fn into_row(self, id: String) -> CapturedImage {
        CapturedImage {
            id,
            user_id: self.user_id,
            image_url: self.image_url,
            status: self.status,
            metadata: None,
        }
    }
}

impl NewLabeledImage {
    pub fn into_row(self, id: String) -> LabeledImage {
        LabeledImage {
            id,
            captured_image_id: self.captured_image_id,
            user_id: self.user_id,
            labeled_image_url: self.labeled_image_url,
            animal_detected: self.animal_detected,
            confidence_score: self.confidence_score,
        }
    }
}
