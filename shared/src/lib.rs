use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Lifecycle of a captured image row while the relay classifies it.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum CaptureStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
}

/// Row identifiers arrive either as JSON strings or as bare numbers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Identifier {
    Text(String),
    Unsigned(u64),
    Signed(i64),
}

impl Identifier {
    pub fn to_text(&self) -> String {
        match self {
            Identifier::Text(s) => s.trim().to_string(),
            Identifier::Unsigned(n) => n.to_string(),
            Identifier::Signed(n) => n.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessImageRequest {
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub captured_image_id: Option<Identifier>,
    #[serde(default)]
    pub user_id: Option<Identifier>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResponse {
    pub status: String,
    pub animal: String,
    pub confidence: f64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub image_url: Option<String>,
}

impl ClassificationResponse {
    pub fn success(animal: String, confidence: f64) -> Self {
        Self {
            status: "success".into(),
            animal,
            confidence,
            image_url: None,
        }
    }

    pub fn with_image_url(mut self, image_url: String) -> Self {
        self.image_url = Some(image_url);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveHistoryResponse {
    pub status: String,
    pub image_url: String,
}

impl SaveHistoryResponse {
    pub fn saved(image_url: String) -> Self {
        Self {
            status: "saved".into(),
            image_url,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
