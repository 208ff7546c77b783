use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use shared::ErrorResponse;

use crate::classifier::ClassifierError;
use crate::db::RepositoryError;
use crate::download::DownloadError;
use crate::storage::StorageError;

/// Every way a relay request can fail. `Display` carries the detail that is
/// logged and written to row metadata; clients only see `client_message`.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("{0}")]
    BadRequest(String),
    #[error("Upload exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },
    #[error(transparent)]
    Download(#[from] DownloadError),
    #[error(transparent)]
    Classifier(#[from] ClassifierError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error("{0}")]
    Internal(String),
}

impl RelayError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        RelayError::BadRequest(message.into())
    }

    pub fn internal(e: impl std::fmt::Display) -> Self {
        RelayError::Internal(e.to_string())
    }

    pub fn client_message(&self) -> String {
        match self {
            RelayError::BadRequest(message) => message.clone(),
            RelayError::PayloadTooLarge { .. } => "Image too large".to_string(),
            RelayError::Download(_) => "Failed to download image".to_string(),
            RelayError::Classifier(_) => "Classification failed".to_string(),
            RelayError::Storage(_) => "Failed to store image".to_string(),
            RelayError::Repository(_) => "Failed to update records".to_string(),
            RelayError::Internal(_) => "Internal server error".to_string(),
        }
    }
}

impl ResponseError for RelayError {
    fn status_code(&self) -> StatusCode {
        match self {
            RelayError::BadRequest(_) => StatusCode::BAD_REQUEST,
            RelayError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        if self.status_code().is_server_error() {
            log::error!("Request failed: {}", self);
        } else {
            log::warn!("Rejected request: {}", self);
        }
        HttpResponse::build(self.status_code()).json(ErrorResponse {
            error: self.client_message(),
        })
    }
}
