use actix_multipart::Multipart;
use actix_web::{web, HttpResponse};
use futures::TryStreamExt;
use log::{info, warn};
use shared::{ProcessImageRequest, StatusResponse};
use std::collections::HashMap;

use crate::error::RelayError;
use crate::payload::ImagePayload;
use crate::relay::{HistoryEntry, ImageNotification, RelayService, MISSING_PARAMETERS};

const IMAGE_FIELDS: [&str; 2] = ["image", "file"];
const MAX_TEXT_FIELD_BYTES: usize = 8 * 1024;

pub const NO_IMAGE_UPLOADED: &str = "No image uploaded";
pub const MISSING_REQUIRED_FIELDS: &str = "Missing required fields";

/// Largest image accepted in a multipart upload, in bytes.
#[derive(Debug, Clone, Copy)]
pub struct UploadLimit(pub usize);

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/").route(web::get().to(index)))
        .service(web::resource("/health").route(web::get().to(health)))
        .service(web::resource("/webhook/process-image").route(web::post().to(process_image)))
        .service(web::resource("/predict").route(web::post().to(predict)))
        .service(web::resource("/save-history").route(web::post().to(save_history)));
}

async fn index() -> HttpResponse {
    HttpResponse::Ok().json(StatusResponse {
        status: "Animal classification relay is running".into(),
    })
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().json(StatusResponse {
        status: "healthy".into(),
    })
}

async fn process_image(
    relay: web::Data<RelayService>,
    body: web::Bytes,
) -> Result<HttpResponse, RelayError> {
    let notification = parse_notification(&body)?;
    let response = relay.process_notification(notification).await?;
    Ok(HttpResponse::Ok().json(response))
}

/// The body is JSON whatever Content-Type the caller declared.
fn parse_notification(body: &[u8]) -> Result<ImageNotification, RelayError> {
    let value: serde_json::Value = serde_json::from_slice(body).map_err(|e| {
        warn!("Unparsable notification body: {}", e);
        RelayError::bad_request("Invalid JSON body")
    })?;
    if !value.is_object() {
        return Err(RelayError::bad_request("Invalid JSON body"));
    }
    let request: ProcessImageRequest = serde_json::from_value(value).map_err(|e| {
        warn!("Malformed notification fields: {}", e);
        RelayError::bad_request(MISSING_PARAMETERS)
    })?;
    ImageNotification::try_from(request)
}

async fn predict(
    relay: web::Data<RelayService>,
    limit: web::Data<UploadLimit>,
    payload: Multipart,
) -> Result<HttpResponse, RelayError> {
    let mut form = read_upload_form(payload, limit.0).await?;
    let image = form
        .image
        .take()
        .ok_or_else(|| RelayError::bad_request(NO_IMAGE_UPLOADED))?;
    info!(
        "Received upload {} ({} bytes, {})",
        image.file_name,
        image.len(),
        image.content_type
    );

    let response = relay
        .classify_upload(image, form.fields.remove("user_id"))
        .await?;
    Ok(HttpResponse::Ok().json(response))
}

async fn save_history(
    relay: web::Data<RelayService>,
    limit: web::Data<UploadLimit>,
    payload: Multipart,
) -> Result<HttpResponse, RelayError> {
    let mut form = read_upload_form(payload, limit.0).await?;
    let (Some(image), Some(animal), Some(confidence), Some(user_id)) = (
        form.image.take(),
        form.fields.remove("animal"),
        form.fields.remove("confidence"),
        form.fields.remove("user_id"),
    ) else {
        return Err(RelayError::bad_request(MISSING_REQUIRED_FIELDS));
    };

    let confidence = confidence
        .parse::<f64>()
        .ok()
        .filter(|c| c.is_finite())
        .ok_or_else(|| RelayError::bad_request("Invalid confidence value"))?;

    let response = relay
        .save_history(HistoryEntry {
            image,
            animal,
            confidence,
            user_id,
        })
        .await?;
    Ok(HttpResponse::Ok().json(response))
}

#[derive(Debug, Default)]
struct UploadForm {
    image: Option<ImagePayload>,
    fields: HashMap<String, String>,
}

/// Collects the first non-empty image part and every non-blank text field.
async fn read_upload_form(
    mut payload: Multipart,
    max_bytes: usize,
) -> Result<UploadForm, RelayError> {
    let mut form = UploadForm::default();

    while let Some(mut field) = payload.try_next().await.map_err(malformed)? {
        let name = field.name().unwrap_or_default().to_string();

        if IMAGE_FIELDS.contains(&name.as_str()) {
            let declared_type = field.content_type().map(|m| m.essence_str().to_string());
            let file_name = field
                .content_disposition()
                .and_then(|cd| cd.get_filename())
                .map(str::to_string);

            let mut bytes = Vec::new();
            while let Some(chunk) = field.try_next().await.map_err(malformed)? {
                if bytes.len() + chunk.len() > max_bytes {
                    return Err(RelayError::PayloadTooLarge { limit: max_bytes });
                }
                bytes.extend_from_slice(&chunk);
            }

            if form.image.is_none() && !bytes.is_empty() {
                form.image = Some(ImagePayload::new(
                    bytes,
                    declared_type.as_deref(),
                    file_name.as_deref(),
                ));
            }
        } else {
            let mut bytes = Vec::new();
            while let Some(chunk) = field.try_next().await.map_err(malformed)? {
                if bytes.len() + chunk.len() > MAX_TEXT_FIELD_BYTES {
                    return Err(RelayError::bad_request(format!("Field {} is too long", name)));
                }
                bytes.extend_from_slice(&chunk);
            }
            let value = String::from_utf8_lossy(&bytes).trim().to_string();
            if !value.is_empty() {
                form.fields.insert(name, value);
            }
        }
    }

    Ok(form)
}

fn malformed(e: actix_multipart::MultipartError) -> RelayError {
    warn!("Malformed multipart body: {}", e);
    RelayError::bad_request("Malformed multipart body")
}
