pub mod persistence;

use log::{debug, error, info};
use shared::{
    CaptureStatus, ClassificationResponse, ProcessImageRequest, SaveHistoryResponse,
};
use std::sync::Arc;
use url::Url;

use crate::classifier::{Classifier, Prediction};
use crate::config::PersistenceMode;
use crate::db::model::NewLabeledImage;
use crate::db::RecordStore;
use crate::download::{parse_image_url, ImageFetcher};
use crate::error::RelayError;
use crate::payload::ImagePayload;
use crate::storage::ObjectStore;
use persistence::{ImagePersister, PersistJob, PersistenceQueue};

pub const MISSING_PARAMETERS: &str = "Missing parameters";

/// A notify-by-reference request whose fields have all been checked.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageNotification {
    pub image_url: String,
    pub source: Url,
    pub captured_image_id: String,
    pub user_id: String,
}

impl TryFrom<ProcessImageRequest> for ImageNotification {
    type Error = RelayError;

    fn try_from(request: ProcessImageRequest) -> Result<Self, Self::Error> {
        let image_url = request
            .image_url
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty());
        let captured_image_id = request
            .captured_image_id
            .map(|id| id.to_text())
            .filter(|id| !id.is_empty());
        let user_id = request
            .user_id
            .map(|id| id.to_text())
            .filter(|id| !id.is_empty());

        let (Some(image_url), Some(captured_image_id), Some(user_id)) =
            (image_url, captured_image_id, user_id)
        else {
            return Err(RelayError::bad_request(MISSING_PARAMETERS));
        };

        let source = parse_image_url(&image_url)
            .ok_or_else(|| RelayError::bad_request("Invalid image_url"))?;

        Ok(Self {
            image_url,
            source,
            captured_image_id,
            user_id,
        })
    }
}

/// A `/save-history` submission: the client already knows the verdict.
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub image: ImagePayload,
    pub animal: String,
    pub confidence: f64,
    pub user_id: String,
}

/// Bridges inbound requests to the classifier and the hosted store.
pub struct RelayService {
    fetcher: Arc<dyn ImageFetcher>,
    classifier: Arc<dyn Classifier>,
    records: Arc<dyn RecordStore>,
    persister: ImagePersister,
    queue: PersistenceQueue,
    mode: PersistenceMode,
}

impl RelayService {
    /// Must be called inside the actix runtime: it starts the persistence worker.
    pub fn new(
        fetcher: Arc<dyn ImageFetcher>,
        classifier: Arc<dyn Classifier>,
        records: Arc<dyn RecordStore>,
        objects: Arc<dyn ObjectStore>,
        mode: PersistenceMode,
        queue_capacity: usize,
    ) -> Self {
        let persister = ImagePersister::new(records.clone(), objects);
        let queue = PersistenceQueue::start(persister.clone(), queue_capacity);
        Self {
            fetcher,
            classifier,
            records,
            persister,
            queue,
            mode,
        }
    }

    pub fn queue(&self) -> &PersistenceQueue {
        &self.queue
    }

    /// processing → completed, or → failed with the error text as metadata.
    pub async fn process_notification(
        &self,
        notification: ImageNotification,
    ) -> Result<ClassificationResponse, RelayError> {
        let id = notification.captured_image_id.as_str();
        info!("Processing captured_image_id: {}", id);

        self.records
            .set_capture_status(id, CaptureStatus::Processing, None)
            .await?;

        match self.classify_reference(&notification).await {
            Ok(prediction) => Ok(ClassificationResponse::success(
                prediction.label,
                prediction.confidence,
            )),
            Err(e) => {
                error!("Processing captured image {} failed: {}", id, e);
                let detail = e.to_string();
                if let Err(mark_err) = self
                    .records
                    .set_capture_status(id, CaptureStatus::Failed, Some(&detail))
                    .await
                {
                    error!("Could not mark captured image {} as failed: {}", id, mark_err);
                }
                Err(e)
            }
        }
    }

    async fn classify_reference(
        &self,
        notification: &ImageNotification,
    ) -> Result<Prediction, RelayError> {
        let image = self.fetcher.fetch(&notification.source).await?;
        let prediction = self.classifier.classify(&image).await?;
        info!(
            "Captured image {} classified as {} ({:.2}%)",
            notification.captured_image_id, prediction.label, prediction.confidence
        );

        self.records
            .insert_labeled_image(NewLabeledImage {
                captured_image_id: Some(notification.captured_image_id.clone()),
                user_id: notification.user_id.clone(),
                labeled_image_url: notification.image_url.clone(),
                animal_detected: prediction.label.clone(),
                confidence_score: prediction.confidence,
            })
            .await?;

        self.records
            .set_capture_status(&notification.captured_image_id, CaptureStatus::Completed, None)
            .await?;

        Ok(prediction)
    }

    /// Classifies an upload; persists it only when the caller identified a user.
    pub async fn classify_upload(
        &self,
        image: ImagePayload,
        user_id: Option<String>,
    ) -> Result<ClassificationResponse, RelayError> {
        let prediction = self.classifier.classify(&image).await?;
        info!(
            "Upload classified as {} ({:.2}%)",
            prediction.label, prediction.confidence
        );
        let response =
            ClassificationResponse::success(prediction.label.clone(), prediction.confidence);

        let Some(user_id) = user_id else {
            debug!("No user_id supplied, skipping persistence");
            return Ok(response);
        };
        let job = PersistJob {
            image,
            user_id,
            prediction,
        };

        match self.mode {
            PersistenceMode::Sync => {
                // Same worker as background jobs, so uploads stay in submission order.
                let ticket = self.queue.submit(job).map_err(RelayError::internal)?;
                let persisted = ticket
                    .await
                    .map_err(|_| RelayError::internal("Persistence worker dropped the job"))??;
                Ok(response.with_image_url(persisted.image_url))
            }
            PersistenceMode::Background => {
                let user_id = job.user_id.clone();
                match self.queue.submit(job) {
                    Ok(_ticket) => debug!("Queued persistence for user {}", user_id),
                    Err(e) => error!("Dropping persistence for user {}: {}", user_id, e),
                }
                Ok(response)
            }
        }
    }

    pub async fn save_history(
        &self,
        entry: HistoryEntry,
    ) -> Result<SaveHistoryResponse, RelayError> {
        let job = PersistJob {
            image: entry.image,
            user_id: entry.user_id,
            prediction: Prediction {
                label: entry.animal,
                confidence: entry.confidence,
            },
        };
        let persisted = self.persister.persist(&job).await?;
        info!(
            "Saved history entry {} for user {}",
            persisted.captured.id, job.user_id
        );
        Ok(SaveHistoryResponse::saved(persisted.image_url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::HttpImageFetcher;
    use crate::testing::{
        sample_jpeg, MemoryObjectStore, MemoryRecordStore, ScriptedClassifier, StaticFetcher,
    };
    use serde_json::json;
    use shared::Identifier;
    use std::time::Duration;

    struct Harness {
        fetcher: Arc<StaticFetcher>,
        classifier: Arc<ScriptedClassifier>,
        records: Arc<MemoryRecordStore>,
        objects: Arc<MemoryObjectStore>,
    }

    impl Harness {
        fn new(classifier: ScriptedClassifier) -> Self {
            Self {
                fetcher: Arc::new(StaticFetcher::serving()),
                classifier: Arc::new(classifier),
                records: Arc::new(MemoryRecordStore::with_pending(
                    "abc",
                    "u1",
                    "https://x/img.jpg",
                )),
                objects: Arc::new(MemoryObjectStore::default()),
            }
        }

        fn relay(&self, mode: PersistenceMode) -> RelayService {
            RelayService::new(
                self.fetcher.clone(),
                self.classifier.clone(),
                self.records.clone(),
                self.objects.clone(),
                mode,
                8,
            )
        }
    }

    fn notification() -> ImageNotification {
        ImageNotification::try_from(ProcessImageRequest {
            image_url: Some("https://x/img.jpg".into()),
            captured_image_id: Some(Identifier::Text("abc".into())),
            user_id: Some(Identifier::Text("u1".into())),
        })
        .unwrap()
    }

    #[test]
    fn notification_requires_every_field() {
        let err = ImageNotification::try_from(ProcessImageRequest {
            image_url: Some("https://x/img.jpg".into()),
            captured_image_id: Some(Identifier::Text("  ".into())),
            user_id: Some(Identifier::Text("u1".into())),
        })
        .unwrap_err();
        assert_eq!(err.client_message(), MISSING_PARAMETERS);

        let err = ImageNotification::try_from(ProcessImageRequest {
            image_url: Some("not-a-url".into()),
            captured_image_id: Some(Identifier::Unsigned(7)),
            user_id: Some(Identifier::Text("u1".into())),
        })
        .unwrap_err();
        assert_eq!(err.client_message(), "Invalid image_url");
    }

    #[actix_web::test]
    async fn notification_success_completes_capture() {
        let h = Harness::new(ScriptedClassifier::answering(
            json!({"label": "fox", "confidence": 0.92}),
        ));
        let relay = h.relay(PersistenceMode::Background);

        let response = relay.process_notification(notification()).await.unwrap();
        assert_eq!(response, ClassificationResponse::success("fox".into(), 92.0));

        let captured = h.records.captured("abc").unwrap();
        assert_eq!(captured.status, CaptureStatus::Completed);
        let labeled = h.records.labeled_rows();
        assert_eq!(labeled.len(), 1);
        assert_eq!(labeled[0].captured_image_id.as_deref(), Some("abc"));
        assert_eq!(labeled[0].labeled_image_url, "https://x/img.jpg");
        assert_eq!(labeled[0].confidence_score, 92.0);
        assert_eq!(h.objects.attempts(), 0);
    }

    #[actix_web::test]
    async fn classifier_error_marks_capture_failed() {
        let h = Harness::new(ScriptedClassifier::failing_with(500));
        let relay = h.relay(PersistenceMode::Background);

        let err = relay.process_notification(notification()).await.unwrap_err();
        assert!(matches!(err, RelayError::Classifier(_)));

        let captured = h.records.captured("abc").unwrap();
        assert_eq!(captured.status, CaptureStatus::Failed);
        let metadata = captured.metadata.unwrap();
        assert!(metadata.as_str().unwrap().contains("Model returned 500"));
        assert!(h.records.labeled_rows().is_empty());
    }

    #[actix_web::test]
    async fn unreachable_image_url_fails_without_labeling() {
        let h = Harness::new(ScriptedClassifier::answering(json!({"label": "fox"})));
        let relay = RelayService::new(
            Arc::new(HttpImageFetcher::new(
                reqwest::Client::new(),
                Duration::from_secs(2),
                1024,
            )),
            h.classifier.clone(),
            h.records.clone(),
            h.objects.clone(),
            PersistenceMode::Background,
            8,
        );
        let mut unreachable = notification();
        unreachable.source = Url::parse("http://127.0.0.1:9/img.jpg").unwrap();

        let err = relay.process_notification(unreachable).await.unwrap_err();
        assert!(matches!(err, RelayError::Download(_)));
        assert_eq!(h.classifier.calls(), 0);
        assert!(h.records.labeled_rows().is_empty());
        assert_eq!(h.records.captured("abc").unwrap().status, CaptureStatus::Failed);
    }

    #[actix_web::test]
    async fn download_status_is_recorded_as_failure() {
        let h = Harness {
            fetcher: Arc::new(StaticFetcher::returning_status(404)),
            ..Harness::new(ScriptedClassifier::answering(json!({"label": "fox"})))
        };
        let relay = h.relay(PersistenceMode::Background);

        let err = relay.process_notification(notification()).await.unwrap_err();
        assert_eq!(err.client_message(), "Failed to download image");
        let captured = h.records.captured("abc").unwrap();
        assert_eq!(captured.status, CaptureStatus::Failed);
        assert_eq!(
            captured.metadata,
            Some(serde_json::Value::String("Image download returned HTTP 404".into()))
        );
        assert_eq!(h.classifier.calls(), 0);
    }

    #[actix_web::test]
    async fn late_record_failure_still_settles_to_failed() {
        let h = Harness::new(ScriptedClassifier::answering(
            json!({"label": "fox", "confidence": 0.5}),
        ));
        h.records.fail_labeled_inserts();
        let relay = h.relay(PersistenceMode::Background);

        let err = relay.process_notification(notification()).await.unwrap_err();
        assert!(matches!(err, RelayError::Repository(_)));
        assert_eq!(h.records.captured("abc").unwrap().status, CaptureStatus::Failed);
    }

    #[actix_web::test]
    async fn unknown_capture_stops_before_download() {
        let h = Harness::new(ScriptedClassifier::answering(json!({"label": "fox"})));
        let relay = h.relay(PersistenceMode::Background);
        let mut missing = notification();
        missing.captured_image_id = "nope".into();

        let err = relay.process_notification(missing).await.unwrap_err();
        assert!(matches!(err, RelayError::Repository(_)));
        assert_eq!(h.fetcher.calls(), 0);
        assert_eq!(h.classifier.calls(), 0);
    }

    #[actix_web::test]
    async fn repeated_notification_adds_another_label() {
        let h = Harness::new(ScriptedClassifier::answering(
            json!({"label": "fox", "confidence": 0.92}),
        ));
        let relay = h.relay(PersistenceMode::Background);

        relay.process_notification(notification()).await.unwrap();
        relay.process_notification(notification()).await.unwrap();

        let labeled = h.records.labeled_rows();
        assert_eq!(labeled.len(), 2);
        assert_ne!(labeled[0].id, labeled[1].id);
    }

    #[actix_web::test]
    async fn sync_upload_returns_public_url() {
        let h = Harness::new(ScriptedClassifier::answering(
            json!({"label": "owl", "confidence": 0.87}),
        ));
        let relay = h.relay(PersistenceMode::Sync);

        let response = relay
            .classify_upload(sample_jpeg(), Some("u9".into()))
            .await
            .unwrap();
        assert_eq!(response.confidence, 87.0);
        let image_url = response.image_url.unwrap();
        assert!(image_url.starts_with("memory://animal-images/u9/"));

        let labeled = h.records.labeled_rows();
        assert_eq!(labeled.len(), 1);
        assert_eq!(labeled[0].labeled_image_url, image_url);
    }

    #[actix_web::test]
    async fn sync_upload_after_shutdown_is_internal_error() {
        let h = Harness::new(ScriptedClassifier::answering(
            json!({"label": "owl", "confidence": 0.87}),
        ));
        let relay = h.relay(PersistenceMode::Sync);
        relay.queue().drain().await;
        actix_web::rt::time::sleep(Duration::from_millis(20)).await;

        let err = relay
            .classify_upload(sample_jpeg(), Some("u9".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::Internal(_)));
        assert_eq!(err.client_message(), "Internal server error");
        assert_eq!(err.to_string(), "Persistence queue is closed");
        assert_eq!(h.objects.attempts(), 0);
    }

    #[actix_web::test]
    async fn anonymous_upload_is_not_persisted() {
        let h = Harness::new(ScriptedClassifier::answering(json!({"label": "owl"})));
        let relay = h.relay(PersistenceMode::Sync);

        let response = relay.classify_upload(sample_jpeg(), None).await.unwrap();
        assert_eq!(response.animal, "owl");
        assert!(response.image_url.is_none());
        assert_eq!(h.objects.attempts(), 0);
    }

    #[actix_web::test]
    async fn background_upload_answers_before_storage_fails() {
        let h = Harness {
            objects: Arc::new(MemoryObjectStore::failing()),
            ..Harness::new(ScriptedClassifier::answering(
                json!({"label": "deer", "confidence": 0.4}),
            ))
        };
        let relay = h.relay(PersistenceMode::Background);

        let response = relay
            .classify_upload(sample_jpeg(), Some("u1".into()))
            .await
            .unwrap();
        assert_eq!(response, ClassificationResponse::success("deer".into(), 40.0));

        relay.queue().drain().await;
        assert_eq!(h.objects.attempts(), 1);
        assert!(h.records.labeled_rows().is_empty());
    }

    #[actix_web::test]
    async fn save_history_stores_given_verdict() {
        let h = Harness::new(ScriptedClassifier::answering(json!({})));
        let relay = h.relay(PersistenceMode::Background);

        let response = relay
            .save_history(HistoryEntry {
                image: sample_jpeg(),
                animal: "hedgehog".into(),
                confidence: 64.5,
                user_id: "u3".into(),
            })
            .await
            .unwrap();
        assert_eq!(response.status, "saved");
        assert_eq!(h.classifier.calls(), 0);

        let labeled = h.records.labeled_rows();
        assert_eq!(labeled[0].animal_detected, "hedgehog");
        assert_eq!(labeled[0].confidence_score, 64.5);
        assert_eq!(labeled[0].labeled_image_url, response.image_url);
    }
}
