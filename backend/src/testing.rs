//! In-memory collaborators and stub HTTP servers for unit tests.

use actix_web::{web, App, HttpServer};
use async_trait::async_trait;
use shared::CaptureStatus;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use url::Url;

use crate::classifier::{Classifier, ClassifierError, Prediction};
use crate::db::model::{CapturedImage, LabeledImage, NewCapturedImage, NewLabeledImage};
use crate::db::{RecordStore, RepositoryError};
use crate::download::{DownloadError, ImageFetcher};
use crate::payload::ImagePayload;
use crate::storage::{ObjectStore, StorageError};

pub const JPEG_BYTES: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F', 0x00];

pub fn sample_jpeg() -> ImagePayload {
    ImagePayload::new(JPEG_BYTES.to_vec(), Some("image/jpeg"), Some("capture.jpg"))
}

/// Serves `routes` on an ephemeral local port and returns its base URL.
pub fn serve(routes: fn(&mut web::ServiceConfig)) -> String {
    let server = HttpServer::new(move || App::new().configure(routes))
        .workers(1)
        .disable_signals()
        .bind(("127.0.0.1", 0))
        .expect("bind stub server");
    let addr = server.addrs()[0];
    actix_web::rt::spawn(server.run());
    format!("http://{}", addr)
}

pub struct StaticFetcher {
    status: Option<u16>,
    calls: AtomicUsize,
}

impl StaticFetcher {
    pub fn serving() -> Self {
        Self {
            status: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn returning_status(status: u16) -> Self {
        Self {
            status: Some(status),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageFetcher for StaticFetcher {
    async fn fetch(&self, _url: &Url) -> Result<ImagePayload, DownloadError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.status {
            Some(status) => Err(DownloadError::Status(status)),
            None => Ok(ImagePayload::new(JPEG_BYTES.to_vec(), None, Some("image.jpg"))),
        }
    }
}

pub struct ScriptedClassifier {
    outcome: Result<serde_json::Value, u16>,
    calls: AtomicUsize,
}

impl ScriptedClassifier {
    /// Answers every request with `body`, parsed the way the HTTP client parses it.
    pub fn answering(body: serde_json::Value) -> Self {
        Self {
            outcome: Ok(body),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing_with(status: u16) -> Self {
        Self {
            outcome: Err(status),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Classifier for ScriptedClassifier {
    async fn classify(&self, _image: &ImagePayload) -> Result<Prediction, ClassifierError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.outcome {
            Ok(body) => Ok(Prediction::from_json(body)),
            Err(status) => Err(ClassifierError::Status {
                status: *status,
                body: "Internal Server Error".to_string(),
            }),
        }
    }
}

#[derive(Default)]
pub struct MemoryRecordStore {
    captured: Mutex<HashMap<String, CapturedImage>>,
    labeled: Mutex<Vec<LabeledImage>>,
    next_id: AtomicUsize,
    fail_labeled_inserts: AtomicBool,
    calls: AtomicUsize,
}

impl MemoryRecordStore {
    pub fn with_pending(id: &str, user_id: &str, image_url: &str) -> Self {
        let store = Self::default();
        store.captured.lock().unwrap().insert(
            id.to_string(),
            CapturedImage {
                id: id.to_string(),
                user_id: user_id.to_string(),
                image_url: image_url.to_string(),
                status: CaptureStatus::Pending,
                metadata: None,
            },
        );
        store
    }

    pub fn fail_labeled_inserts(&self) {
        self.fail_labeled_inserts.store(true, Ordering::SeqCst);
    }

    pub fn captured(&self, id: &str) -> Option<CapturedImage> {
        self.captured.lock().unwrap().get(id).cloned()
    }

    pub fn captured_rows(&self) -> Vec<CapturedImage> {
        self.captured.lock().unwrap().values().cloned().collect()
    }

    pub fn labeled_rows(&self) -> Vec<LabeledImage> {
        self.labeled.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_id(&self, prefix: &str) -> String {
        format!("{}-{}", prefix, self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn set_capture_status(
        &self,
        id: &str,
        status: CaptureStatus,
        metadata: Option<&str>,
    ) -> Result<(), RepositoryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut captured = self.captured.lock().unwrap();
        let row = captured
            .get_mut(id)
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))?;
        row.status = status;
        if let Some(metadata) = metadata {
            row.metadata = Some(serde_json::Value::String(metadata.to_string()));
        }
        Ok(())
    }

    async fn insert_captured_image(
        &self,
        image: NewCapturedImage,
    ) -> Result<CapturedImage, RepositoryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let row = image.into_row(self.next_id("cap"));
        self.captured
            .lock()
            .unwrap()
            .insert(row.id.clone(), row.clone());
        Ok(row)
    }

    async fn insert_labeled_image(
        &self,
        image: NewLabeledImage,
    ) -> Result<LabeledImage, RepositoryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_labeled_inserts.load(Ordering::SeqCst) {
            return Err(RepositoryError::NoRowReturned("labeled_images".to_string()));
        }
        let row = image.into_row(self.next_id("lab"));
        self.labeled.lock().unwrap().push(row.clone());
        Ok(row)
    }
}

#[derive(Default)]
pub struct MemoryObjectStore {
    objects: Mutex<HashMap<String, (Vec<u8>, String)>>,
    failing: bool,
    attempts: AtomicUsize,
}

impl MemoryObjectStore {
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub fn object_count(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn content_type_of(&self, key: &str) -> Option<String> {
        self.objects
            .lock()
            .unwrap()
            .get(key)
            .map(|(_, content_type)| content_type.clone())
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn upload(
        &self,
        key: &str,
        data: &[u8],
        content_type: &str,
    ) -> Result<(), StorageError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.failing {
            return Err(StorageError::Status {
                status: 503,
                body: "bucket unavailable".to_string(),
            });
        }
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), (data.to_vec(), content_type.to_string()));
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        format!("memory://animal-images/{}", key)
    }
}
