use chrono::Utc;
use log::{debug, error, info, warn};
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};

use crate::classifier::Prediction;
use crate::db::model::{CapturedImage, LabeledImage, NewCapturedImage, NewLabeledImage};
use crate::db::RecordStore;
use crate::error::RelayError;
use crate::payload::ImagePayload;
use crate::storage::{object_key, ObjectStore};

/// An uploaded image and its verdict, waiting to be written out.
#[derive(Debug, Clone)]
pub struct PersistJob {
    pub image: ImagePayload,
    pub user_id: String,
    pub prediction: Prediction,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PersistedImage {
    pub image_url: String,
    pub captured: CapturedImage,
    pub labeled: LabeledImage,
}

/// Upload, then `captured_images`, then `labeled_images`. No rollback on partial failure.
#[derive(Clone)]
pub struct ImagePersister {
    records: Arc<dyn RecordStore>,
    objects: Arc<dyn ObjectStore>,
}

impl ImagePersister {
    pub fn new(records: Arc<dyn RecordStore>, objects: Arc<dyn ObjectStore>) -> Self {
        Self { records, objects }
    }

    pub async fn persist(&self, job: &PersistJob) -> Result<PersistedImage, RelayError> {
        let key = object_key(&job.user_id, job.image.extension(), Utc::now());
        self.objects
            .upload(&key, &job.image.bytes, &job.image.content_type)
            .await?;
        let image_url = self.objects.public_url(&key);

        let captured = self
            .records
            .insert_captured_image(NewCapturedImage::completed(
                job.user_id.clone(),
                image_url.clone(),
            ))
            .await?;

        let labeled = self
            .records
            .insert_labeled_image(NewLabeledImage {
                captured_image_id: Some(captured.id.clone()),
                user_id: job.user_id.clone(),
                labeled_image_url: image_url.clone(),
                animal_detected: job.prediction.label.clone(),
                confidence_score: job.prediction.confidence,
            })
            .await?;

        Ok(PersistedImage {
            image_url,
            captured,
            labeled,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Persistence queue is full")]
    Full,
    #[error("Persistence queue is closed")]
    Closed,
}

/// Resolves once the worker has finished the job.
pub type PersistenceTicket = oneshot::Receiver<Result<PersistedImage, RelayError>>;

enum Command {
    Persist {
        job: PersistJob,
        reply: oneshot::Sender<Result<PersistedImage, RelayError>>,
    },
    Drain(oneshot::Sender<()>),
}

/// Bounded FIFO of persistence jobs served by a single worker task.
#[derive(Clone)]
pub struct PersistenceQueue {
    sender: mpsc::Sender<Command>,
}

impl PersistenceQueue {
    /// Spawns the worker on the current actix runtime.
    pub fn start(persister: ImagePersister, capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        actix_web::rt::spawn(run_worker(persister, receiver));
        Self { sender }
    }

    pub fn submit(&self, job: PersistJob) -> Result<PersistenceTicket, QueueError> {
        let (reply, ticket) = oneshot::channel();
        self.sender
            .try_send(Command::Persist { job, reply })
            .map_err(|e| match e {
                TrySendError::Full(_) => QueueError::Full,
                TrySendError::Closed(_) => QueueError::Closed,
            })?;
        Ok(ticket)
    }

    /// Waits until every job submitted before this call has run, then stops the worker.
    pub async fn drain(&self) {
        let (ack, done) = oneshot::channel();
        if self.sender.send(Command::Drain(ack)).await.is_err() {
            return;
        }
        let _ = done.await;
    }
}

async fn run_worker(persister: ImagePersister, mut receiver: mpsc::Receiver<Command>) {
    debug!("Persistence worker started");
    while let Some(command) = receiver.recv().await {
        match command {
            Command::Persist { job, reply } => {
                let result = persister.persist(&job).await;
                match &result {
                    Ok(persisted) => info!(
                        "Stored {} for user {} as captured image {}",
                        persisted.image_url, job.user_id, persisted.captured.id
                    ),
                    Err(e) => error!("Background persistence for user {} failed: {}", job.user_id, e),
                }
                if reply.send(result).is_err() {
                    debug!("Nobody is waiting on the persistence result");
                }
            }
            Command::Drain(ack) => {
                let pending = receiver.len();
                if pending > 0 {
                    warn!("Persistence worker stopping with {} late jobs unprocessed", pending);
                }
                let _ = ack.send(());
                break;
            }
        }
    }
    info!("Persistence worker stopped");
}
