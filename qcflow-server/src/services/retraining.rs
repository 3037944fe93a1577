//! Retraining jobs
//!
//! `POST /api/model/retraining` stores a queued job and hands its id to a
//! single background worker over an mpsc queue. The worker submits the job
//! to the external training service, records the outcome and, on success,
//! writes a model performance snapshot.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use qcflow_common::config::FeedbackCountMode;
use qcflow_common::events::{EventBus, QcEvent};
use reqwest::Client;
use serde::Serialize;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::db;
use crate::models::{JobStatus, RetrainingJob};

/// Queue depth; only one job is active at a time, so this is never reached
const QUEUE_CAPACITY: usize = 16;

#[derive(Debug, Error)]
pub enum RetrainingError {
    #[error("Retraining needs {threshold} counted feedback records, have {count}")]
    BelowThreshold { count: i64, threshold: i64 },

    #[error("Retraining worker is not running")]
    QueueClosed,

    #[error(transparent)]
    Common(#[from] qcflow_common::Error),
}

/// Training service errors
#[derive(Debug, Error)]
pub enum TrainingError {
    #[error("Training service is not configured")]
    NotConfigured,

    #[error("Training service unreachable: {0}")]
    Network(String),

    #[error("Training service returned HTTP {0}: {1}")]
    Api(u16, String),
}

/// Body POSTed to the training service
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingRequest {
    pub job_id: Uuid,
    pub feedback_count: i64,
    pub requested_at: DateTime<Utc>,
}

#[async_trait]
pub trait TrainingService: Send + Sync {
    /// Submit a job; any reply text is kept as the job message
    async fn submit(&self, request: &TrainingRequest) -> Result<Option<String>, TrainingError>;
}

pub struct HttpTrainingClient {
    http_client: Client,
    url: String,
}

impl HttpTrainingClient {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, TrainingError> {
        let http_client = Client::builder()
            .user_agent(concat!("qcflow-server/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| TrainingError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl TrainingService for HttpTrainingClient {
    async fn submit(&self, request: &TrainingRequest) -> Result<Option<String>, TrainingError> {
        debug!(job_id = %request.job_id, "Submitting retraining job to {}", self.url);

        let response = self
            .http_client
            .post(&self.url)
            .json(request)
            .send()
            .await
            .map_err(|e| TrainingError::Network(e.to_string()))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(TrainingError::Api(status.as_u16(), body));
        }

        let body = body.trim();
        Ok((!body.is_empty()).then(|| body.to_string()))
    }
}

/// Stand-in used when no training URL is configured
pub struct UnconfiguredTrainingService;

#[async_trait]
impl TrainingService for UnconfiguredTrainingService {
    async fn submit(&self, _request: &TrainingRequest) -> Result<Option<String>, TrainingError> {
        Err(TrainingError::NotConfigured)
    }
}

/// Sending half of the worker queue
#[derive(Clone)]
pub struct RetrainingQueue {
    tx: mpsc::Sender<Uuid>,
}

impl RetrainingQueue {
    pub async fn enqueue(&self, job_id: Uuid) -> Result<(), RetrainingError> {
        self.tx
            .send(job_id)
            .await
            .map_err(|_| RetrainingError::QueueClosed)
    }
}

/// Create a retraining job, or return the one already in progress
///
/// The threshold is checked here, not trusted from the client. Returns the
/// job and whether it was created by this call.
pub async fn request_retraining(
    pool: &SqlitePool,
    event_bus: &EventBus,
    queue: &RetrainingQueue,
    requested_by: Uuid,
    threshold: i64,
    count_mode: FeedbackCountMode,
) -> Result<(RetrainingJob, bool), RetrainingError> {
    let count = db::feedback::count_for_retraining(pool, count_mode).await?;
    if count < threshold {
        return Err(RetrainingError::BelowThreshold { count, threshold });
    }

    let (job, created) = db::retraining::insert_job_if_idle(pool, count, requested_by).await?;
    if !created {
        info!(job_id = %job.id, status = %job.status, "Retraining already in progress");
        return Ok((job, false));
    }

    if let Err(e) = queue.enqueue(job.id).await {
        db::retraining::mark_finished(
            pool,
            job.id,
            JobStatus::Failed,
            Some("Retraining worker is not running"),
            Utc::now(),
        )
        .await?;
        return Err(e);
    }

    info!(job_id = %job.id, feedback_count = count, "Retraining job queued");
    publish(event_bus, job.id, JobStatus::Queued);

    Ok((job, true))
}

/// Background worker draining the queue one job at a time
pub struct RetrainingWorker {
    db: SqlitePool,
    event_bus: EventBus,
    trainer: Arc<dyn TrainingService>,
    rx: mpsc::Receiver<Uuid>,
    cancel: CancellationToken,
}

impl RetrainingWorker {
    pub async fn run(mut self) {
        info!("Retraining worker started");
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("Retraining worker stopping");
                    break;
                }
                job_id = self.rx.recv() => {
                    let Some(job_id) = job_id else {
                        info!("Retraining queue closed");
                        break;
                    };
                    if let Err(e) = self.process(job_id).await {
                        error!(job_id = %job_id, "Retraining job bookkeeping failed: {}", e);
                    }
                }
            }
        }
    }

    async fn process(&self, job_id: Uuid) -> qcflow_common::Result<()> {
        if !db::retraining::mark_running(&self.db, job_id, Utc::now()).await? {
            warn!(job_id = %job_id, "Job is not queued, skipping");
            return Ok(());
        }
        publish(&self.event_bus, job_id, JobStatus::Running);

        let feedback_count = db::retraining::get_job(&self.db, job_id)
            .await?
            .map(|job| job.feedback_count)
            .unwrap_or_default();
        let request = TrainingRequest {
            job_id,
            feedback_count,
            requested_at: Utc::now(),
        };

        let outcome = match self.trainer.submit(&request).await {
            Ok(reply) => self.record_success(job_id, reply.as_deref()).await,
            Err(e) => Err(e.to_string()),
        };

        if let Err(message) = outcome {
            warn!(job_id = %job_id, "Retraining job failed: {}", message);
            db::retraining::mark_finished(
                &self.db,
                job_id,
                JobStatus::Failed,
                Some(&message),
                Utc::now(),
            )
            .await?;
            publish(&self.event_bus, job_id, JobStatus::Failed);
        }

        Ok(())
    }

    /// Snapshot performance and complete the job
    ///
    /// Any error is returned as the message the job fails with.
    async fn record_success(&self, job_id: Uuid, reply: Option<&str>) -> Result<(), String> {
        let bookkeeping = |e: qcflow_common::Error| format!("Recording training result failed: {}", e);

        let (total, incorrect) = db::feedback::totals(&self.db).await.map_err(bookkeeping)?;
        let snapshot = db::retraining::insert_performance(&self.db, total, incorrect, Some(job_id))
            .await
            .map_err(bookkeeping)?;
        db::retraining::mark_finished(&self.db, job_id, JobStatus::Completed, reply, Utc::now())
            .await
            .map_err(bookkeeping)?;

        info!(
            job_id = %job_id,
            accuracy = snapshot.accuracy,
            "Retraining job completed"
        );
        publish(&self.event_bus, job_id, JobStatus::Completed);
        Ok(())
    }
}

/// Spawn the worker; it stops when `cancel` fires or every queue handle drops
pub fn spawn_retraining_worker(
    db: SqlitePool,
    event_bus: EventBus,
    trainer: Arc<dyn TrainingService>,
    cancel: CancellationToken,
) -> (RetrainingQueue, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
    let worker = RetrainingWorker {
        db,
        event_bus,
        trainer,
        rx,
        cancel,
    };
    (RetrainingQueue { tx }, tokio::spawn(worker.run()))
}

fn publish(event_bus: &EventBus, job_id: Uuid, status: JobStatus) {
    event_bus.emit_lossy(QcEvent::RetrainingJobUpdated {
        job_id,
        status: status.to_string(),
        timestamp: Utc::now(),
    });
}
