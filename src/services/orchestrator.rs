//! Menu recognition job lifecycle.
//!
//! `create` inserts the job row and queues a work item; a single dispatcher
//! task drains the bounded queue and runs each item under a semaphore permit.
//! Every item owns exactly one continuation, which performs the job's only
//! terminal transition (`processing -> completed | failed`) and then reports
//! the persisted view on the item's completion channel.

use chrono::Utc;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot, Semaphore};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::models::job::{JobState, JobView, NewJob};
use crate::models::menu::{CanonicalRecognitionResult, RecognitionHints};
use crate::services::catalog::CatalogStore;
use crate::services::mapper;
use crate::services::reconcile::Reconciler;
use crate::services::recognizer::{RecognitionRequest, Recognizer, RecognizerError};
use crate::services::store::{JobStore, StoreError};

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Recognitions allowed to run at once.
    pub max_concurrent: usize,
    /// Jobs allowed to wait for a free worker before `create` reports `QueueFull`.
    pub queue_capacity: usize,
    /// `None` lets a hung recognizer keep its job in `processing` forever.
    pub recognizer_timeout: Option<Duration>,
    /// Reported to uploaders as the expected turnaround.
    pub estimated_seconds: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 4,
            queue_capacity: 64,
            recognizer_timeout: None,
            estimated_seconds: 10,
        }
    }
}

/// Request to start recognizing an uploaded menu photo.
#[derive(Debug, Clone)]
pub struct CreateJob {
    pub owner_user_id: i64,
    pub image_path: PathBuf,
    pub hints: RecognitionHints,
}

/// A freshly created job.
///
/// `completion` yields the persisted terminal view. It closes without a value
/// if the terminal state could not be written. Dropping it is fine.
#[derive(Debug)]
pub struct CreatedJob {
    pub job_id: String,
    pub state: JobState,
    pub estimated_seconds: u64,
    pub completion: oneshot::Receiver<JobView>,
}

struct WorkItem {
    job_id: String,
    owner_user_id: i64,
    image_path: PathBuf,
    hints: RecognitionHints,
    completion: oneshot::Sender<JobView>,
}

#[derive(Clone, Copy)]
enum TerminalWrite<'a> {
    Completed(&'a serde_json::Value),
    Failed(&'a str),
}

struct Pipeline {
    jobs: Arc<dyn JobStore>,
    recognizer: Arc<dyn Recognizer>,
    reconciler: Reconciler,
    recognizer_timeout: Option<Duration>,
    in_flight: AtomicUsize,
}

/// Owns job creation, dispatch and polling.
#[derive(Clone)]
pub struct JobOrchestrator {
    pipeline: Arc<Pipeline>,
    submissions: mpsc::Sender<WorkItem>,
    estimated_seconds: u64,
    queue_capacity: usize,
}

impl JobOrchestrator {
    /// Build the orchestrator and spawn its dispatcher on the current runtime.
    pub fn start(
        jobs: Arc<dyn JobStore>,
        catalog: Arc<dyn CatalogStore>,
        recognizer: Arc<dyn Recognizer>,
        config: OrchestratorConfig,
    ) -> Self {
        let queue_capacity = config.queue_capacity.max(1);
        let (submissions, queue) = mpsc::channel(queue_capacity);

        let pipeline = Arc::new(Pipeline {
            jobs,
            recognizer,
            reconciler: Reconciler::new(catalog),
            recognizer_timeout: config.recognizer_timeout,
            in_flight: AtomicUsize::new(0),
        });

        let workers = Arc::new(Semaphore::new(config.max_concurrent.max(1)));
        tokio::spawn(run_dispatcher(Arc::clone(&pipeline), queue, workers));

        Self {
            pipeline,
            submissions,
            estimated_seconds: config.estimated_seconds,
            queue_capacity,
        }
    }

    /// Persist a new job in `processing` and queue it for recognition.
    ///
    /// Returns as soon as the job is queued; recognition happens in the
    /// background. When the queue is full no job row is written.
    pub async fn create(&self, request: CreateJob) -> Result<CreatedJob, JobError> {
        if request.image_path.as_os_str().is_empty() {
            return Err(JobError::Validation("an image is required".to_string()));
        }

        let slot = self.submissions.try_reserve().map_err(|e| match e {
            TrySendError::Full(()) => JobError::QueueFull,
            TrySendError::Closed(()) => JobError::Unavailable,
        })?;

        let job_id = new_job_id();
        self.pipeline
            .jobs
            .insert(&NewJob {
                id: job_id.clone(),
                owner_user_id: request.owner_user_id,
                image_path: request.image_path.to_string_lossy().into_owned(),
            })
            .await?;

        let (completion_tx, completion_rx) = oneshot::channel();
        let in_flight = self.pipeline.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        metrics::counter!("recognition_jobs_total").increment(1);
        metrics::gauge!("recognition_jobs_in_flight").set(in_flight as f64);

        slot.send(WorkItem {
            job_id: job_id.clone(),
            owner_user_id: request.owner_user_id,
            image_path: request.image_path,
            hints: request.hints,
            completion: completion_tx,
        });

        info!(
            job_id = %job_id,
            user_id = request.owner_user_id,
            "Recognition job queued"
        );

        Ok(CreatedJob {
            job_id,
            state: JobState::Processing,
            estimated_seconds: self.estimated_seconds,
            completion: completion_rx,
        })
    }

    /// Current view of a job owned by `owner_user_id`.
    pub async fn get_status(&self, job_id: &str, owner_user_id: i64) -> Result<JobView, JobError> {
        self.pipeline
            .jobs
            .find_for_owner(job_id, owner_user_id)
            .await?
            .map(|job| job.view())
            .ok_or(JobError::NotFound)
    }

    /// Run the recognizer for one image and normalize its output.
    pub async fn dispatch(
        &self,
        job_id: &str,
        image_path: PathBuf,
        hints: &RecognitionHints,
    ) -> Result<CanonicalRecognitionResult, RecognizerError> {
        self.pipeline.dispatch(job_id, image_path, hints).await
    }

    /// Jobs created but not yet terminal.
    pub fn pending_jobs(&self) -> usize {
        self.pipeline.in_flight.load(Ordering::SeqCst)
    }

    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    /// Whether the dispatcher is still accepting work.
    pub fn is_running(&self) -> bool {
        !self.submissions.is_closed()
    }
}

async fn run_dispatcher(
    pipeline: Arc<Pipeline>,
    mut queue: mpsc::Receiver<WorkItem>,
    workers: Arc<Semaphore>,
) {
    while let Some(item) = queue.recv().await {
        let Ok(permit) = Arc::clone(&workers).acquire_owned().await else {
            break;
        };
        let pipeline = Arc::clone(&pipeline);
        tokio::spawn(async move {
            pipeline.run(item).await;
            drop(permit);
        });
    }
    debug!("Recognition dispatcher stopped");
}

impl Pipeline {
    async fn run(&self, item: WorkItem) {
        let started = Instant::now();

        let persisted = match self
            .dispatch(&item.job_id, item.image_path.clone(), &item.hints)
            .await
        {
            Ok(result) => self.complete(&item.job_id, item.owner_user_id, result).await,
            Err(e) => {
                warn!(job_id = %item.job_id, error = %e, "Recognition failed");
                self.fail(&item.job_id, item.owner_user_id, &e.to_string()).await
            }
        };

        let in_flight = self.in_flight.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
        metrics::gauge!("recognition_jobs_in_flight").set(in_flight as f64);
        metrics::histogram!("recognition_processing_seconds")
            .record(started.elapsed().as_secs_f64());

        match persisted {
            Ok(view) => {
                // The uploader may have stopped listening.
                let _ = item.completion.send(view);
            }
            Err(e) => {
                error!(
                    job_id = %item.job_id,
                    error = %e,
                    "Failed to persist terminal job state"
                );
            }
        }
    }

    async fn dispatch(
        &self,
        job_id: &str,
        image_path: PathBuf,
        hints: &RecognitionHints,
    ) -> Result<CanonicalRecognitionResult, RecognizerError> {
        let request = RecognitionRequest {
            job_id: job_id.to_string(),
            image_path,
        };

        let recognition = self.recognizer.recognize(&request);
        let raw = match self.recognizer_timeout {
            Some(limit) => tokio::time::timeout(limit, recognition)
                .await
                .map_err(|_| RecognizerError::TimedOut(limit))??,
            None => recognition.await?,
        };

        let result = mapper::map_recognition(raw, hints);
        debug!(
            job_id = %job_id,
            restaurant = %result.restaurant.name,
            dishes = result.dishes.len(),
            "Recognizer output mapped"
        );
        Ok(result)
    }

    /// Reconcile the catalog, then mark the job completed. A reconciliation
    /// error fails the job instead.
    async fn complete(
        &self,
        job_id: &str,
        owner_user_id: i64,
        mut result: CanonicalRecognitionResult,
    ) -> Result<JobView, StoreError> {
        match self.reconciler.reconcile(&result, job_id).await {
            Ok(outcome) => {
                if result.restaurant.id.is_none() {
                    result.restaurant.id = outcome.restaurant_id;
                }
            }
            Err(e) => {
                let cause = std::error::Error::source(&e).map(ToString::to_string);
                warn!(
                    job_id = %job_id,
                    error = %e,
                    cause = ?cause,
                    "Catalog reconciliation failed"
                );
                return self.fail(job_id, owner_user_id, &e.to_string()).await;
            }
        }

        let payload = match serde_json::to_value(&result) {
            Ok(payload) => payload,
            Err(e) => {
                let message = format!("Failed to encode recognition result: {e}");
                return self.fail(job_id, owner_user_id, &message).await;
            }
        };

        if self
            .write_terminal(job_id, TerminalWrite::Completed(&payload))
            .await?
        {
            metrics::counter!("recognition_jobs_completed").increment(1);
            info!(job_id = %job_id, dishes = result.dishes.len(), "Recognition job completed");
            Ok(JobView::Completed { payload })
        } else {
            self.stored_view(job_id, owner_user_id).await
        }
    }

    async fn fail(
        &self,
        job_id: &str,
        owner_user_id: i64,
        message: &str,
    ) -> Result<JobView, StoreError> {
        if self
            .write_terminal(job_id, TerminalWrite::Failed(message))
            .await?
        {
            metrics::counter!("recognition_jobs_failed").increment(1);
            info!(job_id = %job_id, "Recognition job failed");
            Ok(JobView::Failed {
                error: message.to_string(),
            })
        } else {
            self.stored_view(job_id, owner_user_id).await
        }
    }

    /// Apply a terminal transition, retrying once on a store error.
    async fn write_terminal(
        &self,
        job_id: &str,
        write: TerminalWrite<'_>,
    ) -> Result<bool, StoreError> {
        let mut retried = false;
        loop {
            let written = match write {
                TerminalWrite::Completed(payload) => self.jobs.mark_completed(job_id, payload).await,
                TerminalWrite::Failed(message) => self.jobs.mark_failed(job_id, message).await,
            };
            match written {
                Err(e) => {
                    metrics::counter!("recognition_terminal_write_failures").increment(1);
                    if retried {
                        return Err(e);
                    }
                    warn!(job_id = %job_id, error = %e, "Terminal job write failed, retrying");
                    retried = true;
                }
                ok => return ok,
            }
        }
    }

    /// The row was already terminal; report what is stored rather than what
    /// this continuation tried to write.
    async fn stored_view(&self, job_id: &str, owner_user_id: i64) -> Result<JobView, StoreError> {
        warn!(job_id = %job_id, "Job already terminal, transition ignored");
        let job = self
            .jobs
            .find_for_owner(job_id, owner_user_id)
            .await?
            .ok_or_else(|| StoreError::Corrupt(format!("job {job_id} disappeared")))?;
        Ok(job.view())
    }
}

/// `upload_<unix millis>_<8 hex chars>`.
fn new_job_id() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("upload_{}_{}", Utc::now().timestamp_millis(), &suffix[..8])
}

#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Upload result not found")]
    NotFound,

    #[error("Recognition queue is full")]
    QueueFull,

    #[error("Recognition workers are not running")]
    Unavailable,

    #[error(transparent)]
    Store(#[from] StoreError),
}
