//! Test helper utilities: stub recognizers and an in-memory pipeline harness

#![allow(dead_code)]

use async_trait::async_trait;
use menu_recognition::models::job::JobView;
use menu_recognition::models::menu::RecognitionHints;
use menu_recognition::services::memory::{MemoryCatalog, MemoryJobStore};
use menu_recognition::services::orchestrator::{
    CreateJob, CreatedJob, JobOrchestrator, OrchestratorConfig,
};
use menu_recognition::services::recognizer::{RecognitionRequest, Recognizer, RecognizerError};
use reqwest::multipart;
use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

/// What a [`StubRecognizer`] does once it is allowed to finish.
#[derive(Debug, Clone)]
pub enum StubOutcome {
    Document(Value),
    ProcessFailure(String),
    Hang,
}

/// In-process stand-in for the recognizer process.
///
/// With a gate, each call waits for one gate permit before finishing, which
/// lets tests observe jobs while they are still `processing`.
pub struct StubRecognizer {
    outcome: StubOutcome,
    gate: Option<Arc<Semaphore>>,
    calls: AtomicUsize,
}

impl StubRecognizer {
    pub fn new(outcome: StubOutcome) -> Self {
        Self {
            outcome,
            gate: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn document(document: Value) -> Self {
        Self::new(StubOutcome::Document(document))
    }

    pub fn failing(stderr: &str) -> Self {
        Self::new(StubOutcome::ProcessFailure(stderr.to_string()))
    }

    pub fn hanging() -> Self {
        Self::new(StubOutcome::Hang)
    }

    pub fn gated(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Recognizer for StubRecognizer {
    async fn recognize(&self, _request: &RecognitionRequest) -> Result<Value, RecognizerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(gate) = &self.gate {
            gate.acquire().await.expect("gate closed").forget();
        }

        match &self.outcome {
            StubOutcome::Document(document) => Ok(document.clone()),
            StubOutcome::ProcessFailure(stderr) => Err(RecognizerError::Process {
                code: Some(1),
                message: stderr.clone(),
            }),
            StubOutcome::Hang => std::future::pending().await,
        }
    }
}

/// Orchestrator wired to in-memory stores.
pub struct Harness {
    pub orchestrator: JobOrchestrator,
    pub jobs: Arc<MemoryJobStore>,
    pub catalog: Arc<MemoryCatalog>,
    pub recognizer: Arc<StubRecognizer>,
}

impl Harness {
    pub fn start(recognizer: StubRecognizer) -> Self {
        Self::start_with(recognizer, MemoryCatalog::new(), OrchestratorConfig::default())
    }

    pub fn start_with(
        recognizer: StubRecognizer,
        catalog: MemoryCatalog,
        config: OrchestratorConfig,
    ) -> Self {
        let jobs = Arc::new(MemoryJobStore::new());
        let catalog = Arc::new(catalog);
        let recognizer = Arc::new(recognizer);
        let orchestrator =
            JobOrchestrator::start(jobs.clone(), catalog.clone(), recognizer.clone(), config);

        Self {
            orchestrator,
            jobs,
            catalog,
            recognizer,
        }
    }

    /// Create a job for `owner` with a placeholder image path.
    pub async fn submit(&self, owner: i64) -> CreatedJob {
        self.submit_with(owner, RecognitionHints::default())
            .await
            .expect("job creation failed")
    }

    pub async fn submit_with(
        &self,
        owner: i64,
        hints: RecognitionHints,
    ) -> Result<CreatedJob, menu_recognition::services::orchestrator::JobError> {
        self.orchestrator
            .create(CreateJob {
                owner_user_id: owner,
                image_path: PathBuf::from("uploads/menu-test.jpg"),
                hints,
            })
            .await
    }
}

/// Wait for a job's completion channel, failing the test after `secs`.
pub async fn await_terminal(created: CreatedJob, secs: u64) -> JobView {
    tokio::time::timeout(Duration::from_secs(secs), created.completion)
        .await
        .expect("job did not reach a terminal state in time")
        .expect("terminal state was not persisted")
}

/// Poll `get_status` until the job is terminal.
pub async fn poll_until_terminal(
    orchestrator: &JobOrchestrator,
    job_id: &str,
    owner: i64,
    timeout_secs: u64,
) -> JobView {
    let max_attempts = timeout_secs * 20;
    for _ in 0..max_attempts {
        let view = orchestrator
            .get_status(job_id, owner)
            .await
            .expect("status lookup failed");
        if view != JobView::Processing {
            return view;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("job {job_id} still processing after {timeout_secs} seconds");
}

/// Payload of a completed view.
pub fn completed_payload(view: &JobView) -> &Value {
    match view {
        JobView::Completed { payload } => payload,
        other => panic!("expected completed job, got {other:?}"),
    }
}

/// Envelope returned by every API endpoint.
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<ErrorBody>,
}

#[derive(Debug, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

/// Response data from POST /api/upload/menu
#[derive(Debug, Deserialize)]
pub struct UploadData {
    pub upload_id: String,
    pub status: String,
    pub estimated_time: u64,
}

/// Upload a menu photo to a running server.
pub async fn upload_menu_image(
    client: &reqwest::Client,
    base_url: &str,
    token: &str,
    image_path: &Path,
    location: Option<&str>,
) -> Result<UploadData, Box<dyn std::error::Error>> {
    let image_bytes = std::fs::read(image_path)?;
    let filename = image_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("menu.jpg")
        .to_string();

    let mut form = multipart::Form::new().part(
        "image",
        multipart::Part::bytes(image_bytes).file_name(filename),
    );
    if let Some(location) = location {
        form = form.text("location", location.to_string());
    }

    let response = client
        .post(format!("{}/api/upload/menu", base_url))
        .bearer_auth(token)
        .multipart(form)
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let error_text = response.text().await?;
        return Err(format!("Upload failed with status {}: {}", status, error_text).into());
    }

    let body = response.json::<Envelope<UploadData>>().await?;
    body.data.ok_or_else(|| "Upload response has no data".into())
}

/// Poll the result endpoint until the job is completed or failed.
pub async fn poll_menu_result(
    client: &reqwest::Client,
    base_url: &str,
    token: &str,
    upload_id: &str,
    timeout_secs: u64,
) -> Result<Envelope<Value>, Box<dyn std::error::Error>> {
    let max_attempts = timeout_secs * 2; // Poll every 500ms

    for attempt in 0..max_attempts {
        let response = client
            .get(format!("{}/api/upload/menu/{}/result", base_url, upload_id))
            .bearer_auth(token)
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await?;
            return Err(format!("Result check failed: {}", error_text).into());
        }

        let body = response.json::<Envelope<Value>>().await?;
        let state = body
            .data
            .as_ref()
            .and_then(|d| d["state"].as_str())
            .unwrap_or_default()
            .to_string();

        match state.as_str() {
            "completed" | "failed" => return Ok(body),
            "processing" => {
                if attempt % 10 == 0 && attempt > 0 {
                    println!("  ... still waiting (attempt {}/{})", attempt, max_attempts);
                }
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
            other => return Err(format!("Unknown job state: {}", other).into()),
        }
    }

    Err(format!("Job did not finish within {} seconds", timeout_secs).into())
}
