use serde::Deserialize;
use std::time::Duration;

use crate::services::orchestrator::OrchestratorConfig;

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:3000").
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// PostgreSQL connection string
    pub database_url: String,

    /// HS256 secret shared with the login endpoints
    pub jwt_secret: String,

    /// Directory uploaded menu photos are written to
    #[serde(default = "default_upload_dir")]
    pub upload_dir: String,

    /// Root of the per-job recognizer output directories
    #[serde(default = "default_results_dir")]
    pub results_dir: String,

    /// Recognizer executable
    #[serde(default = "default_recognizer_command")]
    pub recognizer_command: String,

    /// Leading recognizer arguments (comma-separated); the image path is appended
    #[serde(default = "default_recognizer_args")]
    pub recognizer_args: Vec<String>,

    /// Kill the recognizer and fail the job after this many seconds. Unset means wait forever.
    pub recognizer_timeout_secs: Option<u64>,

    #[serde(default = "default_max_concurrent_recognitions")]
    pub max_concurrent_recognitions: usize,

    #[serde(default = "default_job_queue_capacity")]
    pub job_queue_capacity: usize,

    /// Request body limit for uploads, in bytes
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,

    /// Turnaround estimate reported to uploaders
    #[serde(default = "default_estimated_seconds")]
    pub estimated_seconds: u64,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_upload_dir() -> String {
    "./uploads".to_string()
}

fn default_results_dir() -> String {
    "./results".to_string()
}

fn default_recognizer_command() -> String {
    "python3".to_string()
}

fn default_recognizer_args() -> Vec<String> {
    vec!["utils/request.py".to_string()]
}

fn default_max_concurrent_recognitions() -> usize {
    4
}

fn default_job_queue_capacity() -> usize {
    64
}

fn default_max_upload_bytes() -> usize {
    10 * 1024 * 1024
}

fn default_estimated_seconds() -> u64 {
    10
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    pub fn orchestrator(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            max_concurrent: self.max_concurrent_recognitions,
            queue_capacity: self.job_queue_capacity,
            recognizer_timeout: self.recognizer_timeout_secs.map(Duration::from_secs),
            estimated_seconds: self.estimated_seconds,
        }
    }
}
