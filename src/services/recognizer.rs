use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Environment variable naming the directory the recognizer must write into.
pub const OUTPUT_DIR_ENV: &str = "RECOGNITION_OUTPUT_DIR";

/// Environment variable carrying the job id, for recognizer-side logging.
pub const JOB_ID_ENV: &str = "RECOGNITION_JOB_ID";

/// One image to recognize.
#[derive(Debug, Clone)]
pub struct RecognitionRequest {
    pub job_id: String,
    pub image_path: PathBuf,
}

/// Turns a menu photo into the recognizer's raw JSON document.
#[async_trait]
pub trait Recognizer: Send + Sync {
    async fn recognize(&self, request: &RecognitionRequest) -> Result<Value, RecognizerError>;
}

/// Runs the external recognizer as a child process.
///
/// The process receives the absolute image path as its last argument and
/// writes `parsed_<image stem>_<suffix>.json` into a directory private to the
/// job, announced through [`OUTPUT_DIR_ENV`]. Recognizers that ignore the
/// variable and write into the shared results directory are still read from
/// there; upload file names are unique, so the stem still identifies the job.
pub struct ProcessRecognizer {
    command: String,
    args: Vec<String>,
    results_dir: PathBuf,
}

impl ProcessRecognizer {
    pub fn new(command: impl Into<String>, args: Vec<String>, results_dir: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            args,
            results_dir: results_dir.into(),
        }
    }

    pub fn output_dir(&self, job_id: &str) -> PathBuf {
        self.results_dir.join(job_id)
    }
}

#[async_trait]
impl Recognizer for ProcessRecognizer {
    async fn recognize(&self, request: &RecognitionRequest) -> Result<Value, RecognizerError> {
        let image_path = tokio::fs::canonicalize(&request.image_path).await?;
        let output_dir = self.output_dir(&request.job_id);
        tokio::fs::create_dir_all(&output_dir).await?;

        debug!(
            job_id = %request.job_id,
            command = %self.command,
            image = %image_path.display(),
            "Spawning recognizer"
        );

        // kill_on_drop: a timed-out job drops the wait future and must not
        // leave the child running.
        let child = Command::new(&self.command)
            .args(&self.args)
            .arg(&image_path)
            .env(OUTPUT_DIR_ENV, &output_dir)
            .env(JOB_ID_ENV, &request.job_id)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| RecognizerError::Spawn {
                command: self.command.clone(),
                source,
            })?;

        let output = child.wait_with_output().await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let message = if stderr.is_empty() {
                format!("recognizer exited with {}", output.status)
            } else {
                stderr
            };
            return Err(RecognizerError::Process {
                code: output.status.code(),
                message,
            });
        }

        debug!(
            job_id = %request.job_id,
            stdout_bytes = output.stdout.len(),
            "Recognizer exited successfully"
        );

        let stem = image_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        let artifact = match find_artifact(&output_dir, &stem).await? {
            Some(artifact) => artifact,
            None => find_artifact(&self.results_dir, &stem)
                .await?
                .ok_or(RecognizerError::MissingArtifact)?,
        };

        let content = tokio::fs::read_to_string(&artifact).await?;
        serde_json::from_str(&content).map_err(|source| RecognizerError::InvalidArtifact {
            file: artifact
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            source,
        })
    }
}

/// Find the `parsed_<stem>_*.json` artifact in `dir`.
///
/// When several match, the greatest file name wins (suffixes are timestamps).
/// A missing directory counts as no artifact.
pub async fn find_artifact(dir: &Path, stem: &str) -> std::io::Result<Option<PathBuf>> {
    let prefix = format!("parsed_{stem}_");

    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };

    let mut newest: Option<String> = None;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with(&prefix)
            && name.ends_with(".json")
            && newest.as_ref().map_or(true, |current| name > *current)
        {
            newest = Some(name);
        }
    }

    Ok(newest.map(|name| dir.join(name)))
}

#[derive(Debug, thiserror::Error)]
pub enum RecognizerError {
    #[error("Failed to start recognizer `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// Non-zero exit. The message is the recognizer's own diagnostic output.
    #[error("{message}")]
    Process { code: Option<i32>, message: String },

    #[error("Recognizer timed out after {0:?}")]
    TimedOut(Duration),

    #[error("No parsed result file found")]
    MissingArtifact,

    #[error("Recognizer output {file} is not valid JSON: {source}")]
    InvalidArtifact {
        file: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Recognizer I/O error: {0}")]
    Io(#[from] std::io::Error),
}
