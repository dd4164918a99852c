use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Lifecycle state of a menu recognition job.
///
/// `Processing` is the only non-terminal state; a job leaves it exactly once.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, EnumString, Display, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobState {
    Processing,
    Completed,
    Failed,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, JobState::Processing)
    }
}

/// A menu recognition job as stored in `upload_results`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognitionJob {
    pub id: String,
    pub owner_user_id: i64,
    pub image_path: String,
    pub state: JobState,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl RecognitionJob {
    /// Project the stored row into what a poller is allowed to see.
    pub fn view(&self) -> JobView {
        match self.state {
            JobState::Processing => JobView::Processing,
            JobState::Failed => JobView::Failed {
                error: self
                    .error
                    .clone()
                    .unwrap_or_else(|| "Recognition failed".to_string()),
            },
            JobState::Completed => JobView::Completed {
                payload: self.result.clone().unwrap_or(serde_json::Value::Null),
            },
        }
    }
}

/// Fields needed to insert a fresh job row.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub id: String,
    pub owner_user_id: i64,
    pub image_path: String,
}

/// Poll result for a job.
///
/// Serializes as `{"state":"processing"}`, `{"state":"failed","error":..}` or
/// `{"state":"completed", <payload fields>}`.
#[derive(Debug, Clone, PartialEq)]
pub enum JobView {
    Processing,
    Failed { error: String },
    Completed { payload: serde_json::Value },
}

impl JobView {
    pub fn state(&self) -> JobState {
        match self {
            JobView::Processing => JobState::Processing,
            JobView::Failed { .. } => JobState::Failed,
            JobView::Completed { .. } => JobState::Completed,
        }
    }
}

impl Serialize for JobView {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut body = serde_json::Map::new();
        body.insert(
            "state".to_string(),
            serde_json::Value::String(self.state().to_string()),
        );
        match self {
            JobView::Processing => {}
            JobView::Failed { error } => {
                body.insert("error".to_string(), serde_json::Value::String(error.clone()));
            }
            JobView::Completed { payload } => {
                if let serde_json::Value::Object(fields) = payload {
                    for (key, value) in fields {
                        if key != "state" {
                            body.insert(key.clone(), value.clone());
                        }
                    }
                }
            }
        }
        body.serialize(serializer)
    }
}
