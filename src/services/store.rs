use async_trait::async_trait;
use serde_json::Value;

use crate::models::job::{NewJob, RecognitionJob};

/// Persistence for recognition job rows.
///
/// Terminal writes only apply to rows still in `processing`; they report
/// whether a transition actually happened.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn insert(&self, job: &NewJob) -> Result<RecognitionJob, StoreError>;

    /// Look up a job, scoped to its owner. Foreign jobs are indistinguishable
    /// from missing ones.
    async fn find_for_owner(
        &self,
        job_id: &str,
        owner_user_id: i64,
    ) -> Result<Option<RecognitionJob>, StoreError>;

    async fn mark_completed(&self, job_id: &str, payload: &Value) -> Result<bool, StoreError>;

    async fn mark_failed(&self, job_id: &str, error: &str) -> Result<bool, StoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Corrupt job row: {0}")]
    Corrupt(String),

    #[error("Duplicate job id: {0}")]
    Duplicate(String),
}
