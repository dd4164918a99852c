use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use std::str::FromStr;

use crate::models::job::{JobState, NewJob, RecognitionJob};
use crate::services::store::{JobStore, StoreError};

const JOB_COLUMNS: &str =
    "upload_id, user_id, image_path, status, result_data, error_message, created_at, completed_at";

/// Job rows in the `upload_results` table.
#[derive(Clone)]
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn job_from_row(row: &PgRow) -> Result<RecognitionJob, StoreError> {
    let status: String = row.try_get("status")?;
    let state = JobState::from_str(&status)
        .map_err(|_| StoreError::Corrupt(format!("unknown status {status:?}")))?;

    Ok(RecognitionJob {
        id: row.try_get("upload_id")?,
        owner_user_id: row.try_get("user_id")?,
        image_path: row.try_get("image_path")?,
        state,
        result: row.try_get("result_data")?,
        error: row.try_get("error_message")?,
        created_at: row.try_get("created_at")?,
        completed_at: row.try_get("completed_at")?,
    })
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn insert(&self, job: &NewJob) -> Result<RecognitionJob, StoreError> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO upload_results (upload_id, user_id, image_path, status)
            VALUES ($1, $2, $3, $4)
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(&job.id)
        .bind(job.owner_user_id)
        .bind(&job.image_path)
        .bind(JobState::Processing.to_string())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                StoreError::Duplicate(job.id.clone())
            }
            other => StoreError::Database(other),
        })?;

        job_from_row(&row)
    }

    async fn find_for_owner(
        &self,
        job_id: &str,
        owner_user_id: i64,
    ) -> Result<Option<RecognitionJob>, StoreError> {
        let row = sqlx::query(&format!(
            r#"
            SELECT {JOB_COLUMNS}
            FROM upload_results
            WHERE upload_id = $1 AND user_id = $2
            "#
        ))
        .bind(job_id)
        .bind(owner_user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(job_from_row).transpose()
    }

    async fn mark_completed(
        &self,
        job_id: &str,
        payload: &serde_json::Value,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE upload_results
            SET status = $1,
                result_data = $2,
                error_message = NULL,
                completed_at = NOW()
            WHERE upload_id = $3 AND status = 'processing'
            "#,
        )
        .bind(JobState::Completed.to_string())
        .bind(payload)
        .bind(job_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn mark_failed(&self, job_id: &str, error: &str) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE upload_results
            SET status = $1,
                result_data = NULL,
                error_message = $2,
                completed_at = NOW()
            WHERE upload_id = $3 AND status = 'processing'
            "#,
        )
        .bind(JobState::Failed.to_string())
        .bind(error)
        .bind(job_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}
