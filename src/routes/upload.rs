use axum::extract::{Multipart, Path, State};
use axum::body::Bytes;
use axum::Json;
use garde::Validate;

use crate::app_state::AppState;
use crate::models::job::JobView;
use crate::models::upload::{UploadForm, UploadResponse};
use crate::routes::auth::AuthUser;
use crate::routes::error::{ApiError, ApiResponse};
use crate::services::orchestrator::CreateJob;

struct ImagePart {
    data: Bytes,
    file_name: Option<String>,
}

/// POST /api/upload/menu: Upload a menu photo for recognition.
pub async fn upload_menu(
    State(state): State<AppState>,
    user: AuthUser,
    mut multipart: Multipart,
) -> Result<Json<ApiResponse<UploadResponse>>, ApiError> {
    let mut photo: Option<ImagePart> = None;
    let mut form = UploadForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::validation(e.body_text()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "image" => {
                let file_name = field.file_name().map(str::to_string);
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::validation(e.body_text()))?;

                image::guess_format(&data).map_err(|_| ApiError::invalid_file())?;

                photo = Some(ImagePart { data, file_name });
            }
            "restaurant_id" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::validation(e.body_text()))?;
                let text = text.trim();
                if !text.is_empty() {
                    let id = text
                        .parse::<i64>()
                        .map_err(|_| ApiError::validation("restaurant_id must be an integer"))?;
                    form.restaurant_id = Some(id);
                }
            }
            "location" | "window_number" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::validation(e.body_text()))?;
                let text = text.trim();
                if !text.is_empty() {
                    form.location = Some(text.to_string());
                }
            }
            _ => {}
        }
    }

    form.validate()
        .map_err(|report| ApiError::validation(report.to_string()))?;

    let photo = photo.ok_or_else(ApiError::no_file)?;

    let image_path = state
        .storage
        .save(&photo.data, photo.file_name.as_deref())
        .await
        .map_err(ApiError::internal)?;

    let created = match state
        .jobs
        .create(CreateJob {
            owner_user_id: user.id,
            image_path: image_path.clone(),
            hints: form.hints(),
        })
        .await
    {
        Ok(created) => created,
        Err(e) => {
            if let Err(cleanup) = state.storage.remove(&image_path).await {
                tracing::warn!(error = %cleanup, "Failed to remove orphaned upload");
            }
            return Err(e.into());
        }
    };

    tracing::info!(
        job_id = %created.job_id,
        user_id = user.id,
        bytes = photo.data.len(),
        "Menu photo accepted"
    );

    Ok(Json(ApiResponse::ok(UploadResponse {
        upload_id: created.job_id,
        status: created.state.to_string(),
        estimated_time: created.estimated_seconds,
    })))
}

/// GET /api/upload/menu/{upload_id}/result: Poll a recognition job.
pub async fn get_result(
    State(state): State<AppState>,
    user: AuthUser,
    Path(upload_id): Path<String>,
) -> Result<Json<ApiResponse<JobView>>, ApiError> {
    let view = state.jobs.get_status(&upload_id, user.id).await?;
    let success = !matches!(view, JobView::Failed { .. });

    Ok(Json(ApiResponse {
        success,
        data: Some(view),
        error: None,
    }))
}
