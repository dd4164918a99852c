use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;

use crate::app_state::AppState;
use crate::routes::error::ApiError;

/// Authenticated caller, taken from an `Authorization: Bearer <jwt>` header.
///
/// The token's subject must still be a registered user.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser {
    pub id: i64,
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.strip_prefix("Bearer ").unwrap_or(value).trim())
            .filter(|token| !token.is_empty())
            .ok_or_else(ApiError::auth_required)?;

        let id = state.auth.verify(token).map_err(|e| {
            tracing::debug!(error = %e, "Rejected bearer token");
            ApiError::invalid_token()
        })?;

        let registered = state.users.exists(id).await.map_err(ApiError::internal)?;
        if !registered {
            tracing::debug!(user_id = id, "Token subject is not a registered user");
            return Err(ApiError::invalid_token());
        }

        Ok(AuthUser { id })
    }
}
