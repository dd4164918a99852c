use axum::routing::{get, post};
use axum::Router;

use crate::app_state::AppState;

pub mod auth;
pub mod catalog;
pub mod error;
pub mod health;
pub mod metrics;
pub mod upload;

/// API routes, without transport layers or the metrics endpoint.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/api/restaurants", get(catalog::list_restaurants))
        .route("/api/restaurants/{id}", get(catalog::get_restaurant))
        .route("/api/dishes/{id}", get(catalog::get_dish))
        .route("/api/upload/menu", post(upload::upload_menu))
        .route(
            "/api/upload/menu/{upload_id}/result",
            get(upload::get_result),
        )
        .with_state(state)
}
