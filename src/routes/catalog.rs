use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use garde::Validate;

use crate::app_state::AppState;
use crate::models::catalog::{DishDetail, RestaurantDetail, RestaurantList, RestaurantQuery};
use crate::routes::error::{ApiError, ApiResponse};

/// GET /api/restaurants: restaurant list, optionally filtered by name.
pub async fn list_restaurants(
    State(state): State<AppState>,
    Query(query): Query<RestaurantQuery>,
) -> Result<Json<ApiResponse<RestaurantList>>, ApiError> {
    query
        .validate()
        .map_err(|report| ApiError::validation(report.to_string()))?;

    let page = state
        .catalog
        .list_restaurants(&query)
        .await
        .map_err(ApiError::internal)?;

    Ok(Json(ApiResponse::ok(page)))
}

/// GET /api/restaurants/{id}: restaurant with its dishes.
pub async fn get_restaurant(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<RestaurantDetail>>, ApiError> {
    state
        .catalog
        .restaurant_detail(id)
        .await
        .map_err(ApiError::internal)?
        .map(|detail| Json(ApiResponse::ok(detail)))
        .ok_or_else(|| {
            ApiError::new(
                StatusCode::NOT_FOUND,
                "RESTAURANT_NOT_FOUND",
                "Restaurant not found",
            )
        })
}

/// GET /api/dishes/{id}: dish with its restaurant.
pub async fn get_dish(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<DishDetail>>, ApiError> {
    state
        .catalog
        .dish_detail(id)
        .await
        .map_err(ApiError::internal)?
        .map(|detail| Json(ApiResponse::ok(detail)))
        .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, "DISH_NOT_FOUND", "Dish not found"))
}
