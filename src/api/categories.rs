//! Blog category API endpoints
//!
//! Admin routes live under `/api/v1/admin/blog/categories`, the
//! read-only public list under `/api/v1/blog/categories`.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, put},
    Json, Router,
};

use crate::api::middleware::{ApiError, AppState, CurrentTenant};
use crate::models::{CreateCategoryInput, UpdateCategoryInput};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_categories).post(create_category))
        .route("/tree", get(category_tree))
        .route("/{id}", put(update_category).delete(delete_category))
}

pub fn public_router() -> Router<AppState> {
    Router::new().route("/", get(list_public_categories))
}

async fn list_categories(
    State(state): State<AppState>,
    CurrentTenant(tenant): CurrentTenant,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.category_service.list(tenant.id).await?))
}

async fn category_tree(
    State(state): State<AppState>,
    CurrentTenant(tenant): CurrentTenant,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.category_service.tree(tenant.id).await?))
}

async fn create_category(
    State(state): State<AppState>,
    CurrentTenant(tenant): CurrentTenant,
    Json(input): Json<CreateCategoryInput>,
) -> Result<impl IntoResponse, ApiError> {
    let category = state.category_service.create(tenant.id, input).await?;
    Ok((StatusCode::CREATED, Json(category)))
}

/// PUT /blog/categories/{id}; `parent_id: 0` moves the category to the root
async fn update_category(
    State(state): State<AppState>,
    CurrentTenant(tenant): CurrentTenant,
    Path(id): Path<i64>,
    Json(input): Json<UpdateCategoryInput>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.category_service.update(tenant.id, id, input).await?))
}

async fn delete_category(
    State(state): State<AppState>,
    CurrentTenant(tenant): CurrentTenant,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    state.category_service.delete(tenant.id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_public_categories(
    State(state): State<AppState>,
    CurrentTenant(tenant): CurrentTenant,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.category_service.list_public(tenant.id).await?))
}
