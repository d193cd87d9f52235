//! Blog tag API endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, put},
    Json, Router,
};

use crate::api::middleware::{ApiError, AppState, CurrentTenant};
use crate::models::TagInput;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_tags).post(create_tag))
        .route("/{id}", put(rename_tag).delete(delete_tag))
}

pub fn public_router() -> Router<AppState> {
    Router::new().route("/", get(list_public_tags))
}

async fn list_tags(
    State(state): State<AppState>,
    CurrentTenant(tenant): CurrentTenant,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.tag_service.list(tenant.id).await?))
}

/// POST /blog/tags returns the existing tag when the slug is taken
async fn create_tag(
    State(state): State<AppState>,
    CurrentTenant(tenant): CurrentTenant,
    Json(input): Json<TagInput>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.tag_service.create_or_get(tenant.id, input).await?))
}

async fn rename_tag(
    State(state): State<AppState>,
    CurrentTenant(tenant): CurrentTenant,
    Path(id): Path<i64>,
    Json(input): Json<TagInput>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.tag_service.rename(tenant.id, id, input).await?))
}

async fn delete_tag(
    State(state): State<AppState>,
    CurrentTenant(tenant): CurrentTenant,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    state.tag_service.delete(tenant.id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_public_tags(
    State(state): State<AppState>,
    CurrentTenant(tenant): CurrentTenant,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.tag_service.list_public(tenant.id).await?))
}
