//! Pages API endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
    Extension, Json, Router,
};

use crate::api::common::{
    AdminContentQuery, AdminPaginationQuery, AutosaveResponse, CountResponse, PaginationQuery,
};
use crate::api::middleware::{ApiError, AppState, CurrentTenant, RequestActor};
use crate::api::revisions;
use crate::models::{CreatePageInput, RevisionKind, UpdatePageInput};

/// Tenant admin routes, mounted at `/api/v1/admin/pages`
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_pages).post(create_page))
        .route("/trash", get(list_trash).delete(empty_trash))
        .route("/trash/{id}", delete(purge_page))
        .route("/trash/{id}/restore", post(restore_page))
        .route("/{id}", get(get_page).put(update_page).delete(trash_page))
        .route("/{id}/autosave", post(autosave_page))
        .route("/{id}/revisions", get(revisions::list).delete(revisions::prune))
        .route("/{id}/revisions/compare", get(revisions::compare))
        .route("/{id}/revisions/{rev}", get(revisions::get).delete(revisions::delete))
        .route("/{id}/revisions/{rev}/restore", post(revisions::restore))
        .layer(Extension(RevisionKind::Page))
}

/// Public routes, mounted at `/api/v1/pages`
pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_published_pages))
        .route("/{slug}", get(get_page_by_slug))
}

async fn list_pages(
    State(state): State<AppState>,
    CurrentTenant(tenant): CurrentTenant,
    Query(query): Query<AdminContentQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let pages = state
        .page_service
        .list(tenant.id, &query.filter(), &query.params())
        .await?;
    Ok(Json(pages))
}

async fn create_page(
    State(state): State<AppState>,
    CurrentTenant(tenant): CurrentTenant,
    RequestActor(actor): RequestActor,
    Json(input): Json<CreatePageInput>,
) -> Result<impl IntoResponse, ApiError> {
    let page = state.page_service.create(tenant.id, input, &actor).await?;
    Ok((StatusCode::CREATED, Json(page)))
}

async fn get_page(
    State(state): State<AppState>,
    CurrentTenant(tenant): CurrentTenant,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.page_service.get(tenant.id, id).await?))
}

async fn update_page(
    State(state): State<AppState>,
    CurrentTenant(tenant): CurrentTenant,
    RequestActor(actor): RequestActor,
    Path(id): Path<i64>,
    Json(input): Json<UpdatePageInput>,
) -> Result<impl IntoResponse, ApiError> {
    let page = state.page_service.update(tenant.id, id, input, &actor).await?;
    Ok(Json(page))
}

async fn autosave_page(
    State(state): State<AppState>,
    CurrentTenant(tenant): CurrentTenant,
    RequestActor(actor): RequestActor,
    Path(id): Path<i64>,
    Json(input): Json<UpdatePageInput>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = state.page_service.autosave(tenant.id, id, input, &actor).await?;
    Ok(Json(AutosaveResponse {
        revision: outcome.revision,
        created: outcome.created,
    }))
}

/// DELETE /pages/{id} moves the page to the trash
async fn trash_page(
    State(state): State<AppState>,
    CurrentTenant(tenant): CurrentTenant,
    RequestActor(actor): RequestActor,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    state.page_service.trash(tenant.id, id, &actor).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_trash(
    State(state): State<AppState>,
    CurrentTenant(tenant): CurrentTenant,
    Query(query): Query<AdminPaginationQuery>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.page_service.list_trash(tenant.id, &query.params()).await?))
}

async fn empty_trash(
    State(state): State<AppState>,
    CurrentTenant(tenant): CurrentTenant,
) -> Result<impl IntoResponse, ApiError> {
    let count = state.page_service.empty_trash(tenant.id).await?;
    Ok(Json(CountResponse { count }))
}

async fn restore_page(
    State(state): State<AppState>,
    CurrentTenant(tenant): CurrentTenant,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.page_service.restore_from_trash(tenant.id, id).await?))
}

async fn purge_page(
    State(state): State<AppState>,
    CurrentTenant(tenant): CurrentTenant,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    state.page_service.purge(tenant.id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_published_pages(
    State(state): State<AppState>,
    CurrentTenant(tenant): CurrentTenant,
    Query(query): Query<PaginationQuery>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.page_service.list_published(tenant.id, &query.params()).await?))
}

async fn get_page_by_slug(
    State(state): State<AppState>,
    CurrentTenant(tenant): CurrentTenant,
    Path(slug): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.page_service.get_published(tenant.id, &slug).await?))
}
