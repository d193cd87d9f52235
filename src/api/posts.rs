//! Blog post API endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
    Extension, Json, Router,
};

use crate::api::common::{
    AdminContentQuery, AdminPaginationQuery, AutosaveResponse, CountResponse, PublicPostsQuery,
};
use crate::api::middleware::{ApiError, AppState, CurrentTenant, RequestActor};
use crate::api::revisions;
use crate::models::{CreatePostInput, RevisionKind, UpdatePostInput};

/// Tenant admin routes, mounted at `/api/v1/admin/blog/posts`
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_posts).post(create_post))
        .route("/trash", get(list_trash).delete(empty_trash))
        .route("/trash/{id}", delete(purge_post))
        .route("/trash/{id}/restore", post(restore_post))
        .route("/{id}", get(get_post).put(update_post).delete(trash_post))
        .route("/{id}/autosave", post(autosave_post))
        .route("/{id}/revisions", get(revisions::list).delete(revisions::prune))
        .route("/{id}/revisions/compare", get(revisions::compare))
        .route("/{id}/revisions/{rev}", get(revisions::get).delete(revisions::delete))
        .route("/{id}/revisions/{rev}/restore", post(revisions::restore))
        .layer(Extension(RevisionKind::BlogPost))
}

/// Public routes, filterable by `category` and `tag` slug, mounted at `/api/v1/blog/posts`
pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_published_posts))
        .route("/{slug}", get(get_post_by_slug))
}

async fn list_posts(
    State(state): State<AppState>,
    CurrentTenant(tenant): CurrentTenant,
    Query(query): Query<AdminContentQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let posts = state
        .post_service
        .list(tenant.id, &query.filter(), &query.params())
        .await?;
    Ok(Json(posts))
}

async fn create_post(
    State(state): State<AppState>,
    CurrentTenant(tenant): CurrentTenant,
    RequestActor(actor): RequestActor,
    Json(input): Json<CreatePostInput>,
) -> Result<impl IntoResponse, ApiError> {
    let post = state.post_service.create(tenant.id, input, &actor).await?;
    Ok((StatusCode::CREATED, Json(post)))
}

async fn get_post(
    State(state): State<AppState>,
    CurrentTenant(tenant): CurrentTenant,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.post_service.get(tenant.id, id).await?))
}

async fn update_post(
    State(state): State<AppState>,
    CurrentTenant(tenant): CurrentTenant,
    RequestActor(actor): RequestActor,
    Path(id): Path<i64>,
    Json(input): Json<UpdatePostInput>,
) -> Result<impl IntoResponse, ApiError> {
    let post = state.post_service.update(tenant.id, id, input, &actor).await?;
    Ok(Json(post))
}

async fn autosave_post(
    State(state): State<AppState>,
    CurrentTenant(tenant): CurrentTenant,
    RequestActor(actor): RequestActor,
    Path(id): Path<i64>,
    Json(input): Json<UpdatePostInput>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = state.post_service.autosave(tenant.id, id, input, &actor).await?;
    Ok(Json(AutosaveResponse {
        revision: outcome.revision,
        created: outcome.created,
    }))
}

/// DELETE /posts/{id} moves the post to the trash
async fn trash_post(
    State(state): State<AppState>,
    CurrentTenant(tenant): CurrentTenant,
    RequestActor(actor): RequestActor,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    state.post_service.trash(tenant.id, id, &actor).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_trash(
    State(state): State<AppState>,
    CurrentTenant(tenant): CurrentTenant,
    Query(query): Query<AdminPaginationQuery>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.post_service.list_trash(tenant.id, &query.params()).await?))
}

async fn empty_trash(
    State(state): State<AppState>,
    CurrentTenant(tenant): CurrentTenant,
) -> Result<impl IntoResponse, ApiError> {
    let count = state.post_service.empty_trash(tenant.id).await?;
    Ok(Json(CountResponse { count }))
}

async fn restore_post(
    State(state): State<AppState>,
    CurrentTenant(tenant): CurrentTenant,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.post_service.restore_from_trash(tenant.id, id).await?))
}

async fn purge_post(
    State(state): State<AppState>,
    CurrentTenant(tenant): CurrentTenant,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    state.post_service.purge(tenant.id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_published_posts(
    State(state): State<AppState>,
    CurrentTenant(tenant): CurrentTenant,
    Query(query): Query<PublicPostsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let posts = state
        .post_service
        .list_published(tenant.id, &query.filter(), &query.params())
        .await?;
    Ok(Json(posts))
}

async fn get_post_by_slug(
    State(state): State<AppState>,
    CurrentTenant(tenant): CurrentTenant,
    Path(slug): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.post_service.get_published(tenant.id, &slug).await?))
}
