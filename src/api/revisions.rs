//! Revision history endpoints
//!
//! Mounted under both `/pages/{id}/revisions` and
//! `/blog/posts/{id}/revisions`; the owning router supplies the
//! [`RevisionKind`] as a request extension.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use serde::{Deserialize, Serialize};

use crate::api::common::{AdminPaginationQuery, CountResponse};
use crate::api::middleware::{ApiError, AppState, CurrentTenant, RequestActor};
use crate::db::repositories::RestoreTarget;
use crate::models::{Revision, RevisionKind};

/// GET .../revisions/compare?from=&to=
#[derive(Debug, Deserialize)]
pub struct CompareQuery {
    pub from: i64,
    /// Compare against the live entity when absent
    pub to: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct RestoreResponse {
    pub item: RestoreTarget,
    pub revision: Revision,
}

/// GET .../{id}/revisions
pub async fn list(
    State(state): State<AppState>,
    Extension(kind): Extension<RevisionKind>,
    CurrentTenant(tenant): CurrentTenant,
    Path(id): Path<i64>,
    Query(query): Query<AdminPaginationQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let revisions = state
        .revision_service
        .list(kind, tenant.id, id, &query.params())
        .await?;
    Ok(Json(revisions))
}

/// GET .../{id}/revisions/{rev}
pub async fn get(
    State(state): State<AppState>,
    Extension(kind): Extension<RevisionKind>,
    CurrentTenant(tenant): CurrentTenant,
    Path((id, rev)): Path<(i64, i64)>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.revision_service.get(kind, tenant.id, id, rev).await?))
}

/// GET .../{id}/revisions/compare
pub async fn compare(
    State(state): State<AppState>,
    Extension(kind): Extension<RevisionKind>,
    CurrentTenant(tenant): CurrentTenant,
    Path(id): Path<i64>,
    Query(query): Query<CompareQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let diff = state
        .revision_service
        .compare(kind, tenant.id, id, query.from, query.to)
        .await?;
    Ok(Json(diff))
}

/// POST .../{id}/revisions/{rev}/restore
pub async fn restore(
    State(state): State<AppState>,
    Extension(kind): Extension<RevisionKind>,
    CurrentTenant(tenant): CurrentTenant,
    RequestActor(actor): RequestActor,
    Path((id, rev)): Path<(i64, i64)>,
) -> Result<impl IntoResponse, ApiError> {
    let (item, revision) = state
        .revision_service
        .restore(kind, tenant.id, id, rev, &actor)
        .await?;
    Ok(Json(RestoreResponse { item, revision }))
}

/// DELETE .../{id}/revisions/{rev}
pub async fn delete(
    State(state): State<AppState>,
    Extension(kind): Extension<RevisionKind>,
    CurrentTenant(tenant): CurrentTenant,
    Path((id, rev)): Path<(i64, i64)>,
) -> Result<impl IntoResponse, ApiError> {
    state.revision_service.delete(kind, tenant.id, id, rev).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE .../{id}/revisions
///
/// Applies the configured retention limits right away.
pub async fn prune(
    State(state): State<AppState>,
    Extension(kind): Extension<RevisionKind>,
    CurrentTenant(tenant): CurrentTenant,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let count = state.revision_service.prune(kind, tenant.id, id).await?;
    Ok(Json(CountResponse { count }))
}
