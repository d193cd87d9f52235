//! Superadmin panel endpoints (`/musedock`)
//!
//! Platform statistics, tenant management and tenant admin accounts.
//! Every route here sits behind `require_superadmin`.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get},
    Json, Router,
};

use crate::api::middleware::{ApiError, AppState};
use crate::models::{CreateAdminInput, CreateTenantInput, UpdateTenantInput};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/stats", get(stats))
        .route("/tenants", get(list_tenants).post(create_tenant))
        .route(
            "/tenants/{id}",
            get(get_tenant).put(update_tenant).delete(delete_tenant),
        )
        .route("/tenants/{id}/admins", get(list_admins).post(create_admin))
        .route("/tenants/{id}/admins/{admin_id}", delete(delete_admin))
}

/// GET /musedock/stats
async fn stats(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let stats = state.maintenance_service.stats().await?;
    Ok(Json(stats))
}

/// GET /musedock/tenants
async fn list_tenants(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let tenants = state.tenant_service.list().await?;
    Ok(Json(tenants))
}

/// POST /musedock/tenants
async fn create_tenant(
    State(state): State<AppState>,
    Json(input): Json<CreateTenantInput>,
) -> Result<impl IntoResponse, ApiError> {
    let tenant = state.tenant_service.create(input).await?;
    Ok((StatusCode::CREATED, Json(tenant)))
}

/// GET /musedock/tenants/{id}
async fn get_tenant(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.tenant_service.get(id).await?))
}

/// PUT /musedock/tenants/{id}
///
/// Also suspends or reactivates the tenant through `status`.
async fn update_tenant(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(input): Json<UpdateTenantInput>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.tenant_service.update(id, input).await?))
}

/// DELETE /musedock/tenants/{id}
async fn delete_tenant(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    state.tenant_service.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /musedock/tenants/{id}/admins
async fn list_admins(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let tenant = state.tenant_service.get(id).await?;
    Ok(Json(state.auth_service.list_admins(Some(tenant.id)).await?))
}

/// POST /musedock/tenants/{id}/admins
async fn create_admin(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(input): Json<CreateAdminInput>,
) -> Result<impl IntoResponse, ApiError> {
    let tenant = state.tenant_service.get(id).await?;
    let admin = state.auth_service.create_admin(Some(tenant.id), input).await?;
    Ok((StatusCode::CREATED, Json(admin)))
}

/// DELETE /musedock/tenants/{id}/admins/{admin_id}
async fn delete_admin(
    State(state): State<AppState>,
    Path((id, admin_id)): Path<(i64, i64)>,
) -> Result<impl IntoResponse, ApiError> {
    state.auth_service.delete_admin(id, admin_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
