//! Authentication API endpoints
//!
//! Superadmins sign in under `/musedock`, tenant admins under
//! `/api/v1/auth` on the tenant's own domain:
//! - POST /login - open a session
//! - POST /logout - close the current session
//! - GET /me - the signed-in admin

use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::net::IpAddr;

use crate::api::middleware::{
    extract_session_token, ApiError, AppState, AuthenticatedAdmin, ClientIp, CurrentTenant,
    SESSION_COOKIE,
};
use crate::models::{Admin, Session};
use crate::services::LoginInput;

/// Response for successful authentication
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub admin: Admin,
    pub token: String,
    pub expires_at: String,
}

/// Routes that need no session
pub fn superadmin_public_router() -> Router<AppState> {
    Router::new().route("/login", post(superadmin_login))
}

/// Tenant login; the tenant comes from the host
pub fn tenant_public_router() -> Router<AppState> {
    Router::new().route("/login", post(tenant_login))
}

/// Routes for an open session, shared by both panels
pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/logout", post(logout))
        .route("/me", get(me))
}

fn session_cookie(session: &Session, max_age_secs: i64) -> Result<HeaderValue, ApiError> {
    let cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        SESSION_COOKIE, session.id, max_age_secs
    );
    HeaderValue::from_str(&cookie).map_err(|_| ApiError::internal_error("Invalid session cookie"))
}

async fn open_session(
    state: &AppState,
    tenant_id: Option<i64>,
    ip: Option<IpAddr>,
    body: LoginInput,
) -> Result<impl IntoResponse, ApiError> {
    let (session, admin) = state
        .auth_service
        .login(tenant_id, &body, ip)
        .await?;

    let max_age = state.config.auth.session_days * 24 * 60 * 60;
    let mut response_headers = HeaderMap::new();
    response_headers.insert(header::SET_COOKIE, session_cookie(&session, max_age)?);

    Ok((
        response_headers,
        Json(AuthResponse {
            admin,
            expires_at: session.expires_at.to_rfc3339(),
            token: session.id,
        }),
    ))
}

/// POST /musedock/login
async fn superadmin_login(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    Json(body): Json<LoginInput>,
) -> Result<impl IntoResponse, ApiError> {
    open_session(&state, None, ip, body).await
}

/// POST /api/v1/auth/login
async fn tenant_login(
    State(state): State<AppState>,
    CurrentTenant(tenant): CurrentTenant,
    ClientIp(ip): ClientIp,
    Json(body): Json<LoginInput>,
) -> Result<impl IntoResponse, ApiError> {
    open_session(&state, Some(tenant.id), ip, body).await
}

/// POST /logout
async fn logout(
    State(state): State<AppState>,
    _admin: AuthenticatedAdmin,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let token = extract_session_token(&headers)
        .ok_or_else(|| ApiError::unauthorized("Missing authentication token"))?;
    state.auth_service.logout(&token).await?;

    let clear_cookie = format!("{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0", SESSION_COOKIE);
    let mut response_headers = HeaderMap::new();
    response_headers.insert(
        header::SET_COOKIE,
        HeaderValue::from_str(&clear_cookie).map_err(|_| ApiError::internal_error("Invalid session cookie"))?,
    );

    Ok((response_headers, Json(serde_json::json!({ "success": true }))))
}

/// GET /me
async fn me(AuthenticatedAdmin(admin): AuthenticatedAdmin) -> Json<Admin> {
    Json(admin)
}
