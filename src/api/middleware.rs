//! API middleware
//!
//! Contains middleware for:
//! - Authentication (session token validation)
//! - Authorization (superadmin and tenant access checks)
//! - Tenant resolution from the `Host` header

use axum::{
    extract::{ConnectInfo, FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use crate::cache::Cache;
use crate::config::Config;
use crate::db::repositories::{
    SqlxAdminRepository, SqlxBlogCategoryRepository, SqlxBlogPostRepository, SqlxBlogTagRepository,
    SqlxPageRepository, SqlxRevisionRepository, SqlxSessionRepository, SqlxSlugRepository,
    SqlxTenantRepository,
};
use crate::db::DynDatabasePool;
use crate::models::{Actor, Admin, Tenant};
use crate::services::{
    AuthError, AuthService, BlogCategoryService, BlogPostService, BlogTagService, ContentError,
    LoginRateLimiter, MaintenanceService, PageService, RevisionService, TenantError, TenantService,
};

/// Header a superadmin uses to pick the tenant an admin request targets
pub const TENANT_HEADER: &str = "x-tenant-id";

/// Cookie carrying the session token for browser clients
pub const SESSION_COOKIE: &str = "musedock_session";

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub cache: Arc<Cache>,
    pub auth_service: Arc<AuthService>,
    pub tenant_service: Arc<TenantService>,
    pub page_service: Arc<PageService>,
    pub post_service: Arc<BlogPostService>,
    pub category_service: Arc<BlogCategoryService>,
    pub tag_service: Arc<BlogTagService>,
    pub revision_service: Arc<RevisionService>,
    pub maintenance_service: Arc<MaintenanceService>,
}

impl AppState {
    /// Wire repositories and services over one database pool
    pub fn new(config: Arc<Config>, pool: DynDatabasePool, cache: Arc<Cache>) -> Self {
        let ttl = Duration::from_secs(config.cache.ttl_seconds);

        let admin_repo = SqlxAdminRepository::boxed(pool.clone());
        let tenant_repo = SqlxTenantRepository::boxed(pool.clone());
        let page_repo = SqlxPageRepository::boxed(pool.clone());
        let post_repo = SqlxBlogPostRepository::boxed(pool.clone());
        let revision_repo = SqlxRevisionRepository::boxed(pool.clone());
        let slug_repo = SqlxSlugRepository::boxed(pool.clone());

        let auth_service = Arc::new(AuthService::new(
            admin_repo.clone(),
            SqlxSessionRepository::boxed(pool.clone()),
            Arc::new(LoginRateLimiter::new()),
            config.auth.session_days,
        ));
        let tenant_service = Arc::new(TenantService::new(tenant_repo.clone(), cache.clone(), ttl));
        let revision_service = Arc::new(RevisionService::new(
            revision_repo.clone(),
            page_repo.clone(),
            post_repo.clone(),
            slug_repo.clone(),
            cache.clone(),
            config.revisions.clone(),
        ));
        let category_service = Arc::new(BlogCategoryService::new(
            SqlxBlogCategoryRepository::boxed(pool.clone()),
            cache.clone(),
            ttl,
        ));
        let tag_service = Arc::new(BlogTagService::new(
            SqlxBlogTagRepository::boxed(pool.clone()),
            cache.clone(),
            ttl,
        ));
        let page_service = Arc::new(PageService::new(
            page_repo.clone(),
            slug_repo.clone(),
            revision_service.clone(),
            cache.clone(),
            ttl,
        ));
        let post_service = Arc::new(BlogPostService::new(
            post_repo.clone(),
            slug_repo,
            revision_service.clone(),
            category_service.clone(),
            tag_service.clone(),
            cache.clone(),
            ttl,
        ));
        let maintenance_service = Arc::new(MaintenanceService::new(
            tenant_repo,
            admin_repo,
            page_repo,
            post_repo,
            revision_repo,
            revision_service.clone(),
        ));

        Self {
            config,
            cache,
            auth_service,
            tenant_service,
            page_service,
            post_service,
            category_service,
            tag_service,
            revision_service,
            maintenance_service,
        }
    }
}

/// Authenticated admin extracted from request
#[derive(Debug, Clone)]
pub struct AuthenticatedAdmin(pub Admin);

/// Who is acting, with the request's client details
#[derive(Debug, Clone)]
pub struct RequestActor(pub Actor);

/// Tenant the request is scoped to
#[derive(Debug, Clone)]
pub struct CurrentTenant(pub Tenant);

/// Error response for API errors
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    pub fn with_details(
        code: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: Some(details),
            },
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("UNAUTHORIZED", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new("FORBIDDEN", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("NOT_FOUND", message)
    }

    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::new("VALIDATION_ERROR", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new("CONFLICT", message)
    }

    pub fn rate_limited(message: impl Into<String>, retry_after_secs: i64) -> Self {
        Self::with_details(
            "RATE_LIMITED",
            message,
            serde_json::json!({ "retry_after": retry_after_secs }),
        )
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new("INTERNAL_ERROR", message)
    }

    /// Log the cause and hide it from the client
    fn internal(err: anyhow::Error) -> Self {
        tracing::error!(error = ?err, "Request failed");
        Self::internal_error("Internal server error")
    }

    pub fn status(&self) -> StatusCode {
        match self.error.code.as_str() {
            "UNAUTHORIZED" => StatusCode::UNAUTHORIZED,
            "FORBIDDEN" | "ACCOUNT_DISABLED" | "TENANT_SUSPENDED" => StatusCode::FORBIDDEN,
            "NOT_FOUND" => StatusCode::NOT_FOUND,
            "VALIDATION_ERROR" => StatusCode::BAD_REQUEST,
            "CONFLICT" => StatusCode::CONFLICT,
            "RATE_LIMITED" => StatusCode::TOO_MANY_REQUESTS,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::internal(err)
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials => ApiError::unauthorized(err.to_string()),
            AuthError::RateLimited { retry_after_secs } => {
                ApiError::rate_limited(err.to_string(), retry_after_secs)
            }
            AuthError::AccountDisabled => ApiError::new("ACCOUNT_DISABLED", err.to_string()),
            AuthError::ValidationError(msg) => ApiError::validation_error(msg),
            AuthError::Conflict(msg) => ApiError::conflict(msg),
            AuthError::NotFound(msg) => ApiError::not_found(msg),
            AuthError::InternalError(e) => ApiError::internal(e),
        }
    }
}

impl From<TenantError> for ApiError {
    fn from(err: TenantError) -> Self {
        match err {
            TenantError::NotFound(_) => ApiError::not_found(err.to_string()),
            TenantError::ValidationError(msg) => ApiError::validation_error(msg),
            TenantError::DuplicateDomain(_) => ApiError::conflict(err.to_string()),
            TenantError::InternalError(e) => ApiError::internal(e),
        }
    }
}

impl From<ContentError> for ApiError {
    fn from(err: ContentError) -> Self {
        match err {
            ContentError::NotFound(msg) => ApiError::not_found(msg),
            ContentError::ValidationError(msg) => ApiError::validation_error(msg),
            ContentError::Conflict(msg) => ApiError::conflict(msg),
            ContentError::Forbidden(msg) => ApiError::forbidden(msg),
            ContentError::InternalError(e) => ApiError::internal(e),
        }
    }
}

impl<S: Send + Sync> FromRequestParts<S> for AuthenticatedAdmin {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedAdmin>()
            .cloned()
            .ok_or_else(|| ApiError::unauthorized("Authentication required"))
    }
}

impl<S: Send + Sync> FromRequestParts<S> for RequestActor {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<RequestActor>()
            .cloned()
            .ok_or_else(|| ApiError::unauthorized("Authentication required"))
    }
}

impl<S: Send + Sync> FromRequestParts<S> for CurrentTenant {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentTenant>()
            .cloned()
            .ok_or_else(|| ApiError::not_found("Unknown site"))
    }
}

/// Resolved client address; `None` when neither the socket nor a trusted
/// proxy header provides one
#[derive(Debug, Clone, Copy)]
pub struct ClientIp(pub Option<IpAddr>);

impl FromRequestParts<AppState> for ClientIp {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let peer = ConnectInfo::<SocketAddr>::from_request_parts(parts, state)
            .await
            .ok()
            .map(|ConnectInfo(addr)| addr.ip());
        Ok(ClientIp(client_ip(&parts.headers, peer, state.config.server.trust_proxy)))
    }
}

/// Extract session token from the `Authorization` header or session cookie
pub fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    if let Some(token) = headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
    {
        return Some(token.trim().to_string());
    }

    let cookies = headers.get(header::COOKIE)?.to_str().ok()?;
    cookies.split(';').find_map(|cookie| {
        cookie
            .trim()
            .strip_prefix(SESSION_COOKIE)
            .and_then(|rest| rest.strip_prefix('='))
            .map(str::to_string)
    })
}

/// Client address for rate limiting and revision authorship.
///
/// Forwarding headers are only honoured when `trust_proxy` is set;
/// otherwise the socket peer is the client.
pub fn client_ip(headers: &HeaderMap, peer: Option<IpAddr>, trust_proxy: bool) -> Option<IpAddr> {
    if trust_proxy {
        if let Some(ip) = forwarded_ip(headers) {
            return Some(ip);
        }
    }
    peer
}

fn forwarded_ip(headers: &HeaderMap) -> Option<IpAddr> {
    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|h| h.to_str().ok()) {
        if let Some(ip) = forwarded.split(',').next().and_then(|ip| ip.trim().parse().ok()) {
            return Some(ip);
        }
    }
    headers
        .get("x-real-ip")
        .and_then(|h| h.to_str().ok())
        .and_then(|ip| ip.trim().parse().ok())
}

fn user_agent(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::USER_AGENT)
        .and_then(|h| h.to_str().ok())
        .map(String::from)
}

fn host(headers: &HeaderMap) -> Option<&str> {
    headers.get(header::HOST).and_then(|h| h.to_str().ok())
}

/// Revision author details for an admin acting through a request
pub fn actor_for(admin: &Admin, headers: &HeaderMap, ip: Option<IpAddr>) -> Actor {
    Actor {
        admin_id: Some(admin.id),
        name: Some(admin.name.clone()),
        ip_address: ip.map(|ip| ip.to_string()),
        user_agent: user_agent(headers),
    }
}

fn ensure_active(tenant: Tenant) -> Result<Tenant, ApiError> {
    if tenant.is_active() {
        Ok(tenant)
    } else {
        Err(ApiError::new("TENANT_SUSPENDED", "This site is suspended"))
    }
}

async fn tenant_from_host(state: &AppState, headers: &HeaderMap) -> Result<Tenant, ApiError> {
    let host = host(headers).ok_or_else(|| ApiError::not_found("Unknown site"))?;
    state
        .tenant_service
        .resolve_host(host)
        .await?
        .ok_or_else(|| ApiError::not_found("Unknown site"))
}

/// Authentication middleware
pub async fn require_auth(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_session_token(request.headers())
        .ok_or_else(|| ApiError::unauthorized("Missing authentication token"))?;

    let admin = state
        .auth_service
        .validate_session(&token)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Invalid or expired session"))?;

    let actor = actor_for(&admin, request.headers(), ip);
    request.extensions_mut().insert(AuthenticatedAdmin(admin));
    request.extensions_mut().insert(RequestActor(actor));
    Ok(next.run(request).await)
}

/// Superadmin authorization middleware
pub async fn require_superadmin(request: Request, next: Next) -> Result<Response, ApiError> {
    let admin = request
        .extensions()
        .get::<AuthenticatedAdmin>()
        .ok_or_else(|| ApiError::unauthorized("Authentication required"))?;

    if !admin.0.is_superadmin() {
        return Err(ApiError::forbidden("Superadmin privileges required"));
    }

    Ok(next.run(request).await)
}

/// Resolve the tenant serving the request host for public routes
pub async fn resolve_site(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let tenant = ensure_active(tenant_from_host(&state, request.headers()).await?)?;
    request.extensions_mut().insert(CurrentTenant(tenant));
    Ok(next.run(request).await)
}

/// Resolve the tenant an authenticated admin request targets.
///
/// Superadmins may pick any tenant through `X-Tenant-Id`; everyone else
/// is bound to the tenant of the host and must belong to it.
pub async fn resolve_admin_tenant(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let admin = request
        .extensions()
        .get::<AuthenticatedAdmin>()
        .map(|a| a.0.clone())
        .ok_or_else(|| ApiError::unauthorized("Authentication required"))?;

    let explicit = request
        .headers()
        .get(TENANT_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty());

    let tenant = match explicit {
        Some(raw) if admin.is_superadmin() => {
            let id = raw
                .parse::<i64>()
                .map_err(|_| ApiError::validation_error(format!("Invalid {} header", TENANT_HEADER)))?;
            state.tenant_service.get(id).await?
        }
        _ => tenant_from_host(&state, request.headers()).await?,
    };

    if !admin.can_access_tenant(tenant.id) {
        tracing::warn!(admin_id = admin.id, tenant_id = tenant.id, "Cross-tenant access denied");
        return Err(ApiError::forbidden("You do not have access to this site"));
    }
    let tenant = ensure_active(tenant)?;

    request.extensions_mut().insert(CurrentTenant(tenant));
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(
                header::HeaderName::from_bytes(name.as_bytes()).unwrap(),
                HeaderValue::from_str(value).unwrap(),
            );
        }
        map
    }

    #[test]
    fn test_extract_session_token_from_bearer() {
        let map = headers(&[("authorization", "Bearer abc123")]);
        assert_eq!(extract_session_token(&map), Some("abc123".to_string()));
    }

    #[test]
    fn test_extract_session_token_from_cookie() {
        let map = headers(&[("cookie", "theme=dark; musedock_session=tok; other=1")]);
        assert_eq!(extract_session_token(&map), Some("tok".to_string()));
    }

    #[test]
    fn test_extract_session_token_bearer_priority() {
        let map = headers(&[("authorization", "Bearer first"), ("cookie", "musedock_session=second")]);
        assert_eq!(extract_session_token(&map), Some("first".to_string()));
    }

    #[test]
    fn test_extract_session_token_none() {
        assert_eq!(extract_session_token(&headers(&[("authorization", "Basic xyz")])), None);
        assert_eq!(extract_session_token(&headers(&[("cookie", "musedock_sessionx=1")])), None);
    }

    #[test]
    fn test_client_ip_ignores_forwarding_headers_by_default() {
        let peer: IpAddr = "198.51.100.4".parse().unwrap();
        let map = headers(&[("x-forwarded-for", "203.0.113.9"), ("x-real-ip", "10.0.0.2")]);
        assert_eq!(client_ip(&map, Some(peer), false), Some(peer));
        assert_eq!(client_ip(&map, None, false), None);
    }

    #[test]
    fn test_client_ip_behind_trusted_proxy() {
        let peer: IpAddr = "10.0.0.1".parse().unwrap();
        let map = headers(&[("x-forwarded-for", "203.0.113.9, 10.0.0.1"), ("x-real-ip", "10.0.0.2")]);
        assert_eq!(client_ip(&map, Some(peer), true), Some("203.0.113.9".parse().unwrap()));
        let map = headers(&[("x-real-ip", "10.0.0.2")]);
        assert_eq!(client_ip(&map, Some(peer), true), Some("10.0.0.2".parse().unwrap()));
        let map = headers(&[("x-forwarded-for", "garbage")]);
        assert_eq!(client_ip(&map, Some(peer), true), Some(peer));
    }

    #[test]
    fn test_error_statuses() {
        assert_eq!(ApiError::from(AuthError::InvalidCredentials).status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            ApiError::from(AuthError::RateLimited { retry_after_secs: 60 }).status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(ApiError::from(AuthError::AccountDisabled).status(), StatusCode::FORBIDDEN);
        assert_eq!(
            ApiError::from(TenantError::DuplicateDomain("a.test".into())).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(ApiError::from(ContentError::NotFound("x".into())).status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::from(ContentError::ValidationError("x".into())).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ApiError::from(ContentError::Forbidden("x".into())).status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_internal_error_hides_cause() {
        let err = ApiError::from(ContentError::InternalError(anyhow::anyhow!("disk on fire")));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!err.error.message.contains("disk"));
    }

    #[test]
    fn test_rate_limited_details() {
        let err = ApiError::rate_limited("slow down", 900);
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["error"]["code"], "RATE_LIMITED");
        assert_eq!(json["error"]["details"]["retry_after"], 900);
    }
}
