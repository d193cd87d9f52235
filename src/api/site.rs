//! Public site information API
//!
//! Name and domain of the tenant serving the request host, plus counts
//! of its published content. Cached per tenant until content changes.

use axum::{extract::State, response::IntoResponse, routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::api::middleware::{ApiError, AppState, CurrentTenant};
use crate::cache::CacheLayer;
use crate::models::{ListParams, PublicPostFilter};
use crate::services::content::{cache_key, SCOPE_SITE};

/// Response for public site info
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteInfoResponse {
    pub version: String,
    pub name: String,
    pub domain: String,
    pub page_count: i64,
    pub post_count: i64,
}

/// Build the public site router
pub fn router() -> Router<AppState> {
    Router::new().route("/", get(get_site_info))
}

/// GET /api/v1/site
async fn get_site_info(
    State(state): State<AppState>,
    CurrentTenant(tenant): CurrentTenant,
) -> Result<impl IntoResponse, ApiError> {
    let key = cache_key(tenant.id, SCOPE_SITE, "info");
    if let Some(info) = state.cache.get::<SiteInfoResponse>(&key).await.ok().flatten() {
        return Ok(Json(info));
    }

    let probe = ListParams::new(1, 1);
    let pages = state.page_service.list_published(tenant.id, &probe).await?;
    let posts = state
        .post_service
        .list_published(tenant.id, &PublicPostFilter::default(), &probe)
        .await?;

    let info = SiteInfoResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        name: tenant.name,
        domain: tenant.domain,
        page_count: pages.total,
        post_count: posts.total,
    };
    let ttl = Duration::from_secs(state.config.cache.ttl_seconds);
    let _ = state.cache.set(&key, &info, ttl).await;
    Ok(Json(info))
}
