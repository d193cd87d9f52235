//! API layer - HTTP handlers and routing
//!
//! Three surfaces share one router:
//! - `/musedock` - the superadmin panel (platform stats, tenants, tenant admins)
//! - `/api/v1/admin` - the tenant admin panel (pages, blog, revisions, trash)
//! - `/api/v1` - the public read API of the tenant serving the request host

pub mod auth;
pub mod categories;
pub mod common;
pub mod middleware;
pub mod pages;
pub mod posts;
pub mod revisions;
pub mod site;
pub mod superadmin;
pub mod tags;

use axum::{
    http::{header, HeaderName, HeaderValue, Method},
    middleware as axum_middleware,
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use middleware::{ApiError, AppState, AuthenticatedAdmin, ClientIp, CurrentTenant, RequestActor};

/// Superadmin panel, mounted at `/musedock`
pub fn build_superadmin_router(state: AppState) -> Router<AppState> {
    let protected = Router::new()
        .merge(auth::protected_router())
        .merge(superadmin::router())
        .route_layer(axum_middleware::from_fn(middleware::require_superadmin))
        .route_layer(axum_middleware::from_fn_with_state(
            state,
            middleware::require_auth,
        ));

    Router::new()
        .merge(auth::superadmin_public_router())
        .merge(protected)
}

/// Tenant admin and public API, mounted at `/api/v1`
pub fn build_api_router(state: AppState) -> Router<AppState> {
    // Tenant admin routes (need a session that may act on the tenant)
    let admin_routes = Router::new()
        .nest("/pages", pages::router())
        .nest("/blog/posts", posts::router())
        .nest("/blog/categories", categories::router())
        .nest("/blog/tags", tags::router())
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::resolve_admin_tenant,
        ))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    let auth_routes = Router::new()
        .merge(auth::tenant_public_router().route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::resolve_site,
        )))
        .merge(
            auth::protected_router()
                .route_layer(axum_middleware::from_fn_with_state(
                    state.clone(),
                    middleware::resolve_admin_tenant,
                ))
                .route_layer(axum_middleware::from_fn_with_state(
                    state.clone(),
                    middleware::require_auth,
                )),
        );

    // Public routes, scoped to the tenant of the host
    let public_routes = Router::new()
        .nest("/pages", pages::public_router())
        .nest("/blog/posts", posts::public_router())
        .nest("/blog/categories", categories::public_router())
        .nest("/blog/tags", tags::public_router())
        .nest("/site", site::router())
        .route_layer(axum_middleware::from_fn_with_state(
            state,
            middleware::resolve_site,
        ));

    Router::new()
        .nest("/admin", admin_routes)
        .nest("/auth", auth_routes)
        .merge(public_routes)
}

fn cors_layer(cors_origin: &str) -> CorsLayer {
    let cors = match cors_origin.parse::<HeaderValue>() {
        Ok(origin) if cors_origin != "*" => CorsLayer::new().allow_origin(origin).allow_credentials(true),
        Ok(_) => CorsLayer::new().allow_origin(Any),
        Err(_) => {
            tracing::warn!(cors_origin, "Invalid CORS origin, allowing any origin");
            CorsLayer::new().allow_origin(Any)
        }
    };
    cors.allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static(middleware::TENANT_HEADER),
        ])
}

async fn route_not_found() -> ApiError {
    ApiError::not_found("Route not found")
}

/// Build the complete router with middleware
pub fn build_router(state: AppState, cors_origin: &str) -> Router {
    Router::new()
        .nest("/musedock", build_superadmin_router(state.clone()))
        .nest("/api/v1", build_api_router(state.clone()))
        .fallback(route_not_found)
        .layer(cors_layer(cors_origin))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::Cache;
    use crate::config::{BootstrapAdmin, Config};
    use crate::db::repositories::test_support::setup_pool;
    use crate::models::{CreateAdminInput, CreateTenantInput, Tenant};
    use axum::body::Body;
    use axum::extract::connect_info::MockConnectInfo;
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use std::net::SocketAddr;
    use std::sync::Arc;
    use tower::ServiceExt;

    const PASSWORD: &str = "correct-horse-battery";

    async fn app() -> (Router, AppState) {
        let pool = setup_pool().await;
        let state = AppState::new(Arc::new(Config::default()), pool, Arc::new(Cache::new()));
        let peer = SocketAddr::from(([192, 0, 2, 10], 50000));
        let router = build_router(state.clone(), "*").layer(MockConnectInfo(peer));
        (router, state)
    }

    async fn tenant(state: &AppState, domain: &str) -> Tenant {
        state
            .tenant_service
            .create(CreateTenantInput {
                name: domain.into(),
                domain: domain.into(),
            })
            .await
            .unwrap()
    }

    async fn tenant_admin(state: &AppState, tenant: &Tenant, email: &str) {
        state
            .auth_service
            .create_admin(
                Some(tenant.id),
                CreateAdminInput {
                    name: "Editor".into(),
                    email: email.into(),
                    password: PASSWORD.into(),
                    role: None,
                },
            )
            .await
            .unwrap();
    }

    fn request(method: &str, uri: &str, host: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri).header("host", host);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {}", token));
        }
        match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    async fn login(app: &Router, uri: &str, host: &str, email: &str) -> String {
        let body = json!({ "email": email, "password": PASSWORD });
        let (status, json) = send(app, request("POST", uri, host, None, Some(body))).await;
        assert_eq!(status, StatusCode::OK, "{}", json);
        json["token"].as_str().unwrap().to_string()
    }

    async fn superadmin_token(app: &Router, state: &AppState) -> String {
        let bootstrap = BootstrapAdmin {
            name: "Root".into(),
            email: "root@platform.test".into(),
            password: PASSWORD.into(),
        };
        state.auth_service.bootstrap_superadmin(&bootstrap).await.unwrap();
        login(app, "/musedock/login", "panel.test", "root@platform.test").await
    }

    #[tokio::test]
    async fn test_superadmin_manages_tenants() {
        let (app, state) = app().await;
        let (status, _) = send(&app, request("GET", "/musedock/tenants", "panel.test", None, None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let token = superadmin_token(&app, &state).await;
        let (status, me) = send(&app, request("GET", "/musedock/me", "panel.test", Some(&token), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(me["role"], "superadmin");
        assert!(me.get("password_hash").is_none());

        let body = json!({ "name": "Shop", "domain": "Shop.Example.com" });
        let (status, created) =
            send(&app, request("POST", "/musedock/tenants", "panel.test", Some(&token), Some(body))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["domain"], "shop.example.com");

        let body = json!({ "name": "Copy", "domain": "shop.example.com" });
        let (status, error) =
            send(&app, request("POST", "/musedock/tenants", "panel.test", Some(&token), Some(body))).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(error["error"]["code"], "CONFLICT");

        let admins_uri = format!("/musedock/tenants/{}/admins", created["id"]);
        let body = json!({ "name": "Owner", "email": "owner@shop.test", "password": PASSWORD });
        let (status, admin) = send(&app, request("POST", &admins_uri, "panel.test", Some(&token), Some(body))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(admin["role"], "admin");

        let (status, stats) = send(&app, request("GET", "/musedock/stats", "panel.test", Some(&token), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(stats["tenants"], 1);
        assert_eq!(stats["admins"], 2);
    }

    #[tokio::test]
    async fn test_tenant_admin_is_confined_to_its_tenant() {
        let (app, state) = app().await;
        let one = tenant(&state, "one.test").await;
        tenant(&state, "two.test").await;
        tenant_admin(&state, &one, "editor@one.test").await;

        // Accounts are scoped: the same credentials do not work on another host
        let body = json!({ "email": "editor@one.test", "password": PASSWORD });
        let (status, _) = send(&app, request("POST", "/api/v1/auth/login", "two.test", None, Some(body))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let token = login(&app, "/api/v1/auth/login", "one.test", "editor@one.test").await;
        let (status, _) = send(&app, request("GET", "/api/v1/admin/pages", "one.test", Some(&token), None)).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = send(&app, request("GET", "/api/v1/admin/pages", "two.test", Some(&token), None)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, _) = send(&app, request("GET", "/musedock/tenants", "one.test", Some(&token), None)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = send(&app, request("POST", "/api/v1/auth/logout", "one.test", Some(&token), None)).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = send(&app, request("GET", "/api/v1/auth/me", "one.test", Some(&token), None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_superadmin_targets_tenant_by_header() {
        let (app, state) = app().await;
        let shop = tenant(&state, "shop.test").await;
        let token = superadmin_token(&app, &state).await;

        let mut req = request(
            "POST",
            "/api/v1/admin/pages",
            "panel.test",
            Some(&token),
            Some(json!({ "title": "Hello", "content": "<p>hi</p>" })),
        );
        req.headers_mut()
            .insert(middleware::TENANT_HEADER, shop.id.to_string().parse().unwrap());
        let (status, page) = send(&app, req).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(page["tenant_id"], shop.id);
    }

    #[tokio::test]
    async fn test_page_publish_revise_and_restore() {
        let (app, state) = app().await;
        let one = tenant(&state, "one.test").await;
        tenant_admin(&state, &one, "editor@one.test").await;
        let token = login(&app, "/api/v1/auth/login", "one.test", "editor@one.test").await;

        let body = json!({ "title": "About", "content": "<p>First</p>", "status": "published" });
        let (status, page) =
            send(&app, request("POST", "/api/v1/admin/pages", "one.test", Some(&token), Some(body))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(page["slug"], "about");
        let id = page["id"].as_i64().unwrap();

        let (status, public) = send(&app, request("GET", "/api/v1/pages/about", "one.test", None, None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(public["content"], "<p>First</p>");
        let (status, _) = send(&app, request("GET", "/api/v1/pages/about", "two.test", None, None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let uri = format!("/api/v1/admin/pages/{}", id);
        let body = json!({ "title": "About us", "content": "<p>Second</p>" });
        let (status, _) = send(&app, request("PUT", &uri, "one.test", Some(&token), Some(body))).await;
        assert_eq!(status, StatusCode::OK);

        let (status, history) =
            send(&app, request("GET", &format!("{}/revisions", uri), "one.test", Some(&token), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(history["total"], 2);
        let first = history["items"]
            .as_array()
            .unwrap()
            .iter()
            .find(|r| r["revision_number"] == 1)
            .unwrap()["id"]
            .as_i64()
            .unwrap();

        let compare = format!("{}/revisions/compare?from={}", uri, first);
        let (status, diff) = send(&app, request("GET", &compare, "one.test", Some(&token), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(diff["content_changed"], true);

        let restore = format!("{}/revisions/{}/restore", uri, first);
        let (status, restored) = send(&app, request("POST", &restore, "one.test", Some(&token), None)).await;
        assert_eq!(status, StatusCode::OK, "{}", restored);
        assert_eq!(restored["item"]["title"], "About");
        assert_eq!(restored["revision"]["revision_type"], "restored");

        let (_, public) = send(&app, request("GET", "/api/v1/pages/about", "one.test", None, None)).await;
        assert_eq!(public["content"], "<p>First</p>");
    }

    #[tokio::test]
    async fn test_trash_hides_from_public_and_restores() {
        let (app, state) = app().await;
        let one = tenant(&state, "one.test").await;
        tenant_admin(&state, &one, "editor@one.test").await;
        let token = login(&app, "/api/v1/auth/login", "one.test", "editor@one.test").await;

        let body = json!({ "title": "Launch", "content": "<p>Go</p>", "status": "published", "tags": ["News"] });
        let (status, post) =
            send(&app, request("POST", "/api/v1/admin/blog/posts", "one.test", Some(&token), Some(body))).await;
        assert_eq!(status, StatusCode::CREATED);
        let id = post["id"].as_i64().unwrap();

        let (_, listed) = send(&app, request("GET", "/api/v1/blog/posts?tag=news", "one.test", None, None)).await;
        assert_eq!(listed["total"], 1);

        let uri = format!("/api/v1/admin/blog/posts/{}", id);
        let (status, _) = send(&app, request("DELETE", &uri, "one.test", Some(&token), None)).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(&app, request("GET", "/api/v1/blog/posts/launch", "one.test", None, None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (_, trash) =
            send(&app, request("GET", "/api/v1/admin/blog/posts/trash", "one.test", Some(&token), None)).await;
        assert_eq!(trash["total"], 1);

        let restore = format!("/api/v1/admin/blog/posts/trash/{}/restore", id);
        let (status, _) = send(&app, request("POST", &restore, "one.test", Some(&token), None)).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = send(&app, request("GET", "/api/v1/blog/posts/launch", "one.test", None, None)).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_suspended_and_unknown_sites() {
        let (app, state) = app().await;
        let one = tenant(&state, "one.test").await;

        let (status, site) = send(&app, request("GET", "/api/v1/site", "ONE.test:8080", None, None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(site["domain"], "one.test");

        let (status, _) = send(&app, request("GET", "/api/v1/pages", "nowhere.test", None, None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let suspend = crate::models::UpdateTenantInput {
            status: Some(crate::models::TenantStatus::Suspended),
            ..Default::default()
        };
        state.tenant_service.update(one.id, suspend).await.unwrap();
        let (status, error) = send(&app, request("GET", "/api/v1/pages", "one.test", None, None)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(error["error"]["code"], "TENANT_SUSPENDED");

        let (status, error) = send(&app, request("GET", "/nope", "one.test", None, None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(error["error"]["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_category_tree_endpoint() {
        let (app, state) = app().await;
        let one = tenant(&state, "one.test").await;
        tenant_admin(&state, &one, "editor@one.test").await;
        let token = login(&app, "/api/v1/auth/login", "one.test", "editor@one.test").await;

        let (status, news) = send(
            &app,
            request("POST", "/api/v1/admin/blog/categories", "one.test", Some(&token), Some(json!({ "name": "News" }))),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let body = json!({ "name": "Local", "parent_id": news["id"] });
        send(&app, request("POST", "/api/v1/admin/blog/categories", "one.test", Some(&token), Some(body))).await;

        let (status, tree) =
            send(&app, request("GET", "/api/v1/admin/blog/categories/tree", "one.test", Some(&token), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(tree.as_array().unwrap().len(), 1);
        assert_eq!(tree[0]["children"][0]["name"], "Local");
    }

    #[tokio::test]
    async fn test_login_is_limited_per_client_address() {
        let (app, state) = app().await;
        tenant(&state, "one.test").await;

        // Distinct accounts so only the per-address window applies;
        // a rotating X-Forwarded-For must not reset it.
        let mut statuses = Vec::new();
        for i in 0..12 {
            let body = json!({ "email": format!("nobody{}@one.test", i), "password": PASSWORD });
            let mut req = request("POST", "/api/v1/auth/login", "one.test", None, Some(body));
            req.headers_mut()
                .insert("x-forwarded-for", format!("203.0.113.{}", i).parse().unwrap());
            let (status, json) = send(&app, req).await;
            if status == StatusCode::TOO_MANY_REQUESTS {
                assert_eq!(json["error"]["code"], "RATE_LIMITED");
                assert!(json["error"]["details"]["retry_after"].as_i64().unwrap() >= 1);
            }
            statuses.push(status);
        }
        assert!(statuses[..10].iter().all(|s| *s == StatusCode::UNAUTHORIZED));
        assert_eq!(statuses[10], StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(statuses[11], StatusCode::TOO_MANY_REQUESTS);
    }
}
