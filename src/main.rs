//! MuseDock - a multi-tenant content service

use anyhow::Result;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use musedock::{
    api::{self, AppState},
    cache::create_cache,
    config::Config,
    db,
};

/// How often expired sessions and stale rate-limit entries are dropped
const CLEANUP_INTERVAL: Duration = Duration::from_secs(300);

/// How often trash and revision retention are enforced
const RETENTION_INTERVAL: Duration = Duration::from_secs(3600);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "musedock=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting MuseDock...");

    // Load configuration
    let config_path = std::env::var("MUSEDOCK_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.yml"));
    let config = Arc::new(Config::load_with_env(&config_path)?);
    tracing::info!(path = %config_path.display(), "Configuration loaded");

    // Initialize database
    let pool = db::create_pool(&config.database).await?;
    tracing::info!("Database connected: {:?}", config.database.driver);

    let applied = db::migrations::run_migrations(&pool).await?;
    tracing::info!(applied, "Database migrations completed");

    let cache = create_cache(&config.cache);
    let state = AppState::new(config.clone(), pool, cache);

    match &config.auth.bootstrap {
        Some(bootstrap) => {
            state.auth_service.bootstrap_superadmin(bootstrap).await?;
        }
        None => {
            if state.auth_service.list_admins(None).await?.is_empty() {
                tracing::warn!("No superadmin exists; set auth.bootstrap or MUSEDOCK_ADMIN_* to create one");
            }
        }
    }

    spawn_background_tasks(&state);

    // Build router
    let app = api::build_router(state, &config.server.cors_origin);

    // Start server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;

    Ok(())
}

fn spawn_background_tasks(state: &AppState) {
    // Sessions and login rate limiter
    {
        let auth = state.auth_service.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(CLEANUP_INTERVAL);
            loop {
                interval.tick().await;
                match auth.cleanup_expired_sessions().await {
                    Ok(0) => {}
                    Ok(removed) => tracing::debug!(removed, "Removed expired sessions"),
                    Err(e) => tracing::warn!("Session cleanup failed: {}", e),
                }
                auth.limiter().cleanup().await;
            }
        });
    }

    // Trash and revision retention
    {
        let maintenance = state.maintenance_service.clone();
        let trash_days = state.config.trash.retention_days;
        let revision_days = state.config.revisions.retention_days;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(RETENTION_INTERVAL);
            loop {
                interval.tick().await;
                if let Err(e) = maintenance.purge_expired_trash(trash_days).await {
                    tracing::warn!("Trash purge failed: {:#}", e);
                }
                if let Err(e) = maintenance.purge_old_revisions(revision_days).await {
                    tracing::warn!("Revision purge failed: {:#}", e);
                }
            }
        });
    }
}
