//! Tenant service
//!
//! Tenants are addressed by domain. Domains are stored lowercase without
//! port or trailing dot, and request hosts are normalized the same way
//! before lookup.

use crate::cache::{tenant_prefix, Cache, CacheLayer};
use crate::db::repositories::TenantRepository;
use crate::models::{CreateTenantInput, Tenant, TenantStatus, UpdateTenantInput};
use anyhow::Context;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

const CACHE_KEY_DOMAIN: &str = "tenant:domain:";

/// Longest accepted domain name
const MAX_DOMAIN_LENGTH: usize = 253;

#[derive(Debug, thiserror::Error)]
pub enum TenantError {
    #[error("Tenant not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Domain already in use: {0}")]
    DuplicateDomain(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Lowercase host without port or trailing dot
pub fn normalize_host(host: &str) -> String {
    let host = host.trim().to_lowercase();
    let host = match host.rsplit_once(':') {
        Some((name, port)) if !name.is_empty() && port.chars().all(|c| c.is_ascii_digit()) => name.to_string(),
        _ => host,
    };
    host.trim_end_matches('.').to_string()
}

/// Normalize and validate a tenant domain
pub fn normalize_domain(domain: &str) -> Result<String, TenantError> {
    let domain = normalize_host(domain);
    let invalid = || TenantError::ValidationError(format!("Invalid domain: {}", domain));

    if domain.is_empty() || domain.len() > MAX_DOMAIN_LENGTH {
        return Err(invalid());
    }
    for label in domain.split('.') {
        let valid = !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
        if !valid {
            return Err(invalid());
        }
    }
    Ok(domain)
}

pub struct TenantService {
    repo: Arc<dyn TenantRepository>,
    cache: Arc<Cache>,
    cache_ttl: Duration,
}

impl TenantService {
    pub fn new(repo: Arc<dyn TenantRepository>, cache: Arc<Cache>, cache_ttl: Duration) -> Self {
        Self { repo, cache, cache_ttl }
    }

    async fn ensure_domain_free(&self, domain: &str, exclude_id: Option<i64>) -> Result<(), TenantError> {
        if self
            .repo
            .exists_by_domain(domain, exclude_id)
            .await
            .context("Failed to check domain")?
        {
            return Err(TenantError::DuplicateDomain(domain.to_string()));
        }
        Ok(())
    }

    async fn forget(&self, tenant: &Tenant) {
        let _ = self.cache.delete(&format!("{}{}", CACHE_KEY_DOMAIN, tenant.domain)).await;
        let _ = self.cache.delete_pattern(&format!("{}*", tenant_prefix(tenant.id))).await;
    }

    pub async fn create(&self, input: CreateTenantInput) -> Result<Tenant, TenantError> {
        let name = input.name.trim().to_string();
        if name.is_empty() {
            return Err(TenantError::ValidationError("Name cannot be empty".to_string()));
        }
        let domain = normalize_domain(&input.domain)?;
        self.ensure_domain_free(&domain, None).await?;

        let now = Utc::now();
        let tenant = Tenant {
            id: 0,
            name,
            domain,
            status: TenantStatus::Active,
            created_at: now,
            updated_at: now,
        };
        let tenant = self.repo.create(&tenant).await.context("Failed to create tenant")?;
        info!(tenant_id = tenant.id, domain = %tenant.domain, "Created tenant");
        Ok(tenant)
    }

    pub async fn get(&self, id: i64) -> Result<Tenant, TenantError> {
        self.repo
            .get_by_id(id)
            .await
            .context("Failed to get tenant")?
            .ok_or_else(|| TenantError::NotFound(id.to_string()))
    }

    pub async fn list(&self) -> Result<Vec<Tenant>, TenantError> {
        Ok(self.repo.list().await.context("Failed to list tenants")?)
    }

    /// Rename, move or suspend/activate a tenant
    pub async fn update(&self, id: i64, input: UpdateTenantInput) -> Result<Tenant, TenantError> {
        let previous = self.get(id).await?;
        let mut tenant = previous.clone();

        if let Some(name) = input.name {
            let name = name.trim().to_string();
            if name.is_empty() {
                return Err(TenantError::ValidationError("Name cannot be empty".to_string()));
            }
            tenant.name = name;
        }
        if let Some(domain) = input.domain {
            let domain = normalize_domain(&domain)?;
            if domain != tenant.domain {
                self.ensure_domain_free(&domain, Some(id)).await?;
            }
            tenant.domain = domain;
        }
        if let Some(status) = input.status {
            if status != tenant.status {
                info!(tenant_id = id, status = %status, "Changed tenant status");
            }
            tenant.status = status;
        }

        let tenant = self.repo.update(&tenant).await.context("Failed to update tenant")?;
        self.forget(&previous).await;
        Ok(tenant)
    }

    /// Delete a tenant and, through the foreign keys, everything it owns
    pub async fn delete(&self, id: i64) -> Result<(), TenantError> {
        let tenant = self.get(id).await?;
        self.repo.delete(id).await.context("Failed to delete tenant")?;
        self.forget(&tenant).await;
        info!(tenant_id = id, domain = %tenant.domain, "Deleted tenant");
        Ok(())
    }

    /// Tenant serving a request host, suspended or not
    pub async fn resolve_host(&self, host: &str) -> Result<Option<Tenant>, TenantError> {
        let domain = normalize_host(host);
        if domain.is_empty() {
            return Ok(None);
        }
        let key = format!("{}{}", CACHE_KEY_DOMAIN, domain);
        if let Some(tenant) = self.cache.get::<Tenant>(&key).await.ok().flatten() {
            return Ok(Some(tenant));
        }

        let tenant = self
            .repo
            .get_by_domain(&domain)
            .await
            .context("Failed to get tenant by domain")?;
        if let Some(tenant) = &tenant {
            let _ = self.cache.set(&key, tenant, self.cache_ttl).await;
        }
        Ok(tenant)
    }

    pub async fn count(&self) -> Result<i64, TenantError> {
        Ok(self.repo.count().await.context("Failed to count tenants")?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::setup_pool;
    use crate::db::repositories::SqlxTenantRepository;
    use proptest::prelude::*;

    async fn service() -> TenantService {
        let pool = setup_pool().await;
        TenantService::new(
            SqlxTenantRepository::boxed(pool),
            Arc::new(Cache::new()),
            Duration::from_secs(60),
        )
    }

    fn input(name: &str, domain: &str) -> CreateTenantInput {
        CreateTenantInput {
            name: name.into(),
            domain: domain.into(),
        }
    }

    #[test]
    fn test_normalize_host() {
        assert_eq!(normalize_host("Blog.Example.COM:8080"), "blog.example.com");
        assert_eq!(normalize_host("example.com."), "example.com");
        assert_eq!(normalize_host(" localhost "), "localhost");
    }

    #[test]
    fn test_normalize_domain_rejects_garbage() {
        assert_eq!(normalize_domain("Shop.Example.com").unwrap(), "shop.example.com");
        assert!(normalize_domain("").is_err());
        assert!(normalize_domain("bad_domain.com").is_err());
        assert!(normalize_domain("-lead.com").is_err());
        assert!(normalize_domain("a..b").is_err());
        assert!(normalize_domain("http://x.com").is_err());
    }

    #[tokio::test]
    async fn test_create_normalizes_and_rejects_duplicates() {
        let service = service().await;
        let tenant = service.create(input("Shop", "Shop.Example.com")).await.unwrap();
        assert_eq!(tenant.domain, "shop.example.com");
        assert!(tenant.is_active());

        assert!(matches!(
            service.create(input("Copy", "shop.example.com:443")).await,
            Err(TenantError::DuplicateDomain(_))
        ));
        assert!(matches!(service.create(input(" ", "x.com")).await, Err(TenantError::ValidationError(_))));
    }

    #[tokio::test]
    async fn test_suspend_is_visible_through_host_lookup() {
        let service = service().await;
        let tenant = service.create(input("Shop", "shop.test")).await.unwrap();
        assert!(service.resolve_host("SHOP.test:3000").await.unwrap().unwrap().is_active());

        let suspend = UpdateTenantInput {
            status: Some(TenantStatus::Suspended),
            ..UpdateTenantInput::default()
        };
        service.update(tenant.id, suspend).await.unwrap();
        let cached = service.resolve_host("shop.test").await.unwrap().unwrap();
        assert_eq!(cached.status, TenantStatus::Suspended);
    }

    #[tokio::test]
    async fn test_domain_move_and_delete() {
        let service = service().await;
        let tenant = service.create(input("Shop", "shop.test")).await.unwrap();
        service.resolve_host("shop.test").await.unwrap();

        let moved = UpdateTenantInput {
            domain: Some("store.test".into()),
            ..UpdateTenantInput::default()
        };
        service.update(tenant.id, moved).await.unwrap();
        assert!(service.resolve_host("shop.test").await.unwrap().is_none());
        assert_eq!(service.resolve_host("store.test").await.unwrap().unwrap().id, tenant.id);

        service.delete(tenant.id).await.unwrap();
        assert!(service.resolve_host("store.test").await.unwrap().is_none());
        assert!(matches!(service.get(tenant.id).await, Err(TenantError::NotFound(_))));
    }

    proptest! {
        #[test]
        fn prop_normalized_domain_is_stable(labels in prop::collection::vec("[a-zA-Z0-9]{1,10}", 1..5), port in 1u16..65535) {
            let domain = labels.join(".");
            let normalized = normalize_domain(&format!("{}:{}", domain, port)).unwrap();
            prop_assert_eq!(&normalized, &domain.to_lowercase());
            prop_assert_eq!(normalize_domain(&normalized).unwrap(), normalized);
        }
    }
}
