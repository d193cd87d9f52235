//! Cache layer
//!
//! Public lookups (tenant by domain, published pages and posts, site
//! summaries) are cached in process with moka. Keys are prefixed with the
//! tenant id so a whole tenant can be invalidated with one pattern.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::config::CacheConfig;

pub use memory::MemoryCache;

/// Cache operations.
///
/// Generic methods keep the trait from being object safe; services hold
/// `Arc<Cache>` instead of a trait object.
#[async_trait]
pub trait CacheLayer: Send + Sync {
    async fn get<T: DeserializeOwned + Send>(&self, key: &str) -> Result<Option<T>>;

    async fn set<T: Serialize + Send + Sync>(&self, key: &str, value: &T, ttl: Duration) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;

    /// Delete every key matching a glob pattern (`*` and `?`)
    async fn delete_pattern(&self, pattern: &str) -> Result<()>;

    async fn clear(&self) -> Result<()>;
}

pub type Cache = MemoryCache;

/// Key prefix for everything cached on behalf of a tenant
pub fn tenant_prefix(tenant_id: i64) -> String {
    format!("t:{}:", tenant_id)
}

pub fn create_cache(config: &CacheConfig) -> Arc<Cache> {
    Arc::new(MemoryCache::with_capacity_and_ttl(
        config.max_capacity,
        Duration::from_secs(config.ttl_seconds),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_cache_from_config() {
        let config = CacheConfig {
            ttl_seconds: 120,
            max_capacity: 100,
        };
        let cache = create_cache(&config);
        assert_eq!(cache.default_ttl(), Duration::from_secs(120));

        cache.set("k", &"v".to_string(), cache.default_ttl()).await.unwrap();
        assert_eq!(cache.get::<String>("k").await.unwrap(), Some("v".to_string()));
    }

    #[tokio::test]
    async fn test_tenant_prefix_invalidation() {
        let cache = create_cache(&CacheConfig::default());
        let ttl = Duration::from_secs(60);
        cache.set(&format!("{}page:about", tenant_prefix(1)), &1, ttl).await.unwrap();
        cache.set(&format!("{}page:about", tenant_prefix(11)), &2, ttl).await.unwrap();

        cache.delete_pattern(&format!("{}*", tenant_prefix(1))).await.unwrap();

        assert_eq!(cache.get::<i32>("t:1:page:about").await.unwrap(), None);
        assert_eq!(cache.get::<i32>("t:11:page:about").await.unwrap(), Some(2));
    }
}
