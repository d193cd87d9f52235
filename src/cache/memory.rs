//! In-memory cache backed by moka
//!
//! Values are stored as JSON so one cache can hold any serializable type.
//! Each entry carries its own TTL, enforced through a moka `Expiry`.

use super::CacheLayer;
use anyhow::{Context, Result};
use async_trait::async_trait;
use moka::future::Cache;
use moka::Expiry;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

const DEFAULT_MAX_CAPACITY: u64 = 10_000;
const DEFAULT_TTL: Duration = Duration::from_secs(300);

#[derive(Clone)]
struct CacheEntry {
    json: Arc<String>,
    ttl: Duration,
}

struct EntryExpiry;

impl Expiry<String, CacheEntry> for EntryExpiry {
    fn expire_after_create(&self, _key: &String, value: &CacheEntry, _created_at: Instant) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &CacheEntry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

pub struct MemoryCache {
    cache: Cache<String, CacheEntry>,
    default_ttl: Duration,
}

impl std::fmt::Debug for MemoryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCache")
            .field("entry_count", &self.cache.entry_count())
            .field("default_ttl", &self.default_ttl)
            .finish()
    }
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::with_capacity_and_ttl(DEFAULT_MAX_CAPACITY, DEFAULT_TTL)
    }

    pub fn with_capacity_and_ttl(max_capacity: u64, default_ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .expire_after(EntryExpiry)
            .build();
        Self { cache, default_ttl }
    }

    /// TTL used by services that don't pick their own
    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Glob match supporting `*` (any run) and `?` (one character)
pub(crate) fn glob_matches(pattern: &str, key: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let key: Vec<char> = key.chars().collect();
    let (mut p, mut k) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while k < key.len() {
        match pattern.get(p) {
            Some('*') => {
                backtrack = Some((p, k));
                p += 1;
            }
            Some(&c) if c == '?' || c == key[k] => {
                p += 1;
                k += 1;
            }
            _ => match backtrack {
                Some((star, matched)) => {
                    p = star + 1;
                    k = matched + 1;
                    backtrack = Some((star, matched + 1));
                }
                None => return false,
            },
        }
    }
    pattern[p..].iter().all(|c| *c == '*')
}

#[async_trait]
impl CacheLayer for MemoryCache {
    async fn get<T: DeserializeOwned + Send>(&self, key: &str) -> Result<Option<T>> {
        match self.cache.get(key).await {
            Some(entry) => {
                let value = serde_json::from_str(&entry.json).context("Failed to deserialize cache value")?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    async fn set<T: Serialize + Send + Sync>(&self, key: &str, value: &T, ttl: Duration) -> Result<()> {
        let json = serde_json::to_string(value).context("Failed to serialize cache value")?;
        let entry = CacheEntry {
            json: Arc::new(json),
            ttl,
        };
        self.cache.insert(key.to_string(), entry).await;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.cache.invalidate(key).await;
        Ok(())
    }

    async fn delete_pattern(&self, pattern: &str) -> Result<()> {
        let doomed: Vec<String> = self
            .cache
            .iter()
            .filter(|(key, _)| glob_matches(pattern, key.as_str()))
            .map(|(key, _)| key.as_ref().clone())
            .collect();
        for key in doomed {
            self.cache.invalidate(&key).await;
        }
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde::Deserialize;

    #[tokio::test]
    async fn test_set_get_delete() {
        let cache = MemoryCache::new();
        cache.set("tenant:domain:a.test", &42i64, Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.get::<i64>("tenant:domain:a.test").await.unwrap(), Some(42));

        cache.delete("tenant:domain:a.test").await.unwrap();
        assert_eq!(cache.get::<i64>("tenant:domain:a.test").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_entry_expires_after_its_own_ttl() {
        let cache = MemoryCache::with_capacity_and_ttl(100, Duration::from_secs(3600));
        cache.set("short", &"x".to_string(), Duration::from_millis(20)).await.unwrap();
        cache.set("long", &"y".to_string(), Duration::from_secs(60)).await.unwrap();

        tokio::time::sleep(Duration::from_millis(80)).await;
        cache.cache.run_pending_tasks().await;

        assert_eq!(cache.get::<String>("short").await.unwrap(), None);
        assert_eq!(cache.get::<String>("long").await.unwrap(), Some("y".to_string()));
    }

    #[tokio::test]
    async fn test_delete_pattern_is_scoped() {
        let cache = MemoryCache::new();
        let ttl = Duration::from_secs(60);
        cache.set("t:1:page:about", &1, ttl).await.unwrap();
        cache.set("t:1:post:hello", &2, ttl).await.unwrap();
        cache.set("t:2:page:about", &3, ttl).await.unwrap();

        cache.delete_pattern("t:1:*").await.unwrap();

        assert_eq!(cache.get::<i32>("t:1:page:about").await.unwrap(), None);
        assert_eq!(cache.get::<i32>("t:1:post:hello").await.unwrap(), None);
        assert_eq!(cache.get::<i32>("t:2:page:about").await.unwrap(), Some(3));
    }

    #[tokio::test]
    async fn test_structured_values() {
        #[derive(Debug, PartialEq, Serialize, Deserialize)]
        struct Site {
            name: String,
            pages: Vec<String>,
        }
        let cache = MemoryCache::new();
        let site = Site {
            name: "Acme".into(),
            pages: vec!["about".into()],
        };
        cache.set("site", &site, Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.get::<Site>("site").await.unwrap(), Some(site));
    }

    #[test]
    fn test_glob_matches() {
        assert!(glob_matches("t:1:*", "t:1:page:about"));
        assert!(glob_matches("t:?:page:*", "t:7:page:x"));
        assert!(glob_matches("*", ""));
        assert!(glob_matches("a*b*c", "aXXbYYc"));
        assert!(!glob_matches("t:1:*", "t:10"));
        assert!(!glob_matches("t:?", "t:12"));
        assert!(!glob_matches("abc", "ab"));
    }

    proptest! {
        #[test]
        fn prop_prefix_star_matches_prefix(prefix in "[a-z:]{0,8}", rest in "[a-z0-9:]{0,12}") {
            let key = format!("{}{}", prefix, rest);
            let pattern = format!("{}*", prefix);
            prop_assert!(glob_matches(&pattern, &key));
        }

        #[test]
        fn prop_literal_matches_only_itself(a in "[a-z]{1,10}", b in "[a-z]{1,10}") {
            prop_assert_eq!(glob_matches(&a, &b), a == b);
        }
    }
}
