//! Login rate limiting
//!
//! Two sliding windows guard the sign-in endpoints: failed attempts per
//! account (5 per 15 minutes) and requests per client IP (10 per minute).
//! Account keys include the tenant scope, so the same email on two
//! tenants is limited separately.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::net::IpAddr;
use tokio::sync::RwLock;

const ACCOUNT_LIMIT: usize = 5;
const ACCOUNT_WINDOW_MINUTES: i64 = 15;
const IP_LIMIT: usize = 10;
const IP_WINDOW_MINUTES: i64 = 1;

/// Hits per key inside a moving time window
struct SlidingWindow<K> {
    limit: usize,
    period: Duration,
    hits: RwLock<HashMap<K, Vec<DateTime<Utc>>>>,
}

impl<K: std::hash::Hash + Eq + Clone> SlidingWindow<K> {
    fn new(limit: usize, period: Duration) -> Self {
        Self {
            limit,
            period,
            hits: RwLock::new(HashMap::new()),
        }
    }

    /// Seconds until the oldest hit leaves the window, if the key is over its limit
    async fn retry_after(&self, key: &K) -> Option<i64> {
        let now = Utc::now();
        let cutoff = now - self.period;
        let mut hits = self.hits.write().await;
        let entry = hits.get_mut(key)?;
        entry.retain(|t| *t > cutoff);
        if entry.len() < self.limit {
            return None;
        }
        let oldest = entry.iter().min().copied()?;
        Some((oldest + self.period - now).num_seconds().max(1))
    }

    async fn hit(&self, key: K) {
        self.hits.write().await.entry(key).or_default().push(Utc::now());
    }

    async fn reset(&self, key: &K) {
        self.hits.write().await.remove(key);
    }

    async fn cleanup(&self) -> usize {
        let cutoff = Utc::now() - self.period;
        let mut hits = self.hits.write().await;
        hits.retain(|_, times| {
            times.retain(|t| *t > cutoff);
            !times.is_empty()
        });
        hits.len()
    }
}

/// Refusal returned while a key is over its limit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimited {
    pub retry_after_secs: i64,
}

pub struct LoginRateLimiter {
    accounts: SlidingWindow<String>,
    ips: SlidingWindow<IpAddr>,
}

fn account_key(tenant_id: Option<i64>, email: &str) -> String {
    match tenant_id {
        Some(id) => format!("{}:{}", id, email.trim().to_lowercase()),
        None => format!("root:{}", email.trim().to_lowercase()),
    }
}

impl LoginRateLimiter {
    pub fn new() -> Self {
        Self {
            accounts: SlidingWindow::new(ACCOUNT_LIMIT, Duration::minutes(ACCOUNT_WINDOW_MINUTES)),
            ips: SlidingWindow::new(IP_LIMIT, Duration::minutes(IP_WINDOW_MINUTES)),
        }
    }

    /// Count a request from `ip` and refuse it if the IP is over its limit
    pub async fn check_ip(&self, ip: IpAddr) -> Result<(), RateLimited> {
        if let Some(retry_after_secs) = self.ips.retry_after(&ip).await {
            return Err(RateLimited { retry_after_secs });
        }
        self.ips.hit(ip).await;
        Ok(())
    }

    pub async fn check_account(&self, tenant_id: Option<i64>, email: &str) -> Result<(), RateLimited> {
        match self.accounts.retry_after(&account_key(tenant_id, email)).await {
            Some(retry_after_secs) => Err(RateLimited { retry_after_secs }),
            None => Ok(()),
        }
    }

    pub async fn record_failure(&self, tenant_id: Option<i64>, email: &str) {
        self.accounts.hit(account_key(tenant_id, email)).await;
    }

    /// Forget failures after a successful sign-in
    pub async fn clear_account(&self, tenant_id: Option<i64>, email: &str) {
        self.accounts.reset(&account_key(tenant_id, email)).await;
    }

    /// Drop expired hits; returns the number of keys still tracked
    pub async fn cleanup(&self) -> usize {
        self.accounts.cleanup().await + self.ips.cleanup().await
    }
}

impl Default for LoginRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_account_limit() {
        let limiter = LoginRateLimiter::new();
        for _ in 0..4 {
            limiter.record_failure(Some(1), "ann@x.test").await;
            assert!(limiter.check_account(Some(1), "ann@x.test").await.is_ok());
        }
        limiter.record_failure(Some(1), "ann@x.test").await;

        let refused = limiter.check_account(Some(1), "ANN@x.test").await.unwrap_err();
        assert!(refused.retry_after_secs > 0);
        assert!(refused.retry_after_secs <= 15 * 60);

        // Other scopes are unaffected
        assert!(limiter.check_account(Some(2), "ann@x.test").await.is_ok());
        assert!(limiter.check_account(None, "ann@x.test").await.is_ok());

        limiter.clear_account(Some(1), "ann@x.test").await;
        assert!(limiter.check_account(Some(1), "ann@x.test").await.is_ok());
    }

    #[tokio::test]
    async fn test_ip_limit() {
        let limiter = LoginRateLimiter::new();
        let ip: IpAddr = "10.0.0.7".parse().unwrap();
        for _ in 0..10 {
            assert!(limiter.check_ip(ip).await.is_ok());
        }
        assert!(limiter.check_ip(ip).await.is_err());

        let other: IpAddr = "10.0.0.8".parse().unwrap();
        assert!(limiter.check_ip(other).await.is_ok());
    }

    #[tokio::test]
    async fn test_cleanup_keeps_live_keys() {
        let limiter = LoginRateLimiter::new();
        limiter.record_failure(None, "root@x.test").await;
        limiter.check_ip("127.0.0.1".parse().unwrap()).await.unwrap();
        assert_eq!(limiter.cleanup().await, 2);
    }
}
