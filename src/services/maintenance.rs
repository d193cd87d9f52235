//! Platform maintenance
//!
//! Retention jobs run by the background scheduler and the platform
//! counters shown on the superadmin dashboard.

use crate::db::repositories::{AdminRepository, BlogPostRepository, PageRepository, RevisionRepository, TenantRepository};
use crate::models::RevisionKind;
use crate::services::revision::RevisionService;
use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

/// Platform-wide counters
#[derive(Debug, Clone, Serialize)]
pub struct PlatformStats {
    pub tenants: i64,
    pub admins: i64,
    pub pages: i64,
    pub posts: i64,
    pub page_revisions: i64,
    pub post_revisions: i64,
}

pub struct MaintenanceService {
    tenants: Arc<dyn TenantRepository>,
    admins: Arc<dyn AdminRepository>,
    pages: Arc<dyn PageRepository>,
    posts: Arc<dyn BlogPostRepository>,
    revision_repo: Arc<dyn RevisionRepository>,
    revisions: Arc<RevisionService>,
}

impl MaintenanceService {
    pub fn new(
        tenants: Arc<dyn TenantRepository>,
        admins: Arc<dyn AdminRepository>,
        pages: Arc<dyn PageRepository>,
        posts: Arc<dyn BlogPostRepository>,
        revision_repo: Arc<dyn RevisionRepository>,
        revisions: Arc<RevisionService>,
    ) -> Self {
        Self {
            tenants,
            admins,
            pages,
            posts,
            revision_repo,
            revisions,
        }
    }

    /// Permanently delete content trashed more than `retention_days` ago.
    ///
    /// Zero disables the job.
    pub async fn purge_expired_trash(&self, retention_days: u32) -> Result<u64> {
        if retention_days == 0 {
            return Ok(0);
        }
        let cutoff = Utc::now() - Duration::days(i64::from(retention_days));
        let mut purged = 0;

        for (tenant_id, id) in self.pages.trashed_before(cutoff).await.context("Failed to list expired pages")? {
            if self.pages.purge(tenant_id, id).await.context("Failed to purge page")? {
                purged += 1;
            }
        }
        for (tenant_id, id) in self.posts.trashed_before(cutoff).await.context("Failed to list expired posts")? {
            if self.posts.purge(tenant_id, id).await.context("Failed to purge post")? {
                purged += 1;
            }
        }

        if purged > 0 {
            info!(purged, retention_days, "Purged expired trash");
        }
        Ok(purged)
    }

    /// Delete non-current revisions older than `retention_days`; zero disables the job
    pub async fn purge_old_revisions(&self, retention_days: u32) -> Result<u64> {
        if retention_days == 0 {
            return Ok(0);
        }
        let mut removed = 0;
        for kind in [RevisionKind::Page, RevisionKind::BlogPost] {
            removed += self.revisions.purge_older_than(kind, retention_days).await?;
        }
        Ok(removed)
    }

    pub async fn stats(&self) -> Result<PlatformStats> {
        Ok(PlatformStats {
            tenants: self.tenants.count().await.context("Failed to count tenants")?,
            admins: self.admins.count().await.context("Failed to count admins")?,
            pages: self.pages.count(None).await.context("Failed to count pages")?,
            posts: self.posts.count(None).await.context("Failed to count posts")?,
            page_revisions: self
                .revision_repo
                .count(RevisionKind::Page, None)
                .await
                .context("Failed to count page revisions")?,
            post_revisions: self
                .revision_repo
                .count(RevisionKind::BlogPost, None)
                .await
                .context("Failed to count post revisions")?,
        })
    }
}
