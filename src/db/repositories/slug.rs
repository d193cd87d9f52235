//! Slug registry repository
//!
//! The `slugs` table is the authority on which page or post owns a URL
//! segment within a tenant. Page, post and revision writes claim slugs
//! through the connection-level helpers below so the claim commits or
//! rolls back together with the content row.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::SlugModule;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlConnection, Row, SqliteConnection};
use std::sync::Arc;

/// Returned when a slug is owned by another reference
#[derive(Debug, thiserror::Error)]
#[error("Slug '{slug}' is already in use in {module}")]
pub struct SlugTaken {
    pub module: SlugModule,
    pub slug: String,
}

#[async_trait]
pub trait SlugRepository: Send + Sync {
    /// Reference id owning `slug`, if any
    async fn resolve(&self, tenant_id: i64, module: SlugModule, slug: &str) -> Result<Option<i64>>;

    /// Whether `slug` is free or already owned by `reference_id`
    async fn is_available(
        &self,
        tenant_id: i64,
        module: SlugModule,
        slug: &str,
        reference_id: Option<i64>,
    ) -> Result<bool>;

    /// Point `reference_id` at `slug`, failing with [`SlugTaken`] on conflict
    async fn claim(&self, tenant_id: i64, module: SlugModule, reference_id: i64, slug: &str) -> Result<()>;

    async fn release(&self, tenant_id: i64, module: SlugModule, reference_id: i64) -> Result<()>;
}

pub struct SqlxSlugRepository {
    pool: DynDatabasePool,
}

impl SqlxSlugRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn SlugRepository> {
        Arc::new(Self::new(pool))
    }
}

const SELECT_OWNER: &str = "SELECT reference_id FROM slugs WHERE tenant_id = ? AND module = ? AND slug = ?";

#[async_trait]
impl SlugRepository for SqlxSlugRepository {
    async fn resolve(&self, tenant_id: i64, module: SlugModule, slug: &str) -> Result<Option<i64>> {
        let row = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(SELECT_OWNER)
                .bind(tenant_id)
                .bind(module.as_str())
                .bind(slug)
                .fetch_optional(self.pool.sqlite()?)
                .await
                .context("Failed to resolve slug")?
                .map(|r| r.get::<i64, _>("reference_id")),
            DatabaseDriver::Mysql => sqlx::query(SELECT_OWNER)
                .bind(tenant_id)
                .bind(module.as_str())
                .bind(slug)
                .fetch_optional(self.pool.mysql()?)
                .await
                .context("Failed to resolve slug")?
                .map(|r| r.get::<i64, _>("reference_id")),
        };
        Ok(row)
    }

    async fn is_available(
        &self,
        tenant_id: i64,
        module: SlugModule,
        slug: &str,
        reference_id: Option<i64>,
    ) -> Result<bool> {
        let owner = self.resolve(tenant_id, module, slug).await?;
        Ok(match owner {
            None => true,
            Some(owner) => Some(owner) == reference_id,
        })
    }

    async fn claim(&self, tenant_id: i64, module: SlugModule, reference_id: i64, slug: &str) -> Result<()> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let mut tx = self.pool.sqlite()?.begin().await?;
                claim_sqlite(&mut tx, tenant_id, module, reference_id, slug).await?;
                tx.commit().await?;
            }
            DatabaseDriver::Mysql => {
                let mut tx = self.pool.mysql()?.begin().await?;
                claim_mysql(&mut tx, tenant_id, module, reference_id, slug).await?;
                tx.commit().await?;
            }
        }
        Ok(())
    }

    async fn release(&self, tenant_id: i64, module: SlugModule, reference_id: i64) -> Result<()> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let mut conn = self.pool.sqlite()?.acquire().await?;
                release_sqlite(&mut conn, tenant_id, module, reference_id).await
            }
            DatabaseDriver::Mysql => {
                let mut conn = self.pool.mysql()?.acquire().await?;
                release_mysql(&mut conn, tenant_id, module, reference_id).await
            }
        }
    }
}

pub(crate) async fn claim_sqlite(
    conn: &mut SqliteConnection,
    tenant_id: i64,
    module: SlugModule,
    reference_id: i64,
    slug: &str,
) -> Result<()> {
    let owner: Option<i64> = sqlx::query(SELECT_OWNER)
        .bind(tenant_id)
        .bind(module.as_str())
        .bind(slug)
        .fetch_optional(&mut *conn)
        .await
        .context("Failed to look up slug owner")?
        .map(|r| r.get("reference_id"));

    match owner {
        Some(owner) if owner == reference_id => return Ok(()),
        Some(_) => {
            return Err(SlugTaken {
                module,
                slug: slug.to_string(),
            }
            .into())
        }
        None => {}
    }

    release_sqlite(conn, tenant_id, module, reference_id).await?;
    sqlx::query("INSERT INTO slugs (tenant_id, module, reference_id, slug, created_at) VALUES (?, ?, ?, ?, ?)")
        .bind(tenant_id)
        .bind(module.as_str())
        .bind(reference_id)
        .bind(slug)
        .bind(Utc::now())
        .execute(&mut *conn)
        .await
        .context("Failed to claim slug")?;
    Ok(())
}

pub(crate) async fn release_sqlite(
    conn: &mut SqliteConnection,
    tenant_id: i64,
    module: SlugModule,
    reference_id: i64,
) -> Result<()> {
    sqlx::query("DELETE FROM slugs WHERE tenant_id = ? AND module = ? AND reference_id = ?")
        .bind(tenant_id)
        .bind(module.as_str())
        .bind(reference_id)
        .execute(&mut *conn)
        .await
        .context("Failed to release slug")?;
    Ok(())
}

pub(crate) async fn claim_mysql(
    conn: &mut MySqlConnection,
    tenant_id: i64,
    module: SlugModule,
    reference_id: i64,
    slug: &str,
) -> Result<()> {
    let owner: Option<i64> = sqlx::query(&format!("{} FOR UPDATE", SELECT_OWNER))
        .bind(tenant_id)
        .bind(module.as_str())
        .bind(slug)
        .fetch_optional(&mut *conn)
        .await
        .context("Failed to look up slug owner")?
        .map(|r| r.get("reference_id"));

    match owner {
        Some(owner) if owner == reference_id => return Ok(()),
        Some(_) => {
            return Err(SlugTaken {
                module,
                slug: slug.to_string(),
            }
            .into())
        }
        None => {}
    }

    release_mysql(conn, tenant_id, module, reference_id).await?;
    sqlx::query("INSERT INTO slugs (tenant_id, module, reference_id, slug, created_at) VALUES (?, ?, ?, ?, ?)")
        .bind(tenant_id)
        .bind(module.as_str())
        .bind(reference_id)
        .bind(slug)
        .bind(Utc::now())
        .execute(&mut *conn)
        .await
        .context("Failed to claim slug")?;
    Ok(())
}

pub(crate) async fn release_mysql(
    conn: &mut MySqlConnection,
    tenant_id: i64,
    module: SlugModule,
    reference_id: i64,
) -> Result<()> {
    sqlx::query("DELETE FROM slugs WHERE tenant_id = ? AND module = ? AND reference_id = ?")
        .bind(tenant_id)
        .bind(module.as_str())
        .bind(reference_id)
        .execute(&mut *conn)
        .await
        .context("Failed to release slug")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::{insert_tenant, setup_pool};

    #[tokio::test]
    async fn test_claim_and_resolve() {
        let pool = setup_pool().await;
        let tenant = insert_tenant(&pool, "a.test").await;
        let repo = SqlxSlugRepository::new(pool);

        repo.claim(tenant, SlugModule::Pages, 10, "about").await.unwrap();
        assert_eq!(repo.resolve(tenant, SlugModule::Pages, "about").await.unwrap(), Some(10));
        assert_eq!(repo.resolve(tenant, SlugModule::Blog, "about").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_claim_conflict_is_typed() {
        let pool = setup_pool().await;
        let tenant = insert_tenant(&pool, "a.test").await;
        let repo = SqlxSlugRepository::new(pool);

        repo.claim(tenant, SlugModule::Blog, 1, "hello").await.unwrap();
        let err = repo.claim(tenant, SlugModule::Blog, 2, "hello").await.unwrap_err();
        assert!(err.downcast_ref::<SlugTaken>().is_some());

        // Re-claiming its own slug is a no-op
        repo.claim(tenant, SlugModule::Blog, 1, "hello").await.unwrap();
    }

    #[tokio::test]
    async fn test_claim_moves_reference_slug() {
        let pool = setup_pool().await;
        let tenant = insert_tenant(&pool, "a.test").await;
        let repo = SqlxSlugRepository::new(pool);

        repo.claim(tenant, SlugModule::Pages, 1, "old").await.unwrap();
        repo.claim(tenant, SlugModule::Pages, 1, "new").await.unwrap();

        assert_eq!(repo.resolve(tenant, SlugModule::Pages, "old").await.unwrap(), None);
        assert!(repo.is_available(tenant, SlugModule::Pages, "old", Some(2)).await.unwrap());
        assert!(repo.is_available(tenant, SlugModule::Pages, "new", Some(1)).await.unwrap());
        assert!(!repo.is_available(tenant, SlugModule::Pages, "new", None).await.unwrap());

        repo.release(tenant, SlugModule::Pages, 1).await.unwrap();
        assert_eq!(repo.resolve(tenant, SlugModule::Pages, "new").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_slugs_are_tenant_scoped() {
        let pool = setup_pool().await;
        let t1 = insert_tenant(&pool, "a.test").await;
        let t2 = insert_tenant(&pool, "b.test").await;
        let repo = SqlxSlugRepository::new(pool);

        repo.claim(t1, SlugModule::Pages, 1, "about").await.unwrap();
        repo.claim(t2, SlugModule::Pages, 2, "about").await.unwrap();
        assert_eq!(repo.resolve(t2, SlugModule::Pages, "about").await.unwrap(), Some(2));
    }
}
