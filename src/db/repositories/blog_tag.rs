//! Blog tag repository

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{BlogTag, TagWithCount};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;
use std::sync::Arc;

#[async_trait]
pub trait BlogTagRepository: Send + Sync {
    async fn create(&self, tag: &BlogTag) -> Result<BlogTag>;
    async fn get_by_id(&self, tenant_id: i64, id: i64) -> Result<Option<BlogTag>>;
    async fn get_by_slug(&self, tenant_id: i64, slug: &str) -> Result<Option<BlogTag>>;
    /// Tags with post counts; `published_only` counts live published posts only
    async fn list_with_counts(&self, tenant_id: i64, published_only: bool) -> Result<Vec<TagWithCount>>;
    async fn update(&self, tag: &BlogTag) -> Result<BlogTag>;
    async fn delete(&self, tenant_id: i64, id: i64) -> Result<bool>;
}

pub struct SqlxBlogTagRepository {
    pool: DynDatabasePool,
}

impl SqlxBlogTagRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn BlogTagRepository> {
        Arc::new(Self::new(pool))
    }
}

const LIST_WITH_COUNTS: &str = r#"
    SELECT t.id, t.tenant_id, t.name, t.slug, t.created_at, COUNT(p.id) AS post_count
    FROM blog_tags t
    LEFT JOIN blog_post_tags pt ON pt.tag_id = t.id
    LEFT JOIN blog_posts p ON p.id = pt.post_id AND p.deleted_at IS NULL
        AND (? = 0 OR p.status = 'published')
    WHERE t.tenant_id = ?
    GROUP BY t.id, t.tenant_id, t.name, t.slug, t.created_at
    ORDER BY t.name, t.id
"#;

#[async_trait]
impl BlogTagRepository for SqlxBlogTagRepository {
    async fn create(&self, tag: &BlogTag) -> Result<BlogTag> {
        let sql = "INSERT INTO blog_tags (tenant_id, name, slug, created_at) VALUES (?, ?, ?, ?)";
        let now = Utc::now();
        let id = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(tag.tenant_id)
                .bind(&tag.name)
                .bind(&tag.slug)
                .bind(now)
                .execute(self.pool.sqlite()?)
                .await
                .context("Failed to create tag")?
                .last_insert_rowid(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(tag.tenant_id)
                .bind(&tag.name)
                .bind(&tag.slug)
                .bind(now)
                .execute(self.pool.mysql()?)
                .await
                .context("Failed to create tag")?
                .last_insert_id() as i64,
        };
        Ok(BlogTag {
            id,
            created_at: now,
            ..tag.clone()
        })
    }

    async fn get_by_id(&self, tenant_id: i64, id: i64) -> Result<Option<BlogTag>> {
        let sql = "SELECT id, tenant_id, name, slug, created_at FROM blog_tags WHERE id = ? AND tenant_id = ?";
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let row = sqlx::query(sql)
                    .bind(id)
                    .bind(tenant_id)
                    .fetch_optional(self.pool.sqlite()?)
                    .await
                    .context("Failed to get tag")?;
                Ok(row.map(|r| row_to_tag_sqlite(&r)))
            }
            DatabaseDriver::Mysql => {
                let row = sqlx::query(sql)
                    .bind(id)
                    .bind(tenant_id)
                    .fetch_optional(self.pool.mysql()?)
                    .await
                    .context("Failed to get tag")?;
                Ok(row.map(|r| row_to_tag_mysql(&r)))
            }
        }
    }

    async fn get_by_slug(&self, tenant_id: i64, slug: &str) -> Result<Option<BlogTag>> {
        let sql = "SELECT id, tenant_id, name, slug, created_at FROM blog_tags WHERE tenant_id = ? AND slug = ?";
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let row = sqlx::query(sql)
                    .bind(tenant_id)
                    .bind(slug)
                    .fetch_optional(self.pool.sqlite()?)
                    .await
                    .context("Failed to get tag by slug")?;
                Ok(row.map(|r| row_to_tag_sqlite(&r)))
            }
            DatabaseDriver::Mysql => {
                let row = sqlx::query(sql)
                    .bind(tenant_id)
                    .bind(slug)
                    .fetch_optional(self.pool.mysql()?)
                    .await
                    .context("Failed to get tag by slug")?;
                Ok(row.map(|r| row_to_tag_mysql(&r)))
            }
        }
    }

    async fn list_with_counts(&self, tenant_id: i64, published_only: bool) -> Result<Vec<TagWithCount>> {
        let published_only = published_only as i32;
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let rows = sqlx::query(LIST_WITH_COUNTS)
                    .bind(published_only)
                    .bind(tenant_id)
                    .fetch_all(self.pool.sqlite()?)
                    .await
                    .context("Failed to list tags")?;
                Ok(rows
                    .iter()
                    .map(|r| TagWithCount {
                        tag: row_to_tag_sqlite(r),
                        post_count: r.get("post_count"),
                    })
                    .collect())
            }
            DatabaseDriver::Mysql => {
                let rows = sqlx::query(LIST_WITH_COUNTS)
                    .bind(published_only)
                    .bind(tenant_id)
                    .fetch_all(self.pool.mysql()?)
                    .await
                    .context("Failed to list tags")?;
                Ok(rows
                    .iter()
                    .map(|r| TagWithCount {
                        tag: row_to_tag_mysql(r),
                        post_count: r.get("post_count"),
                    })
                    .collect())
            }
        }
    }

    async fn update(&self, tag: &BlogTag) -> Result<BlogTag> {
        let sql = "UPDATE blog_tags SET name = ?, slug = ? WHERE id = ? AND tenant_id = ?";
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query(sql)
                    .bind(&tag.name)
                    .bind(&tag.slug)
                    .bind(tag.id)
                    .bind(tag.tenant_id)
                    .execute(self.pool.sqlite()?)
                    .await
                    .context("Failed to update tag")?;
            }
            DatabaseDriver::Mysql => {
                sqlx::query(sql)
                    .bind(&tag.name)
                    .bind(&tag.slug)
                    .bind(tag.id)
                    .bind(tag.tenant_id)
                    .execute(self.pool.mysql()?)
                    .await
                    .context("Failed to update tag")?;
            }
        }
        self.get_by_id(tag.tenant_id, tag.id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Tag not found after update"))
    }

    async fn delete(&self, tenant_id: i64, id: i64) -> Result<bool> {
        let sql = "DELETE FROM blog_tags WHERE id = ? AND tenant_id = ?";
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(id)
                .bind(tenant_id)
                .execute(self.pool.sqlite()?)
                .await
                .context("Failed to delete tag")?
                .rows_affected(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(id)
                .bind(tenant_id)
                .execute(self.pool.mysql()?)
                .await
                .context("Failed to delete tag")?
                .rows_affected(),
        };
        Ok(affected > 0)
    }
}

fn row_to_tag_sqlite(row: &sqlx::sqlite::SqliteRow) -> BlogTag {
    BlogTag {
        id: row.get("id"),
        tenant_id: row.get("tenant_id"),
        name: row.get("name"),
        slug: row.get("slug"),
        created_at: row.get("created_at"),
    }
}

fn row_to_tag_mysql(row: &sqlx::mysql::MySqlRow) -> BlogTag {
    BlogTag {
        id: row.get("id"),
        tenant_id: row.get("tenant_id"),
        name: row.get("name"),
        slug: row.get("slug"),
        created_at: row.get("created_at"),
    }
}
