//! Blog category repository

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::BlogCategory;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;
use std::sync::Arc;

const CATEGORY_COLUMNS: &str =
    "id, tenant_id, parent_id, name, slug, description, sort_order, created_at, updated_at";

#[async_trait]
pub trait BlogCategoryRepository: Send + Sync {
    async fn create(&self, category: &BlogCategory) -> Result<BlogCategory>;
    async fn get_by_id(&self, tenant_id: i64, id: i64) -> Result<Option<BlogCategory>>;
    async fn get_by_slug(&self, tenant_id: i64, slug: &str) -> Result<Option<BlogCategory>>;
    /// All categories of a tenant ordered by `sort_order`, then name
    async fn list(&self, tenant_id: i64) -> Result<Vec<BlogCategory>>;
    async fn update(&self, category: &BlogCategory) -> Result<BlogCategory>;
    /// Delete a category, moving its children up to its parent
    async fn delete(&self, tenant_id: i64, id: i64) -> Result<bool>;
    async fn exists_by_slug(&self, tenant_id: i64, slug: &str, exclude_id: Option<i64>) -> Result<bool>;
}

pub struct SqlxBlogCategoryRepository {
    pool: DynDatabasePool,
}

impl SqlxBlogCategoryRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn BlogCategoryRepository> {
        Arc::new(Self::new(pool))
    }
}

const INSERT_CATEGORY: &str = r#"
    INSERT INTO blog_categories (tenant_id, parent_id, name, slug, description, sort_order, created_at, updated_at)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?)
"#;

const UPDATE_CATEGORY: &str = r#"
    UPDATE blog_categories SET parent_id = ?, name = ?, slug = ?, description = ?, sort_order = ?, updated_at = ?
    WHERE id = ? AND tenant_id = ?
"#;

#[async_trait]
impl BlogCategoryRepository for SqlxBlogCategoryRepository {
    async fn create(&self, category: &BlogCategory) -> Result<BlogCategory> {
        let now = Utc::now();
        let id = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(INSERT_CATEGORY)
                .bind(category.tenant_id)
                .bind(category.parent_id)
                .bind(&category.name)
                .bind(&category.slug)
                .bind(&category.description)
                .bind(category.sort_order)
                .bind(now)
                .bind(now)
                .execute(self.pool.sqlite()?)
                .await
                .context("Failed to create category")?
                .last_insert_rowid(),
            DatabaseDriver::Mysql => sqlx::query(INSERT_CATEGORY)
                .bind(category.tenant_id)
                .bind(category.parent_id)
                .bind(&category.name)
                .bind(&category.slug)
                .bind(&category.description)
                .bind(category.sort_order)
                .bind(now)
                .bind(now)
                .execute(self.pool.mysql()?)
                .await
                .context("Failed to create category")?
                .last_insert_id() as i64,
        };
        Ok(BlogCategory {
            id,
            created_at: now,
            updated_at: now,
            ..category.clone()
        })
    }

    async fn get_by_id(&self, tenant_id: i64, id: i64) -> Result<Option<BlogCategory>> {
        let sql = format!(
            "SELECT {} FROM blog_categories WHERE id = ? AND tenant_id = ?",
            CATEGORY_COLUMNS
        );
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let row = sqlx::query(&sql)
                    .bind(id)
                    .bind(tenant_id)
                    .fetch_optional(self.pool.sqlite()?)
                    .await
                    .context("Failed to get category")?;
                Ok(row.map(|r| row_to_category_sqlite(&r)))
            }
            DatabaseDriver::Mysql => {
                let row = sqlx::query(&sql)
                    .bind(id)
                    .bind(tenant_id)
                    .fetch_optional(self.pool.mysql()?)
                    .await
                    .context("Failed to get category")?;
                Ok(row.map(|r| row_to_category_mysql(&r)))
            }
        }
    }

    async fn get_by_slug(&self, tenant_id: i64, slug: &str) -> Result<Option<BlogCategory>> {
        let sql = format!(
            "SELECT {} FROM blog_categories WHERE tenant_id = ? AND slug = ?",
            CATEGORY_COLUMNS
        );
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let row = sqlx::query(&sql)
                    .bind(tenant_id)
                    .bind(slug)
                    .fetch_optional(self.pool.sqlite()?)
                    .await
                    .context("Failed to get category by slug")?;
                Ok(row.map(|r| row_to_category_sqlite(&r)))
            }
            DatabaseDriver::Mysql => {
                let row = sqlx::query(&sql)
                    .bind(tenant_id)
                    .bind(slug)
                    .fetch_optional(self.pool.mysql()?)
                    .await
                    .context("Failed to get category by slug")?;
                Ok(row.map(|r| row_to_category_mysql(&r)))
            }
        }
    }

    async fn list(&self, tenant_id: i64) -> Result<Vec<BlogCategory>> {
        let sql = format!(
            "SELECT {} FROM blog_categories WHERE tenant_id = ? ORDER BY sort_order, name, id",
            CATEGORY_COLUMNS
        );
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let rows = sqlx::query(&sql)
                    .bind(tenant_id)
                    .fetch_all(self.pool.sqlite()?)
                    .await
                    .context("Failed to list categories")?;
                Ok(rows.iter().map(row_to_category_sqlite).collect())
            }
            DatabaseDriver::Mysql => {
                let rows = sqlx::query(&sql)
                    .bind(tenant_id)
                    .fetch_all(self.pool.mysql()?)
                    .await
                    .context("Failed to list categories")?;
                Ok(rows.iter().map(row_to_category_mysql).collect())
            }
        }
    }

    async fn update(&self, category: &BlogCategory) -> Result<BlogCategory> {
        let now = Utc::now();
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query(UPDATE_CATEGORY)
                    .bind(category.parent_id)
                    .bind(&category.name)
                    .bind(&category.slug)
                    .bind(&category.description)
                    .bind(category.sort_order)
                    .bind(now)
                    .bind(category.id)
                    .bind(category.tenant_id)
                    .execute(self.pool.sqlite()?)
                    .await
                    .context("Failed to update category")?;
            }
            DatabaseDriver::Mysql => {
                sqlx::query(UPDATE_CATEGORY)
                    .bind(category.parent_id)
                    .bind(&category.name)
                    .bind(&category.slug)
                    .bind(&category.description)
                    .bind(category.sort_order)
                    .bind(now)
                    .bind(category.id)
                    .bind(category.tenant_id)
                    .execute(self.pool.mysql()?)
                    .await
                    .context("Failed to update category")?;
            }
        }
        self.get_by_id(category.tenant_id, category.id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Category not found after update"))
    }

    async fn delete(&self, tenant_id: i64, id: i64) -> Result<bool> {
        let Some(category) = self.get_by_id(tenant_id, id).await? else {
            return Ok(false);
        };
        let reparent = "UPDATE blog_categories SET parent_id = ? WHERE parent_id = ? AND tenant_id = ?";
        let delete = "DELETE FROM blog_categories WHERE id = ? AND tenant_id = ?";

        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let mut tx = self.pool.sqlite()?.begin().await?;
                sqlx::query(reparent)
                    .bind(category.parent_id)
                    .bind(id)
                    .bind(tenant_id)
                    .execute(&mut *tx)
                    .await
                    .context("Failed to re-parent child categories")?;
                let affected = sqlx::query(delete)
                    .bind(id)
                    .bind(tenant_id)
                    .execute(&mut *tx)
                    .await
                    .context("Failed to delete category")?
                    .rows_affected();
                tx.commit().await?;
                affected
            }
            DatabaseDriver::Mysql => {
                let mut tx = self.pool.mysql()?.begin().await?;
                sqlx::query(reparent)
                    .bind(category.parent_id)
                    .bind(id)
                    .bind(tenant_id)
                    .execute(&mut *tx)
                    .await
                    .context("Failed to re-parent child categories")?;
                let affected = sqlx::query(delete)
                    .bind(id)
                    .bind(tenant_id)
                    .execute(&mut *tx)
                    .await
                    .context("Failed to delete category")?
                    .rows_affected();
                tx.commit().await?;
                affected
            }
        };
        Ok(affected > 0)
    }

    async fn exists_by_slug(&self, tenant_id: i64, slug: &str, exclude_id: Option<i64>) -> Result<bool> {
        let sql = "SELECT COUNT(*) AS count FROM blog_categories WHERE tenant_id = ? AND slug = ? AND id != ?";
        let count: i64 = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(tenant_id)
                .bind(slug)
                .bind(exclude_id.unwrap_or(0))
                .fetch_one(self.pool.sqlite()?)
                .await
                .context("Failed to check category slug")?
                .get("count"),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(tenant_id)
                .bind(slug)
                .bind(exclude_id.unwrap_or(0))
                .fetch_one(self.pool.mysql()?)
                .await
                .context("Failed to check category slug")?
                .get("count"),
        };
        Ok(count > 0)
    }
}

fn row_to_category_sqlite(row: &sqlx::sqlite::SqliteRow) -> BlogCategory {
    BlogCategory {
        id: row.get("id"),
        tenant_id: row.get("tenant_id"),
        parent_id: row.get("parent_id"),
        name: row.get("name"),
        slug: row.get("slug"),
        description: row.get("description"),
        sort_order: row.get("sort_order"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn row_to_category_mysql(row: &sqlx::mysql::MySqlRow) -> BlogCategory {
    BlogCategory {
        id: row.get("id"),
        tenant_id: row.get("tenant_id"),
        parent_id: row.get("parent_id"),
        name: row.get("name"),
        slug: row.get("slug"),
        description: row.get("description"),
        sort_order: row.get("sort_order"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::{insert_tenant, setup_pool};

    #[tokio::test]
    async fn test_create_and_list_ordered() {
        let pool = setup_pool().await;
        let tenant = insert_tenant(&pool, "a.test").await;
        let repo = SqlxBlogCategoryRepository::new(pool);

        let mut news = BlogCategory::new(tenant, "News".into(), "news".into());
        news.sort_order = 2;
        repo.create(&news).await.unwrap();
        repo.create(&BlogCategory::new(tenant, "Guides".into(), "guides".into())).await.unwrap();

        let names: Vec<String> = repo.list(tenant).await.unwrap().into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["Guides", "News"]);
        assert!(repo.exists_by_slug(tenant, "news", None).await.unwrap());
        assert!(repo.get_by_slug(tenant, "guides").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_delete_reparents_children() {
        let pool = setup_pool().await;
        let tenant = insert_tenant(&pool, "a.test").await;
        let repo = SqlxBlogCategoryRepository::new(pool);

        let root = repo.create(&BlogCategory::new(tenant, "Root".into(), "root".into())).await.unwrap();
        let mut mid = BlogCategory::new(tenant, "Mid".into(), "mid".into());
        mid.parent_id = Some(root.id);
        let mid = repo.create(&mid).await.unwrap();
        let mut leaf = BlogCategory::new(tenant, "Leaf".into(), "leaf".into());
        leaf.parent_id = Some(mid.id);
        let leaf = repo.create(&leaf).await.unwrap();

        assert!(repo.delete(tenant, mid.id).await.unwrap());
        let leaf = repo.get_by_id(tenant, leaf.id).await.unwrap().unwrap();
        assert_eq!(leaf.parent_id, Some(root.id));
    }

    #[tokio::test]
    async fn test_other_tenant_cannot_delete() {
        let pool = setup_pool().await;
        let t1 = insert_tenant(&pool, "a.test").await;
        let t2 = insert_tenant(&pool, "b.test").await;
        let repo = SqlxBlogCategoryRepository::new(pool);

        let cat = repo.create(&BlogCategory::new(t1, "News".into(), "news".into())).await.unwrap();
        assert!(!repo.delete(t2, cat.id).await.unwrap());
        assert!(repo.get_by_id(t1, cat.id).await.unwrap().is_some());
    }
}
