//! Page repository
//!
//! Every query is scoped by `tenant_id`. Writes that change the slug claim
//! it in the `slugs` registry inside the same transaction.

use super::slug::{claim_mysql, claim_sqlite, release_mysql, release_sqlite};
use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{ContentFilter, ContentStatus, ListParams, Page, SlugModule};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{MySqlConnection, Row, SqliteConnection};
use std::sync::Arc;

const PAGE_COLUMNS: &str = "id, tenant_id, title, slug, content, excerpt, status, template, seo_title, \
     seo_description, author_id, current_revision_id, published_at, deleted_at, deleted_by, created_at, updated_at";

#[async_trait]
pub trait PageRepository: Send + Sync {
    /// Insert a page and claim its slug
    async fn create(&self, page: &Page) -> Result<Page>;
    /// Load a page, trashed or not
    async fn get_by_id(&self, tenant_id: i64, id: i64) -> Result<Option<Page>>;
    async fn get_published_by_slug(&self, tenant_id: i64, slug: &str) -> Result<Option<Page>>;
    async fn list(&self, tenant_id: i64, filter: &ContentFilter, params: &ListParams) -> Result<(Vec<Page>, i64)>;
    async fn list_published(&self, tenant_id: i64, params: &ListParams) -> Result<(Vec<Page>, i64)>;
    /// Write the editable columns and move the slug claim
    async fn update(&self, page: &Page) -> Result<Page>;
    async fn trash(&self, tenant_id: i64, id: i64, deleted_by: Option<i64>) -> Result<bool>;
    async fn restore_from_trash(&self, tenant_id: i64, id: i64) -> Result<bool>;
    /// Delete a page for good; revisions go with it
    async fn purge(&self, tenant_id: i64, id: i64) -> Result<bool>;
    async fn trashed_ids(&self, tenant_id: i64) -> Result<Vec<i64>>;
    /// `(tenant_id, id)` of pages trashed before `cutoff`, across tenants
    async fn trashed_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<(i64, i64)>>;
    async fn count(&self, tenant_id: Option<i64>) -> Result<i64>;
}

pub struct SqlxPageRepository {
    pool: DynDatabasePool,
}

impl SqlxPageRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn PageRepository> {
        Arc::new(Self::new(pool))
    }
}

fn list_sql(filter: &ContentFilter, count: bool) -> String {
    let trash_clause = if filter.trashed {
        "deleted_at IS NOT NULL"
    } else {
        "deleted_at IS NULL"
    };
    let order = if filter.trashed {
        "deleted_at DESC, id DESC"
    } else {
        "updated_at DESC, id DESC"
    };
    let where_clause = format!(
        "tenant_id = ? AND {} AND (? IS NULL OR status = ?) AND (? IS NULL OR LOWER(title) LIKE ?)",
        trash_clause
    );
    if count {
        format!("SELECT COUNT(*) AS count FROM pages WHERE {}", where_clause)
    } else {
        format!(
            "SELECT {} FROM pages WHERE {} ORDER BY {} LIMIT ? OFFSET ?",
            PAGE_COLUMNS, where_clause, order
        )
    }
}

fn search_pattern(filter: &ContentFilter) -> Option<String> {
    filter
        .search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| format!("%{}%", s.to_lowercase()))
}

#[async_trait]
impl PageRepository for SqlxPageRepository {
    async fn create(&self, page: &Page) -> Result<Page> {
        let id = match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let mut tx = self.pool.sqlite()?.begin().await?;
                let id = insert_sqlite(&mut tx, page).await?;
                claim_sqlite(&mut tx, page.tenant_id, SlugModule::Pages, id, &page.slug).await?;
                tx.commit().await?;
                id
            }
            DatabaseDriver::Mysql => {
                let mut tx = self.pool.mysql()?.begin().await?;
                let id = insert_mysql(&mut tx, page).await?;
                claim_mysql(&mut tx, page.tenant_id, SlugModule::Pages, id, &page.slug).await?;
                tx.commit().await?;
                id
            }
        };
        self.get_by_id(page.tenant_id, id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Page not found after create"))
    }

    async fn get_by_id(&self, tenant_id: i64, id: i64) -> Result<Option<Page>> {
        let sql = format!("SELECT {} FROM pages WHERE id = ? AND tenant_id = ?", PAGE_COLUMNS);
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let row = sqlx::query(&sql)
                    .bind(id)
                    .bind(tenant_id)
                    .fetch_optional(self.pool.sqlite()?)
                    .await
                    .context("Failed to get page")?;
                row.map(|r| row_to_page_sqlite(&r)).transpose()
            }
            DatabaseDriver::Mysql => {
                let row = sqlx::query(&sql)
                    .bind(id)
                    .bind(tenant_id)
                    .fetch_optional(self.pool.mysql()?)
                    .await
                    .context("Failed to get page")?;
                row.map(|r| row_to_page_mysql(&r)).transpose()
            }
        }
    }

    async fn get_published_by_slug(&self, tenant_id: i64, slug: &str) -> Result<Option<Page>> {
        let sql = format!(
            "SELECT {} FROM pages WHERE tenant_id = ? AND slug = ? AND status = 'published' AND deleted_at IS NULL",
            PAGE_COLUMNS
        );
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let row = sqlx::query(&sql)
                    .bind(tenant_id)
                    .bind(slug)
                    .fetch_optional(self.pool.sqlite()?)
                    .await
                    .context("Failed to get page by slug")?;
                row.map(|r| row_to_page_sqlite(&r)).transpose()
            }
            DatabaseDriver::Mysql => {
                let row = sqlx::query(&sql)
                    .bind(tenant_id)
                    .bind(slug)
                    .fetch_optional(self.pool.mysql()?)
                    .await
                    .context("Failed to get page by slug")?;
                row.map(|r| row_to_page_mysql(&r)).transpose()
            }
        }
    }

    async fn list(&self, tenant_id: i64, filter: &ContentFilter, params: &ListParams) -> Result<(Vec<Page>, i64)> {
        let status = filter.status.map(|s| s.as_str());
        let pattern = search_pattern(filter);
        let count_sql = list_sql(filter, true);
        let select_sql = list_sql(filter, false);

        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let pool = self.pool.sqlite()?;
                let total: i64 = sqlx::query(&count_sql)
                    .bind(tenant_id)
                    .bind(status)
                    .bind(status)
                    .bind(pattern.as_deref())
                    .bind(pattern.as_deref())
                    .fetch_one(pool)
                    .await
                    .context("Failed to count pages")?
                    .get("count");
                let rows = sqlx::query(&select_sql)
                    .bind(tenant_id)
                    .bind(status)
                    .bind(status)
                    .bind(pattern.as_deref())
                    .bind(pattern.as_deref())
                    .bind(params.limit())
                    .bind(params.offset())
                    .fetch_all(pool)
                    .await
                    .context("Failed to list pages")?;
                let pages = rows.iter().map(row_to_page_sqlite).collect::<Result<Vec<_>>>()?;
                Ok((pages, total))
            }
            DatabaseDriver::Mysql => {
                let pool = self.pool.mysql()?;
                let total: i64 = sqlx::query(&count_sql)
                    .bind(tenant_id)
                    .bind(status)
                    .bind(status)
                    .bind(pattern.as_deref())
                    .bind(pattern.as_deref())
                    .fetch_one(pool)
                    .await
                    .context("Failed to count pages")?
                    .get("count");
                let rows = sqlx::query(&select_sql)
                    .bind(tenant_id)
                    .bind(status)
                    .bind(status)
                    .bind(pattern.as_deref())
                    .bind(pattern.as_deref())
                    .bind(params.limit())
                    .bind(params.offset())
                    .fetch_all(pool)
                    .await
                    .context("Failed to list pages")?;
                let pages = rows.iter().map(row_to_page_mysql).collect::<Result<Vec<_>>>()?;
                Ok((pages, total))
            }
        }
    }

    async fn list_published(&self, tenant_id: i64, params: &ListParams) -> Result<(Vec<Page>, i64)> {
        let filter = ContentFilter {
            status: Some(ContentStatus::Published),
            ..ContentFilter::default()
        };
        self.list(tenant_id, &filter, params).await
    }

    async fn update(&self, page: &Page) -> Result<Page> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let mut tx = self.pool.sqlite()?.begin().await?;
                write_sqlite(&mut tx, page).await?;
                tx.commit().await?;
            }
            DatabaseDriver::Mysql => {
                let mut tx = self.pool.mysql()?.begin().await?;
                write_mysql(&mut tx, page).await?;
                tx.commit().await?;
            }
        }
        self.get_by_id(page.tenant_id, page.id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Page not found after update"))
    }

    async fn trash(&self, tenant_id: i64, id: i64, deleted_by: Option<i64>) -> Result<bool> {
        let sql = "UPDATE pages SET deleted_at = ?, deleted_by = ? WHERE id = ? AND tenant_id = ? AND deleted_at IS NULL";
        let now = Utc::now();
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(now)
                .bind(deleted_by)
                .bind(id)
                .bind(tenant_id)
                .execute(self.pool.sqlite()?)
                .await
                .context("Failed to trash page")?
                .rows_affected(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(now)
                .bind(deleted_by)
                .bind(id)
                .bind(tenant_id)
                .execute(self.pool.mysql()?)
                .await
                .context("Failed to trash page")?
                .rows_affected(),
        };
        Ok(affected > 0)
    }

    async fn restore_from_trash(&self, tenant_id: i64, id: i64) -> Result<bool> {
        let sql = "UPDATE pages SET deleted_at = NULL, deleted_by = NULL, updated_at = ? WHERE id = ? AND tenant_id = ? AND deleted_at IS NOT NULL";
        let now = Utc::now();
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(now)
                .bind(id)
                .bind(tenant_id)
                .execute(self.pool.sqlite()?)
                .await
                .context("Failed to restore page from trash")?
                .rows_affected(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(now)
                .bind(id)
                .bind(tenant_id)
                .execute(self.pool.mysql()?)
                .await
                .context("Failed to restore page from trash")?
                .rows_affected(),
        };
        Ok(affected > 0)
    }

    async fn purge(&self, tenant_id: i64, id: i64) -> Result<bool> {
        let sql = "DELETE FROM pages WHERE id = ? AND tenant_id = ?";
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let mut tx = self.pool.sqlite()?.begin().await?;
                release_sqlite(&mut tx, tenant_id, SlugModule::Pages, id).await?;
                let affected = sqlx::query(sql)
                    .bind(id)
                    .bind(tenant_id)
                    .execute(&mut *tx)
                    .await
                    .context("Failed to purge page")?
                    .rows_affected();
                tx.commit().await?;
                affected
            }
            DatabaseDriver::Mysql => {
                let mut tx = self.pool.mysql()?.begin().await?;
                release_mysql(&mut tx, tenant_id, SlugModule::Pages, id).await?;
                let affected = sqlx::query(sql)
                    .bind(id)
                    .bind(tenant_id)
                    .execute(&mut *tx)
                    .await
                    .context("Failed to purge page")?
                    .rows_affected();
                tx.commit().await?;
                affected
            }
        };
        Ok(affected > 0)
    }

    async fn trashed_ids(&self, tenant_id: i64) -> Result<Vec<i64>> {
        let sql = "SELECT id FROM pages WHERE tenant_id = ? AND deleted_at IS NOT NULL ORDER BY id";
        let ids: Vec<i64> = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(tenant_id)
                .fetch_all(self.pool.sqlite()?)
                .await
                .context("Failed to list trashed pages")?
                .iter()
                .map(|r| r.get("id"))
                .collect(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(tenant_id)
                .fetch_all(self.pool.mysql()?)
                .await
                .context("Failed to list trashed pages")?
                .iter()
                .map(|r| r.get("id"))
                .collect(),
        };
        Ok(ids)
    }

    async fn trashed_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<(i64, i64)>> {
        let sql = "SELECT tenant_id, id FROM pages WHERE deleted_at IS NOT NULL AND deleted_at < ? ORDER BY id";
        let rows: Vec<(i64, i64)> = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(cutoff)
                .fetch_all(self.pool.sqlite()?)
                .await
                .context("Failed to find expired trash")?
                .iter()
                .map(|r| (r.get("tenant_id"), r.get("id")))
                .collect(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(cutoff)
                .fetch_all(self.pool.mysql()?)
                .await
                .context("Failed to find expired trash")?
                .iter()
                .map(|r| (r.get("tenant_id"), r.get("id")))
                .collect(),
        };
        Ok(rows)
    }

    async fn count(&self, tenant_id: Option<i64>) -> Result<i64> {
        let sql = "SELECT COUNT(*) AS count FROM pages WHERE deleted_at IS NULL AND (? IS NULL OR tenant_id = ?)";
        let count: i64 = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(tenant_id)
                .bind(tenant_id)
                .fetch_one(self.pool.sqlite()?)
                .await
                .context("Failed to count pages")?
                .get("count"),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(tenant_id)
                .bind(tenant_id)
                .fetch_one(self.pool.mysql()?)
                .await
                .context("Failed to count pages")?
                .get("count"),
        };
        Ok(count)
    }
}

const INSERT_PAGE: &str = r#"
    INSERT INTO pages (tenant_id, title, slug, content, excerpt, status, template, seo_title,
        seo_description, author_id, published_at, created_at, updated_at)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
"#;

const UPDATE_PAGE: &str = r#"
    UPDATE pages SET title = ?, slug = ?, content = ?, excerpt = ?, status = ?, template = ?,
        seo_title = ?, seo_description = ?, published_at = ?, updated_at = ?
    WHERE id = ? AND tenant_id = ?
"#;

// SQLite implementations

async fn insert_sqlite(conn: &mut SqliteConnection, page: &Page) -> Result<i64> {
    let now = Utc::now();
    let result = sqlx::query(INSERT_PAGE)
        .bind(page.tenant_id)
        .bind(&page.title)
        .bind(&page.slug)
        .bind(&page.content)
        .bind(&page.excerpt)
        .bind(page.status.as_str())
        .bind(&page.template)
        .bind(&page.seo_title)
        .bind(&page.seo_description)
        .bind(page.author_id)
        .bind(page.published_at)
        .bind(now)
        .bind(now)
        .execute(&mut *conn)
        .await
        .context("Failed to create page")?;
    Ok(result.last_insert_rowid())
}

/// Write editable columns and slug claim on an open connection
pub(crate) async fn write_sqlite(conn: &mut SqliteConnection, page: &Page) -> Result<()> {
    sqlx::query(UPDATE_PAGE)
        .bind(&page.title)
        .bind(&page.slug)
        .bind(&page.content)
        .bind(&page.excerpt)
        .bind(page.status.as_str())
        .bind(&page.template)
        .bind(&page.seo_title)
        .bind(&page.seo_description)
        .bind(page.published_at)
        .bind(Utc::now())
        .bind(page.id)
        .bind(page.tenant_id)
        .execute(&mut *conn)
        .await
        .context("Failed to update page")?;
    claim_sqlite(conn, page.tenant_id, SlugModule::Pages, page.id, &page.slug).await
}

fn row_to_page_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<Page> {
    let status: String = row.get("status");
    Ok(Page {
        id: row.get("id"),
        tenant_id: row.get("tenant_id"),
        title: row.get("title"),
        slug: row.get("slug"),
        content: row.get("content"),
        excerpt: row.get("excerpt"),
        status: status.parse()?,
        template: row.get("template"),
        seo_title: row.get("seo_title"),
        seo_description: row.get("seo_description"),
        author_id: row.get("author_id"),
        current_revision_id: row.get("current_revision_id"),
        published_at: row.get("published_at"),
        deleted_at: row.get("deleted_at"),
        deleted_by: row.get("deleted_by"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

// MySQL implementations

async fn insert_mysql(conn: &mut MySqlConnection, page: &Page) -> Result<i64> {
    let now = Utc::now();
    let result = sqlx::query(INSERT_PAGE)
        .bind(page.tenant_id)
        .bind(&page.title)
        .bind(&page.slug)
        .bind(&page.content)
        .bind(&page.excerpt)
        .bind(page.status.as_str())
        .bind(&page.template)
        .bind(&page.seo_title)
        .bind(&page.seo_description)
        .bind(page.author_id)
        .bind(page.published_at)
        .bind(now)
        .bind(now)
        .execute(&mut *conn)
        .await
        .context("Failed to create page")?;
    Ok(result.last_insert_id() as i64)
}

pub(crate) async fn write_mysql(conn: &mut MySqlConnection, page: &Page) -> Result<()> {
    sqlx::query(UPDATE_PAGE)
        .bind(&page.title)
        .bind(&page.slug)
        .bind(&page.content)
        .bind(&page.excerpt)
        .bind(page.status.as_str())
        .bind(&page.template)
        .bind(&page.seo_title)
        .bind(&page.seo_description)
        .bind(page.published_at)
        .bind(Utc::now())
        .bind(page.id)
        .bind(page.tenant_id)
        .execute(&mut *conn)
        .await
        .context("Failed to update page")?;
    claim_mysql(conn, page.tenant_id, SlugModule::Pages, page.id, &page.slug).await
}

fn row_to_page_mysql(row: &sqlx::mysql::MySqlRow) -> Result<Page> {
    let status: String = row.get("status");
    Ok(Page {
        id: row.get("id"),
        tenant_id: row.get("tenant_id"),
        title: row.get("title"),
        slug: row.get("slug"),
        content: row.get("content"),
        excerpt: row.get("excerpt"),
        status: status.parse()?,
        template: row.get("template"),
        seo_title: row.get("seo_title"),
        seo_description: row.get("seo_description"),
        author_id: row.get("author_id"),
        current_revision_id: row.get("current_revision_id"),
        published_at: row.get("published_at"),
        deleted_at: row.get("deleted_at"),
        deleted_by: row.get("deleted_by"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::slug::SlugTaken;
    use crate::db::repositories::test_support::{insert_tenant, setup_pool};

    async fn setup() -> (SqlxPageRepository, i64, i64) {
        let pool = setup_pool().await;
        let t1 = insert_tenant(&pool, "one.test").await;
        let t2 = insert_tenant(&pool, "two.test").await;
        (SqlxPageRepository::new(pool), t1, t2)
    }

    fn page(tenant_id: i64, title: &str, slug: &str) -> Page {
        Page::new(tenant_id, title.to_string(), slug.to_string(), format!("<p>{}</p>", title))
    }

    #[tokio::test]
    async fn test_create_and_get_scoped_by_tenant() {
        let (repo, t1, t2) = setup().await;
        let created = repo.create(&page(t1, "About", "about")).await.unwrap();

        assert!(repo.get_by_id(t1, created.id).await.unwrap().is_some());
        assert!(repo.get_by_id(t2, created.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_slug_rejected_per_tenant() {
        let (repo, t1, t2) = setup().await;
        repo.create(&page(t1, "About", "about")).await.unwrap();

        let err = repo.create(&page(t1, "About again", "about")).await.unwrap_err();
        assert!(err.downcast_ref::<SlugTaken>().is_some());
        // Rolled back: no orphan row
        assert_eq!(repo.count(Some(t1)).await.unwrap(), 1);

        repo.create(&page(t2, "About", "about")).await.unwrap();
    }

    #[tokio::test]
    async fn test_unknown_status_is_an_error() {
        let pool = setup_pool().await;
        let t1 = insert_tenant(&pool, "one.test").await;
        let repo = SqlxPageRepository::new(pool.clone());
        let created = repo.create(&page(t1, "About", "about")).await.unwrap();

        sqlx::query("UPDATE pages SET status = 'archived' WHERE id = ?")
            .bind(created.id)
            .execute(pool.sqlite().unwrap())
            .await
            .unwrap();
        assert!(repo.get_by_id(t1, created.id).await.is_err());
    }

    #[tokio::test]
    async fn test_list_filters() {
        let (repo, t1, _) = setup().await;
        let mut published = page(t1, "Pricing Plans", "pricing");
        published.status = ContentStatus::Published;
        repo.create(&published).await.unwrap();
        repo.create(&page(t1, "Draft notes", "notes")).await.unwrap();

        let params = ListParams::default();
        let (all, total) = repo.list(t1, &ContentFilter::default(), &params).await.unwrap();
        assert_eq!((all.len(), total), (2, 2));

        let filter = ContentFilter {
            search: Some("PRICING".into()),
            ..ContentFilter::default()
        };
        let (found, _) = repo.list(t1, &filter, &params).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].slug, "pricing");

        let (live, _) = repo.list_published(t1, &params).await.unwrap();
        assert_eq!(live.len(), 1);
        assert!(repo.get_published_by_slug(t1, "notes").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_trash_lifecycle() {
        let (repo, t1, _) = setup().await;
        let created = repo.create(&page(t1, "Old", "old")).await.unwrap();

        assert!(repo.trash(t1, created.id, None).await.unwrap());
        assert!(!repo.trash(t1, created.id, None).await.unwrap());

        let trashed = ContentFilter {
            trashed: true,
            ..ContentFilter::default()
        };
        let (items, _) = repo.list(t1, &trashed, &ListParams::default()).await.unwrap();
        assert_eq!(items.len(), 1);
        let (live, _) = repo.list(t1, &ContentFilter::default(), &ListParams::default()).await.unwrap();
        assert!(live.is_empty());
        assert_eq!(repo.trashed_ids(t1).await.unwrap(), vec![created.id]);

        let future = Utc::now() + chrono::Duration::days(1);
        assert_eq!(repo.trashed_before(future).await.unwrap(), vec![(t1, created.id)]);

        assert!(repo.restore_from_trash(t1, created.id).await.unwrap());
        assert!(repo.get_by_id(t1, created.id).await.unwrap().unwrap().deleted_at.is_none());
    }

    #[tokio::test]
    async fn test_update_moves_slug_and_purge_releases_it() {
        let (repo, t1, _) = setup().await;
        let mut created = repo.create(&page(t1, "Team", "team")).await.unwrap();

        created.slug = "people".into();
        created.title = "People".into();
        let updated = repo.update(&created).await.unwrap();
        assert_eq!(updated.slug, "people");

        // The old slug is free again
        repo.create(&page(t1, "Team", "team")).await.unwrap();

        assert!(repo.purge(t1, updated.id).await.unwrap());
        repo.create(&page(t1, "People", "people")).await.unwrap();
    }
}
