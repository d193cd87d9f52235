//! Blog post repository
//!
//! Posts carry many-to-many links to categories and tags. Links are only
//! written for categories and tags of the post's own tenant; ids that do
//! not exist there are dropped silently.

use super::slug::{claim_mysql, claim_sqlite, release_mysql, release_sqlite};
use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{BlogPost, ContentFilter, ListParams, SlugModule};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{MySqlConnection, MySqlPool, Row, SqliteConnection, SqlitePool};
use std::sync::Arc;

const POST_COLUMNS: &str = "id, tenant_id, title, slug, content, excerpt, featured_image, status, allow_comments, \
     seo_title, seo_description, author_id, current_revision_id, published_at, deleted_at, deleted_by, created_at, updated_at";

#[async_trait]
pub trait BlogPostRepository: Send + Sync {
    /// Insert a post with its links and claim its slug
    async fn create(&self, post: &BlogPost) -> Result<BlogPost>;
    async fn get_by_id(&self, tenant_id: i64, id: i64) -> Result<Option<BlogPost>>;
    async fn get_published_by_slug(&self, tenant_id: i64, slug: &str) -> Result<Option<BlogPost>>;
    async fn list(&self, tenant_id: i64, filter: &ContentFilter, params: &ListParams) -> Result<(Vec<BlogPost>, i64)>;
    /// Published live posts, newest first, optionally limited to one category or tag
    async fn list_published(
        &self,
        tenant_id: i64,
        category_id: Option<i64>,
        tag_id: Option<i64>,
        params: &ListParams,
    ) -> Result<(Vec<BlogPost>, i64)>;
    /// Write the editable columns, replace links and move the slug claim
    async fn update(&self, post: &BlogPost) -> Result<BlogPost>;
    async fn trash(&self, tenant_id: i64, id: i64, deleted_by: Option<i64>) -> Result<bool>;
    async fn restore_from_trash(&self, tenant_id: i64, id: i64) -> Result<bool>;
    async fn purge(&self, tenant_id: i64, id: i64) -> Result<bool>;
    async fn trashed_ids(&self, tenant_id: i64) -> Result<Vec<i64>>;
    async fn trashed_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<(i64, i64)>>;
    async fn count(&self, tenant_id: Option<i64>) -> Result<i64>;
}

pub struct SqlxBlogPostRepository {
    pool: DynDatabasePool,
}

impl SqlxBlogPostRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn BlogPostRepository> {
        Arc::new(Self::new(pool))
    }
}

fn admin_list_sql(filter: &ContentFilter, count: bool) -> String {
    let (trash_clause, order) = if filter.trashed {
        ("deleted_at IS NOT NULL", "deleted_at DESC, id DESC")
    } else {
        ("deleted_at IS NULL", "updated_at DESC, id DESC")
    };
    let where_clause = format!(
        "tenant_id = ? AND {} AND (? IS NULL OR status = ?) AND (? IS NULL OR LOWER(title) LIKE ?)",
        trash_clause
    );
    if count {
        format!("SELECT COUNT(*) AS count FROM blog_posts WHERE {}", where_clause)
    } else {
        format!(
            "SELECT {} FROM blog_posts WHERE {} ORDER BY {} LIMIT ? OFFSET ?",
            POST_COLUMNS, where_clause, order
        )
    }
}

const PUBLIC_WHERE: &str = r#"
    tenant_id = ? AND status = 'published' AND deleted_at IS NULL
    AND (? IS NULL OR EXISTS (SELECT 1 FROM blog_post_categories pc WHERE pc.post_id = blog_posts.id AND pc.category_id = ?))
    AND (? IS NULL OR EXISTS (SELECT 1 FROM blog_post_tags pt WHERE pt.post_id = blog_posts.id AND pt.tag_id = ?))
"#;

fn search_pattern(filter: &ContentFilter) -> Option<String> {
    filter
        .search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| format!("%{}%", s.to_lowercase()))
}

#[async_trait]
impl BlogPostRepository for SqlxBlogPostRepository {
    async fn create(&self, post: &BlogPost) -> Result<BlogPost> {
        let id = match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let mut tx = self.pool.sqlite()?.begin().await?;
                let id = insert_sqlite(&mut tx, post).await?;
                write_links_sqlite(&mut tx, post.tenant_id, id, &post.category_ids, &post.tag_ids).await?;
                claim_sqlite(&mut tx, post.tenant_id, SlugModule::Blog, id, &post.slug).await?;
                tx.commit().await?;
                id
            }
            DatabaseDriver::Mysql => {
                let mut tx = self.pool.mysql()?.begin().await?;
                let id = insert_mysql(&mut tx, post).await?;
                write_links_mysql(&mut tx, post.tenant_id, id, &post.category_ids, &post.tag_ids).await?;
                claim_mysql(&mut tx, post.tenant_id, SlugModule::Blog, id, &post.slug).await?;
                tx.commit().await?;
                id
            }
        };
        self.get_by_id(post.tenant_id, id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Post not found after create"))
    }

    async fn get_by_id(&self, tenant_id: i64, id: i64) -> Result<Option<BlogPost>> {
        let sql = format!("SELECT {} FROM blog_posts WHERE id = ? AND tenant_id = ?", POST_COLUMNS);
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let pool = self.pool.sqlite()?;
                let row = sqlx::query(&sql)
                    .bind(id)
                    .bind(tenant_id)
                    .fetch_optional(pool)
                    .await
                    .context("Failed to get post")?;
                match row {
                    Some(row) => Ok(Some(load_links_sqlite(pool, row_to_post_sqlite(&row)?).await?)),
                    None => Ok(None),
                }
            }
            DatabaseDriver::Mysql => {
                let pool = self.pool.mysql()?;
                let row = sqlx::query(&sql)
                    .bind(id)
                    .bind(tenant_id)
                    .fetch_optional(pool)
                    .await
                    .context("Failed to get post")?;
                match row {
                    Some(row) => Ok(Some(load_links_mysql(pool, row_to_post_mysql(&row)?).await?)),
                    None => Ok(None),
                }
            }
        }
    }

    async fn get_published_by_slug(&self, tenant_id: i64, slug: &str) -> Result<Option<BlogPost>> {
        let sql = format!(
            "SELECT {} FROM blog_posts WHERE tenant_id = ? AND slug = ? AND status = 'published' AND deleted_at IS NULL",
            POST_COLUMNS
        );
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let pool = self.pool.sqlite()?;
                let row = sqlx::query(&sql)
                    .bind(tenant_id)
                    .bind(slug)
                    .fetch_optional(pool)
                    .await
                    .context("Failed to get post by slug")?;
                match row {
                    Some(row) => Ok(Some(load_links_sqlite(pool, row_to_post_sqlite(&row)?).await?)),
                    None => Ok(None),
                }
            }
            DatabaseDriver::Mysql => {
                let pool = self.pool.mysql()?;
                let row = sqlx::query(&sql)
                    .bind(tenant_id)
                    .bind(slug)
                    .fetch_optional(pool)
                    .await
                    .context("Failed to get post by slug")?;
                match row {
                    Some(row) => Ok(Some(load_links_mysql(pool, row_to_post_mysql(&row)?).await?)),
                    None => Ok(None),
                }
            }
        }
    }

    async fn list(&self, tenant_id: i64, filter: &ContentFilter, params: &ListParams) -> Result<(Vec<BlogPost>, i64)> {
        let status = filter.status.map(|s| s.as_str());
        let pattern = search_pattern(filter);
        let count_sql = admin_list_sql(filter, true);
        let select_sql = admin_list_sql(filter, false);

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
                    .context("Failed to count posts")?
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
                    .context("Failed to list posts")?;
                let mut posts = Vec::with_capacity(rows.len());
                for row in &rows {
                    posts.push(load_links_sqlite(pool, row_to_post_sqlite(row)?).await?);
                }
                Ok((posts, total))
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
                    .context("Failed to count posts")?
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
                    .context("Failed to list posts")?;
                let mut posts = Vec::with_capacity(rows.len());
                for row in &rows {
                    posts.push(load_links_mysql(pool, row_to_post_mysql(row)?).await?);
                }
                Ok((posts, total))
            }
        }
    }

    async fn list_published(
        &self,
        tenant_id: i64,
        category_id: Option<i64>,
        tag_id: Option<i64>,
        params: &ListParams,
    ) -> Result<(Vec<BlogPost>, i64)> {
        let count_sql = format!("SELECT COUNT(*) AS count FROM blog_posts WHERE {}", PUBLIC_WHERE);
        let select_sql = format!(
            "SELECT {} FROM blog_posts WHERE {} ORDER BY published_at DESC, id DESC LIMIT ? OFFSET ?",
            POST_COLUMNS, PUBLIC_WHERE
        );

        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let pool = self.pool.sqlite()?;
                let total: i64 = sqlx::query(&count_sql)
                    .bind(tenant_id)
                    .bind(category_id)
                    .bind(category_id)
                    .bind(tag_id)
                    .bind(tag_id)
                    .fetch_one(pool)
                    .await
                    .context("Failed to count published posts")?
                    .get("count");
                let rows = sqlx::query(&select_sql)
                    .bind(tenant_id)
                    .bind(category_id)
                    .bind(category_id)
                    .bind(tag_id)
                    .bind(tag_id)
                    .bind(params.limit())
                    .bind(params.offset())
                    .fetch_all(pool)
                    .await
                    .context("Failed to list published posts")?;
                let mut posts = Vec::with_capacity(rows.len());
                for row in &rows {
                    posts.push(load_links_sqlite(pool, row_to_post_sqlite(row)?).await?);
                }
                Ok((posts, total))
            }
            DatabaseDriver::Mysql => {
                let pool = self.pool.mysql()?;
                let total: i64 = sqlx::query(&count_sql)
                    .bind(tenant_id)
                    .bind(category_id)
                    .bind(category_id)
                    .bind(tag_id)
                    .bind(tag_id)
                    .fetch_one(pool)
                    .await
                    .context("Failed to count published posts")?
                    .get("count");
                let rows = sqlx::query(&select_sql)
                    .bind(tenant_id)
                    .bind(category_id)
                    .bind(category_id)
                    .bind(tag_id)
                    .bind(tag_id)
                    .bind(params.limit())
                    .bind(params.offset())
                    .fetch_all(pool)
                    .await
                    .context("Failed to list published posts")?;
                let mut posts = Vec::with_capacity(rows.len());
                for row in &rows {
                    posts.push(load_links_mysql(pool, row_to_post_mysql(row)?).await?);
                }
                Ok((posts, total))
            }
        }
    }

    async fn update(&self, post: &BlogPost) -> Result<BlogPost> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let mut tx = self.pool.sqlite()?.begin().await?;
                write_sqlite(&mut tx, post).await?;
                tx.commit().await?;
            }
            DatabaseDriver::Mysql => {
                let mut tx = self.pool.mysql()?.begin().await?;
                write_mysql(&mut tx, post).await?;
                tx.commit().await?;
            }
        }
        self.get_by_id(post.tenant_id, post.id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Post not found after update"))
    }

    async fn trash(&self, tenant_id: i64, id: i64, deleted_by: Option<i64>) -> Result<bool> {
        let sql = "UPDATE blog_posts SET deleted_at = ?, deleted_by = ? WHERE id = ? AND tenant_id = ? AND deleted_at IS NULL";
        let now = Utc::now();
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(now)
                .bind(deleted_by)
                .bind(id)
                .bind(tenant_id)
                .execute(self.pool.sqlite()?)
                .await
                .context("Failed to trash post")?
                .rows_affected(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(now)
                .bind(deleted_by)
                .bind(id)
                .bind(tenant_id)
                .execute(self.pool.mysql()?)
                .await
                .context("Failed to trash post")?
                .rows_affected(),
        };
        Ok(affected > 0)
    }

    async fn restore_from_trash(&self, tenant_id: i64, id: i64) -> Result<bool> {
        let sql = "UPDATE blog_posts SET deleted_at = NULL, deleted_by = NULL, updated_at = ? WHERE id = ? AND tenant_id = ? AND deleted_at IS NOT NULL";
        let now = Utc::now();
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(now)
                .bind(id)
                .bind(tenant_id)
                .execute(self.pool.sqlite()?)
                .await
                .context("Failed to restore post from trash")?
                .rows_affected(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(now)
                .bind(id)
                .bind(tenant_id)
                .execute(self.pool.mysql()?)
                .await
                .context("Failed to restore post from trash")?
                .rows_affected(),
        };
        Ok(affected > 0)
    }

    async fn purge(&self, tenant_id: i64, id: i64) -> Result<bool> {
        let sql = "DELETE FROM blog_posts WHERE id = ? AND tenant_id = ?";
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let mut tx = self.pool.sqlite()?.begin().await?;
                release_sqlite(&mut tx, tenant_id, SlugModule::Blog, id).await?;
                let affected = sqlx::query(sql)
                    .bind(id)
                    .bind(tenant_id)
                    .execute(&mut *tx)
                    .await
                    .context("Failed to purge post")?
                    .rows_affected();
                tx.commit().await?;
                affected
            }
            DatabaseDriver::Mysql => {
                let mut tx = self.pool.mysql()?.begin().await?;
                release_mysql(&mut tx, tenant_id, SlugModule::Blog, id).await?;
                let affected = sqlx::query(sql)
                    .bind(id)
                    .bind(tenant_id)
                    .execute(&mut *tx)
                    .await
                    .context("Failed to purge post")?
                    .rows_affected();
                tx.commit().await?;
                affected
            }
        };
        Ok(affected > 0)
    }

    async fn trashed_ids(&self, tenant_id: i64) -> Result<Vec<i64>> {
        let sql = "SELECT id FROM blog_posts WHERE tenant_id = ? AND deleted_at IS NOT NULL ORDER BY id";
        let ids: Vec<i64> = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(tenant_id)
                .fetch_all(self.pool.sqlite()?)
                .await
                .context("Failed to list trashed posts")?
                .iter()
                .map(|r| r.get("id"))
                .collect(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(tenant_id)
                .fetch_all(self.pool.mysql()?)
                .await
                .context("Failed to list trashed posts")?
                .iter()
                .map(|r| r.get("id"))
                .collect(),
        };
        Ok(ids)
    }

    async fn trashed_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<(i64, i64)>> {
        let sql = "SELECT tenant_id, id FROM blog_posts WHERE deleted_at IS NOT NULL AND deleted_at < ? ORDER BY id";
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
        let sql = "SELECT COUNT(*) AS count FROM blog_posts WHERE deleted_at IS NULL AND (? IS NULL OR tenant_id = ?)";
        let count: i64 = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(tenant_id)
                .bind(tenant_id)
                .fetch_one(self.pool.sqlite()?)
                .await
                .context("Failed to count posts")?
                .get("count"),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(tenant_id)
                .bind(tenant_id)
                .fetch_one(self.pool.mysql()?)
                .await
                .context("Failed to count posts")?
                .get("count"),
        };
        Ok(count)
    }
}

const INSERT_POST: &str = r#"
    INSERT INTO blog_posts (tenant_id, title, slug, content, excerpt, featured_image, status, allow_comments,
        seo_title, seo_description, author_id, published_at, created_at, updated_at)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
"#;

const UPDATE_POST: &str = r#"
    UPDATE blog_posts SET title = ?, slug = ?, content = ?, excerpt = ?, featured_image = ?, status = ?,
        allow_comments = ?, seo_title = ?, seo_description = ?, published_at = ?, updated_at = ?
    WHERE id = ? AND tenant_id = ?
"#;

const LINK_CATEGORY: &str = "INSERT INTO blog_post_categories (post_id, category_id) \
     SELECT ?, id FROM blog_categories WHERE id = ? AND tenant_id = ?";
const LINK_TAG: &str = "INSERT INTO blog_post_tags (post_id, tag_id) SELECT ?, id FROM blog_tags WHERE id = ? AND tenant_id = ?";

fn unique_sorted(ids: &[i64]) -> Vec<i64> {
    let mut ids = ids.to_vec();
    ids.sort_unstable();
    ids.dedup();
    ids
}

// SQLite implementations

async fn insert_sqlite(conn: &mut SqliteConnection, post: &BlogPost) -> Result<i64> {
    let now = Utc::now();
    let result = sqlx::query(INSERT_POST)
        .bind(post.tenant_id)
        .bind(&post.title)
        .bind(&post.slug)
        .bind(&post.content)
        .bind(&post.excerpt)
        .bind(&post.featured_image)
        .bind(post.status.as_str())
        .bind(post.allow_comments)
        .bind(&post.seo_title)
        .bind(&post.seo_description)
        .bind(post.author_id)
        .bind(post.published_at)
        .bind(now)
        .bind(now)
        .execute(&mut *conn)
        .await
        .context("Failed to create post")?;
    Ok(result.last_insert_rowid())
}

/// Write editable columns, links and slug claim on an open connection
pub(crate) async fn write_sqlite(conn: &mut SqliteConnection, post: &BlogPost) -> Result<()> {
    sqlx::query(UPDATE_POST)
        .bind(&post.title)
        .bind(&post.slug)
        .bind(&post.content)
        .bind(&post.excerpt)
        .bind(&post.featured_image)
        .bind(post.status.as_str())
        .bind(post.allow_comments)
        .bind(&post.seo_title)
        .bind(&post.seo_description)
        .bind(post.published_at)
        .bind(Utc::now())
        .bind(post.id)
        .bind(post.tenant_id)
        .execute(&mut *conn)
        .await
        .context("Failed to update post")?;
    write_links_sqlite(conn, post.tenant_id, post.id, &post.category_ids, &post.tag_ids).await?;
    claim_sqlite(conn, post.tenant_id, SlugModule::Blog, post.id, &post.slug).await
}

async fn write_links_sqlite(
    conn: &mut SqliteConnection,
    tenant_id: i64,
    post_id: i64,
    category_ids: &[i64],
    tag_ids: &[i64],
) -> Result<()> {
    sqlx::query("DELETE FROM blog_post_categories WHERE post_id = ?")
        .bind(post_id)
        .execute(&mut *conn)
        .await
        .context("Failed to clear post categories")?;
    sqlx::query("DELETE FROM blog_post_tags WHERE post_id = ?")
        .bind(post_id)
        .execute(&mut *conn)
        .await
        .context("Failed to clear post tags")?;

    for category_id in unique_sorted(category_ids) {
        sqlx::query(LINK_CATEGORY)
            .bind(post_id)
            .bind(category_id)
            .bind(tenant_id)
            .execute(&mut *conn)
            .await
            .context("Failed to link post category")?;
    }
    for tag_id in unique_sorted(tag_ids) {
        sqlx::query(LINK_TAG)
            .bind(post_id)
            .bind(tag_id)
            .bind(tenant_id)
            .execute(&mut *conn)
            .await
            .context("Failed to link post tag")?;
    }
    Ok(())
}

async fn load_links_sqlite(pool: &SqlitePool, mut post: BlogPost) -> Result<BlogPost> {
    post.category_ids = sqlx::query("SELECT category_id FROM blog_post_categories WHERE post_id = ? ORDER BY category_id")
        .bind(post.id)
        .fetch_all(pool)
        .await
        .context("Failed to load post categories")?
        .iter()
        .map(|r| r.get("category_id"))
        .collect();
    post.tag_ids = sqlx::query("SELECT tag_id FROM blog_post_tags WHERE post_id = ? ORDER BY tag_id")
        .bind(post.id)
        .fetch_all(pool)
        .await
        .context("Failed to load post tags")?
        .iter()
        .map(|r| r.get("tag_id"))
        .collect();
    Ok(post)
}

fn row_to_post_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<BlogPost> {
    let status: String = row.get("status");
    Ok(BlogPost {
        id: row.get("id"),
        tenant_id: row.get("tenant_id"),
        title: row.get("title"),
        slug: row.get("slug"),
        content: row.get("content"),
        excerpt: row.get("excerpt"),
        featured_image: row.get("featured_image"),
        status: status.parse()?,
        allow_comments: row.get("allow_comments"),
        seo_title: row.get("seo_title"),
        seo_description: row.get("seo_description"),
        author_id: row.get("author_id"),
        current_revision_id: row.get("current_revision_id"),
        published_at: row.get("published_at"),
        deleted_at: row.get("deleted_at"),
        deleted_by: row.get("deleted_by"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        category_ids: Vec::new(),
        tag_ids: Vec::new(),
    })
}

// MySQL implementations

async fn insert_mysql(conn: &mut MySqlConnection, post: &BlogPost) -> Result<i64> {
    let now = Utc::now();
    let result = sqlx::query(INSERT_POST)
        .bind(post.tenant_id)
        .bind(&post.title)
        .bind(&post.slug)
        .bind(&post.content)
        .bind(&post.excerpt)
        .bind(&post.featured_image)
        .bind(post.status.as_str())
        .bind(post.allow_comments)
        .bind(&post.seo_title)
        .bind(&post.seo_description)
        .bind(post.author_id)
        .bind(post.published_at)
        .bind(now)
        .bind(now)
        .execute(&mut *conn)
        .await
        .context("Failed to create post")?;
    Ok(result.last_insert_id() as i64)
}

pub(crate) async fn write_mysql(conn: &mut MySqlConnection, post: &BlogPost) -> Result<()> {
    sqlx::query(UPDATE_POST)
        .bind(&post.title)
        .bind(&post.slug)
        .bind(&post.content)
        .bind(&post.excerpt)
        .bind(&post.featured_image)
        .bind(post.status.as_str())
        .bind(post.allow_comments)
        .bind(&post.seo_title)
        .bind(&post.seo_description)
        .bind(post.published_at)
        .bind(Utc::now())
        .bind(post.id)
        .bind(post.tenant_id)
        .execute(&mut *conn)
        .await
        .context("Failed to update post")?;
    write_links_mysql(conn, post.tenant_id, post.id, &post.category_ids, &post.tag_ids).await?;
    claim_mysql(conn, post.tenant_id, SlugModule::Blog, post.id, &post.slug).await
}

async fn write_links_mysql(
    conn: &mut MySqlConnection,
    tenant_id: i64,
    post_id: i64,
    category_ids: &[i64],
    tag_ids: &[i64],
) -> Result<()> {
    sqlx::query("DELETE FROM blog_post_categories WHERE post_id = ?")
        .bind(post_id)
        .execute(&mut *conn)
        .await
        .context("Failed to clear post categories")?;
    sqlx::query("DELETE FROM blog_post_tags WHERE post_id = ?")
        .bind(post_id)
        .execute(&mut *conn)
        .await
        .context("Failed to clear post tags")?;

    for category_id in unique_sorted(category_ids) {
        sqlx::query(LINK_CATEGORY)
            .bind(post_id)
            .bind(category_id)
            .bind(tenant_id)
            .execute(&mut *conn)
            .await
            .context("Failed to link post category")?;
    }
    for tag_id in unique_sorted(tag_ids) {
        sqlx::query(LINK_TAG)
            .bind(post_id)
            .bind(tag_id)
            .bind(tenant_id)
            .execute(&mut *conn)
            .await
            .context("Failed to link post tag")?;
    }
    Ok(())
}

async fn load_links_mysql(pool: &MySqlPool, mut post: BlogPost) -> Result<BlogPost> {
    post.category_ids = sqlx::query("SELECT category_id FROM blog_post_categories WHERE post_id = ? ORDER BY category_id")
        .bind(post.id)
        .fetch_all(pool)
        .await
        .context("Failed to load post categories")?
        .iter()
        .map(|r| r.get("category_id"))
        .collect();
    post.tag_ids = sqlx::query("SELECT tag_id FROM blog_post_tags WHERE post_id = ? ORDER BY tag_id")
        .bind(post.id)
        .fetch_all(pool)
        .await
        .context("Failed to load post tags")?
        .iter()
        .map(|r| r.get("tag_id"))
        .collect();
    Ok(post)
}

fn row_to_post_mysql(row: &sqlx::mysql::MySqlRow) -> Result<BlogPost> {
    let status: String = row.get("status");
    Ok(BlogPost {
        id: row.get("id"),
        tenant_id: row.get("tenant_id"),
        title: row.get("title"),
        slug: row.get("slug"),
        content: row.get("content"),
        excerpt: row.get("excerpt"),
        featured_image: row.get("featured_image"),
        status: status.parse()?,
        allow_comments: row.get("allow_comments"),
        seo_title: row.get("seo_title"),
        seo_description: row.get("seo_description"),
        author_id: row.get("author_id"),
        current_revision_id: row.get("current_revision_id"),
        published_at: row.get("published_at"),
        deleted_at: row.get("deleted_at"),
        deleted_by: row.get("deleted_by"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        category_ids: Vec::new(),
        tag_ids: Vec::new(),
    })
}
