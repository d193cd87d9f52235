//! Database migrations
//!
//! Migrations are embedded in the binary as SQL strings, one variant for
//! SQLite and one for MySQL. Applied versions are tracked in `_migrations`.
//!
//! ```ignore
//! use musedock::db::{create_pool, migrations};
//!
//! let pool = create_pool(&config).await?;
//! migrations::run_migrations(&pool).await?;
//! ```

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{MySqlPool, Row, SqlitePool};

use super::DynDatabasePool;
use crate::config::DatabaseDriver;

/// A database migration with SQL for both SQLite and MySQL
#[derive(Debug, Clone)]
pub struct Migration {
    /// Migration version number (must be unique and sequential)
    pub version: i32,
    /// Human-readable migration name
    pub name: &'static str,
    /// SQL statements for SQLite
    pub up_sqlite: &'static str,
    /// SQL statements for MySQL
    pub up_mysql: &'static str,
}

/// Migration record stored in the database
#[derive(Debug, Clone)]
pub struct MigrationRecord {
    pub version: i64,
    pub name: String,
    pub applied_at: DateTime<Utc>,
}

/// All migrations, applied in order.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "create_tenants",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS tenants (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name VARCHAR(150) NOT NULL,
                domain VARCHAR(255) NOT NULL UNIQUE,
                status VARCHAR(20) NOT NULL DEFAULT 'active',
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
            CREATE INDEX IF NOT EXISTS idx_tenants_status ON tenants(status);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS tenants (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                name VARCHAR(150) NOT NULL,
                domain VARCHAR(255) NOT NULL UNIQUE,
                status VARCHAR(20) NOT NULL DEFAULT 'active',
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
            CREATE INDEX idx_tenants_status ON tenants(status);
        "#,
    },
    Migration {
        version: 2,
        name: "create_admins",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS admins (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                tenant_id INTEGER,
                name VARCHAR(150) NOT NULL,
                email VARCHAR(255) NOT NULL,
                password_hash VARCHAR(255) NOT NULL,
                role VARCHAR(20) NOT NULL DEFAULT 'admin',
                active INTEGER NOT NULL DEFAULT 1,
                last_login_at TIMESTAMP,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (tenant_id) REFERENCES tenants(id) ON DELETE CASCADE
            );
            CREATE UNIQUE INDEX IF NOT EXISTS idx_admins_tenant_email
                ON admins(tenant_id, email) WHERE tenant_id IS NOT NULL;
            CREATE UNIQUE INDEX IF NOT EXISTS idx_admins_platform_email
                ON admins(email) WHERE tenant_id IS NULL;
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS admins (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                tenant_id BIGINT NULL,
                name VARCHAR(150) NOT NULL,
                email VARCHAR(255) NOT NULL,
                password_hash VARCHAR(255) NOT NULL,
                role VARCHAR(20) NOT NULL DEFAULT 'admin',
                active TINYINT(1) NOT NULL DEFAULT 1,
                last_login_at TIMESTAMP NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                scope_id BIGINT AS (COALESCE(tenant_id, 0)) VIRTUAL,
                FOREIGN KEY (tenant_id) REFERENCES tenants(id) ON DELETE CASCADE,
                UNIQUE KEY idx_admins_scope_email (scope_id, email)
            );
        "#,
    },
    Migration {
        version: 3,
        name: "create_sessions",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id VARCHAR(64) PRIMARY KEY,
                admin_id INTEGER NOT NULL,
                expires_at TIMESTAMP NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (admin_id) REFERENCES admins(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_sessions_admin_id ON sessions(admin_id);
            CREATE INDEX IF NOT EXISTS idx_sessions_expires_at ON sessions(expires_at);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id VARCHAR(64) PRIMARY KEY,
                admin_id BIGINT NOT NULL,
                expires_at TIMESTAMP NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (admin_id) REFERENCES admins(id) ON DELETE CASCADE
            );
            CREATE INDEX idx_sessions_admin_id ON sessions(admin_id);
            CREATE INDEX idx_sessions_expires_at ON sessions(expires_at);
        "#,
    },
    Migration {
        version: 4,
        name: "create_slugs",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS slugs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                tenant_id INTEGER NOT NULL,
                module VARCHAR(20) NOT NULL,
                reference_id INTEGER NOT NULL,
                slug VARCHAR(255) NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (tenant_id) REFERENCES tenants(id) ON DELETE CASCADE,
                UNIQUE (tenant_id, module, slug),
                UNIQUE (tenant_id, module, reference_id)
            );
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS slugs (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                tenant_id BIGINT NOT NULL,
                module VARCHAR(20) NOT NULL,
                reference_id BIGINT NOT NULL,
                slug VARCHAR(255) NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (tenant_id) REFERENCES tenants(id) ON DELETE CASCADE,
                UNIQUE KEY uk_slugs_slug (tenant_id, module, slug),
                UNIQUE KEY uk_slugs_reference (tenant_id, module, reference_id)
            );
        "#,
    },
    Migration {
        version: 5,
        name: "create_pages",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS pages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                tenant_id INTEGER NOT NULL,
                title VARCHAR(255) NOT NULL,
                slug VARCHAR(255) NOT NULL,
                content TEXT NOT NULL,
                excerpt TEXT,
                status VARCHAR(20) NOT NULL DEFAULT 'draft',
                template VARCHAR(100) NOT NULL DEFAULT 'page',
                seo_title VARCHAR(255),
                seo_description TEXT,
                author_id INTEGER,
                current_revision_id INTEGER,
                published_at TIMESTAMP,
                deleted_at TIMESTAMP,
                deleted_by INTEGER,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (tenant_id) REFERENCES tenants(id) ON DELETE CASCADE,
                FOREIGN KEY (author_id) REFERENCES admins(id) ON DELETE SET NULL
            );
            CREATE INDEX IF NOT EXISTS idx_pages_tenant_status ON pages(tenant_id, status);
            CREATE INDEX IF NOT EXISTS idx_pages_tenant_deleted ON pages(tenant_id, deleted_at);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS pages (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                tenant_id BIGINT NOT NULL,
                title VARCHAR(255) NOT NULL,
                slug VARCHAR(255) NOT NULL,
                content LONGTEXT NOT NULL,
                excerpt TEXT NULL,
                status VARCHAR(20) NOT NULL DEFAULT 'draft',
                template VARCHAR(100) NOT NULL DEFAULT 'page',
                seo_title VARCHAR(255) NULL,
                seo_description TEXT NULL,
                author_id BIGINT NULL,
                current_revision_id BIGINT NULL,
                published_at TIMESTAMP NULL,
                deleted_at TIMESTAMP NULL,
                deleted_by BIGINT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (tenant_id) REFERENCES tenants(id) ON DELETE CASCADE,
                FOREIGN KEY (author_id) REFERENCES admins(id) ON DELETE SET NULL
            );
            CREATE INDEX idx_pages_tenant_status ON pages(tenant_id, status);
            CREATE INDEX idx_pages_tenant_deleted ON pages(tenant_id, deleted_at);
        "#,
    },
    Migration {
        version: 6,
        name: "create_page_revisions",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS page_revisions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                tenant_id INTEGER NOT NULL,
                page_id INTEGER NOT NULL,
                revision_number INTEGER NOT NULL,
                revision_type VARCHAR(20) NOT NULL,
                title VARCHAR(255) NOT NULL,
                summary VARCHAR(500),
                snapshot TEXT NOT NULL,
                content_hash VARCHAR(64) NOT NULL,
                word_count INTEGER NOT NULL DEFAULT 0,
                char_count INTEGER NOT NULL DEFAULT 0,
                author_id INTEGER,
                author_name VARCHAR(150),
                ip_address VARCHAR(45),
                user_agent TEXT,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (tenant_id) REFERENCES tenants(id) ON DELETE CASCADE,
                FOREIGN KEY (page_id) REFERENCES pages(id) ON DELETE CASCADE,
                UNIQUE (page_id, revision_number)
            );
            CREATE INDEX IF NOT EXISTS idx_page_revisions_lookup ON page_revisions(tenant_id, page_id, created_at);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS page_revisions (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                tenant_id BIGINT NOT NULL,
                page_id BIGINT NOT NULL,
                revision_number BIGINT NOT NULL,
                revision_type VARCHAR(20) NOT NULL,
                title VARCHAR(255) NOT NULL,
                summary VARCHAR(500) NULL,
                snapshot LONGTEXT NOT NULL,
                content_hash VARCHAR(64) NOT NULL,
                word_count BIGINT NOT NULL DEFAULT 0,
                char_count BIGINT NOT NULL DEFAULT 0,
                author_id BIGINT NULL,
                author_name VARCHAR(150) NULL,
                ip_address VARCHAR(45) NULL,
                user_agent TEXT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (tenant_id) REFERENCES tenants(id) ON DELETE CASCADE,
                FOREIGN KEY (page_id) REFERENCES pages(id) ON DELETE CASCADE,
                UNIQUE KEY uk_page_revisions_number (page_id, revision_number)
            );
            CREATE INDEX idx_page_revisions_lookup ON page_revisions(tenant_id, page_id, created_at);
        "#,
    },
    Migration {
        version: 7,
        name: "create_blog_categories",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS blog_categories (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                tenant_id INTEGER NOT NULL,
                parent_id INTEGER,
                name VARCHAR(150) NOT NULL,
                slug VARCHAR(150) NOT NULL,
                description TEXT,
                sort_order INTEGER NOT NULL DEFAULT 0,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (tenant_id) REFERENCES tenants(id) ON DELETE CASCADE,
                FOREIGN KEY (parent_id) REFERENCES blog_categories(id) ON DELETE SET NULL,
                UNIQUE (tenant_id, slug)
            );
            CREATE INDEX IF NOT EXISTS idx_blog_categories_parent ON blog_categories(parent_id);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS blog_categories (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                tenant_id BIGINT NOT NULL,
                parent_id BIGINT NULL,
                name VARCHAR(150) NOT NULL,
                slug VARCHAR(150) NOT NULL,
                description TEXT NULL,
                sort_order INT NOT NULL DEFAULT 0,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (tenant_id) REFERENCES tenants(id) ON DELETE CASCADE,
                FOREIGN KEY (parent_id) REFERENCES blog_categories(id) ON DELETE SET NULL,
                UNIQUE KEY uk_blog_categories_slug (tenant_id, slug)
            );
            CREATE INDEX idx_blog_categories_parent ON blog_categories(parent_id);
        "#,
    },
    Migration {
        version: 8,
        name: "create_blog_tags",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS blog_tags (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                tenant_id INTEGER NOT NULL,
                name VARCHAR(100) NOT NULL,
                slug VARCHAR(100) NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (tenant_id) REFERENCES tenants(id) ON DELETE CASCADE,
                UNIQUE (tenant_id, slug)
            );
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS blog_tags (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                tenant_id BIGINT NOT NULL,
                name VARCHAR(100) NOT NULL,
                slug VARCHAR(100) NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (tenant_id) REFERENCES tenants(id) ON DELETE CASCADE,
                UNIQUE KEY uk_blog_tags_slug (tenant_id, slug)
            );
        "#,
    },
    Migration {
        version: 9,
        name: "create_blog_posts",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS blog_posts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                tenant_id INTEGER NOT NULL,
                title VARCHAR(255) NOT NULL,
                slug VARCHAR(255) NOT NULL,
                content TEXT NOT NULL,
                excerpt TEXT,
                featured_image VARCHAR(500),
                status VARCHAR(20) NOT NULL DEFAULT 'draft',
                allow_comments INTEGER NOT NULL DEFAULT 1,
                seo_title VARCHAR(255),
                seo_description TEXT,
                author_id INTEGER,
                current_revision_id INTEGER,
                published_at TIMESTAMP,
                deleted_at TIMESTAMP,
                deleted_by INTEGER,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (tenant_id) REFERENCES tenants(id) ON DELETE CASCADE,
                FOREIGN KEY (author_id) REFERENCES admins(id) ON DELETE SET NULL
            );
            CREATE INDEX IF NOT EXISTS idx_blog_posts_tenant_status ON blog_posts(tenant_id, status);
            CREATE INDEX IF NOT EXISTS idx_blog_posts_tenant_deleted ON blog_posts(tenant_id, deleted_at);
            CREATE INDEX IF NOT EXISTS idx_blog_posts_published_at ON blog_posts(published_at);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS blog_posts (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                tenant_id BIGINT NOT NULL,
                title VARCHAR(255) NOT NULL,
                slug VARCHAR(255) NOT NULL,
                content LONGTEXT NOT NULL,
                excerpt TEXT NULL,
                featured_image VARCHAR(500) NULL,
                status VARCHAR(20) NOT NULL DEFAULT 'draft',
                allow_comments TINYINT(1) NOT NULL DEFAULT 1,
                seo_title VARCHAR(255) NULL,
                seo_description TEXT NULL,
                author_id BIGINT NULL,
                current_revision_id BIGINT NULL,
                published_at TIMESTAMP NULL,
                deleted_at TIMESTAMP NULL,
                deleted_by BIGINT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (tenant_id) REFERENCES tenants(id) ON DELETE CASCADE,
                FOREIGN KEY (author_id) REFERENCES admins(id) ON DELETE SET NULL
            );
            CREATE INDEX idx_blog_posts_tenant_status ON blog_posts(tenant_id, status);
            CREATE INDEX idx_blog_posts_tenant_deleted ON blog_posts(tenant_id, deleted_at);
            CREATE INDEX idx_blog_posts_published_at ON blog_posts(published_at);
        "#,
    },
    Migration {
        version: 10,
        name: "create_blog_post_links",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS blog_post_categories (
                post_id INTEGER NOT NULL,
                category_id INTEGER NOT NULL,
                PRIMARY KEY (post_id, category_id),
                FOREIGN KEY (post_id) REFERENCES blog_posts(id) ON DELETE CASCADE,
                FOREIGN KEY (category_id) REFERENCES blog_categories(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_blog_post_categories_category ON blog_post_categories(category_id);
            CREATE TABLE IF NOT EXISTS blog_post_tags (
                post_id INTEGER NOT NULL,
                tag_id INTEGER NOT NULL,
                PRIMARY KEY (post_id, tag_id),
                FOREIGN KEY (post_id) REFERENCES blog_posts(id) ON DELETE CASCADE,
                FOREIGN KEY (tag_id) REFERENCES blog_tags(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_blog_post_tags_tag ON blog_post_tags(tag_id);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS blog_post_categories (
                post_id BIGINT NOT NULL,
                category_id BIGINT NOT NULL,
                PRIMARY KEY (post_id, category_id),
                FOREIGN KEY (post_id) REFERENCES blog_posts(id) ON DELETE CASCADE,
                FOREIGN KEY (category_id) REFERENCES blog_categories(id) ON DELETE CASCADE
            );
            CREATE INDEX idx_blog_post_categories_category ON blog_post_categories(category_id);
            CREATE TABLE IF NOT EXISTS blog_post_tags (
                post_id BIGINT NOT NULL,
                tag_id BIGINT NOT NULL,
                PRIMARY KEY (post_id, tag_id),
                FOREIGN KEY (post_id) REFERENCES blog_posts(id) ON DELETE CASCADE,
                FOREIGN KEY (tag_id) REFERENCES blog_tags(id) ON DELETE CASCADE
            );
            CREATE INDEX idx_blog_post_tags_tag ON blog_post_tags(tag_id);
        "#,
    },
    Migration {
        version: 11,
        name: "create_blog_post_revisions",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS blog_post_revisions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                tenant_id INTEGER NOT NULL,
                post_id INTEGER NOT NULL,
                revision_number INTEGER NOT NULL,
                revision_type VARCHAR(20) NOT NULL,
                title VARCHAR(255) NOT NULL,
                summary VARCHAR(500),
                snapshot TEXT NOT NULL,
                content_hash VARCHAR(64) NOT NULL,
                word_count INTEGER NOT NULL DEFAULT 0,
                char_count INTEGER NOT NULL DEFAULT 0,
                author_id INTEGER,
                author_name VARCHAR(150),
                ip_address VARCHAR(45),
                user_agent TEXT,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (tenant_id) REFERENCES tenants(id) ON DELETE CASCADE,
                FOREIGN KEY (post_id) REFERENCES blog_posts(id) ON DELETE CASCADE,
                UNIQUE (post_id, revision_number)
            );
            CREATE INDEX IF NOT EXISTS idx_blog_post_revisions_lookup ON blog_post_revisions(tenant_id, post_id, created_at);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS blog_post_revisions (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                tenant_id BIGINT NOT NULL,
                post_id BIGINT NOT NULL,
                revision_number BIGINT NOT NULL,
                revision_type VARCHAR(20) NOT NULL,
                title VARCHAR(255) NOT NULL,
                summary VARCHAR(500) NULL,
                snapshot LONGTEXT NOT NULL,
                content_hash VARCHAR(64) NOT NULL,
                word_count BIGINT NOT NULL DEFAULT 0,
                char_count BIGINT NOT NULL DEFAULT 0,
                author_id BIGINT NULL,
                author_name VARCHAR(150) NULL,
                ip_address VARCHAR(45) NULL,
                user_agent TEXT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (tenant_id) REFERENCES tenants(id) ON DELETE CASCADE,
                FOREIGN KEY (post_id) REFERENCES blog_posts(id) ON DELETE CASCADE,
                UNIQUE KEY uk_blog_post_revisions_number (post_id, revision_number)
            );
            CREATE INDEX idx_blog_post_revisions_lookup ON blog_post_revisions(tenant_id, post_id, created_at);
        "#,
    },
];

/// Run all pending migrations.
///
/// Returns the number of migrations applied.
pub async fn run_migrations(pool: &DynDatabasePool) -> Result<usize> {
    create_migrations_table(pool).await?;

    let applied = get_applied_migrations(pool).await?;
    let applied_versions: Vec<i32> = applied.iter().map(|m| m.version as i32).collect();

    let mut count = 0;

    for migration in MIGRATIONS {
        if !applied_versions.contains(&migration.version) {
            tracing::info!("Applying migration {}: {}", migration.version, migration.name);
            apply_migration(pool, migration)
                .await
                .with_context(|| format!("Failed to apply migration: {}", migration.name))?;
            count += 1;
        }
    }

    if count > 0 {
        tracing::info!("Applied {} migration(s)", count);
    } else {
        tracing::debug!("No pending migrations");
    }

    Ok(count)
}

/// Create the migrations tracking table if it doesn't exist
async fn create_migrations_table(pool: &DynDatabasePool) -> Result<()> {
    let sql = match pool.driver() {
        DatabaseDriver::Sqlite => {
            r#"
            CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                name VARCHAR(255) NOT NULL UNIQUE,
                applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#
        }
        DatabaseDriver::Mysql => {
            r#"
            CREATE TABLE IF NOT EXISTS _migrations (
                version INT PRIMARY KEY,
                name VARCHAR(255) NOT NULL UNIQUE,
                applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#
        }
    };

    pool.execute(sql).await?;
    Ok(())
}

async fn get_applied_migrations(pool: &DynDatabasePool) -> Result<Vec<MigrationRecord>> {
    match pool.driver() {
        DatabaseDriver::Sqlite => get_applied_migrations_sqlite(pool.sqlite()?).await,
        DatabaseDriver::Mysql => get_applied_migrations_mysql(pool.mysql()?).await,
    }
}

async fn get_applied_migrations_sqlite(pool: &SqlitePool) -> Result<Vec<MigrationRecord>> {
    let rows = sqlx::query("SELECT version, name, applied_at FROM _migrations ORDER BY version")
        .fetch_all(pool)
        .await?;

    Ok(rows
        .iter()
        .map(|row| MigrationRecord {
            version: row.get("version"),
            name: row.get("name"),
            applied_at: row.get("applied_at"),
        })
        .collect())
}

async fn get_applied_migrations_mysql(pool: &MySqlPool) -> Result<Vec<MigrationRecord>> {
    let rows = sqlx::query("SELECT version, name, applied_at FROM _migrations ORDER BY version")
        .fetch_all(pool)
        .await?;

    Ok(rows
        .iter()
        .map(|row| MigrationRecord {
            version: row.get::<i32, _>("version") as i64,
            name: row.get("name"),
            applied_at: row.get("applied_at"),
        })
        .collect())
}

async fn apply_migration(pool: &DynDatabasePool, migration: &Migration) -> Result<()> {
    match pool.driver() {
        DatabaseDriver::Sqlite => apply_migration_sqlite(pool.sqlite()?, migration).await,
        DatabaseDriver::Mysql => apply_migration_mysql(pool.mysql()?, migration).await,
    }
}

async fn apply_migration_sqlite(pool: &SqlitePool, migration: &Migration) -> Result<()> {
    for statement in split_sql_statements(migration.up_sqlite) {
        sqlx::query(statement)
            .execute(pool)
            .await
            .with_context(|| format!("Failed to execute: {}", truncate_sql(statement)))?;
    }

    sqlx::query("INSERT INTO _migrations (version, name) VALUES (?, ?)")
        .bind(migration.version)
        .bind(migration.name)
        .execute(pool)
        .await?;

    Ok(())
}

async fn apply_migration_mysql(pool: &MySqlPool, migration: &Migration) -> Result<()> {
    for statement in split_sql_statements(migration.up_mysql) {
        sqlx::query(statement)
            .execute(pool)
            .await
            .with_context(|| format!("Failed to execute: {}", truncate_sql(statement)))?;
    }

    sqlx::query("INSERT INTO _migrations (version, name) VALUES (?, ?)")
        .bind(migration.version)
        .bind(migration.name)
        .execute(pool)
        .await?;

    Ok(())
}

/// Truncate SQL for error messages
fn truncate_sql(sql: &str) -> String {
    match sql.char_indices().nth(100) {
        Some((idx, _)) => format!("{}...", &sql[..idx]),
        None => sql.to_string(),
    }
}

/// Split SQL into individual statements, skipping comment-only fragments
fn split_sql_statements(sql: &str) -> Vec<&str> {
    sql.split(';')
        .map(str::trim)
        .filter(|stmt| !stmt.is_empty() && !is_comment_only(stmt))
        .collect()
}

/// Check if a string contains only SQL comments
fn is_comment_only(s: &str) -> bool {
    s.lines()
        .map(str::trim)
        .all(|line| line.is_empty() || line.starts_with("--"))
}

/// Check if migrations are up to date
pub async fn is_up_to_date(pool: &DynDatabasePool) -> Result<bool> {
    create_migrations_table(pool).await?;
    let applied = get_applied_migrations(pool).await?;
    Ok(applied.len() == MIGRATIONS.len())
}

/// Get pending migrations count
pub async fn pending_count(pool: &DynDatabasePool) -> Result<usize> {
    create_migrations_table(pool).await?;
    let applied = get_applied_migrations(pool).await?;
    Ok(MIGRATIONS.len().saturating_sub(applied.len()))
}

/// Get migration by version
pub fn get_migration(version: i32) -> Option<&'static Migration> {
    MIGRATIONS.iter().find(|m| m.version == version)
}
