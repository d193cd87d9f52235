//! Admin repository
//!
//! Superadmins are stored with a NULL `tenant_id`; every lookup takes the
//! tenant scope explicitly so an email is only unique within its scope.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::Admin;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

/// Returned when the email is already registered in the admin's scope
#[derive(Debug, thiserror::Error)]
#[error("Email '{email}' is already registered")]
pub struct EmailTaken {
    pub email: String,
}

const ADMIN_COLUMNS: &str =
    "id, tenant_id, name, email, password_hash, role, active, last_login_at, created_at, updated_at";

#[async_trait]
pub trait AdminRepository: Send + Sync {
    async fn create(&self, admin: &Admin) -> Result<Admin>;
    async fn get_by_id(&self, id: i64) -> Result<Option<Admin>>;
    /// Find an admin by email within a tenant, or among superadmins for `None`
    async fn get_by_email(&self, tenant_id: Option<i64>, email: &str) -> Result<Option<Admin>>;
    async fn list_by_tenant(&self, tenant_id: Option<i64>) -> Result<Vec<Admin>>;
    async fn delete(&self, id: i64) -> Result<bool>;
    async fn touch_last_login(&self, id: i64) -> Result<()>;
    async fn count(&self) -> Result<i64>;
}

pub struct SqlxAdminRepository {
    pool: DynDatabasePool,
}

impl SqlxAdminRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn AdminRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl AdminRepository for SqlxAdminRepository {
    async fn create(&self, admin: &Admin) -> Result<Admin> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => create_sqlite(self.pool.sqlite()?, admin).await,
            DatabaseDriver::Mysql => create_mysql(self.pool.mysql()?, admin).await,
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Admin>> {
        let sql = format!("SELECT {} FROM admins WHERE id = ?", ADMIN_COLUMNS);
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let row = sqlx::query(&sql)
                    .bind(id)
                    .fetch_optional(self.pool.sqlite()?)
                    .await
                    .context("Failed to get admin")?;
                row.map(|r| row_to_admin_sqlite(&r)).transpose()
            }
            DatabaseDriver::Mysql => {
                let row = sqlx::query(&sql)
                    .bind(id)
                    .fetch_optional(self.pool.mysql()?)
                    .await
                    .context("Failed to get admin")?;
                row.map(|r| row_to_admin_mysql(&r)).transpose()
            }
        }
    }

    async fn get_by_email(&self, tenant_id: Option<i64>, email: &str) -> Result<Option<Admin>> {
        let sql = match tenant_id {
            Some(_) => format!("SELECT {} FROM admins WHERE email = ? AND tenant_id = ?", ADMIN_COLUMNS),
            None => format!("SELECT {} FROM admins WHERE email = ? AND tenant_id IS NULL", ADMIN_COLUMNS),
        };
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let mut query = sqlx::query(&sql).bind(email);
                if let Some(tenant_id) = tenant_id {
                    query = query.bind(tenant_id);
                }
                let row = query
                    .fetch_optional(self.pool.sqlite()?)
                    .await
                    .context("Failed to get admin by email")?;
                row.map(|r| row_to_admin_sqlite(&r)).transpose()
            }
            DatabaseDriver::Mysql => {
                let mut query = sqlx::query(&sql).bind(email);
                if let Some(tenant_id) = tenant_id {
                    query = query.bind(tenant_id);
                }
                let row = query
                    .fetch_optional(self.pool.mysql()?)
                    .await
                    .context("Failed to get admin by email")?;
                row.map(|r| row_to_admin_mysql(&r)).transpose()
            }
        }
    }

    async fn list_by_tenant(&self, tenant_id: Option<i64>) -> Result<Vec<Admin>> {
        let sql = match tenant_id {
            Some(_) => format!("SELECT {} FROM admins WHERE tenant_id = ? ORDER BY name, id", ADMIN_COLUMNS),
            None => format!("SELECT {} FROM admins WHERE tenant_id IS NULL ORDER BY name, id", ADMIN_COLUMNS),
        };
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let mut query = sqlx::query(&sql);
                if let Some(tenant_id) = tenant_id {
                    query = query.bind(tenant_id);
                }
                let rows = query
                    .fetch_all(self.pool.sqlite()?)
                    .await
                    .context("Failed to list admins")?;
                rows.iter().map(row_to_admin_sqlite).collect()
            }
            DatabaseDriver::Mysql => {
                let mut query = sqlx::query(&sql);
                if let Some(tenant_id) = tenant_id {
                    query = query.bind(tenant_id);
                }
                let rows = query
                    .fetch_all(self.pool.mysql()?)
                    .await
                    .context("Failed to list admins")?;
                rows.iter().map(row_to_admin_mysql).collect()
            }
        }
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query("DELETE FROM admins WHERE id = ?")
                .bind(id)
                .execute(self.pool.sqlite()?)
                .await
                .context("Failed to delete admin")?
                .rows_affected(),
            DatabaseDriver::Mysql => sqlx::query("DELETE FROM admins WHERE id = ?")
                .bind(id)
                .execute(self.pool.mysql()?)
                .await
                .context("Failed to delete admin")?
                .rows_affected(),
        };
        Ok(affected > 0)
    }

    async fn touch_last_login(&self, id: i64) -> Result<()> {
        let sql = "UPDATE admins SET last_login_at = ? WHERE id = ?";
        let now = Utc::now();
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query(sql)
                    .bind(now)
                    .bind(id)
                    .execute(self.pool.sqlite()?)
                    .await
                    .context("Failed to record admin login")?;
            }
            DatabaseDriver::Mysql => {
                sqlx::query(sql)
                    .bind(now)
                    .bind(id)
                    .execute(self.pool.mysql()?)
                    .await
                    .context("Failed to record admin login")?;
            }
        }
        Ok(())
    }

    async fn count(&self) -> Result<i64> {
        let sql = "SELECT COUNT(*) AS count FROM admins";
        let count: i64 = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .fetch_one(self.pool.sqlite()?)
                .await
                .context("Failed to count admins")?
                .get("count"),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .fetch_one(self.pool.mysql()?)
                .await
                .context("Failed to count admins")?
                .get("count"),
        };
        Ok(count)
    }
}

const INSERT_ADMIN: &str = r#"
    INSERT INTO admins (tenant_id, name, email, password_hash, role, active, created_at, updated_at)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?)
"#;

async fn create_sqlite(pool: &SqlitePool, admin: &Admin) -> Result<Admin> {
    let now = Utc::now();
    let result = sqlx::query(INSERT_ADMIN)
        .bind(admin.tenant_id)
        .bind(&admin.name)
        .bind(&admin.email)
        .bind(&admin.password_hash)
        .bind(admin.role.as_str())
        .bind(admin.active)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await
        .map_err(|e| email_conflict(e, admin))?;

    Ok(Admin {
        id: result.last_insert_rowid(),
        created_at: now,
        updated_at: now,
        ..admin.clone()
    })
}

async fn create_mysql(pool: &MySqlPool, admin: &Admin) -> Result<Admin> {
    let now = Utc::now();
    let result = sqlx::query(INSERT_ADMIN)
        .bind(admin.tenant_id)
        .bind(&admin.name)
        .bind(&admin.email)
        .bind(&admin.password_hash)
        .bind(admin.role.as_str())
        .bind(admin.active)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await
        .map_err(|e| email_conflict(e, admin))?;

    Ok(Admin {
        id: result.last_insert_id() as i64,
        created_at: now,
        updated_at: now,
        ..admin.clone()
    })
}

/// Surface a unique-index hit as [`EmailTaken`]
fn email_conflict(err: sqlx::Error, admin: &Admin) -> anyhow::Error {
    match err.as_database_error() {
        Some(db) if db.is_unique_violation() => EmailTaken {
            email: admin.email.clone(),
        }
        .into(),
        _ => anyhow::Error::new(err).context("Failed to create admin"),
    }
}

fn row_to_admin_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<Admin> {
    let role: String = row.get("role");
    Ok(Admin {
        id: row.get("id"),
        tenant_id: row.get("tenant_id"),
        name: row.get("name"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        role: role.parse()?,
        active: row.get("active"),
        last_login_at: row.get("last_login_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn row_to_admin_mysql(row: &sqlx::mysql::MySqlRow) -> Result<Admin> {
    let role: String = row.get("role");
    Ok(Admin {
        id: row.get("id"),
        tenant_id: row.get("tenant_id"),
        name: row.get("name"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        role: role.parse()?,
        active: row.get("active"),
        last_login_at: row.get("last_login_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::{insert_tenant, setup_pool};
    use crate::models::AdminRole;

    #[tokio::test]
    async fn test_email_lookup_is_scoped() {
        let pool = setup_pool().await;
        let t1 = insert_tenant(&pool, "one.test").await;
        let t2 = insert_tenant(&pool, "two.test").await;
        let repo = SqlxAdminRepository::new(pool);

        let root = Admin::new(None, "Root".into(), "root@x.test".into(), "h".into(), AdminRole::Superadmin);
        repo.create(&root).await.unwrap();
        let ann = Admin::new(Some(t1), "Ann".into(), "ann@x.test".into(), "h".into(), AdminRole::Admin);
        let ann = repo.create(&ann).await.unwrap();

        assert!(repo.get_by_email(None, "root@x.test").await.unwrap().is_some());
        assert!(repo.get_by_email(Some(t1), "root@x.test").await.unwrap().is_none());
        assert_eq!(repo.get_by_email(Some(t1), "ann@x.test").await.unwrap().unwrap().id, ann.id);
        assert!(repo.get_by_email(Some(t2), "ann@x.test").await.unwrap().is_none());
        assert!(repo.get_by_email(None, "ann@x.test").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_touch_and_delete() {
        let pool = setup_pool().await;
        let t1 = insert_tenant(&pool, "one.test").await;
        let repo = SqlxAdminRepository::new(pool);

        let ed = Admin::new(Some(t1), "Ed".into(), "ed@x.test".into(), "h".into(), AdminRole::Editor);
        let ed = repo.create(&ed).await.unwrap();
        assert_eq!(repo.list_by_tenant(Some(t1)).await.unwrap().len(), 1);
        assert!(repo.list_by_tenant(None).await.unwrap().is_empty());

        repo.touch_last_login(ed.id).await.unwrap();
        let loaded = repo.get_by_id(ed.id).await.unwrap().unwrap();
        assert!(loaded.last_login_at.is_some());
        assert_eq!(loaded.role, AdminRole::Editor);
        assert!(loaded.active);

        assert!(repo.delete(ed.id).await.unwrap());
        assert_eq!(repo.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_email_in_scope_is_rejected_by_schema() {
        let pool = setup_pool().await;
        let t1 = insert_tenant(&pool, "one.test").await;
        let t2 = insert_tenant(&pool, "two.test").await;
        let repo = SqlxAdminRepository::new(pool);

        let admin = |tenant_id| Admin::new(tenant_id, "Dup".into(), "dup@x.test".into(), "h".into(), AdminRole::Admin);
        repo.create(&admin(Some(t1))).await.unwrap();
        let err = repo.create(&admin(Some(t1))).await.unwrap_err();
        assert!(err.downcast_ref::<EmailTaken>().is_some());

        // Other scopes are independent
        repo.create(&admin(Some(t2))).await.unwrap();
        let root = Admin::new(None, "Root".into(), "dup@x.test".into(), "h".into(), AdminRole::Superadmin);
        repo.create(&root).await.unwrap();
        let err = repo.create(&root).await.unwrap_err();
        assert!(err.downcast_ref::<EmailTaken>().is_some());
    }

    #[tokio::test]
    async fn test_unknown_role_is_an_error() {
        let pool = setup_pool().await;
        let t1 = insert_tenant(&pool, "one.test").await;
        let repo = SqlxAdminRepository::new(pool.clone());
        let ed = Admin::new(Some(t1), "Ed".into(), "ed@x.test".into(), "h".into(), AdminRole::Editor);
        let ed = repo.create(&ed).await.unwrap();

        sqlx::query("UPDATE admins SET role = 'owner' WHERE id = ?")
            .bind(ed.id)
            .execute(pool.sqlite().unwrap())
            .await
            .unwrap();
        assert!(repo.get_by_id(ed.id).await.is_err());
    }
}
