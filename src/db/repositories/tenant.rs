//! Tenant repository

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::Tenant;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

const TENANT_COLUMNS: &str = "id, name, domain, status, created_at, updated_at";

#[async_trait]
pub trait TenantRepository: Send + Sync {
    async fn create(&self, tenant: &Tenant) -> Result<Tenant>;
    async fn get_by_id(&self, id: i64) -> Result<Option<Tenant>>;
    async fn get_by_domain(&self, domain: &str) -> Result<Option<Tenant>>;
    async fn list(&self) -> Result<Vec<Tenant>>;
    async fn update(&self, tenant: &Tenant) -> Result<Tenant>;
    /// Delete a tenant and, through foreign keys, all of its rows
    async fn delete(&self, id: i64) -> Result<bool>;
    async fn exists_by_domain(&self, domain: &str, exclude_id: Option<i64>) -> Result<bool>;
    async fn count(&self) -> Result<i64>;
}

pub struct SqlxTenantRepository {
    pool: DynDatabasePool,
}

impl SqlxTenantRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn TenantRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl TenantRepository for SqlxTenantRepository {
    async fn create(&self, tenant: &Tenant) -> Result<Tenant> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => create_sqlite(self.pool.sqlite()?, tenant).await,
            DatabaseDriver::Mysql => create_mysql(self.pool.mysql()?, tenant).await,
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Tenant>> {
        let sql = format!("SELECT {} FROM tenants WHERE id = ?", TENANT_COLUMNS);
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let row = sqlx::query(&sql)
                    .bind(id)
                    .fetch_optional(self.pool.sqlite()?)
                    .await
                    .context("Failed to get tenant")?;
                row.map(|r| row_to_tenant_sqlite(&r)).transpose()
            }
            DatabaseDriver::Mysql => {
                let row = sqlx::query(&sql)
                    .bind(id)
                    .fetch_optional(self.pool.mysql()?)
                    .await
                    .context("Failed to get tenant")?;
                row.map(|r| row_to_tenant_mysql(&r)).transpose()
            }
        }
    }

    async fn get_by_domain(&self, domain: &str) -> Result<Option<Tenant>> {
        let sql = format!("SELECT {} FROM tenants WHERE domain = ?", TENANT_COLUMNS);
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let row = sqlx::query(&sql)
                    .bind(domain)
                    .fetch_optional(self.pool.sqlite()?)
                    .await
                    .context("Failed to get tenant by domain")?;
                row.map(|r| row_to_tenant_sqlite(&r)).transpose()
            }
            DatabaseDriver::Mysql => {
                let row = sqlx::query(&sql)
                    .bind(domain)
                    .fetch_optional(self.pool.mysql()?)
                    .await
                    .context("Failed to get tenant by domain")?;
                row.map(|r| row_to_tenant_mysql(&r)).transpose()
            }
        }
    }

    async fn list(&self) -> Result<Vec<Tenant>> {
        let sql = format!("SELECT {} FROM tenants ORDER BY name, id", TENANT_COLUMNS);
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let rows = sqlx::query(&sql)
                    .fetch_all(self.pool.sqlite()?)
                    .await
                    .context("Failed to list tenants")?;
                rows.iter().map(row_to_tenant_sqlite).collect()
            }
            DatabaseDriver::Mysql => {
                let rows = sqlx::query(&sql)
                    .fetch_all(self.pool.mysql()?)
                    .await
                    .context("Failed to list tenants")?;
                rows.iter().map(row_to_tenant_mysql).collect()
            }
        }
    }

    async fn update(&self, tenant: &Tenant) -> Result<Tenant> {
        let sql = "UPDATE tenants SET name = ?, domain = ?, status = ?, updated_at = ? WHERE id = ?";
        let now = Utc::now();
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query(sql)
                    .bind(&tenant.name)
                    .bind(&tenant.domain)
                    .bind(tenant.status.as_str())
                    .bind(now)
                    .bind(tenant.id)
                    .execute(self.pool.sqlite()?)
                    .await
                    .context("Failed to update tenant")?;
            }
            DatabaseDriver::Mysql => {
                sqlx::query(sql)
                    .bind(&tenant.name)
                    .bind(&tenant.domain)
                    .bind(tenant.status.as_str())
                    .bind(now)
                    .bind(tenant.id)
                    .execute(self.pool.mysql()?)
                    .await
                    .context("Failed to update tenant")?;
            }
        }
        self.get_by_id(tenant.id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Tenant not found after update"))
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query("DELETE FROM tenants WHERE id = ?")
                .bind(id)
                .execute(self.pool.sqlite()?)
                .await
                .context("Failed to delete tenant")?
                .rows_affected(),
            DatabaseDriver::Mysql => sqlx::query("DELETE FROM tenants WHERE id = ?")
                .bind(id)
                .execute(self.pool.mysql()?)
                .await
                .context("Failed to delete tenant")?
                .rows_affected(),
        };
        Ok(affected > 0)
    }

    async fn exists_by_domain(&self, domain: &str, exclude_id: Option<i64>) -> Result<bool> {
        let sql = "SELECT COUNT(*) AS count FROM tenants WHERE domain = ? AND id != ?";
        let exclude = exclude_id.unwrap_or(0);
        let count: i64 = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(domain)
                .bind(exclude)
                .fetch_one(self.pool.sqlite()?)
                .await
                .context("Failed to check tenant domain")?
                .get("count"),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(domain)
                .bind(exclude)
                .fetch_one(self.pool.mysql()?)
                .await
                .context("Failed to check tenant domain")?
                .get("count"),
        };
        Ok(count > 0)
    }

    async fn count(&self) -> Result<i64> {
        let sql = "SELECT COUNT(*) AS count FROM tenants";
        let count: i64 = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .fetch_one(self.pool.sqlite()?)
                .await
                .context("Failed to count tenants")?
                .get("count"),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .fetch_one(self.pool.mysql()?)
                .await
                .context("Failed to count tenants")?
                .get("count"),
        };
        Ok(count)
    }
}

async fn create_sqlite(pool: &SqlitePool, tenant: &Tenant) -> Result<Tenant> {
    let now = Utc::now();
    let result = sqlx::query(
        "INSERT INTO tenants (name, domain, status, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&tenant.name)
    .bind(&tenant.domain)
    .bind(tenant.status.as_str())
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create tenant")?;

    Ok(Tenant {
        id: result.last_insert_rowid(),
        created_at: now,
        updated_at: now,
        ..tenant.clone()
    })
}

async fn create_mysql(pool: &MySqlPool, tenant: &Tenant) -> Result<Tenant> {
    let now = Utc::now();
    let result = sqlx::query(
        "INSERT INTO tenants (name, domain, status, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&tenant.name)
    .bind(&tenant.domain)
    .bind(tenant.status.as_str())
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create tenant")?;

    Ok(Tenant {
        id: result.last_insert_id() as i64,
        created_at: now,
        updated_at: now,
        ..tenant.clone()
    })
}

fn row_to_tenant_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<Tenant> {
    let status: String = row.get("status");
    Ok(Tenant {
        id: row.get("id"),
        name: row.get("name"),
        domain: row.get("domain"),
        status: status.parse()?,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn row_to_tenant_mysql(row: &sqlx::mysql::MySqlRow) -> Result<Tenant> {
    let status: String = row.get("status");
    Ok(Tenant {
        id: row.get("id"),
        name: row.get("name"),
        domain: row.get("domain"),
        status: status.parse()?,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}
