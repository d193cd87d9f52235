//! Session repository
//!
//! Admin login sessions keyed by their opaque token.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::Session;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;
use std::sync::Arc;

#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn create(&self, session: &Session) -> Result<Session>;
    /// Look up a session by token, expired or not
    async fn get_by_id(&self, id: &str) -> Result<Option<Session>>;
    async fn delete(&self, id: &str) -> Result<()>;
    async fn delete_by_admin(&self, admin_id: i64) -> Result<()>;
    /// Remove expired sessions; returns how many were removed
    async fn delete_expired(&self) -> Result<u64>;
}

pub struct SqlxSessionRepository {
    pool: DynDatabasePool,
}

impl SqlxSessionRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn SessionRepository> {
        Arc::new(Self::new(pool))
    }

    async fn execute(&self, sql: &str, bind: SessionKey<'_>) -> Result<u64> {
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let query = sqlx::query(sql);
                let query = match bind {
                    SessionKey::Token(id) => query.bind(id.to_string()),
                    SessionKey::Admin(id) => query.bind(id),
                    SessionKey::Now => query.bind(Utc::now()),
                };
                query.execute(self.pool.sqlite()?).await?.rows_affected()
            }
            DatabaseDriver::Mysql => {
                let query = sqlx::query(sql);
                let query = match bind {
                    SessionKey::Token(id) => query.bind(id.to_string()),
                    SessionKey::Admin(id) => query.bind(id),
                    SessionKey::Now => query.bind(Utc::now()),
                };
                query.execute(self.pool.mysql()?).await?.rows_affected()
            }
        };
        Ok(affected)
    }
}

/// Single parameter of the delete statements
enum SessionKey<'a> {
    Token(&'a str),
    Admin(i64),
    Now,
}

const SELECT_SESSION: &str = "SELECT id, admin_id, expires_at, created_at FROM sessions WHERE id = ?";

#[async_trait]
impl SessionRepository for SqlxSessionRepository {
    async fn create(&self, session: &Session) -> Result<Session> {
        let sql = "INSERT INTO sessions (id, admin_id, expires_at, created_at) VALUES (?, ?, ?, ?)";
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query(sql)
                    .bind(&session.id)
                    .bind(session.admin_id)
                    .bind(session.expires_at)
                    .bind(session.created_at)
                    .execute(self.pool.sqlite()?)
                    .await
                    .context("Failed to create session")?;
            }
            DatabaseDriver::Mysql => {
                sqlx::query(sql)
                    .bind(&session.id)
                    .bind(session.admin_id)
                    .bind(session.expires_at)
                    .bind(session.created_at)
                    .execute(self.pool.mysql()?)
                    .await
                    .context("Failed to create session")?;
            }
        }
        Ok(session.clone())
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Session>> {
        let session = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(SELECT_SESSION)
                .bind(id)
                .fetch_optional(self.pool.sqlite()?)
                .await
                .context("Failed to get session")?
                .map(|row| Session {
                    id: row.get("id"),
                    admin_id: row.get("admin_id"),
                    expires_at: row.get("expires_at"),
                    created_at: row.get("created_at"),
                }),
            DatabaseDriver::Mysql => sqlx::query(SELECT_SESSION)
                .bind(id)
                .fetch_optional(self.pool.mysql()?)
                .await
                .context("Failed to get session")?
                .map(|row| Session {
                    id: row.get("id"),
                    admin_id: row.get("admin_id"),
                    expires_at: row.get("expires_at"),
                    created_at: row.get("created_at"),
                }),
        };
        Ok(session)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.execute("DELETE FROM sessions WHERE id = ?", SessionKey::Token(id))
            .await
            .context("Failed to delete session")?;
        Ok(())
    }

    async fn delete_by_admin(&self, admin_id: i64) -> Result<()> {
        self.execute("DELETE FROM sessions WHERE admin_id = ?", SessionKey::Admin(admin_id))
            .await
            .context("Failed to delete admin sessions")?;
        Ok(())
    }

    async fn delete_expired(&self) -> Result<u64> {
        self.execute("DELETE FROM sessions WHERE expires_at < ?", SessionKey::Now)
            .await
            .context("Failed to delete expired sessions")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::{insert_admin, setup_pool};
    use chrono::Duration;
    use uuid::Uuid;

    fn session_for(admin_id: i64, expires_in_days: i64) -> Session {
        let now = Utc::now();
        Session {
            id: Uuid::new_v4().to_string(),
            admin_id,
            expires_at: now + Duration::days(expires_in_days),
            created_at: now,
        }
    }

    #[tokio::test]
    async fn test_create_get_delete() {
        let pool = setup_pool().await;
        let admin_id = insert_admin(&pool, None, "root@x.test").await;
        let repo = SqlxSessionRepository::new(pool);

        let session = session_for(admin_id, 7);
        repo.create(&session).await.unwrap();

        let found = repo.get_by_id(&session.id).await.unwrap().expect("session");
        assert_eq!(found.admin_id, admin_id);
        assert!(!found.is_expired());

        repo.delete(&session.id).await.unwrap();
        assert!(repo.get_by_id(&session.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_by_admin() {
        let pool = setup_pool().await;
        let a = insert_admin(&pool, None, "a@x.test").await;
        let b = insert_admin(&pool, None, "b@x.test").await;
        let repo = SqlxSessionRepository::new(pool);

        let s1 = session_for(a, 7);
        let s2 = session_for(b, 7);
        repo.create(&s1).await.unwrap();
        repo.create(&s2).await.unwrap();

        repo.delete_by_admin(a).await.unwrap();
        assert!(repo.get_by_id(&s1.id).await.unwrap().is_none());
        assert!(repo.get_by_id(&s2.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_delete_expired() {
        let pool = setup_pool().await;
        let a = insert_admin(&pool, None, "a@x.test").await;
        let repo = SqlxSessionRepository::new(pool);

        let now = Utc::now();
        let expired = Session {
            id: Uuid::new_v4().to_string(),
            admin_id: a,
            expires_at: now - Duration::days(1),
            created_at: now - Duration::days(8),
        };
        let valid = session_for(a, 7);
        repo.create(&expired).await.unwrap();
        repo.create(&valid).await.unwrap();

        assert_eq!(repo.delete_expired().await.unwrap(), 1);
        assert!(repo.get_by_id(&expired.id).await.unwrap().is_none());
        assert!(repo.get_by_id(&valid.id).await.unwrap().is_some());
    }
}
