//! Admin authentication and account management
//!
//! Superadmins (no tenant) sign in to the platform panel; tenant admins
//! and editors sign in to the panel of their own tenant. Every lookup
//! carries the tenant scope, so an email only identifies an account
//! inside one scope.

use crate::config::BootstrapAdmin;
use crate::db::repositories::{AdminRepository, EmailTaken, SessionRepository};
use crate::models::{Admin, AdminRole, CreateAdminInput, Session};
use crate::services::password::{hash_password, validate_password, verify_password};
use crate::services::rate_limiter::{LoginRateLimiter, RateLimited};
use anyhow::Context;
use chrono::{Duration, Utc};
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Too many login attempts, retry in {retry_after_secs} seconds")]
    RateLimited { retry_after_secs: i64 },

    #[error("Account is disabled")]
    AccountDisabled,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

impl From<RateLimited> for AuthError {
    fn from(limited: RateLimited) -> Self {
        AuthError::RateLimited {
            retry_after_secs: limited.retry_after_secs,
        }
    }
}

/// Credentials posted to a login endpoint
#[derive(Debug, Clone, serde::Deserialize)]
pub struct LoginInput {
    pub email: String,
    pub password: String,
}

pub struct AuthService {
    admins: Arc<dyn AdminRepository>,
    sessions: Arc<dyn SessionRepository>,
    limiter: Arc<LoginRateLimiter>,
    session_days: i64,
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn validate_email(email: &str) -> Result<(), AuthError> {
    let valid = match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.starts_with('.'),
        None => false,
    };
    if valid && !email.contains(char::is_whitespace) {
        Ok(())
    } else {
        Err(AuthError::ValidationError(format!("Invalid email address: {}", email)))
    }
}

impl AuthService {
    pub fn new(
        admins: Arc<dyn AdminRepository>,
        sessions: Arc<dyn SessionRepository>,
        limiter: Arc<LoginRateLimiter>,
        session_days: i64,
    ) -> Self {
        Self {
            admins,
            sessions,
            limiter,
            session_days,
        }
    }

    pub fn limiter(&self) -> &Arc<LoginRateLimiter> {
        &self.limiter
    }

    /// Sign in within a scope (`None` for superadmins) and open a session
    pub async fn login(
        &self,
        tenant_id: Option<i64>,
        input: &LoginInput,
        ip: Option<IpAddr>,
    ) -> Result<(Session, Admin), AuthError> {
        let email = normalize_email(&input.email);
        if let Some(ip) = ip {
            self.limiter.check_ip(ip).await?;
        }
        self.limiter.check_account(tenant_id, &email).await?;

        let admin = self
            .admins
            .get_by_email(tenant_id, &email)
            .await
            .context("Failed to look up admin")?;
        let admin = match admin {
            Some(admin) if verify_password(&input.password, &admin.password_hash).unwrap_or(false) => admin,
            _ => {
                self.limiter.record_failure(tenant_id, &email).await;
                warn!(tenant_id = ?tenant_id, email = %email, "Failed login attempt");
                return Err(AuthError::InvalidCredentials);
            }
        };
        if !admin.active {
            return Err(AuthError::AccountDisabled);
        }

        self.limiter.clear_account(tenant_id, &email).await;
        let now = Utc::now();
        let session = Session {
            id: Uuid::new_v4().to_string(),
            admin_id: admin.id,
            expires_at: now + Duration::days(self.session_days),
            created_at: now,
        };
        let session = self.sessions.create(&session).await.context("Failed to create session")?;
        self.admins
            .touch_last_login(admin.id)
            .await
            .context("Failed to record login")?;

        info!(admin_id = admin.id, tenant_id = ?tenant_id, "Admin signed in");
        Ok((session, admin))
    }

    pub async fn logout(&self, token: &str) -> Result<(), AuthError> {
        self.sessions.delete(token).await.context("Failed to delete session")?;
        Ok(())
    }

    /// Admin behind a live session token; expired sessions are removed
    pub async fn validate_session(&self, token: &str) -> Result<Option<Admin>, AuthError> {
        let session = match self.sessions.get_by_id(token).await.context("Failed to get session")? {
            Some(session) => session,
            None => return Ok(None),
        };
        if session.is_expired() {
            self.sessions.delete(token).await.context("Failed to delete session")?;
            return Ok(None);
        }
        let admin = self
            .admins
            .get_by_id(session.admin_id)
            .await
            .context("Failed to get admin")?;
        Ok(admin.filter(|a| a.active))
    }

    /// Create the configured superadmin when the platform has none yet
    pub async fn bootstrap_superadmin(&self, bootstrap: &BootstrapAdmin) -> Result<Option<Admin>, AuthError> {
        let existing = self
            .admins
            .list_by_tenant(None)
            .await
            .context("Failed to list superadmins")?;
        if !existing.is_empty() {
            return Ok(None);
        }

        let input = CreateAdminInput {
            name: bootstrap.name.clone(),
            email: bootstrap.email.clone(),
            password: bootstrap.password.clone(),
            role: Some(AdminRole::Superadmin),
        };
        let admin = self.create_admin(None, input).await?;
        info!(admin_id = admin.id, email = %admin.email, "Bootstrapped superadmin");
        Ok(Some(admin))
    }

    /// Create an account in a scope.
    ///
    /// Superadmin accounts only exist without a tenant, and tenant accounts
    /// default to the `admin` role.
    pub async fn create_admin(&self, tenant_id: Option<i64>, input: CreateAdminInput) -> Result<Admin, AuthError> {
        let name = input.name.trim().to_string();
        if name.is_empty() {
            return Err(AuthError::ValidationError("Name cannot be empty".to_string()));
        }
        let email = normalize_email(&input.email);
        validate_email(&email)?;
        validate_password(&input.password).map_err(AuthError::ValidationError)?;

        let role = match (tenant_id, input.role) {
            (None, None | Some(AdminRole::Superadmin)) => AdminRole::Superadmin,
            (None, Some(_)) => {
                return Err(AuthError::ValidationError(
                    "Platform accounts must be superadmins".to_string(),
                ))
            }
            (Some(_), Some(AdminRole::Superadmin)) => {
                return Err(AuthError::ValidationError(
                    "Tenant accounts cannot be superadmins".to_string(),
                ))
            }
            (Some(_), role) => role.unwrap_or(AdminRole::Admin),
        };

        if self
            .admins
            .get_by_email(tenant_id, &email)
            .await
            .context("Failed to check email")?
            .is_some()
        {
            return Err(AuthError::Conflict(format!("Email '{}' is already registered", email)));
        }

        let hash = hash_password(&input.password)?;
        let admin = Admin::new(tenant_id, name, email, hash, role);
        self.admins.create(&admin).await.map_err(|err| match err.downcast_ref::<EmailTaken>() {
            Some(taken) => AuthError::Conflict(taken.to_string()),
            None => AuthError::InternalError(err),
        })
    }

    pub async fn list_admins(&self, tenant_id: Option<i64>) -> Result<Vec<Admin>, AuthError> {
        Ok(self.admins.list_by_tenant(tenant_id).await.context("Failed to list admins")?)
    }

    /// Delete an account of `tenant_id` and end its sessions
    pub async fn delete_admin(&self, tenant_id: i64, admin_id: i64) -> Result<(), AuthError> {
        let admin = self
            .admins
            .get_by_id(admin_id)
            .await
            .context("Failed to get admin")?
            .filter(|a| a.tenant_id == Some(tenant_id))
            .ok_or_else(|| AuthError::NotFound(format!("Admin {} not found", admin_id)))?;

        self.sessions
            .delete_by_admin(admin.id)
            .await
            .context("Failed to end admin sessions")?;
        self.admins.delete(admin.id).await.context("Failed to delete admin")?;
        info!(admin_id, tenant_id, "Deleted admin");
        Ok(())
    }

    pub async fn cleanup_expired_sessions(&self) -> Result<u64, AuthError> {
        Ok(self
            .sessions
            .delete_expired()
            .await
            .context("Failed to delete expired sessions")?)
    }
}
