//! Admin model
//!
//! Admins sign in to either the superadmin panel (`tenant_id` is `None`)
//! or the admin panel of a single tenant.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Administrator account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Admin {
    pub id: i64,
    /// Owning tenant, `None` for platform superadmins
    pub tenant_id: Option<i64>,
    pub name: String,
    pub email: String,
    /// Password hash (argon2)
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub role: AdminRole,
    pub active: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Admin {
    /// Build an admin that has not been stored yet.
    ///
    /// The password must already be hashed with `services::password::hash_password`.
    pub fn new(tenant_id: Option<i64>, name: String, email: String, password_hash: String, role: AdminRole) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            tenant_id,
            name,
            email,
            password_hash,
            role,
            active: true,
            last_login_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_superadmin(&self) -> bool {
        self.role == AdminRole::Superadmin && self.tenant_id.is_none()
    }

    /// Whether this admin may manage content of the given tenant
    pub fn can_access_tenant(&self, tenant_id: i64) -> bool {
        self.is_superadmin() || self.tenant_id == Some(tenant_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdminRole {
    /// Platform operator, manages tenants
    Superadmin,
    /// Full control over one tenant
    Admin,
    /// Content editing within one tenant
    Editor,
}

impl Default for AdminRole {
    fn default() -> Self {
        Self::Admin
    }
}

impl AdminRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdminRole::Superadmin => "superadmin",
            AdminRole::Admin => "admin",
            AdminRole::Editor => "editor",
        }
    }
}

impl fmt::Display for AdminRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AdminRole {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "superadmin" => Ok(AdminRole::Superadmin),
            "admin" => Ok(AdminRole::Admin),
            "editor" => Ok(AdminRole::Editor),
            _ => Err(anyhow::anyhow!("Invalid admin role: {}", s)),
        }
    }
}

/// Input for creating a tenant admin
#[derive(Debug, Clone, Deserialize)]
pub struct CreateAdminInput {
    pub name: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub role: Option<AdminRole>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_superadmin_requires_no_tenant() {
        let root = Admin::new(None, "Root".into(), "root@example.com".into(), String::new(), AdminRole::Superadmin);
        assert!(root.is_superadmin());
        assert!(root.can_access_tenant(7));

        let scoped = Admin::new(Some(3), "Ann".into(), "ann@example.com".into(), String::new(), AdminRole::Superadmin);
        assert!(!scoped.is_superadmin());
    }

    #[test]
    fn test_tenant_admin_access() {
        let admin = Admin::new(Some(3), "Ann".into(), "ann@example.com".into(), String::new(), AdminRole::Editor);
        assert!(admin.can_access_tenant(3));
        assert!(!admin.can_access_tenant(4));
    }

    #[test]
    fn test_password_hash_not_serialized() {
        let admin = Admin::new(None, "Root".into(), "root@example.com".into(), "secret-hash".into(), AdminRole::Superadmin);
        let json = serde_json::to_string(&admin).unwrap();
        assert!(!json.contains("secret-hash"));
    }

    #[test]
    fn test_role_parse() {
        assert_eq!("Editor".parse::<AdminRole>().unwrap(), AdminRole::Editor);
        assert!("author".parse::<AdminRole>().is_err());
    }
}
