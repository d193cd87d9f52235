//! Tenant model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An isolated customer site, addressed by its domain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    pub id: i64,
    pub name: String,
    /// Lowercase host name the tenant is served on
    pub domain: String,
    pub status: TenantStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Tenant {
    pub fn is_active(&self) -> bool {
        self.status == TenantStatus::Active
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TenantStatus {
    Active,
    Suspended,
}

impl Default for TenantStatus {
    fn default() -> Self {
        Self::Active
    }
}

impl TenantStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TenantStatus::Active => "active",
            TenantStatus::Suspended => "suspended",
        }
    }
}

impl std::fmt::Display for TenantStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for TenantStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(Self::Active),
            "suspended" => Ok(Self::Suspended),
            _ => Err(anyhow::anyhow!("Invalid tenant status: {}", s)),
        }
    }
}

/// Input for creating a tenant
#[derive(Debug, Clone, Deserialize)]
pub struct CreateTenantInput {
    pub name: String,
    pub domain: String,
}

/// Input for updating a tenant
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateTenantInput {
    pub name: Option<String>,
    pub domain: Option<String>,
    pub status: Option<TenantStatus>,
}
