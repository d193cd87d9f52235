//! Slug registry model

use serde::{Deserialize, Serialize};

/// Content module a slug belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlugModule {
    Pages,
    Blog,
}

impl SlugModule {
    pub fn as_str(&self) -> &'static str {
        match self {
            SlugModule::Pages => "pages",
            SlugModule::Blog => "blog",
        }
    }
}

impl std::fmt::Display for SlugModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A slug claimed by one content row of a tenant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Slug {
    pub id: i64,
    pub tenant_id: i64,
    pub module: String,
    pub reference_id: i64,
    pub slug: String,
}
