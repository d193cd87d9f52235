//! Common API utilities and shared types

use serde::{Deserialize, Serialize};

use crate::models::{ContentFilter, ContentStatus, ListParams, PublicPostFilter, Revision};

/// Default page number (1-indexed)
pub fn default_page() -> u32 {
    1
}

/// Default page size for public APIs
pub fn default_page_size() -> u32 {
    10
}

/// Default page size for admin APIs
pub fn default_per_page() -> u32 {
    20
}

/// Basic pagination query parameters
#[derive(Debug, Deserialize)]
pub struct PaginationQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_page_size")]
    pub per_page: u32,
}

impl PaginationQuery {
    pub fn params(&self) -> ListParams {
        ListParams::new(self.page, self.per_page)
    }
}

/// Admin pagination query parameters
#[derive(Debug, Deserialize)]
pub struct AdminPaginationQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
}

impl AdminPaginationQuery {
    pub fn params(&self) -> ListParams {
        ListParams::new(self.page, self.per_page)
    }
}

/// Admin list filters for pages and posts
#[derive(Debug, Deserialize)]
pub struct AdminContentQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
    pub status: Option<ContentStatus>,
    pub search: Option<String>,
}

impl AdminContentQuery {
    pub fn params(&self) -> ListParams {
        ListParams::new(self.page, self.per_page)
    }

    pub fn filter(&self) -> ContentFilter {
        ContentFilter {
            status: self.status,
            search: self.search.clone().filter(|s| !s.trim().is_empty()),
            trashed: false,
        }
    }
}

/// Public post listing query
#[derive(Debug, Deserialize)]
pub struct PublicPostsQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_page_size")]
    pub per_page: u32,
    pub category: Option<String>,
    pub tag: Option<String>,
}

impl PublicPostsQuery {
    pub fn params(&self) -> ListParams {
        ListParams::new(self.page, self.per_page)
    }

    pub fn filter(&self) -> PublicPostFilter {
        PublicPostFilter {
            category: self.category.clone().filter(|s| !s.is_empty()),
            tag: self.tag.clone().filter(|s| !s.is_empty()),
        }
    }
}

/// Body for write endpoints that return only a count
#[derive(Debug, Serialize)]
pub struct CountResponse {
    pub count: u64,
}

/// Result of an autosave request
#[derive(Debug, Serialize)]
pub struct AutosaveResponse {
    pub revision: Revision,
    /// False when the draft matched the latest revision
    pub created: bool,
}
