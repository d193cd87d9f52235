//! Shared content types
//!
//! Publication status and pagination used by pages, blog posts and
//! revision listings.

use serde::{Deserialize, Serialize};

/// Publication status of a page or blog post
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentStatus {
    /// Work in progress, visible to admins only
    Draft,
    /// Visible on the public site
    Published,
    /// Finished but hidden from the public site
    Private,
}

impl Default for ContentStatus {
    fn default() -> Self {
        Self::Draft
    }
}

impl ContentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentStatus::Draft => "draft",
            ContentStatus::Published => "published",
            ContentStatus::Private => "private",
        }
    }

    pub fn is_published(&self) -> bool {
        *self == ContentStatus::Published
    }
}

impl std::fmt::Display for ContentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ContentStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "draft" => Ok(Self::Draft),
            "published" => Ok(Self::Published),
            "private" => Ok(Self::Private),
            _ => Err(anyhow::anyhow!("Invalid content status: {}", s)),
        }
    }
}

/// Pagination parameters for list queries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListParams {
    /// Page number (1-indexed)
    pub page: u32,
    /// Number of items per page
    pub per_page: u32,
}

impl Default for ListParams {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: 20,
        }
    }
}

impl ListParams {
    pub fn new(page: u32, per_page: u32) -> Self {
        Self {
            page: page.max(1),
            per_page: per_page.clamp(1, 100),
        }
    }

    /// Offset for database queries
    pub fn offset(&self) -> i64 {
        (self.page.saturating_sub(1) as i64) * self.per_page as i64
    }

    /// Limit for database queries
    pub fn limit(&self) -> i64 {
        self.per_page as i64
    }
}

/// Paginated result container
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PagedResult<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: u32,
    pub per_page: u32,
}

impl<T> PagedResult<T> {
    pub fn new(items: Vec<T>, total: i64, params: &ListParams) -> Self {
        Self {
            items,
            total,
            page: params.page,
            per_page: params.per_page,
        }
    }

    pub fn total_pages(&self) -> u32 {
        if self.per_page == 0 || self.total <= 0 {
            return 0;
        }
        (self.total as u64).div_ceil(self.per_page as u64) as u32
    }

    pub fn has_next(&self) -> bool {
        self.page < self.total_pages()
    }

    /// Convert the items while keeping pagination metadata
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> PagedResult<U> {
        PagedResult {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            per_page: self.per_page,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_status_round_trip() {
        for status in [ContentStatus::Draft, ContentStatus::Published, ContentStatus::Private] {
            assert_eq!(status.as_str().parse::<ContentStatus>().unwrap(), status);
        }
        assert!("archived".parse::<ContentStatus>().is_err());
        assert_eq!("PUBLISHED".parse::<ContentStatus>().unwrap(), ContentStatus::Published);
    }

    #[test]
    fn test_list_params_clamped() {
        let params = ListParams::new(0, 500);
        assert_eq!(params.page, 1);
        assert_eq!(params.per_page, 100);
        assert_eq!(params.offset(), 0);

        let params = ListParams::new(3, 10);
        assert_eq!(params.offset(), 20);
        assert_eq!(params.limit(), 10);
    }

    #[test]
    fn test_paged_result_map() {
        let params = ListParams::new(1, 2);
        let result = PagedResult::new(vec![1, 2], 5, &params).map(|n| n * 10);
        assert_eq!(result.items, vec![10, 20]);
        assert_eq!(result.total_pages(), 3);
        assert!(result.has_next());
    }

    proptest! {
        #[test]
        fn total_pages_covers_all_items(total in 0i64..10_000, per_page in 1u32..100) {
            let params = ListParams::new(1, per_page);
            let result: PagedResult<()> = PagedResult::new(Vec::new(), total, &params);
            let pages = result.total_pages() as i64;
            prop_assert!(pages * per_page as i64 >= total);
            prop_assert!((pages - 1).max(0) * (per_page as i64) < total.max(1));
        }
    }
}
