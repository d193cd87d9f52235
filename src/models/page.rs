//! Page model for standalone site pages

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ContentStatus, RevisionSnapshot};

/// Default template for pages created without one
pub const DEFAULT_PAGE_TEMPLATE: &str = "page";

/// Tenant page
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    pub id: i64,
    pub tenant_id: i64,
    pub title: String,
    pub slug: String,
    /// HTML body
    pub content: String,
    pub excerpt: Option<String>,
    pub status: ContentStatus,
    pub template: String,
    pub seo_title: Option<String>,
    pub seo_description: Option<String>,
    pub author_id: Option<i64>,
    /// Revision that reflects the stored row
    pub current_revision_id: Option<i64>,
    pub published_at: Option<DateTime<Utc>>,
    /// Set while the page sits in the trash
    pub deleted_at: Option<DateTime<Utc>>,
    pub deleted_by: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Page {
    pub fn new(tenant_id: i64, title: String, slug: String, content: String) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            tenant_id,
            title,
            slug,
            content,
            excerpt: None,
            status: ContentStatus::Draft,
            template: DEFAULT_PAGE_TEMPLATE.to_string(),
            seo_title: None,
            seo_description: None,
            author_id: None,
            current_revision_id: None,
            published_at: None,
            deleted_at: None,
            deleted_by: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_trashed(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Stamp `published_at` the first time the content goes live
    pub fn mark_published(&mut self) {
        if self.status.is_published() && self.published_at.is_none() {
            self.published_at = Some(Utc::now());
        }
    }

    /// Editable fields as stored in a revision
    pub fn snapshot(&self) -> RevisionSnapshot {
        RevisionSnapshot {
            title: self.title.clone(),
            slug: self.slug.clone(),
            content: self.content.clone(),
            excerpt: self.excerpt.clone(),
            status: self.status,
            seo_title: self.seo_title.clone(),
            seo_description: self.seo_description.clone(),
            template: Some(self.template.clone()),
            ..RevisionSnapshot::default()
        }
    }

    /// Overwrite editable fields from a revision snapshot
    pub fn apply_snapshot(&mut self, snapshot: &RevisionSnapshot) {
        self.title = snapshot.title.clone();
        self.slug = snapshot.slug.clone();
        self.content = snapshot.content.clone();
        self.excerpt = snapshot.excerpt.clone();
        self.status = snapshot.status;
        self.seo_title = snapshot.seo_title.clone();
        self.seo_description = snapshot.seo_description.clone();
        if let Some(template) = &snapshot.template {
            self.template = template.clone();
        }
    }
}

/// Input for creating a page
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreatePageInput {
    pub title: String,
    /// Generated from the title when omitted
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub excerpt: Option<String>,
    #[serde(default)]
    pub status: Option<ContentStatus>,
    #[serde(default)]
    pub template: Option<String>,
    #[serde(default)]
    pub seo_title: Option<String>,
    #[serde(default)]
    pub seo_description: Option<String>,
    /// Note stored on the initial revision
    #[serde(default)]
    pub summary: Option<String>,
}

/// Input for updating a page or autosaving a draft of it.
///
/// Empty strings clear optional fields.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdatePageInput {
    pub title: Option<String>,
    pub slug: Option<String>,
    pub content: Option<String>,
    pub excerpt: Option<String>,
    pub status: Option<ContentStatus>,
    pub template: Option<String>,
    pub seo_title: Option<String>,
    pub seo_description: Option<String>,
    /// Note stored on the recorded revision
    pub summary: Option<String>,
}

/// Admin list filter shared by pages and posts
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContentFilter {
    pub status: Option<ContentStatus>,
    /// Case-insensitive title search
    pub search: Option<String>,
    /// List trashed rows instead of live ones
    #[serde(default)]
    pub trashed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_round_trip_through_page() {
        let mut page = Page::new(1, "About".into(), "about".into(), "<p>Hi</p>".into());
        page.template = "wide".into();
        page.seo_title = Some("About us".into());

        let snapshot = page.snapshot();
        assert_eq!(snapshot.template.as_deref(), Some("wide"));
        assert!(snapshot.category_ids.is_none());

        let mut other = Page::new(1, "Draft".into(), "draft".into(), String::new());
        other.apply_snapshot(&snapshot);
        assert_eq!(other.title, "About");
        assert_eq!(other.slug, "about");
        assert_eq!(other.template, "wide");
        assert_eq!(other.seo_title.as_deref(), Some("About us"));
    }
}
