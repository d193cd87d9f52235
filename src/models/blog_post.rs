//! Blog post model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ContentStatus, RevisionSnapshot};

/// Blog post with its category and tag links
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlogPost {
    pub id: i64,
    pub tenant_id: i64,
    pub title: String,
    pub slug: String,
    /// HTML body
    pub content: String,
    pub excerpt: Option<String>,
    pub featured_image: Option<String>,
    pub status: ContentStatus,
    pub allow_comments: bool,
    pub seo_title: Option<String>,
    pub seo_description: Option<String>,
    pub author_id: Option<i64>,
    pub current_revision_id: Option<i64>,
    /// Set on first publish and kept afterwards
    pub published_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub deleted_by: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Linked category ids, ascending
    #[serde(default)]
    pub category_ids: Vec<i64>,
    /// Linked tag ids, ascending
    #[serde(default)]
    pub tag_ids: Vec<i64>,
}

impl BlogPost {
    pub fn new(tenant_id: i64, title: String, slug: String, content: String) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            tenant_id,
            title,
            slug,
            content,
            excerpt: None,
            featured_image: None,
            status: ContentStatus::Draft,
            allow_comments: true,
            seo_title: None,
            seo_description: None,
            author_id: None,
            current_revision_id: None,
            published_at: None,
            deleted_at: None,
            deleted_by: None,
            created_at: now,
            updated_at: now,
            category_ids: Vec::new(),
            tag_ids: Vec::new(),
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

    pub fn snapshot(&self) -> RevisionSnapshot {
        let mut category_ids = self.category_ids.clone();
        category_ids.sort_unstable();
        category_ids.dedup();
        let mut tag_ids = self.tag_ids.clone();
        tag_ids.sort_unstable();
        tag_ids.dedup();

        RevisionSnapshot {
            title: self.title.clone(),
            slug: self.slug.clone(),
            content: self.content.clone(),
            excerpt: self.excerpt.clone(),
            status: self.status,
            seo_title: self.seo_title.clone(),
            seo_description: self.seo_description.clone(),
            template: None,
            featured_image: self.featured_image.clone(),
            allow_comments: Some(self.allow_comments),
            category_ids: Some(category_ids),
            tag_ids: Some(tag_ids),
        }
    }

    pub fn apply_snapshot(&mut self, snapshot: &RevisionSnapshot) {
        self.title = snapshot.title.clone();
        self.slug = snapshot.slug.clone();
        self.content = snapshot.content.clone();
        self.excerpt = snapshot.excerpt.clone();
        self.status = snapshot.status;
        self.seo_title = snapshot.seo_title.clone();
        self.seo_description = snapshot.seo_description.clone();
        self.featured_image = snapshot.featured_image.clone();
        if let Some(allow_comments) = snapshot.allow_comments {
            self.allow_comments = allow_comments;
        }
        if let Some(ids) = &snapshot.category_ids {
            self.category_ids = ids.clone();
        }
        if let Some(ids) = &snapshot.tag_ids {
            self.tag_ids = ids.clone();
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreatePostInput {
    pub title: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub excerpt: Option<String>,
    #[serde(default)]
    pub featured_image: Option<String>,
    #[serde(default)]
    pub status: Option<ContentStatus>,
    #[serde(default)]
    pub allow_comments: Option<bool>,
    #[serde(default)]
    pub seo_title: Option<String>,
    #[serde(default)]
    pub seo_description: Option<String>,
    #[serde(default)]
    pub category_ids: Vec<i64>,
    /// Tag names, created on demand
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub summary: Option<String>,
}

/// Input for updating or autosaving a post.
///
/// `category_ids` and `tags` replace the current links when present.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdatePostInput {
    pub title: Option<String>,
    pub slug: Option<String>,
    pub content: Option<String>,
    pub excerpt: Option<String>,
    pub featured_image: Option<String>,
    pub status: Option<ContentStatus>,
    pub allow_comments: Option<bool>,
    pub seo_title: Option<String>,
    pub seo_description: Option<String>,
    pub category_ids: Option<Vec<i64>>,
    pub tags: Option<Vec<String>>,
    pub summary: Option<String>,
}

/// Public listing filter, by category or tag slug
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PublicPostFilter {
    pub category: Option<String>,
    pub tag: Option<String>,
}
