//! Blog tag service
//!
//! Tags are identified by their slug inside a tenant. Creating a tag whose
//! slug already exists returns the existing tag, which is how posts turn
//! free-form tag names into links.

use crate::cache::{Cache, CacheLayer};
use crate::db::repositories::BlogTagRepository;
use crate::models::{BlogTag, TagInput, TagWithCount};
use crate::services::content::{
    cache_key, generate_slug, invalidate, resolve_slug, ContentError, MAX_SLUG_LENGTH, SCOPE_POSTS, SCOPE_TAGS,
};
use anyhow::Context;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

pub struct BlogTagService {
    repo: Arc<dyn BlogTagRepository>,
    cache: Arc<Cache>,
    cache_ttl: Duration,
}

fn validate_name(name: &str) -> Result<String, ContentError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ContentError::ValidationError("Tag name cannot be empty".to_string()));
    }
    if name.chars().count() > MAX_SLUG_LENGTH {
        return Err(ContentError::ValidationError(format!(
            "Tag name cannot be longer than {} characters",
            MAX_SLUG_LENGTH
        )));
    }
    Ok(name.to_string())
}

impl BlogTagService {
    pub fn new(repo: Arc<dyn BlogTagRepository>, cache: Arc<Cache>, cache_ttl: Duration) -> Self {
        Self { repo, cache, cache_ttl }
    }

    async fn invalidate(&self, tenant_id: i64) {
        invalidate(&self.cache, tenant_id, &[SCOPE_TAGS, SCOPE_POSTS]).await;
    }

    /// Existing tag with the same slug, or a new one
    pub async fn create_or_get(&self, tenant_id: i64, input: TagInput) -> Result<BlogTag, ContentError> {
        let name = validate_name(&input.name)?;
        let slug = resolve_slug(input.slug.as_deref(), &name).map_err(ContentError::ValidationError)?;

        if let Some(existing) = self
            .repo
            .get_by_slug(tenant_id, &slug)
            .await
            .context("Failed to look up tag")?
        {
            return Ok(existing);
        }

        let tag = BlogTag {
            id: 0,
            tenant_id,
            name,
            slug,
            created_at: Utc::now(),
        };
        let tag = self.repo.create(&tag).await.context("Failed to create tag")?;
        self.invalidate(tenant_id).await;
        Ok(tag)
    }

    /// Tag ids for free-form names, creating missing tags
    pub async fn resolve_names(&self, tenant_id: i64, names: &[String]) -> Result<Vec<i64>, ContentError> {
        let mut ids = Vec::with_capacity(names.len());
        for name in names {
            if generate_slug(name).is_empty() {
                continue;
            }
            let tag = self
                .create_or_get(
                    tenant_id,
                    TagInput {
                        name: name.clone(),
                        slug: None,
                    },
                )
                .await?;
            if !ids.contains(&tag.id) {
                ids.push(tag.id);
            }
        }
        Ok(ids)
    }

    /// Ids of the tags already matching `names`; unknown names are skipped
    pub async fn find_names(&self, tenant_id: i64, names: &[String]) -> Result<Vec<i64>, ContentError> {
        let mut ids = Vec::with_capacity(names.len());
        for name in names {
            let slug = generate_slug(name);
            if slug.is_empty() {
                continue;
            }
            if let Some(tag) = self.get_by_slug(tenant_id, &slug).await? {
                if !ids.contains(&tag.id) {
                    ids.push(tag.id);
                }
            }
        }
        Ok(ids)
    }

    pub async fn get_by_slug(&self, tenant_id: i64, slug: &str) -> Result<Option<BlogTag>, ContentError> {
        Ok(self
            .repo
            .get_by_slug(tenant_id, slug)
            .await
            .context("Failed to get tag by slug")?)
    }

    pub async fn rename(&self, tenant_id: i64, id: i64, input: TagInput) -> Result<BlogTag, ContentError> {
        let mut tag = self
            .repo
            .get_by_id(tenant_id, id)
            .await
            .context("Failed to get tag")?
            .ok_or_else(|| ContentError::NotFound(format!("Tag {} not found", id)))?;

        let name = validate_name(&input.name)?;
        let slug = resolve_slug(input.slug.as_deref(), &name).map_err(ContentError::ValidationError)?;
        if let Some(other) = self
            .repo
            .get_by_slug(tenant_id, &slug)
            .await
            .context("Failed to look up tag")?
        {
            if other.id != id {
                return Err(ContentError::Conflict(format!("Tag slug '{}' is already in use", slug)));
            }
        }

        tag.name = name;
        tag.slug = slug;
        let tag = self.repo.update(&tag).await.context("Failed to update tag")?;
        self.invalidate(tenant_id).await;
        Ok(tag)
    }

    /// Delete a tag; posts lose the link
    pub async fn delete(&self, tenant_id: i64, id: i64) -> Result<(), ContentError> {
        if !self.repo.delete(tenant_id, id).await.context("Failed to delete tag")? {
            return Err(ContentError::NotFound(format!("Tag {} not found", id)));
        }
        self.invalidate(tenant_id).await;
        Ok(())
    }

    /// Every tag with its number of live posts
    pub async fn list(&self, tenant_id: i64) -> Result<Vec<TagWithCount>, ContentError> {
        Ok(self
            .repo
            .list_with_counts(tenant_id, false)
            .await
            .context("Failed to list tags")?)
    }

    /// Tags with published post counts, cached for the public API
    pub async fn list_public(&self, tenant_id: i64) -> Result<Vec<TagWithCount>, ContentError> {
        let key = cache_key(tenant_id, SCOPE_TAGS, "public");
        if let Some(tags) = self.cache.get::<Vec<TagWithCount>>(&key).await.ok().flatten() {
            return Ok(tags);
        }
        let tags = self
            .repo
            .list_with_counts(tenant_id, true)
            .await
            .context("Failed to list tags")?;
        let _ = self.cache.set(&key, &tags, self.cache_ttl).await;
        Ok(tags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::{insert_tenant, setup_pool};
    use crate::db::repositories::SqlxBlogTagRepository;

    async fn setup() -> (BlogTagService, i64, i64) {
        let pool = setup_pool().await;
        let t1 = insert_tenant(&pool, "one.test").await;
        let t2 = insert_tenant(&pool, "two.test").await;
        let service = BlogTagService::new(
            SqlxBlogTagRepository::boxed(pool),
            Arc::new(Cache::new()),
            Duration::from_secs(60),
        );
        (service, t1, t2)
    }

    fn tag(name: &str) -> TagInput {
        TagInput {
            name: name.into(),
            slug: None,
        }
    }

    #[tokio::test]
    async fn test_create_or_get_is_per_tenant() {
        let (service, t1, t2) = setup().await;
        let rust = service.create_or_get(t1, tag("Rust")).await.unwrap();
        let again = service.create_or_get(t1, tag(" rust ")).await.unwrap();
        assert_eq!(rust.id, again.id);
        assert_eq!(again.name, "Rust");

        let elsewhere = service.create_or_get(t2, tag("Rust")).await.unwrap();
        assert_ne!(elsewhere.id, rust.id);
        assert!(matches!(service.create_or_get(t1, tag("  ")).await, Err(ContentError::ValidationError(_))));
    }

    #[tokio::test]
    async fn test_resolve_names_dedups_and_skips_blank() {
        let (service, t1, _) = setup().await;
        let names = vec!["Rust".to_string(), "RUST".to_string(), "!!".to_string(), "Web Dev".to_string()];
        let ids = service.resolve_names(t1, &names).await.unwrap();
        assert_eq!(ids.len(), 2);
        assert_eq!(service.list(t1).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_rename_conflict_and_delete() {
        let (service, t1, t2) = setup().await;
        let rust = service.create_or_get(t1, tag("Rust")).await.unwrap();
        service.create_or_get(t1, tag("Go")).await.unwrap();

        assert!(matches!(service.rename(t1, rust.id, tag("Go")).await, Err(ContentError::Conflict(_))));
        let renamed = service.rename(t1, rust.id, tag("Rust Lang")).await.unwrap();
        assert_eq!(renamed.slug, "rust-lang");

        assert!(matches!(service.delete(t2, rust.id).await, Err(ContentError::NotFound(_))));
        service.delete(t1, rust.id).await.unwrap();
        assert!(service.get_by_slug(t1, "rust-lang").await.unwrap().is_none());
    }
}
