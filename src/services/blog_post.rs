//! Blog post service
//!
//! Same lifecycle as pages plus category and tag links. Tags are given by
//! name and created on demand; categories must already exist in the
//! tenant.

use crate::cache::{Cache, CacheLayer};
use crate::db::repositories::{BlogPostRepository, SlugRepository};
use crate::models::{
    Actor, BlogPost, ContentFilter, CreatePostInput, ListParams, PagedResult, PublicPostFilter, RecordOutcome,
    RevisionKind, RevisionType, SlugModule, UpdatePostInput,
};
use crate::services::blog_category::BlogCategoryService;
use crate::services::blog_tag::BlogTagService;
use crate::services::content::{
    cache_key, invalidate, non_empty, resolve_slug, validate_title, ContentError, SCOPE_CATEGORIES, SCOPE_POSTS,
    SCOPE_SITE, SCOPE_TAGS,
};
use crate::services::revision::RevisionService;
use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub struct BlogPostService {
    repo: Arc<dyn BlogPostRepository>,
    slugs: Arc<dyn SlugRepository>,
    revisions: Arc<RevisionService>,
    categories: Arc<BlogCategoryService>,
    tags: Arc<BlogTagService>,
    cache: Arc<Cache>,
    cache_ttl: Duration,
}

fn dedup(mut ids: Vec<i64>) -> Vec<i64> {
    ids.sort_unstable();
    ids.dedup();
    ids
}

impl BlogPostService {
    pub fn new(
        repo: Arc<dyn BlogPostRepository>,
        slugs: Arc<dyn SlugRepository>,
        revisions: Arc<RevisionService>,
        categories: Arc<BlogCategoryService>,
        tags: Arc<BlogTagService>,
        cache: Arc<Cache>,
        cache_ttl: Duration,
    ) -> Self {
        Self {
            repo,
            slugs,
            revisions,
            categories,
            tags,
            cache,
            cache_ttl,
        }
    }

    async fn ensure_slug_free(&self, tenant_id: i64, slug: &str, post_id: Option<i64>) -> Result<(), ContentError> {
        let free = self
            .slugs
            .is_available(tenant_id, SlugModule::Blog, slug, post_id)
            .await
            .context("Failed to check slug")?;
        if free {
            Ok(())
        } else {
            Err(ContentError::Conflict(format!("Slug '{}' is already in use", slug)))
        }
    }

    async fn invalidate(&self, tenant_id: i64) {
        invalidate(
            &self.cache,
            tenant_id,
            &[SCOPE_POSTS, SCOPE_CATEGORIES, SCOPE_TAGS, SCOPE_SITE],
        )
        .await;
    }

    pub async fn create(&self, tenant_id: i64, input: CreatePostInput, actor: &Actor) -> Result<BlogPost, ContentError> {
        let title = validate_title(&input.title)?;
        let slug = resolve_slug(input.slug.as_deref(), &title).map_err(ContentError::ValidationError)?;
        self.ensure_slug_free(tenant_id, &slug, None).await?;
        let category_ids = dedup(input.category_ids);
        self.categories.ensure_exist(tenant_id, &category_ids).await?;
        let tag_ids = self.tags.resolve_names(tenant_id, &input.tags).await?;

        let mut post = BlogPost::new(tenant_id, title, slug, input.content);
        post.excerpt = non_empty(input.excerpt);
        post.featured_image = non_empty(input.featured_image);
        post.status = input.status.unwrap_or_default();
        post.allow_comments = input.allow_comments.unwrap_or(true);
        post.seo_title = non_empty(input.seo_title);
        post.seo_description = non_empty(input.seo_description);
        post.author_id = actor.admin_id;
        post.category_ids = category_ids;
        post.tag_ids = dedup(tag_ids);
        post.mark_published();

        let post = self.repo.create(&post).await.map_err(ContentError::from_write)?;
        self.revisions
            .record(
                RevisionKind::BlogPost,
                tenant_id,
                post.id,
                post.snapshot(),
                RevisionType::Initial,
                actor,
                input.summary,
            )
            .await?;

        info!(tenant_id, post_id = post.id, slug = %post.slug, "Created post");
        self.invalidate(tenant_id).await;
        self.get(tenant_id, post.id).await
    }

    /// Live (not trashed) post
    pub async fn get(&self, tenant_id: i64, id: i64) -> Result<BlogPost, ContentError> {
        self.repo
            .get_by_id(tenant_id, id)
            .await
            .context("Failed to get post")?
            .filter(|p| !p.is_trashed())
            .ok_or_else(|| ContentError::NotFound(format!("Post {} not found", id)))
    }

    pub async fn list(
        &self,
        tenant_id: i64,
        filter: &ContentFilter,
        params: &ListParams,
    ) -> Result<PagedResult<BlogPost>, ContentError> {
        let (items, total) = self
            .repo
            .list(tenant_id, filter, params)
            .await
            .context("Failed to list posts")?;
        Ok(PagedResult::new(items, total, params))
    }

    /// Merge `input` into a copy of `post`. Drafts only link tags that already
    /// exist; saves create the missing ones.
    async fn apply(&self, post: &BlogPost, input: &UpdatePostInput, draft: bool) -> Result<BlogPost, ContentError> {
        let mut next = post.clone();
        if let Some(title) = &input.title {
            next.title = validate_title(title)?;
        }
        if let Some(slug) = &input.slug {
            next.slug = resolve_slug(Some(slug), &next.title).map_err(ContentError::ValidationError)?;
        }
        if let Some(content) = &input.content {
            next.content = content.clone();
        }
        if input.excerpt.is_some() {
            next.excerpt = non_empty(input.excerpt.clone());
        }
        if input.featured_image.is_some() {
            next.featured_image = non_empty(input.featured_image.clone());
        }
        if let Some(status) = input.status {
            next.status = status;
        }
        if let Some(allow_comments) = input.allow_comments {
            next.allow_comments = allow_comments;
        }
        if input.seo_title.is_some() {
            next.seo_title = non_empty(input.seo_title.clone());
        }
        if input.seo_description.is_some() {
            next.seo_description = non_empty(input.seo_description.clone());
        }
        if let Some(ids) = &input.category_ids {
            let ids = dedup(ids.clone());
            self.categories.ensure_exist(post.tenant_id, &ids).await?;
            next.category_ids = ids;
        }
        if let Some(names) = &input.tags {
            let ids = if draft {
                self.tags.find_names(post.tenant_id, names).await?
            } else {
                self.tags.resolve_names(post.tenant_id, names).await?
            };
            next.tag_ids = dedup(ids);
        }
        next.mark_published();
        Ok(next)
    }

    /// Save changes to the live post and record a revision
    pub async fn update(
        &self,
        tenant_id: i64,
        id: i64,
        input: UpdatePostInput,
        actor: &Actor,
    ) -> Result<BlogPost, ContentError> {
        let post = self.get(tenant_id, id).await?;
        let next = self.apply(&post, &input, false).await?;
        if next.slug != post.slug {
            self.ensure_slug_free(tenant_id, &next.slug, Some(id)).await?;
        }

        let revision_type = if next.status.is_published() && !post.status.is_published() {
            RevisionType::Published
        } else {
            RevisionType::Manual
        };
        let saved = self.repo.update(&next).await.map_err(ContentError::from_write)?;
        self.revisions
            .record(
                RevisionKind::BlogPost,
                tenant_id,
                id,
                saved.snapshot(),
                revision_type,
                actor,
                input.summary,
            )
            .await?;

        self.invalidate(tenant_id).await;
        self.get(tenant_id, id).await
    }

    /// Record the editor's draft as an autosave revision; the live post is left untouched
    pub async fn autosave(
        &self,
        tenant_id: i64,
        id: i64,
        input: UpdatePostInput,
        actor: &Actor,
    ) -> Result<RecordOutcome, ContentError> {
        let post = self.get(tenant_id, id).await?;
        let draft = self.apply(&post, &input, true).await?;
        self.revisions
            .record(
                RevisionKind::BlogPost,
                tenant_id,
                id,
                draft.snapshot(),
                RevisionType::Autosave,
                actor,
                input.summary,
            )
            .await
    }

    pub async fn trash(&self, tenant_id: i64, id: i64, actor: &Actor) -> Result<(), ContentError> {
        let trashed = self
            .repo
            .trash(tenant_id, id, actor.admin_id)
            .await
            .context("Failed to trash post")?;
        if !trashed {
            return Err(ContentError::NotFound(format!("Post {} not found", id)));
        }
        info!(tenant_id, post_id = id, "Moved post to trash");
        self.invalidate(tenant_id).await;
        Ok(())
    }

    pub async fn list_trash(&self, tenant_id: i64, params: &ListParams) -> Result<PagedResult<BlogPost>, ContentError> {
        let filter = ContentFilter {
            trashed: true,
            ..ContentFilter::default()
        };
        self.list(tenant_id, &filter, params).await
    }

    pub async fn restore_from_trash(&self, tenant_id: i64, id: i64) -> Result<BlogPost, ContentError> {
        let restored = self
            .repo
            .restore_from_trash(tenant_id, id)
            .await
            .context("Failed to restore post")?;
        if !restored {
            return Err(ContentError::NotFound(format!("Post {} is not in the trash", id)));
        }
        self.invalidate(tenant_id).await;
        self.get(tenant_id, id).await
    }

    /// Delete a trashed post with its links, revisions and slug
    pub async fn purge(&self, tenant_id: i64, id: i64) -> Result<(), ContentError> {
        let post = self
            .repo
            .get_by_id(tenant_id, id)
            .await
            .context("Failed to get post")?
            .filter(|p| p.is_trashed())
            .ok_or_else(|| ContentError::NotFound(format!("Post {} is not in the trash", id)))?;
        self.repo
            .purge(tenant_id, post.id)
            .await
            .context("Failed to purge post")?;
        info!(tenant_id, post_id = id, "Purged post");
        Ok(())
    }

    pub async fn empty_trash(&self, tenant_id: i64) -> Result<u64, ContentError> {
        let ids = self
            .repo
            .trashed_ids(tenant_id)
            .await
            .context("Failed to list trashed posts")?;
        let mut purged = 0;
        for id in ids {
            if self.repo.purge(tenant_id, id).await.context("Failed to purge post")? {
                purged += 1;
            }
        }
        info!(tenant_id, purged, "Emptied post trash");
        Ok(purged)
    }

    /// Published posts, newest first, optionally narrowed by category or tag slug.
    ///
    /// An unknown category or tag yields an empty page.
    pub async fn list_published(
        &self,
        tenant_id: i64,
        filter: &PublicPostFilter,
        params: &ListParams,
    ) -> Result<PagedResult<BlogPost>, ContentError> {
        let key = cache_key(
            tenant_id,
            SCOPE_POSTS,
            &format!(
                "list:{}:{}:c={}:t={}",
                params.page,
                params.per_page,
                filter.category.as_deref().unwrap_or(""),
                filter.tag.as_deref().unwrap_or("")
            ),
        );
        if let Some(cached) = self.cache.get::<PagedResult<BlogPost>>(&key).await.ok().flatten() {
            return Ok(cached);
        }

        let category_id = match filter.category.as_deref() {
            Some(slug) => match self.categories.get_by_slug(tenant_id, slug).await? {
                Some(category) => Some(category.id),
                None => return Ok(PagedResult::new(Vec::new(), 0, params)),
            },
            None => None,
        };
        let tag_id = match filter.tag.as_deref() {
            Some(slug) => match self.tags.get_by_slug(tenant_id, slug).await? {
                Some(tag) => Some(tag.id),
                None => return Ok(PagedResult::new(Vec::new(), 0, params)),
            },
            None => None,
        };

        let (items, total) = self
            .repo
            .list_published(tenant_id, category_id, tag_id, params)
            .await
            .context("Failed to list published posts")?;
        let result = PagedResult::new(items, total, params);
        let _ = self.cache.set(&key, &result, self.cache_ttl).await;
        Ok(result)
    }

    pub async fn get_published(&self, tenant_id: i64, slug: &str) -> Result<BlogPost, ContentError> {
        let key = cache_key(tenant_id, SCOPE_POSTS, &format!("slug:{}", slug));
        if let Some(post) = self.cache.get::<BlogPost>(&key).await.ok().flatten() {
            return Ok(post);
        }

        let post = self
            .repo
            .get_published_by_slug(tenant_id, slug)
            .await
            .context("Failed to get post by slug")?
            .ok_or_else(|| ContentError::NotFound(format!("Post '{}' not found", slug)))?;
        let _ = self.cache.set(&key, &post, self.cache_ttl).await;
        Ok(post)
    }
}
