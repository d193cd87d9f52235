//! Page service
//!
//! Page lifecycle for tenant admins (create, edit, autosave, trash) and
//! cached published lookups for the public API. Every save that changes
//! a page records a revision through [`RevisionService`].

use crate::cache::{Cache, CacheLayer};
use crate::db::repositories::{PageRepository, SlugRepository};
use crate::models::{
    Actor, ContentFilter, CreatePageInput, ListParams, Page, PagedResult, RecordOutcome, RevisionKind, RevisionType,
    SlugModule, UpdatePageInput, DEFAULT_PAGE_TEMPLATE,
};
use crate::services::content::{
    cache_key, invalidate, non_empty, resolve_slug, validate_title, ContentError, SCOPE_PAGES, SCOPE_SITE,
};
use crate::services::revision::RevisionService;
use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub struct PageService {
    repo: Arc<dyn PageRepository>,
    slugs: Arc<dyn SlugRepository>,
    revisions: Arc<RevisionService>,
    cache: Arc<Cache>,
    cache_ttl: Duration,
}

impl PageService {
    pub fn new(
        repo: Arc<dyn PageRepository>,
        slugs: Arc<dyn SlugRepository>,
        revisions: Arc<RevisionService>,
        cache: Arc<Cache>,
        cache_ttl: Duration,
    ) -> Self {
        Self {
            repo,
            slugs,
            revisions,
            cache,
            cache_ttl,
        }
    }

    async fn ensure_slug_free(&self, tenant_id: i64, slug: &str, page_id: Option<i64>) -> Result<(), ContentError> {
        let free = self
            .slugs
            .is_available(tenant_id, SlugModule::Pages, slug, page_id)
            .await
            .context("Failed to check slug")?;
        if free {
            Ok(())
        } else {
            Err(ContentError::Conflict(format!("Slug '{}' is already in use", slug)))
        }
    }

    async fn invalidate(&self, tenant_id: i64) {
        invalidate(&self.cache, tenant_id, &[SCOPE_PAGES, SCOPE_SITE]).await;
    }

    pub async fn create(&self, tenant_id: i64, input: CreatePageInput, actor: &Actor) -> Result<Page, ContentError> {
        let title = validate_title(&input.title)?;
        let slug = resolve_slug(input.slug.as_deref(), &title).map_err(ContentError::ValidationError)?;
        self.ensure_slug_free(tenant_id, &slug, None).await?;

        let mut page = Page::new(tenant_id, title, slug, input.content);
        page.excerpt = non_empty(input.excerpt);
        page.status = input.status.unwrap_or_default();
        page.template = non_empty(input.template).unwrap_or_else(|| DEFAULT_PAGE_TEMPLATE.to_string());
        page.seo_title = non_empty(input.seo_title);
        page.seo_description = non_empty(input.seo_description);
        page.author_id = actor.admin_id;
        page.mark_published();

        let page = self.repo.create(&page).await.map_err(ContentError::from_write)?;
        self.revisions
            .record(
                RevisionKind::Page,
                tenant_id,
                page.id,
                page.snapshot(),
                RevisionType::Initial,
                actor,
                input.summary,
            )
            .await?;

        info!(tenant_id, page_id = page.id, slug = %page.slug, "Created page");
        self.invalidate(tenant_id).await;
        self.get(tenant_id, page.id).await
    }

    /// Live (not trashed) page
    pub async fn get(&self, tenant_id: i64, id: i64) -> Result<Page, ContentError> {
        self.repo
            .get_by_id(tenant_id, id)
            .await
            .context("Failed to get page")?
            .filter(|p| !p.is_trashed())
            .ok_or_else(|| ContentError::NotFound(format!("Page {} not found", id)))
    }

    pub async fn list(
        &self,
        tenant_id: i64,
        filter: &ContentFilter,
        params: &ListParams,
    ) -> Result<PagedResult<Page>, ContentError> {
        let (items, total) = self
            .repo
            .list(tenant_id, filter, params)
            .await
            .context("Failed to list pages")?;
        Ok(PagedResult::new(items, total, params))
    }

    /// Apply an update to a copy of `page`
    fn apply(page: &Page, input: &UpdatePageInput) -> Result<Page, ContentError> {
        let mut next = page.clone();
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
        if let Some(status) = input.status {
            next.status = status;
        }
        if let Some(template) = non_empty(input.template.clone()) {
            next.template = template;
        }
        if input.seo_title.is_some() {
            next.seo_title = non_empty(input.seo_title.clone());
        }
        if input.seo_description.is_some() {
            next.seo_description = non_empty(input.seo_description.clone());
        }
        next.mark_published();
        Ok(next)
    }

    /// Save changes to the live page and record a revision.
    ///
    /// The revision is `published` when the update moves the page into the
    /// published state, `manual` otherwise.
    pub async fn update(
        &self,
        tenant_id: i64,
        id: i64,
        input: UpdatePageInput,
        actor: &Actor,
    ) -> Result<Page, ContentError> {
        let page = self.get(tenant_id, id).await?;
        let next = Self::apply(&page, &input)?;
        if next.slug != page.slug {
            self.ensure_slug_free(tenant_id, &next.slug, Some(id)).await?;
        }

        let revision_type = if next.status.is_published() && !page.status.is_published() {
            RevisionType::Published
        } else {
            RevisionType::Manual
        };
        let saved = self.repo.update(&next).await.map_err(ContentError::from_write)?;
        self.revisions
            .record(
                RevisionKind::Page,
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

    /// Record the editor's draft as an autosave revision.
    ///
    /// The live page is left untouched.
    pub async fn autosave(
        &self,
        tenant_id: i64,
        id: i64,
        input: UpdatePageInput,
        actor: &Actor,
    ) -> Result<RecordOutcome, ContentError> {
        let page = self.get(tenant_id, id).await?;
        let draft = Self::apply(&page, &input)?;
        self.revisions
            .record(
                RevisionKind::Page,
                tenant_id,
                id,
                draft.snapshot(),
                RevisionType::Autosave,
                actor,
                input.summary,
            )
            .await
    }

    /// Move a page to the trash; its slug stays reserved
    pub async fn trash(&self, tenant_id: i64, id: i64, actor: &Actor) -> Result<(), ContentError> {
        let trashed = self
            .repo
            .trash(tenant_id, id, actor.admin_id)
            .await
            .context("Failed to trash page")?;
        if !trashed {
            return Err(ContentError::NotFound(format!("Page {} not found", id)));
        }
        info!(tenant_id, page_id = id, "Moved page to trash");
        self.invalidate(tenant_id).await;
        Ok(())
    }

    pub async fn list_trash(&self, tenant_id: i64, params: &ListParams) -> Result<PagedResult<Page>, ContentError> {
        let filter = ContentFilter {
            trashed: true,
            ..ContentFilter::default()
        };
        self.list(tenant_id, &filter, params).await
    }

    pub async fn restore_from_trash(&self, tenant_id: i64, id: i64) -> Result<Page, ContentError> {
        let restored = self
            .repo
            .restore_from_trash(tenant_id, id)
            .await
            .context("Failed to restore page")?;
        if !restored {
            return Err(ContentError::NotFound(format!("Page {} is not in the trash", id)));
        }
        self.invalidate(tenant_id).await;
        self.get(tenant_id, id).await
    }

    /// Delete a trashed page with its revisions and slug
    pub async fn purge(&self, tenant_id: i64, id: i64) -> Result<(), ContentError> {
        let page = self
            .repo
            .get_by_id(tenant_id, id)
            .await
            .context("Failed to get page")?
            .filter(|p| p.is_trashed())
            .ok_or_else(|| ContentError::NotFound(format!("Page {} is not in the trash", id)))?;
        self.repo
            .purge(tenant_id, page.id)
            .await
            .context("Failed to purge page")?;
        info!(tenant_id, page_id = id, "Purged page");
        Ok(())
    }

    /// Purge every trashed page of the tenant
    pub async fn empty_trash(&self, tenant_id: i64) -> Result<u64, ContentError> {
        let ids = self
            .repo
            .trashed_ids(tenant_id)
            .await
            .context("Failed to list trashed pages")?;
        let mut purged = 0;
        for id in ids {
            if self.repo.purge(tenant_id, id).await.context("Failed to purge page")? {
                purged += 1;
            }
        }
        info!(tenant_id, purged, "Emptied page trash");
        Ok(purged)
    }

    pub async fn list_published(&self, tenant_id: i64, params: &ListParams) -> Result<PagedResult<Page>, ContentError> {
        let key = cache_key(tenant_id, SCOPE_PAGES, &format!("list:{}:{}", params.page, params.per_page));
        if let Some(cached) = self.cache.get::<PagedResult<Page>>(&key).await.ok().flatten() {
            return Ok(cached);
        }

        let (items, total) = self
            .repo
            .list_published(tenant_id, params)
            .await
            .context("Failed to list published pages")?;
        let result = PagedResult::new(items, total, params);
        let _ = self.cache.set(&key, &result, self.cache_ttl).await;
        Ok(result)
    }

    pub async fn get_published(&self, tenant_id: i64, slug: &str) -> Result<Page, ContentError> {
        let key = cache_key(tenant_id, SCOPE_PAGES, &format!("slug:{}", slug));
        if let Some(page) = self.cache.get::<Page>(&key).await.ok().flatten() {
            return Ok(page);
        }

        let page = self
            .repo
            .get_published_by_slug(tenant_id, slug)
            .await
            .context("Failed to get page by slug")?
            .ok_or_else(|| ContentError::NotFound(format!("Page '{}' not found", slug)))?;
        let _ = self.cache.set(&key, &page, self.cache_ttl).await;
        Ok(page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RevisionConfig;
    use crate::db::repositories::test_support::{insert_tenant, setup_pool};
    use crate::db::repositories::{SqlxPageRepository, SqlxSlugRepository};
    use crate::models::ContentStatus;
    use crate::services::revision::tests::revision_service;

    async fn setup() -> (PageService, Arc<RevisionService>, i64) {
        let pool = setup_pool().await;
        let tenant = insert_tenant(&pool, "one.test").await;
        let revisions = Arc::new(revision_service(&pool, RevisionConfig::default()));
        let service = PageService::new(
            SqlxPageRepository::boxed(pool.clone()),
            SqlxSlugRepository::boxed(pool.clone()),
            revisions.clone(),
            Arc::new(Cache::new()),
            Duration::from_secs(60),
        );
        (service, revisions, tenant)
    }

    fn input(title: &str) -> CreatePageInput {
        CreatePageInput {
            title: title.into(),
            content: "<p>Hello</p>".into(),
            ..CreatePageInput::default()
        }
    }

    #[tokio::test]
    async fn test_create_generates_slug_and_initial_revision() {
        let (service, revisions, tenant) = setup().await;
        let page = service.create(tenant, input("About Us"), &Actor::system()).await.unwrap();

        assert_eq!(page.slug, "about-us");
        assert_eq!(page.template, DEFAULT_PAGE_TEMPLATE);
        assert!(page.current_revision_id.is_some());

        let history = revisions
            .list(RevisionKind::Page, tenant, page.id, &ListParams::default())
            .await
            .unwrap();
        assert_eq!(history.total, 1);
        assert_eq!(history.items[0].revision_type, RevisionType::Initial);

        assert!(matches!(
            service.create(tenant, input("About us!"), &Actor::system()).await,
            Err(ContentError::Conflict(_))
        ));
        assert!(matches!(
            service.create(tenant, input("   "), &Actor::system()).await,
            Err(ContentError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn test_update_records_published_revision() {
        let (service, revisions, tenant) = setup().await;
        let page = service.create(tenant, input("About"), &Actor::system()).await.unwrap();

        let update = UpdatePageInput {
            status: Some(ContentStatus::Published),
            content: Some("<p>Live</p>".into()),
            ..UpdatePageInput::default()
        };
        let updated = service.update(tenant, page.id, update, &Actor::system()).await.unwrap();
        assert!(updated.published_at.is_some());

        let history = revisions
            .list(RevisionKind::Page, tenant, page.id, &ListParams::default())
            .await
            .unwrap();
        assert_eq!(history.items[0].revision_type, RevisionType::Published);
        assert_eq!(updated.current_revision_id, Some(history.items[0].id));

        // Saving the same state again adds nothing
        service
            .update(tenant, page.id, UpdatePageInput::default(), &Actor::system())
            .await
            .unwrap();
        let again = revisions
            .list(RevisionKind::Page, tenant, page.id, &ListParams::default())
            .await
            .unwrap();
        assert_eq!(again.total, 2);
    }

    #[tokio::test]
    async fn test_autosave_leaves_live_page() {
        let (service, revisions, tenant) = setup().await;
        let page = service.create(tenant, input("About"), &Actor::system()).await.unwrap();

        let draft = UpdatePageInput {
            content: Some("<p>Draft</p>".into()),
            ..UpdatePageInput::default()
        };
        let outcome = service.autosave(tenant, page.id, draft, &Actor::system()).await.unwrap();
        assert!(outcome.created);
        assert_eq!(outcome.revision.revision_type, RevisionType::Autosave);
        assert!(!outcome.revision.is_current);

        let live = service.get(tenant, page.id).await.unwrap();
        assert_eq!(live.content, "<p>Hello</p>");
        assert_eq!(live.current_revision_id, page.current_revision_id);
        assert_eq!(
            revisions
                .list(RevisionKind::Page, tenant, page.id, &ListParams::default())
                .await
                .unwrap()
                .total,
            2
        );
    }

    #[tokio::test]
    async fn test_publish_after_matching_autosave_records_its_own_revision() {
        let (service, revisions, tenant) = setup().await;
        let page = service.create(tenant, input("About"), &Actor::system()).await.unwrap();

        let edit = || UpdatePageInput {
            status: Some(ContentStatus::Published),
            content: Some("<p>v2</p>".into()),
            ..UpdatePageInput::default()
        };
        service.autosave(tenant, page.id, edit(), &Actor::system()).await.unwrap();
        let published = service.update(tenant, page.id, edit(), &Actor::system()).await.unwrap();

        let history = revisions
            .list(RevisionKind::Page, tenant, page.id, &ListParams::default())
            .await
            .unwrap();
        let types: Vec<_> = history.items.iter().map(|r| r.revision_type).collect();
        assert_eq!(
            types,
            vec![RevisionType::Published, RevisionType::Autosave, RevisionType::Initial]
        );
        assert!(history.items[0].is_current);
        assert_eq!(published.current_revision_id, Some(history.items[0].id));
    }

    #[tokio::test]
    async fn test_trash_lifecycle() {
        let (service, _, tenant) = setup().await;
        let page = service.create(tenant, input("About"), &Actor::system()).await.unwrap();
        let other = service.create(tenant, input("Contact"), &Actor::system()).await.unwrap();

        service.trash(tenant, page.id, &Actor::system()).await.unwrap();
        assert!(matches!(service.get(tenant, page.id).await, Err(ContentError::NotFound(_))));
        assert_eq!(service.list_trash(tenant, &ListParams::default()).await.unwrap().total, 1);
        // Trashed pages keep their slug
        assert!(matches!(
            service.create(tenant, input("About"), &Actor::system()).await,
            Err(ContentError::Conflict(_))
        ));
        // Only trashed pages can be purged
        assert!(matches!(service.purge(tenant, other.id).await, Err(ContentError::NotFound(_))));

        service.restore_from_trash(tenant, page.id).await.unwrap();
        service.trash(tenant, page.id, &Actor::system()).await.unwrap();
        service.trash(tenant, other.id, &Actor::system()).await.unwrap();
        assert_eq!(service.empty_trash(tenant).await.unwrap(), 2);
        assert!(service.create(tenant, input("About"), &Actor::system()).await.is_ok());
    }

    #[tokio::test]
    async fn test_public_lookup_sees_only_published() {
        let (service, _, tenant) = setup().await;
        let page = service.create(tenant, input("About"), &Actor::system()).await.unwrap();
        assert!(matches!(
            service.get_published(tenant, "about").await,
            Err(ContentError::NotFound(_))
        ));

        let publish = UpdatePageInput {
            status: Some(ContentStatus::Published),
            ..UpdatePageInput::default()
        };
        service.update(tenant, page.id, publish, &Actor::system()).await.unwrap();
        assert_eq!(service.get_published(tenant, "about").await.unwrap().id, page.id);
        assert_eq!(service.list_published(tenant, &ListParams::default()).await.unwrap().total, 1);

        // Trashing drops the cached copy
        service.trash(tenant, page.id, &Actor::system()).await.unwrap();
        assert!(service.get_published(tenant, "about").await.is_err());
    }
}
