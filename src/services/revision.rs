//! Revision engine
//!
//! Records, lists, compares, restores and prunes the revision history of
//! pages and blog posts. Every operation is addressed by
//! `(kind, tenant_id, entity_id)`; a revision that belongs to another
//! tenant or entity is reported as not found.

use crate::cache::Cache;
use crate::config::RevisionConfig;
use crate::db::repositories::{
    BlogPostRepository, PageRepository, RestoreTarget, RevisionRepository, SlugRepository,
};
use crate::models::{
    Actor, ListParams, PagedResult, RecordOutcome, Revision, RevisionDiff, RevisionKind, RevisionRef,
    RevisionSnapshot, RevisionSummary, RevisionType,
};
use crate::services::content::{
    invalidate, prepare_revision, ContentError, SCOPE_CATEGORIES, SCOPE_PAGES, SCOPE_POSTS, SCOPE_SITE,
    SCOPE_TAGS,
};
use crate::services::diff::compare_snapshots;
use anyhow::Context;
use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::{debug, info};

pub struct RevisionService {
    revisions: Arc<dyn RevisionRepository>,
    pages: Arc<dyn PageRepository>,
    posts: Arc<dyn BlogPostRepository>,
    slugs: Arc<dyn SlugRepository>,
    cache: Arc<Cache>,
    config: RevisionConfig,
}

fn revision_label(revision: &Revision) -> RevisionRef {
    RevisionRef {
        id: Some(revision.id),
        revision_number: Some(revision.revision_number),
        label: format!("revision #{}", revision.revision_number),
    }
}

fn kind_label(kind: RevisionKind) -> &'static str {
    match kind {
        RevisionKind::Page => "Page",
        RevisionKind::BlogPost => "Post",
    }
}

impl RevisionService {
    pub fn new(
        revisions: Arc<dyn RevisionRepository>,
        pages: Arc<dyn PageRepository>,
        posts: Arc<dyn BlogPostRepository>,
        slugs: Arc<dyn SlugRepository>,
        cache: Arc<Cache>,
        config: RevisionConfig,
    ) -> Self {
        Self {
            revisions,
            pages,
            posts,
            slugs,
            cache,
            config,
        }
    }

    pub fn config(&self) -> &RevisionConfig {
        &self.config
    }

    /// Live entity, trashed or not
    async fn load_entity(&self, kind: RevisionKind, tenant_id: i64, entity_id: i64) -> Result<RestoreTarget, ContentError> {
        let entity = match kind {
            RevisionKind::Page => self
                .pages
                .get_by_id(tenant_id, entity_id)
                .await
                .context("Failed to get page")?
                .map(RestoreTarget::Page),
            RevisionKind::BlogPost => self
                .posts
                .get_by_id(tenant_id, entity_id)
                .await
                .context("Failed to get post")?
                .map(RestoreTarget::Post),
        };
        entity.ok_or_else(|| ContentError::NotFound(format!("{} {} not found", kind_label(kind), entity_id)))
    }

    async fn load_revision(
        &self,
        kind: RevisionKind,
        tenant_id: i64,
        entity_id: i64,
        revision_id: i64,
    ) -> Result<Revision, ContentError> {
        self.revisions
            .get(kind, tenant_id, entity_id, revision_id)
            .await
            .context("Failed to get revision")?
            .ok_or_else(|| ContentError::NotFound(format!("Revision {} not found", revision_id)))
    }

    /// Append a revision and apply the retention limits.
    ///
    /// An identical snapshot on top of the history is not stored twice;
    /// the existing revision comes back with `created == false`.
    #[allow(clippy::too_many_arguments)]
    pub async fn record(
        &self,
        kind: RevisionKind,
        tenant_id: i64,
        entity_id: i64,
        snapshot: RevisionSnapshot,
        revision_type: RevisionType,
        actor: &Actor,
        summary: Option<String>,
    ) -> Result<RecordOutcome, ContentError> {
        let revision = prepare_revision(revision_type, snapshot, actor, summary)?;
        let outcome = self
            .revisions
            .record(kind, tenant_id, entity_id, &revision)
            .await
            .context("Failed to record revision")?;

        if outcome.created {
            debug!(
                kind = %kind,
                tenant_id,
                entity_id,
                revision_number = outcome.revision.revision_number,
                revision_type = %revision_type,
                "Recorded revision"
            );
            self.prune_quietly(kind, tenant_id, entity_id).await?;
        }
        Ok(outcome)
    }

    async fn prune_quietly(&self, kind: RevisionKind, tenant_id: i64, entity_id: i64) -> Result<u64, ContentError> {
        Ok(self
            .revisions
            .prune(
                kind,
                tenant_id,
                entity_id,
                self.config.max_per_entity as usize,
                self.config.max_autosaves as usize,
            )
            .await
            .context("Failed to prune revisions")?)
    }

    pub async fn list(
        &self,
        kind: RevisionKind,
        tenant_id: i64,
        entity_id: i64,
        params: &ListParams,
    ) -> Result<PagedResult<RevisionSummary>, ContentError> {
        self.load_entity(kind, tenant_id, entity_id).await?;
        let (items, total) = self
            .revisions
            .list(kind, tenant_id, entity_id, params.limit(), params.offset())
            .await
            .context("Failed to list revisions")?;
        Ok(PagedResult::new(items, total, params))
    }

    pub async fn get(
        &self,
        kind: RevisionKind,
        tenant_id: i64,
        entity_id: i64,
        revision_id: i64,
    ) -> Result<Revision, ContentError> {
        self.load_revision(kind, tenant_id, entity_id, revision_id).await
    }

    /// Diff two revisions, or one revision against the live entity
    pub async fn compare(
        &self,
        kind: RevisionKind,
        tenant_id: i64,
        entity_id: i64,
        from_id: i64,
        to_id: Option<i64>,
    ) -> Result<RevisionDiff, ContentError> {
        let from = self.load_revision(kind, tenant_id, entity_id, from_id).await?;
        let (to_ref, to_snapshot) = match to_id {
            Some(to_id) => {
                let to = self.load_revision(kind, tenant_id, entity_id, to_id).await?;
                (revision_label(&to), to.snapshot)
            }
            None => {
                let entity = self.load_entity(kind, tenant_id, entity_id).await?;
                let current = RevisionRef {
                    id: None,
                    revision_number: None,
                    label: "current".to_string(),
                };
                (current, entity.snapshot())
            }
        };
        Ok(compare_snapshots(revision_label(&from), &from.snapshot, to_ref, &to_snapshot)?)
    }

    /// Write a revision's snapshot back to its entity.
    ///
    /// The live state is saved as a `pre_restore` revision first, and the
    /// restored state is recorded as a `restored` revision that becomes
    /// current. All of it commits or rolls back together.
    pub async fn restore(
        &self,
        kind: RevisionKind,
        tenant_id: i64,
        entity_id: i64,
        revision_id: i64,
        actor: &Actor,
    ) -> Result<(RestoreTarget, Revision), ContentError> {
        let mut entity = self.load_entity(kind, tenant_id, entity_id).await?;
        if entity.is_trashed() {
            return Err(ContentError::Conflict(format!(
                "{} {} is in the trash; restore it from the trash first",
                kind_label(kind),
                entity_id
            )));
        }
        let source = self.load_revision(kind, tenant_id, entity_id, revision_id).await?;

        let available = self
            .slugs
            .is_available(tenant_id, kind.slug_module(), &source.snapshot.slug, Some(entity_id))
            .await
            .context("Failed to check slug")?;
        if !available {
            return Err(ContentError::Conflict(format!(
                "Slug '{}' is now used by another {}",
                source.snapshot.slug,
                kind_label(kind).to_lowercase()
            )));
        }

        let pre_restore = prepare_revision(
            RevisionType::PreRestore,
            entity.snapshot(),
            actor,
            Some(format!("Before restoring revision #{}", source.revision_number)),
        )?;
        entity.apply_snapshot(&source.snapshot);
        let restored = prepare_revision(
            RevisionType::Restored,
            entity.snapshot(),
            actor,
            Some(format!("Restored from revision #{}", source.revision_number)),
        )?;

        let revision = self
            .revisions
            .restore(&entity, &pre_restore, &restored)
            .await
            .map_err(ContentError::from_write)?;

        info!(
            kind = %kind,
            tenant_id,
            entity_id,
            from_revision = source.revision_number,
            revision_number = revision.revision_number,
            "Restored revision"
        );
        self.prune_quietly(kind, tenant_id, entity_id).await?;
        self.invalidate(kind, tenant_id).await;

        let entity = self.load_entity(kind, tenant_id, entity_id).await?;
        Ok((entity, revision))
    }

    /// Apply the retention limits to one entity's history
    pub async fn prune(&self, kind: RevisionKind, tenant_id: i64, entity_id: i64) -> Result<u64, ContentError> {
        self.load_entity(kind, tenant_id, entity_id).await?;
        let removed = self.prune_quietly(kind, tenant_id, entity_id).await?;
        info!(kind = %kind, tenant_id, entity_id, removed, "Pruned revisions");
        Ok(removed)
    }

    pub async fn delete(
        &self,
        kind: RevisionKind,
        tenant_id: i64,
        entity_id: i64,
        revision_id: i64,
    ) -> Result<(), ContentError> {
        let revision = self.load_revision(kind, tenant_id, entity_id, revision_id).await?;
        if revision.is_current {
            return Err(ContentError::Conflict("The current revision cannot be deleted".to_string()));
        }
        let deleted = self
            .revisions
            .delete(kind, tenant_id, entity_id, revision_id)
            .await
            .context("Failed to delete revision")?;
        if !deleted {
            return Err(ContentError::Conflict("The current revision cannot be deleted".to_string()));
        }
        Ok(())
    }

    /// Delete non-current revisions older than `days`, across all tenants
    pub async fn purge_older_than(&self, kind: RevisionKind, days: u32) -> Result<u64, ContentError> {
        let cutoff = Utc::now() - Duration::days(i64::from(days));
        let removed = self
            .revisions
            .purge_older_than(kind, cutoff)
            .await
            .context("Failed to purge old revisions")?;
        if removed > 0 {
            info!(kind = %kind, days, removed, "Purged old revisions");
        }
        Ok(removed)
    }

    async fn invalidate(&self, kind: RevisionKind, tenant_id: i64) {
        match kind {
            RevisionKind::Page => invalidate(&self.cache, tenant_id, &[SCOPE_PAGES, SCOPE_SITE]).await,
            RevisionKind::BlogPost => {
                invalidate(
                    &self.cache,
                    tenant_id,
                    &[SCOPE_POSTS, SCOPE_CATEGORIES, SCOPE_TAGS, SCOPE_SITE],
                )
                .await
            }
        }
    }
}
