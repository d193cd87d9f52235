//! Blog category service
//!
//! Categories form a tree per tenant. Updates that would make a category
//! its own ancestor are rejected; deleting a category hands its children
//! to its parent.

use crate::cache::{Cache, CacheLayer};
use crate::db::repositories::BlogCategoryRepository;
use crate::models::{BlogCategory, CategoryTree, CreateCategoryInput, UpdateCategoryInput};
use crate::services::content::{
    cache_key, invalidate, non_empty, resolve_slug, ContentError, MAX_SLUG_LENGTH, SCOPE_CATEGORIES,
    SCOPE_POSTS,
};
use anyhow::Context;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub struct BlogCategoryService {
    repo: Arc<dyn BlogCategoryRepository>,
    cache: Arc<Cache>,
    cache_ttl: Duration,
}

fn validate_name(name: &str) -> Result<String, ContentError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ContentError::ValidationError("Category name cannot be empty".to_string()));
    }
    if name.chars().count() > MAX_SLUG_LENGTH {
        return Err(ContentError::ValidationError(format!(
            "Category name cannot be longer than {} characters",
            MAX_SLUG_LENGTH
        )));
    }
    Ok(name.to_string())
}

/// Whether `category_id` is `candidate_parent` or one of its ancestors
fn creates_cycle(categories: &[BlogCategory], category_id: i64, candidate_parent: i64) -> bool {
    let parents: HashMap<i64, Option<i64>> = categories.iter().map(|c| (c.id, c.parent_id)).collect();
    let mut seen = HashSet::new();
    let mut cursor = Some(candidate_parent);
    while let Some(id) = cursor {
        if id == category_id || !seen.insert(id) {
            return true;
        }
        cursor = parents.get(&id).copied().flatten();
    }
    false
}

impl BlogCategoryService {
    pub fn new(repo: Arc<dyn BlogCategoryRepository>, cache: Arc<Cache>, cache_ttl: Duration) -> Self {
        Self { repo, cache, cache_ttl }
    }

    async fn invalidate(&self, tenant_id: i64) {
        invalidate(&self.cache, tenant_id, &[SCOPE_CATEGORIES, SCOPE_POSTS]).await;
    }

    async fn ensure_slug_free(&self, tenant_id: i64, slug: &str, exclude_id: Option<i64>) -> Result<(), ContentError> {
        if self
            .repo
            .exists_by_slug(tenant_id, slug, exclude_id)
            .await
            .context("Failed to check category slug")?
        {
            return Err(ContentError::Conflict(format!("Category slug '{}' is already in use", slug)));
        }
        Ok(())
    }

    async fn ensure_parent(&self, tenant_id: i64, parent_id: i64) -> Result<(), ContentError> {
        self.repo
            .get_by_id(tenant_id, parent_id)
            .await
            .context("Failed to get parent category")?
            .map(|_| ())
            .ok_or_else(|| ContentError::ValidationError(format!("Parent category {} not found", parent_id)))
    }

    pub async fn create(&self, tenant_id: i64, input: CreateCategoryInput) -> Result<BlogCategory, ContentError> {
        let name = validate_name(&input.name)?;
        let slug = resolve_slug(input.slug.as_deref(), &name).map_err(ContentError::ValidationError)?;
        self.ensure_slug_free(tenant_id, &slug, None).await?;
        if let Some(parent_id) = input.parent_id {
            self.ensure_parent(tenant_id, parent_id).await?;
        }

        let mut category = BlogCategory::new(tenant_id, name, slug);
        category.parent_id = input.parent_id;
        category.description = non_empty(input.description);
        category.sort_order = input.sort_order.unwrap_or(0);

        let category = self.repo.create(&category).await.context("Failed to create category")?;
        self.invalidate(tenant_id).await;
        Ok(category)
    }

    pub async fn get(&self, tenant_id: i64, id: i64) -> Result<BlogCategory, ContentError> {
        self.repo
            .get_by_id(tenant_id, id)
            .await
            .context("Failed to get category")?
            .ok_or_else(|| ContentError::NotFound(format!("Category {} not found", id)))
    }

    pub async fn get_by_slug(&self, tenant_id: i64, slug: &str) -> Result<Option<BlogCategory>, ContentError> {
        Ok(self
            .repo
            .get_by_slug(tenant_id, slug)
            .await
            .context("Failed to get category by slug")?)
    }

    pub async fn update(&self, tenant_id: i64, id: i64, input: UpdateCategoryInput) -> Result<BlogCategory, ContentError> {
        let mut category = self.get(tenant_id, id).await?;

        if let Some(name) = &input.name {
            category.name = validate_name(name)?;
        }
        if let Some(slug) = &input.slug {
            let slug = resolve_slug(Some(slug), &category.name).map_err(ContentError::ValidationError)?;
            self.ensure_slug_free(tenant_id, &slug, Some(id)).await?;
            category.slug = slug;
        }
        match input.parent_id {
            Some(0) => category.parent_id = None,
            Some(parent_id) => {
                let all = self.repo.list(tenant_id).await.context("Failed to list categories")?;
                if !all.iter().any(|c| c.id == parent_id) {
                    return Err(ContentError::ValidationError(format!(
                        "Parent category {} not found",
                        parent_id
                    )));
                }
                if creates_cycle(&all, id, parent_id) {
                    return Err(ContentError::ValidationError(
                        "A category cannot be moved under itself or one of its descendants".to_string(),
                    ));
                }
                category.parent_id = Some(parent_id);
            }
            None => {}
        }
        if input.description.is_some() {
            category.description = non_empty(input.description);
        }
        if let Some(sort_order) = input.sort_order {
            category.sort_order = sort_order;
        }

        let category = self.repo.update(&category).await.context("Failed to update category")?;
        self.invalidate(tenant_id).await;
        Ok(category)
    }

    /// Delete a category; children move up to its parent and posts lose the link
    pub async fn delete(&self, tenant_id: i64, id: i64) -> Result<(), ContentError> {
        if !self.repo.delete(tenant_id, id).await.context("Failed to delete category")? {
            return Err(ContentError::NotFound(format!("Category {} not found", id)));
        }
        info!(tenant_id, category_id = id, "Deleted category");
        self.invalidate(tenant_id).await;
        Ok(())
    }

    pub async fn list(&self, tenant_id: i64) -> Result<Vec<BlogCategory>, ContentError> {
        Ok(self.repo.list(tenant_id).await.context("Failed to list categories")?)
    }

    pub async fn tree(&self, tenant_id: i64) -> Result<Vec<CategoryTree>, ContentError> {
        Ok(CategoryTree::build(self.list(tenant_id).await?))
    }

    /// Flat category list, cached for the public API
    pub async fn list_public(&self, tenant_id: i64) -> Result<Vec<BlogCategory>, ContentError> {
        let key = cache_key(tenant_id, SCOPE_CATEGORIES, "list");
        if let Some(categories) = self.cache.get::<Vec<BlogCategory>>(&key).await.ok().flatten() {
            return Ok(categories);
        }
        let categories = self.list(tenant_id).await?;
        let _ = self.cache.set(&key, &categories, self.cache_ttl).await;
        Ok(categories)
    }

    /// Fail unless every id is a category of the tenant
    pub async fn ensure_exist(&self, tenant_id: i64, ids: &[i64]) -> Result<(), ContentError> {
        if ids.is_empty() {
            return Ok(());
        }
        let known: HashSet<i64> = self.list(tenant_id).await?.into_iter().map(|c| c.id).collect();
        match ids.iter().find(|id| !known.contains(id)) {
            Some(missing) => Err(ContentError::ValidationError(format!("Category {} not found", missing))),
            None => Ok(()),
        }
    }
}
