//! Blog category model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Hierarchical blog category
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlogCategory {
    pub id: i64,
    pub tenant_id: i64,
    pub parent_id: Option<i64>,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub sort_order: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BlogCategory {
    pub fn new(tenant_id: i64, name: String, slug: String) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            tenant_id,
            parent_id: None,
            name,
            slug,
            description: None,
            sort_order: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Category with its nested children
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryTree {
    #[serde(flatten)]
    pub category: BlogCategory,
    pub children: Vec<CategoryTree>,
}

impl CategoryTree {
    /// Build a forest from a flat list, children ordered by `sort_order` then name.
    ///
    /// Categories whose parent is missing from the list become roots.
    pub fn build(categories: Vec<BlogCategory>) -> Vec<CategoryTree> {
        use std::collections::{HashMap, HashSet};

        let ids: HashSet<i64> = categories.iter().map(|c| c.id).collect();
        let mut by_parent: HashMap<Option<i64>, Vec<BlogCategory>> = HashMap::new();
        for category in categories {
            let parent = category.parent_id.filter(|p| ids.contains(p));
            by_parent.entry(parent).or_default().push(category);
        }

        fn attach(parent: Option<i64>, by_parent: &mut HashMap<Option<i64>, Vec<BlogCategory>>) -> Vec<CategoryTree> {
            let mut level = by_parent.remove(&parent).unwrap_or_default();
            level.sort_by(|a, b| a.sort_order.cmp(&b.sort_order).then_with(|| a.name.cmp(&b.name)));
            level
                .into_iter()
                .map(|category| {
                    let children = attach(Some(category.id), by_parent);
                    CategoryTree { category, children }
                })
                .collect()
        }

        attach(None, &mut by_parent)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateCategoryInput {
    pub name: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub parent_id: Option<i64>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub sort_order: Option<i32>,
}

/// Input for updating a category.
///
/// `parent_id: Some(0)` moves the category to the top level.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateCategoryInput {
    pub name: Option<String>,
    pub slug: Option<String>,
    pub parent_id: Option<i64>,
    pub description: Option<String>,
    pub sort_order: Option<i32>,
}
