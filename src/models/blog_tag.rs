//! Blog tag model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlogTag {
    pub id: i64,
    pub tenant_id: i64,
    pub name: String,
    pub slug: String,
    pub created_at: DateTime<Utc>,
}

/// Tag with the number of posts using it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagWithCount {
    #[serde(flatten)]
    pub tag: BlogTag,
    pub post_count: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TagInput {
    pub name: String,
    #[serde(default)]
    pub slug: Option<String>,
}
