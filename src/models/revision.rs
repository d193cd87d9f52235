//! Content revision model
//!
//! Pages and blog posts keep an append-only history of snapshots in
//! `page_revisions` and `blog_post_revisions`. Both tables share one row
//! shape; `RevisionKind` selects the tables and columns involved.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ContentStatus, SlugModule};

/// Which kind of content a revision belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevisionKind {
    Page,
    BlogPost,
}

impl RevisionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RevisionKind::Page => "page",
            RevisionKind::BlogPost => "blog_post",
        }
    }

    pub fn revision_table(&self) -> &'static str {
        match self {
            RevisionKind::Page => "page_revisions",
            RevisionKind::BlogPost => "blog_post_revisions",
        }
    }

    pub fn entity_table(&self) -> &'static str {
        match self {
            RevisionKind::Page => "pages",
            RevisionKind::BlogPost => "blog_posts",
        }
    }

    /// Foreign key column of the revision table
    pub fn entity_column(&self) -> &'static str {
        match self {
            RevisionKind::Page => "page_id",
            RevisionKind::BlogPost => "post_id",
        }
    }

    pub fn slug_module(&self) -> SlugModule {
        match self {
            RevisionKind::Page => SlugModule::Pages,
            RevisionKind::BlogPost => SlugModule::Blog,
        }
    }
}

impl std::fmt::Display for RevisionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Why a revision was written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevisionType {
    /// First save of the content
    Initial,
    /// Ordinary update
    Manual,
    /// Periodic draft save from the editor
    Autosave,
    /// Update that moved the content into `published`
    Published,
    /// Backup of the live row taken before a restore
    PreRestore,
    /// State written by a restore
    Restored,
}

impl RevisionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RevisionType::Initial => "initial",
            RevisionType::Manual => "manual",
            RevisionType::Autosave => "autosave",
            RevisionType::Published => "published",
            RevisionType::PreRestore => "pre_restore",
            RevisionType::Restored => "restored",
        }
    }

    /// Whether an identical snapshot on top of the history is skipped
    pub fn skips_duplicates(&self) -> bool {
        !matches!(self, RevisionType::PreRestore | RevisionType::Restored)
    }

    /// Whether recording this revision moves `current_revision_id`.
    ///
    /// Autosaves never touch the live row, so the pointer stays put.
    pub fn moves_pointer(&self) -> bool {
        *self != RevisionType::Autosave
    }
}

impl std::fmt::Display for RevisionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for RevisionType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "initial" => Ok(Self::Initial),
            "manual" => Ok(Self::Manual),
            "autosave" => Ok(Self::Autosave),
            "published" => Ok(Self::Published),
            "pre_restore" => Ok(Self::PreRestore),
            "restored" => Ok(Self::Restored),
            _ => Err(anyhow::anyhow!("Invalid revision type: {}", s)),
        }
    }
}

/// Editable fields of a page or post at one point in time.
///
/// Page-only and post-only fields are omitted from the JSON when absent,
/// so a page snapshot never carries post fields and vice versa.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RevisionSnapshot {
    pub title: String,
    pub slug: String,
    pub content: String,
    #[serde(default)]
    pub excerpt: Option<String>,
    #[serde(default)]
    pub status: ContentStatus,
    #[serde(default)]
    pub seo_title: Option<String>,
    #[serde(default)]
    pub seo_description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub featured_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_comments: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_ids: Option<Vec<i64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag_ids: Option<Vec<i64>>,
}

/// Who caused a change, recorded as audit metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Actor {
    pub admin_id: Option<i64>,
    pub name: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl Actor {
    /// Actor used by background maintenance
    pub fn system() -> Self {
        Self {
            name: Some("system".to_string()),
            ..Self::default()
        }
    }
}

/// A fully loaded revision
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Revision {
    pub id: i64,
    pub tenant_id: i64,
    /// Page or post id
    pub entity_id: i64,
    pub revision_number: i64,
    pub revision_type: RevisionType,
    pub title: String,
    pub summary: Option<String>,
    pub snapshot: RevisionSnapshot,
    pub content_hash: String,
    pub word_count: i64,
    pub char_count: i64,
    pub author_id: Option<i64>,
    pub author_name: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Whether the owning row points at this revision
    #[serde(default)]
    pub is_current: bool,
}

/// Revision listing entry without the snapshot body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevisionSummary {
    pub id: i64,
    pub revision_number: i64,
    pub revision_type: RevisionType,
    pub title: String,
    pub summary: Option<String>,
    pub content_hash: String,
    pub word_count: i64,
    pub char_count: i64,
    pub author_id: Option<i64>,
    pub author_name: Option<String>,
    pub ip_address: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub is_current: bool,
}

/// A revision ready to be appended
#[derive(Debug, Clone)]
pub struct NewRevision {
    pub revision_type: RevisionType,
    pub summary: Option<String>,
    pub snapshot: RevisionSnapshot,
    pub content_hash: String,
    pub word_count: i64,
    pub char_count: i64,
    pub actor: Actor,
}

/// Result of recording a revision
#[derive(Debug, Clone)]
pub struct RecordOutcome {
    pub revision: Revision,
    /// False when an identical snapshot was already on top
    pub created: bool,
}

/// One side of a comparison
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevisionRef {
    /// `None` for the live row
    pub id: Option<i64>,
    pub revision_number: Option<i64>,
    pub label: String,
}

/// A changed snapshot field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    pub field: String,
    pub from: serde_json::Value,
    pub to: serde_json::Value,
}

/// Comparison of two snapshots
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevisionDiff {
    pub from: RevisionRef,
    pub to: RevisionRef,
    /// Changed fields other than `content`
    pub fields: Vec<FieldChange>,
    pub content_changed: bool,
    /// Unified line diff of `content`
    pub content_diff: String,
    pub insertions: usize,
    pub deletions: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_revision_type_round_trip() {
        for kind in [
            RevisionType::Initial,
            RevisionType::Manual,
            RevisionType::Autosave,
            RevisionType::Published,
            RevisionType::PreRestore,
            RevisionType::Restored,
        ] {
            assert_eq!(kind.as_str().parse::<RevisionType>().unwrap(), kind);
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
        }
    }

    #[test]
    fn test_restore_types_never_deduplicate() {
        assert!(RevisionType::Manual.skips_duplicates());
        assert!(RevisionType::Autosave.skips_duplicates());
        assert!(!RevisionType::PreRestore.skips_duplicates());
        assert!(!RevisionType::Restored.skips_duplicates());
    }

    #[test]
    fn test_autosave_keeps_pointer() {
        assert!(!RevisionType::Autosave.moves_pointer());
        assert!(RevisionType::Restored.moves_pointer());
    }

    #[test]
    fn test_page_snapshot_json_omits_post_fields() {
        let snapshot = RevisionSnapshot {
            title: "About".into(),
            slug: "about".into(),
            content: "<p>x</p>".into(),
            template: Some("page".into()),
            ..RevisionSnapshot::default()
        };
        let json = serde_json::to_value(&snapshot).unwrap();
        assert!(json.get("category_ids").is_none());
        assert!(json.get("allow_comments").is_none());
        assert_eq!(json["template"], "page");
    }

    #[test]
    fn test_snapshot_reads_legacy_json() {
        let snapshot: RevisionSnapshot =
            serde_json::from_str(r#"{"title":"Old","slug":"old","content":""}"#).unwrap();
        assert_eq!(snapshot.status, ContentStatus::Draft);
        assert!(snapshot.excerpt.is_none());
    }

    #[test]
    fn test_kind_tables() {
        assert_eq!(RevisionKind::Page.revision_table(), "page_revisions");
        assert_eq!(RevisionKind::BlogPost.entity_column(), "post_id");
        assert_eq!(RevisionKind::BlogPost.slug_module(), SlugModule::Blog);
    }
}
