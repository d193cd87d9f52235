//! Content helpers shared by pages, posts and revisions
//!
//! Slug generation, HTML to text conversion and the statistics stored on
//! every revision.

use crate::cache::{tenant_prefix, Cache, CacheLayer};
use crate::db::repositories::SlugTaken;
use crate::models::{Actor, NewRevision, RevisionSnapshot, RevisionType};
use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};
use tracing::warn;

/// Errors of the page, blog and revision services
#[derive(Debug, thiserror::Error)]
pub enum ContentError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

impl ContentError {
    /// Map a repository write error, surfacing slug collisions as conflicts
    pub fn from_write(err: anyhow::Error) -> Self {
        match err.downcast_ref::<SlugTaken>() {
            Some(taken) => ContentError::Conflict(taken.to_string()),
            None => ContentError::InternalError(err),
        }
    }
}

/// Cache scopes of a tenant's public data
pub const SCOPE_PAGES: &str = "pages";
pub const SCOPE_POSTS: &str = "posts";
pub const SCOPE_CATEGORIES: &str = "categories";
pub const SCOPE_TAGS: &str = "tags";
pub const SCOPE_SITE: &str = "site";

/// Cache key inside a tenant scope
pub fn cache_key(tenant_id: i64, scope: &str, rest: &str) -> String {
    format!("{}{}:{}", tenant_prefix(tenant_id), scope, rest)
}

/// Drop every cached entry of the given scopes
pub async fn invalidate(cache: &Cache, tenant_id: i64, scopes: &[&str]) {
    for scope in scopes {
        let pattern = format!("{}{}:*", tenant_prefix(tenant_id), scope);
        if let Err(e) = cache.delete_pattern(&pattern).await {
            warn!(tenant_id, scope, "Failed to invalidate cache: {:#}", e);
        }
    }
}

/// Longest slug accepted for pages, posts, categories and tags
pub const MAX_SLUG_LENGTH: usize = 200;

/// Longest accepted page or post title
pub const MAX_TITLE_LENGTH: usize = 255;

static SCRIPT_STYLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<(script|style)\b[^>]*>.*?</(script|style)\s*>").expect("valid regex"));
static BLOCK_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)</?(p|div|br|li|h[1-6]|tr|blockquote|section|article)\b[^>]*>").expect("valid regex"));
static ANY_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]*>").expect("valid regex"));
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));

fn fold_accent(c: char) -> Option<char> {
    let folded = match c {
        'á' | 'à' | 'â' | 'ä' | 'ã' | 'å' => 'a',
        'é' | 'è' | 'ê' | 'ë' => 'e',
        'í' | 'ì' | 'î' | 'ï' => 'i',
        'ó' | 'ò' | 'ô' | 'ö' | 'õ' => 'o',
        'ú' | 'ù' | 'û' | 'ü' => 'u',
        'ñ' => 'n',
        'ç' => 'c',
        _ => return None,
    };
    Some(folded)
}

/// Turn a title or name into a URL slug.
///
/// Latin accents are folded to ASCII, other letters and digits are kept,
/// everything else becomes a single hyphen.
pub fn generate_slug(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_hyphen = false;

    for c in text.to_lowercase().chars() {
        let c = fold_accent(c).unwrap_or(c);
        if c.is_alphanumeric() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(c);
        } else {
            pending_hyphen = true;
        }
    }

    truncate_slug(slug)
}

fn truncate_slug(slug: String) -> String {
    if slug.chars().count() <= MAX_SLUG_LENGTH {
        return slug;
    }
    let cut: String = slug.chars().take(MAX_SLUG_LENGTH).collect();
    cut.trim_end_matches('-').to_string()
}

/// Slug from user input, or generated from `fallback` when blank
pub fn resolve_slug(input: Option<&str>, fallback: &str) -> Result<String, String> {
    let source = match input.map(str::trim).filter(|s| !s.is_empty()) {
        Some(given) => given,
        None => fallback,
    };
    let slug = generate_slug(source);
    if slug.is_empty() {
        return Err("Slug cannot be empty".to_string());
    }
    Ok(slug)
}

/// Blank optional text becomes `None`
pub fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

pub fn validate_title(title: &str) -> Result<String, ContentError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(ContentError::ValidationError("Title cannot be empty".to_string()));
    }
    if title.chars().count() > MAX_TITLE_LENGTH {
        return Err(ContentError::ValidationError(format!(
            "Title cannot be longer than {} characters",
            MAX_TITLE_LENGTH
        )));
    }
    Ok(title.to_string())
}

/// Visible text of an HTML fragment, whitespace collapsed
pub fn strip_html(html: &str) -> String {
    let without_code = SCRIPT_STYLE.replace_all(html, " ");
    let spaced = BLOCK_TAG.replace_all(&without_code, " ");
    let text = ANY_TAG.replace_all(&spaced, "");
    let decoded = text
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&");
    WHITESPACE.replace_all(&decoded, " ").trim().to_string()
}

/// `(word_count, char_count)` of the visible text
pub fn content_stats(html: &str) -> (i64, i64) {
    let text = strip_html(html);
    let words = text.split_whitespace().count() as i64;
    let chars = text.chars().count() as i64;
    (words, chars)
}

/// Plain-text excerpt cut at a word boundary
pub fn make_excerpt(html: &str, max_chars: usize) -> String {
    let text = strip_html(html);
    if text.chars().count() <= max_chars {
        return text;
    }
    let mut excerpt = String::new();
    for word in text.split_whitespace() {
        let next_len = excerpt.chars().count() + word.chars().count() + usize::from(!excerpt.is_empty());
        if next_len > max_chars {
            break;
        }
        if !excerpt.is_empty() {
            excerpt.push(' ');
        }
        excerpt.push_str(word);
    }
    if excerpt.is_empty() {
        excerpt = text.chars().take(max_chars).collect();
    }
    excerpt.push('…');
    excerpt
}

/// SHA-256 of the snapshot's JSON form, hex encoded
pub fn content_hash(snapshot: &RevisionSnapshot) -> Result<String> {
    let json = serde_json::to_vec(snapshot).context("Failed to encode snapshot")?;
    Ok(format!("{:x}", Sha256::digest(&json)))
}

/// Build a revision for `snapshot` with hash and text statistics filled in
pub fn prepare_revision(
    revision_type: RevisionType,
    snapshot: RevisionSnapshot,
    actor: &Actor,
    summary: Option<String>,
) -> Result<NewRevision> {
    let content_hash = content_hash(&snapshot)?;
    let (word_count, char_count) = content_stats(&snapshot.content);
    Ok(NewRevision {
        revision_type,
        summary: summary.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()),
        snapshot,
        content_hash,
        word_count,
        char_count,
        actor: actor.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_generate_slug() {
        assert_eq!(generate_slug("Hello World"), "hello-world");
        assert_eq!(generate_slug("  Acerca de Nosotros!  "), "acerca-de-nosotros");
        assert_eq!(generate_slug("Año Nuevo en Málaga"), "ano-nuevo-en-malaga");
        assert_eq!(generate_slug("C++ & Rust"), "c-rust");
        assert_eq!(generate_slug("中文 标题"), "中文-标题");
        assert_eq!(generate_slug("---"), "");
    }

    #[test]
    fn test_resolve_slug() {
        assert_eq!(resolve_slug(None, "About Us").unwrap(), "about-us");
        assert_eq!(resolve_slug(Some("  "), "About Us").unwrap(), "about-us");
        assert_eq!(resolve_slug(Some("Custom Slug"), "About").unwrap(), "custom-slug");
        assert!(resolve_slug(None, "!!!").is_err());
    }

    #[test]
    fn test_strip_html() {
        let html = "<h1>Title</h1><p>Hello&nbsp;<b>world</b> &amp; friends</p><script>alert(1)</script>";
        assert_eq!(strip_html(html), "Title Hello world & friends");
        assert_eq!(strip_html("<p>a</p><p>b</p>"), "a b");
        assert_eq!(strip_html(""), "");
    }

    #[test]
    fn test_content_stats() {
        assert_eq!(content_stats("<p>one two</p><p>three</p>"), (3, 13));
        assert_eq!(content_stats(""), (0, 0));
    }

    #[tokio::test]
    async fn test_invalidate_only_touches_named_scopes() {
        let cache = Cache::new();
        let ttl = std::time::Duration::from_secs(60);
        cache.set(&cache_key(1, SCOPE_PAGES, "slug:about"), &1, ttl).await.unwrap();
        cache.set(&cache_key(1, SCOPE_POSTS, "list:1:10"), &2, ttl).await.unwrap();
        cache.set(&cache_key(2, SCOPE_PAGES, "slug:about"), &3, ttl).await.unwrap();

        invalidate(&cache, 1, &[SCOPE_PAGES]).await;

        assert_eq!(cache.get::<i32>("t:1:pages:slug:about").await.unwrap(), None);
        assert_eq!(cache.get::<i32>("t:1:posts:list:1:10").await.unwrap(), Some(2));
        assert_eq!(cache.get::<i32>("t:2:pages:slug:about").await.unwrap(), Some(3));
    }

    #[test]
    fn test_make_excerpt() {
        assert_eq!(make_excerpt("<p>short</p>", 20), "short");
        assert_eq!(make_excerpt("<p>one two three four</p>", 9), "one two…");
        assert_eq!(make_excerpt("<p>abcdefghij</p>", 4), "abcd…");
    }

    #[test]
    fn test_hash_changes_with_any_field() {
        let base = RevisionSnapshot {
            title: "About".into(),
            slug: "about".into(),
            content: "<p>x</p>".into(),
            ..RevisionSnapshot::default()
        };
        let mut other = base.clone();
        other.seo_title = Some("About".into());

        let a = content_hash(&base).unwrap();
        assert_eq!(a.len(), 64);
        assert_eq!(a, content_hash(&base.clone()).unwrap());
        assert_ne!(a, content_hash(&other).unwrap());
    }

    #[test]
    fn test_prepare_revision_counts_visible_text() {
        let snapshot = RevisionSnapshot {
            title: "T".into(),
            slug: "t".into(),
            content: "<p>alpha <em>beta</em></p>".into(),
            ..RevisionSnapshot::default()
        };
        let revision = prepare_revision(RevisionType::Manual, snapshot, &Actor::system(), Some("  ".into())).unwrap();
        assert_eq!(revision.word_count, 2);
        assert_eq!(revision.char_count, 10);
        assert!(revision.summary.is_none());
    }

    proptest! {
        #[test]
        fn prop_slug_is_url_safe(text in "\\PC{0,80}") {
            let slug = generate_slug(&text);
            prop_assert!(!slug.starts_with('-'));
            prop_assert!(!slug.ends_with('-'));
            prop_assert!(!slug.contains("--"));
            prop_assert!(slug.chars().all(|c| c == '-' || c.is_alphanumeric()));
            prop_assert!(slug.chars().count() <= MAX_SLUG_LENGTH);
        }

        #[test]
        fn prop_slug_is_idempotent(text in "[a-zA-Z0-9 áéíóúñ_.-]{0,60}") {
            let once = generate_slug(&text);
            prop_assert_eq!(generate_slug(&once), once);
        }

        #[test]
        fn prop_stripped_text_has_no_tags(words in prop::collection::vec("[a-z]{1,8}", 0..20)) {
            let html = words.iter().map(|w| format!("<span>{}</span>", w)).collect::<Vec<_>>().join("<br/>");
            let text = strip_html(&html);
            prop_assert!(!text.contains('<'));
            prop_assert_eq!(text.split_whitespace().count(), words.len());
        }
    }
}
