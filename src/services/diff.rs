//! Snapshot comparison
//!
//! Field-level changes plus a unified line diff of the HTML body. A line
//! break is inserted after each block-level closing tag so single-line HTML
//! still diffs paragraph by paragraph. The input text itself is never
//! altered, so any change to `content` shows up in the diff.

use crate::models::{FieldChange, RevisionDiff, RevisionRef, RevisionSnapshot};
use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use similar::{ChangeTag, TextDiff};
use std::collections::BTreeSet;

static BLOCK_END: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:</(?:p|div|h[1-6]|li|ul|ol|blockquote|pre|table|tr|section|figure)>|<br\s*/?>)[ \t]*")
        .expect("valid regex")
});

/// Context lines around each hunk
const CONTEXT_RADIUS: usize = 3;

fn split_blocks(html: &str) -> String {
    BLOCK_END.replace_all(html, "$0\n").into_owned()
}

/// `(unified_diff, insertions, deletions)` of two HTML bodies
pub fn diff_content(old: &str, new: &str, old_label: &str, new_label: &str) -> (String, usize, usize) {
    let old = split_blocks(old);
    let new = split_blocks(new);
    let diff = TextDiff::from_lines(&old, &new);

    let (mut insertions, mut deletions) = (0, 0);
    for change in diff.iter_all_changes() {
        match change.tag() {
            ChangeTag::Insert => insertions += 1,
            ChangeTag::Delete => deletions += 1,
            ChangeTag::Equal => {}
        }
    }

    if insertions == 0 && deletions == 0 {
        return (String::new(), 0, 0);
    }
    let unified = diff
        .unified_diff()
        .context_radius(CONTEXT_RADIUS)
        .header(old_label, new_label)
        .to_string();
    (unified, insertions, deletions)
}

fn as_object(snapshot: &RevisionSnapshot) -> Result<serde_json::Map<String, Value>> {
    match serde_json::to_value(snapshot).context("Failed to encode snapshot")? {
        Value::Object(map) => Ok(map),
        other => Err(anyhow::anyhow!("Snapshot encoded as {}", other)),
    }
}

/// Changed fields other than `content`, in field name order
pub fn field_changes(from: &RevisionSnapshot, to: &RevisionSnapshot) -> Result<Vec<FieldChange>> {
    let from = as_object(from)?;
    let to = as_object(to)?;
    let keys: BTreeSet<&String> = from.keys().chain(to.keys()).collect();

    Ok(keys
        .into_iter()
        .filter(|k| k.as_str() != "content")
        .filter_map(|k| {
            let before = from.get(k).cloned().unwrap_or(Value::Null);
            let after = to.get(k).cloned().unwrap_or(Value::Null);
            (before != after).then(|| FieldChange {
                field: k.clone(),
                from: before,
                to: after,
            })
        })
        .collect())
}

pub fn compare_snapshots(
    from_ref: RevisionRef,
    from: &RevisionSnapshot,
    to_ref: RevisionRef,
    to: &RevisionSnapshot,
) -> Result<RevisionDiff> {
    let fields = field_changes(from, to)?;
    let (content_diff, insertions, deletions) = diff_content(&from.content, &to.content, &from_ref.label, &to_ref.label);
    Ok(RevisionDiff {
        from: from_ref,
        to: to_ref,
        fields,
        content_changed: from.content != to.content,
        content_diff,
        insertions,
        deletions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ContentStatus;
    use proptest::prelude::*;

    fn snapshot(title: &str, content: &str) -> RevisionSnapshot {
        RevisionSnapshot {
            title: title.into(),
            slug: "about".into(),
            content: content.into(),
            template: Some("page".into()),
            ..RevisionSnapshot::default()
        }
    }

    fn label(name: &str) -> RevisionRef {
        RevisionRef {
            id: None,
            revision_number: None,
            label: name.into(),
        }
    }

    #[test]
    fn test_single_line_html_diffs_by_paragraph() {
        let (diff, ins, del) = diff_content("<p>one</p><p>two</p><p>three</p>", "<p>one</p><p>2</p><p>three</p>", "r1", "r2");
        assert_eq!((ins, del), (1, 1));
        assert!(diff.contains("--- r1"));
        assert!(diff.contains("+++ r2"));
        assert!(diff.contains("-<p>two</p>"));
        assert!(diff.contains("+<p>2</p>"));
    }

    #[test]
    fn test_identical_content_has_empty_diff() {
        assert_eq!(diff_content("<p>x</p>", "<p>x</p>", "a", "b"), (String::new(), 0, 0));
    }

    #[test]
    fn test_whitespace_between_blocks_is_reported() {
        let (diff, ins, del) = diff_content("<p>a</p><p>b</p>", "<p>a</p>  <p>b</p>", "r1", "r2");
        assert_eq!((ins, del), (1, 1));
        assert!(diff.contains("+<p>a</p>  "));

        let (_, ins, del) = diff_content("<p>a</p>", "<p>a</p>\n", "r1", "r2");
        assert!(ins + del > 0);
    }

    #[test]
    fn test_field_changes_skip_content() {
        let mut to = snapshot("About us", "<p>changed</p>");
        to.status = ContentStatus::Published;
        let changes = field_changes(&snapshot("About", "<p>x</p>"), &to).unwrap();

        let names: Vec<_> = changes.iter().map(|c| c.field.as_str()).collect();
        assert_eq!(names, vec!["status", "title"]);
        assert_eq!(changes[1].from, Value::from("About"));
        assert_eq!(changes[1].to, Value::from("About us"));
    }

    #[test]
    fn test_missing_optional_field_compares_as_null() {
        let mut with_image = snapshot("A", "");
        with_image.featured_image = Some("/img.png".into());
        let changes = field_changes(&snapshot("A", ""), &with_image).unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].from, Value::Null);
    }

    #[test]
    fn test_compare_snapshots() {
        let diff = compare_snapshots(label("r1"), &snapshot("A", "<p>a</p>"), label("current"), &snapshot("A", "<p>b</p>")).unwrap();
        assert!(diff.fields.is_empty());
        assert!(diff.content_changed);
        assert_eq!((diff.insertions, diff.deletions), (1, 1));
    }

    proptest! {
        #[test]
        fn prop_counts_match_paragraph_sets(
            old in prop::collection::vec("[a-z]{1,6}", 0..12),
            new in prop::collection::vec("[a-z]{1,6}", 0..12),
        ) {
            let html = |ws: &Vec<String>| ws.iter().map(|w| format!("<p>{}</p>", w)).collect::<String>();
            let (_, ins, del) = diff_content(&html(&old), &html(&new), "a", "b");
            // Every removed line is a deletion, every added line an insertion
            prop_assert_eq!(old.len() + ins, new.len() + del);
            if old == new {
                prop_assert_eq!((ins, del), (0, 0));
            }
        }

        #[test]
        fn prop_changed_content_always_has_a_diff(
            words in prop::collection::vec("[a-z]{1,4}", 1..6),
            gaps in prop::collection::vec(prop::sample::select(vec!["", " ", "\n", "\t ", "\n\n"]), 6),
        ) {
            let plain = words.iter().map(|w| format!("<p>{}</p>", w)).collect::<String>();
            let spaced = words
                .iter()
                .zip(&gaps)
                .map(|(w, gap)| format!("<p>{}</p>{}", w, gap))
                .collect::<String>();
            let (diff, ins, del) = diff_content(&plain, &spaced, "a", "b");
            prop_assert_eq!(plain != spaced, ins + del > 0);
            prop_assert_eq!(plain != spaced, !diff.is_empty());
        }
    }
}
