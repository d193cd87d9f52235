//! Revision repository
//!
//! Revisions of pages and blog posts live in two tables with the same row
//! shape. Every method takes a [`RevisionKind`] that selects the revision
//! table, the owning table and the foreign key column.
//!
//! Rows are only ever appended or deleted. Multi-step writes (record,
//! restore) run inside one transaction so the revision numbering and the
//! owning row's `current_revision_id` never disagree.

use super::{blog_post, page};
use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{
    BlogPost, NewRevision, Page, RecordOutcome, Revision, RevisionKind, RevisionSnapshot, RevisionSummary,
    RevisionType,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{MySqlConnection, Row, SqliteConnection};
use std::sync::Arc;

/// Entity state to write back during a restore
#[derive(Debug, Clone, serde::Serialize)]
#[serde(untagged)]
pub enum RestoreTarget {
    Page(Page),
    Post(BlogPost),
}

impl RestoreTarget {
    pub fn kind(&self) -> RevisionKind {
        match self {
            RestoreTarget::Page(_) => RevisionKind::Page,
            RestoreTarget::Post(_) => RevisionKind::BlogPost,
        }
    }

    pub fn tenant_id(&self) -> i64 {
        match self {
            RestoreTarget::Page(p) => p.tenant_id,
            RestoreTarget::Post(p) => p.tenant_id,
        }
    }

    pub fn entity_id(&self) -> i64 {
        match self {
            RestoreTarget::Page(p) => p.id,
            RestoreTarget::Post(p) => p.id,
        }
    }

    pub fn current_revision_id(&self) -> Option<i64> {
        match self {
            RestoreTarget::Page(p) => p.current_revision_id,
            RestoreTarget::Post(p) => p.current_revision_id,
        }
    }

    pub fn is_trashed(&self) -> bool {
        match self {
            RestoreTarget::Page(p) => p.is_trashed(),
            RestoreTarget::Post(p) => p.is_trashed(),
        }
    }

    pub fn snapshot(&self) -> RevisionSnapshot {
        match self {
            RestoreTarget::Page(p) => p.snapshot(),
            RestoreTarget::Post(p) => p.snapshot(),
        }
    }

    /// Overwrite editable fields, stamping `published_at` on first publish
    pub fn apply_snapshot(&mut self, snapshot: &RevisionSnapshot) {
        match self {
            RestoreTarget::Page(p) => {
                p.apply_snapshot(snapshot);
                p.mark_published();
            }
            RestoreTarget::Post(p) => {
                p.apply_snapshot(snapshot);
                p.mark_published();
            }
        }
    }
}

#[async_trait]
pub trait RevisionRepository: Send + Sync {
    /// Append a revision unless the newest one already has the same hash
    async fn record(
        &self,
        kind: RevisionKind,
        tenant_id: i64,
        entity_id: i64,
        revision: &NewRevision,
    ) -> Result<RecordOutcome>;

    /// Revisions of one entity, newest first
    async fn list(
        &self,
        kind: RevisionKind,
        tenant_id: i64,
        entity_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<RevisionSummary>, i64)>;

    async fn get(
        &self,
        kind: RevisionKind,
        tenant_id: i64,
        entity_id: i64,
        revision_id: i64,
    ) -> Result<Option<Revision>>;

    /// Back up the live row, write `target` and record the restored state.
    ///
    /// Returns the `restored` revision, which becomes current.
    async fn restore(
        &self,
        target: &RestoreTarget,
        pre_restore: &NewRevision,
        restored: &NewRevision,
    ) -> Result<Revision>;

    /// Delete revisions beyond the retention limits; returns the number removed
    async fn prune(
        &self,
        kind: RevisionKind,
        tenant_id: i64,
        entity_id: i64,
        max_total: usize,
        max_autosaves: usize,
    ) -> Result<u64>;

    /// Delete one revision unless it is the current one
    async fn delete(&self, kind: RevisionKind, tenant_id: i64, entity_id: i64, revision_id: i64) -> Result<bool>;

    /// Delete non-current revisions created before `cutoff`, across tenants
    async fn purge_older_than(&self, kind: RevisionKind, cutoff: DateTime<Utc>) -> Result<u64>;

    async fn count(&self, kind: RevisionKind, tenant_id: Option<i64>) -> Result<i64>;
}

pub struct SqlxRevisionRepository {
    pool: DynDatabasePool,
}

impl SqlxRevisionRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn RevisionRepository> {
        Arc::new(Self::new(pool))
    }
}

/// Ids to delete from a newest-first history.
///
/// The current revision is always kept and counts towards both limits.
pub(crate) fn select_prunable(
    history: &[(i64, RevisionType)],
    current: Option<i64>,
    max_total: usize,
    max_autosaves: usize,
) -> Vec<i64> {
    let current_entry = history.iter().find(|(id, _)| Some(*id) == current);
    let mut kept = usize::from(current_entry.is_some());
    let mut autosaves = usize::from(matches!(current_entry, Some((_, RevisionType::Autosave))));

    let mut doomed = Vec::new();
    for &(id, revision_type) in history {
        if Some(id) == current {
            continue;
        }
        let is_autosave = revision_type == RevisionType::Autosave;
        if (is_autosave && autosaves >= max_autosaves) || kept >= max_total {
            doomed.push(id);
            continue;
        }
        kept += 1;
        if is_autosave {
            autosaves += 1;
        }
    }
    doomed
}

fn select_sql(kind: RevisionKind) -> String {
    format!(
        "SELECT r.id, r.tenant_id, r.{col} AS entity_id, r.revision_number, r.revision_type, r.title, r.summary, \
         r.snapshot, r.content_hash, r.word_count, r.char_count, r.author_id, r.author_name, r.ip_address, \
         r.user_agent, r.created_at, e.current_revision_id \
         FROM {rev} r JOIN {entity} e ON e.id = r.{col} AND e.tenant_id = r.tenant_id",
        col = kind.entity_column(),
        rev = kind.revision_table(),
        entity = kind.entity_table(),
    )
}

fn get_sql(kind: RevisionKind) -> String {
    format!(
        "{} WHERE r.id = ? AND r.{} = ? AND r.tenant_id = ?",
        select_sql(kind),
        kind.entity_column()
    )
}

fn history_sql(kind: RevisionKind) -> String {
    format!(
        "SELECT id, revision_type FROM {} WHERE {} = ? AND tenant_id = ? ORDER BY revision_number DESC",
        kind.revision_table(),
        kind.entity_column()
    )
}

fn pointer_sql(kind: RevisionKind) -> String {
    format!("SELECT current_revision_id FROM {} WHERE id = ? AND tenant_id = ?", kind.entity_table())
}

fn insert_sql(kind: RevisionKind) -> String {
    format!(
        "INSERT INTO {} (tenant_id, {}, revision_number, revision_type, title, summary, snapshot, content_hash, \
         word_count, char_count, author_id, author_name, ip_address, user_agent, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        kind.revision_table(),
        kind.entity_column()
    )
}

fn delete_ids_sql(kind: RevisionKind, count: usize) -> String {
    let placeholders = vec!["?"; count].join(", ");
    format!(
        "DELETE FROM {} WHERE tenant_id = ? AND {} = ? AND id IN ({})",
        kind.revision_table(),
        kind.entity_column(),
        placeholders
    )
}

#[async_trait]
impl RevisionRepository for SqlxRevisionRepository {
    async fn record(
        &self,
        kind: RevisionKind,
        tenant_id: i64,
        entity_id: i64,
        revision: &NewRevision,
    ) -> Result<RecordOutcome> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let mut tx = self.pool.sqlite()?.begin().await?;
                let outcome = record_sqlite(&mut tx, kind, tenant_id, entity_id, revision).await?;
                tx.commit().await?;
                Ok(outcome)
            }
            DatabaseDriver::Mysql => {
                let mut tx = self.pool.mysql()?.begin().await?;
                lock_entity_mysql(&mut tx, kind, tenant_id, entity_id).await?;
                let outcome = record_mysql(&mut tx, kind, tenant_id, entity_id, revision).await?;
                tx.commit().await?;
                Ok(outcome)
            }
        }
    }

    async fn list(
        &self,
        kind: RevisionKind,
        tenant_id: i64,
        entity_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<RevisionSummary>, i64)> {
        let count_sql = format!(
            "SELECT COUNT(*) AS count FROM {} WHERE {} = ? AND tenant_id = ?",
            kind.revision_table(),
            kind.entity_column()
        );
        let list_sql = format!(
            "{} WHERE r.{} = ? AND r.tenant_id = ? ORDER BY r.revision_number DESC LIMIT ? OFFSET ?",
            select_sql(kind),
            kind.entity_column()
        );

        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let pool = self.pool.sqlite()?;
                let total: i64 = sqlx::query(&count_sql)
                    .bind(entity_id)
                    .bind(tenant_id)
                    .fetch_one(pool)
                    .await
                    .context("Failed to count revisions")?
                    .get("count");
                let rows = sqlx::query(&list_sql)
                    .bind(entity_id)
                    .bind(tenant_id)
                    .bind(limit)
                    .bind(offset)
                    .fetch_all(pool)
                    .await
                    .context("Failed to list revisions")?;
                let items = rows
                    .iter()
                    .map(|r| row_to_revision_sqlite(r).map(summarize))
                    .collect::<Result<Vec<_>>>()?;
                Ok((items, total))
            }
            DatabaseDriver::Mysql => {
                let pool = self.pool.mysql()?;
                let total: i64 = sqlx::query(&count_sql)
                    .bind(entity_id)
                    .bind(tenant_id)
                    .fetch_one(pool)
                    .await
                    .context("Failed to count revisions")?
                    .get("count");
                let rows = sqlx::query(&list_sql)
                    .bind(entity_id)
                    .bind(tenant_id)
                    .bind(limit)
                    .bind(offset)
                    .fetch_all(pool)
                    .await
                    .context("Failed to list revisions")?;
                let items = rows
                    .iter()
                    .map(|r| row_to_revision_mysql(r).map(summarize))
                    .collect::<Result<Vec<_>>>()?;
                Ok((items, total))
            }
        }
    }

    async fn get(
        &self,
        kind: RevisionKind,
        tenant_id: i64,
        entity_id: i64,
        revision_id: i64,
    ) -> Result<Option<Revision>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let mut conn = self.pool.sqlite()?.acquire().await?;
                fetch_sqlite(&mut conn, kind, tenant_id, entity_id, revision_id).await
            }
            DatabaseDriver::Mysql => {
                let mut conn = self.pool.mysql()?.acquire().await?;
                fetch_mysql(&mut conn, kind, tenant_id, entity_id, revision_id).await
            }
        }
    }

    async fn restore(
        &self,
        target: &RestoreTarget,
        pre_restore: &NewRevision,
        restored: &NewRevision,
    ) -> Result<Revision> {
        let kind = target.kind();
        let tenant_id = target.tenant_id();
        let entity_id = target.entity_id();

        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let mut tx = self.pool.sqlite()?.begin().await?;
                insert_sqlite(&mut tx, kind, tenant_id, entity_id, pre_restore).await?;
                match target {
                    RestoreTarget::Page(p) => page::write_sqlite(&mut tx, p).await?,
                    RestoreTarget::Post(p) => blog_post::write_sqlite(&mut tx, p).await?,
                }
                let id = insert_sqlite(&mut tx, kind, tenant_id, entity_id, restored).await?;
                set_pointer_sqlite(&mut tx, kind, tenant_id, entity_id, id).await?;
                let revision = fetch_sqlite(&mut tx, kind, tenant_id, entity_id, id)
                    .await?
                    .ok_or_else(|| anyhow::anyhow!("Revision not found after restore"))?;
                tx.commit().await?;
                Ok(revision)
            }
            DatabaseDriver::Mysql => {
                let mut tx = self.pool.mysql()?.begin().await?;
                lock_entity_mysql(&mut tx, kind, tenant_id, entity_id).await?;
                insert_mysql(&mut tx, kind, tenant_id, entity_id, pre_restore).await?;
                match target {
                    RestoreTarget::Page(p) => page::write_mysql(&mut tx, p).await?,
                    RestoreTarget::Post(p) => blog_post::write_mysql(&mut tx, p).await?,
                }
                let id = insert_mysql(&mut tx, kind, tenant_id, entity_id, restored).await?;
                set_pointer_mysql(&mut tx, kind, tenant_id, entity_id, id).await?;
                let revision = fetch_mysql(&mut tx, kind, tenant_id, entity_id, id)
                    .await?
                    .ok_or_else(|| anyhow::anyhow!("Revision not found after restore"))?;
                tx.commit().await?;
                Ok(revision)
            }
        }
    }

    async fn prune(
        &self,
        kind: RevisionKind,
        tenant_id: i64,
        entity_id: i64,
        max_total: usize,
        max_autosaves: usize,
    ) -> Result<u64> {
        let history_sql = history_sql(kind);
        let pointer_sql = pointer_sql(kind);

        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let mut tx = self.pool.sqlite()?.begin().await?;
                let current: Option<i64> = sqlx::query(&pointer_sql)
                    .bind(entity_id)
                    .bind(tenant_id)
                    .fetch_optional(&mut *tx)
                    .await
                    .context("Failed to read current revision")?
                    .and_then(|r| r.get("current_revision_id"));
                let history = sqlx::query(&history_sql)
                    .bind(entity_id)
                    .bind(tenant_id)
                    .fetch_all(&mut *tx)
                    .await
                    .context("Failed to load revision history")?
                    .iter()
                    .map(history_entry_sqlite)
                    .collect::<Result<Vec<_>>>()?;

                let doomed = select_prunable(&history, current, max_total, max_autosaves);
                if doomed.is_empty() {
                    return Ok(0);
                }
                let sql = delete_ids_sql(kind, doomed.len());
                let mut query = sqlx::query(&sql).bind(tenant_id).bind(entity_id);
                for id in &doomed {
                    query = query.bind(*id);
                }
                let affected = query
                    .execute(&mut *tx)
                    .await
                    .context("Failed to prune revisions")?
                    .rows_affected();
                tx.commit().await?;
                Ok(affected)
            }
            DatabaseDriver::Mysql => {
                let mut tx = self.pool.mysql()?.begin().await?;
                let current = lock_entity_mysql(&mut tx, kind, tenant_id, entity_id).await?;
                let history = sqlx::query(&history_sql)
                    .bind(entity_id)
                    .bind(tenant_id)
                    .fetch_all(&mut *tx)
                    .await
                    .context("Failed to load revision history")?
                    .iter()
                    .map(history_entry_mysql)
                    .collect::<Result<Vec<_>>>()?;

                let doomed = select_prunable(&history, current, max_total, max_autosaves);
                if doomed.is_empty() {
                    return Ok(0);
                }
                let sql = delete_ids_sql(kind, doomed.len());
                let mut query = sqlx::query(&sql).bind(tenant_id).bind(entity_id);
                for id in &doomed {
                    query = query.bind(*id);
                }
                let affected = query
                    .execute(&mut *tx)
                    .await
                    .context("Failed to prune revisions")?
                    .rows_affected();
                tx.commit().await?;
                Ok(affected)
            }
        }
    }

    async fn delete(&self, kind: RevisionKind, tenant_id: i64, entity_id: i64, revision_id: i64) -> Result<bool> {
        let sql = format!(
            "DELETE FROM {rev} WHERE id = ? AND {col} = ? AND tenant_id = ? \
             AND id NOT IN (SELECT current_revision_id FROM {entity} WHERE id = ? AND current_revision_id IS NOT NULL)",
            rev = kind.revision_table(),
            col = kind.entity_column(),
            entity = kind.entity_table(),
        );
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(&sql)
                .bind(revision_id)
                .bind(entity_id)
                .bind(tenant_id)
                .bind(entity_id)
                .execute(self.pool.sqlite()?)
                .await
                .context("Failed to delete revision")?
                .rows_affected(),
            DatabaseDriver::Mysql => sqlx::query(&sql)
                .bind(revision_id)
                .bind(entity_id)
                .bind(tenant_id)
                .bind(entity_id)
                .execute(self.pool.mysql()?)
                .await
                .context("Failed to delete revision")?
                .rows_affected(),
        };
        Ok(affected > 0)
    }

    async fn purge_older_than(&self, kind: RevisionKind, cutoff: DateTime<Utc>) -> Result<u64> {
        let sql = format!(
            "DELETE FROM {rev} WHERE created_at < ? \
             AND id NOT IN (SELECT current_revision_id FROM {entity} WHERE current_revision_id IS NOT NULL)",
            rev = kind.revision_table(),
            entity = kind.entity_table(),
        );
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(&sql)
                .bind(cutoff)
                .execute(self.pool.sqlite()?)
                .await
                .context("Failed to purge old revisions")?
                .rows_affected(),
            DatabaseDriver::Mysql => sqlx::query(&sql)
                .bind(cutoff)
                .execute(self.pool.mysql()?)
                .await
                .context("Failed to purge old revisions")?
                .rows_affected(),
        };
        Ok(affected)
    }

    async fn count(&self, kind: RevisionKind, tenant_id: Option<i64>) -> Result<i64> {
        let sql = format!(
            "SELECT COUNT(*) AS count FROM {} WHERE (? IS NULL OR tenant_id = ?)",
            kind.revision_table()
        );
        let count: i64 = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(&sql)
                .bind(tenant_id)
                .bind(tenant_id)
                .fetch_one(self.pool.sqlite()?)
                .await
                .context("Failed to count revisions")?
                .get("count"),
            DatabaseDriver::Mysql => sqlx::query(&sql)
                .bind(tenant_id)
                .bind(tenant_id)
                .fetch_one(self.pool.mysql()?)
                .await
                .context("Failed to count revisions")?
                .get("count"),
        };
        Ok(count)
    }
}

fn summarize(revision: Revision) -> RevisionSummary {
    RevisionSummary {
        id: revision.id,
        revision_number: revision.revision_number,
        revision_type: revision.revision_type,
        title: revision.title,
        summary: revision.summary,
        content_hash: revision.content_hash,
        word_count: revision.word_count,
        char_count: revision.char_count,
        author_id: revision.author_id,
        author_name: revision.author_name,
        ip_address: revision.ip_address,
        created_at: revision.created_at,
        is_current: revision.is_current,
    }
}

/// Revision a new record is compared against for deduplication.
///
/// Autosaves compare with the newest row of any type. Every other type
/// compares with the current revision, so an autosave of the same state
/// never stands in for a saved one.
fn duplicate_candidate_sql(kind: RevisionKind, revision_type: RevisionType) -> String {
    if revision_type.moves_pointer() {
        format!(
            "SELECT r.id, r.content_hash FROM {rev} r JOIN {entity} e ON e.current_revision_id = r.id \
             WHERE e.id = ? AND e.tenant_id = ?",
            rev = kind.revision_table(),
            entity = kind.entity_table(),
        )
    } else {
        format!(
            "SELECT id, content_hash FROM {} WHERE {} = ? AND tenant_id = ? ORDER BY revision_number DESC LIMIT 1",
            kind.revision_table(),
            kind.entity_column()
        )
    }
}

fn next_number_sql(kind: RevisionKind) -> String {
    format!(
        "SELECT COALESCE(MAX(revision_number), 0) + 1 AS next FROM {} WHERE {} = ?",
        kind.revision_table(),
        kind.entity_column()
    )
}

fn set_pointer_sql(kind: RevisionKind) -> String {
    format!(
        "UPDATE {} SET current_revision_id = ? WHERE id = ? AND tenant_id = ?",
        kind.entity_table()
    )
}

// SQLite implementations

async fn record_sqlite(
    conn: &mut SqliteConnection,
    kind: RevisionKind,
    tenant_id: i64,
    entity_id: i64,
    revision: &NewRevision,
) -> Result<RecordOutcome> {
    if revision.revision_type.skips_duplicates() {
        let candidate = sqlx::query(&duplicate_candidate_sql(kind, revision.revision_type))
            .bind(entity_id)
            .bind(tenant_id)
            .fetch_optional(&mut *conn)
            .await
            .context("Failed to read previous revision")?;
        if let Some(row) = candidate {
            let hash: String = row.get("content_hash");
            if hash == revision.content_hash {
                let id: i64 = row.get("id");
                let existing = fetch_sqlite(conn, kind, tenant_id, entity_id, id)
                    .await?
                    .ok_or_else(|| anyhow::anyhow!("Previous revision vanished"))?;
                return Ok(RecordOutcome {
                    revision: existing,
                    created: false,
                });
            }
        }
    }

    let id = insert_sqlite(conn, kind, tenant_id, entity_id, revision).await?;
    if revision.revision_type.moves_pointer() {
        set_pointer_sqlite(conn, kind, tenant_id, entity_id, id).await?;
    }
    let created = fetch_sqlite(conn, kind, tenant_id, entity_id, id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("Revision not found after insert"))?;
    Ok(RecordOutcome {
        revision: created,
        created: true,
    })
}

async fn insert_sqlite(
    conn: &mut SqliteConnection,
    kind: RevisionKind,
    tenant_id: i64,
    entity_id: i64,
    revision: &NewRevision,
) -> Result<i64> {
    let number: i64 = sqlx::query(&next_number_sql(kind))
        .bind(entity_id)
        .fetch_one(&mut *conn)
        .await
        .context("Failed to number revision")?
        .get("next");
    let snapshot = serde_json::to_string(&revision.snapshot).context("Failed to encode snapshot")?;

    let result = sqlx::query(&insert_sql(kind))
        .bind(tenant_id)
        .bind(entity_id)
        .bind(number)
        .bind(revision.revision_type.as_str())
        .bind(&revision.snapshot.title)
        .bind(&revision.summary)
        .bind(snapshot)
        .bind(&revision.content_hash)
        .bind(revision.word_count)
        .bind(revision.char_count)
        .bind(revision.actor.admin_id)
        .bind(&revision.actor.name)
        .bind(&revision.actor.ip_address)
        .bind(&revision.actor.user_agent)
        .bind(Utc::now())
        .execute(&mut *conn)
        .await
        .context("Failed to insert revision")?;
    Ok(result.last_insert_rowid())
}

async fn set_pointer_sqlite(
    conn: &mut SqliteConnection,
    kind: RevisionKind,
    tenant_id: i64,
    entity_id: i64,
    revision_id: i64,
) -> Result<()> {
    sqlx::query(&set_pointer_sql(kind))
        .bind(revision_id)
        .bind(entity_id)
        .bind(tenant_id)
        .execute(&mut *conn)
        .await
        .context("Failed to move current revision")?;
    Ok(())
}

async fn fetch_sqlite(
    conn: &mut SqliteConnection,
    kind: RevisionKind,
    tenant_id: i64,
    entity_id: i64,
    revision_id: i64,
) -> Result<Option<Revision>> {
    let row = sqlx::query(&get_sql(kind))
        .bind(revision_id)
        .bind(entity_id)
        .bind(tenant_id)
        .fetch_optional(&mut *conn)
        .await
        .context("Failed to get revision")?;
    row.map(|r| row_to_revision_sqlite(&r)).transpose()
}

fn history_entry_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<(i64, RevisionType)> {
    let revision_type: String = row.get("revision_type");
    Ok((row.get("id"), revision_type.parse()?))
}

fn row_to_revision_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<Revision> {
    let id: i64 = row.get("id");
    let revision_type: String = row.get("revision_type");
    let snapshot: String = row.get("snapshot");
    let current: Option<i64> = row.get("current_revision_id");
    Ok(Revision {
        id,
        tenant_id: row.get("tenant_id"),
        entity_id: row.get("entity_id"),
        revision_number: row.get("revision_number"),
        revision_type: revision_type.parse()?,
        title: row.get("title"),
        summary: row.get("summary"),
        snapshot: serde_json::from_str(&snapshot).context("Failed to decode revision snapshot")?,
        content_hash: row.get("content_hash"),
        word_count: row.get("word_count"),
        char_count: row.get("char_count"),
        author_id: row.get("author_id"),
        author_name: row.get("author_name"),
        ip_address: row.get("ip_address"),
        user_agent: row.get("user_agent"),
        created_at: row.get("created_at"),
        is_current: current == Some(id),
    })
}

// MySQL implementations

/// Lock the owning row so concurrent writers number revisions one at a time
async fn lock_entity_mysql(
    conn: &mut MySqlConnection,
    kind: RevisionKind,
    tenant_id: i64,
    entity_id: i64,
) -> Result<Option<i64>> {
    let sql = format!("{} FOR UPDATE", pointer_sql(kind));
    let current = sqlx::query(&sql)
        .bind(entity_id)
        .bind(tenant_id)
        .fetch_optional(&mut *conn)
        .await
        .context("Failed to lock content row")?
        .and_then(|r| r.get("current_revision_id"));
    Ok(current)
}

async fn record_mysql(
    conn: &mut MySqlConnection,
    kind: RevisionKind,
    tenant_id: i64,
    entity_id: i64,
    revision: &NewRevision,
) -> Result<RecordOutcome> {
    if revision.revision_type.skips_duplicates() {
        let candidate = sqlx::query(&duplicate_candidate_sql(kind, revision.revision_type))
            .bind(entity_id)
            .bind(tenant_id)
            .fetch_optional(&mut *conn)
            .await
            .context("Failed to read previous revision")?;
        if let Some(row) = candidate {
            let hash: String = row.get("content_hash");
            if hash == revision.content_hash {
                let id: i64 = row.get("id");
                let existing = fetch_mysql(conn, kind, tenant_id, entity_id, id)
                    .await?
                    .ok_or_else(|| anyhow::anyhow!("Previous revision vanished"))?;
                return Ok(RecordOutcome {
                    revision: existing,
                    created: false,
                });
            }
        }
    }

    let id = insert_mysql(conn, kind, tenant_id, entity_id, revision).await?;
    if revision.revision_type.moves_pointer() {
        set_pointer_mysql(conn, kind, tenant_id, entity_id, id).await?;
    }
    let created = fetch_mysql(conn, kind, tenant_id, entity_id, id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("Revision not found after insert"))?;
    Ok(RecordOutcome {
        revision: created,
        created: true,
    })
}

async fn insert_mysql(
    conn: &mut MySqlConnection,
    kind: RevisionKind,
    tenant_id: i64,
    entity_id: i64,
    revision: &NewRevision,
) -> Result<i64> {
    let number: i64 = sqlx::query(&next_number_sql(kind))
        .bind(entity_id)
        .fetch_one(&mut *conn)
        .await
        .context("Failed to number revision")?
        .get("next");
    let snapshot = serde_json::to_string(&revision.snapshot).context("Failed to encode snapshot")?;

    let result = sqlx::query(&insert_sql(kind))
        .bind(tenant_id)
        .bind(entity_id)
        .bind(number)
        .bind(revision.revision_type.as_str())
        .bind(&revision.snapshot.title)
        .bind(&revision.summary)
        .bind(snapshot)
        .bind(&revision.content_hash)
        .bind(revision.word_count)
        .bind(revision.char_count)
        .bind(revision.actor.admin_id)
        .bind(&revision.actor.name)
        .bind(&revision.actor.ip_address)
        .bind(&revision.actor.user_agent)
        .bind(Utc::now())
        .execute(&mut *conn)
        .await
        .context("Failed to insert revision")?;
    Ok(result.last_insert_id() as i64)
}

async fn set_pointer_mysql(
    conn: &mut MySqlConnection,
    kind: RevisionKind,
    tenant_id: i64,
    entity_id: i64,
    revision_id: i64,
) -> Result<()> {
    sqlx::query(&set_pointer_sql(kind))
        .bind(revision_id)
        .bind(entity_id)
        .bind(tenant_id)
        .execute(&mut *conn)
        .await
        .context("Failed to move current revision")?;
    Ok(())
}

async fn fetch_mysql(
    conn: &mut MySqlConnection,
    kind: RevisionKind,
    tenant_id: i64,
    entity_id: i64,
    revision_id: i64,
) -> Result<Option<Revision>> {
    let row = sqlx::query(&get_sql(kind))
        .bind(revision_id)
        .bind(entity_id)
        .bind(tenant_id)
        .fetch_optional(&mut *conn)
        .await
        .context("Failed to get revision")?;
    row.map(|r| row_to_revision_mysql(&r)).transpose()
}

fn history_entry_mysql(row: &sqlx::mysql::MySqlRow) -> Result<(i64, RevisionType)> {
    let revision_type: String = row.get("revision_type");
    Ok((row.get("id"), revision_type.parse()?))
}

fn row_to_revision_mysql(row: &sqlx::mysql::MySqlRow) -> Result<Revision> {
    let id: i64 = row.get("id");
    let revision_type: String = row.get("revision_type");
    let snapshot: String = row.get("snapshot");
    let current: Option<i64> = row.get("current_revision_id");
    Ok(Revision {
        id,
        tenant_id: row.get("tenant_id"),
        entity_id: row.get("entity_id"),
        revision_number: row.get("revision_number"),
        revision_type: revision_type.parse()?,
        title: row.get("title"),
        summary: row.get("summary"),
        snapshot: serde_json::from_str(&snapshot).context("Failed to decode revision snapshot")?,
        content_hash: row.get("content_hash"),
        word_count: row.get("word_count"),
        char_count: row.get("char_count"),
        author_id: row.get("author_id"),
        author_name: row.get("author_name"),
        ip_address: row.get("ip_address"),
        user_agent: row.get("user_agent"),
        created_at: row.get("created_at"),
        is_current: current == Some(id),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::page::{PageRepository, SqlxPageRepository};
    use crate::db::repositories::test_support::{insert_tenant, setup_pool};
    use crate::models::{Actor, RevisionSnapshot};
    use proptest::prelude::*;

    fn new_revision(revision_type: RevisionType, snapshot: RevisionSnapshot) -> NewRevision {
        NewRevision {
            revision_type,
            summary: None,
            content_hash: format!("{}:{}:{}", snapshot.title, snapshot.slug, snapshot.content),
            word_count: 1,
            char_count: snapshot.content.len() as i64,
            snapshot,
            actor: Actor::system(),
        }
    }

    async fn page_fixture() -> (SqlxRevisionRepository, SqlxPageRepository, Page) {
        let pool = setup_pool().await;
        let tenant = insert_tenant(&pool, "a.test").await;
        let pages = SqlxPageRepository::new(pool.clone());
        let page = pages
            .create(&Page::new(tenant, "About".into(), "about".into(), "<p>v1</p>".into()))
            .await
            .unwrap();
        (SqlxRevisionRepository::new(pool), pages, page)
    }

    #[tokio::test]
    async fn test_record_numbers_and_moves_pointer() {
        let (repo, pages, page) = page_fixture().await;
        let kind = RevisionKind::Page;

        let first = repo
            .record(kind, page.tenant_id, page.id, &new_revision(RevisionType::Initial, page.snapshot()))
            .await
            .unwrap();
        assert!(first.created);
        assert_eq!(first.revision.revision_number, 1);
        assert!(first.revision.is_current);

        let mut edited = page.snapshot();
        edited.content = "<p>v2</p>".into();
        let second = repo
            .record(kind, page.tenant_id, page.id, &new_revision(RevisionType::Manual, edited))
            .await
            .unwrap();
        assert_eq!(second.revision.revision_number, 2);

        let reloaded = pages.get_by_id(page.tenant_id, page.id).await.unwrap().unwrap();
        assert_eq!(reloaded.current_revision_id, Some(second.revision.id));
    }

    #[tokio::test]
    async fn test_identical_snapshot_is_recorded_once() {
        let (repo, _, page) = page_fixture().await;
        let kind = RevisionKind::Page;
        let revision = new_revision(RevisionType::Manual, page.snapshot());

        let first = repo.record(kind, page.tenant_id, page.id, &revision).await.unwrap();
        let second = repo.record(kind, page.tenant_id, page.id, &revision).await.unwrap();
        assert!(!second.created);
        assert_eq!(first.revision.id, second.revision.id);

        // Restore bookkeeping always appends
        let backup = new_revision(RevisionType::PreRestore, page.snapshot());
        let third = repo.record(kind, page.tenant_id, page.id, &backup).await.unwrap();
        assert!(third.created);
        assert_eq!(repo.count(kind, Some(page.tenant_id)).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_autosave_keeps_pointer() {
        let (repo, pages, page) = page_fixture().await;
        let kind = RevisionKind::Page;
        let initial = repo
            .record(kind, page.tenant_id, page.id, &new_revision(RevisionType::Initial, page.snapshot()))
            .await
            .unwrap();

        let mut draft = page.snapshot();
        draft.content = "<p>typing</p>".into();
        let autosave = repo
            .record(kind, page.tenant_id, page.id, &new_revision(RevisionType::Autosave, draft))
            .await
            .unwrap();
        assert!(!autosave.revision.is_current);

        let reloaded = pages.get_by_id(page.tenant_id, page.id).await.unwrap().unwrap();
        assert_eq!(reloaded.current_revision_id, Some(initial.revision.id));
        assert_eq!(reloaded.content, "<p>v1</p>");
    }

    #[tokio::test]
    async fn test_save_after_identical_autosave_appends() {
        let (repo, pages, page) = page_fixture().await;
        let kind = RevisionKind::Page;
        repo.record(kind, page.tenant_id, page.id, &new_revision(RevisionType::Initial, page.snapshot()))
            .await
            .unwrap();

        let mut draft = page.snapshot();
        draft.content = "<p>v2</p>".into();
        let autosave = new_revision(RevisionType::Autosave, draft.clone());
        let first = repo.record(kind, page.tenant_id, page.id, &autosave).await.unwrap();
        let again = repo.record(kind, page.tenant_id, page.id, &autosave).await.unwrap();
        assert!(!again.created);
        assert_eq!(again.revision.id, first.revision.id);

        let saved = repo
            .record(kind, page.tenant_id, page.id, &new_revision(RevisionType::Published, draft))
            .await
            .unwrap();
        assert!(saved.created);
        assert_eq!(saved.revision.revision_type, RevisionType::Published);
        assert!(saved.revision.is_current);

        let reloaded = pages.get_by_id(page.tenant_id, page.id).await.unwrap().unwrap();
        assert_eq!(reloaded.current_revision_id, Some(saved.revision.id));
        assert_eq!(repo.count(kind, Some(page.tenant_id)).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_restore_writes_row_and_two_revisions() {
        let (repo, pages, page) = page_fixture().await;
        let kind = RevisionKind::Page;
        let v1 = repo
            .record(kind, page.tenant_id, page.id, &new_revision(RevisionType::Initial, page.snapshot()))
            .await
            .unwrap()
            .revision;

        let mut changed = page.clone();
        changed.title = "About us".into();
        changed.slug = "about-us".into();
        changed.content = "<p>v2</p>".into();
        let changed = pages.update(&changed).await.unwrap();
        repo.record(kind, page.tenant_id, page.id, &new_revision(RevisionType::Manual, changed.snapshot()))
            .await
            .unwrap();

        let mut target = changed.clone();
        target.apply_snapshot(&v1.snapshot);
        let restored = repo
            .restore(
                &RestoreTarget::Page(target),
                &new_revision(RevisionType::PreRestore, changed.snapshot()),
                &new_revision(RevisionType::Restored, v1.snapshot.clone()),
            )
            .await
            .unwrap();

        assert_eq!(restored.revision_number, 4);
        assert_eq!(restored.revision_type, RevisionType::Restored);
        assert!(restored.is_current);

        let live = pages.get_by_id(page.tenant_id, page.id).await.unwrap().unwrap();
        assert_eq!(live.snapshot(), v1.snapshot);
        assert_eq!(live.current_revision_id, Some(restored.id));

        let (history, total) = repo.list(kind, page.tenant_id, page.id, 10, 0).await.unwrap();
        assert_eq!(total, 4);
        assert_eq!(history[1].revision_type, RevisionType::PreRestore);
    }

    #[tokio::test]
    async fn test_other_tenant_cannot_read_revisions() {
        let (repo, _, page) = page_fixture().await;
        let kind = RevisionKind::Page;
        let rev = repo
            .record(kind, page.tenant_id, page.id, &new_revision(RevisionType::Initial, page.snapshot()))
            .await
            .unwrap()
            .revision;

        let other = page.tenant_id + 1;
        assert!(repo.get(kind, other, page.id, rev.id).await.unwrap().is_none());
        assert!(!repo.delete(kind, other, page.id, rev.id).await.unwrap());
        let (items, total) = repo.list(kind, other, page.id, 10, 0).await.unwrap();
        assert!(items.is_empty());
        assert_eq!(total, 0);
    }

    #[tokio::test]
    async fn test_delete_refuses_current() {
        let (repo, _, page) = page_fixture().await;
        let kind = RevisionKind::Page;
        let first = repo
            .record(kind, page.tenant_id, page.id, &new_revision(RevisionType::Initial, page.snapshot()))
            .await
            .unwrap()
            .revision;
        let mut edited = page.snapshot();
        edited.title = "Other".into();
        let second = repo
            .record(kind, page.tenant_id, page.id, &new_revision(RevisionType::Manual, edited))
            .await
            .unwrap()
            .revision;

        assert!(!repo.delete(kind, page.tenant_id, page.id, second.id).await.unwrap());
        assert!(repo.delete(kind, page.tenant_id, page.id, first.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_prune_keeps_limits_and_current() {
        let (repo, _, page) = page_fixture().await;
        let kind = RevisionKind::Page;
        for i in 0..6 {
            let mut snapshot = page.snapshot();
            snapshot.content = format!("<p>{}</p>", i);
            repo.record(kind, page.tenant_id, page.id, &new_revision(RevisionType::Manual, snapshot))
                .await
                .unwrap();
        }
        for i in 0..4 {
            let mut snapshot = page.snapshot();
            snapshot.content = format!("<p>draft {}</p>", i);
            repo.record(kind, page.tenant_id, page.id, &new_revision(RevisionType::Autosave, snapshot))
                .await
                .unwrap();
        }

        let removed = repo.prune(kind, page.tenant_id, page.id, 4, 2).await.unwrap();
        assert_eq!(removed, 6);

        let (left, _) = repo.list(kind, page.tenant_id, page.id, 50, 0).await.unwrap();
        assert_eq!(left.len(), 4);
        assert_eq!(left.iter().filter(|r| r.revision_type == RevisionType::Autosave).count(), 2);
        assert!(left.iter().any(|r| r.is_current));
    }

    #[tokio::test]
    async fn test_purge_older_than_spares_current() {
        let (repo, _, page) = page_fixture().await;
        let kind = RevisionKind::Page;
        repo.record(kind, page.tenant_id, page.id, &new_revision(RevisionType::Initial, page.snapshot()))
            .await
            .unwrap();
        let mut edited = page.snapshot();
        edited.title = "Next".into();
        repo.record(kind, page.tenant_id, page.id, &new_revision(RevisionType::Manual, edited))
            .await
            .unwrap();

        let purged = repo
            .purge_older_than(kind, Utc::now() + chrono::Duration::days(1))
            .await
            .unwrap();
        assert_eq!(purged, 1);
        assert_eq!(repo.count(kind, None).await.unwrap(), 1);
    }

    #[test]
    fn test_select_prunable_keeps_old_current() {
        let history = vec![
            (5, RevisionType::Manual),
            (4, RevisionType::Manual),
            (3, RevisionType::Manual),
            (2, RevisionType::Manual),
            (1, RevisionType::Initial),
        ];
        assert_eq!(select_prunable(&history, Some(1), 2, 0), vec![4, 3, 2]);
    }

    fn history_strategy() -> impl Strategy<Value = Vec<(i64, RevisionType)>> {
        prop::collection::vec(any::<bool>(), 0..40).prop_map(|flags| {
            let len = flags.len() as i64;
            flags
                .into_iter()
                .enumerate()
                .map(|(i, autosave)| {
                    let kind = if autosave { RevisionType::Autosave } else { RevisionType::Manual };
                    (len - i as i64, kind)
                })
                .collect()
        })
    }

    proptest! {
        #[test]
        fn prop_prune_respects_limits(
            history in history_strategy(),
            current_pick in any::<prop::sample::Index>(),
            max_total in 1usize..10,
            max_autosaves in 0usize..5,
        ) {
            let current = if history.is_empty() { None } else { Some(history[current_pick.index(history.len())].0) };
            let doomed = select_prunable(&history, current, max_total, max_autosaves);
            let left: Vec<_> = history.iter().filter(|(id, _)| !doomed.contains(id)).collect();

            prop_assert!(left.len() <= max_total.max(1));
            if let Some(current) = current {
                prop_assert!(left.iter().any(|(id, _)| *id == current));
            }
            let autosaves = left.iter().filter(|(id, t)| *t == RevisionType::Autosave && Some(*id) != current).count();
            prop_assert!(autosaves <= max_autosaves);
        }
    }
}
