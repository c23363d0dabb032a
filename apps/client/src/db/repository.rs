//! Repository pattern for database access.

use crate::db::error::DbError;
use crate::db::schema::{INIT_SINGLETONS, SCHEMA, SCHEMA_VERSION};
use chrono::Utc;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use serde::Serialize;
use serde_json::Value;
use std::path::Path;
use vocab_core::document::next_revision;
use vocab_core::replication::RemoteChange;
use vocab_core::Document;

type Result<T> = std::result::Result<T, DbError>;

/// A document row with its replication bookkeeping.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub doc: Document,
    pub seq: i64,
    /// Last revision the peer is known to have.
    pub remote_rev: Option<String>,
    /// Local edit not pushed yet.
    pub pending: bool,
}

/// Options for range listings.
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    pub limit: Option<usize>,
    pub skip: usize,
    pub descending: bool,
    pub include_deleted: bool,
}

impl ListOptions {
    pub fn limit(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            ..Default::default()
        }
    }
}

/// Installed view definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewRecord {
    pub view_id: String,
    pub design_id: String,
    pub view_name: String,
    pub signature: String,
    pub reduce: Option<String>,
    pub indexed_seq: i64,
}

/// One materialized row.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewRowRecord {
    pub doc_id: String,
    pub key_time: i64,
    pub key_order: String,
    pub value: Value,
}

/// Inclusive composite key bound.
pub type KeyBound<'a> = Option<(i64, &'a str)>;

/// Local sync state.
#[derive(Debug, Clone, Serialize)]
pub struct LocalSyncState {
    pub last_remote_seq: i64,
    pub last_sync_at: Option<String>,
}

/// Device info.
#[derive(Debug, Clone, Serialize)]
pub struct LocalDeviceInfo {
    pub token: String,
    pub device_id: Option<String>,
    pub account_id: Option<String>,
}

/// Losing revision that still has to be deleted on the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTombstone {
    pub doc_id: String,
    pub parent_rev: String,
}

/// Outcome of applying one pulled change.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AppliedChange {
    /// The remote winner replaced the local document.
    pub written: bool,
    /// Leaves stored in the conflict table.
    pub conflicts: usize,
}

/// Repository for document operations.
pub trait DocumentRepository {
    fn get_document(&self, id: &str) -> Result<Option<StoredDocument>>;
    /// Write a new revision on top of `expected_rev`.
    fn put_document(
        &self,
        id: &str,
        expected_rev: Option<&str>,
        deleted: bool,
        body: &Value,
    ) -> Result<StoredDocument>;
    fn list_documents(&self, start: &str, end: &str, options: &ListOptions) -> Result<Vec<Document>>;
    fn changes_since(&self, seq: i64, limit: usize) -> Result<Vec<StoredDocument>>;
    fn current_seq(&self) -> Result<i64>;
}

/// Repository for conflicting leaf revisions.
pub trait ConflictRepository {
    fn conflicts_for(&self, doc_id: &str) -> Result<Vec<Document>>;
    fn conflicted_ids(&self, start: &str, end: &str) -> Result<Vec<String>>;
    fn put_conflict(&self, doc: &Document) -> Result<()>;
    fn remove_conflict(&self, doc_id: &str, rev: &str) -> Result<bool>;
}

/// Repository for materialized views.
pub trait ViewRepository {
    fn get_view(&self, view_id: &str) -> Result<Option<ViewRecord>>;
    /// Install or replace a definition, dropping its rows.
    fn install_view(&self, record: &ViewRecord) -> Result<()>;
    /// Replace the rows of each listed document and advance the indexed sequence.
    fn write_view_rows(
        &self,
        view_id: &str,
        rows_by_doc: &[(String, Vec<ViewRowRecord>)],
        indexed_seq: i64,
    ) -> Result<()>;
    fn query_view_rows(
        &self,
        view_id: &str,
        start: KeyBound<'_>,
        end: KeyBound<'_>,
        options: &ListOptions,
    ) -> Result<Vec<ViewRowRecord>>;
    fn count_view_rows(&self, view_id: &str, start: KeyBound<'_>, end: KeyBound<'_>) -> Result<u64>;
}

/// Repository for sync operations.
pub trait SyncRepository {
    fn pending_documents(&self, limit: usize) -> Result<Vec<StoredDocument>>;
    fn mark_pushed(&self, id: &str, rev: &str) -> Result<()>;
    fn apply_remote_change(&self, change: &RemoteChange) -> Result<AppliedChange>;
    fn queue_tombstone(&self, doc_id: &str, parent_rev: &str) -> Result<()>;
    fn pending_tombstones(&self) -> Result<Vec<PendingTombstone>>;
    fn clear_tombstone(&self, doc_id: &str, parent_rev: &str) -> Result<()>;
    fn get_sync_state(&self) -> Result<LocalSyncState>;
    fn update_sync_state(&self, last_remote_seq: i64, last_sync_at: Option<&str>) -> Result<()>;
    fn get_device_token(&self) -> Result<Option<LocalDeviceInfo>>;
    fn save_device_token(&self, token: &str, device_id: &str, account_id: &str) -> Result<()>;
}

/// SQLite implementation of repositories.
pub struct SqliteRepository {
    conn: Connection,
}

struct RawDocument {
    id: String,
    rev: String,
    deleted: bool,
    body: String,
    seq: i64,
    remote_rev: Option<String>,
    pending: bool,
}

const DOCUMENT_COLUMNS: &str = "id, rev, deleted, body, seq, remote_rev, pending";

impl RawDocument {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            rev: row.get(1)?,
            deleted: row.get::<_, i32>(2)? != 0,
            body: row.get(3)?,
            seq: row.get(4)?,
            remote_rev: row.get(5)?,
            pending: row.get::<_, i32>(6)? != 0,
        })
    }

    fn into_stored(self) -> Result<StoredDocument> {
        Ok(StoredDocument {
            doc: Document {
                id: self.id,
                rev: self.rev,
                deleted: self.deleted,
                body: serde_json::from_str(&self.body)?,
            },
            seq: self.seq,
            remote_rev: self.remote_rev,
            pending: self.pending,
        })
    }
}

fn next_seq(conn: &Connection) -> Result<i64> {
    conn.execute("UPDATE sequence SET value = value + 1 WHERE id = 1", [])?;
    Ok(conn.query_row("SELECT value FROM sequence WHERE id = 1", [], |row| row.get(0))?)
}

/// Append `key >= start` / `key <= end` clauses over the composite key.
fn push_key_bounds(sql: &mut String, args: &mut Vec<SqlValue>, start: KeyBound<'_>, end: KeyBound<'_>) {
    if let Some((time, order)) = start {
        sql.push_str(" AND (key_time > ? OR (key_time = ? AND key_order >= ?))");
        args.extend([time.into(), time.into(), SqlValue::Text(order.to_string())]);
    }
    if let Some((time, order)) = end {
        sql.push_str(" AND (key_time < ? OR (key_time = ? AND key_order <= ?))");
        args.extend([time.into(), time.into(), SqlValue::Text(order.to_string())]);
    }
}

fn limit_clause(options: &ListOptions) -> String {
    let limit = options.limit.map_or(-1, |l| l as i64);
    format!(" LIMIT {} OFFSET {}", limit, options.skip)
}

impl SqliteRepository {
    /// Open database at path, creating if necessary.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        let repo = Self { conn };
        repo.initialize()?;
        Ok(repo)
    }

    /// Open in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let repo = Self { conn };
        repo.initialize()?;
        Ok(repo)
    }

    fn initialize(&self) -> Result<()> {
        self.conn.execute_batch(SCHEMA)?;
        self.conn.execute_batch(INIT_SINGLETONS)?;
        self.conn.execute(
            "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
            params![SCHEMA_VERSION],
        )?;
        Ok(())
    }

    fn is_tombstoned(conn: &Connection, doc_id: &str, rev: &str) -> Result<bool> {
        let found: Option<i32> = conn
            .query_row(
                "SELECT 1 FROM pending_tombstones WHERE doc_id = ?1 AND parent_rev = ?2",
                params![doc_id, rev],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }
}

impl DocumentRepository for SqliteRepository {
    fn get_document(&self, id: &str) -> Result<Option<StoredDocument>> {
        let raw = self
            .conn
            .query_row(
                &format!("SELECT {} FROM documents WHERE id = ?1", DOCUMENT_COLUMNS),
                params![id],
                RawDocument::from_row,
            )
            .optional()?;
        raw.map(RawDocument::into_stored).transpose()
    }

    fn put_document(
        &self,
        id: &str,
        expected_rev: Option<&str>,
        deleted: bool,
        body: &Value,
    ) -> Result<StoredDocument> {
        let tx = self.conn.unchecked_transaction()?;

        let current: Option<(String, bool)> = tx
            .query_row(
                "SELECT rev, deleted FROM documents WHERE id = ?1",
                params![id],
                |row| Ok((row.get(0)?, row.get::<_, i32>(1)? != 0)),
            )
            .optional()?;

        let parent = match (&current, expected_rev) {
            (None, None) => None,
            // Recreating a removed document continues its revision history.
            (Some((rev, true)), None) => Some(rev.clone()),
            (Some((rev, _)), Some(expected)) if rev == expected => Some(rev.clone()),
            _ => {
                return Err(DbError::RevisionMismatch {
                    id: id.to_string(),
                    current: current.map(|(rev, _)| rev),
                })
            }
        };

        let rev = next_revision(parent.as_deref(), deleted, body);
        let seq = next_seq(&tx)?;
        tx.execute(
            "INSERT INTO documents (id, rev, deleted, body, seq, pending)
             VALUES (?1, ?2, ?3, ?4, ?5, 1)
             ON CONFLICT(id) DO UPDATE SET
                rev = excluded.rev,
                deleted = excluded.deleted,
                body = excluded.body,
                seq = excluded.seq,
                pending = 1",
            params![id, rev, i32::from(deleted), body.to_string(), seq],
        )?;
        tx.commit()?;

        self.get_document(id)?
            .ok_or_else(|| DbError::InvalidData(format!("document {} vanished after write", id)))
    }

    fn list_documents(&self, start: &str, end: &str, options: &ListOptions) -> Result<Vec<Document>> {
        let mut sql = format!(
            "SELECT {} FROM documents WHERE id >= ?1 AND id <= ?2",
            DOCUMENT_COLUMNS
        );
        if !options.include_deleted {
            sql.push_str(" AND deleted = 0");
        }
        sql.push_str(if options.descending {
            " ORDER BY id DESC"
        } else {
            " ORDER BY id ASC"
        });
        sql.push_str(&limit_clause(options));

        let mut stmt = self.conn.prepare(&sql)?;
        let raws = stmt
            .query_map(params![start, end], RawDocument::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        raws.into_iter()
            .map(|raw| raw.into_stored().map(|stored| stored.doc))
            .collect()
    }

    fn changes_since(&self, seq: i64, limit: usize) -> Result<Vec<StoredDocument>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM documents WHERE seq > ?1 ORDER BY seq ASC LIMIT ?2",
            DOCUMENT_COLUMNS
        ))?;
        let raws = stmt
            .query_map(params![seq, limit as i64], RawDocument::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        raws.into_iter().map(RawDocument::into_stored).collect()
    }

    fn current_seq(&self) -> Result<i64> {
        Ok(self
            .conn
            .query_row("SELECT value FROM sequence WHERE id = 1", [], |row| row.get(0))?)
    }
}

impl ConflictRepository for SqliteRepository {
    fn conflicts_for(&self, doc_id: &str) -> Result<Vec<Document>> {
        let mut stmt = self.conn.prepare(
            "SELECT doc_id, rev, deleted, body FROM conflicts WHERE doc_id = ?1 ORDER BY rev",
        )?;
        let rows = stmt
            .query_map(params![doc_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i32>(2)? != 0,
                    row.get::<_, String>(3)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(id, rev, deleted, body)| {
                Ok(Document {
                    id,
                    rev,
                    deleted,
                    body: serde_json::from_str(&body)?,
                })
            })
            .collect()
    }

    fn conflicted_ids(&self, start: &str, end: &str) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT doc_id FROM conflicts WHERE doc_id >= ?1 AND doc_id <= ?2 ORDER BY doc_id",
        )?;
        let ids = stmt
            .query_map(params![start, end], |row| row.get(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    fn put_conflict(&self, doc: &Document) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO conflicts (doc_id, rev, deleted, body) VALUES (?1, ?2, ?3, ?4)",
            params![doc.id, doc.rev, i32::from(doc.deleted), doc.body.to_string()],
        )?;
        Ok(())
    }

    fn remove_conflict(&self, doc_id: &str, rev: &str) -> Result<bool> {
        let count = self.conn.execute(
            "DELETE FROM conflicts WHERE doc_id = ?1 AND rev = ?2",
            params![doc_id, rev],
        )?;
        Ok(count > 0)
    }
}

impl ViewRepository for SqliteRepository {
    fn get_view(&self, view_id: &str) -> Result<Option<ViewRecord>> {
        self.conn
            .query_row(
                "SELECT view_id, design_id, view_name, signature, reduce, indexed_seq
                 FROM views WHERE view_id = ?1",
                params![view_id],
                |row| {
                    Ok(ViewRecord {
                        view_id: row.get(0)?,
                        design_id: row.get(1)?,
                        view_name: row.get(2)?,
                        signature: row.get(3)?,
                        reduce: row.get(4)?,
                        indexed_seq: row.get(5)?,
                    })
                },
            )
            .optional()
            .map_err(Into::into)
    }

    fn install_view(&self, record: &ViewRecord) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM view_rows WHERE view_id = ?1", params![record.view_id])?;
        tx.execute(
            "INSERT OR REPLACE INTO views (view_id, design_id, view_name, signature, reduce, indexed_seq)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                record.view_id,
                record.design_id,
                record.view_name,
                record.signature,
                record.reduce,
                record.indexed_seq,
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn write_view_rows(
        &self,
        view_id: &str,
        rows_by_doc: &[(String, Vec<ViewRowRecord>)],
        indexed_seq: i64,
    ) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut delete = tx.prepare("DELETE FROM view_rows WHERE view_id = ?1 AND doc_id = ?2")?;
            let mut insert = tx.prepare(
                "INSERT INTO view_rows (view_id, doc_id, key_time, key_order, value)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for (doc_id, rows) in rows_by_doc {
                delete.execute(params![view_id, doc_id])?;
                for row in rows {
                    insert.execute(params![
                        view_id,
                        row.doc_id,
                        row.key_time,
                        row.key_order,
                        row.value.to_string()
                    ])?;
                }
            }
        }
        tx.execute(
            "UPDATE views SET indexed_seq = ?1 WHERE view_id = ?2",
            params![indexed_seq, view_id],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn query_view_rows(
        &self,
        view_id: &str,
        start: KeyBound<'_>,
        end: KeyBound<'_>,
        options: &ListOptions,
    ) -> Result<Vec<ViewRowRecord>> {
        let mut sql = String::from(
            "SELECT doc_id, key_time, key_order, value FROM view_rows WHERE view_id = ?",
        );
        let mut args = vec![SqlValue::Text(view_id.to_string())];
        push_key_bounds(&mut sql, &mut args, start, end);
        sql.push_str(if options.descending {
            " ORDER BY key_time DESC, key_order DESC, doc_id DESC"
        } else {
            " ORDER BY key_time ASC, key_order ASC, doc_id ASC"
        });
        sql.push_str(&limit_clause(options));

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(args), |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(doc_id, key_time, key_order, value)| {
                Ok(ViewRowRecord {
                    doc_id,
                    key_time,
                    key_order,
                    value: serde_json::from_str(&value)?,
                })
            })
            .collect()
    }

    fn count_view_rows(&self, view_id: &str, start: KeyBound<'_>, end: KeyBound<'_>) -> Result<u64> {
        let mut sql = String::from("SELECT COUNT(*) FROM view_rows WHERE view_id = ?");
        let mut args = vec![SqlValue::Text(view_id.to_string())];
        push_key_bounds(&mut sql, &mut args, start, end);
        let count: i64 = self
            .conn
            .query_row(&sql, params_from_iter(args), |row| row.get(0))?;
        Ok(count as u64)
    }
}

impl SyncRepository for SqliteRepository {
    fn pending_documents(&self, limit: usize) -> Result<Vec<StoredDocument>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM documents WHERE pending = 1 ORDER BY seq ASC LIMIT ?1",
            DOCUMENT_COLUMNS
        ))?;
        let raws = stmt
            .query_map(params![limit as i64], RawDocument::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        raws.into_iter().map(RawDocument::into_stored).collect()
    }

    fn mark_pushed(&self, id: &str, rev: &str) -> Result<()> {
        // A newer local edit keeps its pending flag.
        self.conn.execute(
            "UPDATE documents SET pending = 0, remote_rev = ?2 WHERE id = ?1 AND rev = ?2",
            params![id, rev],
        )?;
        Ok(())
    }

    fn apply_remote_change(&self, change: &RemoteChange) -> Result<AppliedChange> {
        let tx = self.conn.unchecked_transaction()?;
        let winner = &change.winner;

        let local: Option<(String, Option<String>, bool)> = tx
            .query_row(
                "SELECT rev, remote_rev, pending FROM documents WHERE id = ?1",
                params![change.id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get::<_, i32>(2)? != 0)),
            )
            .optional()?;

        let mut applied = AppliedChange::default();
        let local_rev = match local {
            Some((rev, _, _)) if rev == winner.rev => {
                tx.execute(
                    "UPDATE documents SET pending = 0, remote_rev = ?2 WHERE id = ?1",
                    params![change.id, winner.rev],
                )?;
                rev
            }
            // Our pending edit sits on top of the remote winner.
            Some((rev, Some(remote_rev), true)) if remote_rev == winner.rev => rev,
            Some((rev, _, true)) => {
                if !winner.deleted && !Self::is_tombstoned(&tx, &change.id, &winner.rev)? {
                    tx.execute(
                        "INSERT OR REPLACE INTO conflicts (doc_id, rev, deleted, body) VALUES (?1, ?2, 0, ?3)",
                        params![change.id, winner.rev, winner.body.to_string()],
                    )?;
                    applied.conflicts += 1;
                }
                rev
            }
            _ => {
                let seq = next_seq(&tx)?;
                tx.execute(
                    "INSERT INTO documents (id, rev, deleted, body, seq, remote_rev, pending)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?2, 0)
                     ON CONFLICT(id) DO UPDATE SET
                        rev = excluded.rev,
                        deleted = excluded.deleted,
                        body = excluded.body,
                        seq = excluded.seq,
                        remote_rev = excluded.remote_rev,
                        pending = 0",
                    params![
                        change.id,
                        winner.rev,
                        i32::from(winner.deleted),
                        winner.body.to_string(),
                        seq
                    ],
                )?;
                tx.execute("DELETE FROM conflicts WHERE doc_id = ?1", params![change.id])?;
                applied.written = true;
                winner.rev.clone()
            }
        };

        for leaf in &change.conflicts {
            if leaf.deleted || leaf.rev == local_rev || Self::is_tombstoned(&tx, &change.id, &leaf.rev)? {
                continue;
            }
            tx.execute(
                "INSERT OR REPLACE INTO conflicts (doc_id, rev, deleted, body) VALUES (?1, ?2, 0, ?3)",
                params![change.id, leaf.rev, leaf.body.to_string()],
            )?;
            applied.conflicts += 1;
        }
        tx.execute(
            "DELETE FROM conflicts WHERE doc_id = ?1 AND rev = ?2",
            params![change.id, local_rev],
        )?;

        tx.commit()?;
        Ok(applied)
    }

    fn queue_tombstone(&self, doc_id: &str, parent_rev: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO pending_tombstones (doc_id, parent_rev, queued_at) VALUES (?1, ?2, ?3)",
            params![doc_id, parent_rev, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn pending_tombstones(&self) -> Result<Vec<PendingTombstone>> {
        let mut stmt = self.conn.prepare(
            "SELECT doc_id, parent_rev FROM pending_tombstones ORDER BY queued_at, doc_id",
        )?;
        let tombstones = stmt
            .query_map([], |row| {
                Ok(PendingTombstone {
                    doc_id: row.get(0)?,
                    parent_rev: row.get(1)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(tombstones)
    }

    fn clear_tombstone(&self, doc_id: &str, parent_rev: &str) -> Result<()> {
        self.conn.execute(
            "DELETE FROM pending_tombstones WHERE doc_id = ?1 AND parent_rev = ?2",
            params![doc_id, parent_rev],
        )?;
        Ok(())
    }

    fn get_sync_state(&self) -> Result<LocalSyncState> {
        self.conn
            .query_row(
                "SELECT last_remote_seq, last_sync_at FROM sync_state WHERE id = 1",
                [],
                |row| {
                    Ok(LocalSyncState {
                        last_remote_seq: row.get(0)?,
                        last_sync_at: row.get(1)?,
                    })
                },
            )
            .map_err(Into::into)
    }

    fn update_sync_state(&self, last_remote_seq: i64, last_sync_at: Option<&str>) -> Result<()> {
        self.conn.execute(
            "UPDATE sync_state SET last_remote_seq = ?1, last_sync_at = COALESCE(?2, last_sync_at) WHERE id = 1",
            params![last_remote_seq, last_sync_at],
        )?;
        Ok(())
    }

    fn get_device_token(&self) -> Result<Option<LocalDeviceInfo>> {
        self.conn
            .query_row(
                "SELECT token, device_id, account_id FROM local_device LIMIT 1",
                [],
                |row| {
                    Ok(LocalDeviceInfo {
                        token: row.get(0)?,
                        device_id: row.get(1)?,
                        account_id: row.get(2)?,
                    })
                },
            )
            .optional()
            .map_err(Into::into)
    }

    fn save_device_token(&self, token: &str, device_id: &str, account_id: &str) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM local_device", [])?;
        tx.execute(
            "INSERT INTO local_device (token, device_id, account_id) VALUES (?1, ?2, ?3)",
            params![token, device_id, account_id],
        )?;
        tx.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use vocab_core::replication::RemoteRevision;

    fn repo() -> SqliteRepository {
        SqliteRepository::open_in_memory().unwrap()
    }

    #[test]
    fn put_assigns_revisions_and_sequence() {
        let repo = repo();
        let first = repo.put_document("word_a", None, false, &json!({"type": "noun"})).unwrap();
        assert!(first.doc.rev.starts_with("1-"));
        assert!(first.pending);

        let second = repo
            .put_document("word_a", Some(&first.doc.rev), false, &json!({"type": "verb"}))
            .unwrap();
        assert!(second.doc.rev.starts_with("2-"));
        assert!(second.seq > first.seq);
        assert_eq!(repo.current_seq().unwrap(), second.seq);
    }

    #[test]
    fn stale_revision_is_rejected() {
        let repo = repo();
        let first = repo.put_document("word_a", None, false, &json!({})).unwrap();
        repo.put_document("word_a", Some(&first.doc.rev), false, &json!({"x": 1}))
            .unwrap();

        let err = repo
            .put_document("word_a", Some(&first.doc.rev), false, &json!({"x": 2}))
            .unwrap_err();
        assert!(matches!(err, DbError::RevisionMismatch { .. }));

        let err = repo.put_document("word_a", None, false, &json!({})).unwrap_err();
        assert!(matches!(err, DbError::RevisionMismatch { .. }));
    }

    #[test]
    fn deleted_document_can_be_recreated() {
        let repo = repo();
        let first = repo.put_document("word_a", None, false, &json!({})).unwrap();
        let tomb = repo
            .put_document("word_a", Some(&first.doc.rev), true, &json!({}))
            .unwrap();
        let again = repo.put_document("word_a", None, false, &json!({"y": 1})).unwrap();
        assert!(again.doc.rev.starts_with("3-"));
        assert_ne!(again.doc.rev, tomb.doc.rev);
    }

    #[test]
    fn list_respects_range_and_options() {
        let repo = repo();
        for id in ["word_a", "word_b", "word_c", "wordtype_a"] {
            repo.put_document(id, None, false, &json!({})).unwrap();
        }
        let all = repo
            .list_documents("word_", "word_\u{fff0}", &ListOptions::default())
            .unwrap();
        assert_eq!(all.len(), 3);

        let options = ListOptions {
            limit: Some(1),
            skip: 1,
            descending: true,
            include_deleted: false,
        };
        let page = repo.list_documents("word_", "word_\u{fff0}", &options).unwrap();
        assert_eq!(page[0].id, "word_b");
    }

    #[test]
    fn view_rows_are_queried_by_composite_key() {
        let repo = repo();
        repo.install_view(&ViewRecord {
            view_id: "_design/x/due".into(),
            design_id: "_design/x".into(),
            view_name: "due".into(),
            signature: "sig".into(),
            reduce: Some("count".into()),
            indexed_seq: 0,
        })
        .unwrap();
        let row = |doc: &str, time: i64, order: &str| ViewRowRecord {
            doc_id: doc.into(),
            key_time: time,
            key_order: order.into(),
            value: json!(time),
        };
        repo.write_view_rows(
            "_design/x/due",
            &[
                ("word_a".into(), vec![row("word_a", 10, "b"), row("word_a", 20, "a")]),
                ("word_b".into(), vec![row("word_b", 10, "a")]),
            ],
            7,
        )
        .unwrap();

        let rows = repo
            .query_view_rows("_design/x/due", None, Some((10, "\u{10ffff}")), &ListOptions::default())
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].doc_id, "word_b");
        assert_eq!(repo.count_view_rows("_design/x/due", Some((10, "b")), None).unwrap(), 2);
        assert_eq!(repo.get_view("_design/x/due").unwrap().unwrap().indexed_seq, 7);

        repo.write_view_rows("_design/x/due", &[("word_a".into(), vec![])], 8)
            .unwrap();
        assert_eq!(repo.count_view_rows("_design/x/due", None, None).unwrap(), 1);
    }

    fn remote(id: &str, rev: &str, conflicts: Vec<RemoteRevision>) -> RemoteChange {
        RemoteChange {
            id: id.into(),
            seq: 1,
            winner: RemoteRevision {
                rev: rev.into(),
                deleted: false,
                body: json!({"title": rev}),
            },
            conflicts,
        }
    }

    #[test]
    fn remote_change_overwrites_clean_document() {
        let repo = repo();
        let applied = repo
            .apply_remote_change(&remote(
                "wordtype_a",
                "1-aa",
                vec![RemoteRevision {
                    rev: "1-bb".into(),
                    deleted: false,
                    body: json!({"title": "b"}),
                }],
            ))
            .unwrap();
        assert!(applied.written);
        assert_eq!(applied.conflicts, 1);

        let stored = repo.get_document("wordtype_a").unwrap().unwrap();
        assert!(!stored.pending);
        assert_eq!(stored.remote_rev.as_deref(), Some("1-aa"));
        assert_eq!(repo.conflicts_for("wordtype_a").unwrap().len(), 1);
    }

    #[test]
    fn remote_change_does_not_clobber_pending_edit() {
        let repo = repo();
        let local = repo.put_document("wordtype_a", None, false, &json!({"title": "mine"})).unwrap();
        let applied = repo.apply_remote_change(&remote("wordtype_a", "1-zz", vec![])).unwrap();
        assert!(!applied.written);
        assert_eq!(applied.conflicts, 1);

        let stored = repo.get_document("wordtype_a").unwrap().unwrap();
        assert_eq!(stored.doc.rev, local.doc.rev);
        let conflicts = repo.conflicts_for("wordtype_a").unwrap();
        assert_eq!(conflicts[0].rev, "1-zz");
        assert_eq!(
            repo.conflicted_ids("wordtype_", "wordtype_\u{fff0}").unwrap(),
            vec!["wordtype_a".to_string()]
        );
    }

    #[test]
    fn tombstoned_leaves_are_not_reimported() {
        let repo = repo();
        repo.queue_tombstone("wordtype_a", "1-bb").unwrap();
        let applied = repo
            .apply_remote_change(&remote(
                "wordtype_a",
                "2-aa",
                vec![RemoteRevision {
                    rev: "1-bb".into(),
                    deleted: false,
                    body: json!({}),
                }],
            ))
            .unwrap();
        assert_eq!(applied.conflicts, 0);
        assert_eq!(repo.pending_tombstones().unwrap().len(), 1);
        repo.clear_tombstone("wordtype_a", "1-bb").unwrap();
        assert!(repo.pending_tombstones().unwrap().is_empty());
    }

    #[test]
    fn pushed_documents_are_no_longer_pending() {
        let repo = repo();
        let doc = repo.put_document("word_a", None, false, &json!({})).unwrap();
        assert_eq!(repo.pending_documents(10).unwrap().len(), 1);
        repo.mark_pushed("word_a", &doc.doc.rev).unwrap();
        assert!(repo.pending_documents(10).unwrap().is_empty());
        let stored = repo.get_document("word_a").unwrap().unwrap();
        assert_eq!(stored.remote_rev, Some(doc.doc.rev));
    }

    #[test]
    fn sync_state_and_device_token() {
        let repo = repo();
        assert_eq!(repo.get_sync_state().unwrap().last_remote_seq, 0);
        repo.update_sync_state(42, Some("2024-01-01T00:00:00Z")).unwrap();
        let state = repo.get_sync_state().unwrap();
        assert_eq!(state.last_remote_seq, 42);
        assert!(state.last_sync_at.is_some());

        assert!(repo.get_device_token().unwrap().is_none());
        repo.save_device_token("tok", "dev", "acc").unwrap();
        repo.save_device_token("tok2", "dev", "acc").unwrap();
        assert_eq!(repo.get_device_token().unwrap().unwrap().token, "tok2");
    }
}
