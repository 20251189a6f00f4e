//! Durable version catalog backed by SQLite
//!
//! The catalog is the source of truth for history and the sole authority for
//! version-number assignment. Rows are append-only; the only deletion path is
//! the retention sweeper's bulk expiry, which never renumbers survivors, so a
//! path's version sequence stays gap-free from its lowest surviving number
//! upward.
//!
//! ## Concurrency
//!
//! "Read current max version, insert max+1" runs inside a single immediate
//! transaction on a connection guarded by a mutex, so two concurrent
//! recordings of the same path can never be assigned the same number.
//!
//! ## Timestamps
//!
//! Rows store RFC 3339 UTC text at fixed microsecond precision. Fixed width
//! makes SQL string comparison chronological, which every as-of query relies
//! on; ties at equal timestamps are broken by the higher version number.

use crate::error::{Result, RewindError};
use crate::types::{FileVersion, Operation, TreeEntry};
use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

const SCHEMA: &str = "\
CREATE TABLE IF NOT EXISTS file_versions (
    id              TEXT PRIMARY KEY,
    file_path       TEXT NOT NULL,
    version_number  INTEGER NOT NULL,
    operation       TEXT NOT NULL,
    content_digest  TEXT,
    file_size       INTEGER NOT NULL DEFAULT 0,
    timestamp       TEXT NOT NULL,
    metadata_json   TEXT,
    UNIQUE (file_path, version_number)
);
CREATE INDEX IF NOT EXISTS idx_versions_path_number
    ON file_versions (file_path, version_number DESC);
CREATE INDEX IF NOT EXISTS idx_versions_path_timestamp
    ON file_versions (file_path, timestamp);
";

const COLUMNS: &str = "id, file_path, version_number, operation, content_digest, \
                       file_size, timestamp, metadata_json";

/// A version about to be appended; the catalog assigns id and number
#[derive(Debug, Clone)]
pub struct NewVersion {
    /// Logical file path (flat string key)
    pub path: String,
    /// Event that produced this version
    pub operation: Operation,
    /// Content digest; `None` for deletes and unreadable states
    pub digest: Option<String>,
    /// Content size in bytes
    pub size: u64,
    /// Wall-clock time of the observation
    pub timestamp: DateTime<Utc>,
    /// Free-form metadata
    pub metadata: Option<serde_json::Value>,
}

/// SQLite-backed, append-only version catalog
#[derive(Debug)]
pub struct Catalog {
    conn: Mutex<Connection>,
}

impl Catalog {
    /// Open (creating if needed) a catalog database at `path`
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// Open a throwaway in-memory catalog (test double)
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.pragma_update(None, "journal_mode", "WAL").ok();
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Append a version, atomically allocating the path's next number
    ///
    /// The max-read and the insert share one immediate transaction, so
    /// concurrent appends to the same path serialize and the per-path
    /// sequence stays strictly increasing with no gaps.
    pub fn append(&self, new: NewVersion) -> Result<FileVersion> {
        let id = Uuid::new_v4();
        let ts = encode_ts(&new.timestamp);
        let metadata_json = new
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let mut conn = self.conn.lock();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(write_failure)?;
        let number: i64 = tx
            .query_row(
                "SELECT COALESCE(MAX(version_number), 0) + 1
                 FROM file_versions WHERE file_path = ?1",
                params![new.path],
                |row| row.get(0),
            )
            .map_err(write_failure)?;
        tx.execute(
            "INSERT INTO file_versions
             (id, file_path, version_number, operation, content_digest,
              file_size, timestamp, metadata_json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                id.to_string(),
                new.path,
                number,
                new.operation.as_str(),
                new.digest,
                new.size as i64,
                ts,
                metadata_json,
            ],
        )
        .map_err(write_failure)?;
        tx.commit().map_err(write_failure)?;

        debug!("appended {} v{} ({})", new.path, number, new.operation);
        Ok(FileVersion {
            id,
            path: new.path,
            number,
            operation: new.operation,
            digest: new.digest,
            size: new.size,
            timestamp: decode_ts(&ts)?,
            metadata: new.metadata,
        })
    }

    /// Most recent version of `path`, if any
    pub fn latest(&self, path: &str) -> Result<Option<FileVersion>> {
        let conn = self.conn.lock();
        conn.query_row(
            &format!(
                "SELECT {COLUMNS} FROM file_versions
                 WHERE file_path = ?1
                 ORDER BY version_number DESC LIMIT 1"
            ),
            params![path],
            read_row,
        )
        .optional()?
        .map(RawRow::into_version)
        .transpose()
    }

    /// Exact version `number` of `path`, if recorded
    pub fn exact(&self, path: &str, number: i64) -> Result<Option<FileVersion>> {
        let conn = self.conn.lock();
        conn.query_row(
            &format!(
                "SELECT {COLUMNS} FROM file_versions
                 WHERE file_path = ?1 AND version_number = ?2"
            ),
            params![path, number],
            read_row,
        )
        .optional()?
        .map(RawRow::into_version)
        .transpose()
    }

    /// Second-most-recent version of `path` (the "previous" version)
    pub fn previous(&self, path: &str) -> Result<Option<FileVersion>> {
        let conn = self.conn.lock();
        conn.query_row(
            &format!(
                "SELECT {COLUMNS} FROM file_versions
                 WHERE file_path = ?1
                 ORDER BY version_number DESC LIMIT 1 OFFSET 1"
            ),
            params![path],
            read_row,
        )
        .optional()?
        .map(RawRow::into_version)
        .transpose()
    }

    /// Latest version of `path` recorded at or before `as_of`
    ///
    /// Ties at equal timestamps resolve to the highest version number.
    pub fn latest_at_or_before(
        &self,
        path: &str,
        as_of: DateTime<Utc>,
    ) -> Result<Option<FileVersion>> {
        let conn = self.conn.lock();
        conn.query_row(
            &format!(
                "SELECT {COLUMNS} FROM file_versions
                 WHERE file_path = ?1 AND timestamp <= ?2
                 ORDER BY timestamp DESC, version_number DESC LIMIT 1"
            ),
            params![path, encode_ts(&as_of)],
            read_row,
        )
        .optional()?
        .map(RawRow::into_version)
        .transpose()
    }

    /// A page of `path`'s history (descending) plus the total row count
    pub fn history(
        &self,
        path: &str,
        limit: u32,
        offset: u32,
    ) -> Result<(Vec<FileVersion>, u64)> {
        let conn = self.conn.lock();
        let total: u64 = conn.query_row(
            "SELECT COUNT(*) FROM file_versions WHERE file_path = ?1",
            params![path],
            |row| row.get(0),
        )?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM file_versions
             WHERE file_path = ?1
             ORDER BY version_number DESC LIMIT ?2 OFFSET ?3"
        ))?;
        let rows = stmt.query_map(params![path, limit, offset], read_row)?;
        let mut versions = Vec::new();
        for raw in rows {
            versions.push(raw?.into_version()?);
        }
        Ok((versions, total))
    }

    /// Per-path latest row at or before `as_of` under a directory prefix,
    /// excluding paths whose latest qualifying row is a delete
    ///
    /// Paths are matched as flat strings with prefix semantics; LIKE
    /// wildcards occurring in the prefix are escaped.
    pub fn tree_at(&self, prefix: &str, as_of: DateTime<Utc>) -> Result<Vec<TreeEntry>> {
        let pattern = format!("{}%", escape_like(prefix));
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT v.file_path, v.version_number, v.file_size, v.timestamp
             FROM file_versions v
             JOIN (
                 SELECT file_path, MAX(version_number) AS latest
                 FROM file_versions
                 WHERE file_path LIKE ?1 ESCAPE '\\' AND timestamp <= ?2
                 GROUP BY file_path
             ) s ON s.file_path = v.file_path AND s.latest = v.version_number
             WHERE v.operation != 'delete'
             ORDER BY v.file_path",
        )?;
        let rows = stmt.query_map(params![pattern, encode_ts(&as_of)], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;
        let mut entries = Vec::new();
        for row in rows {
            let (path, version, size, ts) = row?;
            entries.push(TreeEntry {
                path,
                version,
                size: size.max(0) as u64,
                timestamp: decode_ts(&ts)?,
            });
        }
        Ok(entries)
    }

    /// Bulk-delete rows older than `cutoff`, always keeping each path's
    /// `min_versions_per_file` most recent rows
    ///
    /// Returns the number of rows deleted. Survivors keep their numbers.
    pub fn sweep_expired(
        &self,
        cutoff: DateTime<Utc>,
        min_versions_per_file: u32,
    ) -> Result<usize> {
        let conn = self.conn.lock();
        let deleted = conn
            .execute(
                "DELETE FROM file_versions
                 WHERE timestamp < ?1
                   AND version_number <= (
                       SELECT MAX(version_number) - ?2
                       FROM file_versions v2
                       WHERE v2.file_path = file_versions.file_path
                   )",
                params![encode_ts(&cutoff), min_versions_per_file],
            )
            .map_err(write_failure)?;
        debug!("sweep deleted {} catalog rows", deleted);
        Ok(deleted)
    }

    /// Every digest still referenced by a surviving row
    pub fn referenced_digests(&self) -> Result<HashSet<String>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT DISTINCT content_digest FROM file_versions
             WHERE content_digest IS NOT NULL",
        )?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut digests = HashSet::new();
        for row in rows {
            digests.insert(row?);
        }
        Ok(digests)
    }

    /// Total rows, distinct paths, and summed logical bytes
    pub fn stats(&self) -> Result<(u64, u64, u64)> {
        let conn = self.conn.lock();
        let row = conn.query_row(
            "SELECT COUNT(*), COUNT(DISTINCT file_path), COALESCE(SUM(file_size), 0)
             FROM file_versions",
            [],
            |row| {
                Ok((
                    row.get::<_, u64>(0)?,
                    row.get::<_, u64>(1)?,
                    row.get::<_, u64>(2)?,
                ))
            },
        )?;
        Ok(row)
    }
}

fn write_failure(err: rusqlite::Error) -> RewindError {
    RewindError::catalog_write(err.to_string())
}

fn encode_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn decode_ts(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|err| RewindError::internal(format!("bad timestamp in catalog: {err}")))
}

/// Escape LIKE wildcards so a prefix matches literally
fn escape_like(prefix: &str) -> String {
    let mut escaped = String::with_capacity(prefix.len());
    for ch in prefix.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

/// Column values as SQLite hands them back, before domain conversion
struct RawRow {
    id: String,
    path: String,
    number: i64,
    operation: String,
    digest: Option<String>,
    size: i64,
    timestamp: String,
    metadata: Option<String>,
}

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRow> {
    Ok(RawRow {
        id: row.get(0)?,
        path: row.get(1)?,
        number: row.get(2)?,
        operation: row.get(3)?,
        digest: row.get(4)?,
        size: row.get(5)?,
        timestamp: row.get(6)?,
        metadata: row.get(7)?,
    })
}

impl RawRow {
    fn into_version(self) -> Result<FileVersion> {
        let metadata = self
            .metadata
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?;
        Ok(FileVersion {
            id: Uuid::parse_str(&self.id)
                .map_err(|err| RewindError::internal(format!("bad row id: {err}")))?,
            path: self.path,
            number: self.number,
            operation: self
                .operation
                .parse::<Operation>()
                .map_err(RewindError::Internal)?,
            digest: self.digest,
            size: self.size.max(0) as u64,
            timestamp: decode_ts(&self.timestamp)?,
            metadata,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::Arc;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn row(path: &str, op: Operation, digest: Option<&str>, at: DateTime<Utc>) -> NewVersion {
        NewVersion {
            path: path.to_string(),
            operation: op,
            digest: digest.map(|d| d.to_string()),
            size: digest.map(|d| d.len() as u64).unwrap_or(0),
            timestamp: at,
            metadata: None,
        }
    }

    #[test]
    fn test_append_assigns_sequential_numbers() {
        let catalog = Catalog::open_in_memory().unwrap();
        let v1 = catalog
            .append(row("/a.txt", Operation::Create, Some("d1"), ts(0)))
            .unwrap();
        let v2 = catalog
            .append(row("/a.txt", Operation::Modify, Some("d2"), ts(1)))
            .unwrap();
        let other = catalog
            .append(row("/b.txt", Operation::Create, Some("d1"), ts(2)))
            .unwrap();
        assert_eq!(v1.number, 1);
        assert_eq!(v2.number, 2);
        assert_eq!(other.number, 1);
        assert_ne!(v1.id, v2.id);
    }

    #[test]
    fn test_latest_exact_previous() {
        let catalog = Catalog::open_in_memory().unwrap();
        for i in 0..3 {
            catalog
                .append(row(
                    "/a.txt",
                    Operation::Modify,
                    Some(&format!("d{i}")),
                    ts(i),
                ))
                .unwrap();
        }
        assert_eq!(catalog.latest("/a.txt").unwrap().unwrap().number, 3);
        assert_eq!(
            catalog.exact("/a.txt", 2).unwrap().unwrap().digest,
            Some("d1".to_string())
        );
        assert_eq!(catalog.previous("/a.txt").unwrap().unwrap().number, 2);
        assert!(catalog.latest("/missing").unwrap().is_none());
        assert!(catalog.exact("/a.txt", 9).unwrap().is_none());
        assert!(catalog.previous("/b.txt").unwrap().is_none());
    }

    #[test]
    fn test_latest_at_or_before_breaks_ties_by_number() {
        let catalog = Catalog::open_in_memory().unwrap();
        catalog
            .append(row("/a.txt", Operation::Create, Some("d1"), ts(0)))
            .unwrap();
        // Two versions share a timestamp; the higher number must win.
        catalog
            .append(row("/a.txt", Operation::Modify, Some("d2"), ts(5)))
            .unwrap();
        catalog
            .append(row("/a.txt", Operation::Modify, Some("d3"), ts(5)))
            .unwrap();

        let hit = catalog.latest_at_or_before("/a.txt", ts(5)).unwrap().unwrap();
        assert_eq!(hit.number, 3);
        let hit = catalog.latest_at_or_before("/a.txt", ts(2)).unwrap().unwrap();
        assert_eq!(hit.number, 1);
        assert!(catalog
            .latest_at_or_before("/a.txt", ts(-1))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_history_pagination() {
        let catalog = Catalog::open_in_memory().unwrap();
        for i in 0..5 {
            catalog
                .append(row(
                    "/a.txt",
                    Operation::Modify,
                    Some(&format!("d{i}")),
                    ts(i),
                ))
                .unwrap();
        }
        let (page, total) = catalog.history("/a.txt", 2, 0).unwrap();
        assert_eq!(total, 5);
        assert_eq!(
            page.iter().map(|v| v.number).collect::<Vec<_>>(),
            vec![5, 4]
        );
        let (page, _) = catalog.history("/a.txt", 2, 4).unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].number, 1);
    }

    #[test]
    fn test_tree_at_excludes_deleted_paths() {
        let catalog = Catalog::open_in_memory().unwrap();
        catalog
            .append(row("/dir/a.txt", Operation::Create, Some("d1"), ts(0)))
            .unwrap();
        catalog
            .append(row("/dir/a.txt", Operation::Delete, None, ts(10)))
            .unwrap();
        catalog
            .append(row("/dir/b.txt", Operation::Create, Some("d2"), ts(5)))
            .unwrap();
        catalog
            .append(row("/elsewhere/c.txt", Operation::Create, Some("d3"), ts(0)))
            .unwrap();

        // Before the delete both files exist under /dir
        let entries = catalog.tree_at("/dir/", ts(6)).unwrap();
        assert_eq!(
            entries.iter().map(|e| e.path.as_str()).collect::<Vec<_>>(),
            vec!["/dir/a.txt", "/dir/b.txt"]
        );
        // After the delete only b remains
        let entries = catalog.tree_at("/dir/", ts(11)).unwrap();
        assert_eq!(
            entries.iter().map(|e| e.path.as_str()).collect::<Vec<_>>(),
            vec!["/dir/b.txt"]
        );
    }

    #[test]
    fn test_tree_at_escapes_like_wildcards() {
        let catalog = Catalog::open_in_memory().unwrap();
        catalog
            .append(row("/d_r/a.txt", Operation::Create, Some("d1"), ts(0)))
            .unwrap();
        catalog
            .append(row("/dXr/b.txt", Operation::Create, Some("d2"), ts(0)))
            .unwrap();
        // An unescaped '_' would match both directories
        let entries = catalog.tree_at("/d_r/", ts(1)).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].path, "/d_r/a.txt");
    }

    #[test]
    fn test_sweep_keeps_minimum_versions() {
        let catalog = Catalog::open_in_memory().unwrap();
        for i in 0..5 {
            catalog
                .append(row(
                    "/a.txt",
                    Operation::Modify,
                    Some(&format!("d{i}")),
                    ts(i),
                ))
                .unwrap();
        }
        // Everything is older than the cutoff, but the floor holds 3 back.
        let deleted = catalog.sweep_expired(ts(1000), 3).unwrap();
        assert_eq!(deleted, 2);
        let (survivors, total) = catalog.history("/a.txt", 10, 0).unwrap();
        assert_eq!(total, 3);
        assert_eq!(
            survivors.iter().map(|v| v.number).collect::<Vec<_>>(),
            vec![5, 4, 3]
        );
    }

    #[test]
    fn test_sweep_respects_cutoff() {
        let catalog = Catalog::open_in_memory().unwrap();
        for i in 0..4 {
            catalog
                .append(row(
                    "/a.txt",
                    Operation::Modify,
                    Some(&format!("d{i}")),
                    ts(i * 100),
                ))
                .unwrap();
        }
        // Only rows strictly before ts(100) are old enough; floor of 1 allows
        // deleting everything but the newest.
        let deleted = catalog.sweep_expired(ts(100), 1).unwrap();
        assert_eq!(deleted, 1);
        let (survivors, _) = catalog.history("/a.txt", 10, 0).unwrap();
        assert_eq!(
            survivors.iter().map(|v| v.number).collect::<Vec<_>>(),
            vec![4, 3, 2]
        );
    }

    #[test]
    fn test_referenced_digests_and_stats() {
        let catalog = Catalog::open_in_memory().unwrap();
        catalog
            .append(row("/a.txt", Operation::Create, Some("shared"), ts(0)))
            .unwrap();
        catalog
            .append(row("/b.txt", Operation::Create, Some("shared"), ts(1)))
            .unwrap();
        catalog
            .append(row("/a.txt", Operation::Delete, None, ts(2)))
            .unwrap();

        let digests = catalog.referenced_digests().unwrap();
        assert_eq!(digests.len(), 1);
        assert!(digests.contains("shared"));

        let (total, unique, bytes) = catalog.stats().unwrap();
        assert_eq!(total, 3);
        assert_eq!(unique, 2);
        assert_eq!(bytes, 12); // two rows of size 6, delete row of size 0
    }

    #[test]
    fn test_metadata_round_trip() {
        let catalog = Catalog::open_in_memory().unwrap();
        let mut version = row("/a.txt", Operation::Restore, Some("d1"), ts(0));
        version.metadata = Some(serde_json::json!({ "restored_from_version": 2 }));
        catalog.append(version).unwrap();

        let stored = catalog.latest("/a.txt").unwrap().unwrap();
        assert_eq!(stored.restored_from(), Some(2));
    }

    #[test]
    fn test_concurrent_appends_stay_gap_free() {
        let catalog = Arc::new(Catalog::open_in_memory().unwrap());
        let mut handles = Vec::new();
        for t in 0..4 {
            let catalog = Arc::clone(&catalog);
            handles.push(std::thread::spawn(move || {
                for i in 0..10 {
                    catalog
                        .append(NewVersion {
                            path: "/contended.txt".to_string(),
                            operation: Operation::Modify,
                            digest: Some(format!("d{t}-{i}")),
                            size: 1,
                            timestamp: Utc::now(),
                            metadata: None,
                        })
                        .unwrap();
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        let (versions, total) = catalog.history("/contended.txt", 100, 0).unwrap();
        assert_eq!(total, 40);
        let mut numbers: Vec<i64> = versions.iter().map(|v| v.number).collect();
        numbers.sort_unstable();
        assert_eq!(numbers, (1..=40).collect::<Vec<_>>());
    }
}
