//! Version recorder
//!
//! Turns an observed file event into at most one catalog row and at most one
//! stored blob. The recorder runs on the high-frequency event path, so it
//! degrades rather than aborts: an unreadable file is recorded with a null
//! digest, and a missing file is only surprising when the event says it
//! should exist.
//!
//! Dedup: a soft event (create/modify) whose content digest equals the
//! immediately preceding version's digest produces no new row; the previous
//! version's id is returned instead. Delete, move, restore, and pre-restore
//! events are always appended so the history records what actually happened.

use crate::catalog::{Catalog, NewVersion};
use crate::content_store::{compute_digest, ContentStore};
use crate::error::{Result, RewindError};
use crate::types::Operation;
use chrono::Utc;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Result of recording one observation
#[derive(Debug, Clone)]
pub struct RecordedVersion {
    /// Catalog row id (the previous row's id when deduplicated)
    pub id: Uuid,
    /// Version number (the previous row's number when deduplicated)
    pub number: i64,
    /// Whether the observation was suppressed as an unchanged re-save
    pub deduplicated: bool,
}

/// Writes observations to the catalog and content store consistently
///
/// The blob is stored before the catalog row is inserted, so no committed row
/// ever references content the store does not hold.
#[derive(Debug, Clone)]
pub struct Recorder {
    catalog: Arc<Catalog>,
    objects: Arc<ContentStore>,
}

impl Recorder {
    /// Create a recorder over shared catalog and content-store handles
    pub fn new(catalog: Arc<Catalog>, objects: Arc<ContentStore>) -> Self {
        Self { catalog, objects }
    }

    /// Record the current on-disk state of `path` under `operation`
    ///
    /// Returns the new row's identity, or the previous row's identity with
    /// `deduplicated` set when an unchanged soft event was suppressed.
    ///
    /// # Errors
    ///
    /// Only catalog and store failures surface as errors; expected filesystem
    /// conditions (missing file on delete, file vanishing mid-record) do not.
    pub fn record(
        &self,
        path: &str,
        operation: Operation,
        metadata: Option<serde_json::Value>,
    ) -> Result<RecordedVersion> {
        let live = Path::new(path);
        let bytes = match self.read_current(live, operation) {
            Ok(bytes) => bytes,
            Err(err @ RewindError::ContentUnreadable { .. }) => {
                warn!("{err}; recording version without content");
                None
            }
            Err(err) => return Err(err),
        };
        let digest = bytes.as_deref().map(compute_digest);
        let size = bytes.as_ref().map(|b| b.len() as u64).unwrap_or(0);

        if operation.is_soft() && digest.is_some() {
            if let Some(prev) = self.catalog.latest(path)? {
                if prev.digest == digest {
                    debug!("{path}: content unchanged from v{}, skipping", prev.number);
                    return Ok(RecordedVersion {
                        id: prev.id,
                        number: prev.number,
                        deduplicated: true,
                    });
                }
            }
        }

        if let Some(bytes) = &bytes {
            self.objects.put(bytes, live)?;
        }

        let row = self.catalog.append(NewVersion {
            path: path.to_string(),
            operation,
            digest,
            size,
            timestamp: Utc::now(),
            metadata,
        })?;
        Ok(RecordedVersion {
            id: row.id,
            number: row.number,
            deduplicated: false,
        })
    }

    /// Read the live bytes an event refers to, if any
    ///
    /// Deletes never read; a missing file yields `None` (the watcher may race
    /// the event); an existing-but-unreadable file is `ContentUnreadable`.
    fn read_current(&self, live: &Path, operation: Operation) -> Result<Option<Vec<u8>>> {
        if operation == Operation::Delete || !live.exists() {
            return Ok(None);
        }
        match fs::read(live) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(_) => Err(RewindError::ContentUnreadable {
                path: live.to_path_buf(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compression::{CompressionEngine, CompressionStrategy};
    use tempfile::TempDir;

    fn test_recorder() -> (Recorder, Arc<Catalog>, Arc<ContentStore>, TempDir) {
        let dir = TempDir::new().unwrap();
        let catalog = Arc::new(Catalog::open_in_memory().unwrap());
        let objects = Arc::new(
            ContentStore::open(
                dir.path().join("objects"),
                CompressionEngine::new(CompressionStrategy::Fast),
            )
            .unwrap(),
        );
        let recorder = Recorder::new(Arc::clone(&catalog), Arc::clone(&objects));
        (recorder, catalog, objects, dir)
    }

    fn live_path(dir: &TempDir, name: &str) -> String {
        dir.path().join(name).to_string_lossy().to_string()
    }

    #[test]
    fn test_record_create_then_modify() {
        let (recorder, catalog, objects, dir) = test_recorder();
        let path = live_path(&dir, "a.txt");

        fs::write(&path, "X").unwrap();
        let v1 = recorder.record(&path, Operation::Create, None).unwrap();
        assert_eq!(v1.number, 1);
        assert!(!v1.deduplicated);

        fs::write(&path, "Y").unwrap();
        let v2 = recorder.record(&path, Operation::Modify, None).unwrap();
        assert_eq!(v2.number, 2);

        let latest = catalog.latest(&path).unwrap().unwrap();
        assert_eq!(latest.number, 2);
        assert_eq!(latest.size, 1);
        let digest = latest.digest.unwrap();
        assert_eq!(objects.load(&digest).unwrap(), b"Y");
    }

    #[test]
    fn test_unchanged_soft_event_is_deduplicated() {
        let (recorder, catalog, _objects, dir) = test_recorder();
        let path = live_path(&dir, "a.txt");
        fs::write(&path, "same").unwrap();

        let first = recorder.record(&path, Operation::Create, None).unwrap();
        let second = recorder.record(&path, Operation::Modify, None).unwrap();
        assert!(second.deduplicated);
        assert_eq!(second.id, first.id);
        assert_eq!(second.number, first.number);

        let (_, total) = catalog.history(&path, 10, 0).unwrap();
        assert_eq!(total, 1);
    }

    #[test]
    fn test_hard_events_are_never_deduplicated() {
        let (recorder, catalog, _objects, dir) = test_recorder();
        let path = live_path(&dir, "a.txt");
        fs::write(&path, "same").unwrap();

        recorder.record(&path, Operation::Create, None).unwrap();
        let moved = recorder.record(&path, Operation::Move, None).unwrap();
        assert!(!moved.deduplicated);
        assert_eq!(moved.number, 2);

        let snap = recorder.record(&path, Operation::PreRestore, None).unwrap();
        assert!(!snap.deduplicated);
        assert_eq!(snap.number, 3);
        assert_eq!(catalog.history(&path, 10, 0).unwrap().1, 3);
    }

    #[test]
    fn test_delete_records_null_digest() {
        let (recorder, catalog, _objects, dir) = test_recorder();
        let path = live_path(&dir, "a.txt");
        fs::write(&path, "gone soon").unwrap();
        recorder.record(&path, Operation::Create, None).unwrap();

        fs::remove_file(&path).unwrap();
        let deleted = recorder.record(&path, Operation::Delete, None).unwrap();
        assert_eq!(deleted.number, 2);

        let latest = catalog.latest(&path).unwrap().unwrap();
        assert_eq!(latest.operation, Operation::Delete);
        assert!(latest.digest.is_none());
        assert_eq!(latest.size, 0);
    }

    #[test]
    fn test_missing_file_on_soft_event_degrades() {
        let (recorder, catalog, _objects, dir) = test_recorder();
        let path = live_path(&dir, "never-existed.txt");

        let v = recorder.record(&path, Operation::Modify, None).unwrap();
        assert_eq!(v.number, 1);
        assert!(catalog.latest(&path).unwrap().unwrap().digest.is_none());
    }

    #[test]
    fn test_two_paths_share_one_blob() {
        let (recorder, _catalog, objects, dir) = test_recorder();
        let path_a = live_path(&dir, "a.txt");
        let path_b = live_path(&dir, "b.txt");
        fs::write(&path_a, "identical").unwrap();
        fs::write(&path_b, "identical").unwrap();

        recorder.record(&path_a, Operation::Create, None).unwrap();
        recorder.record(&path_b, Operation::Create, None).unwrap();
        assert_eq!(objects.list_digests().unwrap().len(), 1);
    }

    #[test]
    fn test_version_numbers_are_gap_free_as_content_changes() {
        let (recorder, _catalog, _objects, dir) = test_recorder();
        let path = live_path(&dir, "a.txt");
        let mut numbers = Vec::new();
        for i in 0..5 {
            fs::write(&path, format!("content {i}")).unwrap();
            numbers.push(
                recorder
                    .record(&path, Operation::Modify, None)
                    .unwrap()
                    .number,
            );
        }
        assert_eq!(numbers, vec![1, 2, 3, 4, 5]);
    }
}
