//! Restore engine
//!
//! Restores a file to an earlier recorded state, safety-first: the state
//! about to be overwritten is itself recorded as a `pre_restore` version
//! before any byte of the live file changes, which makes every restore
//! undoable. The three-step sequence (snapshot, overwrite, record restore)
//! is not atomic across steps; a crash in between leaves a valid snapshot
//! and no catalog row claiming a restore happened.
//!
//! The engine fails loudly with a structured [`RestoreReport`] - selector
//! misses and unavailable content are explicit outcomes, never silent no-ops.
//! Only catalog/store infrastructure failures propagate as errors.

use crate::catalog::Catalog;
use crate::content_store::ContentStore;
use crate::error::{Result, RewindError};
use crate::recorder::Recorder;
use crate::types::{FileVersion, Operation, RestoreOutcome, RestoreReport, VersionSelector};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Resolves a selector to a catalog row and swaps the live file's content
#[derive(Debug, Clone)]
pub struct RestoreEngine {
    catalog: Arc<Catalog>,
    objects: Arc<ContentStore>,
    recorder: Recorder,
}

impl RestoreEngine {
    /// Create an engine over shared handles; the recorder is used for the
    /// pre-restore snapshot and the restore record
    pub fn new(catalog: Arc<Catalog>, objects: Arc<ContentStore>, recorder: Recorder) -> Self {
        Self {
            catalog,
            objects,
            recorder,
        }
    }

    /// Restore `path` to the state selected by `selector`
    ///
    /// Resolution:
    /// - [`VersionSelector::Version`]: the exact (path, number) row
    /// - [`VersionSelector::AsOf`]: latest row at or before the instant,
    ///   ties broken by highest version number
    /// - [`VersionSelector::Previous`]: the second-most-recent row - undo,
    ///   not reload
    ///
    /// On success the history gains two rows: a `pre_restore` snapshot of the
    /// overwritten state and a `restore` row carrying
    /// `restored_from_version`.
    ///
    /// # Errors
    ///
    /// Returns `Err` only for catalog/store infrastructure failures (which
    /// are retriable); every other way a restore can end is a
    /// [`RestoreOutcome`] variant.
    pub fn restore(&self, path: &str, selector: VersionSelector) -> Result<RestoreReport> {
        let report = |outcome| RestoreReport {
            path: path.to_string(),
            outcome,
        };

        let Some(target) = self.resolve(path, selector)? else {
            return Ok(report(RestoreOutcome::NoSuchVersion));
        };

        let Some(digest) = target.digest.clone() else {
            // Delete records carry no content; there is nothing to restore to.
            return Ok(report(RestoreOutcome::ContentUnavailable {
                version: target.number,
            }));
        };

        // Load the bytes before taking the snapshot so an unavailable blob
        // has no side effects.
        let bytes = match self.objects.load(&digest) {
            Ok(bytes) => bytes,
            Err(RewindError::ObjectNotFound(_)) => {
                return Ok(report(RestoreOutcome::ContentUnavailable {
                    version: target.number,
                }));
            }
            Err(err) => return Err(err),
        };

        let snapshot = self
            .recorder
            .record(path, Operation::PreRestore, None)?;

        if let Err(err) = write_live(Path::new(path), &bytes) {
            warn!(
                "restore of {path} failed writing the live file: {err}; \
                 pre-restore state preserved as v{}",
                snapshot.number
            );
            return Ok(report(RestoreOutcome::WriteFailed {
                snapshot_version: snapshot.number,
                error: err.to_string(),
            }));
        }

        self.recorder.record(
            path,
            Operation::Restore,
            Some(serde_json::json!({ "restored_from_version": target.number })),
        )?;

        info!("restored {path} to v{}", target.number);
        Ok(report(RestoreOutcome::Restored {
            version: target.number,
            snapshot_version: snapshot.number,
        }))
    }

    fn resolve(&self, path: &str, selector: VersionSelector) -> Result<Option<FileVersion>> {
        match selector {
            VersionSelector::Version(number) => self.catalog.exact(path, number),
            VersionSelector::AsOf(instant) => self.catalog.latest_at_or_before(path, instant),
            VersionSelector::Previous => self.catalog.previous(path),
        }
    }
}

/// Overwrite the live file, creating parent directories as needed
fn write_live(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, bytes)
}
