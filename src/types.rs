//! Core data types used throughout the Rewind library
//!
//! This module contains the fundamental data structures shared across
//! components:
//!
//! - **Catalog rows**: [`FileVersion`], [`Operation`] - one recorded state of
//!   a tracked file
//! - **Operations**: [`VersionSelector`], [`RestoreReport`], [`TreeSnapshot`],
//!   [`SweepStats`], [`GcStats`] - inputs and results of the public contract
//! - **Configuration**: [`StoreConfig`], [`StoreMetadata`] - persisted store
//!   settings
//!
//! File paths are treated as *flat strings* throughout the catalog: a path is
//! a logical key, compared and prefix-matched lexically, never canonicalized
//! or parsed into a hierarchy. Only the restore engine touches the path as an
//! actual filesystem location.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use uuid::Uuid;

/// The kind of event that produced a version
///
/// `Create` and `Modify` are "soft" events: re-observing unchanged content
/// under them is suppressed by the recorder's dedup check. The remaining
/// operations are always appended, even when the content digest matches the
/// previous version, so the history faithfully records what happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// File appeared
    Create,
    /// File content changed
    Modify,
    /// File was removed; versions of this kind carry no content digest
    Delete,
    /// File was renamed or moved to this path
    Move,
    /// File was overwritten by a restore
    Restore,
    /// Safety snapshot taken immediately before a restore overwrites the file
    PreRestore,
}

impl Operation {
    /// Stable textual form, used as the catalog column value
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Modify => "modify",
            Operation::Delete => "delete",
            Operation::Move => "move",
            Operation::Restore => "restore",
            Operation::PreRestore => "pre_restore",
        }
    }

    /// Whether the recorder's unchanged-content dedup applies to this event
    pub fn is_soft(&self) -> bool {
        matches!(self, Operation::Create | Operation::Modify)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "create" => Ok(Operation::Create),
            "modify" => Ok(Operation::Modify),
            "delete" => Ok(Operation::Delete),
            "move" | "rename" => Ok(Operation::Move),
            "restore" => Ok(Operation::Restore),
            "pre_restore" => Ok(Operation::PreRestore),
            other => Err(format!("unknown operation: {other}")),
        }
    }
}

/// One recorded state of a tracked file (a catalog row)
///
/// Rows are created exactly once and never mutated; they are destroyed only
/// by the retention sweeper. For a fixed path, version numbers start at 1 and
/// increase strictly with no gaps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileVersion {
    /// Opaque unique row id
    pub id: Uuid,
    /// Logical file path (flat string key)
    pub path: String,
    /// Per-path, 1-based version number
    pub number: i64,
    /// Event that produced this version
    pub operation: Operation,
    /// SHA-256 digest of the content; `None` for delete records and for
    /// states whose bytes could not be read
    pub digest: Option<String>,
    /// Content size in bytes at record time
    pub size: u64,
    /// Wall-clock time the version was recorded
    pub timestamp: DateTime<Utc>,
    /// Free-form metadata (e.g. the version a restore came from)
    pub metadata: Option<serde_json::Value>,
}

impl FileVersion {
    /// Value of the `restored_from_version` metadata key, if present
    pub fn restored_from(&self) -> Option<i64> {
        self.metadata
            .as_ref()
            .and_then(|m| m.get("restored_from_version"))
            .and_then(|v| v.as_i64())
    }
}

/// Which historical state a restore should target
///
/// Exactly one resolution rule applies per selector; see the restore engine
/// for how each one maps onto catalog queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionSelector {
    /// Exact version number for the path
    Version(i64),
    /// Latest version recorded at or before this instant
    AsOf(DateTime<Utc>),
    /// The version before the current one ("undo", not "reload")
    Previous,
}

/// Structured result of a restore operation
///
/// The engine never silently no-ops: every way a restore can end is a
/// distinct variant, and partial failure after the safety snapshot carries
/// the snapshot's version number so the overwritten state stays recoverable.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RestoreOutcome {
    /// The live file now holds the content of `version`
    Restored {
        /// Version number the file was restored to
        version: i64,
        /// Version number of the pre-restore safety snapshot
        snapshot_version: i64,
    },
    /// The selector resolved to no catalog row; nothing was touched
    NoSuchVersion,
    /// The resolved row has no retrievable content (a delete record, or its
    /// blob was pruned); nothing was touched
    ContentUnavailable {
        /// Version number that was resolved
        version: i64,
    },
    /// Overwriting the live file failed after the safety snapshot succeeded
    WriteFailed {
        /// Version number of the safety snapshot, still valid and recoverable
        snapshot_version: i64,
        /// Underlying write error
        error: String,
    },
}

/// Result of a restore request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestoreReport {
    /// Logical path the restore targeted
    pub path: String,
    /// How the restore ended
    pub outcome: RestoreOutcome,
}

impl RestoreReport {
    /// Whether the live file was successfully restored
    pub fn success(&self) -> bool {
        matches!(self.outcome, RestoreOutcome::Restored { .. })
    }

    /// Version number restored to, when successful
    pub fn restored_version(&self) -> Option<i64> {
        match self.outcome {
            RestoreOutcome::Restored { version, .. } => Some(version),
            _ => None,
        }
    }

    /// Human-readable summary of the outcome
    pub fn message(&self) -> String {
        match &self.outcome {
            RestoreOutcome::Restored { version, .. } => {
                format!("restored to version {version}")
            }
            RestoreOutcome::NoSuchVersion => "no version found to restore".to_string(),
            RestoreOutcome::ContentUnavailable { version } => {
                format!("version {version} has no retrievable content")
            }
            RestoreOutcome::WriteFailed {
                snapshot_version,
                error,
            } => format!(
                "writing the live file failed ({error}); \
                 pre-restore state preserved as version {snapshot_version}"
            ),
        }
    }
}

/// One file as it existed at a reconstructed instant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeEntry {
    /// Logical file path
    pub path: String,
    /// Version number in effect at the instant
    pub version: i64,
    /// Content size in bytes at that version
    pub size: u64,
    /// When that version was recorded
    pub timestamp: DateTime<Utc>,
}

/// A directory listing as of a past instant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeSnapshot {
    /// Directory prefix that was reconstructed
    pub directory: String,
    /// The instant the listing reflects
    pub as_of: DateTime<Utc>,
    /// Files that existed at the instant, sorted by path
    pub files: Vec<TreeEntry>,
    /// Number of entries in `files`
    pub file_count: usize,
}

/// A page of a file's version history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryPage {
    /// Logical file path
    pub path: String,
    /// Versions in this page, ordered by version number descending
    pub versions: Vec<FileVersion>,
    /// Total number of versions recorded for the path
    pub total: u64,
}

/// Result of a retention sweep
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepStats {
    /// Catalog rows deleted
    pub deleted_versions: usize,
    /// Rows older than this instant were eligible
    pub cutoff: DateTime<Utc>,
}

/// Statistics from orphaned-blob garbage collection
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GcStats {
    /// Number of store objects examined
    pub objects_examined: usize,
    /// Number of unreferenced objects deleted
    pub objects_deleted: usize,
    /// Bytes reclaimed on disk
    pub bytes_reclaimed: u64,
    /// Duration in milliseconds
    pub duration_ms: u64,
}

/// Combined catalog and content-store statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreStats {
    /// Total catalog rows
    pub total_versions: u64,
    /// Distinct file paths with at least one version
    pub unique_files: u64,
    /// Sum of recorded (uncompressed) sizes across all rows
    pub logical_bytes: u64,
    /// Unique blobs in the content store
    pub object_count: usize,
    /// Bytes the content store occupies on disk
    pub object_bytes: u64,
}

/// Configuration for a Rewind store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Directory holding the catalog and the object store
    pub storage_root: PathBuf,
    /// Compression strategy name for blobs at rest
    pub compression_strategy: String,
    /// Rewind version that created this store
    pub version: String,
}

/// Metadata persisted at the storage root
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreMetadata {
    /// Version of the on-disk format
    pub format_version: u32,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last opened timestamp
    pub last_opened: DateTime<Utc>,
    /// Configuration
    pub config: StoreConfig,
}
