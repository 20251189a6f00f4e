//! Main Rewind implementation
//!
//! [`Rewind`] is the entry point tying the components together: one explicit
//! store object constructed at startup, holding shared handles to the version
//! catalog and the content store, passed by reference to every caller. There
//! is no process-wide singleton state; tests inject an in-memory catalog or a
//! temp-directory store through [`RewindBuilder`].
//!
//! ## Layout on disk
//!
//! ```text
//! storage_root/
//! ├── metadata.json   # store metadata and configuration
//! ├── catalog.db      # SQLite version catalog
//! └── objects/        # content-addressed blobs (sharded)
//! ```
//!
//! ## Examples
//!
//! ```rust,no_run
//! use rewind::{Operation, Rewind, VersionSelector};
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Rewind::open(PathBuf::from("~/.rewind"))?;
//!
//! // A watcher observed a save
//! store.record_version("/home/u/notes.md", Operation::Modify, None);
//!
//! // Undo it
//! let report = store.restore("/home/u/notes.md", VersionSelector::Previous)?;
//! println!("{}", report.message());
//! # Ok(())
//! # }
//! ```

use crate::catalog::Catalog;
use crate::compression::{CompressionEngine, CompressionStrategy};
use crate::content_store::ContentStore;
use crate::error::Result;
use crate::recorder::{RecordedVersion, Recorder};
use crate::restore::RestoreEngine;
use crate::retention::RetentionSweeper;
use crate::timetravel::Reconstructor;
use crate::types::{
    GcStats, HistoryPage, Operation, RestoreReport, StoreConfig, StoreMetadata, StoreStats,
    SweepStats, TreeSnapshot, VersionSelector,
};
use chrono::{DateTime, Utc};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

const METADATA_FILE: &str = "metadata.json";
const CATALOG_FILE: &str = "catalog.db";
const OBJECTS_DIR: &str = "objects";
const FORMAT_VERSION: u32 = 1;

/// A versioned, content-addressed file store
///
/// Owns the catalog and content store and exposes the complete contract:
/// record a version, list history, restore, reconstruct a directory as of a
/// past instant, and prune old versions.
pub struct Rewind {
    config: StoreConfig,
    catalog: Arc<Catalog>,
    objects: Arc<ContentStore>,
    recorder: Recorder,
    restorer: RestoreEngine,
    reconstructor: Reconstructor,
    sweeper: RetentionSweeper,
}

impl std::fmt::Debug for Rewind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rewind")
            .field("storage_root", &self.config.storage_root)
            .finish()
    }
}

impl Rewind {
    /// Open (creating if needed) a store at `storage_root` with defaults
    pub fn open(storage_root: PathBuf) -> Result<Self> {
        RewindBuilder::new().build(storage_root)
    }

    /// Record an observed state of `path`; never raises for expected
    /// conditions
    ///
    /// Returns the version row id, or `None` when recording was skipped
    /// (unchanged content under a soft event) or failed. Failures are logged,
    /// not thrown: this runs once per file-system event, and aborting the
    /// watcher is worse than missing one version. Use
    /// [`record`](Self::record) when failure details matter.
    pub fn record_version(
        &self,
        path: &str,
        operation: Operation,
        metadata: Option<serde_json::Value>,
    ) -> Option<Uuid> {
        match self.recorder.record(path, operation, metadata) {
            Ok(recorded) => Some(recorded.id),
            Err(err) => {
                warn!("failed to record {operation} of {path}: {err}");
                None
            }
        }
    }

    /// Record an observed state of `path`, surfacing failures
    pub fn record(
        &self,
        path: &str,
        operation: Operation,
        metadata: Option<serde_json::Value>,
    ) -> Result<RecordedVersion> {
        self.recorder.record(path, operation, metadata)
    }

    /// A page of `path`'s version history, newest first
    pub fn history(&self, path: &str, limit: u32, offset: u32) -> Result<HistoryPage> {
        let (versions, total) = self.catalog.history(path, limit, offset)?;
        Ok(HistoryPage {
            path: path.to_string(),
            versions,
            total,
        })
    }

    /// Restore `path` to the state chosen by `selector`
    ///
    /// See [`RestoreEngine::restore`](crate::restore::RestoreEngine::restore)
    /// for resolution rules and the outcome kinds.
    pub fn restore(&self, path: &str, selector: VersionSelector) -> Result<RestoreReport> {
        self.restorer.restore(path, selector)
    }

    /// Reconstruct the listing of `directory` as of `as_of`
    pub fn time_travel(&self, directory: &str, as_of: DateTime<Utc>) -> Result<TreeSnapshot> {
        self.reconstructor.reconstruct(directory, as_of)
    }

    /// Prune catalog rows older than `max_age`, keeping each path's
    /// `min_versions_per_file` most recent versions
    pub fn sweep(&self, max_age: Duration, min_versions_per_file: u32) -> Result<SweepStats> {
        self.sweeper.sweep(max_age, min_versions_per_file)
    }

    /// Delete blobs no surviving catalog row references
    pub fn collect_garbage(&self) -> Result<GcStats> {
        self.sweeper.collect_garbage()
    }

    /// Combined catalog and content-store statistics
    pub fn stats(&self) -> Result<StoreStats> {
        let (total_versions, unique_files, logical_bytes) = self.catalog.stats()?;
        let (object_count, object_bytes) = self.objects.stats()?;
        Ok(StoreStats {
            total_versions,
            unique_files,
            logical_bytes,
            object_count,
            object_bytes,
        })
    }

    /// The configuration this store was opened with
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }
}

/// Builder for [`Rewind`] instances
///
/// # Examples
///
/// ```rust,no_run
/// use rewind::{CompressionStrategy, RewindBuilder};
/// use std::path::PathBuf;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let store = RewindBuilder::new()
///     .compression_strategy(CompressionStrategy::adaptive_default())
///     .build(PathBuf::from("./store"))?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct RewindBuilder {
    compression: Option<CompressionStrategy>,
}

impl RewindBuilder {
    /// Create a builder with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Compression strategy for blobs at rest
    ///
    /// Ignored when opening an existing store; the persisted configuration
    /// wins so already-written blobs stay readable.
    pub fn compression_strategy(mut self, strategy: CompressionStrategy) -> Self {
        self.compression = Some(strategy);
        self
    }

    /// Open (creating if needed) the store at `storage_root`
    pub fn build(self, storage_root: PathBuf) -> Result<Rewind> {
        fs::create_dir_all(&storage_root)?;
        let metadata_path = storage_root.join(METADATA_FILE);

        let (config, strategy) = if metadata_path.exists() {
            let mut metadata: StoreMetadata =
                serde_json::from_str(&fs::read_to_string(&metadata_path)?)?;
            let strategy = CompressionStrategy::from_name(&metadata.config.compression_strategy)?;
            metadata.last_opened = Utc::now();
            fs::write(&metadata_path, serde_json::to_string_pretty(&metadata)?)?;
            info!("opened store at {:?}", storage_root);
            (metadata.config, strategy)
        } else {
            let strategy = self.compression.unwrap_or_default();
            let config = StoreConfig {
                storage_root: storage_root.clone(),
                compression_strategy: strategy.name().to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            };
            let metadata = StoreMetadata {
                format_version: FORMAT_VERSION,
                created_at: Utc::now(),
                last_opened: Utc::now(),
                config: config.clone(),
            };
            fs::write(&metadata_path, serde_json::to_string_pretty(&metadata)?)?;
            info!("initialized store at {:?}", storage_root);
            (config, strategy)
        };

        let catalog = Arc::new(Catalog::open(&storage_root.join(CATALOG_FILE))?);
        let objects = Arc::new(ContentStore::open(
            storage_root.join(OBJECTS_DIR),
            CompressionEngine::new(strategy),
        )?);
        let recorder = Recorder::new(Arc::clone(&catalog), Arc::clone(&objects));
        let restorer = RestoreEngine::new(
            Arc::clone(&catalog),
            Arc::clone(&objects),
            recorder.clone(),
        );
        let reconstructor = Reconstructor::new(Arc::clone(&catalog));
        let sweeper = RetentionSweeper::new(Arc::clone(&catalog), Arc::clone(&objects));

        Ok(Rewind {
            config,
            catalog,
            objects,
            recorder,
            restorer,
            reconstructor,
            sweeper,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn live_path(dir: &TempDir, name: &str) -> String {
        dir.path().join(name).to_string_lossy().to_string()
    }

    #[test]
    fn test_open_creates_layout() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("store");
        let _store = Rewind::open(root.clone()).unwrap();

        assert!(root.join("metadata.json").exists());
        assert!(root.join("catalog.db").exists());
        assert!(root.join("objects").exists());
    }

    #[test]
    fn test_reopen_preserves_configuration() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("store");
        {
            let store = RewindBuilder::new()
                .compression_strategy(CompressionStrategy::None)
                .build(root.clone())
                .unwrap();
            assert_eq!(store.config().compression_strategy, "none");
        }
        // A different builder strategy does not override the persisted one
        let store = RewindBuilder::new()
            .compression_strategy(CompressionStrategy::Fast)
            .build(root)
            .unwrap();
        assert_eq!(store.config().compression_strategy, "none");
    }

    #[test]
    fn test_state_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("store");
        let path = live_path(&dir, "a.txt");

        {
            let store = Rewind::open(root.clone()).unwrap();
            fs::write(&path, "durable").unwrap();
            store
                .record(&path, Operation::Create, None)
                .unwrap();
        }

        let store = Rewind::open(root).unwrap();
        let page = store.history(&path, 10, 0).unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.versions[0].number, 1);

        fs::write(&path, "changed").unwrap();
        store.record(&path, Operation::Modify, None).unwrap();
        let report = store.restore(&path, VersionSelector::Previous).unwrap();
        assert!(report.success());
        assert_eq!(fs::read_to_string(&path).unwrap(), "durable");
    }

    #[test]
    fn test_record_version_swallows_failures() {
        let dir = TempDir::new().unwrap();
        let store = Rewind::open(dir.path().join("store")).unwrap();
        let path = live_path(&dir, "ghost.txt");

        // Missing file on a soft event records a contentless version
        let id = store.record_version(&path, Operation::Modify, None);
        assert!(id.is_some());
        assert_eq!(store.history(&path, 10, 0).unwrap().total, 1);
    }

    #[test]
    fn test_stats_reflect_activity() {
        let dir = TempDir::new().unwrap();
        let store = Rewind::open(dir.path().join("store")).unwrap();
        let path_a = live_path(&dir, "a.txt");
        let path_b = live_path(&dir, "b.txt");

        fs::write(&path_a, "shared").unwrap();
        fs::write(&path_b, "shared").unwrap();
        store.record(&path_a, Operation::Create, None).unwrap();
        store.record(&path_b, Operation::Create, None).unwrap();

        let stats = store.stats().unwrap();
        assert_eq!(stats.total_versions, 2);
        assert_eq!(stats.unique_files, 2);
        assert_eq!(stats.logical_bytes, 12);
        assert_eq!(stats.object_count, 1); // deduplicated blob
    }
}
