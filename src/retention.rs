//! Retention sweeper and orphaned-blob garbage collection
//!
//! Two separately scheduled maintenance passes keep storage growth bounded:
//!
//! 1. **Sweep**: bulk-delete catalog rows older than a retention window,
//!    always keeping each path's most recent versions regardless of age.
//!    Survivors are never renumbered.
//! 2. **Garbage collection**: a reachability pass deleting blobs no
//!    surviving catalog row references.
//!
//! GC is deliberately not folded into the sweep: a recorder may be between
//! "blob stored" and "row committed", so reclaiming blobs inline with the
//! hot write path would race it. Run as an explicit or scheduled pass; `put`
//! is idempotent, so the worst outcome of an ill-timed GC is a blob that a
//! later re-record writes again.

use crate::catalog::Catalog;
use crate::content_store::ContentStore;
use crate::error::{Result, RewindError};
use crate::types::{GcStats, SweepStats};
use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Bounded-growth maintenance over the catalog and content store
#[derive(Debug, Clone)]
pub struct RetentionSweeper {
    catalog: Arc<Catalog>,
    objects: Arc<ContentStore>,
}

impl RetentionSweeper {
    /// Create a sweeper over shared catalog and content-store handles
    pub fn new(catalog: Arc<Catalog>, objects: Arc<ContentStore>) -> Self {
        Self { catalog, objects }
    }

    /// Delete catalog rows older than `max_age`, keeping at least the
    /// `min_versions_per_file` most recent versions of every path
    ///
    /// Blobs are not touched; run [`collect_garbage`](Self::collect_garbage)
    /// afterwards to reclaim unreferenced content.
    pub fn sweep(&self, max_age: Duration, min_versions_per_file: u32) -> Result<SweepStats> {
        let age = chrono::Duration::from_std(max_age).map_err(|err| {
            RewindError::InvalidConfiguration(format!("retention window out of range: {err}"))
        })?;
        let cutoff = Utc::now() - age;
        let deleted_versions = self.catalog.sweep_expired(cutoff, min_versions_per_file)?;
        info!(
            "retention sweep deleted {} versions older than {}",
            deleted_versions, cutoff
        );
        Ok(SweepStats {
            deleted_versions,
            cutoff,
        })
    }

    /// Delete every stored blob no surviving catalog row references
    ///
    /// Liveness comes from a full scan of surviving rows, so the pass is
    /// restartable and safe to re-run at any time.
    pub fn collect_garbage(&self) -> Result<GcStats> {
        let started = Instant::now();
        let referenced = self.catalog.referenced_digests()?;
        let mut stats = GcStats::default();

        for digest in self.objects.list_digests()? {
            stats.objects_examined += 1;
            if referenced.contains(&digest) {
                continue;
            }
            let freed = self.objects.delete(&digest)?;
            stats.objects_deleted += 1;
            stats.bytes_reclaimed += freed;
            debug!("gc removed unreferenced object {}", &digest[..8]);
        }

        stats.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            "gc examined {} objects, deleted {}, reclaimed {} bytes",
            stats.objects_examined, stats.objects_deleted, stats.bytes_reclaimed
        );
        Ok(stats)
    }
}
