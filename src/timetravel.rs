//! Time-travel reconstructor
//!
//! Computes what a directory looked like at a past instant: for every path
//! under the prefix, the latest version recorded at or before the instant,
//! with paths whose state at that instant was a deletion excluded entirely.
//!
//! Directory matching is flat-string prefix matching over stored paths - no
//! path hierarchy is parsed, so `"/home/u/doc"` also matches
//! `"/home/u/documents"`. Callers wanting directory semantics should pass a
//! trailing separator. Reconstruction is a pure read with no side effects and
//! is safely retriable.

use crate::catalog::Catalog;
use crate::error::Result;
use crate::types::TreeSnapshot;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::debug;

/// Read-only view over the catalog answering "what existed when?"
#[derive(Debug, Clone)]
pub struct Reconstructor {
    catalog: Arc<Catalog>,
}

impl Reconstructor {
    /// Create a reconstructor over a shared catalog handle
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self { catalog }
    }

    /// Reconstruct the listing of `directory` as of `as_of`
    ///
    /// Each entry is the single latest qualifying version per path (highest
    /// version number among rows with timestamp at or before `as_of`);
    /// entries are sorted by path.
    pub fn reconstruct(&self, directory: &str, as_of: DateTime<Utc>) -> Result<TreeSnapshot> {
        let files = self.catalog.tree_at(directory, as_of)?;
        debug!(
            "reconstructed {} as of {}: {} files",
            directory,
            as_of,
            files.len()
        );
        Ok(TreeSnapshot {
            directory: directory.to_string(),
            as_of,
            file_count: files.len(),
            files,
        })
    }
}
