//! # Rewind - infinite undo for your files
//!
//! A versioned, content-addressed file store: every observed state of a
//! tracked file is durably recorded, identical content is deduplicated, any
//! prior state can be restored without losing the current one, and a whole
//! directory tree can be reconstructed as of an arbitrary past instant.
//!
//! Rewind is the history core of a larger system: a desktop watcher observes
//! file events and calls [`Rewind::record_version`]; search, prediction, and
//! command layers query the same catalog. This crate deliberately contains
//! no watcher, no transport, and no indexing - just the store.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rewind::{Operation, Rewind, VersionSelector};
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Rewind::open(PathBuf::from("./.rewind"))?;
//!
//! // Record observed states as the watcher reports them
//! store.record_version("/home/u/notes.md", Operation::Create, None);
//! store.record_version("/home/u/notes.md", Operation::Modify, None);
//!
//! // One version back - undo, not reload
//! let report = store.restore("/home/u/notes.md", VersionSelector::Previous)?;
//! println!("{}", report.message());
//!
//! // What did the directory look like an hour ago?
//! let snapshot = store.time_travel(
//!     "/home/u/",
//!     chrono::Utc::now() - chrono::Duration::hours(1),
//! )?;
//! println!("{} files", snapshot.file_count);
//! # Ok(())
//! # }
//! ```
//!
//! ## Key Concepts
//!
//! ### Versions
//!
//! A version is one recorded state of a file: a per-path 1-based number, the
//! operation that produced it, a content digest, a size, and a timestamp.
//! For a fixed path, numbers increase strictly with no gaps, and a plain
//! re-save of unchanged content never creates a new version.
//!
//! ### Content addressing
//!
//! File bytes are stored once per distinct SHA-256 digest, sharded by the
//! digest's first two hex characters. Two paths with identical content share
//! one blob; blob writes are idempotent, so concurrent recorders need no
//! locking.
//!
//! ### Safety-first restore
//!
//! Before a restore touches the live file, the state being overwritten is
//! recorded as a `pre_restore` version, making every restore itself
//! undoable. A failure after that snapshot reports the snapshot's version
//! number so nothing is ever lost.
//!
//! ### Retention
//!
//! A sweep deletes versions older than a retention window, always keeping
//! each path's most recent versions; a separate garbage-collection pass
//! reclaims blobs that no surviving version references.
//!
//! ## Module Organization
//!
//! - [`rewind`](crate::rewind): the [`Rewind`] store facade and builder
//! - [`recorder`]: turning observed file events into versions
//! - [`restore`]: selector resolution and safety-first restore
//! - [`timetravel`]: directory reconstruction as of a past instant
//! - [`retention`]: retention sweep and orphaned-blob GC
//! - [`catalog`]: the SQLite version catalog
//! - [`content_store`]: the sharded content-addressed blob store
//! - [`compression`]: transparent blob compression
//! - [`types`]: common types and data structures
//! - [`error`]: error types and handling

pub mod catalog;
pub mod compression;
pub mod content_store;
pub mod error;
pub mod recorder;
pub mod restore;
pub mod retention;
pub mod rewind;
pub mod timetravel;
pub mod types;

// Re-export main types for convenience
pub use catalog::{Catalog, NewVersion};
pub use compression::{CompressionEngine, CompressionStrategy};
pub use content_store::ContentStore;
pub use error::{Result, RewindError};
pub use recorder::{RecordedVersion, Recorder};
pub use restore::RestoreEngine;
pub use retention::RetentionSweeper;
pub use rewind::{Rewind, RewindBuilder};
pub use timetravel::Reconstructor;
pub use types::*;
