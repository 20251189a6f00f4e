//! Content-addressed blob storage
//!
//! Every observed file state is stored exactly once, keyed by the SHA-256
//! digest of its (uncompressed) bytes. The on-disk layout is sharded by the
//! first two hex characters of the digest to bound directory fan-out:
//!
//! ```text
//! objects/
//! ├── ab/
//! │   └── cdef0123...   # remaining 62 hex chars
//! └── ff/
//!     └── 0011aabb...
//! ```
//!
//! Writes go to a temp file in the destination shard directory and are
//! renamed into place, so a crash mid-write never leaves an addressable
//! partial blob. Concurrent writers racing on the same digest are harmless:
//! digest equality implies byte equality, so whichever rename wins leaves
//! identical content.
//!
//! Blobs are immutable once written. Nothing here tracks references; liveness
//! is decided by the catalog, and unreferenced blobs are removed by the
//! garbage-collection maintenance pass in [`crate::retention`].

use crate::compression::CompressionEngine;
use crate::error::{Result, RewindError};
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, trace};

/// Number of leading hex characters used as the shard directory name
const SHARD_LEN: usize = 2;

/// Sharded, deduplicating blob store
///
/// Thread-safe: all operations take `&self` and may be called concurrently.
/// An in-memory map caches the stored size of known digests so repeated
/// `put`s of hot content skip the filesystem entirely.
pub struct ContentStore {
    /// Directory holding the shard subdirectories
    root: PathBuf,
    /// Engine framing blobs at rest
    compression: CompressionEngine,
    /// digest -> stored (framed) size, filled lazily
    known: DashMap<String, u64>,
}

impl std::fmt::Debug for ContentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentStore")
            .field("root", &self.root)
            .field("known", &self.known.len())
            .finish()
    }
}

/// Compute the SHA-256 digest of content as 64 hex characters
pub fn compute_digest(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    hex::encode(hasher.finalize())
}

impl ContentStore {
    /// Open (creating if needed) a blob store rooted at `root`
    pub fn open(root: PathBuf, compression: CompressionEngine) -> Result<Self> {
        fs::create_dir_all(&root)?;
        debug!("opened content store at {:?}", root);
        Ok(Self {
            root,
            compression,
            known: DashMap::new(),
        })
    }

    /// Store content, returning its digest and stored size
    ///
    /// Idempotent: if a blob with this digest already exists, nothing is
    /// written and the existing digest is returned. `hint` is the logical
    /// path of the content, used only as a compression hint.
    pub fn put(&self, content: &[u8], hint: &Path) -> Result<(String, u64)> {
        let digest = compute_digest(content);

        if let Some(size) = self.stored_size(&digest) {
            trace!("object {} already present", &digest[..8]);
            return Ok((digest, size));
        }

        let framed = self.compression.compress(hint, content);
        let stored_size = framed.len() as u64;
        let dest = self.path_for(&digest);
        let shard_dir = dest.parent().expect("object path always has a shard dir");
        fs::create_dir_all(shard_dir)?;

        let mut tmp = NamedTempFile::new_in(shard_dir)?;
        tmp.write_all(&framed)?;
        match tmp.persist(&dest) {
            Ok(_) => {}
            // A concurrent writer with the same digest may have won the
            // rename; the bytes are identical by construction.
            Err(_) if dest.exists() => trace!("object {} written concurrently", &digest[..8]),
            Err(err) => return Err(err.error.into()),
        }

        self.known.insert(digest.clone(), stored_size);
        trace!("stored object {} ({} bytes)", &digest[..8], stored_size);
        Ok((digest, stored_size))
    }

    /// Load and verify the content stored under `digest`
    ///
    /// The recovered bytes are re-hashed; a mismatch surfaces as
    /// [`RewindError::DigestMismatch`] rather than returning corrupt content.
    pub fn load(&self, digest: &str) -> Result<Vec<u8>> {
        let path = self.path_for(digest);
        let framed = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(RewindError::ObjectNotFound(digest.to_string()));
            }
            Err(err) => return Err(err.into()),
        };

        let content = self.compression.decompress(&framed)?;
        let actual = compute_digest(&content);
        if actual != digest {
            return Err(RewindError::DigestMismatch {
                expected: digest.to_string(),
                actual,
            });
        }

        trace!("loaded object {} ({} bytes)", &digest[..8], content.len());
        Ok(content)
    }

    /// Check whether a blob exists for `digest`
    pub fn contains(&self, digest: &str) -> bool {
        self.stored_size(digest).is_some()
    }

    /// Location of the blob for `digest`
    ///
    /// A pure function of the digest (64 hex characters): no catalog lookup
    /// is ever needed to find where content lives.
    pub fn path_for(&self, digest: &str) -> PathBuf {
        let (shard, rest) = digest.split_at(SHARD_LEN.min(digest.len()));
        self.root.join(shard).join(rest)
    }

    /// Delete the blob for `digest`, returning the bytes freed
    ///
    /// Missing blobs are not an error (delete is used by GC, which may race
    /// a prior run).
    pub fn delete(&self, digest: &str) -> Result<u64> {
        let path = self.path_for(digest);
        let freed = match fs::metadata(&path) {
            Ok(meta) => meta.len(),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(err) => return Err(err.into()),
        };
        fs::remove_file(&path)?;
        self.known.remove(digest);
        debug!("deleted object {}", &digest[..8.min(digest.len())]);
        Ok(freed)
    }

    /// List every digest currently stored
    ///
    /// Stray files that are not well-formed digests (e.g. temp files left by
    /// a crashed writer) are skipped.
    pub fn list_digests(&self) -> Result<Vec<String>> {
        let mut digests = Vec::new();
        for shard_entry in fs::read_dir(&self.root)? {
            let shard_entry = shard_entry?;
            if !shard_entry.path().is_dir() {
                continue;
            }
            let shard = shard_entry.file_name().to_string_lossy().to_string();
            if shard.len() != SHARD_LEN || !is_hex(&shard) {
                continue;
            }
            for object_entry in fs::read_dir(shard_entry.path())? {
                let object_entry = object_entry?;
                if !object_entry.path().is_file() {
                    continue;
                }
                let rest = object_entry.file_name().to_string_lossy().to_string();
                if shard.len() + rest.len() == 64 && is_hex(&rest) {
                    digests.push(format!("{shard}{rest}"));
                }
            }
        }
        Ok(digests)
    }

    /// Count of stored objects and their total on-disk size
    pub fn stats(&self) -> Result<(usize, u64)> {
        let mut count = 0usize;
        let mut bytes = 0u64;
        for digest in self.list_digests()? {
            if let Ok(meta) = fs::metadata(self.path_for(&digest)) {
                count += 1;
                bytes += meta.len();
            }
        }
        Ok((count, bytes))
    }

    fn stored_size(&self, digest: &str) -> Option<u64> {
        if let Some(size) = self.known.get(digest) {
            return Some(*size);
        }
        let meta = fs::metadata(self.path_for(digest)).ok()?;
        let size = meta.len();
        self.known.insert(digest.to_string(), size);
        Some(size)
    }
}

fn is_hex(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_hexdigit())
}
