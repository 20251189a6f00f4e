//! Transparent LZ4 compression for stored blobs
//!
//! Blobs are framed with a 4-byte magic header so compressed and raw content
//! coexist in the same store:
//!
//! - `LZ4R`: LZ4 block data (with prepended size) follows
//! - `\0\0\0\0`: raw data follows
//!
//! Content digests are always computed over the *uncompressed* bytes, so the
//! framing never leaks into content addressing.

use crate::error::{Result, RewindError};
use lz4_flex::{compress_prepend_size, decompress_size_prepended};
use std::path::Path;
use tracing::trace;

/// Magic prefix marking LZ4-compressed blob data
const LZ4_MAGIC: &[u8; 4] = b"LZ4R";
/// Magic prefix marking uncompressed blob data
const RAW_MAGIC: &[u8; 4] = &[0, 0, 0, 0];

/// When and how blobs are compressed at rest
///
/// # Examples
///
/// ```rust
/// use rewind::compression::CompressionStrategy;
///
/// // Default fast compression
/// let fast = CompressionStrategy::Fast;
///
/// // Skip tiny files and already-compressed formats
/// let adaptive = CompressionStrategy::Adaptive {
///     min_size: 4096,
///     skip_extensions: vec!["jpg".to_string(), "zip".to_string()],
/// };
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompressionStrategy {
    /// Never compress
    None,
    /// LZ4 for every blob (default)
    Fast,
    /// LZ4 except for small blobs and named extensions
    Adaptive {
        /// Blobs smaller than this are stored raw
        min_size: usize,
        /// Lowercase extensions stored raw (already-compressed formats)
        skip_extensions: Vec<String>,
    },
}

impl Default for CompressionStrategy {
    fn default() -> Self {
        CompressionStrategy::Fast
    }
}

impl CompressionStrategy {
    /// Adaptive strategy with sensible defaults
    pub fn adaptive_default() -> Self {
        CompressionStrategy::Adaptive {
            min_size: 4096,
            skip_extensions: ["jpg", "jpeg", "png", "gif", "mp3", "mp4", "zip", "gz", "zst"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }

    /// Stable name persisted in store configuration
    pub fn name(&self) -> &'static str {
        match self {
            CompressionStrategy::None => "none",
            CompressionStrategy::Fast => "fast",
            CompressionStrategy::Adaptive { .. } => "adaptive",
        }
    }

    /// Resolve a persisted name back to a strategy
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "none" => Ok(CompressionStrategy::None),
            "fast" => Ok(CompressionStrategy::Fast),
            "adaptive" => Ok(CompressionStrategy::adaptive_default()),
            other => Err(RewindError::InvalidConfiguration(format!(
                "unknown compression strategy: {other}"
            ))),
        }
    }
}

/// Stateless engine applying a [`CompressionStrategy`] to blob bytes
#[derive(Debug, Clone, Default)]
pub struct CompressionEngine {
    strategy: CompressionStrategy,
}

impl CompressionEngine {
    /// Create an engine with the given strategy
    pub fn new(strategy: CompressionStrategy) -> Self {
        Self { strategy }
    }

    /// Frame blob content for storage, compressing if the strategy elects to
    /// and compression actually shrinks the data
    ///
    /// `path` is a hint only (extension check for the adaptive strategy);
    /// it is never stored.
    pub fn compress(&self, path: &Path, content: &[u8]) -> Vec<u8> {
        if self.should_compress(path, content) {
            let compressed = compress_prepend_size(content);
            if compressed.len() + LZ4_MAGIC.len() < content.len() + RAW_MAGIC.len() {
                trace!(
                    "compressed {} -> {} bytes",
                    content.len(),
                    compressed.len()
                );
                let mut framed = Vec::with_capacity(LZ4_MAGIC.len() + compressed.len());
                framed.extend_from_slice(LZ4_MAGIC);
                framed.extend_from_slice(&compressed);
                return framed;
            }
        }
        let mut framed = Vec::with_capacity(RAW_MAGIC.len() + content.len());
        framed.extend_from_slice(RAW_MAGIC);
        framed.extend_from_slice(content);
        framed
    }

    /// Recover the original blob content from framed storage bytes
    pub fn decompress(&self, framed: &[u8]) -> Result<Vec<u8>> {
        if framed.len() < LZ4_MAGIC.len() {
            return Err(RewindError::decompression("blob shorter than frame header"));
        }
        let (magic, body) = framed.split_at(LZ4_MAGIC.len());
        if magic == LZ4_MAGIC {
            decompress_size_prepended(body)
                .map_err(|e| RewindError::decompression(e.to_string()))
        } else if magic == RAW_MAGIC {
            Ok(body.to_vec())
        } else {
            Err(RewindError::decompression("unrecognized frame header"))
        }
    }

    fn should_compress(&self, path: &Path, content: &[u8]) -> bool {
        match &self.strategy {
            CompressionStrategy::None => false,
            CompressionStrategy::Fast => true,
            CompressionStrategy::Adaptive {
                min_size,
                skip_extensions,
            } => {
                if content.len() < *min_size {
                    return false;
                }
                let ext = path
                    .extension()
                    .and_then(|e| e.to_str())
                    .map(|e| e.to_lowercase());
                !matches!(ext, Some(e) if skip_extensions.contains(&e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_round_trip_fast() {
        let engine = CompressionEngine::new(CompressionStrategy::Fast);
        let content = b"hello hello hello hello hello hello hello".repeat(20);
        let framed = engine.compress(&PathBuf::from("a.txt"), &content);
        assert!(framed.starts_with(LZ4_MAGIC));
        assert!(framed.len() < content.len());
        assert_eq!(engine.decompress(&framed).unwrap(), content);
    }

    #[test]
    fn test_round_trip_none() {
        let engine = CompressionEngine::new(CompressionStrategy::None);
        let content = b"incompressible-ish".to_vec();
        let framed = engine.compress(&PathBuf::from("a.txt"), &content);
        assert!(framed.starts_with(RAW_MAGIC));
        assert_eq!(engine.decompress(&framed).unwrap(), content);
    }

    #[test]
    fn test_incompressible_stored_raw() {
        // Data that LZ4 cannot shrink falls back to the raw frame even
        // under the Fast strategy.
        let engine = CompressionEngine::new(CompressionStrategy::Fast);
        let content: Vec<u8> = (0u32..64)
            .map(|i| (i.wrapping_mul(2654435761) >> 24) as u8)
            .collect();
        let framed = engine.compress(&PathBuf::from("a.bin"), &content);
        assert_eq!(engine.decompress(&framed).unwrap(), content);
    }

    #[test]
    fn test_adaptive_skips_small_and_listed_extensions() {
        let engine = CompressionEngine::new(CompressionStrategy::Adaptive {
            min_size: 1024,
            skip_extensions: vec!["jpg".to_string()],
        });
        let small = b"tiny".to_vec();
        assert!(engine
            .compress(&PathBuf::from("a.txt"), &small)
            .starts_with(RAW_MAGIC));

        let big = b"abc".repeat(2000);
        assert!(engine
            .compress(&PathBuf::from("photo.JPG"), &big)
            .starts_with(RAW_MAGIC));
        assert!(engine
            .compress(&PathBuf::from("notes.txt"), &big)
            .starts_with(LZ4_MAGIC));
    }

    #[test]
    fn test_decompress_rejects_garbage() {
        let engine = CompressionEngine::default();
        assert!(engine.decompress(b"xy").is_err());
        assert!(engine.decompress(b"ABCDef").is_err());
    }

    #[test]
    fn test_empty_content() {
        let engine = CompressionEngine::new(CompressionStrategy::Fast);
        let framed = engine.compress(&PathBuf::from("empty"), b"");
        assert_eq!(engine.decompress(&framed).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_strategy_names() {
        assert_eq!(
            CompressionStrategy::from_name("fast").unwrap(),
            CompressionStrategy::Fast
        );
        assert_eq!(CompressionStrategy::adaptive_default().name(), "adaptive");
        assert!(CompressionStrategy::from_name("brotli").is_err());
    }
}
