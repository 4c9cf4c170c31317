//! Reader configuration.
//!
//! [`ReaderConfig`] bundles the file-level parameters the chunk index needs
//! (normally taken from the superblock) together with the safety limits
//! applied while traversing untrusted input.

use crate::error::FormatError;

/// Default maximum depth of a chunk B-tree.
///
/// Real files rarely exceed a handful of levels; the node level byte caps the
/// format at 255.
pub const DEFAULT_MAX_TREE_DEPTH: usize = 64;

/// Configuration shared by every dataset read through one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReaderConfig {
    /// Size in bytes of file addresses (superblock "size of offsets").
    pub offset_size: u8,
    /// Maximum number of tree levels followed before the index is declared
    /// corrupt.
    pub max_tree_depth: usize,
    /// Chunk B-tree rank `K` from the superblock. When known, nodes with more
    /// than `2K` entries are rejected.
    pub btree_k: Option<u16>,
    /// Verify Fletcher32 checksums. When disabled the checksum bytes are still
    /// stripped.
    pub verify_checksums: bool,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            offset_size: 8,
            max_tree_depth: DEFAULT_MAX_TREE_DEPTH,
            btree_k: None,
            verify_checksums: true,
        }
    }
}

impl ReaderConfig {
    /// Create the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the address width.
    pub fn offset_size(mut self, size: u8) -> Self {
        self.offset_size = size;
        self
    }

    /// Set the maximum traversal depth.
    pub fn max_tree_depth(mut self, depth: usize) -> Self {
        self.max_tree_depth = depth;
        self
    }

    /// Set the chunk B-tree rank `K`.
    pub fn btree_k(mut self, k: u16) -> Self {
        self.btree_k = Some(k);
        self
    }

    /// Enable or disable checksum verification.
    pub fn verify_checksums(mut self, verify: bool) -> Self {
        self.verify_checksums = verify;
        self
    }

    /// Maximum entries a node may hold, if `K` is known.
    pub fn max_node_entries(&self) -> Option<usize> {
        self.btree_k.map(|k| 2 * k as usize)
    }

    /// Check that the configuration describes a readable file.
    pub fn validate(&self) -> Result<(), FormatError> {
        match self.offset_size {
            2 | 4 | 8 => Ok(()),
            other => Err(FormatError::InvalidOffsetSize(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = ReaderConfig::default();
        assert_eq!(cfg.offset_size, 8);
        assert_eq!(cfg.max_tree_depth, DEFAULT_MAX_TREE_DEPTH);
        assert_eq!(cfg.max_node_entries(), None);
        assert!(cfg.verify_checksums);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn builder_chain() {
        let cfg = ReaderConfig::new()
            .offset_size(4)
            .max_tree_depth(8)
            .btree_k(32)
            .verify_checksums(false);
        assert_eq!(cfg.offset_size, 4);
        assert_eq!(cfg.max_tree_depth, 8);
        assert_eq!(cfg.max_node_entries(), Some(64));
        assert!(!cfg.verify_checksums);
    }

    #[test]
    fn rejects_odd_offset_size() {
        let err = ReaderConfig::new().offset_size(3).validate().unwrap_err();
        assert!(matches!(err, FormatError::InvalidOffsetSize(3)));
    }
}
