//! Error types for chunked dataset materialization.

use std::fmt;
use std::io;
use std::sync::Arc;

use thiserror::Error;

/// Errors raised while traversing chunk indices, reversing filters, or
/// decoding element bytes.
#[derive(Debug, Clone, Error)]
pub enum FormatError {
    /// The byte source could not satisfy a read.
    #[error("I/O error reading {len} bytes at offset {offset:#x}: {source}")]
    Io {
        /// File offset of the failed read.
        offset: u64,
        /// Requested length.
        len: usize,
        /// Underlying error, shared so the error stays cloneable.
        #[source]
        source: Arc<io::Error>,
    },
    /// The chunk index is structurally broken.
    #[error("chunk index corrupt at offset {offset:#x}: {reason}")]
    IndexCorruption {
        /// Address of the offending node.
        offset: u64,
        /// What was wrong with it.
        reason: String,
    },
    /// A filter that is not skipped for this chunk has no decoder.
    #[error("unsupported filter id {filter_id}")]
    UnsupportedFilter {
        /// Filter identification value.
        filter_id: u16,
    },
    /// A filter's decoder rejected its input.
    #[error("filter {filter_id} failed: {reason}")]
    FilterFailed {
        /// Filter identification value.
        filter_id: u16,
        /// Backend description of the failure.
        reason: String,
    },
    /// Fletcher32 checksum did not match the chunk payload.
    #[error("checksum mismatch: stored {expected:#010x}, computed {computed:#010x}")]
    ChecksumMismatch {
        /// The checksum stored with the chunk.
        expected: u32,
        /// The checksum computed over the payload.
        computed: u32,
    },
    /// The datatype has no host mapping.
    #[error("unsupported datatype: {datatype}")]
    UnsupportedType {
        /// Description of the rejected type.
        datatype: String,
    },
    /// Buffer length does not match element count times element size.
    #[error("data size mismatch: expected {expected} bytes, got {actual}")]
    DataSizeMismatch {
        /// Number of bytes required.
        expected: usize,
        /// Number of bytes present.
        actual: usize,
    },
    /// A metadata message ended early.
    #[error("unexpected EOF: need {expected} bytes, have {available}")]
    UnexpectedEof {
        /// Number of bytes expected.
        expected: usize,
        /// Number of bytes actually available.
        available: usize,
    },
    /// Filter pipeline message version is not 1 or 2.
    #[error("invalid filter pipeline version: {0}")]
    InvalidFilterPipelineVersion(u8),
    /// Datatype message version is not 1-4.
    #[error("invalid datatype version: {0}")]
    InvalidDatatypeVersion(u8),
    /// A chunk dimension is zero.
    #[error("invalid chunk shape {0:?}: every dimension must be positive")]
    InvalidChunkShape(Vec<u64>),
    /// A requested region does not fit the dataspace.
    #[error("invalid selection: {0}")]
    InvalidSelection(String),
    /// Two shapes that must agree in rank do not.
    #[error("rank mismatch: expected {expected}, got {actual}")]
    RankMismatch {
        /// Rank required.
        expected: usize,
        /// Rank supplied.
        actual: usize,
    },
    /// Offset size must be 2, 4, or 8.
    #[error("invalid offset size: {0} (must be 2, 4, or 8)")]
    InvalidOffsetSize(u8),
}

impl FormatError {
    pub(crate) fn io(offset: u64, len: usize, source: io::Error) -> Self {
        FormatError::Io {
            offset,
            len,
            source: Arc::new(source),
        }
    }

    pub(crate) fn corrupt(offset: u64, reason: impl Into<String>) -> Self {
        FormatError::IndexCorruption {
            offset,
            reason: reason.into(),
        }
    }

    /// File offset implicated by this error, when one is known.
    pub fn offset(&self) -> Option<u64> {
        match self {
            FormatError::Io { offset, .. } | FormatError::IndexCorruption { offset, .. } => {
                Some(*offset)
            }
            _ => None,
        }
    }

    /// Whether this error describes the file's structure rather than a
    /// transient read failure. Structural failures are safe to cache.
    pub fn is_corruption(&self) -> bool {
        matches!(self, FormatError::IndexCorruption { .. })
    }
}

/// Identifies the dataset an error belongs to, usually its path in the file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DatasetId(Arc<str>);

impl DatasetId {
    /// Create an identifier from a path or name.
    pub fn new(name: impl AsRef<str>) -> Self {
        DatasetId(Arc::from(name.as_ref()))
    }

    /// The identifier text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DatasetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DatasetId {
    fn from(s: &str) -> Self {
        DatasetId::new(s)
    }
}

/// A [`FormatError`] attributed to one dataset and, where known, a file offset.
///
/// Failures are scoped to the dataset that produced them, so a caller can keep
/// reading other datasets of the same file.
#[derive(Debug, Clone, Error)]
pub struct DatasetError {
    /// Dataset being read.
    pub dataset: DatasetId,
    /// Offending file offset (node or chunk address).
    pub offset: Option<u64>,
    /// Underlying failure.
    #[source]
    pub source: FormatError,
}

impl DatasetError {
    /// Attribute `source` to `dataset`, taking the offset from the error itself.
    pub fn new(dataset: &DatasetId, source: FormatError) -> Self {
        DatasetError {
            dataset: dataset.clone(),
            offset: source.offset(),
            source,
        }
    }

    /// Attribute `source` to `dataset` at `offset` unless the error already
    /// names a more precise one.
    pub fn at(dataset: &DatasetId, offset: u64, source: FormatError) -> Self {
        DatasetError {
            dataset: dataset.clone(),
            offset: source.offset().or(Some(offset)),
            source,
        }
    }
}

impl fmt::Display for DatasetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.offset {
            Some(offset) => write!(
                f,
                "dataset {} (offset {offset:#x}): {}",
                self.dataset, self.source
            ),
            None => write!(f, "dataset {}: {}", self.dataset, self.source),
        }
    }
}
