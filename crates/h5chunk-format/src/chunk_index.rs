//! The chunk index contract, an in-memory index, and the per-dataset memo.

use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::dataspace::{ChunkShape, Dataspace, Hyperslab};
use crate::error::FormatError;

/// Location and filtering state of one stored chunk.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChunkDescriptor {
    /// Element offset of the chunk's first element in each dimension.
    pub coordinate: Vec<u64>,
    /// File address of the stored bytes.
    pub address: u64,
    /// Number of stored (filtered) bytes.
    pub stored_size: u64,
    /// Bit `i` set means filter `i` was not applied to this chunk.
    pub filter_mask: u32,
}

/// Lazily produced chunk descriptors.
pub type ChunkIter<'a> = Box<dyn Iterator<Item = Result<ChunkDescriptor, FormatError>> + 'a>;

/// Maps regions of a dataset to the stored chunks covering them.
///
/// Descriptors come out in ascending coordinate order. The first error ends
/// the sequence.
pub trait ChunkIndex {
    /// Chunks that intersect `region`.
    fn chunks_overlapping(&self, region: &Hyperslab) -> ChunkIter<'_>;
}

impl<T: ChunkIndex + ?Sized> ChunkIndex for &T {
    fn chunks_overlapping(&self, region: &Hyperslab) -> ChunkIter<'_> {
        (**self).chunks_overlapping(region)
    }
}

impl<T: ChunkIndex + ?Sized> ChunkIndex for Arc<T> {
    fn chunks_overlapping(&self, region: &Hyperslab) -> ChunkIter<'_> {
        (**self).chunks_overlapping(region)
    }
}

/// A fully materialized chunk index, sorted by coordinate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkList {
    chunk_shape: ChunkShape,
    chunks: Vec<ChunkDescriptor>,
}

impl ChunkList {
    /// Build an index from descriptors in any order.
    ///
    /// Every coordinate must have the chunk rank and be a multiple of the
    /// chunk shape.
    pub fn new(chunk_shape: ChunkShape, mut chunks: Vec<ChunkDescriptor>) -> Result<Self, FormatError> {
        for chunk in &chunks {
            if chunk.coordinate.len() != chunk_shape.rank() {
                return Err(FormatError::corrupt(
                    chunk.address,
                    format!(
                        "chunk key has rank {}, dataset chunks have rank {}",
                        chunk.coordinate.len(),
                        chunk_shape.rank()
                    ),
                ));
            }
            if let Some(d) = misaligned_dimension(&chunk.coordinate, &chunk_shape) {
                return Err(FormatError::corrupt(
                    chunk.address,
                    format!(
                        "chunk coordinate {:?} is not a multiple of the chunk shape in dimension {d}",
                        chunk.coordinate
                    ),
                ));
            }
        }
        chunks.sort_by(|a, b| a.coordinate.cmp(&b.coordinate));
        Ok(Self { chunk_shape, chunks })
    }

    /// Drain `index` over the whole of `space`.
    pub fn collect<I: ChunkIndex + ?Sized>(
        index: &I,
        chunk_shape: ChunkShape,
        space: &Dataspace,
    ) -> Result<Self, FormatError> {
        let chunks = index
            .chunks_overlapping(&Hyperslab::all(space))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(chunk_shape, chunks)
    }

    /// Shape of every chunk.
    pub fn chunk_shape(&self) -> &ChunkShape {
        &self.chunk_shape
    }

    /// Number of stored chunks.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Whether no chunk is allocated.
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// All descriptors in coordinate order.
    pub fn iter(&self) -> std::slice::Iter<'_, ChunkDescriptor> {
        self.chunks.iter()
    }

    /// The chunk starting exactly at `coordinate`.
    pub fn get(&self, coordinate: &[u64]) -> Option<&ChunkDescriptor> {
        self.chunks
            .binary_search_by(|c| c.coordinate.as_slice().cmp(coordinate))
            .ok()
            .map(|i| &self.chunks[i])
    }
}

impl ChunkIndex for ChunkList {
    fn chunks_overlapping(&self, region: &Hyperslab) -> ChunkIter<'_> {
        let region = region.clone();
        let shape = self.chunk_shape.dims();
        Box::new(
            self.chunks
                .iter()
                .filter(move |c| region.overlaps_chunk(&c.coordinate, shape))
                .cloned()
                .map(Ok),
        )
    }
}

impl<'a> IntoIterator for &'a ChunkList {
    type Item = &'a ChunkDescriptor;
    type IntoIter = std::slice::Iter<'a, ChunkDescriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.chunks.iter()
    }
}

/// First dimension in which `coordinate` is not chunk aligned.
pub(crate) fn misaligned_dimension(coordinate: &[u64], shape: &ChunkShape) -> Option<usize> {
    coordinate
        .iter()
        .zip(shape.dims())
        .position(|(&c, &e)| c % e != 0)
}

/// Build-once slot for a dataset's chunk index.
///
/// Concurrent first callers block while one of them builds. A corrupt index
/// is remembered; any other failure leaves the slot empty so the next caller
/// builds again.
#[derive(Debug, Default)]
pub struct IndexCell {
    cell: OnceCell<Result<Arc<ChunkList>, FormatError>>,
}

impl IndexCell {
    /// An empty slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// The published outcome, if any.
    pub fn get(&self) -> Option<Result<Arc<ChunkList>, FormatError>> {
        self.cell.get().cloned()
    }

    /// Return the published index, running `build` if nothing is published.
    pub fn get_or_build<F>(&self, build: F) -> Result<Arc<ChunkList>, FormatError>
    where
        F: FnOnce() -> Result<ChunkList, FormatError>,
    {
        self.cell
            .get_or_try_init(|| match build() {
                Ok(list) => Ok(Ok(Arc::new(list))),
                Err(e) if e.is_corruption() => Ok(Err(e)),
                Err(e) => Err(e),
            })?
            .clone()
    }
}
