//! Dataset shapes, chunk shapes and rectangular selections.

use crate::error::FormatError;

/// Extents of a dataset, outer to inner (row-major). Empty means scalar.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Dataspace {
    /// Current dimension sizes.
    pub dimensions: Vec<u64>,
}

impl Dataspace {
    /// A simple dataspace with the given extents.
    pub fn new(dimensions: impl Into<Vec<u64>>) -> Self {
        Self {
            dimensions: dimensions.into(),
        }
    }

    /// A scalar (rank-0) dataspace.
    pub fn scalar() -> Self {
        Self::default()
    }

    /// Number of dimensions.
    pub fn rank(&self) -> usize {
        self.dimensions.len()
    }

    /// Whether this is the rank-0 dataspace.
    pub fn is_scalar(&self) -> bool {
        self.dimensions.is_empty()
    }

    /// Total number of elements (1 for a scalar).
    pub fn num_elements(&self) -> u64 {
        self.dimensions.iter().product()
    }
}

/// Fixed extent of every chunk of a dataset. Every component is positive.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChunkShape(Vec<u64>);

impl ChunkShape {
    /// Build a chunk shape, rejecting zero extents.
    pub fn new(dims: impl Into<Vec<u64>>) -> Result<Self, FormatError> {
        let dims = dims.into();
        if dims.iter().any(|&d| d == 0) {
            return Err(FormatError::InvalidChunkShape(dims));
        }
        Ok(Self(dims))
    }

    /// Build a chunk shape from the layout message's dimensions, which carry
    /// the element size as a trailing extra dimension.
    pub fn from_layout_dims(dims: &[u32]) -> Result<Self, FormatError> {
        match dims.split_last() {
            Some((_, spatial)) => Self::new(spatial.iter().map(|&d| d as u64).collect::<Vec<_>>()),
            None => Err(FormatError::InvalidChunkShape(Vec::new())),
        }
    }

    /// Per-dimension extents.
    pub fn dims(&self) -> &[u64] {
        &self.0
    }

    /// Number of dimensions.
    pub fn rank(&self) -> usize {
        self.0.len()
    }

    /// Elements in one chunk.
    pub fn num_elements(&self) -> u64 {
        self.0.iter().product()
    }
}

/// A rectangular region: `count[d]` elements starting at `start[d]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Hyperslab {
    /// First selected coordinate per dimension.
    pub start: Vec<u64>,
    /// Number of selected elements per dimension.
    pub count: Vec<u64>,
}

impl Hyperslab {
    /// A region from explicit corners.
    pub fn new(start: impl Into<Vec<u64>>, count: impl Into<Vec<u64>>) -> Self {
        Self {
            start: start.into(),
            count: count.into(),
        }
    }

    /// The whole of `space`.
    pub fn all(space: &Dataspace) -> Self {
        Self {
            start: vec![0; space.rank()],
            count: space.dimensions.clone(),
        }
    }

    /// Number of dimensions.
    pub fn rank(&self) -> usize {
        self.count.len()
    }

    /// Whether the region selects nothing.
    pub fn is_empty(&self) -> bool {
        self.count.iter().any(|&c| c == 0)
    }

    /// Number of selected elements.
    pub fn num_elements(&self) -> u64 {
        self.count.iter().product()
    }

    /// Check that the region lies inside `space`.
    pub fn validate(&self, space: &Dataspace) -> Result<(), FormatError> {
        if self.start.len() != self.count.len() || self.rank() != space.rank() {
            return Err(FormatError::RankMismatch {
                expected: space.rank(),
                actual: self.start.len().max(self.count.len()),
            });
        }
        for (d, ((&s, &c), &extent)) in self
            .start
            .iter()
            .zip(&self.count)
            .zip(&space.dimensions)
            .enumerate()
        {
            match s.checked_add(c) {
                Some(end) if end <= extent => {}
                _ => {
                    return Err(FormatError::InvalidSelection(format!(
                        "dimension {d}: {s}+{c} exceeds extent {extent}"
                    )))
                }
            }
        }
        Ok(())
    }

    /// Whether the chunk starting at `origin` with extent `shape` intersects
    /// this region.
    pub fn overlaps_chunk(&self, origin: &[u64], shape: &[u64]) -> bool {
        if self.is_empty() {
            return false;
        }
        self.start
            .iter()
            .zip(&self.count)
            .zip(origin.iter().zip(shape))
            .all(|((&s, &c), (&o, &e))| o < s + c && s < o.saturating_add(e))
    }

    /// Chunk-aligned origins of the first and last chunks touched, i.e. the
    /// lexicographic bounds of every overlapping chunk coordinate.
    pub fn chunk_bounds(&self, shape: &ChunkShape) -> Option<(Vec<u64>, Vec<u64>)> {
        if self.is_empty() {
            return None;
        }
        let first = self
            .start
            .iter()
            .zip(shape.dims())
            .map(|(&s, &e)| s / e * e)
            .collect();
        let last = self
            .start
            .iter()
            .zip(&self.count)
            .zip(shape.dims())
            .map(|((&s, &c), &e)| (s + c - 1) / e * e)
            .collect();
        Some((first, last))
    }
}

/// Row-major strides (in elements) for `dims`.
pub(crate) fn row_major_strides(dims: &[u64]) -> Vec<u64> {
    let mut strides = vec![1u64; dims.len()];
    for i in (0..dims.len().saturating_sub(1)).rev() {
        strides[i] = strides[i + 1] * dims[i + 1];
    }
    strides
}
