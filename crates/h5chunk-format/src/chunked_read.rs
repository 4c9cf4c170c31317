//! Chunked dataset reads: per-chunk materialization and region assembly.

use std::sync::Arc;

use crate::btree_v1::BTreeChunkIndex;
use crate::chunk_index::{ChunkDescriptor, ChunkIndex, ChunkList, IndexCell};
use crate::config::ReaderConfig;
use crate::dataspace::{row_major_strides, ChunkShape, Dataspace, Hyperslab};
use crate::datatype::Datatype;
use crate::decode::{self, element_count, DecodedValue};
use crate::error::{DatasetError, DatasetId, FormatError};
use crate::filter_pipeline::FilterPipeline;
use crate::io::ByteSource;

/// Address value marking "no chunk index allocated".
pub const UNDEFINED_ADDRESS: u64 = u64::MAX;

/// A chunked dataset described by its metadata, read through a
/// [`ByteSource`].
///
/// The chunk index is read on first use and kept for the lifetime of the
/// dataset, so every call must pass the same source.
#[derive(Debug)]
pub struct ChunkedDataset {
    id: DatasetId,
    datatype: Arc<Datatype>,
    dataspace: Dataspace,
    chunk_shape: ChunkShape,
    pipeline: Arc<FilterPipeline>,
    index_address: u64,
    config: ReaderConfig,
    index: IndexCell,
}

impl ChunkedDataset {
    /// Describe a dataset whose chunk B-tree is rooted at `index_address`.
    ///
    /// Fails when the chunk rank differs from the dataspace rank or the
    /// configuration is unusable.
    pub fn new(
        id: DatasetId,
        datatype: Datatype,
        dataspace: Dataspace,
        chunk_shape: ChunkShape,
        pipeline: FilterPipeline,
        index_address: u64,
        config: ReaderConfig,
    ) -> Result<Self, DatasetError> {
        if chunk_shape.rank() != dataspace.rank() {
            return Err(DatasetError::new(
                &id,
                FormatError::RankMismatch {
                    expected: dataspace.rank(),
                    actual: chunk_shape.rank(),
                },
            ));
        }
        config.validate().map_err(|e| DatasetError::new(&id, e))?;
        Ok(Self {
            id,
            datatype: Arc::new(datatype),
            dataspace,
            chunk_shape,
            pipeline: Arc::new(pipeline),
            index_address,
            config,
            index: IndexCell::new(),
        })
    }

    /// Name used in error context and logs.
    pub fn id(&self) -> &DatasetId {
        &self.id
    }

    /// Element type every chunk decodes with.
    pub fn datatype(&self) -> &Datatype {
        &self.datatype
    }

    /// Dataset extent.
    pub fn dataspace(&self) -> &Dataspace {
        &self.dataspace
    }

    /// Extent of one chunk, the same for every chunk.
    pub fn chunk_shape(&self) -> &ChunkShape {
        &self.chunk_shape
    }

    /// Filters reversed on each chunk read.
    pub fn pipeline(&self) -> &FilterPipeline {
        &self.pipeline
    }

    /// Limits and checksum policy for this dataset.
    pub fn config(&self) -> &ReaderConfig {
        &self.config
    }

    /// All stored chunks, read from the B-tree on first call.
    ///
    /// Concurrent first callers share one traversal. A corrupt tree keeps
    /// failing; an I/O failure is retried on the next call.
    pub fn chunk_index<S: ByteSource + ?Sized>(&self, source: &S) -> Result<Arc<ChunkList>, DatasetError> {
        self.index
            .get_or_build(|| self.build_index(source))
            .map_err(|e| DatasetError::at(&self.id, self.index_address, e))
    }

    fn build_index<S: ByteSource + ?Sized>(&self, source: &S) -> Result<ChunkList, FormatError> {
        if self.index_address == UNDEFINED_ADDRESS {
            tracing::debug!(dataset = %self.id, "no chunks allocated");
            return ChunkList::new(self.chunk_shape.clone(), Vec::new());
        }
        tracing::debug!(
            dataset = %self.id,
            root = self.index_address,
            "building chunk index"
        );
        let tree = BTreeChunkIndex::new(
            source,
            self.index_address,
            self.chunk_shape.clone(),
            self.config.clone(),
        );
        let list = ChunkList::collect(&tree, self.chunk_shape.clone(), &self.dataspace)?;
        tracing::debug!(dataset = %self.id, chunks = list.len(), "chunk index built");
        Ok(list)
    }

    /// Bytes of one element.
    fn element_size(&self) -> usize {
        self.datatype.element_size()
    }

    /// Decoded byte length of a full chunk.
    fn chunk_byte_len(&self) -> Result<usize, FormatError> {
        element_count(self.chunk_shape.dims())?
            .checked_mul(self.element_size())
            .ok_or_else(|| FormatError::InvalidSelection("chunk byte size overflows".into()))
    }

    /// Fetch a chunk and reverse its filters.
    pub fn read_chunk_bytes<S: ByteSource + ?Sized>(
        &self,
        source: &S,
        chunk: &ChunkDescriptor,
    ) -> Result<Vec<u8>, DatasetError> {
        self.chunk_bytes(source, chunk)
            .map_err(|e| DatasetError::at(&self.id, chunk.address, e))
    }

    fn chunk_bytes<S: ByteSource + ?Sized>(&self, source: &S, chunk: &ChunkDescriptor) -> Result<Vec<u8>, FormatError> {
        tracing::debug!(
            dataset = %self.id,
            address = chunk.address,
            stored = chunk.stored_size,
            coordinate = ?chunk.coordinate,
            "reading chunk"
        );
        let stored = usize::try_from(chunk.stored_size).map_err(|_| {
            FormatError::corrupt(chunk.address, format!("stored size {} too large", chunk.stored_size))
        })?;
        let raw = source
            .read_at(chunk.address, stored)
            .map_err(|e| FormatError::io(chunk.address, stored, e))?;

        let expected = self.chunk_byte_len()?;
        let bytes = self.pipeline.decode_sized(
            &raw,
            chunk.filter_mask,
            self.element_size(),
            expected,
            &self.config,
        )?;
        if bytes.len() != expected {
            return Err(FormatError::DataSizeMismatch {
                expected,
                actual: bytes.len(),
            });
        }
        Ok(bytes)
    }

    /// Decode one chunk with the chunk shape.
    pub fn read_chunk<S: ByteSource + ?Sized>(
        &self,
        source: &S,
        chunk: &ChunkDescriptor,
    ) -> Result<DecodedValue, DatasetError> {
        let bytes = self.read_chunk_bytes(source, chunk)?;
        decode::decode(&bytes, &self.datatype, self.chunk_shape.dims())
            .map_err(|e| DatasetError::at(&self.id, chunk.address, e))
    }

    /// Decode `region`, assembled from every chunk it touches.
    ///
    /// Positions not covered by a stored chunk read as zero bytes.
    pub fn read_region<S: ByteSource + ?Sized>(
        &self,
        source: &S,
        region: &Hyperslab,
    ) -> Result<DecodedValue, DatasetError> {
        region
            .validate(&self.dataspace)
            .map_err(|e| DatasetError::new(&self.id, e))?;
        let bytes = self.region_bytes(source, region)?;
        decode::decode(&bytes, &self.datatype, &region.count).map_err(|e| DatasetError::new(&self.id, e))
    }

    /// Decode the whole dataset.
    pub fn read_all<S: ByteSource + ?Sized>(&self, source: &S) -> Result<DecodedValue, DatasetError> {
        self.read_region(source, &Hyperslab::all(&self.dataspace))
    }

    fn region_bytes<S: ByteSource + ?Sized>(
        &self,
        source: &S,
        region: &Hyperslab,
    ) -> Result<Vec<u8>, DatasetError> {
        let elem = self.element_size();
        let len = element_count(&region.count)
            .ok()
            .and_then(|n| n.checked_mul(elem))
            .ok_or_else(|| {
                DatasetError::new(
                    &self.id,
                    FormatError::InvalidSelection(format!("region {:?} is too large", region.count)),
                )
            })?;
        let mut out = vec![0u8; len];
        if region.is_empty() {
            return Ok(out);
        }

        let index = self.chunk_index(source)?;
        for chunk in index.chunks_overlapping(region) {
            let chunk = chunk.map_err(|e| DatasetError::new(&self.id, e))?;
            let bytes = self.read_chunk_bytes(source, &chunk)?;
            copy_overlap(
                &bytes,
                &chunk.coordinate,
                self.chunk_shape.dims(),
                region,
                &mut out,
                elem,
            );
        }
        Ok(out)
    }
}

/// Copy the part of a decoded chunk that falls inside `region` into the
/// region buffer `out`, one contiguous innermost-dimension run at a time.
fn copy_overlap(
    chunk: &[u8],
    origin: &[u64],
    chunk_dims: &[u64],
    region: &Hyperslab,
    out: &mut [u8],
    elem: usize,
) {
    let rank = origin.len();
    if rank == 0 {
        out[..elem].copy_from_slice(&chunk[..elem]);
        return;
    }

    let lo: Vec<u64> = (0..rank).map(|d| region.start[d].max(origin[d])).collect();
    let hi: Vec<u64> = (0..rank)
        .map(|d| (region.start[d] + region.count[d]).min(origin[d] + chunk_dims[d]))
        .collect();
    if lo.iter().zip(&hi).any(|(l, h)| l >= h) {
        return;
    }

    let chunk_strides = row_major_strides(chunk_dims);
    let out_strides = row_major_strides(&region.count);
    let run = (hi[rank - 1] - lo[rank - 1]) as usize * elem;

    let mut pos = lo.clone();
    loop {
        let mut src = 0u64;
        let mut dst = 0u64;
        for d in 0..rank {
            src += (pos[d] - origin[d]) * chunk_strides[d];
            dst += (pos[d] - region.start[d]) * out_strides[d];
        }
        let (src, dst) = (src as usize * elem, dst as usize * elem);
        out[dst..dst + run].copy_from_slice(&chunk[src..src + run]);

        // advance every dimension but the innermost, odometer style
        let mut d = rank - 1;
        loop {
            if d == 0 {
                return;
            }
            d -= 1;
            pos[d] += 1;
            if pos[d] < hi[d] {
                break;
            }
            pos[d] = lo[d];
        }
    }
}
