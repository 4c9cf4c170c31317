//! Builders for synthetic chunked datasets.
//!
//! Chunks are filtered forward the way a writer would (shuffle, deflate,
//! fletcher32 in pipeline order) and indexed by a version 1 B-tree with
//! 8-byte offsets.

#![allow(dead_code)]

use h5chunk_format::filter_pipeline::{FILTER_DEFLATE, FILTER_FLETCHER32, FILTER_SHUFFLE};
use h5chunk_format::{
    ChunkShape, ChunkedDataset, DatasetId, Dataspace, Datatype, FilterDescription, FilterPipeline,
    ReaderConfig,
};

pub const UNDEFINED: u64 = u64::MAX;

/// Forward byte shuffle.
pub fn shuffle(data: &[u8], element_size: usize) -> Vec<u8> {
    if element_size <= 1 || data.len() < element_size {
        return data.to_vec();
    }
    let n = data.len() / element_size;
    let mut out = vec![0u8; data.len()];
    for i in 0..n {
        for b in 0..element_size {
            out[b * n + i] = data[i * element_size + b];
        }
    }
    let tail = n * element_size;
    out[tail..].copy_from_slice(&data[tail..]);
    out
}

pub fn deflate(data: &[u8]) -> Vec<u8> {
    miniz_oxide::deflate::compress_to_vec_zlib(data, 6)
}

/// HDF5's Fletcher-32, written out word by word: big-endian words, 360-word
/// blocks, end-around carry. Kept apart from the reader's implementation.
pub fn reference_fletcher32(data: &[u8]) -> u32 {
    let mut sum1: u32 = 0;
    let mut sum2: u32 = 0;
    let mut words = data.len() / 2;
    let mut i = 0;
    while words > 0 {
        let block = words.min(360);
        words -= block;
        for _ in 0..block {
            sum1 = sum1.wrapping_add((data[i] as u32) << 8 | data[i + 1] as u32);
            sum2 = sum2.wrapping_add(sum1);
            i += 2;
        }
        sum1 = (sum1 & 0xffff) + (sum1 >> 16);
        sum2 = (sum2 & 0xffff) + (sum2 >> 16);
    }
    if data.len() % 2 == 1 {
        sum1 += (data[i] as u32) << 8;
        sum2 += sum1;
        sum1 = (sum1 & 0xffff) + (sum1 >> 16);
        sum2 = (sum2 & 0xffff) + (sum2 >> 16);
    }
    sum1 = (sum1 & 0xffff) + (sum1 >> 16);
    sum2 = (sum2 & 0xffff) + (sum2 >> 16);
    sum2 << 16 | sum1
}

pub fn append_fletcher32(data: &[u8]) -> Vec<u8> {
    let mut out = data.to_vec();
    out.extend_from_slice(&reference_fletcher32(data).to_le_bytes());
    out
}

/// Apply `filters` in pipeline order, skipping positions set in `mask`.
pub fn encode_chunk(data: &[u8], filters: &[u16], element_size: usize, mask: u32) -> Vec<u8> {
    let mut out = data.to_vec();
    for (pos, &id) in filters.iter().enumerate() {
        if mask >> pos & 1 == 1 {
            continue;
        }
        out = match id {
            FILTER_SHUFFLE => shuffle(&out, element_size),
            FILTER_DEFLATE => deflate(&out),
            FILTER_FLETCHER32 => append_fletcher32(&out),
            other => panic!("no encoder for filter {other}"),
        };
    }
    out
}

pub fn pipeline(filters: &[u16]) -> FilterPipeline {
    FilterPipeline::new(filters.iter().copied().map(FilterDescription::new).collect())
}

/// One B-tree key: stored size, filter mask, chunk coordinate.
pub type Key = (u32, u32, Vec<u64>);

/// Serialize a raw-data B-tree node. `keys` has one more entry than
/// `children`.
pub fn btree_node(level: u8, keys: &[Key], children: &[u64]) -> Vec<u8> {
    assert_eq!(keys.len(), children.len() + 1);
    let mut buf = Vec::new();
    buf.extend_from_slice(b"TREE");
    buf.push(1);
    buf.push(level);
    buf.extend_from_slice(&(children.len() as u16).to_le_bytes());
    buf.extend_from_slice(&UNDEFINED.to_le_bytes());
    buf.extend_from_slice(&UNDEFINED.to_le_bytes());
    let key = |buf: &mut Vec<u8>, (size, mask, coord): &Key| {
        buf.extend_from_slice(&size.to_le_bytes());
        buf.extend_from_slice(&mask.to_le_bytes());
        for c in coord {
            buf.extend_from_slice(&c.to_le_bytes());
        }
        buf.extend_from_slice(&0u64.to_le_bytes());
    };
    for (k, child) in keys.iter().zip(children) {
        key(&mut buf, k);
        buf.extend_from_slice(&child.to_le_bytes());
    }
    key(&mut buf, &keys[keys.len() - 1]);
    buf
}

/// Origins of every chunk covering `dims`, in row-major order.
pub fn chunk_origins(dims: &[u64], chunk: &[u64]) -> Vec<Vec<u64>> {
    let mut origins = vec![Vec::new()];
    for (&d, &c) in dims.iter().zip(chunk) {
        let steps: Vec<u64> = (0..d.div_ceil(c)).map(|i| i * c).collect();
        origins = origins
            .into_iter()
            .flat_map(|prefix| {
                steps.iter().map(move |&s| {
                    let mut o = prefix.clone();
                    o.push(s);
                    o
                })
            })
            .collect();
    }
    origins
}

/// Bytes of the chunk at `origin`, zero-padded past the dataset edge.
pub fn chunk_bytes(data: &[u8], dims: &[u64], chunk: &[u64], origin: &[u64], elem: usize) -> Vec<u8> {
    let rank = dims.len();
    let n: u64 = chunk.iter().product();
    let mut out = vec![0u8; n as usize * elem];
    for flat in 0..n {
        let mut rem = flat;
        let mut global = 0u64;
        let mut inside = true;
        for d in 0..rank {
            let below: u64 = chunk[d + 1..].iter().product();
            let local = rem / below;
            rem %= below;
            let g = origin[d] + local;
            if g >= dims[d] {
                inside = false;
                break;
            }
            let stride: u64 = dims[d + 1..].iter().product();
            global += g * stride;
        }
        if inside {
            let (src, dst) = (global as usize * elem, flat as usize * elem);
            out[dst..dst + elem].copy_from_slice(&data[src..src + elem]);
        }
    }
    out
}

/// An in-memory file holding one chunked dataset.
pub struct Fixture {
    pub file: Vec<u8>,
    pub root: u64,
    /// Address of each stored chunk, by origin.
    pub chunks: Vec<(Vec<u64>, u64)>,
}

/// Layout knobs for [`build`].
#[derive(Clone)]
pub struct Layout {
    pub filters: Vec<u16>,
    /// Chunks per leaf node; more chunks than this adds one internal level.
    pub leaf_capacity: usize,
    /// Per-chunk filter mask, by position in row-major chunk order.
    pub masks: Vec<(usize, u32)>,
    /// Chunk positions left unallocated.
    pub missing: Vec<usize>,
}

impl Default for Layout {
    fn default() -> Self {
        Layout {
            filters: Vec::new(),
            leaf_capacity: 64,
            masks: Vec::new(),
            missing: Vec::new(),
        }
    }
}

/// Lay out `data` (row-major, `dims`) as filtered chunks plus a B-tree.
pub fn build(data: &[u8], dims: &[u64], chunk: &[u64], elem: usize, layout: &Layout) -> Fixture {
    let mut file = vec![0u8; 0x40];
    let mut keys: Vec<Key> = Vec::new();
    let mut children = Vec::new();
    let mut chunks = Vec::new();

    for (i, origin) in chunk_origins(dims, chunk).into_iter().enumerate() {
        if layout.missing.contains(&i) {
            continue;
        }
        let mask = layout
            .masks
            .iter()
            .find(|(pos, _)| *pos == i)
            .map_or(0, |(_, m)| *m);
        let raw = chunk_bytes(data, dims, chunk, &origin, elem);
        let stored = encode_chunk(&raw, &layout.filters, elem, mask);
        let addr = file.len() as u64;
        file.extend_from_slice(&stored);
        keys.push((stored.len() as u32, mask, origin.clone()));
        children.push(addr);
        chunks.push((origin, addr));
    }

    let closing: Key = (0, 0, dims.to_vec());
    let root = if keys.len() <= layout.leaf_capacity {
        let mut all = keys;
        all.push(closing);
        let root = file.len() as u64;
        file.extend_from_slice(&btree_node(0, &all, &children));
        root
    } else {
        let mut top_keys = Vec::new();
        let mut leaves = Vec::new();
        for (group_keys, group_children) in keys
            .chunks(layout.leaf_capacity)
            .zip(children.chunks(layout.leaf_capacity))
        {
            let mut leaf_keys = group_keys.to_vec();
            leaf_keys.push(closing.clone());
            top_keys.push((0, 0, group_keys[0].2.clone()));
            leaves.push(file.len() as u64);
            file.extend_from_slice(&btree_node(0, &leaf_keys, group_children));
        }
        top_keys.push(closing);
        let root = file.len() as u64;
        file.extend_from_slice(&btree_node(1, &top_keys, &leaves));
        root
    };

    Fixture { file, root, chunks }
}

pub fn dataset(
    name: &str,
    datatype: Datatype,
    dims: &[u64],
    chunk: &[u64],
    filters: &[u16],
    root: u64,
) -> ChunkedDataset {
    ChunkedDataset::new(
        DatasetId::new(name),
        datatype,
        Dataspace::new(dims.to_vec()),
        ChunkShape::new(chunk.to_vec()).expect("chunk shape"),
        pipeline(filters),
        root,
        ReaderConfig::default(),
    )
    .expect("dataset")
}

/// Row-major values 0..n encoded with `to_bytes`.
pub fn iota_bytes<const N: usize>(n: usize, to_bytes: impl Fn(usize) -> [u8; N]) -> Vec<u8> {
    (0..n).flat_map(to_bytes).collect()
}
