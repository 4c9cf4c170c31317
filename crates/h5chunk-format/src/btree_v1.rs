//! Version 1 B-trees: node parsing and the raw-data chunk index.
//!
//! Node layout:
//!
//! ```text
//! "TREE" | type u8 | level u8 | entries u16 | left sibling | right sibling
//! key[0] child[0] key[1] child[1] ... key[n-1] child[n-1] key[n]
//! ```
//!
//! Siblings and children are file addresses of the configured offset size.
//! Group (type 0) keys are offset-sized heap offsets. Raw-data (type 1) keys
//! are `u32 chunk size, u32 filter mask, (rank + 1) x u64 offsets`.

use std::collections::HashSet;
use std::fmt;

use byteorder::{ByteOrder, LittleEndian};

use crate::chunk_index::{misaligned_dimension, ChunkDescriptor, ChunkIndex, ChunkIter};
use crate::config::ReaderConfig;
use crate::dataspace::{ChunkShape, Hyperslab};
use crate::error::FormatError;
use crate::io::ByteSource;

/// B-tree node signature.
pub const BTREE_SIGNATURE: [u8; 4] = *b"TREE";

/// Node type of group B-trees.
pub const NODE_TYPE_GROUP: u8 = 0;
/// Node type of chunked raw-data B-trees.
pub const NODE_TYPE_RAW_DATA: u8 = 1;

/// Key of a raw-data node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkKey {
    /// Stored size of the chunk in bytes.
    pub chunk_size: u32,
    /// Filters skipped for the chunk.
    pub filter_mask: u32,
    /// Element offsets, one per dimension plus a trailing element-byte offset.
    pub offsets: Vec<u64>,
}

impl ChunkKey {
    /// The spatial part of the key, without the trailing offset.
    pub fn coordinate(&self) -> &[u64] {
        match self.offsets.split_last() {
            Some((_, spatial)) => spatial,
            None => &[],
        }
    }

    /// The trailing element-byte offset.
    pub fn terminator(&self) -> u64 {
        self.offsets.last().copied().unwrap_or(0)
    }
}

/// Keys and children of a node, by node type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeEntries {
    /// Type 0: keys are local heap offsets, children point at symbol table
    /// nodes (leaves) or further B-tree nodes.
    Group { keys: Vec<u64>, children: Vec<u64> },
    /// Type 1: keys locate chunks, children point at chunk data (leaves) or
    /// further B-tree nodes.
    RawData { keys: Vec<ChunkKey>, children: Vec<u64> },
}

impl NodeEntries {
    /// Child addresses.
    pub fn children(&self) -> &[u64] {
        match self {
            NodeEntries::Group { children, .. } | NodeEntries::RawData { children, .. } => children,
        }
    }

    /// Node-type tag these entries were parsed under.
    pub fn node_type(&self) -> u8 {
        match self {
            NodeEntries::Group { .. } => NODE_TYPE_GROUP,
            NodeEntries::RawData { .. } => NODE_TYPE_RAW_DATA,
        }
    }
}

/// A parsed B-tree v1 node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BTreeNode {
    /// File address of the node.
    pub address: u64,
    /// 0 for leaves.
    pub level: u8,
    /// Number of children.
    pub entries_used: u16,
    /// Left sibling address, or None if undefined.
    pub left_sibling: Option<u64>,
    /// Right sibling address, or None if undefined.
    pub right_sibling: Option<u64>,
    /// Keys and children.
    pub entries: NodeEntries,
}

fn read_offset(data: &[u8], size: u8) -> u64 {
    match size {
        2 => LittleEndian::read_u16(data) as u64,
        4 => LittleEndian::read_u32(data) as u64,
        _ => LittleEndian::read_u64(data),
    }
}

fn read_address(data: &[u8], size: u8) -> Option<u64> {
    let bytes = &data[..size as usize];
    if bytes.iter().all(|&b| b == 0xFF) {
        None
    } else {
        Some(read_offset(bytes, size))
    }
}

/// Bytes in the fixed node header.
pub fn header_size(offset_size: u8) -> usize {
    8 + 2 * offset_size as usize
}

/// Bytes in one key of a node of `node_type`.
pub fn key_size(node_type: u8, offset_size: u8, rank: usize) -> usize {
    match node_type {
        NODE_TYPE_GROUP => offset_size as usize,
        _ => 8 + 8 * (rank + 1),
    }
}

/// Total bytes of a node with `entries` children.
pub fn node_size(node_type: u8, entries: usize, offset_size: u8, rank: usize) -> usize {
    let key = key_size(node_type, offset_size, rank);
    header_size(offset_size) + entries * (key + offset_size as usize) + key
}

impl BTreeNode {
    /// Parse a node from `data`, the bytes starting at `address`.
    ///
    /// `rank` is the dataset rank, used to size raw-data keys. Any structural
    /// problem is reported as [`FormatError::IndexCorruption`] at `address`.
    pub fn parse(data: &[u8], address: u64, offset_size: u8, rank: usize) -> Result<Self, FormatError> {
        if !matches!(offset_size, 2 | 4 | 8) {
            return Err(FormatError::InvalidOffsetSize(offset_size));
        }
        let os = offset_size as usize;
        if data.len() < header_size(offset_size) {
            return Err(FormatError::corrupt(address, "truncated node header"));
        }
        if data[..4] != BTREE_SIGNATURE {
            return Err(FormatError::corrupt(
                address,
                format!("bad signature {:02x?}", &data[..4]),
            ));
        }
        let node_type = data[4];
        if node_type != NODE_TYPE_GROUP && node_type != NODE_TYPE_RAW_DATA {
            return Err(FormatError::corrupt(
                address,
                format!("unknown node type {node_type}"),
            ));
        }
        let level = data[5];
        let entries_used = LittleEndian::read_u16(&data[6..8]);
        let left_sibling = read_address(&data[8..], offset_size);
        let right_sibling = read_address(&data[8 + os..], offset_size);

        let eu = entries_used as usize;
        let needed = node_size(node_type, eu, offset_size, rank);
        if data.len() < needed {
            return Err(FormatError::corrupt(
                address,
                format!(
                    "entry count {eu} needs {needed} bytes, node has {}",
                    data.len()
                ),
            ));
        }

        let ks = key_size(node_type, offset_size, rank);
        let mut pos = header_size(offset_size);
        let mut children = Vec::with_capacity(eu);
        let entries = if node_type == NODE_TYPE_GROUP {
            let mut keys = Vec::with_capacity(eu + 1);
            for _ in 0..eu {
                keys.push(read_offset(&data[pos..], offset_size));
                children.push(read_offset(&data[pos + ks..], offset_size));
                pos += ks + os;
            }
            keys.push(read_offset(&data[pos..], offset_size));
            NodeEntries::Group { keys, children }
        } else {
            let mut keys = Vec::with_capacity(eu + 1);
            for _ in 0..eu {
                keys.push(parse_chunk_key(&data[pos..pos + ks], rank));
                children.push(read_offset(&data[pos + ks..], offset_size));
                pos += ks + os;
            }
            keys.push(parse_chunk_key(&data[pos..pos + ks], rank));
            NodeEntries::RawData { keys, children }
        };

        Ok(BTreeNode {
            address,
            level,
            entries_used,
            left_sibling,
            right_sibling,
            entries,
        })
    }

    /// Read and parse the node at `address`.
    ///
    /// A node that would extend past the end of a source of known length is
    /// corrupt; other read failures are reported as I/O errors.
    pub fn read<S: ByteSource + ?Sized>(
        source: &S,
        address: u64,
        config: &ReaderConfig,
        rank: usize,
    ) -> Result<Self, FormatError> {
        config.validate()?;
        let os = config.offset_size;
        let header = read_node_bytes(source, address, header_size(os))?;
        if header[..4] != BTREE_SIGNATURE {
            return Err(FormatError::corrupt(
                address,
                format!("bad signature {:02x?}", &header[..4]),
            ));
        }
        let node_type = header[4];
        let entries = LittleEndian::read_u16(&header[6..8]) as usize;
        if let Some(max) = config.max_node_entries() {
            if entries > max {
                return Err(FormatError::corrupt(
                    address,
                    format!("entry count {entries} exceeds node capacity {max}"),
                ));
            }
        }
        let data = read_node_bytes(source, address, node_size(node_type, entries, os, rank))?;
        Self::parse(&data, address, os, rank)
    }

    /// Node-type tag.
    pub fn node_type(&self) -> u8 {
        self.entries.node_type()
    }

    /// Whether this is a leaf.
    pub fn is_leaf(&self) -> bool {
        self.level == 0
    }
}

fn read_node_bytes<S: ByteSource + ?Sized>(
    source: &S,
    address: u64,
    len: usize,
) -> Result<Vec<u8>, FormatError> {
    if let Some(total) = source.len() {
        if address.checked_add(len as u64).map_or(true, |end| end > total) {
            return Err(FormatError::corrupt(
                address,
                format!("node of {len} bytes extends past end of file ({total} bytes)"),
            ));
        }
    }
    source
        .read_at(address, len)
        .map_err(|e| FormatError::io(address, len, e))
}

fn parse_chunk_key(data: &[u8], rank: usize) -> ChunkKey {
    ChunkKey {
        chunk_size: LittleEndian::read_u32(&data[0..4]),
        filter_mask: LittleEndian::read_u32(&data[4..8]),
        offsets: data[8..8 + 8 * (rank + 1)]
            .chunks_exact(8)
            .map(LittleEndian::read_u64)
            .collect(),
    }
}

// ---------------------------------------------------------------------------
// Chunk index traversal
// ---------------------------------------------------------------------------

/// Chunk index stored as a raw-data B-tree, read lazily from a byte source.
pub struct BTreeChunkIndex<'a, S: ?Sized> {
    source: &'a S,
    root: u64,
    chunk_shape: ChunkShape,
    config: ReaderConfig,
}

impl<'a, S: ByteSource + ?Sized> BTreeChunkIndex<'a, S> {
    /// Index rooted at `root`.
    pub fn new(source: &'a S, root: u64, chunk_shape: ChunkShape, config: ReaderConfig) -> Self {
        Self {
            source,
            root,
            chunk_shape,
            config,
        }
    }

    /// Root node address.
    pub fn root(&self) -> u64 {
        self.root
    }
}

impl<S: ?Sized> fmt::Debug for BTreeChunkIndex<'_, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BTreeChunkIndex")
            .field("root", &self.root)
            .field("chunk_shape", &self.chunk_shape)
            .finish_non_exhaustive()
    }
}

impl<S: ByteSource + ?Sized> ChunkIndex for BTreeChunkIndex<'_, S> {
    fn chunks_overlapping(&self, region: &Hyperslab) -> ChunkIter<'_> {
        match region.chunk_bounds(&self.chunk_shape) {
            Some((first, last)) => Box::new(Walk {
                index: self,
                region: region.clone(),
                first,
                last,
                stack: Vec::new(),
                visited: HashSet::new(),
                started: false,
                failed: false,
            }),
            None => Box::new(std::iter::empty()),
        }
    }
}

/// A node being walked: its keys, children, and the next child to look at.
struct Frame {
    node: BTreeNode,
    depth: usize,
    next: usize,
}

impl Frame {
    fn keys(&self) -> &[ChunkKey] {
        match &self.node.entries {
            NodeEntries::RawData { keys, .. } => keys,
            NodeEntries::Group { .. } => &[],
        }
    }
}

/// Depth-first traversal that prunes subtrees outside the region's chunk
/// bounds.
struct Walk<'i, 'a, S: ?Sized> {
    index: &'i BTreeChunkIndex<'a, S>,
    region: Hyperslab,
    first: Vec<u64>,
    last: Vec<u64>,
    stack: Vec<Frame>,
    visited: HashSet<u64>,
    started: bool,
    failed: bool,
}

impl<S: ByteSource + ?Sized> Walk<'_, '_, S> {
    fn load(&mut self, address: u64, depth: usize, parent_level: Option<u8>) -> Result<(), FormatError> {
        let max_depth = self.index.config.max_tree_depth;
        if depth > max_depth {
            return Err(FormatError::corrupt(
                address,
                format!("tree deeper than {max_depth} levels"),
            ));
        }
        if !self.visited.insert(address) {
            return Err(FormatError::corrupt(address, "node address revisited (cycle)"));
        }

        let rank = self.index.chunk_shape.rank();
        let node = BTreeNode::read(self.index.source, address, &self.index.config, rank)?;
        tracing::trace!(
            address,
            level = node.level,
            entries = node.entries_used,
            depth,
            "chunk b-tree node"
        );

        if node.node_type() != NODE_TYPE_RAW_DATA {
            return Err(FormatError::corrupt(
                address,
                format!("node type {} in a chunk index", node.node_type()),
            ));
        }
        if let Some(parent) = parent_level {
            if parent == 0 || node.level != parent - 1 {
                return Err(FormatError::corrupt(
                    address,
                    format!("child level {} under parent level {parent}", node.level),
                ));
            }
        }

        self.stack.push(Frame {
            node,
            depth,
            next: 0,
        });
        Ok(())
    }

    /// Whether child `i` of `frame` may hold chunks between the bounds.
    fn child_in_range(&self, frame: &Frame, i: usize) -> bool {
        let keys = frame.keys();
        let rank = self.first.len();
        let lower = &keys[i].coordinate()[..rank];
        if lower > self.last.as_slice() {
            return false;
        }
        // The closing key of a node is an upper bound only by convention.
        if i + 1 < frame.node.entries_used as usize {
            let upper = &keys[i + 1].coordinate()[..rank];
            if upper <= self.first.as_slice() {
                return false;
            }
        }
        true
    }

    fn leaf_descriptor(&self, frame: &Frame, i: usize) -> Result<ChunkDescriptor, FormatError> {
        let key = &frame.keys()[i];
        let address = frame.node.entries.children()[i];
        let coordinate = key.coordinate();
        if key.terminator() != 0 {
            return Err(FormatError::corrupt(
                frame.node.address,
                format!(
                    "chunk key {i} has non-zero trailing offset {}",
                    key.terminator()
                ),
            ));
        }
        if let Some(d) = misaligned_dimension(coordinate, &self.index.chunk_shape) {
            return Err(FormatError::corrupt(
                frame.node.address,
                format!(
                    "chunk coordinate {coordinate:?} is not a multiple of the chunk shape in dimension {d}"
                ),
            ));
        }
        Ok(ChunkDescriptor {
            coordinate: coordinate.to_vec(),
            address,
            stored_size: key.chunk_size as u64,
            filter_mask: key.filter_mask,
        })
    }

    fn advance(&mut self) -> Result<Option<ChunkDescriptor>, FormatError> {
        if !self.started {
            self.started = true;
            self.load(self.index.root, 0, None)?;
        }
        loop {
            let Some(top) = self.stack.last_mut() else {
                return Ok(None);
            };
            let i = top.next;
            if i >= top.node.entries_used as usize {
                self.stack.pop();
                continue;
            }
            top.next += 1;
            let frame = &self.stack[self.stack.len() - 1];

            if frame.node.is_leaf() {
                let chunk = self.leaf_descriptor(frame, i)?;
                if self
                    .region
                    .overlaps_chunk(&chunk.coordinate, self.index.chunk_shape.dims())
                {
                    return Ok(Some(chunk));
                }
            } else if self.child_in_range(frame, i) {
                let child = frame.node.entries.children()[i];
                let (depth, level) = (frame.depth + 1, frame.node.level);
                self.load(child, depth, Some(level))?;
            }
        }
    }
}

impl<S: ByteSource + ?Sized> Iterator for Walk<'_, '_, S> {
    type Item = Result<ChunkDescriptor, FormatError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.advance() {
            Ok(chunk) => chunk.map(Ok),
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn write_offset(buf: &mut Vec<u8>, value: u64, size: u8) {
        buf.extend_from_slice(&value.to_le_bytes()[..size as usize]);
    }

    /// Serialize a raw-data node. `keys` hold spatial coordinates; every key
    /// gets a zero trailing offset.
    pub(crate) fn build_chunk_node(
        level: u8,
        keys: &[(u32, u32, Vec<u64>)],
        children: &[u64],
        offset_size: u8,
    ) -> Vec<u8> {
        assert_eq!(keys.len(), children.len() + 1);
        let mut buf = Vec::new();
        buf.extend_from_slice(&BTREE_SIGNATURE);
        buf.push(NODE_TYPE_RAW_DATA);
        buf.push(level);
        buf.extend_from_slice(&(children.len() as u16).to_le_bytes());
        write_offset(&mut buf, u64::MAX, offset_size);
        write_offset(&mut buf, u64::MAX, offset_size);
        let write_key = |buf: &mut Vec<u8>, (size, mask, coord): &(u32, u32, Vec<u64>)| {
            buf.extend_from_slice(&size.to_le_bytes());
            buf.extend_from_slice(&mask.to_le_bytes());
            for c in coord {
                buf.extend_from_slice(&c.to_le_bytes());
            }
            buf.extend_from_slice(&0u64.to_le_bytes());
        };
        for (key, &child) in keys.iter().zip(children) {
            write_key(&mut buf, key);
            write_offset(&mut buf, child, offset_size);
        }
        write_key(&mut buf, &keys[keys.len() - 1]);
        buf
    }

    fn key(coord: &[u64]) -> (u32, u32, Vec<u64>) {
        (64, 0, coord.to_vec())
    }

    /// Place `node` at `at` in a zeroed buffer of `len` bytes.
    fn place(file: &mut Vec<u8>, at: usize, node: &[u8]) {
        if file.len() < at + node.len() {
            file.resize(at + node.len(), 0);
        }
        file[at..at + node.len()].copy_from_slice(node);
    }

    fn collect(
        file: &[u8],
        root: u64,
        shape: &[u64],
        region: &Hyperslab,
    ) -> Result<Vec<ChunkDescriptor>, FormatError> {
        let index = BTreeChunkIndex::new(
            file,
            root,
            ChunkShape::new(shape.to_vec()).unwrap(),
            ReaderConfig::default(),
        );
        let chunks = index.chunks_overlapping(region).collect();
        chunks
    }

    #[test]
    fn parse_leaf_node() {
        let data = build_chunk_node(
            0,
            &[key(&[0, 0]), key(&[0, 4]), key(&[4, 8])],
            &[0x1000, 0x2000],
            8,
        );
        let node = BTreeNode::parse(&data, 0x40, 8, 2).unwrap();
        assert_eq!(node.node_type(), NODE_TYPE_RAW_DATA);
        assert!(node.is_leaf());
        assert_eq!(node.entries_used, 2);
        assert_eq!(node.left_sibling, None);
        assert_eq!(node.right_sibling, None);
        match &node.entries {
            NodeEntries::RawData { keys, children } => {
                assert_eq!(children, &vec![0x1000, 0x2000]);
                assert_eq!(keys[1].coordinate(), &[0, 4]);
                assert_eq!(keys[1].chunk_size, 64);
                assert_eq!(keys[2].terminator(), 0);
            }
            other => panic!("expected raw-data entries, got {other:?}"),
        }
    }

    #[test]
    fn parse_group_node() {
        let mut data = Vec::new();
        data.extend_from_slice(b"TREE");
        data.extend_from_slice(&[NODE_TYPE_GROUP, 0]);
        data.extend_from_slice(&1u16.to_le_bytes());
        write_offset(&mut data, u64::MAX, 4);
        write_offset(&mut data, 0x300, 4);
        for v in [0u64, 0x500, 8] {
            write_offset(&mut data, v, 4);
        }
        let node = BTreeNode::parse(&data, 0, 4, 0).unwrap();
        assert_eq!(node.right_sibling, Some(0x300));
        assert_eq!(
            node.entries,
            NodeEntries::Group {
                keys: vec![0, 8],
                children: vec![0x500]
            }
        );
    }

    #[test]
    fn parse_bad_signature() {
        let mut data = build_chunk_node(0, &[key(&[0]), key(&[4])], &[0x100], 8);
        data[0] = b'X';
        let err = BTreeNode::parse(&data, 0x80, 8, 1).unwrap_err();
        assert!(err.is_corruption());
        assert_eq!(err.offset(), Some(0x80));
    }

    #[test]
    fn parse_entry_count_exceeds_node() {
        let mut data = build_chunk_node(0, &[key(&[0]), key(&[4])], &[0x100], 8);
        data[6] = 9;
        let err = BTreeNode::parse(&data, 0, 8, 1).unwrap_err();
        assert!(matches!(err, FormatError::IndexCorruption { .. }));
    }

    #[test]
    fn single_leaf_lists_chunks_in_order() {
        let leaf = build_chunk_node(
            0,
            &[key(&[0, 0]), key(&[0, 3]), key(&[2, 0]), key(&[2, 3])],
            &[0x200, 0x240, 0x280],
            8,
        );
        let chunks = collect(&leaf, 0, &[2, 3], &Hyperslab::new([0, 0], [4, 6])).unwrap();
        let coords: Vec<_> = chunks.iter().map(|c| c.coordinate.clone()).collect();
        assert_eq!(coords, vec![vec![0, 0], vec![0, 3], vec![2, 0]]);
        assert_eq!(chunks[1].address, 0x240);
        assert_eq!(chunks[1].stored_size, 64);
    }

    #[test]
    fn two_level_tree_prunes_children() {
        // root at 0 -> leaves at 0x200 (row 0 chunks) and 0x400 (row 4 chunks)
        let left = build_chunk_node(0, &[key(&[0, 0]), key(&[0, 4]), key(&[4, 0])], &[0x1000, 0x1100], 8);
        let right = build_chunk_node(0, &[key(&[4, 0]), key(&[4, 4]), key(&[8, 0])], &[0x1200, 0x1300], 8);
        let root = build_chunk_node(1, &[key(&[0, 0]), key(&[4, 0]), key(&[8, 0])], &[0x200, 0x400], 8);
        let mut file = Vec::new();
        place(&mut file, 0, &root);
        place(&mut file, 0x200, &left);
        place(&mut file, 0x400, &right);

        let all = collect(&file, 0, &[4, 4], &Hyperslab::new([0, 0], [8, 8])).unwrap();
        let addrs: Vec<u64> = all.iter().map(|c| c.address).collect();
        assert_eq!(addrs, vec![0x1000, 0x1100, 0x1200, 0x1300]);

        // Only the second leaf is reachable; corrupting the first proves it
        // is never read.
        file[0x200] = 0;
        let lower = collect(&file, 0, &[4, 4], &Hyperslab::new([5, 5], [2, 2])).unwrap();
        assert_eq!(lower.len(), 1);
        assert_eq!(lower[0].address, 0x1300);
    }

    #[test]
    fn cycle_is_detected() {
        // internal node whose only child is itself
        let root = build_chunk_node(1, &[key(&[0]), key(&[8])], &[0], 8);
        let err = collect(&root, 0, &[4], &Hyperslab::new([0], [8])).unwrap_err();
        assert!(err.is_corruption());
        assert_eq!(err.offset(), Some(0));
    }

    #[test]
    fn child_level_must_descend() {
        let child = build_chunk_node(1, &[key(&[0]), key(&[8])], &[0x400], 8);
        let root = build_chunk_node(1, &[key(&[0]), key(&[8])], &[0x200], 8);
        let mut file = Vec::new();
        place(&mut file, 0, &root);
        place(&mut file, 0x200, &child);
        let err = collect(&file, 0, &[4], &Hyperslab::new([0], [8])).unwrap_err();
        assert!(matches!(err, FormatError::IndexCorruption { offset: 0x200, .. }));
    }

    #[test]
    fn misaligned_key_is_corruption() {
        let leaf = build_chunk_node(0, &[key(&[3]), key(&[8])], &[0x100], 8);
        let err = collect(&leaf, 0, &[4], &Hyperslab::new([0], [8])).unwrap_err();
        assert!(err.is_corruption());
    }

    #[test]
    fn group_node_in_chunk_index() {
        let mut leaf = build_chunk_node(0, &[key(&[0]), key(&[4])], &[0x100], 8);
        leaf[4] = NODE_TYPE_GROUP;
        let err = collect(&leaf, 0, &[4], &Hyperslab::new([0], [4])).unwrap_err();
        assert!(err.is_corruption());
    }

    #[test]
    fn node_past_end_of_file() {
        let leaf = build_chunk_node(0, &[key(&[0]), key(&[4])], &[0x100], 8);
        let err = collect(&leaf[..leaf.len() - 3], 0, &[4], &Hyperslab::new([0], [4])).unwrap_err();
        assert!(err.is_corruption());
    }

    #[test]
    fn capacity_check_uses_btree_k() {
        let leaf = build_chunk_node(0, &[key(&[0]), key(&[4]), key(&[8])], &[0x100, 0x200], 8);
        let cfg = ReaderConfig::default().btree_k(1);
        assert!(BTreeNode::read(leaf.as_slice(), 0, &cfg, 1).is_ok());
        let cfg = ReaderConfig::default();
        let index = BTreeChunkIndex::new(leaf.as_slice(), 0, ChunkShape::new([4]).unwrap(), cfg.btree_k(0));
        let mut iter = index.chunks_overlapping(&Hyperslab::new([0], [8]));
        assert!(iter.next().unwrap().unwrap_err().is_corruption());
        assert!(iter.next().is_none());
    }

    #[test]
    fn four_byte_offsets() {
        let leaf = build_chunk_node(0, &[key(&[0]), key(&[4]), key(&[8])], &[0x100, 0x200], 4);
        let index = BTreeChunkIndex::new(
            leaf.as_slice(),
            0,
            ChunkShape::new([4]).unwrap(),
            ReaderConfig::default().offset_size(4),
        );
        let chunks: Vec<_> = index
            .chunks_overlapping(&Hyperslab::new([4], [4]))
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].address, 0x200);
    }

    #[test]
    fn empty_region_reads_nothing() {
        let chunks = collect(&[], 0, &[4], &Hyperslab::new([0], [0])).unwrap();
        assert!(chunks.is_empty());
    }
}
