//! Materialization of chunked HDF5 datasets.
//!
//! Given the metadata of a chunked dataset (datatype, dataspace, chunk shape,
//! filter pipeline, and the address of its version 1 chunk B-tree), this crate
//! locates the stored chunks, reverses their filters, and decodes the bytes
//! into host values.
//!
//! ```no_run
//! use h5chunk_format::{
//!     ByteOrder, ChunkShape, ChunkedDataset, Dataspace, DatasetId, Datatype, FilterPipeline,
//!     FileSource, ReaderConfig,
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let source = FileSource::open("data.h5")?;
//! let dataset = ChunkedDataset::new(
//!     DatasetId::new("/temperature"),
//!     Datatype::FloatingPoint { size: 4, byte_order: ByteOrder::LittleEndian },
//!     Dataspace::new([7, 5]),
//!     ChunkShape::new([3, 2])?,
//!     FilterPipeline::default(),
//!     0x800,
//!     ReaderConfig::default(),
//! )?;
//! let values = dataset.read_all(&source)?;
//! println!("{:?}", values.shape());
//! # Ok(())
//! # }
//! ```

pub mod btree_v1;
pub mod chunk_index;
pub mod chunked_read;
pub mod config;
pub mod dataspace;
pub mod datatype;
pub mod decode;
pub mod error;
pub mod filter_pipeline;
pub mod filters;
pub mod io;

pub use btree_v1::{BTreeChunkIndex, BTreeNode, ChunkKey};
pub use chunk_index::{ChunkDescriptor, ChunkIndex, ChunkIter, ChunkList, IndexCell};
pub use chunked_read::{ChunkedDataset, UNDEFINED_ADDRESS};
pub use config::ReaderConfig;
pub use dataspace::{ChunkShape, Dataspace, Hyperslab};
pub use datatype::{ByteOrder, CharacterSet, Datatype, StringPadding};
pub use decode::{decode, decode_flat, DecodedValue, HostArray, Scalar};
pub use error::{DatasetError, DatasetId, FormatError};
pub use filter_pipeline::{FilterDescription, FilterPipeline};
pub use filters::FilterKind;
pub use io::{ByteSource, FileSource};
#[cfg(feature = "mmap")]
pub use io::MmapSource;
