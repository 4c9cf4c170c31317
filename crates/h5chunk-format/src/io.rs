//! Random-access byte sources.
//!
//! Everything downstream reads the file through [`ByteSource::read_at`]: an
//! in-memory buffer, a file handle, or (with the `mmap` feature) a memory map.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;

/// Positioned, read-only access to file bytes.
pub trait ByteSource {
    /// Read exactly `len` bytes starting at `offset`.
    ///
    /// Fails with an I/O error when the range is out of bounds or unreadable.
    fn read_at(&self, offset: u64, len: usize) -> io::Result<Vec<u8>>;

    /// Total length in bytes, if known.
    fn len(&self) -> Option<u64> {
        None
    }
}

fn out_of_range(offset: u64, len: usize, available: usize) -> io::Error {
    io::Error::new(
        io::ErrorKind::UnexpectedEof,
        format!("range {offset:#x}+{len} exceeds source length {available}"),
    )
}

fn slice_at(data: &[u8], offset: u64, len: usize) -> io::Result<Vec<u8>> {
    let start = usize::try_from(offset).map_err(|_| out_of_range(offset, len, data.len()))?;
    start
        .checked_add(len)
        .and_then(|end| data.get(start..end))
        .map(<[u8]>::to_vec)
        .ok_or_else(|| out_of_range(offset, len, data.len()))
}

impl ByteSource for [u8] {
    fn read_at(&self, offset: u64, len: usize) -> io::Result<Vec<u8>> {
        slice_at(self, offset, len)
    }

    fn len(&self) -> Option<u64> {
        Some(<[u8]>::len(self) as u64)
    }
}

impl ByteSource for Vec<u8> {
    fn read_at(&self, offset: u64, len: usize) -> io::Result<Vec<u8>> {
        slice_at(self, offset, len)
    }

    fn len(&self) -> Option<u64> {
        Some(Vec::len(self) as u64)
    }
}

impl ByteSource for Arc<[u8]> {
    fn read_at(&self, offset: u64, len: usize) -> io::Result<Vec<u8>> {
        slice_at(self, offset, len)
    }

    fn len(&self) -> Option<u64> {
        Some(<[u8]>::len(self) as u64)
    }
}

impl<S: ByteSource + ?Sized> ByteSource for &S {
    fn read_at(&self, offset: u64, len: usize) -> io::Result<Vec<u8>> {
        (**self).read_at(offset, len)
    }

    fn len(&self) -> Option<u64> {
        (**self).len()
    }
}

// ---------------------------------------------------------------------------
// FileSource: seek + read on a shared file handle
// ---------------------------------------------------------------------------

/// File-backed source reading on demand.
///
/// Seeks are serialized behind a mutex, so one `FileSource` can be shared
/// between threads.
#[derive(Debug)]
pub struct FileSource {
    file: Mutex<File>,
    len: u64,
}

impl FileSource {
    /// Open `path` for reading.
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        Self::from_file(File::open(path)?)
    }

    /// Wrap an already open file.
    pub fn from_file(file: File) -> io::Result<Self> {
        let len = file.metadata()?.len();
        Ok(Self {
            file: Mutex::new(file),
            len,
        })
    }
}

impl ByteSource for FileSource {
    fn read_at(&self, offset: u64, len: usize) -> io::Result<Vec<u8>> {
        let end = offset.checked_add(len as u64);
        if end.map_or(true, |end| end > self.len) {
            return Err(out_of_range(offset, len, self.len as usize));
        }
        let mut buf = vec![0u8; len];
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(&mut buf)?;
        Ok(buf)
    }

    fn len(&self) -> Option<u64> {
        Some(self.len)
    }
}

// ---------------------------------------------------------------------------
// MmapSource: memory-mapped file (feature = "mmap")
// ---------------------------------------------------------------------------

/// Memory-mapped source; reads copy straight out of the mapping.
#[cfg(feature = "mmap")]
pub struct MmapSource {
    _file: File,
    mmap: memmap2::Mmap,
}

#[cfg(feature = "mmap")]
impl MmapSource {
    /// Open and map `path` read-only.
    ///
    /// The file must not be modified by another process while mapped.
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = File::open(path)?;
        // SAFETY: read-only mapping; callers guarantee the file is not
        // modified concurrently.
        let mmap = unsafe { memmap2::Mmap::map(&file)? };
        Ok(Self { _file: file, mmap })
    }

    /// The mapped bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.mmap
    }
}

#[cfg(feature = "mmap")]
impl ByteSource for MmapSource {
    fn read_at(&self, offset: u64, len: usize) -> io::Result<Vec<u8>> {
        slice_at(&self.mmap, offset, len)
    }

    fn len(&self) -> Option<u64> {
        Some(self.mmap.len() as u64)
    }
}
