//! Inverse transforms for the built-in filters: deflate, shuffle, fletcher32.

use crate::error::FormatError;
use crate::filter_pipeline::{FILTER_DEFLATE, FILTER_FLETCHER32, FILTER_SHUFFLE};

/// A filter step resolved from its identification value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    Deflate,
    Shuffle,
    Fletcher32,
    /// Registered elsewhere; no decoder here.
    Unknown(u16),
}

impl FilterKind {
    /// Resolve a filter id.
    pub fn from_id(id: u16) -> Self {
        match id {
            FILTER_DEFLATE => FilterKind::Deflate,
            FILTER_SHUFFLE => FilterKind::Shuffle,
            FILTER_FLETCHER32 => FilterKind::Fletcher32,
            other => FilterKind::Unknown(other),
        }
    }

    /// The filter id this kind was resolved from.
    pub fn id(self) -> u16 {
        match self {
            FilterKind::Deflate => FILTER_DEFLATE,
            FilterKind::Shuffle => FILTER_SHUFFLE,
            FilterKind::Fletcher32 => FILTER_FLETCHER32,
            FilterKind::Unknown(id) => id,
        }
    }

    /// Whether this build can reverse the filter.
    pub fn is_supported(self) -> bool {
        match self {
            FilterKind::Deflate => cfg!(feature = "deflate"),
            FilterKind::Shuffle | FilterKind::Fletcher32 => true,
            FilterKind::Unknown(_) => false,
        }
    }
}

/// Zlib inflate. `size_hint` is the expected output length; output longer
/// than `limit` bytes fails the filter.
#[cfg(feature = "deflate")]
pub fn inflate(
    data: &[u8],
    size_hint: usize,
    limit: Option<usize>,
) -> Result<Vec<u8>, FormatError> {
    let inflated = match limit {
        Some(limit) => h5chunk_filters::inflate_limited(data, size_hint, limit),
        None => h5chunk_filters::inflate(data, size_hint),
    };
    inflated.map_err(|e| FormatError::FilterFailed {
        filter_id: FILTER_DEFLATE,
        reason: e.to_string(),
    })
}

/// Deflate support is compiled out.
#[cfg(not(feature = "deflate"))]
pub fn inflate(
    _data: &[u8],
    _size_hint: usize,
    _limit: Option<usize>,
) -> Result<Vec<u8>, FormatError> {
    Err(FormatError::UnsupportedFilter {
        filter_id: FILTER_DEFLATE,
    })
}

/// Undo the shuffle filter.
///
/// On disk all byte-0s of every element come first, then all byte-1s, and so
/// on. Bytes past the last whole element were never shuffled and are copied
/// through unchanged.
pub fn unshuffle(data: &[u8], element_size: usize) -> Vec<u8> {
    if element_size <= 1 || data.len() < element_size {
        return data.to_vec();
    }
    let n = data.len() / element_size;
    let shuffled = n * element_size;
    let mut out = vec![0u8; data.len()];
    for (j, plane) in data[..shuffled].chunks_exact(n).enumerate() {
        for (i, &b) in plane.iter().enumerate() {
            out[i * element_size + j] = b;
        }
    }
    out[shuffled..].copy_from_slice(&data[shuffled..]);
    out
}

/// Fletcher-32 as HDF5 computes it: big-endian 16-bit words, an odd trailing
/// byte as the high half of a final word, and end-around-carry folds after
/// every 360 words and once more at the end.
///
/// The folds leave 0xFFFF in a half where a modular sum would leave 0, so
/// all-0xFF data sums to 0xFFFF_FFFF.
pub fn fletcher32(data: &[u8]) -> u32 {
    const BLOCK_BYTES: usize = 360 * 2;

    fn fold(sum: u32) -> u32 {
        (sum & 0xFFFF) + (sum >> 16)
    }

    let mut sum1: u32 = 0;
    let mut sum2: u32 = 0;

    let (words, odd) = data.split_at(data.len() & !1);
    for block in words.chunks(BLOCK_BYTES) {
        for w in block.chunks_exact(2) {
            // u32 arithmetic that wraps, as libhdf5's does
            sum1 = sum1.wrapping_add(u32::from(w[0]) << 8 | u32::from(w[1]));
            sum2 = sum2.wrapping_add(sum1);
        }
        sum1 = fold(sum1);
        sum2 = fold(sum2);
    }
    if let [last] = odd {
        sum1 += u32::from(*last) << 8;
        sum2 += sum1;
        sum1 = fold(sum1);
        sum2 = fold(sum2);
    }

    fold(sum2) << 16 | fold(sum1)
}

/// `checksum` with the bytes of each 16-bit half swapped. Files written before
/// HDF5 1.6.3 on little-endian hosts stored this form.
fn swap_halves(checksum: u32) -> u32 {
    (checksum & 0x00FF_00FF) << 8 | (checksum >> 8) & 0x00FF_00FF
}

/// Check the trailing little-endian checksum and strip it. The half-swapped
/// form is accepted as well.
///
/// With `verify` off the checksum bytes are removed without comparison.
pub fn fletcher32_strip(data: &[u8], verify: bool) -> Result<Vec<u8>, FormatError> {
    let Some(split) = data.len().checked_sub(4) else {
        return Err(FormatError::FilterFailed {
            filter_id: FILTER_FLETCHER32,
            reason: format!("{} bytes is too short to hold a checksum", data.len()),
        });
    };
    let (payload, tail) = data.split_at(split);
    if verify {
        let expected = u32::from_le_bytes([tail[0], tail[1], tail[2], tail[3]]);
        let computed = fletcher32(payload);
        if expected != computed && expected != swap_halves(computed) {
            return Err(FormatError::ChecksumMismatch { expected, computed });
        }
    }
    Ok(payload.to_vec())
}
