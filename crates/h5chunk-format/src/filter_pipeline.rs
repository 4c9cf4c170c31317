//! Filter Pipeline message parsing (message type 0x000B) and per-chunk
//! reversal of the write-time filter chain.

use byteorder::{ByteOrder, LittleEndian};

use crate::config::ReaderConfig;
use crate::error::FormatError;
use crate::filters::{self, FilterKind};

/// Well-known filter IDs.
pub const FILTER_DEFLATE: u16 = 1;
pub const FILTER_SHUFFLE: u16 = 2;
pub const FILTER_FLETCHER32: u16 = 3;

/// Flag bit marking a filter as optional at write time.
pub const FILTER_FLAG_OPTIONAL: u16 = 0x0001;

/// Description of a single filter in a pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterDescription {
    /// Filter identification value.
    pub filter_id: u16,
    /// Optional filter name.
    pub name: Option<String>,
    /// Filter flags (bit 0 = optional).
    pub flags: u16,
    /// Client data values passed to the filter.
    pub client_data: Vec<u32>,
}

impl FilterDescription {
    /// A filter with no name or client data.
    pub fn new(filter_id: u16) -> Self {
        Self {
            filter_id,
            name: None,
            flags: 0,
            client_data: Vec::new(),
        }
    }

    /// Resolved filter kind.
    pub fn kind(&self) -> FilterKind {
        FilterKind::from_id(self.filter_id)
    }

    /// Whether the writer was allowed to skip this filter.
    pub fn is_optional(&self) -> bool {
        self.flags & FILTER_FLAG_OPTIONAL != 0
    }
}

/// Ordered filters of a dataset, in write-time application order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FilterPipeline {
    /// Pipeline version (1 or 2).
    pub version: u8,
    /// Ordered list of filters.
    pub filters: Vec<FilterDescription>,
}

fn ensure_len(data: &[u8], offset: usize, needed: usize) -> Result<(), FormatError> {
    match offset.checked_add(needed) {
        Some(end) if end <= data.len() => Ok(()),
        _ => Err(FormatError::UnexpectedEof {
            expected: offset.saturating_add(needed),
            available: data.len(),
        }),
    }
}

/// Name bytes up to the first NUL.
fn read_name(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

fn read_client_data(data: &[u8], pos: usize, count: usize) -> Result<Vec<u32>, FormatError> {
    ensure_len(data, pos, count * 4)?;
    Ok(data[pos..pos + count * 4]
        .chunks_exact(4)
        .map(LittleEndian::read_u32)
        .collect())
}

impl FilterPipeline {
    /// A pipeline applying `filters` in order.
    pub fn new(filters: Vec<FilterDescription>) -> Self {
        Self {
            version: 2,
            filters,
        }
    }

    /// Whether no filters are applied.
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Parse a filter pipeline message from raw message bytes.
    pub fn parse(data: &[u8]) -> Result<FilterPipeline, FormatError> {
        ensure_len(data, 0, 2)?;
        let version = data[0];
        let number_of_filters = data[1] as usize;

        match version {
            1 => Self::parse_v1(data, number_of_filters),
            2 => Self::parse_v2(data, number_of_filters),
            _ => Err(FormatError::InvalidFilterPipelineVersion(version)),
        }
    }

    fn parse_v1(data: &[u8], number_of_filters: usize) -> Result<FilterPipeline, FormatError> {
        // version, count, 6 reserved
        ensure_len(data, 0, 8)?;
        let mut pos = 8;
        let mut filters = Vec::with_capacity(number_of_filters);

        for _ in 0..number_of_filters {
            ensure_len(data, pos, 8)?;
            let filter_id = LittleEndian::read_u16(&data[pos..]);
            let name_length = LittleEndian::read_u16(&data[pos + 2..]) as usize;
            let flags = LittleEndian::read_u16(&data[pos + 4..]);
            let num_client_data = LittleEndian::read_u16(&data[pos + 6..]) as usize;
            pos += 8;

            let name = if name_length > 0 {
                ensure_len(data, pos, name_length)?;
                let name = read_name(&data[pos..pos + name_length]);
                pos += (name_length + 7) & !7;
                Some(name)
            } else {
                None
            };

            let client_data = read_client_data(data, pos, num_client_data)?;
            pos += num_client_data * 4;
            // odd client data counts are padded to a multiple of 8 bytes
            if num_client_data % 2 == 1 {
                pos += 4;
            }

            filters.push(FilterDescription {
                filter_id,
                name,
                flags,
                client_data,
            });
        }

        Ok(FilterPipeline {
            version: 1,
            filters,
        })
    }

    fn parse_v2(data: &[u8], number_of_filters: usize) -> Result<FilterPipeline, FormatError> {
        let mut pos = 2;
        let mut filters = Vec::with_capacity(number_of_filters);

        for _ in 0..number_of_filters {
            ensure_len(data, pos, 2)?;
            let filter_id = LittleEndian::read_u16(&data[pos..]);
            pos += 2;

            // predefined filters (< 256) carry no name length
            let name_length = if filter_id >= 256 {
                ensure_len(data, pos, 2)?;
                let len = LittleEndian::read_u16(&data[pos..]) as usize;
                pos += 2;
                len
            } else {
                0
            };

            ensure_len(data, pos, 4)?;
            let flags = LittleEndian::read_u16(&data[pos..]);
            let num_client_data = LittleEndian::read_u16(&data[pos + 2..]) as usize;
            pos += 4;

            let name = if name_length > 0 {
                ensure_len(data, pos, name_length)?;
                let name = read_name(&data[pos..pos + name_length]);
                pos += name_length;
                Some(name)
            } else {
                None
            };

            let client_data = read_client_data(data, pos, num_client_data)?;
            pos += num_client_data * 4;

            filters.push(FilterDescription {
                filter_id,
                name,
                flags,
                client_data,
            });
        }

        Ok(FilterPipeline {
            version: 2,
            filters,
        })
    }

    /// Reverse the pipeline on one chunk's stored bytes.
    ///
    /// Filters run last to first. The filter at position `i` is skipped when
    /// bit `i` of `skip_mask` is set. `element_size` drives unshuffling.
    pub fn decode(
        &self,
        raw: &[u8],
        skip_mask: u32,
        element_size: usize,
        config: &ReaderConfig,
    ) -> Result<Vec<u8>, FormatError> {
        self.decode_sized(raw, skip_mask, element_size, 0, config)
    }

    /// As [`decode`](Self::decode), with the expected decoded length used to
    /// size the inflate buffer and to bound it. A non-zero `expected_len` caps
    /// each inflate at that length plus the checksum bytes it must still
    /// carry; longer output fails the deflate filter.
    pub fn decode_sized(
        &self,
        raw: &[u8],
        skip_mask: u32,
        element_size: usize,
        expected_len: usize,
        config: &ReaderConfig,
    ) -> Result<Vec<u8>, FormatError> {
        let mut data = raw.to_vec();

        for (position, filter) in self.filters.iter().enumerate().rev() {
            let kind = filter.kind();
            if is_skipped(skip_mask, position) {
                tracing::debug!(position, filter_id = kind.id(), "filter skipped for chunk");
                continue;
            }
            if !kind.is_supported() {
                tracing::warn!(filter_id = kind.id(), position, "no decoder for filter");
                return Err(FormatError::UnsupportedFilter {
                    filter_id: kind.id(),
                });
            }
            data = match kind {
                FilterKind::Deflate => {
                    let limit = self.inflate_limit(position, skip_mask, expected_len);
                    filters::inflate(&data, expected_len, limit)?
                }
                FilterKind::Shuffle => filters::unshuffle(&data, element_size),
                FilterKind::Fletcher32 => filters::fletcher32_strip(&data, config.verify_checksums)?,
                FilterKind::Unknown(filter_id) => {
                    return Err(FormatError::UnsupportedFilter { filter_id })
                }
            };
        }

        Ok(data)
    }

    /// Largest valid inflate output for the filter at `position`: the decoded
    /// length plus 4 bytes per Fletcher-32 still to be reversed after it. `None`
    /// when the decoded length is unknown or one of those filters has no fixed
    /// overhead.
    fn inflate_limit(
        &self,
        position: usize,
        skip_mask: u32,
        expected_len: usize,
    ) -> Option<usize> {
        if expected_len == 0 {
            return None;
        }
        let mut limit = expected_len;
        for (earlier, filter) in self.filters.iter().enumerate().take(position) {
            if is_skipped(skip_mask, earlier) {
                continue;
            }
            match filter.kind() {
                FilterKind::Shuffle => {}
                FilterKind::Fletcher32 => limit = limit.checked_add(4)?,
                FilterKind::Deflate | FilterKind::Unknown(_) => return None,
            }
        }
        Some(limit)
    }
}

fn is_skipped(mask: u32, position: usize) -> bool {
    position < 32 && mask >> position & 1 == 1
}
