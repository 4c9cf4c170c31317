//! Conversion of post-filter element bytes into host values.
//!
//! Decoding is two steps. [`decode_flat`] turns the byte buffer into a flat,
//! typed [`HostArray`] using one generic element routine; [`decode`] then
//! nests the values by shape into a [`DecodedValue`].
//!
//! Host mapping:
//!
//! | stored type              | host    |
//! |--------------------------|---------|
//! | signed 1/2/4/8 bytes     | `i8` / `i16` / `i32` / `i64` |
//! | unsigned 1 byte          | `i16`   |
//! | unsigned 2 bytes         | `i32`   |
//! | unsigned 4 bytes         | `i64`   |
//! | unsigned 8 bytes         | `u128`  |
//! | float 4/8 bytes          | `f32` / `f64` |
//! | fixed/variable strings   | `String` |

use bytemuck::Pod;

use crate::datatype::{ByteOrder, CharacterSet, Datatype, StringPadding};
use crate::error::FormatError;

/// One host value.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U128(u128),
    F32(f32),
    F64(f64),
    Text(String),
}

impl Scalar {
    /// Numeric value as `f64`; `None` for text.
    pub fn as_f64(&self) -> Option<f64> {
        Some(match *self {
            Scalar::I8(v) => v as f64,
            Scalar::I16(v) => v as f64,
            Scalar::I32(v) => v as f64,
            Scalar::I64(v) => v as f64,
            Scalar::U128(v) => v as f64,
            Scalar::F32(v) => v as f64,
            Scalar::F64(v) => v,
            Scalar::Text(_) => return None,
        })
    }

    /// Integer value; `None` for floats and text.
    pub fn as_i128(&self) -> Option<i128> {
        match *self {
            Scalar::I8(v) => Some(v.into()),
            Scalar::I16(v) => Some(v.into()),
            Scalar::I32(v) => Some(v.into()),
            Scalar::I64(v) => Some(v.into()),
            Scalar::U128(v) => i128::try_from(v).ok(),
            _ => None,
        }
    }

    /// Text value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Scalar::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// A scalar, or a sequence of values one dimension deeper.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedValue {
    Scalar(Scalar),
    Array(Vec<DecodedValue>),
}

impl DecodedValue {
    /// Whether this is a single value.
    pub fn is_scalar(&self) -> bool {
        matches!(self, DecodedValue::Scalar(_))
    }

    /// The value, if scalar.
    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            DecodedValue::Scalar(s) => Some(s),
            DecodedValue::Array(_) => None,
        }
    }

    /// The sub-values, if an array.
    pub fn as_array(&self) -> Option<&[DecodedValue]> {
        match self {
            DecodedValue::Array(items) => Some(items),
            DecodedValue::Scalar(_) => None,
        }
    }

    /// Lengths along the first element of each level. Empty for a scalar.
    pub fn shape(&self) -> Vec<usize> {
        let mut shape = Vec::new();
        let mut level = self;
        while let DecodedValue::Array(items) = level {
            shape.push(items.len());
            match items.first() {
                Some(first) => level = first,
                None => break,
            }
        }
        shape
    }

    /// All scalars in row-major order.
    pub fn flatten(&self) -> Vec<Scalar> {
        let mut out = Vec::new();
        self.flatten_into(&mut out);
        out
    }

    fn flatten_into(&self, out: &mut Vec<Scalar>) {
        match self {
            DecodedValue::Scalar(s) => out.push(s.clone()),
            DecodedValue::Array(items) => items.iter().for_each(|v| v.flatten_into(out)),
        }
    }
}

/// Flat decoded elements, one vector per host type.
#[derive(Debug, Clone, PartialEq)]
pub enum HostArray {
    I8(Vec<i8>),
    I16(Vec<i16>),
    I32(Vec<i32>),
    I64(Vec<i64>),
    U128(Vec<u128>),
    F32(Vec<f32>),
    F64(Vec<f64>),
    Text(Vec<String>),
}

impl HostArray {
    /// Number of elements.
    pub fn len(&self) -> usize {
        match self {
            HostArray::I8(v) => v.len(),
            HostArray::I16(v) => v.len(),
            HostArray::I32(v) => v.len(),
            HostArray::I64(v) => v.len(),
            HostArray::U128(v) => v.len(),
            HostArray::F32(v) => v.len(),
            HostArray::F64(v) => v.len(),
            HostArray::Text(v) => v.len(),
        }
    }

    /// Whether there are no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Convert into per-element scalars.
    pub fn into_scalars(self) -> Vec<Scalar> {
        match self {
            HostArray::I8(v) => v.into_iter().map(Scalar::I8).collect(),
            HostArray::I16(v) => v.into_iter().map(Scalar::I16).collect(),
            HostArray::I32(v) => v.into_iter().map(Scalar::I32).collect(),
            HostArray::I64(v) => v.into_iter().map(Scalar::I64).collect(),
            HostArray::U128(v) => v.into_iter().map(Scalar::U128).collect(),
            HostArray::F32(v) => v.into_iter().map(Scalar::F32).collect(),
            HostArray::F64(v) => v.into_iter().map(Scalar::F64).collect(),
            HostArray::Text(v) => v.into_iter().map(Scalar::Text).collect(),
        }
    }

    /// Nest the elements row-major under `shape`.
    pub fn into_shaped(self, shape: &[u64]) -> Result<DecodedValue, FormatError> {
        let expected = element_count(shape)?;
        let actual = self.len();
        let dims: Vec<usize> = shape.iter().map(|&d| d as usize).collect();
        let mut values = self.into_scalars().into_iter();
        match nest(&mut values, &dims) {
            Some(value) if values.as_slice().is_empty() => Ok(value),
            _ => Err(FormatError::DataSizeMismatch { expected, actual }),
        }
    }
}

fn nest(values: &mut std::vec::IntoIter<Scalar>, shape: &[usize]) -> Option<DecodedValue> {
    match shape.split_first() {
        None => values.next().map(DecodedValue::Scalar),
        Some((&n, rest)) => (0..n)
            .map(|_| nest(values, rest))
            .collect::<Option<Vec<_>>>()
            .map(DecodedValue::Array),
    }
}

/// Number of elements in `shape` (1 for a scalar).
pub fn element_count(shape: &[u64]) -> Result<usize, FormatError> {
    shape
        .iter()
        .try_fold(1usize, |acc, &d| {
            usize::try_from(d).ok().and_then(|d| acc.checked_mul(d))
        })
        .ok_or_else(|| FormatError::InvalidSelection(format!("shape {shape:?} is too large")))
}

/// Decode `bytes` as elements of `datatype` laid out row-major under `shape`.
///
/// `bytes` must hold exactly one element per shape position. An empty shape
/// yields a single scalar.
pub fn decode(bytes: &[u8], datatype: &Datatype, shape: &[u64]) -> Result<DecodedValue, FormatError> {
    let count = element_count(shape)?;
    decode_flat(bytes, datatype, count)?.into_shaped(shape)
}

/// Decode `count` consecutive elements of `datatype`.
pub fn decode_flat(bytes: &[u8], datatype: &Datatype, count: usize) -> Result<HostArray, FormatError> {
    let size = datatype.element_size();
    let expected = count
        .checked_mul(size)
        .ok_or_else(|| datatype.unsupported())?;
    if bytes.len() != expected {
        return Err(FormatError::DataSizeMismatch {
            expected,
            actual: bytes.len(),
        });
    }

    match *datatype {
        Datatype::FixedPoint {
            size,
            signed,
            byte_order,
        } => {
            let order = numeric_order(datatype, byte_order)?;
            Ok(match (size, signed) {
                (1, true) => HostArray::I8(read_elements(bytes, order)),
                (2, true) => HostArray::I16(read_elements(bytes, order)),
                (4, true) => HostArray::I32(read_elements(bytes, order)),
                (8, true) => HostArray::I64(read_elements(bytes, order)),
                (1, false) => HostArray::I16(widen::<u8, i16>(bytes, order)),
                (2, false) => HostArray::I32(widen::<u16, i32>(bytes, order)),
                (4, false) => HostArray::I64(widen::<u32, i64>(bytes, order)),
                (8, false) => HostArray::U128(read_u64_magnitudes(bytes, order)),
                _ => return Err(datatype.unsupported()),
            })
        }
        Datatype::FloatingPoint { size, byte_order } => {
            let order = numeric_order(datatype, byte_order)?;
            Ok(match size {
                4 => HostArray::F32(read_elements(bytes, order)),
                8 => HostArray::F64(read_elements(bytes, order)),
                _ => return Err(datatype.unsupported()),
            })
        }
        Datatype::FixedLengthString {
            size,
            padding,
            charset,
        } => Ok(HostArray::Text(
            elements(bytes, size as usize, count)
                .map(|raw| decode_text(trim_fixed(raw, padding), charset))
                .collect(),
        )),
        Datatype::VariableLengthString {
            element_size,
            charset,
        } => Ok(HostArray::Text(
            elements(bytes, element_size as usize, count)
                .map(|raw| decode_text(raw, charset))
                .collect(),
        )),
    }
}

fn numeric_order(datatype: &Datatype, order: ByteOrder) -> Result<ByteOrder, FormatError> {
    match order {
        ByteOrder::Vax => Err(datatype.unsupported()),
        other => Ok(other),
    }
}

/// Fixed-width element that can be byte swapped.
trait Element: Pod {
    fn swap(self) -> Self;
}

macro_rules! int_element {
    ($($t:ty),*) => {
        $(impl Element for $t {
            fn swap(self) -> Self {
                self.swap_bytes()
            }
        })*
    };
}

int_element!(i8, i16, i32, i64, u8, u16, u32, u64);

impl Element for f32 {
    fn swap(self) -> Self {
        f32::from_bits(self.to_bits().swap_bytes())
    }
}

impl Element for f64 {
    fn swap(self) -> Self {
        f64::from_bits(self.to_bits().swap_bytes())
    }
}

/// Bulk copy into `T`, then swap every element if `order` is foreign.
fn read_elements<T: Element>(bytes: &[u8], order: ByteOrder) -> Vec<T> {
    let mut out: Vec<T> = bytemuck::allocation::pod_collect_to_vec(bytes);
    if !order.is_native() {
        for v in &mut out {
            *v = v.swap();
        }
    }
    out
}

fn widen<S: Element, H: From<S>>(bytes: &[u8], order: ByteOrder) -> Vec<H> {
    read_elements::<S>(bytes, order)
        .into_iter()
        .map(H::from)
        .collect()
}

/// Unsigned 64-bit elements: normalize each to big-endian, then read the
/// bytes as an unsigned magnitude.
fn read_u64_magnitudes(bytes: &[u8], order: ByteOrder) -> Vec<u128> {
    bytes
        .chunks_exact(8)
        .map(|raw| {
            let mut be = [0u8; 8];
            be.copy_from_slice(raw);
            if order == ByteOrder::LittleEndian {
                be.reverse();
            }
            be.iter().fold(0u128, |acc, &b| acc << 8 | u128::from(b))
        })
        .collect()
}

fn elements(bytes: &[u8], size: usize, count: usize) -> impl Iterator<Item = &[u8]> {
    (0..count).map(move |i| &bytes[i * size..(i + 1) * size])
}

/// Cut a fixed-length string at its first NUL; space-padded strings also
/// lose trailing spaces.
fn trim_fixed(raw: &[u8], padding: StringPadding) -> &[u8] {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    let text = &raw[..end];
    match padding {
        StringPadding::SpacePad => {
            let end = text.iter().rposition(|&b| b != b' ').map_or(0, |p| p + 1);
            &text[..end]
        }
        StringPadding::NullTerminate | StringPadding::NullPad => text,
    }
}

fn decode_text(raw: &[u8], charset: CharacterSet) -> String {
    match charset {
        CharacterSet::Utf8 => String::from_utf8_lossy(raw).into_owned(),
        CharacterSet::Ascii => raw
            .iter()
            .map(|&b| if b.is_ascii() { b as char } else { char::REPLACEMENT_CHARACTER })
            .collect(),
    }
}
