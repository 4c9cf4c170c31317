//! Datatype message parsing (message type 0x0003) for the scalar classes the
//! decoder materializes: fixed-point, floating-point, fixed-length string and
//! variable-length string.

use std::fmt;

use byteorder::{ByteOrder as _, LittleEndian};

use crate::error::FormatError;

/// Byte order of stored numeric data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ByteOrder {
    LittleEndian,
    BigEndian,
    /// VAX mixed-endian floating point. Parsed, never decoded.
    Vax,
}

impl ByteOrder {
    /// Byte order of the executing platform.
    pub const fn native() -> Self {
        if cfg!(target_endian = "little") {
            ByteOrder::LittleEndian
        } else {
            ByteOrder::BigEndian
        }
    }

    /// Whether stored bytes can be used without swapping.
    pub fn is_native(self) -> bool {
        self == Self::native()
    }
}

/// How a fixed-length string fills unused bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StringPadding {
    NullTerminate,
    NullPad,
    SpacePad,
}

/// Text encoding of string data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CharacterSet {
    Ascii,
    Utf8,
}

/// Element type of a dataset.
///
/// Sizes outside what the decoder supports are still representable; they are
/// rejected with [`FormatError::UnsupportedType`] when decoded.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Datatype {
    /// Class 0: integer.
    FixedPoint {
        size: u32,
        signed: bool,
        byte_order: ByteOrder,
    },
    /// Class 1: IEEE float.
    FloatingPoint { size: u32, byte_order: ByteOrder },
    /// Class 3: fixed-length string.
    FixedLengthString {
        size: u32,
        padding: StringPadding,
        charset: CharacterSet,
    },
    /// Class 9 (string kind): each element is `element_size` bytes of text
    /// already resolved out of the global heap.
    VariableLengthString {
        element_size: u32,
        charset: CharacterSet,
    },
}

impl Datatype {
    /// Parse a datatype message. Returns the datatype and the number of bytes
    /// consumed.
    pub fn parse(data: &[u8]) -> Result<(Datatype, usize), FormatError> {
        ensure_len(data, 0, 8)?;
        let class_id = data[0] & 0x0F;
        let version = data[0] >> 4;
        if !(1..=4).contains(&version) {
            return Err(FormatError::InvalidDatatypeVersion(version));
        }
        let (bf0, bf1) = (data[1], data[2]);
        let size = LittleEndian::read_u32(&data[4..8]);
        let pos = 8;

        match class_id {
            0 => {
                ensure_len(data, pos, 4)?;
                let byte_order = if bf0 & 0x01 == 0 {
                    ByteOrder::LittleEndian
                } else {
                    ByteOrder::BigEndian
                };
                let signed = bf0 & 0x08 != 0;
                Ok((
                    Datatype::FixedPoint {
                        size,
                        signed,
                        byte_order,
                    },
                    pos + 4,
                ))
            }
            1 => {
                ensure_len(data, pos, 12)?;
                let byte_order = match (bf0 >> 6 & 0x01, bf0 & 0x01) {
                    (0, 0) => ByteOrder::LittleEndian,
                    (0, _) => ByteOrder::BigEndian,
                    _ => ByteOrder::Vax,
                };
                let exponent_size = data[pos + 5];
                let mantissa_size = data[pos + 7];
                let ieee = matches!(
                    (size, exponent_size, mantissa_size),
                    (4, 8, 23) | (8, 11, 52)
                );
                if (size == 4 || size == 8) && !ieee {
                    return Err(FormatError::UnsupportedType {
                        datatype: format!(
                            "{size}-byte float with {exponent_size}-bit exponent and {mantissa_size}-bit mantissa"
                        ),
                    });
                }
                Ok((Datatype::FloatingPoint { size, byte_order }, pos + 12))
            }
            3 => {
                let padding = parse_string_padding(bf0 & 0x0F)?;
                let charset = parse_charset(bf0 >> 4 & 0x0F)?;
                Ok((
                    Datatype::FixedLengthString {
                        size,
                        padding,
                        charset,
                    },
                    pos,
                ))
            }
            9 => {
                if bf0 & 0x0F != 1 {
                    return Err(FormatError::UnsupportedType {
                        datatype: "variable-length sequence".into(),
                    });
                }
                let charset = parse_charset(bf1 & 0x0F)?;
                // The base type (one byte character) follows; skip over it.
                let consumed = base_type_len(&data[pos..])?;
                Ok((
                    Datatype::VariableLengthString {
                        element_size: size,
                        charset,
                    },
                    pos + consumed,
                ))
            }
            other => Err(FormatError::UnsupportedType {
                datatype: format!("datatype class {other}"),
            }),
        }
    }

    /// Bytes occupied by one element.
    pub fn element_size(&self) -> usize {
        match *self {
            Datatype::FixedPoint { size, .. }
            | Datatype::FloatingPoint { size, .. }
            | Datatype::FixedLengthString { size, .. } => size as usize,
            Datatype::VariableLengthString { element_size, .. } => element_size as usize,
        }
    }

    /// Declared byte order for numeric types.
    pub fn byte_order(&self) -> Option<ByteOrder> {
        match *self {
            Datatype::FixedPoint { byte_order, .. } | Datatype::FloatingPoint { byte_order, .. } => {
                Some(byte_order)
            }
            _ => None,
        }
    }

    pub(crate) fn unsupported(&self) -> FormatError {
        FormatError::UnsupportedType {
            datatype: self.to_string(),
        }
    }
}

impl fmt::Display for Datatype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Datatype::FixedPoint {
                size,
                signed,
                byte_order,
            } => {
                let sign = if *signed { "signed" } else { "unsigned" };
                write!(f, "{size}-byte {sign} fixed-point ({byte_order:?})")
            }
            Datatype::FloatingPoint { size, byte_order } => {
                write!(f, "{size}-byte floating-point ({byte_order:?})")
            }
            Datatype::FixedLengthString {
                size,
                padding,
                charset,
            } => write!(f, "{size}-byte string ({padding:?}, {charset:?})"),
            Datatype::VariableLengthString {
                element_size,
                charset,
            } => write!(f, "variable-length string of {element_size} bytes ({charset:?})"),
        }
    }
}

fn ensure_len(data: &[u8], offset: usize, needed: usize) -> Result<(), FormatError> {
    if offset + needed > data.len() {
        Err(FormatError::UnexpectedEof {
            expected: offset + needed,
            available: data.len(),
        })
    } else {
        Ok(())
    }
}

fn parse_string_padding(val: u8) -> Result<StringPadding, FormatError> {
    match val {
        0 => Ok(StringPadding::NullTerminate),
        1 => Ok(StringPadding::NullPad),
        2 => Ok(StringPadding::SpacePad),
        _ => Err(FormatError::UnsupportedType {
            datatype: format!("string padding {val}"),
        }),
    }
}

fn parse_charset(val: u8) -> Result<CharacterSet, FormatError> {
    match val {
        0 => Ok(CharacterSet::Ascii),
        1 => Ok(CharacterSet::Utf8),
        _ => Err(FormatError::UnsupportedType {
            datatype: format!("character set {val}"),
        }),
    }
}

/// Length of a nested base-type message: header plus class properties.
fn base_type_len(data: &[u8]) -> Result<usize, FormatError> {
    ensure_len(data, 0, 8)?;
    let props = match data[0] & 0x0F {
        0 => 4,
        1 => 12,
        3 => 0,
        other => {
            return Err(FormatError::UnsupportedType {
                datatype: format!("variable-length string base class {other}"),
            })
        }
    };
    ensure_len(data, 8, props)?;
    Ok(8 + props)
}

/// Build a datatype header (8 bytes) for testing.
#[cfg(test)]
pub(crate) fn build_dt_header(class: u8, version: u8, bf: [u8; 3], size: u32) -> Vec<u8> {
    let mut buf = vec![0u8; 8];
    buf[0] = (class & 0x0F) | ((version & 0x0F) << 4);
    buf[1..4].copy_from_slice(&bf);
    LittleEndian::write_u32(&mut buf[4..8], size);
    buf
}
