//! Low-level little-endian reading and writing for PE and CLI metadata structures.
//!
//! Everything in a .NET image is little-endian. This module provides the bounds-checked
//! primitives the rest of the crate builds on:
//!
//! - [`CilIO`] - trait implemented for all integer and floating point primitives
//! - [`read_le`], [`read_le_at`], [`read_le_at_dyn`] - slice based reading with offset tracking
//! - [`write_le_at`], [`write_le_at_dyn`] - patching values into an existing buffer
//! - [`CilWrite`] - appending values, compressed integers and padding to a growable buffer
//! - [`align_to`], [`compressed_uint_size`] - size arithmetic shared by the layout code
//!
//! # Compressed integers
//!
//! ECMA-335 §II.23.2 encodes unsigned integers in one, two or four bytes depending on their
//! magnitude:
//!
//! | Range                 | Encoding                              |
//! |-----------------------|---------------------------------------|
//! | `0x00..=0x7F`         | `0bbbbbbb`                            |
//! | `0x80..=0x3FFF`       | `10bbbbbb bbbbbbbb`                   |
//! | `0x4000..=0x1FFFFFFF` | `110bbbbb bbbbbbbb bbbbbbbb bbbbbbbb` |
//!
//! Signed integers rotate the sign bit into the least significant position before encoding.
//!
//! # Examples
//!
//! ```rust
//! use dotmeta::file::io::{read_le_at, CilWrite};
//!
//! let mut buffer = Vec::new();
//! buffer.write_le(0x0201_u16);
//! buffer.write_compressed_uint(0x80)?;
//! assert_eq!(buffer, [0x01, 0x02, 0x80, 0x80]);
//!
//! let mut offset = 0;
//! assert_eq!(read_le_at::<u16>(&buffer, &mut offset)?, 0x0201);
//! assert_eq!(offset, 2);
//! # Ok::<(), dotmeta::Error>(())
//! ```

use crate::{Error::OutOfBounds, Result};

/// Largest value representable as a compressed unsigned integer.
pub const MAX_COMPRESSED_UINT: u32 = 0x1FFF_FFFF;

/// Trait for primitives that can be converted to and from little-endian byte arrays.
pub trait CilIO: Sized {
    /// Fixed size byte representation of the type.
    type Bytes: Sized + AsRef<[u8]> + for<'a> TryFrom<&'a [u8]>;

    /// Build a value from its little-endian bytes.
    fn from_le_bytes(bytes: Self::Bytes) -> Self;

    /// Convert a value into its little-endian bytes.
    fn to_le_bytes(self) -> Self::Bytes;
}

macro_rules! impl_cilio {
    ($($ty:ty => $len:literal),* $(,)?) => {
        $(
            impl CilIO for $ty {
                type Bytes = [u8; $len];

                fn from_le_bytes(bytes: Self::Bytes) -> Self {
                    <$ty>::from_le_bytes(bytes)
                }

                fn to_le_bytes(self) -> Self::Bytes {
                    <$ty>::to_le_bytes(self)
                }
            }
        )*
    };
}

impl_cilio!(
    u8 => 1, i8 => 1,
    u16 => 2, i16 => 2,
    u32 => 4, i32 => 4,
    u64 => 8, i64 => 8,
    f32 => 4, f64 => 8,
);

/// Read `T` from the start of `data`.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if `data` is shorter than `T`.
pub fn read_le<T: CilIO>(data: &[u8]) -> Result<T> {
    let mut offset = 0_usize;
    read_le_at(data, &mut offset)
}

/// Read `T` at `offset` and advance the offset past it.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if the value does not fit inside `data`.
pub fn read_le_at<T: CilIO>(data: &[u8], offset: &mut usize) -> Result<T> {
    let type_len = std::mem::size_of::<T>();
    let Some(end) = offset.checked_add(type_len) else {
        return Err(OutOfBounds);
    };
    if end > data.len() {
        return Err(OutOfBounds);
    }

    let Ok(read) = data[*offset..end].try_into() else {
        return Err(OutOfBounds);
    };

    *offset = end;
    Ok(T::from_le_bytes(read))
}

/// Read a heap or table index that is either two or four bytes wide.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if the value does not fit inside `data`.
pub fn read_le_at_dyn(data: &[u8], offset: &mut usize, is_large: bool) -> Result<u32> {
    let res = if is_large {
        read_le_at::<u32>(data, offset)?
    } else {
        u32::from(read_le_at::<u16>(data, offset)?)
    };

    Ok(res)
}

/// Overwrite `T` at `offset` inside an existing buffer and advance the offset.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if the value does not fit inside `data`.
pub fn write_le_at<T: CilIO>(data: &mut [u8], offset: &mut usize, value: T) -> Result<()> {
    let bytes = value.to_le_bytes();
    let bytes = bytes.as_ref();
    let Some(end) = offset.checked_add(bytes.len()) else {
        return Err(OutOfBounds);
    };
    if end > data.len() {
        return Err(OutOfBounds);
    }

    data[*offset..end].copy_from_slice(bytes);
    *offset = end;
    Ok(())
}

/// Overwrite a two or four byte index inside an existing buffer.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if the value does not fit inside `data`, or
/// [`crate::Error::InvalidArgument`] if a narrow slot is asked to hold a value above `u16::MAX`.
pub fn write_le_at_dyn(
    data: &mut [u8],
    offset: &mut usize,
    value: u32,
    is_large: bool,
) -> Result<()> {
    if is_large {
        write_le_at::<u32>(data, offset, value)
    } else {
        let narrow = u16::try_from(value).map_err(|_| {
            crate::Error::InvalidArgument(format!("value 0x{value:x} does not fit a 2-byte index"))
        })?;
        write_le_at::<u16>(data, offset, narrow)
    }
}

/// Round `value` up to the next multiple of `alignment`.
///
/// An alignment of zero or one leaves the value unchanged.
#[must_use]
pub fn align_to(value: u64, alignment: u64) -> u64 {
    if alignment <= 1 {
        return value;
    }
    value.div_ceil(alignment) * alignment
}

/// Number of bytes a compressed unsigned integer occupies.
#[must_use]
pub fn compressed_uint_size(value: u32) -> usize {
    if value < 0x80 {
        1
    } else if value < 0x4000 {
        2
    } else {
        4
    }
}

/// Appending writer used by every encoder in the crate.
///
/// Implemented for `Vec<u8>`; all values are written little-endian except compressed integers,
/// which are big-endian by definition.
pub trait CilWrite {
    /// Append `value` in little-endian order.
    fn write_le<T: CilIO>(&mut self, value: T);

    /// Append a two or four byte index.
    fn write_le_dyn(&mut self, value: u32, is_large: bool);

    /// Append an ECMA-335 compressed unsigned integer.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidArgument`] for values above [`MAX_COMPRESSED_UINT`].
    fn write_compressed_uint(&mut self, value: u32) -> Result<()>;

    /// Append an ECMA-335 compressed signed integer.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidArgument`] for values outside `-2^28..2^28`.
    fn write_compressed_int(&mut self, value: i32) -> Result<()>;

    /// Append a `SerString`: `0xFF` for `None`, else a compressed length and the UTF-8 bytes.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidArgument`] if the string is too long for a compressed
    /// length.
    fn write_ser_string(&mut self, value: Option<&str>) -> Result<()>;

    /// Append `count` zero bytes.
    fn write_zeros(&mut self, count: usize);

    /// Append zero bytes until the length is a multiple of `alignment`.
    fn pad_to(&mut self, alignment: usize);
}

impl CilWrite for Vec<u8> {
    fn write_le<T: CilIO>(&mut self, value: T) {
        self.extend_from_slice(value.to_le_bytes().as_ref());
    }

    #[allow(clippy::cast_possible_truncation)]
    fn write_le_dyn(&mut self, value: u32, is_large: bool) {
        if is_large {
            self.write_le(value);
        } else {
            self.write_le(value as u16);
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn write_compressed_uint(&mut self, value: u32) -> Result<()> {
        match value {
            0..=0x7F => self.push(value as u8),
            0x80..=0x3FFF => {
                self.push(0x80 | (value >> 8) as u8);
                self.push(value as u8);
            }
            0x4000..=MAX_COMPRESSED_UINT => {
                self.push(0xC0 | (value >> 24) as u8);
                self.push((value >> 16) as u8);
                self.push((value >> 8) as u8);
                self.push(value as u8);
            }
            _ => {
                return Err(crate::Error::InvalidArgument(format!(
                    "0x{value:x} is too large for a compressed integer"
                )))
            }
        }
        Ok(())
    }

    #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
    fn write_compressed_int(&mut self, value: i32) -> Result<()> {
        // The sign bit is rotated into bit 0 over a width chosen by magnitude.
        let (mask, bits) = if (-0x40..0x40).contains(&value) {
            (0x7F_u32, 7)
        } else if (-0x2000..0x2000).contains(&value) {
            (0x3FFF_u32, 14)
        } else if (-0x1000_0000..0x1000_0000).contains(&value) {
            (0x1FFF_FFFF_u32, 29)
        } else {
            return Err(crate::Error::InvalidArgument(format!(
                "{value} is out of range for a compressed signed integer"
            )));
        };

        let raw = value as u32 & mask;
        let rotated = ((raw << 1) | (raw >> (bits - 1))) & mask;
        match bits {
            7 => self.push(rotated as u8),
            14 => {
                self.push(0x80 | (rotated >> 8) as u8);
                self.push(rotated as u8);
            }
            _ => {
                self.push(0xC0 | (rotated >> 24) as u8);
                self.push((rotated >> 16) as u8);
                self.push((rotated >> 8) as u8);
                self.push(rotated as u8);
            }
        }
        Ok(())
    }

    fn write_ser_string(&mut self, value: Option<&str>) -> Result<()> {
        match value {
            None => self.push(0xFF),
            Some(value) => {
                let length = u32::try_from(value.len()).map_err(|_| {
                    crate::Error::InvalidArgument("serialized string is too long".to_string())
                })?;
                self.write_compressed_uint(length)?;
                self.extend_from_slice(value.as_bytes());
            }
        }
        Ok(())
    }

    fn write_zeros(&mut self, count: usize) {
        self.resize(self.len() + count, 0);
    }

    fn pad_to(&mut self, alignment: usize) {
        if alignment > 1 {
            let remainder = self.len() % alignment;
            if remainder != 0 {
                self.write_zeros(alignment - remainder);
            }
        }
    }
}
