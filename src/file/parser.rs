//! Cursor based byte stream parser for CLI metadata.
//!
//! [`Parser`] walks a byte slice and decodes the primitive encodings used across ECMA-335
//! structures: little-endian integers, compressed integers, compressed `TypeDefOrRefOrSpec`
//! tokens, null-terminated and length-prefixed strings. Every read is bounds-checked and
//! fails with [`crate::Error::OutOfBounds`] instead of panicking.
//!
//! # Examples
//!
//! ```rust
//! use dotmeta::Parser;
//!
//! let data = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08];
//! let mut parser = Parser::new(&data);
//!
//! let first = parser.read_le::<u32>()?;
//! assert_eq!(first, 0x04030201);
//!
//! parser.seek(6)?;
//! assert_eq!(parser.read_le::<u16>()?, 0x0807);
//! assert!(!parser.has_more_data());
//! # Ok::<(), dotmeta::Error>(())
//! ```

use crate::{
    file::io::{read_le_at, CilIO},
    metadata::tables::{TableId, TableIndex},
    Error::OutOfBounds,
    Result,
};

/// A bounds-checked cursor over a byte slice.
pub struct Parser<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> Parser<'a> {
    /// Create a parser positioned at the start of `data`.
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Parser { data, position: 0 }
    }

    /// Total length of the underlying data.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the underlying data is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Whether unread bytes remain.
    #[must_use]
    pub fn has_more_data(&self) -> bool {
        self.position < self.data.len()
    }

    /// Number of unread bytes.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.position)
    }

    /// Move the cursor to an absolute position. Seeking to the end is allowed.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if `pos` lies beyond the data.
    pub fn seek(&mut self, pos: usize) -> Result<()> {
        if pos > self.data.len() {
            return Err(OutOfBounds);
        }

        self.position = pos;
        Ok(())
    }

    /// Skip one byte.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] at the end of the data.
    pub fn advance(&mut self) -> Result<()> {
        self.advance_by(1)
    }

    /// Skip `step` bytes.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if fewer than `step` bytes remain.
    pub fn advance_by(&mut self, step: usize) -> Result<()> {
        if step > self.remaining() {
            return Err(OutOfBounds);
        }

        self.position += step;
        Ok(())
    }

    /// Current cursor position.
    #[must_use]
    pub fn pos(&self) -> usize {
        self.position
    }

    /// The complete underlying data, independent of the cursor.
    #[must_use]
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Look at the next byte without consuming it.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] at the end of the data.
    pub fn peek_byte(&self) -> Result<u8> {
        self.data.get(self.position).copied().ok_or(OutOfBounds)
    }

    /// Look at the next value without consuming it.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if not enough bytes remain.
    pub fn peek_le<T: CilIO>(&self) -> Result<T> {
        let mut temp_position = self.position;
        read_le_at::<T>(self.data, &mut temp_position)
    }

    /// Advance the cursor to the next multiple of `alignment`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the aligned position lies beyond the data.
    pub fn align(&mut self, alignment: usize) -> Result<()> {
        let padding = (alignment - (self.position % alignment)) % alignment;
        self.advance_by(padding)
    }

    /// Read a little-endian primitive.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if not enough bytes remain.
    pub fn read_le<T: CilIO>(&mut self) -> Result<T> {
        read_le_at::<T>(self.data, &mut self.position)
    }

    fn read_compressed(&mut self) -> Result<(u32, u32)> {
        let first_byte = self.read_le::<u8>()?;

        // 1-byte encoding: 0xxxxxxx
        if (first_byte & 0x80) == 0 {
            return Ok((u32::from(first_byte), 7));
        }

        // 2-byte encoding: 10xxxxxx xxxxxxxx
        if (first_byte & 0xC0) == 0x80 {
            let second_byte = self.read_le::<u8>()?;
            let value = ((u32::from(first_byte) & 0x3F) << 8) | u32::from(second_byte);
            return Ok((value, 14));
        }

        // 4-byte encoding: 110xxxxx xxxxxxxx xxxxxxxx xxxxxxxx
        if (first_byte & 0xE0) == 0xC0 {
            let b1 = u32::from(self.read_le::<u8>()?);
            let b2 = u32::from(self.read_le::<u8>()?);
            let b3 = u32::from(self.read_le::<u8>()?);
            let value = ((u32::from(first_byte) & 0x1F) << 24) | (b1 << 16) | (b2 << 8) | b3;
            return Ok((value, 29));
        }

        Err(malformed_error!("Invalid compressed uint - {}", first_byte))
    }

    /// Read an ECMA-335 compressed unsigned integer.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for an invalid lead byte, or
    /// [`crate::Error::OutOfBounds`] if the encoding is truncated.
    pub fn read_compressed_uint(&mut self) -> Result<u32> {
        Ok(self.read_compressed()?.0)
    }

    /// Read an ECMA-335 compressed signed integer.
    ///
    /// The sign bit sits in bit 0 of the encoded value and is rotated back across the width of
    /// the encoding (7, 14 or 29 bits).
    ///
    /// # Errors
    /// Same as [`Parser::read_compressed_uint`].
    #[allow(clippy::cast_possible_wrap)]
    pub fn read_compressed_int(&mut self) -> Result<i32> {
        let (raw, bits) = self.read_compressed()?;
        let magnitude = raw >> 1;
        if raw & 1 == 0 {
            Ok(magnitude as i32)
        } else {
            let sign_extension = !0_u32 << (bits - 1);
            Ok((magnitude | sign_extension) as i32)
        }
    }

    /// Read a compressed `TypeDefOrRefOrSpec` token as used inside signatures.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for the reserved tag value or a null row.
    pub fn read_compressed_token(&mut self) -> Result<TableIndex> {
        let compressed_token = self.read_compressed_uint()?;

        let table = match compressed_token & 0x3 {
            0x0 => TableId::TypeDef,
            0x1 => TableId::TypeRef,
            0x2 => TableId::TypeSpec,
            _ => {
                return Err(malformed_error!(
                    "Invalid compressed token - {}",
                    compressed_token
                ))
            }
        };

        let row = compressed_token >> 2;
        if row == 0 {
            return Err(malformed_error!("Null compressed token in signature"));
        }

        Ok(TableIndex::new(table, row - 1))
    }

    /// Read a null-terminated UTF-8 string. A missing terminator ends the string at the end of
    /// the data.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for invalid UTF-8.
    pub fn read_string_utf8(&mut self) -> Result<String> {
        let start = self.position;
        let end = self.data[start..]
            .iter()
            .position(|byte| *byte == 0)
            .map_or(self.data.len(), |relative| start + relative);

        self.position = if end < self.data.len() { end + 1 } else { end };

        std::str::from_utf8(&self.data[start..end])
            .map(str::to_string)
            .map_err(|e| malformed_error!("Invalid UTF-8 string at offset {}: {}", start, e))
    }

    /// Read a `SerString`: a compressed length followed by UTF-8 bytes, where a single `0xFF`
    /// byte denotes the null string.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for invalid UTF-8 or a bad length prefix.
    pub fn read_ser_string(&mut self) -> Result<Option<String>> {
        if self.peek_byte()? == 0xFF {
            self.advance()?;
            return Ok(None);
        }

        let length = self.read_compressed_uint()? as usize;
        let bytes = self.read_bytes(length)?;
        std::str::from_utf8(bytes)
            .map(|value| Some(value.to_string()))
            .map_err(|e| malformed_error!("Invalid UTF-8 in serialized string: {}", e))
    }

    /// Read `length` raw bytes.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if fewer than `length` bytes remain.
    pub fn read_bytes(&mut self, length: usize) -> Result<&'a [u8]> {
        if length > self.remaining() {
            return Err(OutOfBounds);
        }

        let bytes = &self.data[self.position..self.position + length];
        self.position += length;
        Ok(bytes)
    }

    /// Consume and return every unread byte.
    pub fn read_remaining(&mut self) -> &'a [u8] {
        let bytes = &self.data[self.position..];
        self.position = self.data.len();
        bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn navigation() {
        let data = [0x01, 0x02, 0x03, 0x04, 0x05];
        let mut parser = Parser::new(&data);

        assert_eq!(parser.len(), 5);
        assert_eq!(parser.peek_byte().unwrap(), 0x01);
        parser.advance().unwrap();
        assert_eq!(parser.pos(), 1);
        parser.align(4).unwrap();
        assert_eq!(parser.pos(), 4);
        assert_eq!(parser.peek_le::<u8>().unwrap(), 0x05);
        parser.seek(5).unwrap();
        assert!(!parser.has_more_data());
        assert!(parser.seek(6).is_err());
        assert!(parser.advance().is_err());
    }

    #[test]
    fn compressed_values() {
        let data = [0x03, 0x80, 0x80, 0xC0, 0x00, 0x40, 0x00, 0x7B];
        let mut parser = Parser::new(&data);

        assert_eq!(parser.read_compressed_uint().unwrap(), 0x03);
        assert_eq!(parser.read_compressed_uint().unwrap(), 0x80);
        assert_eq!(parser.read_compressed_uint().unwrap(), 0x4000);
        assert_eq!(parser.read_compressed_int().unwrap(), -3);

        let mut parser = Parser::new(&[0xFF]);
        assert!(parser.read_compressed_uint().is_err());
    }

    #[test]
    fn compressed_tokens() {
        // TypeRef row 1, TypeSpec row 2, TypeDef row 0x12
        let data = [0x05, 0x0A, 0x48, 0x03];
        let mut parser = Parser::new(&data);

        assert_eq!(
            parser.read_compressed_token().unwrap(),
            TableIndex::new(TableId::TypeRef, 0)
        );
        assert_eq!(
            parser.read_compressed_token().unwrap(),
            TableIndex::new(TableId::TypeSpec, 1)
        );
        assert_eq!(
            parser.read_compressed_token().unwrap(),
            TableIndex::new(TableId::TypeDef, 0x11)
        );
        assert!(parser.read_compressed_token().is_err());
    }

    #[test]
    fn strings() {
        let data = b"Hello\0World";
        let mut parser = Parser::new(data);
        assert_eq!(parser.read_string_utf8().unwrap(), "Hello");
        assert_eq!(parser.read_string_utf8().unwrap(), "World");
        assert!(!parser.has_more_data());

        let data = [0x03, b'a', b'b', b'c', 0xFF, 0x00];
        let mut parser = Parser::new(&data);
        assert_eq!(parser.read_ser_string().unwrap().as_deref(), Some("abc"));
        assert_eq!(parser.read_ser_string().unwrap(), None);
        assert_eq!(parser.read_ser_string().unwrap().as_deref(), Some(""));
    }

    #[test]
    fn bytes() {
        let data = [1, 2, 3, 4];
        let mut parser = Parser::new(&data);
        assert_eq!(parser.read_bytes(2).unwrap(), &[1, 2]);
        assert!(parser.read_bytes(3).is_err());
        assert_eq!(parser.read_remaining(), &[3, 4]);
        assert_eq!(parser.remaining(), 0);
    }
}
