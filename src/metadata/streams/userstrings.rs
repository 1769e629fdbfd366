//! The `#US` (user string) heap.
//!
//! String literals loaded by `ldstr`. Each entry is a compressed length, the UTF-16LE code
//! units, and one terminal byte that is 1 when any code unit has a non-zero high byte or a low
//! byte in `0x01..=0x08`, `0x0E..=0x1F`, `0x27`, `0x2D` or `0x7F`.

use std::collections::HashMap;

use widestring::U16Str;

use crate::{
    file::{io::CilWrite, parser::Parser},
    Error::OutOfBounds,
    Result,
};

/// Largest heap offset an `ldstr` token can address.
pub const MAX_USER_STRING_OFFSET: usize = 0x00FF_FFFF;

/// Read-only view of a `#US` heap.
#[derive(Clone, Copy)]
pub struct UserStrings<'a> {
    data: &'a [u8],
}

impl<'a> UserStrings<'a> {
    /// Wrap heap bytes. An empty slice is accepted.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the heap does not start with a zero byte.
    pub fn from(data: &'a [u8]) -> Result<UserStrings<'a>> {
        if !data.is_empty() && data[0] != 0 {
            return Err(malformed_error!("Provided #US heap does not start with a zero byte"));
        }

        Ok(UserStrings { data })
    }

    /// The string at byte offset `index`. Unpaired surrogates are replaced.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the entry leaves the heap.
    pub fn get(&self, index: usize) -> Result<String> {
        if index == 0 {
            return Ok(String::new());
        }
        if index >= self.data.len() {
            return Err(OutOfBounds);
        }

        let mut parser = Parser::new(&self.data[index..]);
        let length = parser.read_compressed_uint()? as usize;
        let bytes = parser.read_bytes(length)?;

        // The odd trailing byte is the terminal flag.
        let units: Vec<u16> = bytes
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        Ok(U16Str::from_slice(&units).to_string_lossy())
    }

    /// Size of the heap in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the heap has no bytes at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

fn needs_special_handling(units: &[u16]) -> bool {
    units.iter().any(|unit| {
        let [low, high] = unit.to_le_bytes();
        high != 0 || matches!(low, 0x01..=0x08 | 0x0E..=0x1F | 0x27 | 0x2D | 0x7F)
    })
}

/// Deduplicating `#US` writer.
#[derive(Debug, Clone)]
pub struct UserStringsBuilder {
    data: Vec<u8>,
    offsets: HashMap<String, u32>,
}

impl Default for UserStringsBuilder {
    fn default() -> Self {
        UserStringsBuilder {
            data: vec![0],
            offsets: HashMap::new(),
        }
    }
}

impl UserStringsBuilder {
    /// Create a heap holding only the leading zero byte.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `value` and return its offset. Every string, including the empty one, gets
    /// its own entry so that it can be referenced by an `ldstr` token.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidArgument`] once the heap outgrows the 24-bit token range.
    #[allow(clippy::cast_possible_truncation)]
    pub fn add(&mut self, value: &str) -> Result<u32> {
        if let Some(offset) = self.offsets.get(value) {
            return Ok(*offset);
        }

        let offset = self.data.len();
        if offset > MAX_USER_STRING_OFFSET {
            return Err(crate::Error::InvalidArgument(
                "#US heap exceeds the range addressable by ldstr tokens".to_string(),
            ));
        }

        let units: Vec<u16> = value.encode_utf16().collect();
        let length = u32::try_from(units.len() * 2 + 1)
            .map_err(|_| crate::Error::InvalidArgument("user string too long".to_string()))?;
        self.data.write_compressed_uint(length)?;
        for unit in &units {
            self.data.write_le(*unit);
        }
        self.data.push(u8::from(needs_special_handling(&units)));

        self.offsets.insert(value.to_string(), offset as u32);
        Ok(offset as u32)
    }

    /// Size of the heap once padded to a 4-byte boundary.
    #[must_use]
    pub fn size(&self) -> usize {
        self.data.len().next_multiple_of(4)
    }

    /// Whether only the leading zero byte is present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.len() == 1
    }

    /// The heap bytes padded to a 4-byte boundary.
    #[must_use]
    pub fn finish(&self) -> Vec<u8> {
        let mut data = self.data.clone();
        data.pad_to(4);
        data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crafted() {
        #[rustfmt::skip]
        let data: [u8; 32] = [
            0x00,
            0x1b, 0x48, 0x00, 0x65, 0x00, 0x6c, 0x00, 0x6c, 0x00, 0x6f, 0x00, 0x2c, 0x00, 0x20, 0x00,
            0x57, 0x00, 0x6f, 0x00, 0x72, 0x00, 0x6c, 0x00, 0x64, 0x00, 0x21, 0x00, 0x00,
            0x01, 0x00,
            0x00,
        ];

        let view = UserStrings::from(&data).unwrap();
        assert_eq!(view.get(1).unwrap(), "Hello, World!");
        assert_eq!(view.get(29).unwrap(), "");
        assert!(view.get(32).is_err());
        assert!(UserStrings::from(&[0x22]).is_err());
    }

    #[test]
    fn terminal_byte() {
        let mut builder = UserStringsBuilder::new();
        let plain = builder.add("abc").unwrap();
        let quote = builder.add("it's").unwrap();
        let wide = builder.add("\u{00e9}\u{4e2d}").unwrap();

        let data = builder.finish();
        // length 7: three code units plus the terminal byte
        assert_eq!(data[plain as usize], 7);
        assert_eq!(data[plain as usize + 7], 0);
        assert_eq!(data[quote as usize + 9], 1);
        assert_eq!(data[wide as usize + 5], 1);

        let view = UserStrings::from(&data).unwrap();
        assert_eq!(view.get(wide as usize).unwrap(), "\u{00e9}\u{4e2d}");
    }

    #[test]
    fn builder_dedup() {
        let mut builder = UserStringsBuilder::new();
        assert!(builder.is_empty());
        let a = builder.add("Hello").unwrap();
        let b = builder.add("World").unwrap();
        assert_eq!(builder.add("Hello").unwrap(), a);
        assert_ne!(a, b);

        let empty = builder.add("").unwrap();
        assert_ne!(empty, 0);
        let data = builder.finish();
        assert_eq!(&data[empty as usize..empty as usize + 2], &[0x01, 0x00]);
    }
}
