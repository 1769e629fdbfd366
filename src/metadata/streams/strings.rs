//! The `#Strings` heap.
//!
//! UTF-8, null-terminated identifiers referenced by byte offset from table rows. Offset 0 is
//! always the empty string. [`Strings`] is a borrowed view used while reading;
//! [`StringsBuilder`] is the deduplicating writer.

use std::{collections::HashMap, ffi::CStr};

use crate::{file::io::CilWrite, Error::OutOfBounds, Result};

/// Read-only view of a `#Strings` heap.
#[derive(Clone, Copy)]
pub struct Strings<'a> {
    data: &'a [u8],
}

impl<'a> Strings<'a> {
    /// Wrap heap bytes. An empty slice is accepted and behaves like a heap holding only the
    /// empty string.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the heap does not start with a null byte.
    pub fn from(data: &'a [u8]) -> Result<Strings<'a>> {
        if !data.is_empty() && data[0] != 0 {
            return Err(malformed_error!("Provided #Strings heap does not start with a null byte"));
        }

        Ok(Strings { data })
    }

    /// The string at byte offset `index`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] for an offset past the heap and
    /// [`crate::Error::Malformed`] for unterminated or invalid UTF-8 data.
    pub fn get(&self, index: usize) -> Result<&'a str> {
        if index == 0 {
            return Ok("");
        }
        if index >= self.data.len() {
            return Err(OutOfBounds);
        }

        match CStr::from_bytes_until_nul(&self.data[index..]) {
            Ok(result) => result
                .to_str()
                .map_err(|_| malformed_error!("Invalid string at index - {}", index)),
            Err(_) => Err(malformed_error!("Unterminated string at index - {}", index)),
        }
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

/// Deduplicating `#Strings` writer.
///
/// Strings are stored in insertion order, each followed by a null byte. Registering a string
/// that is already present returns its earlier offset.
#[derive(Debug, Clone)]
pub struct StringsBuilder {
    data: Vec<u8>,
    offsets: HashMap<String, u32>,
}

impl Default for StringsBuilder {
    fn default() -> Self {
        StringsBuilder {
            data: vec![0],
            offsets: HashMap::new(),
        }
    }
}

impl StringsBuilder {
    /// Create a heap holding only the empty string.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `value` and return its offset. The empty string is always offset 0.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidArgument`] if `value` contains an interior null byte.
    #[allow(clippy::cast_possible_truncation)]
    pub fn add(&mut self, value: &str) -> Result<u32> {
        if value.is_empty() {
            return Ok(0);
        }
        if let Some(offset) = self.offsets.get(value) {
            return Ok(*offset);
        }
        if value.contains('\0') {
            return Err(crate::Error::InvalidArgument(format!(
                "string {value:?} contains a null character"
            )));
        }

        let offset = self.data.len() as u32;
        self.data.extend_from_slice(value.as_bytes());
        self.data.push(0);
        self.offsets.insert(value.to_string(), offset);
        Ok(offset)
    }

    /// Size of the heap once padded to a 4-byte boundary.
    #[must_use]
    pub fn size(&self) -> usize {
        self.data.len().next_multiple_of(4)
    }

    /// Whether offsets into this heap need four bytes.
    #[must_use]
    pub fn is_wide(&self) -> bool {
        self.size() > usize::from(u16::MAX)
    }

    /// The heap bytes padded to a 4-byte boundary.
    #[must_use]
    pub fn finish(&self) -> Vec<u8> {
        let mut data = self.data.clone();
        data.pad_to(4);
        data
    }
}
