//! The `#GUID` heap.
//!
//! A sequence of 16-byte records addressed by a 1-based record number; 0 means "no GUID".

use std::collections::HashMap;

use crate::{Error::OutOfBounds, Result};

/// Read-only view of a `#GUID` heap.
#[derive(Clone, Copy)]
pub struct Guid<'a> {
    data: &'a [u8],
}

impl<'a> Guid<'a> {
    /// Wrap heap bytes. An empty slice is accepted.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the heap is not a whole number of records.
    pub fn from(data: &'a [u8]) -> Result<Guid<'a>> {
        if data.len() % 16 != 0 {
            return Err(malformed_error!(
                "#GUID heap size {} is not a multiple of 16",
                data.len()
            ));
        }

        Ok(Guid { data })
    }

    /// The GUID with 1-based record number `index`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] for index 0 or an index past the last record.
    pub fn get(&self, index: usize) -> Result<uguid::Guid> {
        if index < 1 || index * 16 > self.data.len() {
            return Err(OutOfBounds);
        }

        let offset_start = (index - 1) * 16;
        let mut buffer = [0u8; 16];
        buffer.copy_from_slice(&self.data[offset_start..offset_start + 16]);

        Ok(uguid::Guid::from_bytes(buffer))
    }

    /// Number of records.
    #[must_use]
    pub fn count(&self) -> usize {
        self.data.len() / 16
    }
}

/// Deduplicating `#GUID` writer.
#[derive(Debug, Clone, Default)]
pub struct GuidBuilder {
    data: Vec<u8>,
    indices: HashMap<uguid::Guid, u32>,
}

impl GuidBuilder {
    /// Create an empty heap.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `guid` and return its 1-based record number.
    #[allow(clippy::cast_possible_truncation)]
    pub fn add(&mut self, guid: uguid::Guid) -> u32 {
        if let Some(index) = self.indices.get(&guid) {
            return *index;
        }

        self.data.extend_from_slice(&guid.to_bytes());
        let index = (self.data.len() / 16) as u32;
        self.indices.insert(guid, index);
        index
    }

    /// Size of the heap in bytes, always a multiple of 16.
    #[must_use]
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Whether the heap holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Whether record numbers need four bytes.
    #[must_use]
    pub fn is_wide(&self) -> bool {
        self.size() > usize::from(u16::MAX)
    }

    /// The heap bytes.
    #[must_use]
    pub fn finish(&self) -> Vec<u8> {
        self.data.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crafted() {
        #[rustfmt::skip]
        let data : [u8; 48] = [
            /* 1 */  0x8e, 0x90, 0x37, 0xd4, 0xe6, 0x65, 0x7c, 0x48, 0x97, 0x35, 0x7b, 0xdf, 0xf6, 0x99, 0xbe, 0xa5,
            /* 2 */  0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA,
            /* 3 */  0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        ];

        let guids = Guid::from(&data).unwrap();
        assert_eq!(guids.count(), 3);
        assert_eq!(
            guids.get(1).unwrap(),
            uguid::guid!("d437908e-65e6-487c-9735-7bdff699bea5")
        );
        assert_eq!(
            guids.get(2).unwrap(),
            uguid::guid!("AAAAAAAA-AAAA-AAAA-AAAA-AAAAAAAAAAAA")
        );
        assert_eq!(guids.get(3).unwrap(), uguid::Guid::ZERO);
        assert!(guids.get(0).is_err());
        assert!(guids.get(4).is_err());
        assert!(Guid::from(&data[..20]).is_err());
    }

    #[test]
    fn builder_dedup() {
        let first = uguid::guid!("d437908e-65e6-487c-9735-7bdff699bea5");
        let second = uguid::guid!("01234567-89ab-cdef-0123-456789abcdef");

        let mut builder = GuidBuilder::new();
        assert!(builder.is_empty());
        assert_eq!(builder.add(first), 1);
        assert_eq!(builder.add(second), 2);
        assert_eq!(builder.add(first), 1);
        assert_eq!(builder.size(), 32);

        let data = builder.finish();
        let view = Guid::from(&data).unwrap();
        assert_eq!(view.get(2).unwrap(), second);
    }
}
