//! The `#Blob` heap.
//!
//! Binary values (signatures, constants, custom attribute data, public keys) prefixed with
//! their compressed length. Offset 0 is the empty blob.

use std::collections::HashMap;

use crate::{
    file::{io::CilWrite, parser::Parser},
    Error::OutOfBounds,
    Result,
};

/// Read-only view of a `#Blob` heap.
#[derive(Clone, Copy)]
pub struct Blob<'a> {
    data: &'a [u8],
}

impl<'a> Blob<'a> {
    /// Wrap heap bytes. An empty slice is accepted and only resolves offset 0.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the heap does not start with a zero byte.
    pub fn from(data: &'a [u8]) -> Result<Blob<'a>> {
        if !data.is_empty() && data[0] != 0 {
            return Err(malformed_error!("Provided #Blob heap does not start with a zero byte"));
        }

        Ok(Blob { data })
    }

    /// The blob at byte offset `index`, without its length prefix.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the offset or the declared length leave the
    /// heap.
    pub fn get(&self, index: usize) -> Result<&'a [u8]> {
        if index == 0 {
            return Ok(&[]);
        }
        if index >= self.data.len() {
            return Err(OutOfBounds);
        }

        let mut parser = Parser::new(&self.data[index..]);
        let length = parser.read_compressed_uint()? as usize;
        parser.read_bytes(length)
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

/// Deduplicating `#Blob` writer.
#[derive(Debug, Clone)]
pub struct BlobBuilder {
    data: Vec<u8>,
    offsets: HashMap<Vec<u8>, u32>,
}

impl Default for BlobBuilder {
    fn default() -> Self {
        BlobBuilder {
            data: vec![0],
            offsets: HashMap::new(),
        }
    }
}

impl BlobBuilder {
    /// Create a heap holding only the empty blob.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `value` and return its offset. The empty blob is always offset 0.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidArgument`] if the blob is too large for a compressed
    /// length prefix.
    #[allow(clippy::cast_possible_truncation)]
    pub fn add(&mut self, value: &[u8]) -> Result<u32> {
        if value.is_empty() {
            return Ok(0);
        }
        if let Some(offset) = self.offsets.get(value) {
            return Ok(*offset);
        }

        let length = u32::try_from(value.len())
            .map_err(|_| crate::Error::InvalidArgument("blob too large".to_string()))?;
        let offset = self.data.len() as u32;
        self.data.write_compressed_uint(length)?;
        self.data.extend_from_slice(value);
        self.offsets.insert(value.to_vec(), offset);
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crafted() {
        #[rustfmt::skip]
        let data = [
            0x00,
            0x03, 0x20, 0x00, 0x01,
            0x08, 0xB7, 0x7A, 0x5C, 0x56, 0x19, 0x34, 0xE0, 0x89,
            0x00,
        ];

        let view = Blob::from(&data).unwrap();
        assert_eq!(view.get(0).unwrap(), &[] as &[u8]);
        assert_eq!(view.get(1).unwrap(), &[0x20, 0x00, 0x01]);
        assert_eq!(
            view.get(5).unwrap(),
            &[0xB7, 0x7A, 0x5C, 0x56, 0x19, 0x34, 0xE0, 0x89]
        );
        assert_eq!(view.get(14).unwrap(), &[] as &[u8]);
        assert!(view.get(15).is_err());
    }

    #[test]
    fn truncated() {
        let data = [0x00, 0x05, 0x01, 0x02];
        let view = Blob::from(&data).unwrap();
        assert!(view.get(1).is_err());
        assert!(Blob::from(&[0x01]).is_err());
    }

    #[test]
    fn builder_dedup() {
        let mut builder = BlobBuilder::new();
        let a = builder.add(&[0x06, 0x08]).unwrap();
        let b = builder.add(&[0x20, 0x00, 0x01]).unwrap();
        let c = builder.add(&[0x06, 0x08]).unwrap();

        assert_eq!(a, 1);
        assert_eq!(b, 4);
        assert_eq!(a, c);
        assert_eq!(builder.add(&[]).unwrap(), 0);

        let large = vec![0xAB; 0x90];
        let d = builder.add(&large).unwrap();
        assert_eq!(d, 8);

        let data = builder.finish();
        assert_eq!(data.len() % 4, 0);
        let view = Blob::from(&data).unwrap();
        assert_eq!(view.get(a as usize).unwrap(), &[0x06, 0x08]);
        assert_eq!(view.get(b as usize).unwrap(), &[0x20, 0x00, 0x01]);
        assert_eq!(view.get(d as usize).unwrap(), large.as_slice());
    }
}
