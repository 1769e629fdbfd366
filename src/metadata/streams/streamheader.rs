//! Stream headers of the metadata root.
//!
//! Each header is `{offset: u32, size: u32, name}` where the name is a null-terminated ASCII
//! string of at most 32 bytes, padded with zeros to a 4-byte boundary.

use crate::{
    file::{io::CilWrite, parser::Parser},
    Result,
};

/// Longest stream name including its terminator.
pub const MAX_STREAM_NAME_LENGTH: usize = 32;

/// Location and name of one metadata stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamHeader {
    /// Offset of the stream relative to the metadata root
    pub offset: u32,
    /// Size of the stream in bytes
    pub size: u32,
    /// Stream name, e.g. `#~` or `#Strings`
    pub name: String,
}

impl StreamHeader {
    /// Read one stream header. The parser must be positioned 4-byte aligned relative to the
    /// metadata root; it is left aligned after the padded name.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for an unterminated or overlong name and
    /// [`crate::Error::OutOfBounds`] for truncated data.
    pub fn read(parser: &mut Parser) -> Result<StreamHeader> {
        let offset = parser.read_le::<u32>()?;
        let size = parser.read_le::<u32>()?;

        let mut name = String::with_capacity(MAX_STREAM_NAME_LENGTH);
        loop {
            let name_char = parser.read_le::<u8>()?;
            if name_char == 0 {
                break;
            }
            if name.len() + 1 >= MAX_STREAM_NAME_LENGTH {
                return Err(malformed_error!("Stream name exceeds 32 bytes - {}", name));
            }
            name.push(char::from(name_char));
        }
        parser.align(4)?;

        Ok(StreamHeader { offset, size, name })
    }

    /// Number of bytes [`StreamHeader::write`] emits.
    #[must_use]
    pub fn written_size(&self) -> usize {
        8 + (self.name.len() + 1).next_multiple_of(4)
    }

    /// Append the header. `out` must currently be 4-byte aligned relative to the root.
    pub fn write(&self, out: &mut Vec<u8>) {
        out.write_le(self.offset);
        out.write_le(self.size);
        out.extend_from_slice(self.name.as_bytes());
        out.push(0);
        out.pad_to(4);
    }
}
