//! The metadata root and its stream directory (ECMA-335 II.24.2.1).
//!
//! The metadata root starts with the `BSJB` signature, followed by a version string and
//! the headers of the streams. Stream offsets are relative to the start of the root.
//!
//! # Example
//!
//! ```rust
//! use dotmeta::metadata::root::Root;
//! let root = Root::read(&[
//!            0x42, 0x53, 0x4A, 0x42,
//!            0x01, 0x00,
//!            0x01, 0x00,
//!            0x00, 0x00, 0x00, 0x00,
//!            0x08, 0x00, 0x00, 0x00,
//!            b'H', b'E', b'L', b'L', b'O', 0x00, 0x00, 0x00,
//!            0x00, 0x00,
//!            0x01, 0x00,
//!            0x28, 0x00, 0x00, 0x00, // StreamHeader
//!            0x00, 0x00, 0x00, 0x00,
//!            0x23, 0x7E, 0x00, 0x00,
//!        ])?;
//! assert_eq!(root.version, "HELLO");
//! for stream in &root.stream_headers {
//!     println!("Stream: {} (offset: {}, size: {})", stream.name, stream.offset, stream.size);
//! }
//! # Ok::<(), dotmeta::Error>(())
//! ```
//!
//! # References
//!
//! - [ECMA-335 II.24.2.1: Metadata root](https://ecma-international.org/wp-content/uploads/ECMA-335_6th_edition_june_2012.pdf)

use crate::{
    file::{io::CilWrite, parser::Parser},
    metadata::streams::StreamHeader,
    Error, Result,
};

/// `BSJB`, the signature of the metadata root.
pub const CIL_HEADER_MAGIC: u32 = 0x424A_5342;

/// Version string written by default.
pub const DEFAULT_METADATA_VERSION: &str = "v4.0.30319";

/// Longest version string, including its terminator and padding.
pub const MAX_VERSION_LENGTH: usize = 255;

/// The metadata root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Root {
    /// Major version, 1
    pub major_version: u16,
    /// Minor version, 1
    pub minor_version: u16,
    /// Reserved, 0
    pub reserved: u32,
    /// Runtime version string, without padding
    pub version: String,
    /// Reserved, 0
    pub flags: u16,
    /// One header per stream
    pub stream_headers: Vec<StreamHeader>,
}

impl Root {
    /// A root for `version` with the given streams.
    #[must_use]
    pub fn new(version: &str, stream_headers: Vec<StreamHeader>) -> Self {
        Root {
            major_version: 1,
            minor_version: 1,
            reserved: 0,
            version: version.to_string(),
            flags: 0,
            stream_headers,
        }
    }

    /// Parse the root at the start of `data`.
    ///
    /// # Errors
    /// Returns [`crate::Error::BadImageFormat`] if the `BSJB` signature is missing,
    /// [`crate::Error::Malformed`] for streams that leave the metadata, and
    /// [`crate::Error::OutOfBounds`] for truncated data.
    pub fn read(data: &[u8]) -> Result<Root> {
        let mut parser = Parser::new(data);
        if parser.read_le::<u32>()? != CIL_HEADER_MAGIC {
            return Err(Error::BadImageFormat(
                "metadata root signature not found".to_string(),
            ));
        }

        let major_version = parser.read_le::<u16>()?;
        let minor_version = parser.read_le::<u16>()?;
        let reserved = parser.read_le::<u32>()?;
        let length = parser.read_le::<u32>()? as usize;
        if length > MAX_VERSION_LENGTH {
            return Err(malformed_error!("Version string of {} bytes", length));
        }
        let raw_version = parser.read_bytes(length)?;
        let end = raw_version
            .iter()
            .position(|byte| *byte == 0)
            .unwrap_or(raw_version.len());
        let version = String::from_utf8_lossy(&raw_version[..end]).into_owned();

        // the padded length is required to be a multiple of 4, but not every compiler obeys
        parser.align(4)?;
        let flags = parser.read_le::<u16>()?;
        let stream_count = parser.read_le::<u16>()?;

        let mut stream_headers = Vec::with_capacity(usize::from(stream_count));
        for _ in 0..stream_count {
            let header = StreamHeader::read(&mut parser)?;
            let end = u64::from(header.offset) + u64::from(header.size);
            if end > data.len() as u64 {
                return Err(malformed_error!(
                    "Stream {} ends at {} beyond the metadata of {} bytes",
                    header.name,
                    end,
                    data.len()
                ));
            }
            stream_headers.push(header);
        }

        Ok(Root {
            major_version,
            minor_version,
            reserved,
            version,
            flags,
            stream_headers,
        })
    }

    /// Length of the padded version string field.
    #[must_use]
    pub fn version_length(&self) -> usize {
        (self.version.len() + 1).next_multiple_of(4)
    }

    /// Size of the root including all stream headers.
    #[must_use]
    pub fn size(&self) -> usize {
        16 + self.version_length()
            + 4
            + self
                .stream_headers
                .iter()
                .map(StreamHeader::written_size)
                .sum::<usize>()
    }

    /// Append the root. `out` must start at the metadata root.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidArgument`] for an overlong version string or more than
    /// `u16::MAX` streams.
    #[allow(clippy::cast_possible_truncation)]
    pub fn write(&self, out: &mut Vec<u8>) -> Result<()> {
        let length = self.version_length();
        if length > MAX_VERSION_LENGTH {
            return Err(Error::InvalidArgument(format!(
                "metadata version string {:?} is too long",
                self.version
            )));
        }
        let stream_count = u16::try_from(self.stream_headers.len())
            .map_err(|_| Error::InvalidArgument("too many metadata streams".to_string()))?;

        out.write_le(CIL_HEADER_MAGIC);
        out.write_le(self.major_version);
        out.write_le(self.minor_version);
        out.write_le(self.reserved);
        out.write_le(length as u32);
        out.extend_from_slice(self.version.as_bytes());
        out.write_zeros(length - self.version.len());
        out.write_le(self.flags);
        out.write_le(stream_count);
        for header in &self.stream_headers {
            header.write(out);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crafted() {
        #[rustfmt::skip]
        let header_bytes = [
            0x42, 0x53, 0x4A, 0x42,
            0x01, 0x00,
            0x01, 0x00,
            0x00, 0x00, 0x00, 0x00,
            0x0C, 0x00, 0x00, 0x00,
            b'v', b'4', b'.', b'0', b'.', b'3', b'0', b'3', b'1', b'9', 0x00, 0x00,
            0x00, 0x00,
            0x02, 0x00,

            0x40, 0x00, 0x00, 0x00, // StreamHeader
            0x04, 0x00, 0x00, 0x00,
            0x23, 0x7E, 0x00, 0x00,

            0x44, 0x00, 0x00, 0x00, // StreamHeader
            0x04, 0x00, 0x00, 0x00,
            0x23, 0x53, 0x74, 0x72, 0x69, 0x6E, 0x67, 0x73, 0x00, 0x00, 0x00, 0x00,

            0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00,
        ];

        let root = Root::read(&header_bytes).unwrap();
        assert_eq!(root.major_version, 1);
        assert_eq!(root.minor_version, 1);
        assert_eq!(root.version, DEFAULT_METADATA_VERSION);
        assert_eq!(root.stream_headers.len(), 2);
        assert_eq!(root.stream_headers[0].name, "#~");
        assert_eq!(root.stream_headers[1].name, "#Strings");
        assert_eq!(root.stream_headers[1].offset, 0x44);
        assert_eq!(root.size(), 0x40);

        let mut written = Vec::new();
        root.write(&mut written).unwrap();
        assert_eq!(written, &header_bytes[..0x40]);
    }

    #[test]
    fn version_padding() {
        assert_eq!(Root::new("v1.1", Vec::new()).version_length(), 8);
        assert_eq!(Root::new("v2.0.50727", Vec::new()).version_length(), 12);
        assert_eq!(Root::new("abc", Vec::new()).version_length(), 4);
    }

    #[test]
    fn invalid() {
        assert!(matches!(
            Root::read(&[0x42, 0x53, 0x4A, 0x43, 0, 0, 0, 0]),
            Err(Error::BadImageFormat(_))
        ));

        #[rustfmt::skip]
        let stream_outside = [
            0x42, 0x53, 0x4A, 0x42,
            0x01, 0x00, 0x01, 0x00,
            0x00, 0x00, 0x00, 0x00,
            0x04, 0x00, 0x00, 0x00,
            b'v', b'1', 0x00, 0x00,
            0x00, 0x00, 0x01, 0x00,
            0x00, 0x01, 0x00, 0x00,
            0x04, 0x00, 0x00, 0x00,
            0x23, 0x7E, 0x00, 0x00,
        ];
        assert!(Root::read(&stream_outside).is_err());
    }
}
