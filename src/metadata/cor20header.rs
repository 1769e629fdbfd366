//! The CLI header (ECMA-335 II.25.3.3).
//!
//! The CLR runtime header data directory points at this 72-byte structure. It locates the
//! metadata root, the embedded resources, the strong-name signature slot and the VTable
//! fixups, and names the entry point method.
//!
//! # Reference
//! - [ECMA-335 II.25.3.3](https://ecma-international.org/wp-content/uploads/ECMA-335_6th_edition_june_2012.pdf)

use bitflags::bitflags;

use crate::{
    file::{io::CilWrite, parser::Parser, pe::DataDirectory},
    metadata::token::Token,
    Error, Result,
};

/// Size of the CLI header.
pub const COR20_HEADER_SIZE: usize = 72;

bitflags! {
    /// `COMIMAGE_FLAGS_*` of the CLI header.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ComImageFlags: u32 {
        /// The image contains IL only
        const IL_ONLY = 0x0000_0001;
        /// The image must run in a 32-bit process
        const REQUIRES_32BIT = 0x0000_0002;
        /// IL library
        const IL_LIBRARY = 0x0000_0004;
        /// The image carries a strong-name signature
        const STRONG_NAME_SIGNED = 0x0000_0008;
        /// The entry point is a native RVA instead of a token
        const NATIVE_ENTRYPOINT = 0x0000_0010;
        /// Debug data is tracked
        const TRACK_DEBUG_DATA = 0x0001_0000;
        /// Prefer a 32-bit process
        const PREFERS_32BIT = 0x0002_0000;
    }
}

/// The CLI header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cor20Header {
    /// Size of the header, 72
    pub cb: u32,
    /// Runtime major version, 2 for every current runtime
    pub major_runtime_version: u16,
    /// Runtime minor version
    pub minor_runtime_version: u16,
    /// The metadata root
    pub metadata: DataDirectory,
    /// Image flags
    pub flags: ComImageFlags,
    /// `MethodDef` or `File` token of the entry point, `0` for none
    pub entry_point_token: Token,
    /// Embedded manifest resources
    pub resources: DataDirectory,
    /// Strong-name signature slot
    pub strong_name_signature: DataDirectory,
    /// Always empty
    pub code_manager_table: DataDirectory,
    /// VTable fixups for mixed-mode images
    pub vtable_fixups: DataDirectory,
    /// Always empty
    pub export_address_table_jumps: DataDirectory,
    /// Empty for IL images
    pub managed_native_header: DataDirectory,
}

impl Default for Cor20Header {
    fn default() -> Self {
        Cor20Header {
            cb: COR20_HEADER_SIZE as u32,
            major_runtime_version: 2,
            minor_runtime_version: 5,
            metadata: DataDirectory::default(),
            flags: ComImageFlags::IL_ONLY,
            entry_point_token: Token::new(0),
            resources: DataDirectory::default(),
            strong_name_signature: DataDirectory::default(),
            code_manager_table: DataDirectory::default(),
            vtable_fixups: DataDirectory::default(),
            export_address_table_jumps: DataDirectory::default(),
            managed_native_header: DataDirectory::default(),
        }
    }
}

impl Cor20Header {
    /// Parse the header.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if fewer than 72 bytes are available,
    /// [`crate::Error::Malformed`] for a wrong `cb`, and [`crate::Error::BadImageFormat`] if
    /// the header does not locate a metadata root.
    pub fn read(data: &[u8]) -> Result<Cor20Header> {
        if data.len() < COR20_HEADER_SIZE {
            return Err(Error::OutOfBounds);
        }

        let mut parser = Parser::new(data);
        let cb = parser.read_le::<u32>()?;
        if (cb as usize) < COR20_HEADER_SIZE {
            return Err(malformed_error!(
                "Invalid CLI header size: expected 72, got {}",
                cb
            ));
        }

        let header = Cor20Header {
            cb,
            major_runtime_version: parser.read_le::<u16>()?,
            minor_runtime_version: parser.read_le::<u16>()?,
            metadata: DataDirectory::read(&mut parser)?,
            flags: ComImageFlags::from_bits_retain(parser.read_le::<u32>()?),
            entry_point_token: Token::new(parser.read_le::<u32>()?),
            resources: DataDirectory::read(&mut parser)?,
            strong_name_signature: DataDirectory::read(&mut parser)?,
            code_manager_table: DataDirectory::read(&mut parser)?,
            vtable_fixups: DataDirectory::read(&mut parser)?,
            export_address_table_jumps: DataDirectory::read(&mut parser)?,
            managed_native_header: DataDirectory::read(&mut parser)?,
        };

        if header.metadata.is_empty() {
            return Err(Error::BadImageFormat(
                "CLI header has no metadata root".to_string(),
            ));
        }
        Ok(header)
    }

    /// Append the 72-byte header.
    pub fn write(&self, out: &mut Vec<u8>) {
        out.write_le(self.cb);
        out.write_le(self.major_runtime_version);
        out.write_le(self.minor_runtime_version);
        self.metadata.write(out);
        out.write_le(self.flags.bits());
        out.write_le(self.entry_point_token.value());
        self.resources.write(out);
        self.strong_name_signature.write(out);
        self.code_manager_table.write(out);
        self.vtable_fixups.write(out);
        self.export_address_table_jumps.write(out);
        self.managed_native_header.write(out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crafted() {
        #[rustfmt::skip]
        let header_bytes = [
            0x48, 0x00, 0x00, 0x00,
            0x02, 0x00, 0x05, 0x00,
            0x50, 0x20, 0x00, 0x00, 0x9C, 0x04, 0x00, 0x00,
            0x09, 0x00, 0x00, 0x00,
            0x01, 0x00, 0x00, 0x06,
            0xEC, 0x24, 0x00, 0x00, 0x10, 0x00, 0x00, 0x00,
            0x00, 0x25, 0x00, 0x00, 0x80, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        ];

        let header = Cor20Header::read(&header_bytes).unwrap();
        assert_eq!(header.cb, 72);
        assert_eq!(header.major_runtime_version, 2);
        assert_eq!(header.minor_runtime_version, 5);
        assert_eq!(header.metadata, DataDirectory::new(0x2050, 0x49C));
        assert_eq!(
            header.flags,
            ComImageFlags::IL_ONLY | ComImageFlags::STRONG_NAME_SIGNED
        );
        assert_eq!(header.entry_point_token, Token::new(0x0600_0001));
        assert_eq!(header.resources, DataDirectory::new(0x24EC, 0x10));
        assert_eq!(header.strong_name_signature, DataDirectory::new(0x2500, 0x80));

        let mut written = Vec::new();
        header.write(&mut written);
        assert_eq!(written, header_bytes);
    }

    #[test]
    fn invalid() {
        assert!(matches!(Cor20Header::read(&[0; 16]), Err(Error::OutOfBounds)));

        let mut no_metadata = Vec::new();
        Cor20Header::default().write(&mut no_metadata);
        assert!(matches!(
            Cor20Header::read(&no_metadata),
            Err(Error::BadImageFormat(_))
        ));

        let mut bad_size = no_metadata.clone();
        bad_size[0] = 0x40;
        assert!(Cor20Header::read(&bad_size).is_err());
    }
}
