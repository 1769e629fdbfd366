//! Debug directory entries.
//!
//! The debug data directory points at an array of 28-byte `IMAGE_DEBUG_DIRECTORY` records.
//! Managed compilers emit one CodeView record pointing at the PDB path and signature. The
//! reader keeps the first record and its payload; the writer can emit one record with a
//! caller-supplied payload.

use crate::{
    file::{io::CilWrite, parser::Parser},
    Result,
};

/// Size of one debug directory record.
pub const DEBUG_DIRECTORY_SIZE: usize = 28;

/// `IMAGE_DEBUG_TYPE_CODEVIEW`
pub const DEBUG_TYPE_CODEVIEW: u32 = 2;

/// One `IMAGE_DEBUG_DIRECTORY` record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DebugDirectory {
    /// Reserved, zero
    pub characteristics: u32,
    /// Creation time of the debug data
    pub time_date_stamp: u32,
    /// Format major version
    pub major_version: u16,
    /// Format minor version
    pub minor_version: u16,
    /// Format of the debug data (`2` = CodeView)
    pub debug_type: u32,
    /// Size of the payload
    pub size_of_data: u32,
    /// RVA of the payload when loaded
    pub address_of_raw_data: u32,
    /// File offset of the payload
    pub pointer_to_raw_data: u32,
}

impl DebugDirectory {
    /// Read one record.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] on truncated data.
    pub fn read(data: &[u8]) -> Result<Self> {
        let mut parser = Parser::new(data);
        Ok(DebugDirectory {
            characteristics: parser.read_le::<u32>()?,
            time_date_stamp: parser.read_le::<u32>()?,
            major_version: parser.read_le::<u16>()?,
            minor_version: parser.read_le::<u16>()?,
            debug_type: parser.read_le::<u32>()?,
            size_of_data: parser.read_le::<u32>()?,
            address_of_raw_data: parser.read_le::<u32>()?,
            pointer_to_raw_data: parser.read_le::<u32>()?,
        })
    }

    /// Append the record.
    pub fn write(&self, out: &mut Vec<u8>) {
        out.write_le(self.characteristics);
        out.write_le(self.time_date_stamp);
        out.write_le(self.major_version);
        out.write_le(self.minor_version);
        out.write_le(self.debug_type);
        out.write_le(self.size_of_data);
        out.write_le(self.address_of_raw_data);
        out.write_le(self.pointer_to_raw_data);
    }
}

/// A debug record together with the bytes it points at.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DebugInformation {
    /// The directory record as found in the image
    pub directory: DebugDirectory,
    /// The payload
    pub data: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crafted() {
        #[rustfmt::skip]
        let data = [
            0x00, 0x00, 0x00, 0x00, // characteristics
            0x78, 0x56, 0x34, 0x12, // time_date_stamp
            0x00, 0x00,             // major_version
            0x00, 0x00,             // minor_version
            0x02, 0x00, 0x00, 0x00, // type
            0x1C, 0x01, 0x00, 0x00, // size_of_data
            0x5C, 0x20, 0x00, 0x00, // address_of_raw_data
            0x5C, 0x02, 0x00, 0x00, // pointer_to_raw_data
        ];

        let directory = DebugDirectory::read(&data).unwrap();
        assert_eq!(directory.time_date_stamp, 0x1234_5678);
        assert_eq!(directory.debug_type, DEBUG_TYPE_CODEVIEW);
        assert_eq!(directory.size_of_data, 0x11C);
        assert_eq!(directory.address_of_raw_data, 0x205C);
        assert_eq!(directory.pointer_to_raw_data, 0x25C);

        let mut written = Vec::new();
        directory.write(&mut written);
        assert_eq!(written, data);
        assert_eq!(written.len(), DEBUG_DIRECTORY_SIZE);
    }
}
