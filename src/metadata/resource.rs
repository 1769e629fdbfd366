//! Manifest resource data.
//!
//! `ManifestResource.Offset` is either the offset of an embedded resource inside the CLI
//! resources directory, when `Implementation` is null, or an offset into the file or
//! assembly the implementation column references. Embedded resources are stored as a `u32`
//! length followed by the bytes, each entry starting on an 8-byte boundary.

use crate::{
    file::io::CilWrite,
    metadata::tables::{
        kind_mismatch, raw_value, ColumnKind, ColumnSchema, ColumnValue, ManifestResourceAttributes,
        ManifestResourceRow, ReadContext, WriteContext,
    },
    Error, Result,
};

/// Alignment of the entries of the CLI resources directory.
pub const RESOURCE_ALIGNMENT: usize = 8;

/// Content of a `ManifestResource` row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestResourceData {
    /// Bytes stored in this image
    Embedded(Vec<u8>),
    /// Resource stored elsewhere, `offset` is relative to the implementation
    External {
        /// Offset inside the referenced file
        offset: u32,
    },
}

impl ColumnValue for ManifestResourceData {
    fn read_column(
        _ctx: &ReadContext,
        column: &ColumnSchema,
        raw: &[u32],
        index: usize,
    ) -> Result<Self> {
        if column.kind != ColumnKind::Constant32 {
            return Err(kind_mismatch(column));
        }

        // the content of embedded resources is filled in once the resources directory is known
        let offset = raw_value(raw, index)?;
        if raw_value(raw, 3)? == 0 {
            Ok(ManifestResourceData::Embedded(Vec::new()))
        } else {
            Ok(ManifestResourceData::External { offset })
        }
    }

    fn write_column(
        &self,
        ctx: &mut WriteContext,
        _column: &ColumnSchema,
        _previous: &[u32],
    ) -> Result<u32> {
        match self {
            ManifestResourceData::External { offset } => Ok(*offset),
            ManifestResourceData::Embedded(data) => {
                let offset = u32::try_from(ctx.resources.len())
                    .map_err(|_| Error::InvalidArgument("resources exceed 4 GiB".to_string()))?;
                let length = u32::try_from(data.len()).map_err(|_| {
                    Error::InvalidArgument(format!("resource of {} bytes is too large", data.len()))
                })?;
                ctx.resources.write_le(length);
                ctx.resources.extend_from_slice(data);
                ctx.resources.pad_to(RESOURCE_ALIGNMENT);
                Ok(offset)
            }
        }
    }
}

/// Read the embedded resource at `offset` of the CLI resources directory.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if the entry does not fit the directory.
pub fn read_embedded_resource(directory: &[u8], offset: u32) -> Result<&[u8]> {
    let start = offset as usize;
    let length_bytes = directory
        .get(start..start + 4)
        .ok_or(Error::OutOfBounds)?;
    let length = u32::from_le_bytes([
        length_bytes[0],
        length_bytes[1],
        length_bytes[2],
        length_bytes[3],
    ]) as usize;
    directory
        .get(start + 4..start + 4 + length)
        .ok_or(Error::OutOfBounds)
}

impl ManifestResourceRow {
    /// A public resource embedded in this image.
    #[must_use]
    pub fn embedded(name: &str, data: Vec<u8>) -> Self {
        ManifestResourceRow {
            data: ManifestResourceData::Embedded(data),
            flags: ManifestResourceAttributes::PUBLIC,
            name: name.to_string(),
            implementation: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directory_entries() {
        #[rustfmt::skip]
        let directory = [
            0x03, 0x00, 0x00, 0x00, b'a', b'b', b'c', 0x00,
            0x01, 0x00, 0x00, 0x00, b'z', 0x00, 0x00, 0x00,
        ];
        assert_eq!(read_embedded_resource(&directory, 0).unwrap(), b"abc");
        assert_eq!(read_embedded_resource(&directory, 8).unwrap(), b"z");
        assert!(read_embedded_resource(&directory, 14).is_err());
    }

    #[test]
    fn embedded_row() {
        let row = ManifestResourceRow::embedded("Strings.resources", vec![1, 2, 3]);
        assert_eq!(row.implementation, None);
        assert_eq!(row.data, ManifestResourceData::Embedded(vec![1, 2, 3]));
    }
}
