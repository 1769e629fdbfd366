//! Byte level codec of the table stream rows.
//!
//! Rows are stored back to back in table id order, every column little-endian with the
//! width [`TableInfo::column_size`] assigns to it. Decoding produces the raw values of the
//! first read pass, encoding consumes the raw values of the second write pass.

use strum::IntoEnumIterator;

use crate::{
    file::{io::CilWrite, parser::Parser},
    metadata::{
        streams::TablesHeader,
        tables::{RawValueStorage, TableId, TableInfo},
    },
    Error::OutOfBounds,
    Result,
};

/// Decode every row of a table stream.
///
/// Returns the header, the sizing information derived from it and the raw column values.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if the declared rows do not fit into `data`, or any
/// error of [`TablesHeader::read`].
pub fn read_tables(data: &[u8]) -> Result<(TablesHeader, TableInfo, RawValueStorage<u32>)> {
    let mut parser = Parser::new(data);
    let header = TablesHeader::read(&mut parser)?;
    let info = TableInfo::new(header.row_counts, header.heap_sizes);

    let declared = info
        .checked_rows_size()
        .and_then(|rows| rows.checked_add(header.size()))
        .ok_or(OutOfBounds)?;
    if declared > data.len() {
        return Err(OutOfBounds);
    }

    let mut storage = RawValueStorage::new(header.row_counts);
    for table in TableId::iter() {
        let columns = table.columns();
        for row in 0..header.row_count(table) {
            let Some(values) = storage.row_mut(table, row) else {
                break;
            };

            for (value, column) in values.iter_mut().zip(columns) {
                *value = match info.column_size(column.kind) {
                    1 => u32::from(parser.read_le::<u8>()?),
                    2 => u32::from(parser.read_le::<u16>()?),
                    _ => parser.read_le::<u32>()?,
                };
            }
        }
    }

    Ok((header, info, storage))
}

/// Encode the header and every row, padded to a 4-byte boundary.
///
/// # Errors
/// Returns [`crate::Error::WriteConsistency`] if a raw value does not fit its column or the
/// emitted size differs from the size predicted by `info`.
#[allow(clippy::cast_possible_truncation)]
pub fn write_tables(
    header: &TablesHeader,
    info: &TableInfo,
    storage: &RawValueStorage<u32>,
    out: &mut Vec<u8>,
) -> Result<()> {
    let start = out.len();
    header.write(out);

    for table in TableId::iter() {
        let columns = table.columns();
        for row in 0..storage.row_count(table) {
            let Some(values) = storage.row(table, row) else {
                break;
            };

            for (value, column) in values.iter().zip(columns) {
                match info.column_size(column.kind) {
                    1 if *value <= u32::from(u8::MAX) => out.push(*value as u8),
                    2 if *value <= u32::from(u16::MAX) => out.write_le(*value as u16),
                    4 => out.write_le(*value),
                    size => {
                        return Err(consistency_error!(
                            "{:?}[{}].{} value 0x{:x} does not fit {} bytes",
                            table,
                            row,
                            column.name,
                            value,
                            size
                        ))
                    }
                }
            }
        }
    }

    let expected = header.size() + info.rows_size();
    if out.len() - start != expected {
        return Err(consistency_error!(
            "table stream is {} bytes, expected {}",
            out.len() - start,
            expected
        ));
    }

    while (out.len() - start) % 4 != 0 {
        out.push(0);
    }
    Ok(())
}

/// Size of the encoded table stream including the trailing padding.
#[must_use]
pub fn tables_stream_size(header: &TablesHeader, info: &TableInfo) -> usize {
    (header.size() + info.rows_size() + 3) & !3
}
