//! Header of the `#~` / `#-` table stream.
//!
//! ```text
//! offset size field
//! 0      4    reserved, 0
//! 4      1    major version
//! 5      1    minor version
//! 6      1    heap size flags
//! 7      1    reserved, 1
//! 8      8    valid (present tables bit vector)
//! 16     8    sorted (sorted tables bit vector)
//! 24     4*n  row count of every present table, in table id order
//! ...    4    extra data, only if heap size flag 0x40 is set
//! ```
//!
//! The row data of every present table follows directly after the header.

use bitflags::bitflags;
use strum::IntoEnumIterator;

use crate::{
    file::{io::CilWrite, parser::Parser},
    metadata::tables::{TableId, TABLE_COUNT},
    Error, Result,
};

bitflags! {
    /// Heap size flags of the table stream header.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct HeapSizes: u8 {
        /// `#Strings` indices are 4 bytes wide
        const WIDE_STRINGS = 0x01;
        /// `#GUID` indices are 4 bytes wide
        const WIDE_GUID = 0x02;
        /// `#Blob` indices are 4 bytes wide
        const WIDE_BLOB = 0x04;
        /// Stream contains only changes of an edit-and-continue delta
        const DELTA_ONLY = 0x20;
        /// An additional u32 follows the row counts
        const EXTRA_DATA = 0x40;
        /// Stream may contain deleted tokens
        const HAS_DELETE = 0x80;
    }
}

/// Bit vector of the tables ECMA-335 requires to be sorted by their primary key.
#[must_use]
pub fn sorted_tables_mask() -> u64 {
    TableId::iter()
        .filter(|table| table.is_sorted())
        .fold(0, |mask, table| mask | (1u64 << (table as u8)))
}

/// Parsed table stream header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TablesHeader {
    /// Major version, 2 for current images
    pub major_version: u8,
    /// Minor version, 0 for current images
    pub minor_version: u8,
    /// Heap size flags
    pub heap_sizes: HeapSizes,
    /// Second reserved byte, usually 1
    pub reserved: u8,
    /// Present tables
    pub valid: u64,
    /// Sorted tables
    pub sorted: u64,
    /// Row count per table id, zero for absent tables
    pub row_counts: [u32; TABLE_COUNT],
    /// Value following the row counts when [`HeapSizes::EXTRA_DATA`] is set
    pub extra_data: Option<u32>,
}

impl Default for TablesHeader {
    fn default() -> Self {
        TablesHeader {
            major_version: 2,
            minor_version: 0,
            heap_sizes: HeapSizes::empty(),
            reserved: 1,
            valid: 0,
            sorted: sorted_tables_mask(),
            row_counts: [0; TABLE_COUNT],
            extra_data: None,
        }
    }
}

impl TablesHeader {
    /// Read the header from the start of a table stream. On success the parser points at the
    /// first row of the first present table.
    ///
    /// # Errors
    /// Returns [`crate::Error::BadImageFormat`] if a bit for an unknown table is set and
    /// [`crate::Error::OutOfBounds`] on truncated data.
    pub fn read(parser: &mut Parser) -> Result<TablesHeader> {
        let _reserved = parser.read_le::<u32>()?;
        let major_version = parser.read_le::<u8>()?;
        let minor_version = parser.read_le::<u8>()?;
        let heap_sizes = HeapSizes::from_bits_retain(parser.read_le::<u8>()?);
        let reserved = parser.read_le::<u8>()?;
        let valid = parser.read_le::<u64>()?;
        let sorted = parser.read_le::<u64>()?;

        let unknown = valid >> TABLE_COUNT;
        if unknown != 0 {
            return Err(Error::BadImageFormat(format!(
                "table stream marks unknown tables as present - 0x{:x}",
                unknown << TABLE_COUNT
            )));
        }

        let mut row_counts = [0u32; TABLE_COUNT];
        for table in TableId::iter() {
            if valid & (1u64 << (table as u8)) != 0 {
                row_counts[table as usize] = parser.read_le::<u32>()?;
            }
        }

        let extra_data = if heap_sizes.contains(HeapSizes::EXTRA_DATA) {
            Some(parser.read_le::<u32>()?)
        } else {
            None
        };

        Ok(TablesHeader {
            major_version,
            minor_version,
            heap_sizes,
            reserved,
            valid,
            sorted,
            row_counts,
            extra_data,
        })
    }

    /// Row count of `table`.
    #[must_use]
    pub fn row_count(&self, table: TableId) -> u32 {
        self.row_counts[table as usize]
    }

    /// Whether `table` is marked present.
    #[must_use]
    pub fn is_present(&self, table: TableId) -> bool {
        self.valid & (1u64 << (table as u8)) != 0
    }

    /// Present tables in id order.
    pub fn present_tables(&self) -> impl Iterator<Item = TableId> + '_ {
        TableId::iter().filter(|table| self.is_present(*table))
    }

    /// Byte size of the header including the row counts and the optional extra data.
    #[must_use]
    pub fn size(&self) -> usize {
        24 + self.valid.count_ones() as usize * 4 + self.extra_data.map_or(0, |_| 4)
    }

    /// Set the row counts and derive the valid vector from them. Tables with zero rows are
    /// not marked present.
    pub fn set_row_counts(&mut self, row_counts: [u32; TABLE_COUNT]) {
        self.valid = row_counts
            .iter()
            .enumerate()
            .filter(|(_, count)| **count != 0)
            .fold(0, |mask, (table, _)| mask | (1u64 << table));
        self.row_counts = row_counts;
    }

    /// Append the header.
    pub fn write(&self, out: &mut Vec<u8>) {
        let mut heap_sizes = self.heap_sizes;
        heap_sizes.set(HeapSizes::EXTRA_DATA, self.extra_data.is_some());

        out.write_le(0u32);
        out.write_le(self.major_version);
        out.write_le(self.minor_version);
        out.write_le(heap_sizes.bits());
        out.write_le(self.reserved);
        out.write_le(self.valid);
        out.write_le(self.sorted);
        for table in self.present_tables() {
            out.write_le(self.row_counts[table as usize]);
        }
        if let Some(extra_data) = self.extra_data {
            out.write_le(extra_data);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crafted() {
        #[rustfmt::skip]
        let header_bytes = [
            0x00, 0x00, 0x00, 0x00,                         // reserved
            0x02, 0x00,                                     // version 2.0
            0x05,                                           // wide strings + wide blob
            0x01,                                           // reserved
            0x05, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // Module | TypeDef
            0x00, 0xFA, 0x01, 0x33, 0x00, 0x16, 0x00, 0x00, // sorted
            0x01, 0x00, 0x00, 0x00,                         // Module rows
            0x0A, 0x00, 0x00, 0x00,                         // TypeDef rows
        ];

        let mut parser = Parser::new(&header_bytes);
        let header = TablesHeader::read(&mut parser).unwrap();
        assert_eq!(header.major_version, 2);
        assert!(header.heap_sizes.contains(HeapSizes::WIDE_STRINGS));
        assert!(!header.heap_sizes.contains(HeapSizes::WIDE_GUID));
        assert!(header.heap_sizes.contains(HeapSizes::WIDE_BLOB));
        assert_eq!(header.row_count(TableId::Module), 1);
        assert_eq!(header.row_count(TableId::TypeDef), 10);
        assert_eq!(header.row_count(TableId::TypeRef), 0);
        assert_eq!(header.sorted, sorted_tables_mask());
        assert_eq!(header.size(), 32);
        assert_eq!(parser.pos(), 32);
        assert_eq!(
            header.present_tables().collect::<Vec<_>>(),
            vec![TableId::Module, TableId::TypeDef]
        );

        let mut written = Vec::new();
        header.write(&mut written);
        assert_eq!(written, header_bytes);
    }

    #[test]
    fn extra_data() {
        let mut header = TablesHeader::default();
        let mut counts = [0u32; TABLE_COUNT];
        counts[TableId::Module as usize] = 1;
        header.set_row_counts(counts);
        header.extra_data = Some(0xDEAD_BEEF);

        let mut written = Vec::new();
        header.write(&mut written);
        assert_eq!(written.len(), header.size());
        assert_eq!(written[6], 0x40);

        let mut parser = Parser::new(&written);
        let read = TablesHeader::read(&mut parser).unwrap();
        assert_eq!(read.extra_data, Some(0xDEAD_BEEF));
        assert_eq!(read.valid, 1);
    }

    #[test]
    fn unknown_table() {
        let mut data = vec![0u8; 24];
        data[4] = 2;
        data[8..16].copy_from_slice(&(1u64 << 0x30).to_le_bytes());
        let mut parser = Parser::new(&data);
        assert!(matches!(
            TablesHeader::read(&mut parser),
            Err(Error::BadImageFormat(_))
        ));
    }

    #[test]
    fn sorted_mask() {
        assert_eq!(sorted_tables_mask(), 0x0000_1600_3301_FA00);
    }
}
