use strum::IntoEnumIterator;

use crate::metadata::{
    streams::HeapSizes,
    tables::{ColumnKind, CodedIndexType, TableId, TABLE_COUNT},
};

/// Row counts and heap widths, everything needed to size the columns of a table stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableInfo {
    rows: [u32; TABLE_COUNT],
    wide_strings: bool,
    wide_guid: bool,
    wide_blob: bool,
}

impl Default for TableInfo {
    fn default() -> Self {
        TableInfo {
            rows: [0; TABLE_COUNT],
            wide_strings: false,
            wide_guid: false,
            wide_blob: false,
        }
    }
}

impl TableInfo {
    /// Build from per-table row counts and the heap size flags.
    #[must_use]
    pub fn new(rows: [u32; TABLE_COUNT], heap_sizes: HeapSizes) -> Self {
        TableInfo {
            rows,
            wide_strings: heap_sizes.contains(HeapSizes::WIDE_STRINGS),
            wide_guid: heap_sizes.contains(HeapSizes::WIDE_GUID),
            wide_blob: heap_sizes.contains(HeapSizes::WIDE_BLOB),
        }
    }

    /// Heap size flags matching the widths of this instance.
    #[must_use]
    pub fn heap_sizes(&self) -> HeapSizes {
        let mut flags = HeapSizes::empty();
        flags.set(HeapSizes::WIDE_STRINGS, self.wide_strings);
        flags.set(HeapSizes::WIDE_GUID, self.wide_guid);
        flags.set(HeapSizes::WIDE_BLOB, self.wide_blob);
        flags
    }

    /// Row count of `table`.
    #[must_use]
    pub fn rows(&self, table: TableId) -> u32 {
        self.rows[table as usize]
    }

    /// All row counts indexed by table id.
    #[must_use]
    pub fn row_counts(&self) -> &[u32; TABLE_COUNT] {
        &self.rows
    }

    /// Width of a simple index into `table`: 4 bytes once the table exceeds `0xFFFF` rows.
    #[must_use]
    pub fn simple_index_size(&self, table: TableId) -> usize {
        if self.rows(table) > 0xFFFF {
            4
        } else {
            2
        }
    }

    /// Width of a coded index: 4 bytes once the largest participating table reaches
    /// `0xFFFF >> tag_bits` rows.
    #[must_use]
    pub fn coded_index_size(&self, group: CodedIndexType) -> usize {
        let threshold = 0xFFFF >> group.tag_bits();
        let largest = group.tables().map(|table| self.rows(table)).max().unwrap_or(0);
        if largest >= threshold {
            4
        } else {
            2
        }
    }

    /// Width of a `#Strings` index.
    #[must_use]
    pub fn str_bytes(&self) -> usize {
        if self.wide_strings {
            4
        } else {
            2
        }
    }

    /// Width of a `#GUID` index.
    #[must_use]
    pub fn guid_bytes(&self) -> usize {
        if self.wide_guid {
            4
        } else {
            2
        }
    }

    /// Width of a `#Blob` index.
    #[must_use]
    pub fn blob_bytes(&self) -> usize {
        if self.wide_blob {
            4
        } else {
            2
        }
    }

    /// Width of one column.
    #[must_use]
    pub fn column_size(&self, kind: ColumnKind) -> usize {
        match kind {
            ColumnKind::Constant8 => 1,
            ColumnKind::Constant16 => 2,
            ColumnKind::Constant32 | ColumnKind::Rva => 4,
            ColumnKind::StringIndex => self.str_bytes(),
            ColumnKind::GuidIndex => self.guid_bytes(),
            ColumnKind::BlobIndex => self.blob_bytes(),
            ColumnKind::SimpleTableIndex(table) => self.simple_index_size(table),
            ColumnKind::CodedTableIndex(group) | ColumnKind::CodedTableIndexNullable(group) => {
                self.coded_index_size(group)
            }
        }
    }

    /// Width of one row of `table`.
    #[must_use]
    pub fn row_size(&self, table: TableId) -> usize {
        table
            .columns()
            .iter()
            .map(|column| self.column_size(column.kind))
            .sum()
    }

    /// Byte size of all rows of all tables.
    #[must_use]
    pub fn rows_size(&self) -> usize {
        TableId::iter()
            .map(|table| self.row_size(table) * self.rows(table) as usize)
            .sum()
    }

    /// [`TableInfo::rows_size`], `None` if it overflows `usize`.
    #[must_use]
    pub fn checked_rows_size(&self) -> Option<usize> {
        TableId::iter().try_fold(0usize, |total, table| {
            self.row_size(table)
                .checked_mul(self.rows(table) as usize)
                .and_then(|size| total.checked_add(size))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_rows(entries: &[(TableId, u32)]) -> TableInfo {
        let mut rows = [0u32; TABLE_COUNT];
        for (table, count) in entries {
            rows[*table as usize] = *count;
        }
        TableInfo::new(rows, HeapSizes::empty())
    }

    #[test]
    fn simple_index_width() {
        assert_eq!(
            with_rows(&[(TableId::Field, 0xFFFF)]).simple_index_size(TableId::Field),
            2
        );
        assert_eq!(
            with_rows(&[(TableId::Field, 0x10000)]).simple_index_size(TableId::Field),
            4
        );
    }

    #[test]
    fn coded_index_width_boundary() {
        // HasCustomAttribute uses 5 tag bits, threshold 0x7FF
        let group = CodedIndexType::HasCustomAttribute;
        let threshold = 0xFFFF >> group.tag_bits();
        assert_eq!(threshold, 0x7FF);
        assert_eq!(
            with_rows(&[(TableId::Param, threshold - 1)]).coded_index_size(group),
            2
        );
        assert_eq!(
            with_rows(&[(TableId::Param, threshold)]).coded_index_size(group),
            4
        );
        assert_eq!(
            with_rows(&[(TableId::Param, threshold + 1)]).coded_index_size(group),
            4
        );
    }

    #[test]
    fn reserved_slots_are_ignored() {
        let info = with_rows(&[(TableId::Module, 0xFFFF)]);
        assert_eq!(info.coded_index_size(CodedIndexType::CustomAttributeType), 2);
    }

    #[test]
    fn heap_widths() {
        let info = TableInfo::new(
            [0; TABLE_COUNT],
            HeapSizes::WIDE_STRINGS | HeapSizes::WIDE_BLOB,
        );
        assert_eq!(info.str_bytes(), 4);
        assert_eq!(info.guid_bytes(), 2);
        assert_eq!(info.blob_bytes(), 4);
        assert_eq!(info.heap_sizes(), HeapSizes::WIDE_STRINGS | HeapSizes::WIDE_BLOB);
    }

    #[test]
    fn row_sizes() {
        let info = TableInfo::default();
        // Generation, Name, Mvid, EncId, EncBaseId
        assert_eq!(info.row_size(TableId::Module), 10);
        // Flags, Name, Namespace, Extends, FieldList, MethodList
        assert_eq!(info.row_size(TableId::TypeDef), 14);
        // Rva, ImplFlags, Flags, Name, Signature, ParamList
        assert_eq!(info.row_size(TableId::MethodDef), 14);
        // Type, padding, Parent, Value
        assert_eq!(info.row_size(TableId::Constant), 6);

        let wide = TableInfo::new([0; TABLE_COUNT], HeapSizes::all());
        assert_eq!(wide.row_size(TableId::Module), 18);
    }

    #[test]
    fn checked_total() {
        let info = with_rows(&[(TableId::Module, 1), (TableId::TypeDef, 3)]);
        assert_eq!(info.checked_rows_size(), Some(10 + 3 * 14));
        assert_eq!(info.checked_rows_size(), Some(info.rows_size()));
    }
}
