//! Column schema of the metadata tables.
//!
//! Every table is a fixed sequence of columns, each with a storage kind that decides its
//! width (see [`crate::metadata::tables::TableInfo::column_size`]) and how its raw `u32`
//! value maps to a typed field. The per-table lists are generated by the `tables!` macro in
//! `definitions.rs` and exposed through [`TableId::columns`].

use crate::{
    metadata::tables::{CodedIndexType, ReadContext, TableId, WriteContext},
    Result,
};

/// Storage kind of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnKind {
    /// 1-byte constant
    Constant8,
    /// 2-byte constant
    Constant16,
    /// 4-byte constant
    Constant32,
    /// Offset into `#Strings`
    StringIndex,
    /// Record number in `#GUID`
    GuidIndex,
    /// Offset into `#Blob`
    BlobIndex,
    /// One-based row of exactly one table
    SimpleTableIndex(TableId),
    /// Coded index that must reference a row
    CodedTableIndex(CodedIndexType),
    /// Coded index where `0` means "none"
    CodedTableIndexNullable(CodedIndexType),
    /// 4-byte RVA of data outside the metadata (method bodies, field data)
    Rva,
}

/// Name and kind of one column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ColumnSchema {
    /// Column name, matches the field name of the row struct
    pub name: &'static str,
    /// Storage kind
    pub kind: ColumnKind,
}

/// Conversion between a typed row field and its raw column value.
///
/// Reading sees the complete raw row so that a column can depend on a sibling (the constant
/// value blob depends on the element type column). Writing sees the raw values already
/// produced for the columns in front of it.
pub trait ColumnValue: Sized {
    /// Produce the field from the raw row.
    ///
    /// # Errors
    /// Returns an error if the raw value cannot be resolved against the heaps or tables.
    fn read_column(
        ctx: &ReadContext,
        column: &ColumnSchema,
        raw: &[u32],
        index: usize,
    ) -> Result<Self>;

    /// Produce the raw column value, registering heap content on the way.
    ///
    /// # Errors
    /// Returns an error if the value cannot be encoded in this column.
    fn write_column(
        &self,
        ctx: &mut WriteContext,
        column: &ColumnSchema,
        previous: &[u32],
    ) -> Result<u32>;
}

/// Raw value of column `index`, or a malformed error if the row is shorter.
pub(crate) fn raw_value(raw: &[u32], index: usize) -> Result<u32> {
    raw.get(index)
        .copied()
        .ok_or_else(|| malformed_error!("Row has no column {}", index))
}

pub(crate) fn kind_mismatch(column: &ColumnSchema) -> crate::Error {
    malformed_error!(
        "Column '{}' has unexpected storage kind {:?}",
        column.name,
        column.kind
    )
}
