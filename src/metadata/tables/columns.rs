//! [`ColumnValue`] for the plain field types of the row structs.
//!
//! Constants, heap references, table references and the typed signature blobs. Composite
//! blob values (constants, custom attributes, permission sets, marshalling descriptors,
//! method bodies, resources) implement the trait next to their codecs.

use crate::{
    metadata::{
        signatures::{
            encode_abstract_signature, encode_field_signature, encode_method_signature,
            encode_method_spec_signature, encode_property_signature, encode_type_spec_signature,
            parse_abstract_signature, parse_field_signature, parse_method_signature,
            parse_method_spec_signature, parse_property_signature, parse_type_spec_signature,
            AbstractSignature, SignatureField, SignatureMethod, SignatureMethodSpec,
            SignatureProperty, TypeSignature,
        },
        tables::{
            schema::{kind_mismatch, raw_value, ColumnKind, ColumnSchema, ColumnValue},
            ReadContext, TableId, TableIndex, WriteContext,
        },
    },
    Error, Result,
};

impl ColumnValue for u8 {
    #[allow(clippy::cast_possible_truncation)]
    fn read_column(
        _ctx: &ReadContext,
        column: &ColumnSchema,
        raw: &[u32],
        index: usize,
    ) -> Result<Self> {
        match column.kind {
            ColumnKind::Constant8 => Ok(raw_value(raw, index)? as u8),
            _ => Err(kind_mismatch(column)),
        }
    }

    fn write_column(
        &self,
        _ctx: &mut WriteContext,
        _column: &ColumnSchema,
        _previous: &[u32],
    ) -> Result<u32> {
        Ok(u32::from(*self))
    }
}

impl ColumnValue for u16 {
    #[allow(clippy::cast_possible_truncation)]
    fn read_column(
        _ctx: &ReadContext,
        column: &ColumnSchema,
        raw: &[u32],
        index: usize,
    ) -> Result<Self> {
        match column.kind {
            ColumnKind::Constant16 => Ok(raw_value(raw, index)? as u16),
            _ => Err(kind_mismatch(column)),
        }
    }

    fn write_column(
        &self,
        _ctx: &mut WriteContext,
        _column: &ColumnSchema,
        _previous: &[u32],
    ) -> Result<u32> {
        Ok(u32::from(*self))
    }
}

impl ColumnValue for u32 {
    fn read_column(
        _ctx: &ReadContext,
        column: &ColumnSchema,
        raw: &[u32],
        index: usize,
    ) -> Result<Self> {
        match column.kind {
            ColumnKind::Constant32 => raw_value(raw, index),
            _ => Err(kind_mismatch(column)),
        }
    }

    fn write_column(
        &self,
        _ctx: &mut WriteContext,
        _column: &ColumnSchema,
        _previous: &[u32],
    ) -> Result<u32> {
        Ok(*self)
    }
}

impl ColumnValue for String {
    fn read_column(
        ctx: &ReadContext,
        column: &ColumnSchema,
        raw: &[u32],
        index: usize,
    ) -> Result<Self> {
        match column.kind {
            ColumnKind::StringIndex => Ok(ctx.string(raw_value(raw, index)?)?.to_string()),
            _ => Err(kind_mismatch(column)),
        }
    }

    fn write_column(
        &self,
        ctx: &mut WriteContext,
        _column: &ColumnSchema,
        _previous: &[u32],
    ) -> Result<u32> {
        ctx.strings.add(self)
    }
}

impl ColumnValue for Option<uguid::Guid> {
    fn read_column(
        ctx: &ReadContext,
        column: &ColumnSchema,
        raw: &[u32],
        index: usize,
    ) -> Result<Self> {
        if column.kind != ColumnKind::GuidIndex {
            return Err(kind_mismatch(column));
        }

        match raw_value(raw, index)? {
            0 => Ok(None),
            value => Ok(Some(ctx.guids.get(value as usize)?)),
        }
    }

    fn write_column(
        &self,
        ctx: &mut WriteContext,
        _column: &ColumnSchema,
        _previous: &[u32],
    ) -> Result<u32> {
        Ok(self.map_or(0, |guid| ctx.guids.add(guid)))
    }
}

/// Blob content, or the initial data of a `FieldRVA` row.
impl ColumnValue for Vec<u8> {
    fn read_column(
        ctx: &ReadContext,
        column: &ColumnSchema,
        raw: &[u32],
        index: usize,
    ) -> Result<Self> {
        match column.kind {
            ColumnKind::BlobIndex => Ok(ctx.blob(raw_value(raw, index)?)?.to_vec()),
            // filled once all tables are known, the size depends on the field signature
            ColumnKind::Rva => Ok(Vec::new()),
            _ => Err(kind_mismatch(column)),
        }
    }

    fn write_column(
        &self,
        ctx: &mut WriteContext,
        column: &ColumnSchema,
        _previous: &[u32],
    ) -> Result<u32> {
        match column.kind {
            ColumnKind::BlobIndex => ctx.blobs.add(self),
            ColumnKind::Rva => {
                if !self.is_empty() {
                    let row = ctx.current.index;
                    ctx.field_data.push((row, self.clone()));
                }
                Ok(0)
            }
            _ => Err(kind_mismatch(column)),
        }
    }
}

impl ColumnValue for TableIndex {
    fn read_column(
        _ctx: &ReadContext,
        column: &ColumnSchema,
        raw: &[u32],
        index: usize,
    ) -> Result<Self> {
        let value = raw_value(raw, index)?;
        match column.kind {
            // list columns may legitimately hold 0 in empty tables
            ColumnKind::SimpleTableIndex(table) => {
                Ok(TableIndex::new(table, value.saturating_sub(1)))
            }
            ColumnKind::CodedTableIndex(group) => group.decode(value)?.ok_or_else(|| {
                malformed_error!("Column '{}' holds a null {:?} index", column.name, group)
            }),
            _ => Err(kind_mismatch(column)),
        }
    }

    fn write_column(
        &self,
        _ctx: &mut WriteContext,
        column: &ColumnSchema,
        _previous: &[u32],
    ) -> Result<u32> {
        match column.kind {
            ColumnKind::SimpleTableIndex(table) => {
                self.expect_table(table)?;
                Ok(self.index + 1)
            }
            ColumnKind::CodedTableIndex(group) | ColumnKind::CodedTableIndexNullable(group) => {
                group.encode(Some(*self))
            }
            _ => Err(kind_mismatch(column)),
        }
    }
}

impl ColumnValue for Option<TableIndex> {
    fn read_column(
        _ctx: &ReadContext,
        column: &ColumnSchema,
        raw: &[u32],
        index: usize,
    ) -> Result<Self> {
        let value = raw_value(raw, index)?;
        match column.kind {
            ColumnKind::SimpleTableIndex(table) => {
                Ok(value.checked_sub(1).map(|row| TableIndex::new(table, row)))
            }
            ColumnKind::CodedTableIndex(group) | ColumnKind::CodedTableIndexNullable(group) => {
                group.decode(value)
            }
            _ => Err(kind_mismatch(column)),
        }
    }

    fn write_column(
        &self,
        _ctx: &mut WriteContext,
        column: &ColumnSchema,
        _previous: &[u32],
    ) -> Result<u32> {
        match (column.kind, self) {
            (ColumnKind::SimpleTableIndex(_), None) => Ok(0),
            (ColumnKind::SimpleTableIndex(table), Some(index)) => {
                index.expect_table(table)?;
                Ok(index.index + 1)
            }
            (ColumnKind::CodedTableIndexNullable(group), _) => group.encode(*self),
            (ColumnKind::CodedTableIndex(group), Some(index)) => group.encode(Some(*index)),
            (ColumnKind::CodedTableIndex(group), None) => Err(Error::InvalidArgument(format!(
                "column '{}' requires a {:?} reference",
                column.name, group
            ))),
            _ => Err(kind_mismatch(column)),
        }
    }
}

macro_rules! signature_column {
    ($($signature:ty => $parse:ident, $encode:ident);* $(;)?) => {
        $(
            impl ColumnValue for $signature {
                fn read_column(
                    ctx: &ReadContext,
                    column: &ColumnSchema,
                    raw: &[u32],
                    index: usize,
                ) -> Result<Self> {
                    match column.kind {
                        ColumnKind::BlobIndex => $parse(ctx.blob(raw_value(raw, index)?)?),
                        _ => Err(kind_mismatch(column)),
                    }
                }

                fn write_column(
                    &self,
                    ctx: &mut WriteContext,
                    _column: &ColumnSchema,
                    _previous: &[u32],
                ) -> Result<u32> {
                    let blob = $encode(self)?;
                    ctx.blobs.add(&blob)
                }
            }
        )*
    };
}

signature_column! {
    SignatureField => parse_field_signature, encode_field_signature;
    SignatureMethod => parse_method_signature, encode_method_signature;
    SignatureProperty => parse_property_signature, encode_property_signature;
    SignatureMethodSpec => parse_method_spec_signature, encode_method_spec_signature;
    TypeSignature => parse_type_spec_signature, encode_type_spec_signature;
}

/// `MemberRef.Signature` and `StandAloneSig.Signature`, which admit several signature kinds.
impl ColumnValue for AbstractSignature {
    fn read_column(
        ctx: &ReadContext,
        column: &ColumnSchema,
        raw: &[u32],
        index: usize,
    ) -> Result<Self> {
        match column.kind {
            ColumnKind::BlobIndex => Ok(parse_abstract_signature(
                ctx.blob(raw_value(raw, index)?)?,
            )),
            _ => Err(kind_mismatch(column)),
        }
    }

    fn write_column(
        &self,
        ctx: &mut WriteContext,
        _column: &ColumnSchema,
        _previous: &[u32],
    ) -> Result<u32> {
        let blob = encode_abstract_signature(self)?;
        ctx.blobs.add(&blob)
    }
}

impl TableIndex {
    /// Whether this references a row that exists in a table with `rows` rows.
    #[must_use]
    pub fn is_within(&self, rows: u32) -> bool {
        self.index < rows
    }
}
