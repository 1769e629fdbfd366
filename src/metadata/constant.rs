//! Values of the `Constant` table.
//!
//! The blob of a constant holds the little-endian value of the type named by the row's
//! element type column. Strings are UTF-16LE without terminator, a null reference is stored
//! as a 4-byte zero. Blobs that do not match their element type are kept verbatim.

use tracing::warn;

use crate::{
    file::{io::CilWrite, parser::Parser},
    metadata::{
        signatures::ELEMENT_TYPE,
        tables::{
            kind_mismatch, raw_value, ColumnKind, ColumnSchema, ColumnValue, ConstantRow,
            ReadContext, TableIndex, WriteContext,
        },
    },
    Result,
};

/// A decoded constant.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstantValue {
    /// `bool`
    Boolean(bool),
    /// `char`, a UTF-16 code unit
    Char(u16),
    /// `sbyte`
    I1(i8),
    /// `byte`
    U1(u8),
    /// `short`
    I2(i16),
    /// `ushort`
    U2(u16),
    /// `int`
    I4(i32),
    /// `uint`
    U4(u32),
    /// `long`
    I8(i64),
    /// `ulong`
    U8(u64),
    /// `float`
    R4(f32),
    /// `double`
    R8(f64),
    /// `string`
    String(String),
    /// Null object reference
    Null,
    /// Blob that does not decode for its element type
    Raw(Vec<u8>),
}

impl ConstantValue {
    /// Element type stored in `Constant.Type` for this value, `None` for raw values.
    #[must_use]
    pub fn element_type(&self) -> Option<u8> {
        Some(match self {
            ConstantValue::Boolean(_) => ELEMENT_TYPE::BOOLEAN,
            ConstantValue::Char(_) => ELEMENT_TYPE::CHAR,
            ConstantValue::I1(_) => ELEMENT_TYPE::I1,
            ConstantValue::U1(_) => ELEMENT_TYPE::U1,
            ConstantValue::I2(_) => ELEMENT_TYPE::I2,
            ConstantValue::U2(_) => ELEMENT_TYPE::U2,
            ConstantValue::I4(_) => ELEMENT_TYPE::I4,
            ConstantValue::U4(_) => ELEMENT_TYPE::U4,
            ConstantValue::I8(_) => ELEMENT_TYPE::I8,
            ConstantValue::U8(_) => ELEMENT_TYPE::U8,
            ConstantValue::R4(_) => ELEMENT_TYPE::R4,
            ConstantValue::R8(_) => ELEMENT_TYPE::R8,
            ConstantValue::String(_) => ELEMENT_TYPE::STRING,
            ConstantValue::Null => ELEMENT_TYPE::CLASS,
            ConstantValue::Raw(_) => return None,
        })
    }

    /// Decode `data` as a value of `element_type`, `None` if the blob does not fit.
    #[must_use]
    pub fn decode(element_type: u8, data: &[u8]) -> Option<ConstantValue> {
        let mut parser = Parser::new(data);
        let value = match element_type {
            ELEMENT_TYPE::BOOLEAN => ConstantValue::Boolean(parser.read_le::<u8>().ok()? != 0),
            ELEMENT_TYPE::CHAR => ConstantValue::Char(parser.read_le::<u16>().ok()?),
            ELEMENT_TYPE::I1 => ConstantValue::I1(parser.read_le::<i8>().ok()?),
            ELEMENT_TYPE::U1 => ConstantValue::U1(parser.read_le::<u8>().ok()?),
            ELEMENT_TYPE::I2 => ConstantValue::I2(parser.read_le::<i16>().ok()?),
            ELEMENT_TYPE::U2 => ConstantValue::U2(parser.read_le::<u16>().ok()?),
            ELEMENT_TYPE::I4 => ConstantValue::I4(parser.read_le::<i32>().ok()?),
            ELEMENT_TYPE::U4 => ConstantValue::U4(parser.read_le::<u32>().ok()?),
            ELEMENT_TYPE::I8 => ConstantValue::I8(parser.read_le::<i64>().ok()?),
            ELEMENT_TYPE::U8 => ConstantValue::U8(parser.read_le::<u64>().ok()?),
            ELEMENT_TYPE::R4 => ConstantValue::R4(parser.read_le::<f32>().ok()?),
            ELEMENT_TYPE::R8 => ConstantValue::R8(parser.read_le::<f64>().ok()?),
            ELEMENT_TYPE::STRING => {
                if data.len() % 2 != 0 {
                    return None;
                }
                let units: Vec<u16> = data
                    .chunks_exact(2)
                    .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
                    .collect();
                return String::from_utf16(&units).ok().map(ConstantValue::String);
            }
            ELEMENT_TYPE::CLASS => {
                if parser.read_le::<u32>().ok()? != 0 {
                    return None;
                }
                ConstantValue::Null
            }
            _ => return None,
        };

        if parser.has_more_data() {
            return None;
        }
        Some(value)
    }

    /// Encode the value into its blob bytes.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        match self {
            ConstantValue::Boolean(value) => out.write_le(u8::from(*value)),
            ConstantValue::Char(value) | ConstantValue::U2(value) => out.write_le(*value),
            ConstantValue::I1(value) => out.write_le(*value),
            ConstantValue::U1(value) => out.write_le(*value),
            ConstantValue::I2(value) => out.write_le(*value),
            ConstantValue::I4(value) => out.write_le(*value),
            ConstantValue::U4(value) => out.write_le(*value),
            ConstantValue::I8(value) => out.write_le(*value),
            ConstantValue::U8(value) => out.write_le(*value),
            ConstantValue::R4(value) => out.write_le(*value),
            ConstantValue::R8(value) => out.write_le(*value),
            ConstantValue::String(value) => {
                for unit in value.encode_utf16() {
                    out.write_le(unit);
                }
            }
            ConstantValue::Null => out.write_le(0u32),
            ConstantValue::Raw(data) => out.extend_from_slice(data),
        }
        out
    }
}

impl ColumnValue for ConstantValue {
    #[allow(clippy::cast_possible_truncation)]
    fn read_column(
        ctx: &ReadContext,
        column: &ColumnSchema,
        raw: &[u32],
        index: usize,
    ) -> Result<Self> {
        if column.kind != ColumnKind::BlobIndex {
            return Err(kind_mismatch(column));
        }

        // the element type is the first column of the row
        let element_type = raw_value(raw, 0)? as u8;
        let data = ctx.blob(raw_value(raw, index)?)?;
        Ok(ConstantValue::decode(element_type, data).unwrap_or_else(|| {
            warn!(
                element_type,
                length = data.len(),
                "constant blob does not match its element type, keeping raw bytes"
            );
            ConstantValue::Raw(data.to_vec())
        }))
    }

    fn write_column(
        &self,
        ctx: &mut WriteContext,
        _column: &ColumnSchema,
        _previous: &[u32],
    ) -> Result<u32> {
        ctx.blobs.add(&self.encode())
    }
}

impl ConstantRow {
    /// A constant of `parent` with the element type derived from `value`.
    ///
    /// Raw values carry no element type; for them the type column is left at `0` and must
    /// be set by the caller.
    #[must_use]
    pub fn new(parent: TableIndex, value: ConstantValue) -> Self {
        ConstantRow {
            element_type: value.element_type().unwrap_or(0),
            padding: 0,
            parent,
            value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::tables::TableId;

    #[test]
    fn primitives() {
        assert_eq!(
            ConstantValue::decode(ELEMENT_TYPE::I4, &[0xFE, 0xFF, 0xFF, 0xFF]),
            Some(ConstantValue::I4(-2))
        );
        assert_eq!(
            ConstantValue::decode(ELEMENT_TYPE::BOOLEAN, &[1]),
            Some(ConstantValue::Boolean(true))
        );
        assert_eq!(
            ConstantValue::decode(ELEMENT_TYPE::R8, &1.5f64.to_le_bytes()),
            Some(ConstantValue::R8(1.5))
        );
        assert_eq!(ConstantValue::I4(-2).encode(), [0xFE, 0xFF, 0xFF, 0xFF]);
    }

    #[test]
    fn strings_and_null() {
        let value = ConstantValue::decode(ELEMENT_TYPE::STRING, &[0x48, 0x00, 0x69, 0x00]);
        assert_eq!(value, Some(ConstantValue::String("Hi".to_string())));
        assert_eq!(
            ConstantValue::decode(ELEMENT_TYPE::STRING, &[]),
            Some(ConstantValue::String(String::new()))
        );
        assert_eq!(
            ConstantValue::decode(ELEMENT_TYPE::CLASS, &[0, 0, 0, 0]),
            Some(ConstantValue::Null)
        );
        assert_eq!(ConstantValue::Null.encode(), [0, 0, 0, 0]);
    }

    #[test]
    fn mismatched_length() {
        assert_eq!(ConstantValue::decode(ELEMENT_TYPE::I4, &[1, 2]), None);
        assert_eq!(ConstantValue::decode(ELEMENT_TYPE::I2, &[1, 2, 3]), None);
        assert_eq!(ConstantValue::decode(ELEMENT_TYPE::STRING, &[0x48]), None);
    }

    #[test]
    fn row_derives_type() {
        let row = ConstantRow::new(
            TableIndex::new(TableId::Field, 3),
            ConstantValue::U8(7),
        );
        assert_eq!(row.element_type, ELEMENT_TYPE::U8);
        assert_eq!(row.padding, 0);
    }
}
