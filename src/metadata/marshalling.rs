//! Marshaling descriptors of the `FieldMarshal` table (ECMA-335 II.23.4).
//!
//! A descriptor starts with the compressed native type. Intrinsic native types end there,
//! the others carry type-specific trailing fields, each of which may be omitted from the end:
//!
//! | Native type | Trailing fields |
//! |-------------|-----------------|
//! | `FIXEDSYSSTRING` | size |
//! | `FIXEDARRAY` | size, element type |
//! | `ARRAY` | element type, size parameter index, element count, flags |
//! | `SAFEARRAY` | variant type, user defined subtype name |
//! | `CUSTOMMARSHALER` | GUID, native type name, marshaler type name, cookie |
//! | `IUNKNOWN`, `IDISPATCH`, `INTERFACE`, `IINSPECTABLE` | IID parameter index |
//!
//! Numbers are compressed unsigned integers, strings are length-prefixed UTF-8. Descriptors
//! that do not decode into exactly their own bytes are kept as [`MarshallingInfo::Raw`].

use tracing::warn;

use crate::{
    file::{io::CilWrite, parser::Parser},
    metadata::tables::{
        kind_mismatch, raw_value, ColumnKind, ColumnSchema, ColumnValue, ReadContext,
        WriteContext,
    },
    Result,
};

#[allow(non_snake_case, missing_docs)]
/// Native type constants (`NATIVE_TYPE_*` of CoreCLR's `corhdr.h`).
pub mod NATIVE_TYPE {
    pub const END: u32 = 0x00;
    pub const VOID: u32 = 0x01;
    pub const BOOLEAN: u32 = 0x02;
    pub const I1: u32 = 0x03;
    pub const U1: u32 = 0x04;
    pub const I2: u32 = 0x05;
    pub const U2: u32 = 0x06;
    pub const I4: u32 = 0x07;
    pub const U4: u32 = 0x08;
    pub const I8: u32 = 0x09;
    pub const U8: u32 = 0x0a;
    pub const R4: u32 = 0x0b;
    pub const R8: u32 = 0x0c;
    pub const SYSCHAR: u32 = 0x0d;
    pub const VARIANT: u32 = 0x0e;
    pub const CURRENCY: u32 = 0x0f;
    pub const PTR: u32 = 0x10;
    pub const DECIMAL: u32 = 0x11;
    pub const DATE: u32 = 0x12;
    pub const BSTR: u32 = 0x13;
    pub const LPSTR: u32 = 0x14;
    pub const LPWSTR: u32 = 0x15;
    pub const LPTSTR: u32 = 0x16;
    pub const FIXEDSYSSTRING: u32 = 0x17;
    pub const OBJECTREF: u32 = 0x18;
    pub const IUNKNOWN: u32 = 0x19;
    pub const IDISPATCH: u32 = 0x1a;
    pub const STRUCT: u32 = 0x1b;
    pub const INTERFACE: u32 = 0x1c;
    pub const SAFEARRAY: u32 = 0x1d;
    pub const FIXEDARRAY: u32 = 0x1e;
    pub const INT: u32 = 0x1f;
    pub const UINT: u32 = 0x20;
    pub const NESTEDSTRUCT: u32 = 0x21;
    pub const BYVALSTR: u32 = 0x22;
    pub const ANSIBSTR: u32 = 0x23;
    pub const TBSTR: u32 = 0x24;
    pub const VARIANTBOOL: u32 = 0x25;
    pub const FUNC: u32 = 0x26;
    pub const ASANY: u32 = 0x28;
    pub const ARRAY: u32 = 0x2a;
    pub const LPSTRUCT: u32 = 0x2b;
    pub const CUSTOMMARSHALER: u32 = 0x2c;
    pub const ERROR: u32 = 0x2d;
    pub const IINSPECTABLE: u32 = 0x2e;
    pub const HSTRING: u32 = 0x2f;
    pub const LPUTF8STR: u32 = 0x30;
    /// Placeholder for an omitted array element type
    pub const MAX: u32 = 0x50;
}

#[allow(non_snake_case, missing_docs)]
/// COM `VARTYPE` constants used as safe array element types.
pub mod VARIANT_TYPE {
    pub const EMPTY: u32 = 0;
    pub const NULL: u32 = 1;
    pub const I2: u32 = 2;
    pub const I4: u32 = 3;
    pub const R4: u32 = 4;
    pub const R8: u32 = 5;
    pub const CY: u32 = 6;
    pub const DATE: u32 = 7;
    pub const BSTR: u32 = 8;
    pub const DISPATCH: u32 = 9;
    pub const ERROR: u32 = 10;
    pub const BOOL: u32 = 11;
    pub const VARIANT: u32 = 12;
    pub const UNKNOWN: u32 = 13;
    pub const DECIMAL: u32 = 14;
    pub const I1: u32 = 16;
    pub const UI1: u32 = 17;
    pub const UI2: u32 = 18;
    pub const UI4: u32 = 19;
    pub const I8: u32 = 20;
    pub const UI8: u32 = 21;
    pub const INT: u32 = 22;
    pub const UINT: u32 = 23;
    pub const VOID: u32 = 24;
    pub const HRESULT: u32 = 25;
    pub const PTR: u32 = 26;
    pub const SAFEARRAY: u32 = 27;
    pub const CARRAY: u32 = 28;
    pub const USERDEFINED: u32 = 29;
    pub const LPSTR: u32 = 30;
    pub const LPWSTR: u32 = 31;
    pub const RECORD: u32 = 36;
    pub const INT_PTR: u32 = 37;
    pub const UINT_PTR: u32 = 38;
    pub const VECTOR: u32 = 0x1000;
    pub const ARRAY: u32 = 0x2000;
    pub const BYREF: u32 = 0x4000;
    pub const TYPEMASK: u32 = 0xfff;
}

/// A decoded marshaling descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarshallingInfo {
    /// A native type without trailing fields
    Simple(u32),
    /// `ByValTStr`, an inline string of fixed size
    FixedSysString {
        /// Size in characters
        size: Option<u32>,
    },
    /// `ByValArray`, an inline array of fixed size
    FixedArray {
        /// Element count
        size: Option<u32>,
        /// Native element type
        element_type: Option<u32>,
    },
    /// `LPArray`
    Array {
        /// Native element type
        element_type: Option<u32>,
        /// Parameter carrying the element count
        size_parameter_index: Option<u32>,
        /// Constant element count
        size: Option<u32>,
        /// Flags, bit 0 set when the parameter index was specified
        flags: Option<u32>,
    },
    /// `SafeArray`
    SafeArray {
        /// `VARTYPE` of the elements
        variant_type: Option<u32>,
        /// Assembly qualified name of the user defined element type
        user_defined_subtype: Option<String>,
    },
    /// `CustomMarshaler`
    CustomMarshaler {
        /// GUID string, unused by the runtime
        guid: String,
        /// Native type name, unused by the runtime
        native_type_name: String,
        /// Assembly qualified name of the marshaler
        marshaler_type: String,
        /// Cookie passed to the marshaler
        cookie: String,
    },
    /// COM interface types with an optional IID parameter
    Interface {
        /// `IUNKNOWN`, `IDISPATCH`, `INTERFACE` or `IINSPECTABLE`
        native_type: u32,
        /// Parameter carrying the IID
        iid_parameter_index: Option<u32>,
    },
    /// A descriptor kept verbatim
    Raw(Vec<u8>),
}

impl MarshallingInfo {
    /// Decode a descriptor, `Raw` if it does not decode losslessly.
    #[must_use]
    pub fn parse(data: &[u8]) -> MarshallingInfo {
        let decoded = MarshallingParser::new(data).parse();
        match decoded {
            Ok(info) if info.encode().ok().as_deref() == Some(data) => info,
            Ok(_) => {
                warn!(length = data.len(), "marshaling descriptor does not round-trip, keeping raw bytes");
                MarshallingInfo::Raw(data.to_vec())
            }
            Err(error) => {
                warn!(%error, "undecodable marshaling descriptor, keeping raw bytes");
                MarshallingInfo::Raw(data.to_vec())
            }
        }
    }

    /// The native type of the descriptor, `None` for raw descriptors.
    #[must_use]
    pub fn native_type(&self) -> Option<u32> {
        Some(match self {
            MarshallingInfo::Simple(native_type)
            | MarshallingInfo::Interface { native_type, .. } => *native_type,
            MarshallingInfo::FixedSysString { .. } => NATIVE_TYPE::FIXEDSYSSTRING,
            MarshallingInfo::FixedArray { .. } => NATIVE_TYPE::FIXEDARRAY,
            MarshallingInfo::Array { .. } => NATIVE_TYPE::ARRAY,
            MarshallingInfo::SafeArray { .. } => NATIVE_TYPE::SAFEARRAY,
            MarshallingInfo::CustomMarshaler { .. } => NATIVE_TYPE::CUSTOMMARSHALER,
            MarshallingInfo::Raw(_) => return None,
        })
    }

    /// Encode the descriptor. Optional fields are written up to the first absent one,
    /// except for the array element type which is written as `NATIVE_TYPE::MAX` when later
    /// fields follow.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidArgument`] for numbers that exceed the compressed range.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        if let MarshallingInfo::Raw(data) = self {
            out.extend_from_slice(data);
            return Ok(out);
        }

        if let Some(native_type) = self.native_type() {
            out.write_compressed_uint(native_type)?;
        }
        match self {
            MarshallingInfo::FixedSysString { size } => write_optional(&mut out, &[*size])?,
            MarshallingInfo::FixedArray { size, element_type } => {
                write_optional(&mut out, &[*size, *element_type])?;
            }
            MarshallingInfo::Array {
                element_type,
                size_parameter_index,
                size,
                flags,
            } => {
                let element_type = if element_type.is_none()
                    && (size_parameter_index.is_some() || size.is_some() || flags.is_some())
                {
                    Some(NATIVE_TYPE::MAX)
                } else {
                    *element_type
                };
                write_optional(&mut out, &[element_type, *size_parameter_index, *size, *flags])?;
            }
            MarshallingInfo::SafeArray {
                variant_type,
                user_defined_subtype,
            } => {
                if let Some(variant_type) = variant_type {
                    out.write_compressed_uint(*variant_type)?;
                    if let Some(name) = user_defined_subtype {
                        out.write_ser_string(Some(name))?;
                    }
                }
            }
            MarshallingInfo::CustomMarshaler {
                guid,
                native_type_name,
                marshaler_type,
                cookie,
            } => {
                for value in [guid, native_type_name, marshaler_type, cookie] {
                    out.write_ser_string(Some(value))?;
                }
            }
            MarshallingInfo::Interface {
                iid_parameter_index,
                ..
            } => write_optional(&mut out, &[*iid_parameter_index])?,
            MarshallingInfo::Simple(_) | MarshallingInfo::Raw(_) => {}
        }
        Ok(out)
    }
}

fn write_optional(out: &mut Vec<u8>, values: &[Option<u32>]) -> Result<()> {
    for value in values.iter().map_while(|value| *value) {
        out.write_compressed_uint(value)?;
    }
    Ok(())
}

/// Cursor over one marshaling descriptor.
pub struct MarshallingParser<'a> {
    parser: Parser<'a>,
}

impl<'a> MarshallingParser<'a> {
    /// Create a parser over `data`.
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        MarshallingParser {
            parser: Parser::new(data),
        }
    }

    fn optional(&mut self) -> Result<Option<u32>> {
        if self.parser.has_more_data() {
            Ok(Some(self.parser.read_compressed_uint()?))
        } else {
            Ok(None)
        }
    }

    fn string(&mut self) -> Result<String> {
        Ok(self.parser.read_ser_string()?.unwrap_or_default())
    }

    /// Decode the descriptor.
    ///
    /// # Errors
    /// Returns an error on truncated data or trailing bytes.
    pub fn parse(&mut self) -> Result<MarshallingInfo> {
        let native_type = self.parser.read_compressed_uint()?;
        let info = match native_type {
            NATIVE_TYPE::FIXEDSYSSTRING => MarshallingInfo::FixedSysString {
                size: self.optional()?,
            },
            NATIVE_TYPE::FIXEDARRAY => {
                let size = self.optional()?;
                let element_type = self.optional()?;
                MarshallingInfo::FixedArray { size, element_type }
            }
            NATIVE_TYPE::ARRAY => {
                let element_type = self
                    .optional()?
                    .filter(|element_type| *element_type != NATIVE_TYPE::MAX);
                let size_parameter_index = self.optional()?;
                let size = self.optional()?;
                let flags = self.optional()?;
                MarshallingInfo::Array {
                    element_type,
                    size_parameter_index,
                    size,
                    flags,
                }
            }
            NATIVE_TYPE::SAFEARRAY => {
                let variant_type = self.optional()?;
                let user_defined_subtype = if self.parser.has_more_data() {
                    self.parser.read_ser_string()?
                } else {
                    None
                };
                MarshallingInfo::SafeArray {
                    variant_type,
                    user_defined_subtype,
                }
            }
            NATIVE_TYPE::CUSTOMMARSHALER => MarshallingInfo::CustomMarshaler {
                guid: self.string()?,
                native_type_name: self.string()?,
                marshaler_type: self.string()?,
                cookie: self.string()?,
            },
            NATIVE_TYPE::IUNKNOWN
            | NATIVE_TYPE::IDISPATCH
            | NATIVE_TYPE::INTERFACE
            | NATIVE_TYPE::IINSPECTABLE => MarshallingInfo::Interface {
                native_type,
                iid_parameter_index: self.optional()?,
            },
            other => MarshallingInfo::Simple(other),
        };

        if self.parser.has_more_data() {
            return Err(malformed_error!(
                "{} trailing bytes after marshaling descriptor 0x{:02x}",
                self.parser.remaining(),
                native_type
            ));
        }
        Ok(info)
    }
}

impl ColumnValue for MarshallingInfo {
    fn read_column(
        ctx: &ReadContext,
        column: &ColumnSchema,
        raw: &[u32],
        index: usize,
    ) -> Result<Self> {
        if column.kind != ColumnKind::BlobIndex {
            return Err(kind_mismatch(column));
        }
        Ok(MarshallingInfo::parse(ctx.blob(raw_value(raw, index)?)?))
    }

    fn write_column(
        &self,
        ctx: &mut WriteContext,
        _column: &ColumnSchema,
        _previous: &[u32],
    ) -> Result<u32> {
        ctx.blobs.add(&self.encode()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple() {
        assert_eq!(
            MarshallingInfo::parse(&[0x13]),
            MarshallingInfo::Simple(NATIVE_TYPE::BSTR)
        );
        assert_eq!(MarshallingInfo::Simple(NATIVE_TYPE::I4).encode().unwrap(), [0x07]);
    }

    #[test]
    fn arrays() {
        let info = MarshallingInfo::parse(&[0x2a, 0x07, 0x02]);
        assert_eq!(
            info,
            MarshallingInfo::Array {
                element_type: Some(NATIVE_TYPE::I4),
                size_parameter_index: Some(2),
                size: None,
                flags: None,
            }
        );

        let info = MarshallingInfo::parse(&[0x2a, 0x50, 0x01, 0x00, 0x01]);
        assert_eq!(
            info,
            MarshallingInfo::Array {
                element_type: None,
                size_parameter_index: Some(1),
                size: Some(0),
                flags: Some(1),
            }
        );
        assert_eq!(info.encode().unwrap(), [0x2a, 0x50, 0x01, 0x00, 0x01]);

        assert_eq!(
            MarshallingInfo::parse(&[0x1e, 0x10, 0x04]),
            MarshallingInfo::FixedArray {
                size: Some(16),
                element_type: Some(NATIVE_TYPE::U1),
            }
        );
    }

    #[test]
    fn safe_array_and_custom_marshaler() {
        let data = [0x1d, 0x08];
        assert_eq!(
            MarshallingInfo::parse(&data),
            MarshallingInfo::SafeArray {
                variant_type: Some(VARIANT_TYPE::BSTR),
                user_defined_subtype: None,
            }
        );

        #[rustfmt::skip]
        let data = [
            0x2c,
            0x00,
            0x00,
            0x03, b'M', b'a', b'r',
            0x02, b'c', b'k',
        ];
        let info = MarshallingInfo::parse(&data);
        assert_eq!(
            info,
            MarshallingInfo::CustomMarshaler {
                guid: String::new(),
                native_type_name: String::new(),
                marshaler_type: "Mar".to_string(),
                cookie: "ck".to_string(),
            }
        );
        assert_eq!(info.encode().unwrap(), data);
    }

    #[test]
    fn interface_with_iid() {
        assert_eq!(
            MarshallingInfo::parse(&[0x19, 0x01]),
            MarshallingInfo::Interface {
                native_type: NATIVE_TYPE::IUNKNOWN,
                iid_parameter_index: Some(1),
            }
        );
    }

    #[test]
    fn undecodable_is_raw() {
        // intrinsic type with trailing bytes
        assert_eq!(
            MarshallingInfo::parse(&[0x07, 0x01]),
            MarshallingInfo::Raw(vec![0x07, 0x01])
        );
        assert_eq!(MarshallingInfo::parse(&[]), MarshallingInfo::Raw(Vec::new()));
        // non-canonical compressed size
        assert_eq!(
            MarshallingInfo::parse(&[0x17, 0x80, 0x05]),
            MarshallingInfo::Raw(vec![0x17, 0x80, 0x05])
        );
    }
}
