//! Custom attribute values (ECMA-335 II.23.3).
//!
//! The value blob of a `CustomAttribute` row starts with the prolog `0x0001`, followed by
//! one value per constructor parameter and a list of named field and property assignments.
//! Fixed arguments are laid out after the constructor signature, so decoding needs the
//! `MethodDef` or `MemberRef` row the attribute references. Rows whose blob cannot be decoded
//! against their constructor are kept as [`CustomAttributeValue::Raw`] and written back
//! unchanged.
//!
//! # Examples
//!
//! ```rust
//! use dotmeta::metadata::customattributes::{
//!     encode_custom_attribute, CustomAttributeArgument, CustomAttributeSignature,
//! };
//!
//! let signature = CustomAttributeSignature {
//!     fixed_args: vec![CustomAttributeArgument::String(Some("1.0".to_string()))],
//!     named_args: Vec::new(),
//! };
//! let blob = encode_custom_attribute(&signature)?;
//! assert_eq!(blob, [0x01, 0x00, 0x03, b'1', b'.', b'0', 0x00, 0x00]);
//! # Ok::<(), dotmeta::Error>(())
//! ```

mod encoder;
mod parser;
mod types;

pub use encoder::*;
pub use parser::*;
pub use types::*;

use tracing::warn;

use crate::{
    metadata::{
        signatures::SimpleType,
        tables::{
            kind_mismatch, raw_value, CodedIndexType, ColumnKind, ColumnSchema, ColumnValue,
            MetadataTables, ReadContext, TableId, TableIndex, WriteContext,
        },
    },
    Error, Result,
};

impl EnumResolver for ReadContext<'_> {
    fn type_name(&self, type_ref: TableIndex) -> Option<(&str, &str)> {
        ReadContext::type_name(self, type_ref)
    }

    fn enum_underlying_type(&self, type_ref: TableIndex) -> Option<SimpleType> {
        ReadContext::enum_underlying_type(self, type_ref)
    }

    fn enum_underlying_type_by_name(&self, name: &str) -> Option<SimpleType> {
        let (namespace, name) = split_type_name(name);
        let row = self.find_type_def(namespace, name)?;
        ReadContext::enum_underlying_type(self, TableIndex::new(TableId::TypeDef, row))
    }
}

impl EnumResolver for MetadataTables {
    fn type_name(&self, type_ref: TableIndex) -> Option<(&str, &str)> {
        MetadataTables::type_name(self, type_ref)
    }

    fn enum_underlying_type(&self, type_ref: TableIndex) -> Option<SimpleType> {
        MetadataTables::enum_underlying_type(self, type_ref)
    }

    fn enum_underlying_type_by_name(&self, name: &str) -> Option<SimpleType> {
        let (namespace, name) = split_type_name(name);
        let row = self.find_type_def(namespace, name)?;
        MetadataTables::enum_underlying_type(self, TableIndex::new(TableId::TypeDef, row))
    }
}

impl CustomAttributeValue {
    /// Decode `data` against the constructor signature, keeping the bytes verbatim if the
    /// constructor is unknown or the blob does not match it.
    #[must_use]
    pub fn resolve(data: &[u8], constructor: Option<TableIndex>, ctx: &ReadContext) -> Self {
        let Some(constructor) = constructor else {
            warn!("custom attribute without constructor, keeping raw value");
            return CustomAttributeValue::Raw(data.to_vec());
        };

        if constructor.index >= ctx.row_count(constructor.table) {
            warn!(%constructor, "custom attribute constructor out of range, keeping raw value");
            return CustomAttributeValue::Raw(data.to_vec());
        }

        let Some(signature) = ctx.method_signature(constructor) else {
            warn!(%constructor, "custom attribute constructor has no method signature, keeping raw value");
            return CustomAttributeValue::Raw(data.to_vec());
        };

        match parse_custom_attribute(data, &signature, ctx) {
            Ok(value) => CustomAttributeValue::Resolved(value),
            Err(error) => {
                warn!(%constructor, %error, "undecodable custom attribute, keeping raw value");
                CustomAttributeValue::Raw(data.to_vec())
            }
        }
    }

    /// The blob bytes of this value.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidArgument`] if a resolved value cannot be serialized.
    pub fn encode(&self) -> Result<Vec<u8>> {
        match self {
            CustomAttributeValue::Resolved(signature) => encode_custom_attribute(signature),
            CustomAttributeValue::Raw(data) => Ok(data.clone()),
        }
    }
}

impl ColumnValue for CustomAttributeValue {
    fn read_column(
        ctx: &ReadContext,
        column: &ColumnSchema,
        raw: &[u32],
        index: usize,
    ) -> Result<Self> {
        if column.kind != ColumnKind::BlobIndex {
            return Err(kind_mismatch(column));
        }

        let data = ctx.blob(raw_value(raw, index)?)?;
        let constructor = CodedIndexType::CustomAttributeType
            .decode(raw_value(raw, 1)?)
            .ok()
            .flatten();
        Ok(CustomAttributeValue::resolve(data, constructor, ctx))
    }

    fn write_column(
        &self,
        ctx: &mut WriteContext,
        _column: &ColumnSchema,
        previous: &[u32],
    ) -> Result<u32> {
        let CustomAttributeValue::Resolved(signature) = self else {
            return ctx.blobs.add(&self.encode()?);
        };

        let constructor = CodedIndexType::CustomAttributeType
            .decode(raw_value(previous, 1)?)?
            .ok_or_else(|| {
                Error::InvalidArgument(format!(
                    "custom attribute {:?} has no constructor",
                    ctx.current
                ))
            })?;
        if let Some(constructor_signature) = ctx.method_signature(constructor) {
            if constructor_signature.params.len() != signature.fixed_args.len() {
                return Err(Error::InvalidArgument(format!(
                    "custom attribute {:?} has {} fixed arguments, constructor {:?} takes {}",
                    ctx.current,
                    signature.fixed_args.len(),
                    constructor,
                    constructor_signature.params.len()
                )));
            }
        }

        let data = encode_custom_attribute(signature)?;
        ctx.blobs.add(&data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        file::parser::Parser,
        metadata::signatures::{
            SignatureClassOrValue, SignatureMethod, SignatureSzArray, TypeSignature,
        },
    };

    struct Resolver;

    impl EnumResolver for Resolver {
        fn type_name(&self, type_ref: TableIndex) -> Option<(&str, &str)> {
            match type_ref.index {
                0 => Some(("System", "Type")),
                1 => Some(("Test", "Color")),
                _ => None,
            }
        }

        fn enum_underlying_type(&self, type_ref: TableIndex) -> Option<SimpleType> {
            (type_ref.index == 1).then_some(SimpleType::U1)
        }

        fn enum_underlying_type_by_name(&self, name: &str) -> Option<SimpleType> {
            (split_type_name(name) == ("Test", "Color")).then_some(SimpleType::U1)
        }
    }

    fn class(index: u32, is_class: bool) -> TypeSignature {
        TypeSignature::ClassOrValue(SignatureClassOrValue {
            is_class,
            type_ref: TableIndex::new(TableId::TypeRef, index),
            generic_arguments: Vec::new(),
        })
    }

    #[test]
    fn string_argument() {
        let ctor = SignatureMethod::new(
            TypeSignature::Simple(SimpleType::Void),
            vec![TypeSignature::Simple(SimpleType::String)],
        );
        let data = [0x01, 0x00, 0x05, b'H', b'e', b'l', b'l', b'o', 0x00, 0x00];

        let value = parse_custom_attribute(&data, &ctor, &Resolver).unwrap();
        assert_eq!(
            value.fixed_args,
            [CustomAttributeArgument::String(Some("Hello".to_string()))]
        );
        assert!(value.named_args.is_empty());
        assert_eq!(encode_custom_attribute(&value).unwrap(), data);
    }

    #[test]
    fn enum_type_and_array_arguments() {
        let ctor = SignatureMethod::new(
            TypeSignature::Simple(SimpleType::Void),
            vec![
                class(1, false),
                class(0, true),
                TypeSignature::SimpleArray(SignatureSzArray {
                    modifiers: Vec::new(),
                    base: Box::new(TypeSignature::Simple(SimpleType::I4)),
                }),
            ],
        );
        let mut data = vec![0x01, 0x00, 0x02, 0xFF];
        data.extend_from_slice(&2u32.to_le_bytes());
        data.extend_from_slice(&7i32.to_le_bytes());
        data.extend_from_slice(&(-1i32).to_le_bytes());
        data.extend_from_slice(&[0x00, 0x00]);

        let value = parse_custom_attribute(&data, &ctor, &Resolver).unwrap();
        assert_eq!(
            value.fixed_args,
            [
                CustomAttributeArgument::U1(2),
                CustomAttributeArgument::Type(None),
                CustomAttributeArgument::Array(Some(vec![
                    CustomAttributeArgument::I4(7),
                    CustomAttributeArgument::I4(-1),
                ])),
            ]
        );
        assert_eq!(encode_custom_attribute(&value).unwrap(), data);
    }

    #[test]
    fn named_arguments() {
        let ctor = SignatureMethod::new(TypeSignature::Simple(SimpleType::Void), Vec::new());
        let mut data = vec![0x01, 0x00, 0x03, 0x00];
        // property bool Inherited = true
        data.extend_from_slice(&[0x54, 0x02, 0x09]);
        data.extend_from_slice(b"Inherited");
        data.push(0x01);
        // field object Tag = (int)5
        data.extend_from_slice(&[0x53, 0x51, 0x03, b'T', b'a', b'g', 0x08]);
        data.extend_from_slice(&5i32.to_le_bytes());
        // property Color Shade = 3
        data.extend_from_slice(&[0x54, 0x55, 0x0A]);
        data.extend_from_slice(b"Test.Color");
        data.extend_from_slice(&[0x05]);
        data.extend_from_slice(b"Shade");
        data.push(0x03);

        let value = parse_custom_attribute(&data, &ctor, &Resolver).unwrap();
        assert_eq!(value.named_args.len(), 3);
        assert!(!value.named_args[0].is_field);
        assert_eq!(value.named_args[0].name, "Inherited");
        assert_eq!(value.named_args[0].value, CustomAttributeArgument::Bool(true));
        assert_eq!(
            value.named_args[1].value,
            CustomAttributeArgument::Boxed {
                arg_type: CustomAttributeArgumentType::Primitive(SimpleType::I4),
                value: Box::new(CustomAttributeArgument::I4(5)),
            }
        );
        assert_eq!(
            value.named_args[2].arg_type,
            CustomAttributeArgumentType::Enum("Test.Color".to_string())
        );
        assert_eq!(value.named_args[2].value, CustomAttributeArgument::U1(3));
        assert_eq!(encode_custom_attribute(&value).unwrap(), data);
    }

    #[test]
    fn rejects_malformed_blobs() {
        let ctor = SignatureMethod::new(
            TypeSignature::Simple(SimpleType::Void),
            vec![TypeSignature::Simple(SimpleType::Boolean)],
        );
        assert!(parse_custom_attribute(&[0x02, 0x00, 0x01, 0x00, 0x00], &ctor, &Resolver).is_err());
        assert!(parse_custom_attribute(&[0x01, 0x00, 0x02, 0x00, 0x00], &ctor, &Resolver).is_err());
        assert!(parse_custom_attribute(&[0x01, 0x00, 0x01, 0x00, 0x00, 0x00], &ctor, &Resolver).is_err());
        assert!(parse_custom_attribute(&[0x01, 0x00, 0x01], &ctor, &Resolver).is_err());

        // enum parameter that does not resolve
        let ctor = SignatureMethod::new(TypeSignature::Simple(SimpleType::Void), vec![class(5, false)]);
        assert!(parse_custom_attribute(&[0x01, 0x00, 0x01, 0x00, 0x00], &ctor, &Resolver).is_err());
    }

    #[test]
    fn array_length_is_bounded() {
        let ctor = SignatureMethod::new(
            TypeSignature::Simple(SimpleType::Void),
            vec![TypeSignature::SimpleArray(SignatureSzArray {
                modifiers: Vec::new(),
                base: Box::new(TypeSignature::Simple(SimpleType::U1)),
            })],
        );
        let mut data = vec![0x01, 0x00];
        data.extend_from_slice(&0x1000u32.to_le_bytes());
        data.extend_from_slice(&[0x00, 0x00]);
        assert!(parse_custom_attribute(&data, &ctor, &Resolver).is_err());
    }

    #[test]
    fn nested_boxes_hit_the_depth_limit() {
        // one named field of type object, boxing object inside object
        let mut data = vec![0x01, 0x00, 0x53];
        data.extend(std::iter::repeat(0x51).take(MAX_NESTING_DEPTH + 10));
        let result = parse_named_arguments(&mut Parser::new(&data), &Resolver, false);
        assert!(matches!(result, Err(Error::RecursionLimit(MAX_NESTING_DEPTH))));
    }

    #[test]
    fn type_name_splitting() {
        assert_eq!(split_type_name("System.AttributeTargets"), ("System", "AttributeTargets"));
        assert_eq!(
            split_type_name("Test.Color, Test, Version=1.0.0.0, Culture=neutral"),
            ("Test", "Color")
        );
        assert_eq!(split_type_name("Outer.Type+Inner"), ("", "Inner"));
        assert_eq!(split_type_name("Plain"), ("", "Plain"));
    }

    #[test]
    fn unencodable_primitive() {
        let signature = CustomAttributeSignature {
            fixed_args: Vec::new(),
            named_args: vec![CustomAttributeNamedArgument {
                is_field: true,
                arg_type: CustomAttributeArgumentType::Primitive(SimpleType::I),
                name: "Pointer".to_string(),
                value: CustomAttributeArgument::I8(0),
            }],
        };
        assert!(matches!(
            encode_custom_attribute(&signature),
            Err(Error::InvalidArgument(_))
        ));
    }
}
