use tracing::warn;

use crate::{
    file::{io::CilWrite, parser::Parser},
    metadata::{
        customattributes::{
            encode_named_argument, parse_named_arguments, CustomAttributeArgument,
            CustomAttributeArgumentType, CustomAttributeNamedArgument, EnumResolver,
        },
        security::{PermissionSet, SecurityAttribute, SecurityNamedArguments},
        signatures::SimpleType,
    },
    Error, Result,
};

/// First byte of a binary permission set.
pub const BINARY_PERMISSION_SET_MARKER: u8 = b'.';

/// Type of the attribute a legacy XML permission set stands for.
pub const PERMISSION_SET_ATTRIBUTE: &str = "System.Security.Permissions.PermissionSetAttribute, mscorlib, Version=4.0.0.0, Culture=neutral, PublicKeyToken=b77a5c561934e089";

impl PermissionSet {
    /// Decode a permission set blob.
    ///
    /// Attributes whose named arguments cannot be decoded keep their argument bytes, a blob
    /// in no known format is kept whole.
    ///
    /// # Errors
    /// Returns an error if the attribute list of a binary permission set is truncated.
    pub fn parse(data: &[u8], resolver: &dyn EnumResolver) -> Result<PermissionSet> {
        match data.first() {
            Some(&BINARY_PERMISSION_SET_MARKER) => Self::parse_binary(data, resolver),
            _ => Ok(match decode_utf16(data) {
                Some(xml) => PermissionSet::Xml(xml),
                None => PermissionSet::Raw(data.to_vec()),
            }),
        }
    }

    fn parse_binary(data: &[u8], resolver: &dyn EnumResolver) -> Result<PermissionSet> {
        let mut parser = Parser::new(data);
        parser.advance()?;

        let count = parser.read_compressed_uint()? as usize;
        let mut attributes = Vec::with_capacity(count.min(parser.remaining()));
        for _ in 0..count {
            let type_name = parser
                .read_ser_string()?
                .ok_or_else(|| malformed_error!("Security attribute without a type name"))?;
            let length = parser.read_compressed_uint()? as usize;
            let arguments = parser.read_bytes(length)?;

            let mut arguments_parser = Parser::new(arguments);
            let named_args = match parse_named_arguments(&mut arguments_parser, resolver, true) {
                Ok(named_args) if !arguments_parser.has_more_data() => {
                    SecurityNamedArguments::Resolved(named_args)
                }
                Ok(_) => {
                    warn!(%type_name, "trailing bytes in security attribute, keeping raw arguments");
                    SecurityNamedArguments::Raw(arguments.to_vec())
                }
                Err(error) => {
                    warn!(%type_name, %error, "undecodable security attribute, keeping raw arguments");
                    SecurityNamedArguments::Raw(arguments.to_vec())
                }
            };

            attributes.push(SecurityAttribute {
                type_name,
                named_args,
            });
        }

        if parser.has_more_data() {
            return Err(malformed_error!(
                "{} trailing bytes after permission set",
                parser.remaining()
            ));
        }
        Ok(PermissionSet::Attributes(attributes))
    }

    /// Encode the permission set into its blob bytes.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidArgument`] if an argument cannot be serialized.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        match self {
            PermissionSet::Attributes(attributes) => {
                out.push(BINARY_PERMISSION_SET_MARKER);
                out.write_compressed_uint(length_u32(attributes.len())?)?;
                for attribute in attributes {
                    out.write_ser_string(Some(&attribute.type_name))?;
                    let arguments = attribute.named_args.encode()?;
                    out.write_compressed_uint(length_u32(arguments.len())?)?;
                    out.extend_from_slice(&arguments);
                }
            }
            PermissionSet::Xml(xml) => {
                for unit in xml.encode_utf16() {
                    out.write_le(unit);
                }
            }
            PermissionSet::Raw(data) => out.extend_from_slice(data),
        }
        Ok(out)
    }

    /// The permission set as a list of attributes. A legacy XML set becomes a single
    /// `PermissionSetAttribute` with the document in its `XML` property.
    #[must_use]
    pub fn to_attributes(&self) -> Vec<SecurityAttribute> {
        match self {
            PermissionSet::Attributes(attributes) => attributes.clone(),
            PermissionSet::Xml(xml) => vec![SecurityAttribute {
                type_name: PERMISSION_SET_ATTRIBUTE.to_string(),
                named_args: SecurityNamedArguments::Resolved(vec![CustomAttributeNamedArgument {
                    is_field: false,
                    arg_type: CustomAttributeArgumentType::Primitive(SimpleType::String),
                    name: "XML".to_string(),
                    value: CustomAttributeArgument::String(Some(xml.clone())),
                }]),
            }],
            PermissionSet::Raw(_) => Vec::new(),
        }
    }

    /// Whether any attribute kept raw arguments.
    #[must_use]
    pub fn has_raw_arguments(&self) -> bool {
        match self {
            PermissionSet::Attributes(attributes) => attributes
                .iter()
                .any(|attribute| matches!(attribute.named_args, SecurityNamedArguments::Raw(_))),
            _ => false,
        }
    }
}

impl SecurityNamedArguments {
    /// Argument bytes: the compressed count followed by the arguments.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidArgument`] if an argument cannot be serialized.
    pub fn encode(&self) -> Result<Vec<u8>> {
        match self {
            SecurityNamedArguments::Resolved(named_args) => {
                let mut out = Vec::new();
                out.write_compressed_uint(length_u32(named_args.len())?)?;
                for argument in named_args {
                    encode_named_argument(argument, &mut out)?;
                }
                Ok(out)
            }
            SecurityNamedArguments::Raw(data) => Ok(data.clone()),
        }
    }
}

fn length_u32(length: usize) -> Result<u32> {
    u32::try_from(length)
        .map_err(|_| Error::InvalidArgument(format!("{length} exceeds a compressed length")))
}

fn decode_utf16(data: &[u8]) -> Option<String> {
    if data.len() % 2 != 0 {
        return None;
    }
    let units: Vec<u16> = data
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    String::from_utf16(&units).ok()
}
