//! Encoding of custom attribute blobs.
//!
//! Argument values describe their own layout, so encoding needs no constructor signature.
//! The caller checks the argument count against the constructor.

use crate::{
    file::io::CilWrite,
    metadata::{
        customattributes::{
            CustomAttributeArgument, CustomAttributeArgumentType, CustomAttributeNamedArgument,
            CustomAttributeSignature, CUSTOM_ATTRIBUTE_PROLOG, SERIALIZATION_TYPE,
        },
        signatures::SimpleType,
    },
    Error, Result,
};

/// Encode a decoded custom attribute.
///
/// # Errors
/// Returns [`crate::Error::InvalidArgument`] if there are more than `u16::MAX` named
/// arguments or a value cannot be serialized.
pub fn encode_custom_attribute(signature: &CustomAttributeSignature) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    out.write_le(CUSTOM_ATTRIBUTE_PROLOG);
    for argument in &signature.fixed_args {
        encode_value(argument, &mut out)?;
    }

    let count = u16::try_from(signature.named_args.len()).map_err(|_| {
        Error::InvalidArgument(format!(
            "{} named arguments exceed the custom attribute limit",
            signature.named_args.len()
        ))
    })?;
    out.write_le(count);
    for argument in &signature.named_args {
        encode_named_argument(argument, &mut out)?;
    }
    Ok(out)
}

/// Append one named argument.
///
/// # Errors
/// Returns [`crate::Error::InvalidArgument`] if the value cannot be serialized.
pub fn encode_named_argument(
    argument: &CustomAttributeNamedArgument,
    out: &mut Vec<u8>,
) -> Result<()> {
    out.push(if argument.is_field {
        SERIALIZATION_TYPE::FIELD
    } else {
        SERIALIZATION_TYPE::PROPERTY
    });
    encode_argument_type(&argument.arg_type, out)?;
    out.write_ser_string(Some(&argument.name))?;
    encode_value(&argument.value, out)
}

/// Append a serialization type tag.
///
/// # Errors
/// Returns [`crate::Error::InvalidArgument`] for primitive types that cannot be serialized.
pub fn encode_argument_type(arg_type: &CustomAttributeArgumentType, out: &mut Vec<u8>) -> Result<()> {
    match arg_type {
        CustomAttributeArgumentType::Primitive(simple) => {
            let tag = *simple as u8;
            if !(SERIALIZATION_TYPE::BOOLEAN..=SERIALIZATION_TYPE::STRING).contains(&tag) {
                return Err(Error::InvalidArgument(format!(
                    "{simple:?} cannot be serialized in a custom attribute"
                )));
            }
            out.push(tag);
        }
        CustomAttributeArgumentType::Type => out.push(SERIALIZATION_TYPE::TYPE),
        CustomAttributeArgumentType::Boxed => out.push(SERIALIZATION_TYPE::TAGGED_OBJECT),
        CustomAttributeArgumentType::Enum(name) => {
            out.push(SERIALIZATION_TYPE::ENUM);
            out.write_ser_string(Some(name))?;
        }
        CustomAttributeArgumentType::SzArray(element) => {
            out.push(SERIALIZATION_TYPE::SZARRAY);
            encode_argument_type(element, out)?;
        }
    }
    Ok(())
}

/// Append one value.
///
/// # Errors
/// Returns [`crate::Error::InvalidArgument`] for arrays longer than `u32::MAX - 1`.
pub fn encode_value(value: &CustomAttributeArgument, out: &mut Vec<u8>) -> Result<()> {
    match value {
        CustomAttributeArgument::Bool(value) => out.push(u8::from(*value)),
        CustomAttributeArgument::Char(value) | CustomAttributeArgument::U2(value) => {
            out.write_le(*value);
        }
        CustomAttributeArgument::I1(value) => out.write_le(*value),
        CustomAttributeArgument::U1(value) => out.push(*value),
        CustomAttributeArgument::I2(value) => out.write_le(*value),
        CustomAttributeArgument::I4(value) => out.write_le(*value),
        CustomAttributeArgument::U4(value) => out.write_le(*value),
        CustomAttributeArgument::I8(value) => out.write_le(*value),
        CustomAttributeArgument::U8(value) => out.write_le(*value),
        CustomAttributeArgument::R4(value) => out.write_le(*value),
        CustomAttributeArgument::R8(value) => out.write_le(*value),
        CustomAttributeArgument::String(value) | CustomAttributeArgument::Type(value) => {
            out.write_ser_string(value.as_deref())?;
        }
        CustomAttributeArgument::Array(None) => out.write_le(u32::MAX),
        CustomAttributeArgument::Array(Some(elements)) => {
            let count = u32::try_from(elements.len())
                .ok()
                .filter(|count| *count != u32::MAX)
                .ok_or_else(|| Error::InvalidArgument("array argument is too long".to_string()))?;
            out.write_le(count);
            for element in elements {
                encode_value(element, out)?;
            }
        }
        CustomAttributeArgument::Boxed { arg_type, value } => {
            encode_argument_type(arg_type, out)?;
            encode_value(value, out)?;
        }
    }
    Ok(())
}

impl CustomAttributeArgumentType {
    /// The tag of a primitive value, `None` for strings, arrays and boxed values.
    #[must_use]
    pub fn of_primitive(value: &CustomAttributeArgument) -> Option<Self> {
        let simple = match value {
            CustomAttributeArgument::Bool(_) => SimpleType::Boolean,
            CustomAttributeArgument::Char(_) => SimpleType::Char,
            CustomAttributeArgument::I1(_) => SimpleType::I1,
            CustomAttributeArgument::U1(_) => SimpleType::U1,
            CustomAttributeArgument::I2(_) => SimpleType::I2,
            CustomAttributeArgument::U2(_) => SimpleType::U2,
            CustomAttributeArgument::I4(_) => SimpleType::I4,
            CustomAttributeArgument::U4(_) => SimpleType::U4,
            CustomAttributeArgument::I8(_) => SimpleType::I8,
            CustomAttributeArgument::U8(_) => SimpleType::U8,
            CustomAttributeArgument::R4(_) => SimpleType::R4,
            CustomAttributeArgument::R8(_) => SimpleType::R8,
            _ => return None,
        };
        Some(CustomAttributeArgumentType::Primitive(simple))
    }
}
