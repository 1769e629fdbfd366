//! Decoding of custom attribute blobs.
//!
//! Fixed arguments carry no type information of their own, their layout follows from the
//! constructor signature. Enum arguments additionally need the underlying type of the enum,
//! which is provided by an [`EnumResolver`]. Whenever a type cannot be resolved, decoding
//! fails and the caller keeps the blob verbatim.

use crate::{
    file::parser::Parser,
    metadata::{
        customattributes::{
            CustomAttributeArgument, CustomAttributeArgumentType, CustomAttributeNamedArgument,
            CustomAttributeSignature, SERIALIZATION_TYPE,
        },
        signatures::{SignatureMethod, SimpleType, TypeSignature},
        tables::TableIndex,
    },
    Error::RecursionLimit,
    Result,
};

/// Maximum nesting of boxed values and arrays.
pub const MAX_NESTING_DEPTH: usize = 50;

/// Prolog of every custom attribute blob.
pub const CUSTOM_ATTRIBUTE_PROLOG: u16 = 0x0001;

/// Type information needed to decode arguments.
pub trait EnumResolver {
    /// `(namespace, name)` of a `TypeDef` or `TypeRef`.
    fn type_name(&self, type_ref: TableIndex) -> Option<(&str, &str)>;

    /// Underlying type of the enum `type_ref` points at, `None` if it is unknown or not an
    /// enum.
    fn enum_underlying_type(&self, type_ref: TableIndex) -> Option<SimpleType>;

    /// Underlying type of an enum given by its serialized, possibly assembly qualified, name.
    fn enum_underlying_type_by_name(&self, name: &str) -> Option<SimpleType>;
}

/// Split a serialized type name into `(namespace, name)`, dropping the assembly part and
/// the enclosing types of a nested type.
#[must_use]
pub fn split_type_name(full_name: &str) -> (&str, &str) {
    let type_name = full_name.split(',').next().unwrap_or(full_name).trim();
    if let Some((_, nested)) = type_name.rsplit_once('+') {
        return ("", nested);
    }
    type_name.rsplit_once('.').unwrap_or(("", type_name))
}

/// Decode a custom attribute blob against its constructor signature.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] for a bad prolog, an unresolvable parameter type or
/// trailing bytes, and [`crate::Error::OutOfBounds`] on truncated data.
pub fn parse_custom_attribute(
    data: &[u8],
    constructor: &SignatureMethod,
    resolver: &dyn EnumResolver,
) -> Result<CustomAttributeSignature> {
    let mut parser = CustomAttributeParser::new(data, resolver);
    parser.parse(constructor)
}

/// Decode the named argument list found in custom attribute and security attribute blobs:
/// a count followed by the arguments. `compressed_count` selects a compressed count
/// (security attributes) over a `u16` (custom attributes).
///
/// # Errors
/// Same as [`parse_custom_attribute`].
pub fn parse_named_arguments(
    parser: &mut Parser,
    resolver: &dyn EnumResolver,
    compressed_count: bool,
) -> Result<Vec<CustomAttributeNamedArgument>> {
    let count = if compressed_count {
        parser.read_compressed_uint()? as usize
    } else {
        usize::from(parser.read_le::<u16>()?)
    };

    let mut decoder = ValueDecoder { resolver, depth: 0 };
    let mut named_args = Vec::with_capacity(count.min(parser.remaining()));
    for _ in 0..count {
        named_args.push(decoder.named_argument(parser)?);
    }
    Ok(named_args)
}

/// Cursor over one custom attribute blob.
pub struct CustomAttributeParser<'a> {
    parser: Parser<'a>,
    decoder: ValueDecoder<'a>,
}

impl<'a> CustomAttributeParser<'a> {
    /// Create a parser over `data`.
    #[must_use]
    pub fn new(data: &'a [u8], resolver: &'a dyn EnumResolver) -> Self {
        CustomAttributeParser {
            parser: Parser::new(data),
            decoder: ValueDecoder { resolver, depth: 0 },
        }
    }

    /// Decode the whole blob.
    ///
    /// # Errors
    /// See [`parse_custom_attribute`].
    pub fn parse(&mut self, constructor: &SignatureMethod) -> Result<CustomAttributeSignature> {
        let prolog = self.parser.read_le::<u16>()?;
        if prolog != CUSTOM_ATTRIBUTE_PROLOG {
            return Err(malformed_error!(
                "Invalid custom attribute prolog - 0x{:04x}",
                prolog
            ));
        }

        let mut fixed_args = Vec::with_capacity(constructor.params.len());
        for param in &constructor.params {
            fixed_args.push(self.decoder.fixed_argument(&mut self.parser, &param.base)?);
        }

        let count = self.parser.read_le::<u16>()?;
        let mut named_args = Vec::with_capacity(usize::from(count).min(self.parser.remaining()));
        for _ in 0..count {
            named_args.push(self.decoder.named_argument(&mut self.parser)?);
        }

        if self.parser.has_more_data() {
            return Err(malformed_error!(
                "{} trailing bytes after custom attribute arguments",
                self.parser.remaining()
            ));
        }

        Ok(CustomAttributeSignature {
            fixed_args,
            named_args,
        })
    }
}

struct ValueDecoder<'a> {
    resolver: &'a dyn EnumResolver,
    depth: usize,
}

impl ValueDecoder<'_> {
    fn enter(&mut self) -> Result<()> {
        self.depth += 1;
        if self.depth > MAX_NESTING_DEPTH {
            return Err(RecursionLimit(MAX_NESTING_DEPTH));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    fn fixed_argument(
        &mut self,
        parser: &mut Parser,
        param: &TypeSignature,
    ) -> Result<CustomAttributeArgument> {
        self.enter()?;
        let result = self.fixed_argument_inner(parser, param);
        self.leave();
        result
    }

    fn fixed_argument_inner(
        &mut self,
        parser: &mut Parser,
        param: &TypeSignature,
    ) -> Result<CustomAttributeArgument> {
        match param {
            TypeSignature::Simple(SimpleType::Object) => self.boxed(parser),
            TypeSignature::Simple(simple) => read_primitive(parser, *simple),
            TypeSignature::ClassOrValue(class) => {
                let name = self.resolver.type_name(class.type_ref);
                if class.is_class {
                    if name == Some(("System", "Type")) {
                        return Ok(CustomAttributeArgument::Type(parser.read_ser_string()?));
                    }
                    return Err(malformed_error!(
                        "Unsupported class parameter {:?} in custom attribute",
                        name
                    ));
                }

                let underlying = self
                    .resolver
                    .enum_underlying_type(class.type_ref)
                    .ok_or_else(|| {
                        malformed_error!(
                            "Cannot resolve enum parameter {:?} in custom attribute",
                            name.unwrap_or(("", "?"))
                        )
                    })?;
                read_primitive(parser, underlying)
            }
            TypeSignature::SimpleArray(array) => {
                let Some(count) = read_array_length(parser)? else {
                    return Ok(CustomAttributeArgument::Array(None));
                };

                let mut elements = Vec::with_capacity(count);
                for _ in 0..count {
                    elements.push(self.fixed_argument(parser, &array.base)?);
                }
                Ok(CustomAttributeArgument::Array(Some(elements)))
            }
            other => Err(malformed_error!(
                "Unsupported parameter type {:?} in custom attribute",
                other
            )),
        }
    }

    fn named_argument(&mut self, parser: &mut Parser) -> Result<CustomAttributeNamedArgument> {
        let is_field = match parser.read_le::<u8>()? {
            SERIALIZATION_TYPE::FIELD => true,
            SERIALIZATION_TYPE::PROPERTY => false,
            other => {
                return Err(malformed_error!(
                    "Invalid named argument kind - 0x{:02x}",
                    other
                ))
            }
        };

        let arg_type = self.argument_type(parser)?;
        let name = parser
            .read_ser_string()?
            .ok_or_else(|| malformed_error!("Named argument without a name"))?;
        let value = self.value(parser, &arg_type)?;

        Ok(CustomAttributeNamedArgument {
            is_field,
            arg_type,
            name,
            value,
        })
    }

    fn argument_type(&mut self, parser: &mut Parser) -> Result<CustomAttributeArgumentType> {
        self.enter()?;
        let result = self.argument_type_inner(parser);
        self.leave();
        result
    }

    fn argument_type_inner(&mut self, parser: &mut Parser) -> Result<CustomAttributeArgumentType> {
        let tag = parser.read_le::<u8>()?;
        match tag {
            SERIALIZATION_TYPE::BOOLEAN..=SERIALIZATION_TYPE::STRING => {
                let simple = SimpleType::from_repr(tag)
                    .ok_or_else(|| malformed_error!("Invalid serialization type 0x{:02x}", tag))?;
                Ok(CustomAttributeArgumentType::Primitive(simple))
            }
            SERIALIZATION_TYPE::TYPE => Ok(CustomAttributeArgumentType::Type),
            SERIALIZATION_TYPE::TAGGED_OBJECT => Ok(CustomAttributeArgumentType::Boxed),
            SERIALIZATION_TYPE::ENUM => {
                let name = parser
                    .read_ser_string()?
                    .ok_or_else(|| malformed_error!("Enum argument without a type name"))?;
                Ok(CustomAttributeArgumentType::Enum(name))
            }
            SERIALIZATION_TYPE::SZARRAY => Ok(CustomAttributeArgumentType::SzArray(Box::new(
                self.argument_type(parser)?,
            ))),
            _ => Err(malformed_error!("Invalid serialization type 0x{:02x}", tag)),
        }
    }

    fn value(
        &mut self,
        parser: &mut Parser,
        arg_type: &CustomAttributeArgumentType,
    ) -> Result<CustomAttributeArgument> {
        self.enter()?;
        let result = self.value_inner(parser, arg_type);
        self.leave();
        result
    }

    fn value_inner(
        &mut self,
        parser: &mut Parser,
        arg_type: &CustomAttributeArgumentType,
    ) -> Result<CustomAttributeArgument> {
        match arg_type {
            CustomAttributeArgumentType::Primitive(simple) => read_primitive(parser, *simple),
            CustomAttributeArgumentType::Type => {
                Ok(CustomAttributeArgument::Type(parser.read_ser_string()?))
            }
            CustomAttributeArgumentType::Boxed => self.boxed(parser),
            CustomAttributeArgumentType::Enum(name) => {
                let underlying = self
                    .resolver
                    .enum_underlying_type_by_name(name)
                    .ok_or_else(|| malformed_error!("Cannot resolve enum type '{}'", name))?;
                read_primitive(parser, underlying)
            }
            CustomAttributeArgumentType::SzArray(element) => {
                let Some(count) = read_array_length(parser)? else {
                    return Ok(CustomAttributeArgument::Array(None));
                };

                let mut elements = Vec::with_capacity(count);
                for _ in 0..count {
                    elements.push(self.value(parser, element)?);
                }
                Ok(CustomAttributeArgument::Array(Some(elements)))
            }
        }
    }

    fn boxed(&mut self, parser: &mut Parser) -> Result<CustomAttributeArgument> {
        let arg_type = self.argument_type(parser)?;
        let value = self.value(parser, &arg_type)?;
        Ok(CustomAttributeArgument::Boxed {
            arg_type,
            value: Box::new(value),
        })
    }
}

/// Element count of an array argument, `None` for a null array.
fn read_array_length(parser: &mut Parser) -> Result<Option<usize>> {
    let count = parser.read_le::<u32>()?;
    if count == u32::MAX {
        return Ok(None);
    }

    // every element occupies at least one byte
    let count = count as usize;
    if count > parser.remaining() {
        return Err(malformed_error!(
            "Array of {} elements exceeds the remaining {} bytes",
            count,
            parser.remaining()
        ));
    }
    Ok(Some(count))
}

fn read_primitive(parser: &mut Parser, simple: SimpleType) -> Result<CustomAttributeArgument> {
    Ok(match simple {
        SimpleType::Boolean => match parser.read_le::<u8>()? {
            0 => CustomAttributeArgument::Bool(false),
            1 => CustomAttributeArgument::Bool(true),
            other => return Err(malformed_error!("Invalid boolean value {}", other)),
        },
        SimpleType::Char => CustomAttributeArgument::Char(parser.read_le::<u16>()?),
        SimpleType::I1 => CustomAttributeArgument::I1(parser.read_le::<i8>()?),
        SimpleType::U1 => CustomAttributeArgument::U1(parser.read_le::<u8>()?),
        SimpleType::I2 => CustomAttributeArgument::I2(parser.read_le::<i16>()?),
        SimpleType::U2 => CustomAttributeArgument::U2(parser.read_le::<u16>()?),
        SimpleType::I4 => CustomAttributeArgument::I4(parser.read_le::<i32>()?),
        SimpleType::U4 => CustomAttributeArgument::U4(parser.read_le::<u32>()?),
        SimpleType::I8 => CustomAttributeArgument::I8(parser.read_le::<i64>()?),
        SimpleType::U8 => CustomAttributeArgument::U8(parser.read_le::<u64>()?),
        SimpleType::R4 => CustomAttributeArgument::R4(parser.read_le::<f32>()?),
        SimpleType::R8 => CustomAttributeArgument::R8(parser.read_le::<f64>()?),
        SimpleType::String => CustomAttributeArgument::String(parser.read_ser_string()?),
        other => {
            return Err(malformed_error!(
                "Type {:?} cannot appear in a custom attribute",
                other
            ))
        }
    })
}
