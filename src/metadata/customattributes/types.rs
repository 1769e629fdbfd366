//! Custom attribute values (ECMA-335 II.23.3).

use crate::metadata::signatures::SimpleType;

/// `CorSerializationType` tags used in named arguments and boxed values.
#[allow(non_snake_case, missing_docs)]
pub mod SERIALIZATION_TYPE {
    pub const BOOLEAN: u8 = 0x02;
    pub const CHAR: u8 = 0x03;
    pub const I1: u8 = 0x04;
    pub const U1: u8 = 0x05;
    pub const I2: u8 = 0x06;
    pub const U2: u8 = 0x07;
    pub const I4: u8 = 0x08;
    pub const U4: u8 = 0x09;
    pub const I8: u8 = 0x0A;
    pub const U8: u8 = 0x0B;
    pub const R4: u8 = 0x0C;
    pub const R8: u8 = 0x0D;
    pub const STRING: u8 = 0x0E;
    pub const SZARRAY: u8 = 0x1D;
    pub const TYPE: u8 = 0x50;
    pub const TAGGED_OBJECT: u8 = 0x51;
    pub const FIELD: u8 = 0x53;
    pub const PROPERTY: u8 = 0x54;
    pub const ENUM: u8 = 0x55;
}

/// The blob of a `CustomAttribute` row.
#[derive(Debug, Clone, PartialEq)]
pub enum CustomAttributeValue {
    /// Decoded arguments
    Resolved(CustomAttributeSignature),
    /// Bytes that could not be decoded against the constructor, kept verbatim
    Raw(Vec<u8>),
}

/// Constructor and named arguments of one attribute instance.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CustomAttributeSignature {
    /// One value per constructor parameter
    pub fixed_args: Vec<CustomAttributeArgument>,
    /// Field and property assignments
    pub named_args: Vec<CustomAttributeNamedArgument>,
}

/// Type tag of a named argument or a boxed value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CustomAttributeArgumentType {
    /// `bool` through `double` and `string`
    Primitive(SimpleType),
    /// `System.Type`, serialized as its name
    Type,
    /// `object`, the value carries its own type tag
    Boxed,
    /// Enum named by its assembly qualified type name
    Enum(String),
    /// Single-dimensional array
    SzArray(Box<CustomAttributeArgumentType>),
}

/// One argument value.
///
/// Enum values are stored as their underlying integer.
#[derive(Debug, Clone, PartialEq)]
pub enum CustomAttributeArgument {
    /// `bool`
    Bool(bool),
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
    /// `string`, `None` is a null reference
    String(Option<String>),
    /// `System.Type` by name, `None` is a null reference
    Type(Option<String>),
    /// Array, `None` is a null reference
    Array(Option<Vec<CustomAttributeArgument>>),
    /// Value stored in an `object` slot, preceded by its type tag
    Boxed {
        /// The tag
        arg_type: CustomAttributeArgumentType,
        /// The value
        value: Box<CustomAttributeArgument>,
    },
}

/// A field or property assignment.
#[derive(Debug, Clone, PartialEq)]
pub struct CustomAttributeNamedArgument {
    /// Field rather than property
    pub is_field: bool,
    /// Declared type
    pub arg_type: CustomAttributeArgumentType,
    /// Field or property name
    pub name: String,
    /// Assigned value
    pub value: CustomAttributeArgument,
}
