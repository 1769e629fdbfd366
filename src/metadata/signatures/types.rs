use strum::FromRepr;

use crate::metadata::tables::TableIndex;

/// Element type bytes of ECMA-335 §II.23.1.16.
#[allow(non_snake_case, missing_docs)]
pub mod ELEMENT_TYPE {
    pub const END: u8 = 0x00;
    pub const VOID: u8 = 0x01;
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
    pub const PTR: u8 = 0x0F;
    pub const BYREF: u8 = 0x10;
    pub const VALUETYPE: u8 = 0x11;
    pub const CLASS: u8 = 0x12;
    pub const VAR: u8 = 0x13;
    pub const ARRAY: u8 = 0x14;
    pub const GENERICINST: u8 = 0x15;
    pub const TYPEDBYREF: u8 = 0x16;
    pub const I: u8 = 0x18;
    pub const U: u8 = 0x19;
    pub const FNPTR: u8 = 0x1B;
    pub const OBJECT: u8 = 0x1C;
    pub const SZARRAY: u8 = 0x1D;
    pub const MVAR: u8 = 0x1E;
    pub const CMOD_REQD: u8 = 0x1F;
    pub const CMOD_OPT: u8 = 0x20;
    pub const INTERNAL: u8 = 0x21;
    pub const MODIFIER: u8 = 0x40;
    pub const SENTINEL: u8 = 0x41;
    pub const PINNED: u8 = 0x45;
    // custom attribute encoding only
    pub const TYPE: u8 = 0x50;
    pub const BOXED: u8 = 0x51;
    pub const FIELD: u8 = 0x53;
    pub const PROPERTY: u8 = 0x54;
    pub const ENUM: u8 = 0x55;
}

/// Calling convention bits of the first signature byte.
#[allow(non_snake_case, missing_docs)]
pub mod CALLING_CONVENTION {
    pub const DEFAULT: u8 = 0x00;
    pub const C: u8 = 0x01;
    pub const STDCALL: u8 = 0x02;
    pub const THISCALL: u8 = 0x03;
    pub const FASTCALL: u8 = 0x04;
    pub const VARARG: u8 = 0x05;
    pub const UNMANAGED: u8 = 0x09;
    pub const KIND_MASK: u8 = 0x0F;
    pub const GENERIC: u8 = 0x10;
    pub const HASTHIS: u8 = 0x20;
    pub const EXPLICITTHIS: u8 = 0x40;
}

/// Signature kinds that are not method signatures.
#[allow(non_snake_case, missing_docs)]
pub mod SIGNATURE_HEADER {
    pub const FIELD: u8 = 0x06;
    pub const LOCAL_SIG: u8 = 0x07;
    pub const PROPERTY: u8 = 0x08;
    pub const METHOD_SPEC: u8 = 0x0A;
}

/// Element types that carry no further data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromRepr)]
#[repr(u8)]
#[allow(missing_docs)]
pub enum SimpleType {
    Void = ELEMENT_TYPE::VOID,
    Boolean = ELEMENT_TYPE::BOOLEAN,
    Char = ELEMENT_TYPE::CHAR,
    I1 = ELEMENT_TYPE::I1,
    U1 = ELEMENT_TYPE::U1,
    I2 = ELEMENT_TYPE::I2,
    U2 = ELEMENT_TYPE::U2,
    I4 = ELEMENT_TYPE::I4,
    U4 = ELEMENT_TYPE::U4,
    I8 = ELEMENT_TYPE::I8,
    U8 = ELEMENT_TYPE::U8,
    R4 = ELEMENT_TYPE::R4,
    R8 = ELEMENT_TYPE::R8,
    String = ELEMENT_TYPE::STRING,
    TypedByRef = ELEMENT_TYPE::TYPEDBYREF,
    I = ELEMENT_TYPE::I,
    U = ELEMENT_TYPE::U,
    Object = ELEMENT_TYPE::OBJECT,
}

impl SimpleType {
    /// Size in bytes of a value of this type when stored inline, `None` for reference and
    /// platform-sized types.
    #[must_use]
    pub fn fixed_size(&self) -> Option<u32> {
        match self {
            SimpleType::Boolean | SimpleType::I1 | SimpleType::U1 => Some(1),
            SimpleType::Char | SimpleType::I2 | SimpleType::U2 => Some(2),
            SimpleType::I4 | SimpleType::U4 | SimpleType::R4 => Some(4),
            SimpleType::I8 | SimpleType::U8 | SimpleType::R8 => Some(8),
            _ => None,
        }
    }
}

/// A `cmod_reqd` / `cmod_opt` entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CustomModifier {
    /// `modopt` rather than `modreq`
    pub is_optional: bool,
    /// The modifier type, `TypeDef`, `TypeRef` or `TypeSpec`
    pub modifier_type: TableIndex,
}

/// A type inside a signature.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeSignature {
    /// Primitive or other argument-free element type
    Simple(SimpleType),
    /// Single-dimensional zero-based array (`SZARRAY`)
    SimpleArray(SignatureSzArray),
    /// General array (`ARRAY`) with rank, sizes and lower bounds
    ComplexArray(SignatureArray),
    /// `CLASS` / `VALUETYPE`, or `GENERICINST` when generic arguments are present
    ClassOrValue(SignatureClassOrValue),
    /// `VAR` / `MVAR`
    GenericParameter(SignatureGenericParameter),
    /// `FNPTR`
    FunctionPointer(Box<SignatureMethod>),
    /// `PTR`
    Pointer(SignaturePointer),
}

/// Payload of [`TypeSignature::SimpleArray`].
#[derive(Debug, Clone, PartialEq)]
pub struct SignatureSzArray {
    /// Custom modifiers in front of the element type
    pub modifiers: Vec<CustomModifier>,
    /// Element type
    pub base: Box<TypeSignature>,
}

/// Payload of [`TypeSignature::ComplexArray`].
#[derive(Debug, Clone, PartialEq)]
pub struct SignatureArray {
    /// Element type
    pub base: Box<TypeSignature>,
    /// Number of dimensions
    pub rank: u32,
    /// Sizes of the leading dimensions
    pub sizes: Vec<u32>,
    /// Lower bounds of the leading dimensions
    pub lower_bounds: Vec<i32>,
}

/// Payload of [`TypeSignature::ClassOrValue`].
#[derive(Debug, Clone, PartialEq)]
pub struct SignatureClassOrValue {
    /// `CLASS` rather than `VALUETYPE`
    pub is_class: bool,
    /// The type, `TypeDef`, `TypeRef` or `TypeSpec`
    pub type_ref: TableIndex,
    /// Generic arguments, empty for non-generic instantiations
    pub generic_arguments: Vec<TypeSignature>,
}

/// Payload of [`TypeSignature::GenericParameter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignatureGenericParameter {
    /// `MVAR` rather than `VAR`
    pub is_method_parameter: bool,
    /// Position in the generic parameter list
    pub index: u32,
}

/// Payload of [`TypeSignature::Pointer`].
#[derive(Debug, Clone, PartialEq)]
pub struct SignaturePointer {
    /// Custom modifiers in front of the pointee
    pub modifiers: Vec<CustomModifier>,
    /// Pointee type
    pub base: Box<TypeSignature>,
}

/// Managed calling convention kind of a method signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[allow(missing_docs)]
pub enum SignatureCallingConvention {
    #[default]
    Default,
    C,
    StdCall,
    ThisCall,
    FastCall,
    VarArg,
    Unmanaged,
}

/// A parameter or return type.
#[derive(Debug, Clone, PartialEq)]
pub struct SignatureParameter {
    /// Custom modifiers in front of the type
    pub modifiers: Vec<CustomModifier>,
    /// Passed by reference
    pub by_ref: bool,
    /// The type
    pub base: TypeSignature,
}

impl SignatureParameter {
    /// A plain by-value parameter.
    #[must_use]
    pub fn new(base: TypeSignature) -> Self {
        SignatureParameter {
            modifiers: Vec::new(),
            by_ref: false,
            base,
        }
    }
}

/// Method definition, reference or call site signature.
#[derive(Debug, Clone, PartialEq)]
pub struct SignatureMethod {
    /// Instance method
    pub has_this: bool,
    /// `this` is the first explicit parameter
    pub explicit_this: bool,
    /// Calling convention kind
    pub calling_convention: SignatureCallingConvention,
    /// Number of generic parameters, `0` for non-generic methods
    pub generic_parameter_count: u32,
    /// Return type
    pub return_type: SignatureParameter,
    /// Fixed parameters
    pub params: Vec<SignatureParameter>,
    /// Parameters after the sentinel, only valid in var-arg references
    pub varargs: Vec<SignatureParameter>,
}

impl SignatureMethod {
    /// A static default-convention signature.
    #[must_use]
    pub fn new(return_type: TypeSignature, params: Vec<TypeSignature>) -> Self {
        SignatureMethod {
            has_this: false,
            explicit_this: false,
            calling_convention: SignatureCallingConvention::Default,
            generic_parameter_count: 0,
            return_type: SignatureParameter::new(return_type),
            params: params.into_iter().map(SignatureParameter::new).collect(),
            varargs: Vec::new(),
        }
    }
}

/// Field signature.
#[derive(Debug, Clone, PartialEq)]
pub struct SignatureField {
    /// Custom modifiers in front of the type
    pub modifiers: Vec<CustomModifier>,
    /// `ref` field
    pub by_ref: bool,
    /// Field type
    pub base: TypeSignature,
}

impl SignatureField {
    /// Field of the given type without modifiers.
    #[must_use]
    pub fn new(base: TypeSignature) -> Self {
        SignatureField {
            modifiers: Vec::new(),
            by_ref: false,
            base,
        }
    }
}

/// Property signature.
#[derive(Debug, Clone, PartialEq)]
pub struct SignatureProperty {
    /// Instance property
    pub has_this: bool,
    /// Property type
    pub property_type: SignatureParameter,
    /// Indexer parameters
    pub params: Vec<SignatureParameter>,
}

/// One local variable.
#[derive(Debug, Clone, PartialEq)]
pub struct SignatureLocalVariable {
    /// Custom modifiers in front of the type
    pub modifiers: Vec<CustomModifier>,
    /// `pinned` constraint
    pub pinned: bool,
    /// `ref` local
    pub by_ref: bool,
    /// Variable type
    pub base: TypeSignature,
}

/// Local variable signature referenced by fat method headers.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SignatureLocalVariables {
    /// The locals
    pub locals: Vec<SignatureLocalVariable>,
}

/// Generic method instantiation (`MethodSpec.Instantiation`).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SignatureMethodSpec {
    /// Generic arguments
    pub generic_args: Vec<TypeSignature>,
}

/// Signature of a blob column that admits several signature kinds
/// (`MemberRef.Signature`, `StandAloneSig.Signature`).
///
/// Blobs that do not decode are kept verbatim as [`AbstractSignature::Raw`].
#[derive(Debug, Clone, PartialEq)]
pub enum AbstractSignature {
    /// Field reference
    Field(SignatureField),
    /// Method reference or call site
    Method(SignatureMethod),
    /// Property signature
    Property(SignatureProperty),
    /// Local variables
    LocalVariables(SignatureLocalVariables),
    /// Generic method instantiation
    MethodSpec(SignatureMethodSpec),
    /// Undecodable blob
    Raw(Vec<u8>),
}
