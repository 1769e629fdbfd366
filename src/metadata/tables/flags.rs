//! Attribute flags stored in table columns.
//!
//! Every flags column is a `bitflags` type. Values are read with `from_bits_retain`, so bits
//! this crate does not name survive a read/write cycle unchanged.

use bitflags::bitflags;

use crate::{
    metadata::tables::{
        schema::{kind_mismatch, raw_value, ColumnKind, ColumnSchema, ColumnValue},
        ReadContext, WriteContext,
    },
    Result,
};

/// Mask of the visibility bits in [`TypeAttributes`]
pub const TYPE_VISIBILITY_MASK: u32 = 0x0000_0007;
/// Mask of the layout bits in [`TypeAttributes`]
pub const TYPE_LAYOUT_MASK: u32 = 0x0000_0018;
/// Mask of the access bits in [`FieldAttributes`] and [`MethodAttributes`]
pub const MEMBER_ACCESS_MASK: u16 = 0x0007;
/// Mask of the code type bits in [`MethodImplAttributes`]
pub const METHOD_IMPL_CODE_TYPE_MASK: u16 = 0x0003;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    /// `TypeDef.Flags` and `ExportedType.Flags`
    pub struct TypeAttributes: u32 {
        /// Visible outside the assembly
        const PUBLIC = 0x0000_0001;
        /// Nested, public
        const NESTED_PUBLIC = 0x0000_0002;
        /// Nested, private
        const NESTED_PRIVATE = 0x0000_0003;
        /// Nested, family
        const NESTED_FAMILY = 0x0000_0004;
        /// Nested, assembly
        const NESTED_ASSEMBLY = 0x0000_0005;
        /// Nested, family and assembly
        const NESTED_FAM_AND_ASSEM = 0x0000_0006;
        /// Nested, family or assembly
        const NESTED_FAM_OR_ASSEM = 0x0000_0007;
        /// Fields laid out sequentially
        const SEQUENTIAL_LAYOUT = 0x0000_0008;
        /// Fields laid out explicitly
        const EXPLICIT_LAYOUT = 0x0000_0010;
        /// Interface
        const INTERFACE = 0x0000_0020;
        /// Abstract
        const ABSTRACT = 0x0000_0080;
        /// Sealed
        const SEALED = 0x0000_0100;
        /// Special name
        const SPECIAL_NAME = 0x0000_0400;
        /// Runtime special name
        const RT_SPECIAL_NAME = 0x0000_0800;
        /// Imported
        const IMPORT = 0x0000_1000;
        /// Serializable
        const SERIALIZABLE = 0x0000_2000;
        /// Windows runtime type
        const WINDOWS_RUNTIME = 0x0000_4000;
        /// Strings marshal as Unicode
        const UNICODE_CLASS = 0x0001_0000;
        /// Strings marshal as `LPTSTR`
        const AUTO_CLASS = 0x0002_0000;
        /// Custom string format
        const CUSTOM_FORMAT_CLASS = 0x0003_0000;
        /// Has security declarations
        const HAS_SECURITY = 0x0004_0000;
        /// Static constructor may run lazily
        const BEFORE_FIELD_INIT = 0x0010_0000;
        /// `ExportedType` forwards to another assembly
        const FORWARDER = 0x0020_0000;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    /// `Field.Flags`
    pub struct FieldAttributes: u16 {
        /// Private
        const PRIVATE = 0x0001;
        /// Family and assembly
        const FAM_AND_ASSEM = 0x0002;
        /// Assembly
        const ASSEMBLY = 0x0003;
        /// Family
        const FAMILY = 0x0004;
        /// Family or assembly
        const FAM_OR_ASSEM = 0x0005;
        /// Public
        const PUBLIC = 0x0006;
        /// Static
        const STATIC = 0x0010;
        /// Assigned only in constructors
        const INIT_ONLY = 0x0020;
        /// Compile time constant
        const LITERAL = 0x0040;
        /// Not serialized
        const NOT_SERIALIZED = 0x0080;
        /// Special name
        const SPECIAL_NAME = 0x0200;
        /// Implemented through P/Invoke
        const PINVOKE_IMPL = 0x2000;
        /// Runtime special name
        const RT_SPECIAL_NAME = 0x0400;
        /// Has marshalling information
        const HAS_FIELD_MARSHAL = 0x1000;
        /// Has a default value
        const HAS_DEFAULT = 0x8000;
        /// Has initial data at an RVA
        const HAS_FIELD_RVA = 0x0100;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    /// `MethodDef.Flags`
    pub struct MethodAttributes: u16 {
        /// Private
        const PRIVATE = 0x0001;
        /// Family and assembly
        const FAM_AND_ASSEM = 0x0002;
        /// Assembly
        const ASSEMBLY = 0x0003;
        /// Family
        const FAMILY = 0x0004;
        /// Family or assembly
        const FAM_OR_ASSEM = 0x0005;
        /// Public
        const PUBLIC = 0x0006;
        /// Static
        const STATIC = 0x0010;
        /// Cannot be overridden
        const FINAL = 0x0020;
        /// Virtual
        const VIRTUAL = 0x0040;
        /// Hidden by name and signature
        const HIDE_BY_SIG = 0x0080;
        /// Always gets a new vtable slot
        const NEW_SLOT = 0x0100;
        /// Overridable only when accessible
        const STRICT = 0x0200;
        /// Abstract
        const ABSTRACT = 0x0400;
        /// Special name
        const SPECIAL_NAME = 0x0800;
        /// Implemented through P/Invoke
        const PINVOKE_IMPL = 0x2000;
        /// Unmanaged export
        const UNMANAGED_EXPORT = 0x0008;
        /// Runtime special name
        const RT_SPECIAL_NAME = 0x1000;
        /// Has security declarations
        const HAS_SECURITY = 0x4000;
        /// Calls a method with security code
        const REQUIRE_SEC_OBJECT = 0x8000;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    /// `MethodDef.ImplFlags`
    pub struct MethodImplAttributes: u16 {
        /// Native code
        const NATIVE = 0x0001;
        /// Optimized IL
        const OPTIL = 0x0002;
        /// Provided by the runtime
        const RUNTIME = 0x0003;
        /// Unmanaged code
        const UNMANAGED = 0x0004;
        /// Not inlined
        const NO_INLINING = 0x0008;
        /// Defined through forward reference
        const FORWARD_REF = 0x0010;
        /// Single-threaded
        const SYNCHRONIZED = 0x0020;
        /// Signature exported exactly as declared
        const PRESERVE_SIG = 0x0080;
        /// Internal call
        const INTERNAL_CALL = 0x1000;
        /// Not optimized by the JIT
        const NO_OPTIMIZATION = 0x0040;
        /// Aggressive inlining
        const AGGRESSIVE_INLINING = 0x0100;
        /// Aggressive optimization
        const AGGRESSIVE_OPTIMIZATION = 0x0200;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    /// `Param.Flags`
    pub struct ParamAttributes: u16 {
        /// Input parameter
        const IN = 0x0001;
        /// Output parameter
        const OUT = 0x0002;
        /// Optional parameter
        const OPTIONAL = 0x0010;
        /// Has a default value
        const HAS_DEFAULT = 0x1000;
        /// Has marshalling information
        const HAS_FIELD_MARSHAL = 0x2000;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    /// `Event.EventFlags`
    pub struct EventAttributes: u16 {
        /// Special name
        const SPECIAL_NAME = 0x0200;
        /// Runtime special name
        const RT_SPECIAL_NAME = 0x0400;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    /// `Property.Flags`
    pub struct PropertyAttributes: u16 {
        /// Special name
        const SPECIAL_NAME = 0x0200;
        /// Runtime special name
        const RT_SPECIAL_NAME = 0x0400;
        /// Has a default value
        const HAS_DEFAULT = 0x1000;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    /// `MethodSemantics.Semantics`
    pub struct MethodSemanticsAttributes: u16 {
        /// Property setter
        const SETTER = 0x0001;
        /// Property getter
        const GETTER = 0x0002;
        /// Other accessor
        const OTHER = 0x0004;
        /// Event add method
        const ADD_ON = 0x0008;
        /// Event remove method
        const REMOVE_ON = 0x0010;
        /// Event raise method
        const FIRE = 0x0020;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    /// `ImplMap.MappingFlags`
    pub struct PInvokeAttributes: u16 {
        /// Use the member name as specified
        const NO_MANGLE = 0x0001;
        /// Marshal strings as ANSI
        const CHAR_SET_ANSI = 0x0002;
        /// Marshal strings as Unicode
        const CHAR_SET_UNICODE = 0x0004;
        /// Marshal strings as `LPTSTR`
        const CHAR_SET_AUTO = 0x0006;
        /// Best fit mapping on
        const BEST_FIT_ENABLED = 0x0010;
        /// Best fit mapping off
        const BEST_FIT_DISABLED = 0x0020;
        /// Record the last Win32 error
        const SUPPORTS_LAST_ERROR = 0x0040;
        /// `winapi` calling convention
        const CALL_CONV_WINAPI = 0x0100;
        /// `cdecl` calling convention
        const CALL_CONV_CDECL = 0x0200;
        /// `stdcall` calling convention
        const CALL_CONV_STDCALL = 0x0300;
        /// `thiscall` calling convention
        const CALL_CONV_THISCALL = 0x0400;
        /// `fastcall` calling convention
        const CALL_CONV_FASTCALL = 0x0500;
        /// Throw on unmappable characters
        const THROW_ON_UNMAPPABLE_ENABLED = 0x1000;
        /// Do not throw on unmappable characters
        const THROW_ON_UNMAPPABLE_DISABLED = 0x2000;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    /// `Assembly.Flags` and `AssemblyRef.Flags`
    pub struct AssemblyFlags: u32 {
        /// The blob holds the full public key rather than its token
        const PUBLIC_KEY = 0x0001;
        /// May be retargeted to another publisher
        const RETARGETABLE = 0x0100;
        /// Windows runtime content
        const WINDOWS_RUNTIME = 0x0200;
        /// JIT tracking disabled
        const DISABLE_JIT_COMPILE_OPTIMIZER = 0x4000;
        /// JIT tracking enabled
        const ENABLE_JIT_COMPILE_TRACKING = 0x8000;
    }
}

/// Values of `Assembly.HashAlgId`.
#[allow(non_snake_case)]
pub mod AssemblyHashAlgorithm {
    /// No hash algorithm
    pub const NONE: u32 = 0x0000;
    /// MD5
    pub const MD5: u32 = 0x8003;
    /// SHA-1
    pub const SHA1: u32 = 0x8004;
    /// SHA-256
    pub const SHA256: u32 = 0x800C;
    /// SHA-384
    pub const SHA384: u32 = 0x800D;
    /// SHA-512
    pub const SHA512: u32 = 0x800E;
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    /// `File.Flags`
    pub struct FileAttributes: u32 {
        /// Resource or other file without metadata
        const CONTAINS_NO_METADATA = 0x0001;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    /// `ManifestResource.Flags`
    pub struct ManifestResourceAttributes: u32 {
        /// Exported from the assembly
        const PUBLIC = 0x0001;
        /// Private to the assembly
        const PRIVATE = 0x0002;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    /// `GenericParam.Flags`
    pub struct GenericParamAttributes: u16 {
        /// Covariant
        const COVARIANT = 0x0001;
        /// Contravariant
        const CONTRAVARIANT = 0x0002;
        /// `class` constraint
        const REFERENCE_TYPE_CONSTRAINT = 0x0004;
        /// `struct` constraint
        const NOT_NULLABLE_VALUE_TYPE_CONSTRAINT = 0x0008;
        /// `new()` constraint
        const DEFAULT_CONSTRUCTOR_CONSTRAINT = 0x0010;
        /// `allows ref struct`
        const ALLOWS_BY_REF_LIKE = 0x0020;
    }
}

macro_rules! flags_column {
    ($($flags:ident: $bits:ty => $kind:ident),* $(,)?) => {
        $(
            impl ColumnValue for $flags {
                #[allow(clippy::cast_possible_truncation, clippy::unnecessary_cast)]
                fn read_column(
                    _ctx: &ReadContext,
                    column: &ColumnSchema,
                    raw: &[u32],
                    index: usize,
                ) -> Result<Self> {
                    if column.kind != ColumnKind::$kind {
                        return Err(kind_mismatch(column));
                    }
                    Ok($flags::from_bits_retain(raw_value(raw, index)? as $bits))
                }

                fn write_column(
                    &self,
                    _ctx: &mut WriteContext,
                    _column: &ColumnSchema,
                    _previous: &[u32],
                ) -> Result<u32> {
                    Ok(u32::from(self.bits()))
                }
            }
        )*
    };
}

flags_column! {
    TypeAttributes: u32 => Constant32,
    FieldAttributes: u16 => Constant16,
    MethodAttributes: u16 => Constant16,
    MethodImplAttributes: u16 => Constant16,
    ParamAttributes: u16 => Constant16,
    EventAttributes: u16 => Constant16,
    PropertyAttributes: u16 => Constant16,
    MethodSemanticsAttributes: u16 => Constant16,
    PInvokeAttributes: u16 => Constant16,
    AssemblyFlags: u32 => Constant32,
    FileAttributes: u32 => Constant32,
    ManifestResourceAttributes: u32 => Constant32,
    GenericParamAttributes: u16 => Constant16,
}
