use strum::{EnumCount, EnumIter, FromRepr};

/// Number of metadata tables, `0x00..=0x2C`.
pub const TABLE_COUNT: usize = TableId::COUNT;

/// Identifiers of the ECMA-335 metadata tables.
///
/// The discriminant is the table number used in the `valid`/`sorted` bit vectors of the table
/// stream header and in the high byte of a [`crate::Token`].
///
/// ## Table Categories
///
/// ### Core Type System
/// - **`Module`**, **`TypeRef`**, **`TypeDef`**, **`Field`**, **`MethodDef`**, **`Param`**
///
/// ### Indirection (uncompressed `#-` streams only)
/// - **`FieldPtr`**, **`MethodPtr`**, **`ParamPtr`**, **`EventPtr`**, **`PropertyPtr`**
///
/// ### Type Relationships and Layout
/// - **`InterfaceImpl`**, **`NestedClass`**, **`ClassLayout`**, **`FieldLayout`**
///
/// ### Members and Signatures
/// - **`MemberRef`**, **`MethodImpl`**, **`MethodSemantics`**, **`StandAloneSig`**,
///   **`TypeSpec`**, **`MethodSpec`**, **`GenericParam`**, **`GenericParamConstraint`**
///
/// ### Attributes and Marshalling
/// - **`Constant`**, **`CustomAttribute`**, **`FieldMarshal`**, **`DeclSecurity`**,
///   **`ImplMap`**, **`FieldRVA`**
///
/// ### Events and Properties
/// - **`EventMap`**, **`Event`**, **`PropertyMap`**, **`Property`**
///
/// ### Assembly Manifest
/// - **`Assembly`**, **`AssemblyProcessor`**, **`AssemblyOS`**, **`AssemblyRef`**,
///   **`AssemblyRefProcessor`**, **`AssemblyRefOS`**, **`File`**, **`ExportedType`**,
///   **`ManifestResource`**, **`ModuleRef`**
///
/// ### Edit and Continue
/// - **`EncLog`**, **`EncMap`**
///
/// ## Reference
/// * [ECMA-335 Partition II, Section 22](https://ecma-international.org/wp-content/uploads/ECMA-335_6th_edition_june_2012.pdf) - Metadata Tables
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, EnumIter, EnumCount, FromRepr)]
#[repr(u8)]
pub enum TableId {
    /// `Module` (0x00) - the single row describing this module
    Module = 0x00,
    /// `TypeRef` (0x01) - references to types defined elsewhere
    TypeRef = 0x01,
    /// `TypeDef` (0x02) - types defined in this module
    TypeDef = 0x02,
    /// `FieldPtr` (0x03) - field indirection
    FieldPtr = 0x03,
    /// `Field` (0x04) - field definitions
    Field = 0x04,
    /// `MethodPtr` (0x05) - method indirection
    MethodPtr = 0x05,
    /// `MethodDef` (0x06) - method definitions
    MethodDef = 0x06,
    /// `ParamPtr` (0x07) - parameter indirection
    ParamPtr = 0x07,
    /// `Param` (0x08) - parameter definitions
    Param = 0x08,
    /// `InterfaceImpl` (0x09) - interfaces implemented by types
    InterfaceImpl = 0x09,
    /// `MemberRef` (0x0A) - references to fields and methods
    MemberRef = 0x0A,
    /// `Constant` (0x0B) - default values of fields, parameters and properties
    Constant = 0x0B,
    /// `CustomAttribute` (0x0C) - custom attribute applications
    CustomAttribute = 0x0C,
    /// `FieldMarshal` (0x0D) - marshalling descriptors
    FieldMarshal = 0x0D,
    /// `DeclSecurity` (0x0E) - declarative security
    DeclSecurity = 0x0E,
    /// `ClassLayout` (0x0F) - explicit packing and size of types
    ClassLayout = 0x0F,
    /// `FieldLayout` (0x10) - explicit field offsets
    FieldLayout = 0x10,
    /// `StandAloneSig` (0x11) - local variable and call site signatures
    StandAloneSig = 0x11,
    /// `EventMap` (0x12) - type to event list mapping
    EventMap = 0x12,
    /// `EventPtr` (0x13) - event indirection
    EventPtr = 0x13,
    /// `Event` (0x14) - event definitions
    Event = 0x14,
    /// `PropertyMap` (0x15) - type to property list mapping
    PropertyMap = 0x15,
    /// `PropertyPtr` (0x16) - property indirection
    PropertyPtr = 0x16,
    /// `Property` (0x17) - property definitions
    Property = 0x17,
    /// `MethodSemantics` (0x18) - accessor methods of events and properties
    MethodSemantics = 0x18,
    /// `MethodImpl` (0x19) - explicit method overrides
    MethodImpl = 0x19,
    /// `ModuleRef` (0x1A) - references to other modules
    ModuleRef = 0x1A,
    /// `TypeSpec` (0x1B) - constructed type signatures
    TypeSpec = 0x1B,
    /// `ImplMap` (0x1C) - P/Invoke mappings
    ImplMap = 0x1C,
    /// `FieldRVA` (0x1D) - initial data of fields
    FieldRVA = 0x1D,
    /// `EncLog` (0x1E) - edit-and-continue log
    EncLog = 0x1E,
    /// `EncMap` (0x1F) - edit-and-continue token map
    EncMap = 0x1F,
    /// `Assembly` (0x20) - the assembly manifest
    Assembly = 0x20,
    /// `AssemblyProcessor` (0x21) - unused
    AssemblyProcessor = 0x21,
    /// `AssemblyOS` (0x22) - unused
    AssemblyOS = 0x22,
    /// `AssemblyRef` (0x23) - referenced assemblies
    AssemblyRef = 0x23,
    /// `AssemblyRefProcessor` (0x24) - unused
    AssemblyRefProcessor = 0x24,
    /// `AssemblyRefOS` (0x25) - unused
    AssemblyRefOS = 0x25,
    /// `File` (0x26) - files of a multi-module assembly
    File = 0x26,
    /// `ExportedType` (0x27) - types forwarded or exported from other modules
    ExportedType = 0x27,
    /// `ManifestResource` (0x28) - resources
    ManifestResource = 0x28,
    /// `NestedClass` (0x29) - nesting relationships
    NestedClass = 0x29,
    /// `GenericParam` (0x2A) - generic parameters
    GenericParam = 0x2A,
    /// `MethodSpec` (0x2B) - generic method instantiations
    MethodSpec = 0x2B,
    /// `GenericParamConstraint` (0x2C) - constraints of generic parameters
    GenericParamConstraint = 0x2C,
}

impl TableId {
    /// Whether ECMA-335 requires the table to be sorted by its primary key column.
    #[must_use]
    pub fn is_sorted(&self) -> bool {
        matches!(
            self,
            TableId::InterfaceImpl
                | TableId::Constant
                | TableId::CustomAttribute
                | TableId::FieldMarshal
                | TableId::DeclSecurity
                | TableId::ClassLayout
                | TableId::FieldLayout
                | TableId::MethodSemantics
                | TableId::MethodImpl
                | TableId::ImplMap
                | TableId::FieldRVA
                | TableId::NestedClass
                | TableId::GenericParam
                | TableId::GenericParamConstraint
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn dense_numbering() {
        assert_eq!(TABLE_COUNT, 0x2D);
        for (expected, table) in TableId::iter().enumerate() {
            assert_eq!(table as usize, expected);
            assert_eq!(TableId::from_repr(expected as u8), Some(table));
        }
        assert_eq!(TableId::from_repr(0x2D), None);
    }
}
