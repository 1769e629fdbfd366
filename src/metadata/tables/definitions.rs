//! Row layouts of the 45 metadata tables (ECMA-335 II.22).

use strum::IntoEnumIterator;

use crate::{
    metadata::{
        constant::ConstantValue,
        customattributes::CustomAttributeValue,
        marshalling::MarshallingInfo,
        method::MethodBody,
        resource::ManifestResourceData,
        security::PermissionSet,
        signatures::{
            AbstractSignature, SignatureField, SignatureMethod, SignatureMethodSpec,
            SignatureProperty, TypeSignature,
        },
        tables::{
            flags::{
                AssemblyFlags, EventAttributes, FieldAttributes, FileAttributes,
                GenericParamAttributes, ManifestResourceAttributes, MethodAttributes,
                MethodImplAttributes, MethodSemanticsAttributes, PInvokeAttributes,
                ParamAttributes, PropertyAttributes, TypeAttributes,
            },
            schema::{ColumnKind::*, ColumnSchema, ColumnValue},
            CodedIndexType::*,
            RawValueStorage, ReadContext, TableId, TableIndex, WriteContext, TABLE_COUNT,
        },
    },
    Error::OutOfBounds,
    Result,
};

fn read_table<T>(
    ctx: &ReadContext,
    table: TableId,
    read: fn(&ReadContext, &[u32]) -> Result<T>,
) -> Result<Vec<T>> {
    let count = ctx.row_count(table);
    let mut rows = Vec::with_capacity(count as usize);
    for row in 0..count {
        let raw = ctx.raw.row(table, row).ok_or(OutOfBounds)?;
        rows.push(read(ctx, raw)?);
    }
    Ok(rows)
}

#[allow(clippy::cast_possible_truncation)]
fn extract_table<T>(
    rows: &[T],
    table: TableId,
    ctx: &mut WriteContext,
    storage: &mut RawValueStorage<u32>,
    extract: fn(&T, &mut WriteContext, &mut [u32]) -> Result<()>,
) -> Result<()> {
    for (index, row) in rows.iter().enumerate() {
        ctx.current = TableIndex::new(table, index as u32);
        let out = storage.row_mut(table, index as u32).ok_or(OutOfBounds)?;
        extract(row, ctx, out)?;
    }
    Ok(())
}

tables! {
    /// The current module, exactly one row
    Module => module: ModuleRow {
        /// Reserved, zero
        generation: u16 = Constant16,
        /// Module file name
        name: String = StringIndex,
        /// Module version id
        mvid: Option<uguid::Guid> = GuidIndex,
        /// Edit-and-continue id
        enc_id: Option<uguid::Guid> = GuidIndex,
        /// Edit-and-continue base id
        enc_base_id: Option<uguid::Guid> = GuidIndex,
    },

    /// A reference to a type defined elsewhere
    TypeRef => type_ref: TypeRefRow {
        /// Module, module reference, assembly reference or enclosing type reference
        resolution_scope: Option<TableIndex> = CodedTableIndexNullable(ResolutionScope),
        /// Type name
        name: String = StringIndex,
        /// Type namespace
        namespace: String = StringIndex,
    },

    /// A type defined in this module
    TypeDef => type_def: TypeDefRow {
        /// Attributes
        flags: TypeAttributes = Constant32,
        /// Type name
        name: String = StringIndex,
        /// Type namespace
        namespace: String = StringIndex,
        /// Base type, `None` for interfaces and `System.Object`
        extends: Option<TableIndex> = CodedTableIndexNullable(TypeDefOrRef),
        /// First field owned by this type
        field_list: TableIndex = SimpleTableIndex(TableId::Field),
        /// First method owned by this type
        method_list: TableIndex = SimpleTableIndex(TableId::MethodDef),
    },

    /// Indirection into `Field` used by unoptimized metadata
    FieldPtr => field_ptr: FieldPtrRow {
        /// The field
        field: TableIndex = SimpleTableIndex(TableId::Field),
    },

    /// A field definition
    Field => field: FieldRow {
        /// Attributes
        flags: FieldAttributes = Constant16,
        /// Field name
        name: String = StringIndex,
        /// Field signature
        signature: SignatureField = BlobIndex,
    },

    /// Indirection into `MethodDef` used by unoptimized metadata
    MethodPtr => method_ptr: MethodPtrRow {
        /// The method
        method: TableIndex = SimpleTableIndex(TableId::MethodDef),
    },

    /// A method definition
    MethodDef => method_def: MethodDefRow {
        /// IL body, `None` for abstract, runtime or P/Invoke methods
        body: Option<MethodBody> = Rva,
        /// Implementation attributes
        impl_flags: MethodImplAttributes = Constant16,
        /// Attributes
        flags: MethodAttributes = Constant16,
        /// Method name
        name: String = StringIndex,
        /// Method signature
        signature: SignatureMethod = BlobIndex,
        /// First parameter row owned by this method
        param_list: TableIndex = SimpleTableIndex(TableId::Param),
    },

    /// Indirection into `Param` used by unoptimized metadata
    ParamPtr => param_ptr: ParamPtrRow {
        /// The parameter
        param: TableIndex = SimpleTableIndex(TableId::Param),
    },

    /// A parameter or return value description
    Param => param: ParamRow {
        /// Attributes
        flags: ParamAttributes = Constant16,
        /// Position, `0` is the return value
        sequence: u16 = Constant16,
        /// Parameter name
        name: String = StringIndex,
    },

    /// An interface implemented by a type
    InterfaceImpl => interface_impl: InterfaceImplRow {
        /// The implementing type
        class: TableIndex = SimpleTableIndex(TableId::TypeDef),
        /// The interface
        interface: TableIndex = CodedTableIndex(TypeDefOrRef),
    },

    /// A reference to a field or method
    MemberRef => member_ref: MemberRefRow {
        /// Declaring type, module reference, method or type specification
        class: TableIndex = CodedTableIndex(MemberRefParent),
        /// Member name
        name: String = StringIndex,
        /// Field or method signature
        signature: AbstractSignature = BlobIndex,
    },

    /// A compile time constant of a field, parameter or property
    Constant => constant: ConstantRow {
        /// Element type of the value
        element_type: u8 = Constant8,
        /// Padding, zero
        padding: u8 = Constant8,
        /// Owning field, parameter or property
        parent: TableIndex = CodedTableIndex(HasConstant),
        /// The value
        value: ConstantValue = BlobIndex,
    },

    /// A custom attribute instance
    CustomAttribute => custom_attribute: CustomAttributeRow {
        /// Decorated entity
        parent: TableIndex = CodedTableIndex(HasCustomAttribute),
        /// Attribute constructor
        constructor: TableIndex = CodedTableIndex(CustomAttributeType),
        /// Constructor arguments and named arguments
        value: CustomAttributeValue = BlobIndex,
    },

    /// Marshalling description of a field or parameter
    FieldMarshal => field_marshal: FieldMarshalRow {
        /// Field or parameter
        parent: TableIndex = CodedTableIndex(HasFieldMarshal),
        /// Native type descriptor
        native_type: MarshallingInfo = BlobIndex,
    },

    /// A declarative security permission set
    DeclSecurity => decl_security: DeclSecurityRow {
        /// Security action
        action: u16 = Constant16,
        /// Type, method or assembly
        parent: TableIndex = CodedTableIndex(HasDeclSecurity),
        /// Permission set
        permission_set: PermissionSet = BlobIndex,
    },

    /// Explicit layout of a type
    ClassLayout => class_layout: ClassLayoutRow {
        /// Field alignment
        packing_size: u16 = Constant16,
        /// Total size of instances
        class_size: u32 = Constant32,
        /// The type
        parent: TableIndex = SimpleTableIndex(TableId::TypeDef),
    },

    /// Explicit offset of a field
    FieldLayout => field_layout: FieldLayoutRow {
        /// Byte offset
        offset: u32 = Constant32,
        /// The field
        field: TableIndex = SimpleTableIndex(TableId::Field),
    },

    /// A signature not attached to a member, locals and call sites
    StandAloneSig => stand_alone_sig: StandAloneSigRow {
        /// The signature
        signature: AbstractSignature = BlobIndex,
    },

    /// Maps a type to its events
    EventMap => event_map: EventMapRow {
        /// The type
        parent: TableIndex = SimpleTableIndex(TableId::TypeDef),
        /// First event owned by the type
        event_list: TableIndex = SimpleTableIndex(TableId::Event),
    },

    /// Indirection into `Event` used by unoptimized metadata
    EventPtr => event_ptr: EventPtrRow {
        /// The event
        event: TableIndex = SimpleTableIndex(TableId::Event),
    },

    /// An event definition
    Event => event: EventRow {
        /// Attributes
        flags: EventAttributes = Constant16,
        /// Event name
        name: String = StringIndex,
        /// Delegate type of the event
        event_type: Option<TableIndex> = CodedTableIndexNullable(TypeDefOrRef),
    },

    /// Maps a type to its properties
    PropertyMap => property_map: PropertyMapRow {
        /// The type
        parent: TableIndex = SimpleTableIndex(TableId::TypeDef),
        /// First property owned by the type
        property_list: TableIndex = SimpleTableIndex(TableId::Property),
    },

    /// Indirection into `Property` used by unoptimized metadata
    PropertyPtr => property_ptr: PropertyPtrRow {
        /// The property
        property: TableIndex = SimpleTableIndex(TableId::Property),
    },

    /// A property definition
    Property => property: PropertyRow {
        /// Attributes
        flags: PropertyAttributes = Constant16,
        /// Property name
        name: String = StringIndex,
        /// Property signature
        signature: SignatureProperty = BlobIndex,
    },

    /// Binds accessor methods to events and properties
    MethodSemantics => method_semantics: MethodSemanticsRow {
        /// Role of the method
        semantics: MethodSemanticsAttributes = Constant16,
        /// The accessor
        method: TableIndex = SimpleTableIndex(TableId::MethodDef),
        /// Event or property
        association: TableIndex = CodedTableIndex(HasSemantics),
    },

    /// Explicit interface method implementation
    MethodImpl => method_impl: MethodImplRow {
        /// Implementing type
        class: TableIndex = SimpleTableIndex(TableId::TypeDef),
        /// Implementing method
        method_body: TableIndex = CodedTableIndex(MethodDefOrRef),
        /// Implemented method
        method_declaration: TableIndex = CodedTableIndex(MethodDefOrRef),
    },

    /// A reference to another module of the assembly or a native library
    ModuleRef => module_ref: ModuleRefRow {
        /// Module name
        name: String = StringIndex,
    },

    /// A constructed type
    TypeSpec => type_spec: TypeSpecRow {
        /// The type
        signature: TypeSignature = BlobIndex,
    },

    /// P/Invoke binding of a method or field
    ImplMap => impl_map: ImplMapRow {
        /// Marshalling and calling convention
        mapping_flags: PInvokeAttributes = Constant16,
        /// Forwarded field or method
        member_forwarded: TableIndex = CodedTableIndex(MemberForwarded),
        /// Entry point name
        import_name: String = StringIndex,
        /// Native library
        import_scope: TableIndex = SimpleTableIndex(TableId::ModuleRef),
    },

    /// Initial data of a static field
    FieldRVA => field_rva: FieldRvaRow {
        /// The data, its length follows from the field type
        data: Vec<u8> = Rva,
        /// The field
        field: TableIndex = SimpleTableIndex(TableId::Field),
    },

    /// Edit-and-continue log
    EncLog => enc_log: EncLogRow {
        /// Token of the changed entity
        token: u32 = Constant32,
        /// Kind of change
        func_code: u32 = Constant32,
    },

    /// Edit-and-continue token map
    EncMap => enc_map: EncMapRow {
        /// Mapped token
        token: u32 = Constant32,
    },

    /// The assembly manifest, at most one row
    Assembly => assembly: AssemblyRow {
        /// Hash algorithm of the file hashes, see [`super::AssemblyHashAlgorithm`]
        hash_algorithm: u32 = Constant32,
        /// Major version
        major_version: u16 = Constant16,
        /// Minor version
        minor_version: u16 = Constant16,
        /// Build number
        build_number: u16 = Constant16,
        /// Revision number
        revision_number: u16 = Constant16,
        /// Attributes
        flags: AssemblyFlags = Constant32,
        /// Full public key, empty for unsigned assemblies
        public_key: Vec<u8> = BlobIndex,
        /// Simple name
        name: String = StringIndex,
        /// Culture
        culture: String = StringIndex,
    },

    /// Unused processor list of the assembly
    AssemblyProcessor => assembly_processor: AssemblyProcessorRow {
        /// Processor id
        processor: u32 = Constant32,
    },

    /// Unused operating system list of the assembly
    AssemblyOS => assembly_os: AssemblyOsRow {
        /// Platform id
        os_platform_id: u32 = Constant32,
        /// Major version
        os_major_version: u32 = Constant32,
        /// Minor version
        os_minor_version: u32 = Constant32,
    },

    /// A referenced assembly
    AssemblyRef => assembly_ref: AssemblyRefRow {
        /// Major version
        major_version: u16 = Constant16,
        /// Minor version
        minor_version: u16 = Constant16,
        /// Build number
        build_number: u16 = Constant16,
        /// Revision number
        revision_number: u16 = Constant16,
        /// Attributes, [`AssemblyFlags::PUBLIC_KEY`] marks a full key
        flags: AssemblyFlags = Constant32,
        /// Public key or its 8-byte token
        public_key_or_token: Vec<u8> = BlobIndex,
        /// Simple name
        name: String = StringIndex,
        /// Culture
        culture: String = StringIndex,
        /// Hash of the referenced assembly
        hash_value: Vec<u8> = BlobIndex,
    },

    /// Unused processor list of an assembly reference
    AssemblyRefProcessor => assembly_ref_processor: AssemblyRefProcessorRow {
        /// Processor id
        processor: u32 = Constant32,
        /// The reference
        assembly_ref: TableIndex = SimpleTableIndex(TableId::AssemblyRef),
    },

    /// Unused operating system list of an assembly reference
    AssemblyRefOS => assembly_ref_os: AssemblyRefOsRow {
        /// Platform id
        os_platform_id: u32 = Constant32,
        /// Major version
        os_major_version: u32 = Constant32,
        /// Minor version
        os_minor_version: u32 = Constant32,
        /// The reference
        assembly_ref: TableIndex = SimpleTableIndex(TableId::AssemblyRef),
    },

    /// Another file of a multi-file assembly
    File => file: FileRow {
        /// Attributes
        flags: FileAttributes = Constant32,
        /// File name
        name: String = StringIndex,
        /// Hash of the file
        hash_value: Vec<u8> = BlobIndex,
    },

    /// A type exported from another module or forwarded to another assembly
    ExportedType => exported_type: ExportedTypeRow {
        /// Attributes
        flags: TypeAttributes = Constant32,
        /// `TypeDef` token hint in the defining module
        type_def_id: u32 = Constant32,
        /// Type name
        name: String = StringIndex,
        /// Type namespace
        namespace: String = StringIndex,
        /// File, enclosing exported type or assembly reference
        implementation: TableIndex = CodedTableIndex(Implementation),
    },

    /// A resource of the assembly
    ManifestResource => manifest_resource: ManifestResourceRow {
        /// Embedded data or offset inside the implementing file
        data: ManifestResourceData = Constant32,
        /// Attributes
        flags: ManifestResourceAttributes = Constant32,
        /// Resource name
        name: String = StringIndex,
        /// File or assembly reference, `None` for embedded resources
        implementation: Option<TableIndex> = CodedTableIndexNullable(Implementation),
    },

    /// Nesting of a type inside another
    NestedClass => nested_class: NestedClassRow {
        /// The nested type
        nested_class: TableIndex = SimpleTableIndex(TableId::TypeDef),
        /// The enclosing type
        enclosing_class: TableIndex = SimpleTableIndex(TableId::TypeDef),
    },

    /// A generic parameter of a type or method
    GenericParam => generic_param: GenericParamRow {
        /// Position in the parameter list
        number: u16 = Constant16,
        /// Variance and constraints
        flags: GenericParamAttributes = Constant16,
        /// Owning type or method
        owner: TableIndex = CodedTableIndex(TypeOrMethodDef),
        /// Parameter name
        name: String = StringIndex,
    },

    /// An instantiation of a generic method
    MethodSpec => method_spec: MethodSpecRow {
        /// The generic method
        method: TableIndex = CodedTableIndex(MethodDefOrRef),
        /// Type arguments
        instantiation: SignatureMethodSpec = BlobIndex,
    },

    /// A constraint of a generic parameter
    GenericParamConstraint => generic_param_constraint: GenericParamConstraintRow {
        /// The parameter
        owner: TableIndex = SimpleTableIndex(TableId::GenericParam),
        /// The constraint type
        constraint: TableIndex = CodedTableIndex(TypeDefOrRef),
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_counts() {
        assert_eq!(TableId::Module.columns().len(), 5);
        assert_eq!(TableId::TypeDef.columns().len(), 6);
        assert_eq!(TableId::MethodDef.columns().len(), 6);
        assert_eq!(TableId::Constant.columns().len(), 4);
        assert_eq!(TableId::Assembly.columns().len(), 9);
        assert_eq!(TableId::AssemblyRef.columns().len(), 9);
        assert_eq!(TableId::GenericParamConstraint.columns().len(), 2);
    }

    #[test]
    fn column_names_follow_fields() {
        let names: Vec<_> = TableId::TypeDef
            .columns()
            .iter()
            .map(|column| column.name)
            .collect();
        assert_eq!(
            names,
            ["flags", "name", "namespace", "extends", "field_list", "method_list"]
        );
        assert_eq!(
            TableId::TypeDef.columns()[3].kind,
            CodedTableIndexNullable(TypeDefOrRef)
        );
    }

    #[test]
    fn every_table_has_columns() {
        for table in TableId::iter() {
            assert!(!table.columns().is_empty(), "{table:?}");
        }
    }

    #[test]
    fn empty_row_counts() {
        let tables = MetadataTables::default();
        assert_eq!(tables.row_counts(), [0; TABLE_COUNT]);
    }
}
