//! A small but complete assembly built in memory, shared by the integration tests.
//!
//! ```text
//! .assembly Sample 1.2.3.4
//! .assembly extern mscorlib 4.0.0.0
//!
//! public class Sample.Program
//! {
//!     static int32 Seed at D_0000 = 0x2A
//!
//!     public static void Main(string[] args)      // tiny body, ldstr + call
//!     public static int32 Compute(int32 value)    // fat body, locals and a finally block
//! }
//!
//! [assembly: System.Reflection.AssemblyTitleAttribute("Sample")]
//! .mresource public Sample.data                  // 5 embedded bytes
//! ```

#![allow(dead_code)]

use dotmeta::metadata::{
    customattributes::{CustomAttributeArgument, CustomAttributeSignature, CustomAttributeValue},
    method::{ExceptionBlock, ExceptionBlockKind, Instruction, MethodBody, OpCode, Operand},
    resource::ManifestResourceData,
    signatures::{
        AbstractSignature, SignatureField, SignatureLocalVariable, SignatureLocalVariables,
        SignatureMethod, SignatureSzArray, SimpleType, TypeSignature,
    },
    tables::{
        AssemblyFlags, AssemblyRefRow, AssemblyRow, CustomAttributeRow, FieldAttributes,
        FieldRow, FieldRvaRow, ManifestResourceAttributes, ManifestResourceRow, MemberRefRow,
        MethodAttributes, MethodDefRow, MethodImplAttributes, ModuleRow, ParamAttributes,
        ParamRow, StandAloneSigRow, TableId, TableIndex, TypeAttributes, TypeDefRow, TypeRefRow,
    },
};
use dotmeta::CilMetadata;

pub const MSCORLIB_TOKEN: [u8; 8] = [0xB7, 0x7A, 0x5C, 0x56, 0x19, 0x34, 0xE0, 0x89];

pub fn module(name: &str) -> ModuleRow {
    ModuleRow {
        generation: 0,
        name: name.to_string(),
        mvid: Some(uguid::guid!("7C3B5D0E-3F4A-4E26-9B1D-2F6A8C4E0B11")),
        enc_id: None,
        enc_base_id: None,
    }
}

pub fn type_ref(namespace: &str, name: &str) -> TypeRefRow {
    TypeRefRow {
        resolution_scope: Some(TableIndex::new(TableId::AssemblyRef, 0)),
        name: name.to_string(),
        namespace: namespace.to_string(),
    }
}

fn simple(simple: SimpleType) -> TypeSignature {
    TypeSignature::Simple(simple)
}

fn instance(mut signature: SignatureMethod) -> SignatureMethod {
    signature.has_this = true;
    signature
}

pub fn main_body() -> MethodBody {
    MethodBody::new(vec![
        Instruction::with_operand(OpCode::LDSTR, Operand::String("Hello, World!".to_string())),
        Instruction::with_operand(
            OpCode::CALL,
            Operand::Token(TableIndex::new(TableId::MemberRef, 0)),
        ),
        Instruction::new(OpCode::RET),
    ])
}

pub fn compute_body() -> MethodBody {
    // try { value += 1 } finally { nop } return value
    MethodBody {
        max_stack: 2,
        init_locals: true,
        local_var_sig: Some(TableIndex::new(TableId::StandAloneSig, 0)),
        instructions: vec![
            Instruction::new(OpCode::LDARG_0),
            Instruction::new(OpCode::LDC_I4_1),
            Instruction::new(OpCode::ADD),
            Instruction::new(OpCode::STLOC_0),
            Instruction::with_operand(OpCode::LEAVE_S, Operand::Branch(2)),
            Instruction::new(OpCode::NOP),
            Instruction::new(OpCode::ENDFINALLY),
            Instruction::new(OpCode::LDLOC_0),
            Instruction::new(OpCode::RET),
        ],
        exception_blocks: vec![ExceptionBlock {
            kind: ExceptionBlockKind::Finally,
            try_offset: 0,
            try_length: 6,
            handler_offset: 6,
            handler_length: 2,
        }],
    }
}

/// The sample assembly described in the module documentation.
pub fn sample_metadata() -> CilMetadata {
    let mut metadata = CilMetadata::default();
    let tables = &mut metadata.tables;

    tables.module.push(module("Sample.dll"));

    tables.assembly_ref.push(AssemblyRefRow {
        major_version: 4,
        minor_version: 0,
        build_number: 0,
        revision_number: 0,
        flags: AssemblyFlags::empty(),
        public_key_or_token: MSCORLIB_TOKEN.to_vec(),
        name: "mscorlib".to_string(),
        culture: String::new(),
        hash_value: Vec::new(),
    });
    tables.type_ref.push(type_ref("System", "Object"));
    tables.type_ref.push(type_ref("System", "Console"));
    tables
        .type_ref
        .push(type_ref("System.Reflection", "AssemblyTitleAttribute"));

    tables.type_def.push(TypeDefRow {
        flags: TypeAttributes::empty(),
        name: "<Module>".to_string(),
        namespace: String::new(),
        extends: None,
        field_list: TableIndex::new(TableId::Field, 0),
        method_list: TableIndex::new(TableId::MethodDef, 0),
    });
    tables.type_def.push(TypeDefRow {
        flags: TypeAttributes::PUBLIC,
        name: "Program".to_string(),
        namespace: "Sample".to_string(),
        extends: Some(TableIndex::new(TableId::TypeRef, 0)),
        field_list: TableIndex::new(TableId::Field, 0),
        method_list: TableIndex::new(TableId::MethodDef, 0),
    });

    tables.field.push(FieldRow {
        flags: FieldAttributes::STATIC | FieldAttributes::HAS_FIELD_RVA,
        name: "Seed".to_string(),
        signature: SignatureField::new(simple(SimpleType::I4)),
    });
    tables.field_rva.push(FieldRvaRow {
        data: 0x2Au32.to_le_bytes().to_vec(),
        field: TableIndex::new(TableId::Field, 0),
    });

    tables.method_def.push(MethodDefRow {
        body: Some(main_body()),
        impl_flags: MethodImplAttributes::empty(),
        flags: MethodAttributes::PUBLIC | MethodAttributes::STATIC | MethodAttributes::HIDE_BY_SIG,
        name: "Main".to_string(),
        signature: SignatureMethod::new(
            simple(SimpleType::Void),
            vec![TypeSignature::SimpleArray(SignatureSzArray {
                modifiers: Vec::new(),
                base: Box::new(simple(SimpleType::String)),
            })],
        ),
        param_list: TableIndex::new(TableId::Param, 0),
    });
    tables.method_def.push(MethodDefRow {
        body: Some(compute_body()),
        impl_flags: MethodImplAttributes::empty(),
        flags: MethodAttributes::PUBLIC | MethodAttributes::STATIC | MethodAttributes::HIDE_BY_SIG,
        name: "Compute".to_string(),
        signature: SignatureMethod::new(simple(SimpleType::I4), vec![simple(SimpleType::I4)]),
        param_list: TableIndex::new(TableId::Param, 1),
    });
    tables.param.push(ParamRow {
        flags: ParamAttributes::empty(),
        sequence: 1,
        name: "args".to_string(),
    });
    tables.param.push(ParamRow {
        flags: ParamAttributes::empty(),
        sequence: 1,
        name: "value".to_string(),
    });

    tables.member_ref.push(MemberRefRow {
        class: TableIndex::new(TableId::TypeRef, 1),
        name: "WriteLine".to_string(),
        signature: AbstractSignature::Method(SignatureMethod::new(
            simple(SimpleType::Void),
            vec![simple(SimpleType::String)],
        )),
    });
    tables.member_ref.push(MemberRefRow {
        class: TableIndex::new(TableId::TypeRef, 2),
        name: ".ctor".to_string(),
        signature: AbstractSignature::Method(instance(SignatureMethod::new(
            simple(SimpleType::Void),
            vec![simple(SimpleType::String)],
        ))),
    });

    tables.stand_alone_sig.push(StandAloneSigRow {
        signature: AbstractSignature::LocalVariables(SignatureLocalVariables {
            locals: vec![SignatureLocalVariable {
                modifiers: Vec::new(),
                pinned: false,
                by_ref: false,
                base: simple(SimpleType::I4),
            }],
        }),
    });

    tables.assembly.push(AssemblyRow {
        hash_algorithm: 0x8004,
        major_version: 1,
        minor_version: 2,
        build_number: 3,
        revision_number: 4,
        flags: AssemblyFlags::empty(),
        public_key: Vec::new(),
        name: "Sample".to_string(),
        culture: String::new(),
    });
    tables.custom_attribute.push(CustomAttributeRow {
        parent: TableIndex::new(TableId::Assembly, 0),
        constructor: TableIndex::new(TableId::MemberRef, 1),
        value: CustomAttributeValue::Resolved(CustomAttributeSignature {
            fixed_args: vec![CustomAttributeArgument::String(Some("Sample".to_string()))],
            named_args: Vec::new(),
        }),
    });

    tables.manifest_resource.push(ManifestResourceRow {
        data: ManifestResourceData::Embedded(vec![1, 2, 3, 4, 5]),
        flags: ManifestResourceAttributes::PUBLIC,
        name: "Sample.data".to_string(),
        implementation: None,
    });

    metadata.entry_point = Some(TableIndex::new(TableId::MethodDef, 0));
    metadata
}
