//! Encoding boundaries: index widths, header formats, exception section limits, heap
//! deduplication and the custom attribute fallback.

mod common;

use dotmeta::{
    metadata::{
        customattributes::CustomAttributeValue,
        method::{ExceptionBlock, ExceptionBlockKind, Instruction, MethodBody, OpCode, Operand},
        streams::HeapSizes,
        tables::{
            CodedIndexType, CustomAttributeRow, TableId, TableIndex, TableInfo, TypeRefRow,
            TABLE_COUNT,
        },
    },
    CilMetadata, WritingOptions,
};

use common::{sample_metadata, type_ref};

fn roundtrip(metadata: &CilMetadata) -> CilMetadata {
    let image = metadata.write(&metadata.writing_options()).unwrap();
    CilMetadata::from_mem(image).unwrap()
}

fn count(haystack: &[u8], needle: &[u8]) -> usize {
    haystack
        .windows(needle.len())
        .filter(|window| *window == needle)
        .count()
}

fn nops(count: usize) -> Vec<Instruction> {
    let mut instructions = vec![Instruction::new(OpCode::NOP); count - 1];
    instructions.push(Instruction::new(OpCode::RET));
    instructions
}

#[test]
fn coded_index_width_boundary() {
    let mut rows = [0u32; TABLE_COUNT];
    rows[TableId::TypeRef as usize] = 16382;
    let narrow = TableInfo::new(rows, HeapSizes::empty());
    assert_eq!(narrow.coded_index_size(CodedIndexType::TypeDefOrRef), 2);

    rows[TableId::TypeRef as usize] = 16383;
    let wide = TableInfo::new(rows, HeapSizes::empty());
    assert_eq!(wide.coded_index_size(CodedIndexType::TypeDefOrRef), 4);
    assert_eq!(wide.coded_index_size(CodedIndexType::ResolutionScope), 4);
    // groups without TypeRef keep their width
    assert_eq!(wide.coded_index_size(CodedIndexType::HasConstant), 2);
    assert_eq!(wide.simple_index_size(TableId::TypeRef), 2);
}

#[test]
fn wide_indices_roundtrip() {
    for extra in [16382 - 3, 16384 - 3] {
        let mut metadata = sample_metadata();
        let tables = &mut metadata.tables;
        tables.type_ref.extend((0..extra).map(|index| TypeRefRow {
            resolution_scope: Some(TableIndex::new(TableId::AssemblyRef, 0)),
            name: format!("Generated{}", index),
            namespace: "Sample.Generated".to_string(),
        }));
        let last = tables.type_ref.len() as u32 - 1;
        tables.type_def[1].extends = Some(TableIndex::new(TableId::TypeRef, last));

        let reread = roundtrip(&metadata);
        assert_eq!(reread.tables.type_ref.len(), metadata.tables.type_ref.len());
        assert_eq!(reread.tables, metadata.tables);
    }
}

#[test]
fn heaps_are_deduplicated() {
    let mut metadata = sample_metadata();
    metadata.tables.type_ref.push(type_ref("System", "Console"));
    let body = metadata.tables.method_def[0].body.as_mut().unwrap();
    body.instructions.insert(
        0,
        Instruction::with_operand(OpCode::LDSTR, Operand::String("Hello, World!".to_string())),
    );
    body.instructions.insert(1, Instruction::new(OpCode::POP));

    let image = metadata.write(&WritingOptions::default()).unwrap();
    assert_eq!(count(&image, b"Console\0"), 1);

    let utf16: Vec<u8> = "Hello, World!"
        .encode_utf16()
        .flat_map(u16::to_le_bytes)
        .collect();
    assert_eq!(count(&image, &utf16), 1);

    let reread = CilMetadata::from_mem(image).unwrap();
    assert_eq!(reread.tables, metadata.tables);
}

#[test]
fn tiny_and_fat_header_boundary() {
    let tiny = MethodBody::new(nops(63));
    assert_eq!(tiny.code_size(), 63);
    assert_eq!(tiny.size(), 64);

    let fat = MethodBody::new(nops(64));
    assert_eq!(fat.size(), 12 + 64);

    let deep_stack = MethodBody {
        max_stack: 9,
        ..MethodBody::new(nops(2))
    };
    assert_eq!(deep_stack.size(), 12 + 2);

    let mut metadata = sample_metadata();
    metadata.tables.method_def[0].body = Some(tiny);
    metadata.tables.method_def[1].body = Some(fat);
    let reread = roundtrip(&metadata);
    assert_eq!(reread.tables.method_def, metadata.tables.method_def);
}

#[test]
fn exception_sections_are_chained() {
    let blocks: Vec<ExceptionBlock> = (0..21)
        .map(|index| ExceptionBlock {
            kind: ExceptionBlockKind::Finally,
            try_offset: index * 4,
            try_length: 2,
            handler_offset: index * 4 + 2,
            handler_length: 2,
        })
        .collect();
    let body = MethodBody {
        exception_blocks: blocks,
        ..MethodBody::new(nops(21 * 4 + 1))
    };
    // 12 byte header, 85 bytes of code padded to 88, two small sections of 20 and 1 clauses
    assert_eq!(body.size(), 12 + 88 + (4 + 20 * 12) + (4 + 12));

    let mut metadata = sample_metadata();
    metadata.tables.method_def[1].body = Some(body.clone());
    let reread = roundtrip(&metadata);
    assert_eq!(reread.tables.method_def[1].body, Some(body));
}

#[test]
fn fat_exception_clauses() {
    let body = MethodBody {
        exception_blocks: vec![ExceptionBlock {
            kind: ExceptionBlockKind::Catch(TableIndex::new(TableId::TypeRef, 0)),
            try_offset: 0,
            try_length: 300,
            handler_offset: 300,
            handler_length: 1,
        }],
        ..MethodBody::new(nops(302))
    };

    let mut metadata = sample_metadata();
    metadata.tables.method_def[1].body = Some(body.clone());
    let reread = roundtrip(&metadata);
    assert_eq!(reread.tables.method_def[1].body, Some(body));
}

#[test]
fn undecodable_custom_attributes_stay_raw() {
    let mut metadata = sample_metadata();
    // constructor row beyond the MemberRef table
    metadata.tables.custom_attribute.push(CustomAttributeRow {
        parent: TableIndex::new(TableId::Assembly, 0),
        constructor: TableIndex::new(TableId::MemberRef, 9),
        value: CustomAttributeValue::Raw(vec![0x01, 0x00, 0x2A, 0x00, 0x00, 0x00, 0x00, 0x00]),
    });
    // null string argument, the named argument count is missing
    metadata.tables.custom_attribute.push(CustomAttributeRow {
        parent: TableIndex::new(TableId::TypeDef, 1),
        constructor: TableIndex::new(TableId::MemberRef, 1),
        value: CustomAttributeValue::Raw(vec![0x01, 0x00, 0xFF]),
    });

    let reread = roundtrip(&metadata);
    let attributes = &reread.tables.custom_attribute;
    assert!(matches!(attributes[0].value, CustomAttributeValue::Resolved(_)));
    assert_eq!(
        attributes[1].value,
        CustomAttributeValue::Raw(vec![0x01, 0x00, 0x2A, 0x00, 0x00, 0x00, 0x00, 0x00])
    );
    assert_eq!(
        attributes[2].value,
        CustomAttributeValue::Raw(vec![0x01, 0x00, 0xFF])
    );
}
