//! State shared by the column conversions of one read or one write.
//!
//! [`ReadContext`] gives a column access to the heaps and to the raw values of every table,
//! so that blobs depending on other rows (custom attribute values need their constructor
//! signature, enum arguments need the enum's `value__` field) can be decoded while the typed
//! rows are being built. [`WriteContext`] collects heap content and the out-of-metadata
//! payloads (method bodies, field data, embedded resources) while rows are flattened into
//! raw values.

use crate::{
    metadata::{
        signatures::{parse_field_signature, parse_method_signature, SignatureMethod, SimpleType, TypeSignature},
        streams::{Blob, BlobBuilder, Guid, GuidBuilder, Strings, StringsBuilder, UserStringsBuilder},
        tables::{MetadataTables, RawValueStorage, TableId, TableIndex},
    },
    Result,
};

const FIELD_ATTRIBUTE_STATIC: u32 = 0x0010;
const ENUM_VALUE_FIELD: &str = "value__";

/// Heaps and raw rows visible while resolving columns.
pub struct ReadContext<'a> {
    /// `#Strings`
    pub strings: Strings<'a>,
    /// `#Blob`
    pub blobs: Blob<'a>,
    /// `#GUID`
    pub guids: Guid<'a>,
    /// Raw values of every table
    pub raw: &'a RawValueStorage<u32>,
}

impl<'a> ReadContext<'a> {
    /// Create a context over decoded heaps and raw rows.
    #[must_use]
    pub fn new(
        strings: Strings<'a>,
        blobs: Blob<'a>,
        guids: Guid<'a>,
        raw: &'a RawValueStorage<u32>,
    ) -> Self {
        ReadContext {
            strings,
            blobs,
            guids,
            raw,
        }
    }

    /// The string at `index`.
    ///
    /// # Errors
    /// Returns an error if the index is outside `#Strings`.
    pub fn string(&self, index: u32) -> Result<&'a str> {
        self.strings.get(index as usize)
    }

    /// The blob at `index`.
    ///
    /// # Errors
    /// Returns an error if the index is outside `#Blob`.
    pub fn blob(&self, index: u32) -> Result<&'a [u8]> {
        self.blobs.get(index as usize)
    }

    /// Raw value of one column, `None` if the row does not exist.
    #[must_use]
    pub fn raw_value(&self, table: TableId, row: u32, column: usize) -> Option<u32> {
        self.raw.get(table, row, column)
    }

    /// Number of rows of `table`.
    #[must_use]
    pub fn row_count(&self, table: TableId) -> u32 {
        self.raw.row_count(table)
    }

    /// Signature of a `MethodDef` or `MemberRef` row, `None` if the row does not exist or its
    /// signature is not a method signature.
    #[must_use]
    pub fn method_signature(&self, method: TableIndex) -> Option<SignatureMethod> {
        let column = match method.table {
            TableId::MethodDef => 4,
            TableId::MemberRef => 2,
            _ => return None,
        };

        let blob = self.raw_value(method.table, method.index, column)?;
        parse_method_signature(self.blob(blob).ok()?).ok()
    }

    /// `(namespace, name)` of a `TypeDef` or `TypeRef` row.
    #[must_use]
    pub fn type_name(&self, index: TableIndex) -> Option<(&'a str, &'a str)> {
        match index.table {
            TableId::TypeDef | TableId::TypeRef => {
                let name = self.raw_value(index.table, index.index, 1)?;
                let namespace = self.raw_value(index.table, index.index, 2)?;
                Some((
                    self.string(namespace).ok()?,
                    self.string(name).ok()?,
                ))
            }
            _ => None,
        }
    }

    /// Zero-based `Field` rows owned by a `TypeDef`, following `FieldPtr` when present.
    #[must_use]
    pub fn type_def_fields(&self, type_def: u32) -> Vec<u32> {
        let list_table = if self.row_count(TableId::FieldPtr) > 0 {
            TableId::FieldPtr
        } else {
            TableId::Field
        };

        let Some(start) = self.raw_value(TableId::TypeDef, type_def, 4) else {
            return Vec::new();
        };
        let start = start.max(1);
        let end = self
            .raw_value(TableId::TypeDef, type_def + 1, 4)
            .unwrap_or(self.row_count(list_table) + 1)
            .max(start);

        (start..end)
            .filter_map(|row| match list_table {
                TableId::FieldPtr => self
                    .raw_value(TableId::FieldPtr, row - 1, 0)
                    .and_then(|field| field.checked_sub(1)),
                _ => Some(row - 1),
            })
            .filter(|field| *field < self.row_count(TableId::Field))
            .collect()
    }

    /// Underlying type of an enum, taken from the type of its instance `value__` field.
    ///
    /// A `TypeRef` is followed to a `TypeDef` of the same module with the same full name.
    #[must_use]
    pub fn enum_underlying_type(&self, type_ref: TableIndex) -> Option<SimpleType> {
        let type_def = match type_ref.table {
            TableId::TypeDef => type_ref.index,
            TableId::TypeRef => {
                let (namespace, name) = self.type_name(type_ref)?;
                self.find_type_def(namespace, name)?
            }
            _ => return None,
        };

        self.type_def_fields(type_def).into_iter().find_map(|field| {
            let flags = self.raw_value(TableId::Field, field, 0)?;
            let name = self.raw_value(TableId::Field, field, 1)?;
            if flags & FIELD_ATTRIBUTE_STATIC != 0 || self.string(name).ok()? != ENUM_VALUE_FIELD {
                return None;
            }

            let signature = self.raw_value(TableId::Field, field, 2)?;
            match parse_field_signature(self.blob(signature).ok()?).ok()?.base {
                TypeSignature::Simple(simple) => Some(simple),
                _ => None,
            }
        })
    }

    /// Zero-based `TypeDef` row with the given namespace and name.
    #[must_use]
    pub fn find_type_def(&self, namespace: &str, name: &str) -> Option<u32> {
        (0..self.row_count(TableId::TypeDef)).find(|row| {
            self.type_name(TableIndex::new(TableId::TypeDef, *row))
                .is_some_and(|(ns, n)| ns == namespace && n == name)
        })
    }
}

/// Heaps and payload collectors filled while rows are flattened.
pub struct WriteContext<'a> {
    /// `#Strings` under construction
    pub strings: StringsBuilder,
    /// `#Blob` under construction
    pub blobs: BlobBuilder,
    /// `#GUID` under construction
    pub guids: GuidBuilder,
    /// `#US` under construction, filled by `ldstr` operands
    pub user_strings: UserStringsBuilder,
    /// The tables being written
    pub tables: &'a MetadataTables,
    /// Row currently being flattened
    pub current: TableIndex,
    /// Encoded method bodies keyed by zero-based `MethodDef` row
    pub method_bodies: Vec<(u32, Vec<u8>)>,
    /// Field initial data keyed by zero-based `FieldRVA` row
    pub field_data: Vec<(u32, Vec<u8>)>,
    /// Content of the CLI resources directory
    pub resources: Vec<u8>,
}

impl<'a> WriteContext<'a> {
    /// Fresh heaps for writing `tables`.
    #[must_use]
    pub fn new(tables: &'a MetadataTables) -> Self {
        WriteContext {
            strings: StringsBuilder::new(),
            blobs: BlobBuilder::new(),
            guids: GuidBuilder::new(),
            user_strings: UserStringsBuilder::new(),
            tables,
            current: TableIndex::new(TableId::Module, 0),
            method_bodies: Vec::new(),
            field_data: Vec::new(),
            resources: Vec::new(),
        }
    }

    /// Signature of a `MethodDef` or `MemberRef` row of the tables being written.
    #[must_use]
    pub fn method_signature(&self, method: TableIndex) -> Option<&'a SignatureMethod> {
        self.tables.method_signature(method)
    }
}
