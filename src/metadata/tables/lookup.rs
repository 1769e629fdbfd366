//! Cross-table queries on resolved rows.

use std::ops::Range;

use crate::metadata::{
    signatures::{AbstractSignature, SignatureMethod, SimpleType, TypeSignature},
    tables::{flags::FieldAttributes, MetadataTables, TableId, TableIndex},
};

impl MetadataTables {
    /// Signature of a `MethodDef` or `MemberRef` row, `None` if the row does not exist or
    /// references a field.
    #[must_use]
    pub fn method_signature(&self, method: TableIndex) -> Option<&SignatureMethod> {
        match method.table {
            TableId::MethodDef => self
                .method_def
                .get(method.index as usize)
                .map(|row| &row.signature),
            TableId::MemberRef => match &self.member_ref.get(method.index as usize)?.signature {
                AbstractSignature::Method(signature) => Some(signature),
                _ => None,
            },
            _ => None,
        }
    }

    /// `(namespace, name)` of a `TypeDef` or `TypeRef` row.
    #[must_use]
    pub fn type_name(&self, index: TableIndex) -> Option<(&str, &str)> {
        match index.table {
            TableId::TypeDef => self
                .type_def
                .get(index.index as usize)
                .map(|row| (row.namespace.as_str(), row.name.as_str())),
            TableId::TypeRef => self
                .type_ref
                .get(index.index as usize)
                .map(|row| (row.namespace.as_str(), row.name.as_str())),
            _ => None,
        }
    }

    /// Zero-based `TypeDef` row with the given namespace and name.
    #[must_use]
    pub fn find_type_def(&self, namespace: &str, name: &str) -> Option<u32> {
        self.type_def
            .iter()
            .position(|row| row.namespace == namespace && row.name == name)
            .and_then(|index| u32::try_from(index).ok())
    }

    /// Rows of the list table owned by the `TypeDef` row `type_def`: the range from its list
    /// column to the list column of the next row, or to the end of the table.
    fn owned_range(
        &self,
        type_def: u32,
        list: impl Fn(usize) -> Option<u32>,
        table: TableId,
    ) -> Range<u32> {
        let count = self.row_count(table);
        let start = list(type_def as usize).unwrap_or(count).min(count);
        let end = list(type_def as usize + 1).unwrap_or(count).clamp(start, count);
        start..end
    }

    /// Zero-based `Field` rows of a type, following `FieldPtr` when present.
    #[must_use]
    pub fn type_def_fields(&self, type_def: u32) -> Vec<u32> {
        let list = |row: usize| self.type_def.get(row).map(|row| row.field_list.index);
        if self.field_ptr.is_empty() {
            self.owned_range(type_def, list, TableId::Field).collect()
        } else {
            self.owned_range(type_def, list, TableId::FieldPtr)
                .filter_map(|row| self.field_ptr.get(row as usize))
                .map(|ptr| ptr.field.index)
                .collect()
        }
    }

    /// Zero-based `MethodDef` rows of a type, following `MethodPtr` when present.
    #[must_use]
    pub fn type_def_methods(&self, type_def: u32) -> Vec<u32> {
        let list = |row: usize| self.type_def.get(row).map(|row| row.method_list.index);
        if self.method_ptr.is_empty() {
            self.owned_range(type_def, list, TableId::MethodDef).collect()
        } else {
            self.owned_range(type_def, list, TableId::MethodPtr)
                .filter_map(|row| self.method_ptr.get(row as usize))
                .map(|ptr| ptr.method.index)
                .collect()
        }
    }

    /// Underlying type of an enum defined in these tables, taken from its `value__` field.
    /// A `TypeRef` is matched by full name against the `TypeDef` rows.
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

        self.type_def_fields(type_def)
            .into_iter()
            .filter_map(|field| self.field.get(field as usize))
            .find(|field| !field.flags.contains(FieldAttributes::STATIC) && field.name == "value__")
            .and_then(|field| match field.signature.base {
                TypeSignature::Simple(simple) => Some(simple),
                _ => None,
            })
    }

    /// `ClassLayout.ClassSize` of a type, `None` without an explicit layout.
    #[must_use]
    pub fn class_size(&self, type_def: u32) -> Option<u32> {
        self.class_layout
            .iter()
            .find(|layout| layout.parent.index == type_def)
            .map(|layout| layout.class_size)
    }

    /// Byte size of the initial data of a field: the size of a primitive field type or the
    /// class size of a value type defined in these tables.
    #[must_use]
    pub fn field_data_size(&self, field: u32) -> Option<u32> {
        match &self.field.get(field as usize)?.signature.base {
            TypeSignature::Simple(simple) => simple.fixed_size(),
            TypeSignature::ClassOrValue(class) if !class.is_class => {
                match class.type_ref.table {
                    TableId::TypeDef => self.class_size(class.type_ref.index),
                    TableId::TypeRef => {
                        let (namespace, name) = self.type_name(class.type_ref)?;
                        self.class_size(self.find_type_def(namespace, name)?)
                    }
                    _ => None,
                }
            }
            _ => None,
        }
    }

    /// Zero-based `TypeDef` row owning a `Field` row.
    #[must_use]
    pub fn field_owner(&self, field: u32) -> Option<u32> {
        (0..self.row_count(TableId::TypeDef))
            .find(|type_def| self.type_def_fields(*type_def).contains(&field))
    }
}
