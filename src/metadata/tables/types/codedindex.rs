use strum::{EnumCount, EnumIter};

use crate::{
    metadata::tables::{TableId, TableIndex},
    Error, Result,
};

/// One tag slot of a coded index group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodedSlot {
    /// The tag selects this table
    Table(TableId),
    /// The tag value exists but must not be used
    Reserved,
}

use CodedSlot::{Reserved, Table};

/// The 13 coded index groups of ECMA-335 §II.24.2.6.
///
/// A coded index packs a one-based row number and a tag selecting one of the group's tables
/// into a single integer: `(row << tag_bits) | tag`.
#[derive(Debug, Hash, Eq, PartialEq, Clone, Copy, EnumIter, EnumCount)]
pub enum CodedIndexType {
    /// `TypeDef`, `TypeRef`, `TypeSpec`
    TypeDefOrRef,
    /// `Field`, `Param`, `Property`
    HasConstant,
    /// Everything that can carry a custom attribute
    HasCustomAttribute,
    /// `Field`, `Param`
    HasFieldMarshal,
    /// `TypeDef`, `MethodDef`, `Assembly`
    HasDeclSecurity,
    /// `TypeDef`, `TypeRef`, `ModuleRef`, `MethodDef`, `TypeSpec`
    MemberRefParent,
    /// `Event`, `Property`
    HasSemantics,
    /// `MethodDef`, `MemberRef`
    MethodDefOrRef,
    /// `Field`, `MethodDef`
    MemberForwarded,
    /// `File`, `AssemblyRef`, `ExportedType`
    Implementation,
    /// `MethodDef` (tag 2), `MemberRef` (tag 3), tags 0, 1 and 4 are reserved
    CustomAttributeType,
    /// `Module`, `ModuleRef`, `AssemblyRef`, `TypeRef`
    ResolutionScope,
    /// `TypeDef`, `MethodDef`
    TypeOrMethodDef,
}

impl CodedIndexType {
    /// The tag slots of the group, indexed by tag value.
    #[must_use]
    pub fn slots(&self) -> &'static [CodedSlot] {
        match self {
            CodedIndexType::TypeDefOrRef => &[
                Table(TableId::TypeDef),
                Table(TableId::TypeRef),
                Table(TableId::TypeSpec),
            ],
            CodedIndexType::HasConstant => &[
                Table(TableId::Field),
                Table(TableId::Param),
                Table(TableId::Property),
            ],
            CodedIndexType::HasCustomAttribute => &[
                Table(TableId::MethodDef),
                Table(TableId::Field),
                Table(TableId::TypeRef),
                Table(TableId::TypeDef),
                Table(TableId::Param),
                Table(TableId::InterfaceImpl),
                Table(TableId::MemberRef),
                Table(TableId::Module),
                // 'Permission' in the standard, no such table exists
                Table(TableId::DeclSecurity),
                Table(TableId::Property),
                Table(TableId::Event),
                Table(TableId::StandAloneSig),
                Table(TableId::ModuleRef),
                Table(TableId::TypeSpec),
                Table(TableId::Assembly),
                Table(TableId::AssemblyRef),
                Table(TableId::File),
                Table(TableId::ExportedType),
                Table(TableId::ManifestResource),
                Table(TableId::GenericParam),
                Table(TableId::GenericParamConstraint),
                Table(TableId::MethodSpec),
            ],
            CodedIndexType::HasFieldMarshal => &[Table(TableId::Field), Table(TableId::Param)],
            CodedIndexType::HasDeclSecurity => &[
                Table(TableId::TypeDef),
                Table(TableId::MethodDef),
                Table(TableId::Assembly),
            ],
            CodedIndexType::MemberRefParent => &[
                Table(TableId::TypeDef),
                Table(TableId::TypeRef),
                Table(TableId::ModuleRef),
                Table(TableId::MethodDef),
                Table(TableId::TypeSpec),
            ],
            CodedIndexType::HasSemantics => &[Table(TableId::Event), Table(TableId::Property)],
            CodedIndexType::MethodDefOrRef => {
                &[Table(TableId::MethodDef), Table(TableId::MemberRef)]
            }
            CodedIndexType::MemberForwarded => &[Table(TableId::Field), Table(TableId::MethodDef)],
            CodedIndexType::Implementation => &[
                Table(TableId::File),
                Table(TableId::AssemblyRef),
                Table(TableId::ExportedType),
            ],
            CodedIndexType::CustomAttributeType => &[
                Reserved,
                Reserved,
                Table(TableId::MethodDef),
                Table(TableId::MemberRef),
                Reserved,
            ],
            CodedIndexType::ResolutionScope => &[
                Table(TableId::Module),
                Table(TableId::ModuleRef),
                Table(TableId::AssemblyRef),
                Table(TableId::TypeRef),
            ],
            CodedIndexType::TypeOrMethodDef => &[Table(TableId::TypeDef), Table(TableId::MethodDef)],
        }
    }

    /// The tables that can be referenced, reserved slots skipped.
    pub fn tables(&self) -> impl Iterator<Item = TableId> {
        self.slots().iter().filter_map(|slot| match slot {
            Table(table) => Some(*table),
            Reserved => None,
        })
    }

    /// Number of low bits holding the tag, `ceil(log2(slot count))`.
    #[must_use]
    pub fn tag_bits(&self) -> u32 {
        let slots = self.slots().len() as u32;
        u32::BITS - (slots - 1).leading_zeros()
    }

    /// Encode a row reference, `None` encodes as `0`.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidArgument`] if the table is not part of the group or the
    /// row does not fit next to the tag.
    pub fn encode(&self, index: Option<TableIndex>) -> Result<u32> {
        let Some(index) = index else {
            return Ok(0);
        };

        let tag = self
            .slots()
            .iter()
            .position(|slot| *slot == Table(index.table))
            .ok_or_else(|| {
                Error::InvalidArgument(format!(
                    "{:?} cannot reference the {:?} table",
                    self, index.table
                ))
            })?;

        let bits = self.tag_bits();
        let row = index.index + 1;
        if row > (u32::MAX >> bits) {
            return Err(Error::InvalidArgument(format!(
                "row {} does not fit into a {:?} coded index",
                row, self
            )));
        }

        Ok((row << bits) | tag as u32)
    }

    /// Decode a coded index, a row of `0` decodes to `None` whatever the tag.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the tag is beyond the group or selects a
    /// reserved slot.
    pub fn decode(&self, value: u32) -> Result<Option<TableIndex>> {
        let bits = self.tag_bits();
        let tag = (value & ((1 << bits) - 1)) as usize;
        let row = value >> bits;
        if row == 0 {
            return Ok(None);
        }

        let table = match self.slots().get(tag) {
            Some(Table(table)) => *table,
            Some(Reserved) => {
                return Err(malformed_error!(
                    "{:?} coded index uses reserved tag {}",
                    self,
                    tag
                ))
            }
            None => {
                return Err(malformed_error!(
                    "{:?} coded index tag {} out of range",
                    self,
                    tag
                ))
            }
        };

        Ok(Some(TableIndex::new(table, row - 1)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn tag_bits() {
        assert_eq!(CodedIndexType::TypeDefOrRef.tag_bits(), 2);
        assert_eq!(CodedIndexType::HasConstant.tag_bits(), 2);
        assert_eq!(CodedIndexType::HasCustomAttribute.tag_bits(), 5);
        assert_eq!(CodedIndexType::HasFieldMarshal.tag_bits(), 1);
        assert_eq!(CodedIndexType::HasDeclSecurity.tag_bits(), 2);
        assert_eq!(CodedIndexType::MemberRefParent.tag_bits(), 3);
        assert_eq!(CodedIndexType::HasSemantics.tag_bits(), 1);
        assert_eq!(CodedIndexType::MethodDefOrRef.tag_bits(), 1);
        assert_eq!(CodedIndexType::MemberForwarded.tag_bits(), 1);
        assert_eq!(CodedIndexType::Implementation.tag_bits(), 2);
        assert_eq!(CodedIndexType::CustomAttributeType.tag_bits(), 3);
        assert_eq!(CodedIndexType::ResolutionScope.tag_bits(), 2);
        assert_eq!(CodedIndexType::TypeOrMethodDef.tag_bits(), 1);
    }

    #[test]
    fn encode_decode() {
        let index = TableIndex::new(TableId::TypeRef, 0x10);
        let value = CodedIndexType::TypeDefOrRef.encode(Some(index)).unwrap();
        assert_eq!(value, (0x11 << 2) | 1);
        assert_eq!(
            CodedIndexType::TypeDefOrRef.decode(value).unwrap(),
            Some(index)
        );

        for group in CodedIndexType::iter() {
            assert_eq!(group.encode(None).unwrap(), 0);
            for table in group.tables() {
                let index = TableIndex::new(table, 3);
                let value = group.encode(Some(index)).unwrap();
                assert_eq!(group.decode(value).unwrap(), Some(index));
            }
        }
    }

    #[test]
    fn null_row() {
        // tag 1 (TypeRef) with row 0
        assert_eq!(CodedIndexType::TypeDefOrRef.decode(1).unwrap(), None);
    }

    #[test]
    fn custom_attribute_type_slots() {
        let group = CodedIndexType::CustomAttributeType;
        let method = group
            .encode(Some(TableIndex::new(TableId::MethodDef, 0)))
            .unwrap();
        assert_eq!(method, (1 << 3) | 2);
        let member = group
            .encode(Some(TableIndex::new(TableId::MemberRef, 0)))
            .unwrap();
        assert_eq!(member, (1 << 3) | 3);

        assert!(group.decode(1 << 3).is_err());
        assert!(group.decode((1 << 3) | 4).is_err());
        // tag 5..7 lie beyond the group
        assert!(group.decode((1 << 3) | 6).is_err());
    }

    #[test]
    fn foreign_table() {
        let result = CodedIndexType::HasSemantics.encode(Some(TableIndex::new(TableId::Field, 0)));
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn null_before_tag() {
        let group = CodedIndexType::CustomAttributeType;
        // tags 0 and 4 are reserved, 6 lies beyond the group
        assert_eq!(group.decode(0).unwrap(), None);
        assert_eq!(group.decode(4).unwrap(), None);
        assert_eq!(group.decode(6).unwrap(), None);
        assert!(group.decode(1 << 3).is_err());
    }
}
