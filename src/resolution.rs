//! Re-resolution of custom attributes against referenced assemblies.
//!
//! Custom attribute and security attribute blobs do not carry the underlying type of enum
//! arguments, it has to be looked up on the enum's definition. When that definition lives in
//! another assembly, reading keeps the blob undecoded. Once the caller can provide the
//! referenced assemblies through an [`AssemblyReferenceResolver`],
//! [`resolve_custom_attributes`] decodes those blobs again.
//!
//! # Examples
//!
//! ```rust,no_run
//! use std::path::Path;
//!
//! use dotmeta::{
//!     resolution::{resolve_custom_attributes, AssemblyName, AssemblyReferenceResolver},
//!     CilMetadata,
//! };
//!
//! struct Single(CilMetadata);
//!
//! impl AssemblyReferenceResolver for Single {
//!     fn resolve(&self, name: &AssemblyName) -> Option<&CilMetadata> {
//!         (name.name == "Library").then_some(&self.0)
//!     }
//! }
//!
//! let library = Single(CilMetadata::from_file(Path::new("Library.dll"))?);
//! let mut app = CilMetadata::from_file(Path::new("App.exe"))?;
//! let resolved = resolve_custom_attributes(&mut app, &library);
//! println!("{} attributes decoded", resolved);
//! # Ok::<(), dotmeta::Error>(())
//! ```

use tracing::{debug, trace};

use crate::{
    file::parser::Parser,
    metadata::{
        cilmetadata::CilMetadata,
        customattributes::{
            parse_custom_attribute, parse_named_arguments, split_type_name, CustomAttributeValue,
            EnumResolver,
        },
        security::{PermissionSet, SecurityNamedArguments},
        signatures::SimpleType,
        tables::{AssemblyFlags, AssemblyRefRow, MetadataTables, TableId, TableIndex},
    },
    utils::public_key_token,
    Result,
};

/// Identity of a referenced assembly.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssemblyName {
    /// Simple name
    pub name: String,
    /// `(major, minor, build, revision)`, if known
    pub version: Option<[u16; 4]>,
    /// Culture, `None` for culture neutral assemblies
    pub culture: Option<String>,
    /// Public key token, if the reference is strong named
    pub public_key_token: Option<[u8; 8]>,
}

impl AssemblyName {
    /// Identity of an `AssemblyRef` row. A full public key is reduced to its token.
    #[must_use]
    pub fn from_assembly_ref(row: &AssemblyRefRow) -> Self {
        let public_key_token = if row.flags.contains(AssemblyFlags::PUBLIC_KEY) {
            (!row.public_key_or_token.is_empty())
                .then(|| public_key_token(&row.public_key_or_token))
        } else {
            <[u8; 8]>::try_from(row.public_key_or_token.as_slice()).ok()
        };

        AssemblyName {
            name: row.name.clone(),
            version: Some([
                row.major_version,
                row.minor_version,
                row.build_number,
                row.revision_number,
            ]),
            culture: (!row.culture.is_empty()).then(|| row.culture.clone()),
            public_key_token,
        }
    }

    /// Parse a display name such as
    /// `mscorlib, Version=4.0.0.0, Culture=neutral, PublicKeyToken=b77a5c561934e089`.
    ///
    /// Unknown components are ignored.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for an empty name, a bad version or a bad token.
    pub fn parse(display_name: &str) -> Result<Self> {
        let mut parts = display_name.split(',').map(str::trim);
        let name = parts.next().unwrap_or_default();
        if name.is_empty() {
            return Err(malformed_error!("Assembly name cannot be empty"));
        }

        let mut assembly = AssemblyName {
            name: name.to_string(),
            ..AssemblyName::default()
        };
        for part in parts {
            if let Some(value) = part.strip_prefix("Version=") {
                assembly.version = Some(parse_version(value)?);
            } else if let Some(value) = part.strip_prefix("Culture=") {
                if value != "neutral" {
                    assembly.culture = Some(value.to_string());
                }
            } else if let Some(value) = part.strip_prefix("PublicKeyToken=") {
                if value != "null" && !value.is_empty() {
                    assembly.public_key_token = Some(parse_token(value)?);
                }
            }
        }
        Ok(assembly)
    }
}

fn parse_version(value: &str) -> Result<[u16; 4]> {
    let mut version = [0u16; 4];
    let parts = value.split('.').collect::<Vec<_>>();
    if parts.len() > 4 {
        return Err(malformed_error!("Invalid version format: {}", value));
    }

    for (component, part) in version.iter_mut().zip(parts) {
        *component = part
            .parse()
            .map_err(|_| malformed_error!("Invalid version component: {}", part))?;
    }
    Ok(version)
}

fn parse_token(value: &str) -> Result<[u8; 8]> {
    if value.len() != 16 || !value.is_ascii() {
        return Err(malformed_error!(
            "PublicKeyToken must be 16 hex characters, got '{}'",
            value
        ));
    }

    let mut token = [0u8; 8];
    for (byte, index) in token.iter_mut().zip((0..16).step_by(2)) {
        *byte = u8::from_str_radix(&value[index..index + 2], 16)
            .map_err(|_| malformed_error!("Invalid hex in PublicKeyToken '{}'", value))?;
    }
    Ok(token)
}

/// Access to the assemblies an image references.
pub trait AssemblyReferenceResolver {
    /// The loaded assembly matching `name`, `None` if it is not available.
    fn resolve(&self, name: &AssemblyName) -> Option<&CilMetadata>;
}

/// Looks up enums in the module first and falls back to referenced assemblies.
struct ReferencedEnums<'a> {
    tables: &'a MetadataTables,
    resolver: &'a dyn AssemblyReferenceResolver,
}

impl ReferencedEnums<'_> {
    /// The `AssemblyRef` a type reference resolves through, following enclosing types.
    fn assembly_of(&self, type_ref: TableIndex) -> Option<AssemblyName> {
        let mut current = type_ref;
        for _ in 0..self.tables.type_ref.len() {
            let scope = self.tables.type_ref.get(current.index as usize)?.resolution_scope?;
            match scope.table {
                TableId::AssemblyRef => {
                    let row = self.tables.assembly_ref.get(scope.index as usize)?;
                    return Some(AssemblyName::from_assembly_ref(row));
                }
                TableId::TypeRef => current = scope,
                _ => return None,
            }
        }
        None
    }

    fn underlying_in(assembly: &CilMetadata, name: &str) -> Option<SimpleType> {
        let (namespace, name) = split_type_name(name);
        let tables = &assembly.tables;
        let row = tables.find_type_def(namespace, name)?;
        tables.enum_underlying_type(TableIndex::new(TableId::TypeDef, row))
    }
}

impl EnumResolver for ReferencedEnums<'_> {
    fn type_name(&self, type_ref: TableIndex) -> Option<(&str, &str)> {
        self.tables.type_name(type_ref)
    }

    fn enum_underlying_type(&self, type_ref: TableIndex) -> Option<SimpleType> {
        if let Some(underlying) = self.tables.enum_underlying_type(type_ref) {
            return Some(underlying);
        }
        if type_ref.table != TableId::TypeRef {
            return None;
        }

        let (namespace, name) = self.tables.type_name(type_ref)?;
        let assembly = self.resolver.resolve(&self.assembly_of(type_ref)?)?;
        let row = assembly.tables.find_type_def(namespace, name)?;
        assembly
            .tables
            .enum_underlying_type(TableIndex::new(TableId::TypeDef, row))
    }

    fn enum_underlying_type_by_name(&self, name: &str) -> Option<SimpleType> {
        if let Some(underlying) = self.tables.enum_underlying_type_by_name(name) {
            return Some(underlying);
        }

        // an assembly qualified name says where to look, otherwise try every reference
        if let Some((_, assembly)) = name.split_once(',') {
            let assembly = AssemblyName::parse(assembly.trim()).ok()?;
            return Self::underlying_in(self.resolver.resolve(&assembly)?, name);
        }
        self.tables
            .assembly_ref
            .iter()
            .filter_map(|row| self.resolver.resolve(&AssemblyName::from_assembly_ref(row)))
            .find_map(|assembly| Self::underlying_in(assembly, name))
    }
}

/// Decode the raw custom attributes and raw security attribute arguments of `metadata`
/// with enum types looked up in the assemblies `resolver` provides.
///
/// Blobs that still do not decode stay raw. Returns the number of blobs decoded.
pub fn resolve_custom_attributes(
    metadata: &mut CilMetadata,
    resolver: &dyn AssemblyReferenceResolver,
) -> usize {
    let tables = &metadata.tables;
    let enums = ReferencedEnums { tables, resolver };

    let mut attributes = Vec::new();
    for (row, attribute) in tables.custom_attribute.iter().enumerate() {
        let CustomAttributeValue::Raw(data) = &attribute.value else {
            continue;
        };
        let Some(constructor) = tables.method_signature(attribute.constructor) else {
            continue;
        };
        match parse_custom_attribute(data, constructor, &enums) {
            Ok(value) => attributes.push((row, value)),
            Err(error) => trace!(row, %error, "custom attribute still undecodable"),
        }
    }

    let mut security = Vec::new();
    for (row, declaration) in tables.decl_security.iter().enumerate() {
        let PermissionSet::Attributes(set) = &declaration.permission_set else {
            continue;
        };
        for (index, attribute) in set.iter().enumerate() {
            let SecurityNamedArguments::Raw(data) = &attribute.named_args else {
                continue;
            };
            let mut parser = Parser::new(data);
            match parse_named_arguments(&mut parser, &enums, true) {
                Ok(arguments) if !parser.has_more_data() => {
                    security.push((row, index, arguments));
                }
                Ok(_) => trace!(row, index, "security attribute has trailing bytes"),
                Err(error) => trace!(row, index, %error, "security attribute still undecodable"),
            }
        }
    }

    let resolved = attributes.len() + security.len();
    for (row, value) in attributes {
        metadata.tables.custom_attribute[row].value = CustomAttributeValue::Resolved(value);
    }
    for (row, index, arguments) in security {
        if let PermissionSet::Attributes(set) = &mut metadata.tables.decl_security[row].permission_set
        {
            set[index].named_args = SecurityNamedArguments::Resolved(arguments);
        }
    }

    debug!(resolved, "custom attributes re-resolved");
    resolved
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names() {
        let name = AssemblyName::parse(
            "mscorlib, Version=4.0.0.0, Culture=neutral, PublicKeyToken=b77a5c561934e089",
        )
        .unwrap();
        assert_eq!(name.name, "mscorlib");
        assert_eq!(name.version, Some([4, 0, 0, 0]));
        assert_eq!(name.culture, None);
        assert_eq!(
            name.public_key_token,
            Some([0xB7, 0x7A, 0x5C, 0x56, 0x19, 0x34, 0xE0, 0x89])
        );

        let partial = AssemblyName::parse("Library, Version=1.2, Culture=de-DE").unwrap();
        assert_eq!(partial.version, Some([1, 2, 0, 0]));
        assert_eq!(partial.culture.as_deref(), Some("de-DE"));
        assert_eq!(partial.public_key_token, None);

        assert!(AssemblyName::parse("").is_err());
        assert!(AssemblyName::parse("A, Version=1.2.3.4.5").is_err());
        assert!(AssemblyName::parse("A, PublicKeyToken=b77a").is_err());
        assert!(AssemblyName::parse("A, PublicKeyToken=zz7a5c561934e089").is_err());
    }

    #[test]
    fn assembly_ref_identity() {
        let mut row = AssemblyRefRow {
            major_version: 1,
            minor_version: 0,
            build_number: 0,
            revision_number: 0,
            flags: AssemblyFlags::empty(),
            public_key_or_token: vec![1, 2, 3, 4, 5, 6, 7, 8],
            name: "Library".to_string(),
            culture: String::new(),
            hash_value: Vec::new(),
        };
        let name = AssemblyName::from_assembly_ref(&row);
        assert_eq!(name.public_key_token, Some([1, 2, 3, 4, 5, 6, 7, 8]));
        assert_eq!(name.culture, None);

        row.flags = AssemblyFlags::PUBLIC_KEY;
        row.public_key_or_token = crate::writer::strongname::ECMA_PUBLIC_KEY.to_vec();
        let name = AssemblyName::from_assembly_ref(&row);
        assert_eq!(
            name.public_key_token,
            Some([0xB7, 0x7A, 0x5C, 0x56, 0x19, 0x34, 0xE0, 0x89])
        );
    }
}
