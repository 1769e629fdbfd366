//! Placement of the written parts into PE sections.
//!
//! Every piece of a written image outside of the headers is a [`SectionPart`]: the CLI
//! header, the method bodies, the metadata, the import table, and so on. A layout strategy
//! groups the parts into sections ([`default_section_layout`] puts everything into `.text`
//! and the base relocations into `.reloc`), then [`lay_out_sections`] assigns addresses in
//! one forward sweep. Part sizes are final before the sweep, so no part depends on the
//! address of a later one.

use tracing::trace;

use crate::{
    file::{io::align_to, pe::SectionCharacteristics},
    Result,
};

/// Kind of a section part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SectionPartKind {
    /// Import address table of the runtime entry point
    ImportAddressTable,
    /// The 72-byte CLI header
    CliHeader,
    /// IL method bodies
    MethodBodies,
    /// Initial data of `FieldRVA` rows
    FieldData,
    /// Embedded manifest resources
    Resources,
    /// Reserved strong-name signature
    StrongNameSignature,
    /// Metadata root and streams
    Metadata,
    /// Debug directory entry and its data
    DebugDirectory,
    /// Import directory, lookup table and names
    ImportDirectory,
    /// Native startup stub jumping to the runtime
    StartupStub,
    /// Base relocations of the startup stub
    Relocations,
}

/// One contiguous piece of a section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionPart {
    /// What the part holds
    pub kind: SectionPartKind,
    /// Size in bytes
    pub size: u32,
    /// Required alignment of the start, relative to the section start
    pub alignment: u32,
    /// Assigned RVA
    pub rva: u32,
    /// Assigned file offset
    pub offset: u32,
}

impl SectionPart {
    /// An unplaced part.
    #[must_use]
    pub fn new(kind: SectionPartKind, size: u32, alignment: u32) -> Self {
        SectionPart {
            kind,
            size,
            alignment: alignment.max(1),
            rva: 0,
            offset: 0,
        }
    }

    /// RVA just past the end of the part.
    #[must_use]
    pub fn end_rva(&self) -> u32 {
        self.rva + self.size
    }
}

/// A section and its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionLayoutInfo {
    /// Section name, at most 8 bytes
    pub name: String,
    /// Section flags
    pub characteristics: SectionCharacteristics,
    /// Parts in address order
    pub parts: Vec<SectionPart>,
    /// Assigned RVA
    pub virtual_address: u32,
    /// Size of the parts including alignment gaps
    pub virtual_size: u32,
    /// Assigned file offset
    pub raw_pointer: u32,
    /// Virtual size rounded up to the file alignment
    pub raw_size: u32,
}

impl SectionLayoutInfo {
    /// An empty, unplaced section.
    #[must_use]
    pub fn new(name: &str, characteristics: SectionCharacteristics) -> Self {
        SectionLayoutInfo {
            name: name.to_string(),
            characteristics,
            parts: Vec::new(),
            virtual_address: 0,
            virtual_size: 0,
            raw_pointer: 0,
            raw_size: 0,
        }
    }

    /// Whether the section holds code.
    #[must_use]
    pub fn is_code(&self) -> bool {
        self.characteristics
            .contains(SectionCharacteristics::CNT_CODE)
    }
}

/// Section grouping used when no provider overrides it.
#[must_use]
pub fn default_section_layout(parts: Vec<SectionPart>) -> Vec<SectionLayoutInfo> {
    let mut text = SectionLayoutInfo::new(
        ".text",
        SectionCharacteristics::CNT_CODE
            | SectionCharacteristics::MEM_EXECUTE
            | SectionCharacteristics::MEM_READ,
    );
    let mut reloc = SectionLayoutInfo::new(
        ".reloc",
        SectionCharacteristics::CNT_INITIALIZED_DATA
            | SectionCharacteristics::MEM_DISCARDABLE
            | SectionCharacteristics::MEM_READ,
    );

    for part in parts {
        match part.kind {
            SectionPartKind::Relocations => reloc.parts.push(part),
            _ => text.parts.push(part),
        }
    }

    [text, reloc]
        .into_iter()
        .filter(|section| !section.parts.is_empty())
        .collect()
}

/// Final extent of a laid out image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageExtent {
    /// Size of the headers rounded up to the file alignment
    pub size_of_headers: u32,
    /// RVA past the last section, rounded up to the section alignment
    pub size_of_image: u32,
    /// Total file size
    pub file_size: u32,
}

/// Assign RVAs and file offsets to every section and part.
///
/// Sections follow the headers of `headers_size` bytes in order, each starting on the
/// section alignment in memory and the file alignment on disk.
///
/// # Errors
/// Returns [`crate::Error::InvalidArgument`] for an alignment that is not a power of two and
/// for an image exceeding 4 GiB.
#[allow(clippy::cast_possible_truncation)]
pub fn lay_out_sections(
    sections: &mut [SectionLayoutInfo],
    headers_size: u32,
    section_alignment: u32,
    file_alignment: u32,
) -> Result<ImageExtent> {
    for alignment in [section_alignment, file_alignment] {
        if !alignment.is_power_of_two() {
            return Err(crate::Error::InvalidArgument(format!(
                "alignment {} is not a power of two",
                alignment
            )));
        }
    }

    let section_alignment = u64::from(section_alignment);
    let file_alignment = u64::from(file_alignment);
    let size_of_headers = align_to(u64::from(headers_size), file_alignment);

    let mut rva = align_to(u64::from(headers_size), section_alignment);
    let mut raw = size_of_headers;
    for section in sections.iter_mut() {
        let mut cursor = 0u64;
        for part in &mut section.parts {
            cursor = align_to(cursor, u64::from(part.alignment));
            part.rva = checked_u32(rva + cursor)?;
            part.offset = checked_u32(raw + cursor)?;
            trace!(
                section = %section.name,
                kind = ?part.kind,
                rva = part.rva,
                size = part.size,
                "placed section part"
            );
            cursor += u64::from(part.size);
        }

        section.virtual_address = checked_u32(rva)?;
        section.raw_pointer = checked_u32(raw)?;
        section.virtual_size = checked_u32(cursor)?;
        section.raw_size = checked_u32(align_to(cursor, file_alignment))?;

        rva = align_to(rva + cursor.max(1), section_alignment);
        raw += u64::from(section.raw_size);
    }

    Ok(ImageExtent {
        size_of_headers: checked_u32(size_of_headers)?,
        size_of_image: checked_u32(rva)?,
        file_size: checked_u32(raw)?,
    })
}

fn checked_u32(value: u64) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| crate::Error::InvalidArgument("image exceeds 4 GiB".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parts() -> Vec<SectionPart> {
        vec![
            SectionPart::new(SectionPartKind::ImportAddressTable, 8, 4),
            SectionPart::new(SectionPartKind::CliHeader, 72, 4),
            SectionPart::new(SectionPartKind::MethodBodies, 13, 4),
            SectionPart::new(SectionPartKind::Metadata, 0x200, 4),
            SectionPart::new(SectionPartKind::StartupStub, 8, 4),
            SectionPart::new(SectionPartKind::Relocations, 12, 4),
        ]
    }

    #[test]
    fn default_grouping() {
        let sections = default_section_layout(parts());
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].name, ".text");
        assert_eq!(sections[0].parts.len(), 5);
        assert!(sections[0].is_code());
        assert_eq!(sections[1].name, ".reloc");
        assert_eq!(sections[1].parts[0].kind, SectionPartKind::Relocations);

        let no_relocs = default_section_layout(parts()[..2].to_vec());
        assert_eq!(no_relocs.len(), 1);
    }

    #[test]
    fn forward_sweep() {
        let mut sections = default_section_layout(parts());
        let extent = lay_out_sections(&mut sections, 0x178, 0x2000, 0x200).unwrap();

        let text = &sections[0];
        assert_eq!(text.virtual_address, 0x2000);
        assert_eq!(text.raw_pointer, 0x200);
        assert_eq!(text.parts[0].rva, 0x2000);
        assert_eq!(text.parts[1].rva, 0x2008);
        assert_eq!(text.parts[1].offset, 0x208);
        assert_eq!(text.parts[2].rva, 0x2050);
        // method bodies end at 0x205D, the metadata is realigned to 4
        assert_eq!(text.parts[3].rva, 0x2060);
        assert_eq!(text.parts[4].rva, 0x2260);
        assert_eq!(text.virtual_size, 0x268);
        assert_eq!(text.raw_size, 0x400);

        let reloc = &sections[1];
        assert_eq!(reloc.virtual_address, 0x4000);
        assert_eq!(reloc.raw_pointer, 0x600);
        assert_eq!(reloc.raw_size, 0x200);

        assert_eq!(
            extent,
            ImageExtent {
                size_of_headers: 0x200,
                size_of_image: 0x6000,
                file_size: 0x800,
            }
        );
    }

    #[test]
    fn rejects_bad_alignment() {
        let mut sections = default_section_layout(parts());
        assert!(lay_out_sections(&mut sections, 0x178, 0x2000, 0x300).is_err());
    }
}
