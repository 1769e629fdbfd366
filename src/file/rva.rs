//! Conversion between relative virtual addresses and file offsets.
//!
//! Data directories, the CLI header and method bodies are all addressed by RVA, while the
//! image bytes are addressed by file offset. [`RvaConverter`] maps between the two using the
//! section table.
//!
//! A lookup that does not hit any section returns `None`. Callers treat that as a fatal error
//! for required structures (the CLI header) and as "absent" for optional data (debug
//! directory, field data).

use crate::file::pe::SectionHeader;

/// Placement of one section in both address spaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionSpan {
    /// RVA of the first byte of the section
    pub virtual_address: u32,
    /// Size of the section once loaded
    pub virtual_size: u32,
    /// Size of the section data inside the file
    pub raw_size: u32,
    /// File offset of the section data
    pub raw_pointer: u32,
}

impl From<&SectionHeader> for SectionSpan {
    fn from(section: &SectionHeader) -> Self {
        SectionSpan {
            virtual_address: section.virtual_address,
            virtual_size: section.virtual_size,
            raw_size: section.size_of_raw_data,
            raw_pointer: section.pointer_to_raw_data,
        }
    }
}

/// Bidirectional RVA / file offset mapping over an ordered list of sections.
#[derive(Debug, Clone, Default)]
pub struct RvaConverter {
    sections: Vec<SectionSpan>,
}

impl RvaConverter {
    /// Build a converter from explicit section spans.
    #[must_use]
    pub fn new(sections: Vec<SectionSpan>) -> Self {
        RvaConverter { sections }
    }

    /// Build a converter from parsed section headers.
    #[must_use]
    pub fn from_headers(headers: &[SectionHeader]) -> Self {
        RvaConverter {
            sections: headers.iter().map(SectionSpan::from).collect(),
        }
    }

    /// Map an RVA to a file offset.
    ///
    /// The section is found through `va <= rva < va + max(virtual_size, raw_size)`.
    #[must_use]
    pub fn to_offset(&self, rva: u64) -> Option<u64> {
        self.sections
            .iter()
            .find(|section| {
                let start = u64::from(section.virtual_address);
                let extent = u64::from(section.virtual_size.max(section.raw_size));
                start <= rva && rva < start + extent
            })
            .map(|section| {
                u64::from(section.raw_pointer) + (rva - u64::from(section.virtual_address))
            })
    }

    /// Map a file offset to an RVA.
    #[must_use]
    pub fn to_rva(&self, offset: u64) -> Option<u64> {
        self.sections
            .iter()
            .find(|section| {
                let start = u64::from(section.raw_pointer);
                start <= offset && offset < start + u64::from(section.raw_size)
            })
            .map(|section| {
                u64::from(section.virtual_address) + (offset - u64::from(section.raw_pointer))
            })
    }

    /// The section spans in table order.
    #[must_use]
    pub fn sections(&self) -> &[SectionSpan] {
        &self.sections
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn converter() -> RvaConverter {
        RvaConverter::new(vec![
            SectionSpan {
                virtual_address: 0x2000,
                virtual_size: 0x1234,
                raw_size: 0x1400,
                raw_pointer: 0x200,
            },
            SectionSpan {
                virtual_address: 0x4000,
                virtual_size: 0x0C,
                raw_size: 0x200,
                raw_pointer: 0x1600,
            },
        ])
    }

    #[test]
    fn maps_into_sections() {
        let converter = converter();
        assert_eq!(converter.to_offset(0x2000), Some(0x200));
        assert_eq!(converter.to_offset(0x2010), Some(0x210));
        assert_eq!(converter.to_offset(0x4008), Some(0x1608));
        assert_eq!(converter.to_rva(0x1608), Some(0x4008));
    }

    #[test]
    fn extent_uses_larger_size() {
        let converter = converter();
        // raw data is larger than the virtual size in the first section
        assert_eq!(converter.to_offset(0x2000 + 0x13FF), Some(0x200 + 0x13FF));
        assert_eq!(converter.to_offset(0x2000 + 0x1400), None);
    }

    #[test]
    fn unresolvable() {
        let converter = converter();
        assert_eq!(converter.to_offset(0), None);
        assert_eq!(converter.to_offset(0x1FFF), None);
        assert_eq!(converter.to_offset(0x4200), None);
        assert_eq!(converter.to_rva(0x100), None);
        assert_eq!(converter.to_rva(0x1800), None);
    }

    #[test]
    fn inverse_inside_sections() {
        let converter = converter();
        for span in converter.sections().to_vec() {
            let size = span.virtual_size.min(span.raw_size);
            for delta in (0..size).step_by(7) {
                let rva = u64::from(span.virtual_address + delta);
                let offset = converter.to_offset(rva).unwrap();
                assert_eq!(converter.to_rva(offset), Some(rva));
            }
        }
    }
}
