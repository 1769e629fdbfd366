//! Native pieces of a managed image: the `mscoree.dll` import, the startup stub calling it,
//! the base relocation of that stub, and the image checksum.
//!
//! x86 images use a 6-byte `jmp dword ptr [IAT]` stub fixed up by a `HIGHLOW` relocation,
//! x64 images a `mov rax, [IAT]; jmp rax` stub fixed up by a `DIR64` relocation. The
//! absolute IAT address inside the stub is kept naturally aligned.

use crate::{
    file::io::{write_le_at, CilWrite},
    Result,
};

/// `IMAGE_REL_BASED_HIGHLOW`
pub const REL_BASED_HIGHLOW: u16 = 3;

/// `IMAGE_REL_BASED_DIR64`
pub const REL_BASED_DIR64: u16 = 10;

/// Size of one import descriptor.
const IMPORT_DESCRIPTOR_SIZE: u32 = 20;

/// Size of the relocation block covering the stub: page, block size and two entries.
pub const RELOCATIONS_SIZE: u32 = 12;

/// The import of the runtime entry point and the stub jumping through it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeStub<'a> {
    /// Whether the image is PE32+
    pub is_pe32_plus: bool,
    /// Imported DLL, `mscoree.dll`
    pub dll_name: &'a str,
    /// Imported function, `_CorDllMain` or `_CorExeMain`
    pub entry_name: &'a str,
}

impl NativeStub<'_> {
    fn pointer_size(&self) -> u32 {
        if self.is_pe32_plus {
            8
        } else {
            4
        }
    }

    fn write_pointer(&self, out: &mut Vec<u8>, value: u64) {
        if self.is_pe32_plus {
            out.write_le(value);
        } else {
            #[allow(clippy::cast_possible_truncation)]
            out.write_le(value as u32);
        }
    }

    /// Size of the import address table: one entry and the terminator.
    #[must_use]
    pub fn iat_size(&self) -> u32 {
        2 * self.pointer_size()
    }

    /// Offset of the hint/name entry inside the import directory.
    fn hint_name_offset(&self) -> u32 {
        2 * IMPORT_DESCRIPTOR_SIZE + 2 * self.pointer_size()
    }

    #[allow(clippy::cast_possible_truncation)]
    fn hint_name_size(&self) -> u32 {
        (2 + self.entry_name.len() as u32 + 1).next_multiple_of(2)
    }

    /// Size of the import directory: descriptor, null descriptor, lookup table, hint/name
    /// entry and DLL name.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn import_directory_size(&self) -> u32 {
        self.hint_name_offset() + self.hint_name_size() + self.dll_name.len() as u32 + 1
    }

    /// Append the import address table for an import directory placed at `directory_rva`.
    pub fn write_iat(&self, directory_rva: u32, out: &mut Vec<u8>) {
        self.write_pointer(out, u64::from(directory_rva + self.hint_name_offset()));
        self.write_pointer(out, 0);
    }

    /// Append the import directory placed at `directory_rva`, importing through the table
    /// at `iat_rva`.
    pub fn write_import_directory(&self, directory_rva: u32, iat_rva: u32, out: &mut Vec<u8>) {
        let lookup_rva = directory_rva + 2 * IMPORT_DESCRIPTOR_SIZE;
        let hint_name_rva = directory_rva + self.hint_name_offset();
        let dll_name_rva = hint_name_rva + self.hint_name_size();

        out.write_le(lookup_rva);
        out.write_le(0u32);
        out.write_le(0u32);
        out.write_le(dll_name_rva);
        out.write_le(iat_rva);
        out.write_zeros(IMPORT_DESCRIPTOR_SIZE as usize);

        self.write_pointer(out, u64::from(hint_name_rva));
        self.write_pointer(out, 0);

        let start = out.len();
        out.write_le(0u16);
        out.extend_from_slice(self.entry_name.as_bytes());
        out.push(0);
        if (out.len() - start) % 2 != 0 {
            out.push(0);
        }

        out.extend_from_slice(self.dll_name.as_bytes());
        out.push(0);
    }

    /// Alignment of the stub part.
    #[must_use]
    pub fn stub_alignment(&self) -> u32 {
        self.pointer_size()
    }

    /// Offset of the first instruction inside the stub part.
    #[must_use]
    pub fn stub_code_offset(&self) -> u32 {
        if self.is_pe32_plus {
            6
        } else {
            2
        }
    }

    /// Offset of the absolute IAT address inside the stub part.
    fn stub_address_offset(&self) -> u32 {
        self.stub_code_offset() + 2
    }

    /// Size of the stub part.
    #[must_use]
    pub fn stub_size(&self) -> u32 {
        if self.is_pe32_plus {
            self.stub_code_offset() + 12
        } else {
            self.stub_code_offset() + 6
        }
    }

    /// Append the stub jumping through the IAT entry at `iat_va`.
    pub fn write_stub(&self, iat_va: u64, out: &mut Vec<u8>) {
        out.write_zeros(self.stub_code_offset() as usize);
        if self.is_pe32_plus {
            out.extend_from_slice(&[0x48, 0xA1]);
            out.write_le(iat_va);
            out.extend_from_slice(&[0xFF, 0xE0]);
        } else {
            out.extend_from_slice(&[0xFF, 0x25]);
            #[allow(clippy::cast_possible_truncation)]
            out.write_le(iat_va as u32);
        }
    }

    /// Append the relocation block fixing up the stub placed at `stub_rva`.
    pub fn write_relocations(&self, stub_rva: u32, out: &mut Vec<u8>) {
        let target = stub_rva + self.stub_address_offset();
        let kind = if self.is_pe32_plus {
            REL_BASED_DIR64
        } else {
            REL_BASED_HIGHLOW
        };

        out.write_le(target & !0xFFF);
        out.write_le(RELOCATIONS_SIZE);
        #[allow(clippy::cast_possible_truncation)]
        out.write_le(kind << 12 | (target & 0xFFF) as u16);
        out.write_le(0u16);
    }
}

/// The PE image checksum: a folded 16-bit one's complement sum of the image, with the
/// checksum field itself skipped, plus the file length.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn pe_checksum(image: &[u8], checksum_offset: usize) -> u32 {
    let mut checksum: u64 = 0;
    let skipped = checksum_offset..checksum_offset + 4;

    for (index, chunk) in image.chunks(2).enumerate() {
        if skipped.contains(&(index * 2)) {
            continue;
        }
        let word = match chunk {
            [low, high] => u16::from_le_bytes([*low, *high]),
            [low] => u16::from(*low),
            _ => 0,
        };
        checksum += u64::from(word);
        checksum = (checksum & 0xFFFF) + (checksum >> 16);
    }

    checksum = (checksum & 0xFFFF) + (checksum >> 16);
    checksum as u32 + image.len() as u32
}

/// Compute and store the checksum of a complete image.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if the checksum field lies outside the image.
pub fn update_checksum(image: &mut [u8], checksum_offset: usize) -> Result<()> {
    let checksum = pe_checksum(image, checksum_offset);
    let mut offset = checksum_offset;
    write_le_at(image, &mut offset, checksum)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stub(is_pe32_plus: bool) -> NativeStub<'static> {
        NativeStub {
            is_pe32_plus,
            dll_name: "mscoree.dll",
            entry_name: "_CorDllMain",
        }
    }

    #[test]
    fn x86_import() {
        let stub = stub(false);
        let mut directory = Vec::new();
        stub.write_import_directory(0x2300, 0x2000, &mut directory);
        assert_eq!(directory.len() as u32, stub.import_directory_size());

        #[rustfmt::skip]
        let descriptor = [
            0x28, 0x23, 0x00, 0x00, // lookup table
            0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00,
            0x3E, 0x23, 0x00, 0x00, // dll name
            0x00, 0x20, 0x00, 0x00, // iat
        ];
        assert_eq!(&directory[..20], &descriptor);
        assert_eq!(&directory[40..44], &[0x30, 0x23, 0x00, 0x00]);
        assert_eq!(&directory[0x30..0x3E], b"\0\0_CorDllMain\0");
        assert_eq!(&directory[0x3E..], b"mscoree.dll\0");

        let mut iat = Vec::new();
        stub.write_iat(0x2300, &mut iat);
        assert_eq!(iat, [0x30, 0x23, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]);
        assert_eq!(iat.len() as u32, stub.iat_size());
    }

    #[test]
    fn stubs_and_relocations() {
        let x86 = stub(false);
        let mut code = Vec::new();
        x86.write_stub(0x40_2000, &mut code);
        assert_eq!(code, [0x00, 0x00, 0xFF, 0x25, 0x00, 0x20, 0x40, 0x00]);
        assert_eq!(code.len() as u32, x86.stub_size());

        let mut relocs = Vec::new();
        x86.write_relocations(0x2348, &mut relocs);
        #[rustfmt::skip]
        let expected = [
            0x00, 0x20, 0x00, 0x00,
            0x0C, 0x00, 0x00, 0x00,
            0x4C, 0x33,
            0x00, 0x00,
        ];
        assert_eq!(relocs, expected);

        let x64 = stub(true);
        let mut code = Vec::new();
        x64.write_stub(0x1_4000_2000, &mut code);
        assert_eq!(code.len() as u32, x64.stub_size());
        assert_eq!(&code[6..8], &[0x48, 0xA1]);
        assert_eq!(&code[8..16], &0x1_4000_2000u64.to_le_bytes());
        assert_eq!(&code[16..], &[0xFF, 0xE0]);

        let mut relocs = Vec::new();
        x64.write_relocations(0x2348, &mut relocs);
        assert_eq!(&relocs[8..10], &[0x50, 0xA3]);
    }

    #[test]
    fn checksum() {
        let mut image = vec![0u8; 0x100];
        image[0] = 0x4D;
        image[1] = 0x5A;
        image[0x40..0x44].copy_from_slice(&[0xFF, 0xFF, 0xFF, 0xFF]);

        // the checksum field does not contribute
        assert_eq!(pe_checksum(&image, 0x40), 0x5A4D + 0x100);

        update_checksum(&mut image, 0x40).unwrap();
        assert_eq!(&image[0x40..0x44], &(0x5A4Du32 + 0x100).to_le_bytes());

        image.push(0x01);
        assert_eq!(pe_checksum(&image, 0x40), 0x5A4D + 0x01 + 0x101);
    }

    #[test]
    fn checksum_folds_carries() {
        let image = [0xFF; 4];
        assert_eq!(pe_checksum(&image, 0x10), 0xFFFF + 4);
    }
}
