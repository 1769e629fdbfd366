//! PE/COFF header codec.
//!
//! Models the headers in front of the section data of a .NET image, in the order they appear
//! on disk:
//!
//! 1. [`DosHeader`] - the `MZ` header with the fixed real-mode stub, pointing to the NT headers
//! 2. `PE\0\0` signature followed by the COFF [`FileHeader`]
//! 3. [`OptionalHeader`] - PE32 (`0x10B`) or PE32+ (`0x20B`), ending in the data directories
//! 4. One [`SectionHeader`] per section
//!
//! Reading goes through `goblin`, whose parsed headers are narrowed into these types by
//! [`PeHeaders::read`]. Writing is done here, byte for byte, by the `write` methods.
//!
//! The debug directory lives inside a section and is handled by [`debug`].
//!
//! # Examples
//!
//! ```rust,no_run
//! use dotmeta::file::pe::{DataDirectoryKind, PeHeaders};
//!
//! let data = std::fs::read("assembly.dll")?;
//! let headers = PeHeaders::read(&data)?;
//! let cli = headers.optional.data_directory(DataDirectoryKind::ClrRuntimeHeader);
//! println!("CLI header at RVA 0x{:x}", cli.rva);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod debug;

use bitflags::bitflags;
use goblin::pe::PE;

use crate::{
    file::{
        io::{read_le_at, CilWrite},
        parser::Parser,
    },
    Error, Result,
};

/// `MZ`
pub const DOS_SIGNATURE: u16 = 0x5A4D;
/// `PE\0\0`
pub const PE_SIGNATURE: u32 = 0x0000_4550;
/// Optional header magic of 32-bit images.
pub const PE32_MAGIC: u16 = 0x010B;
/// Optional header magic of 64-bit images.
pub const PE32_PLUS_MAGIC: u16 = 0x020B;
/// Number of data directories written by this crate.
pub const DATA_DIRECTORY_COUNT: usize = 16;
/// Size of a section header.
pub const SECTION_HEADER_SIZE: usize = 40;
/// Size of the COFF file header.
pub const FILE_HEADER_SIZE: usize = 20;

/// The DOS header and real-mode stub emitted in front of every written image.
///
/// `e_lfanew` at offset `0x3C` is `0x80`, so the NT headers follow the stub directly.
#[rustfmt::skip]
pub const DOS_HEADER_AND_STUB: [u8; 128] = [
    0x4D, 0x5A, 0x90, 0x00, 0x03, 0x00, 0x00, 0x00, 0x04, 0x00, 0x00, 0x00, 0xFF, 0xFF, 0x00, 0x00,
    0xB8, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x40, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x80, 0x00, 0x00, 0x00,
    // push cs; pop ds; mov dx, msg; mov ah, 9; int 21h; mov ax, 4C01h; int 21h
    0x0E, 0x1F, 0xBA, 0x0E, 0x00, 0xB4, 0x09, 0xCD, 0x21, 0xB8, 0x01, 0x4C, 0xCD, 0x21,
    // "This program cannot be run in DOS mode.\r\r\n$"
    0x54, 0x68, 0x69, 0x73, 0x20, 0x70, 0x72, 0x6F, 0x67, 0x72, 0x61, 0x6D, 0x20, 0x63, 0x61,
    0x6E, 0x6E, 0x6F, 0x74, 0x20, 0x62, 0x65, 0x20, 0x72, 0x75, 0x6E, 0x20, 0x69, 0x6E, 0x20,
    0x44, 0x4F, 0x53, 0x20, 0x6D, 0x6F, 0x64, 0x65, 0x2E, 0x0D, 0x0D, 0x0A, 0x24,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
];

bitflags! {
    /// COFF file header characteristics
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct FileCharacteristics: u16 {
        /// Relocation information was stripped
        const RELOCS_STRIPPED = 0x0001;
        /// The image is executable
        const EXECUTABLE_IMAGE = 0x0002;
        /// Line numbers were stripped
        const LINE_NUMS_STRIPPED = 0x0004;
        /// Local symbols were stripped
        const LOCAL_SYMS_STRIPPED = 0x0008;
        /// The application can handle addresses above 2 GB
        const LARGE_ADDRESS_AWARE = 0x0020;
        /// The machine is based on a 32-bit word architecture
        const MACHINE_32BIT = 0x0100;
        /// Debugging information was removed
        const DEBUG_STRIPPED = 0x0200;
        /// The image is a DLL
        const DLL = 0x2000;
    }
}

bitflags! {
    /// Optional header DLL characteristics
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct DllCharacteristics: u16 {
        /// The image can handle a high entropy 64-bit address space
        const HIGH_ENTROPY_VA = 0x0020;
        /// The DLL can be relocated at load time
        const DYNAMIC_BASE = 0x0040;
        /// Code integrity checks are enforced
        const FORCE_INTEGRITY = 0x0080;
        /// The image is compatible with data execution prevention
        const NX_COMPAT = 0x0100;
        /// The image is isolation aware
        const NO_ISOLATION = 0x0200;
        /// The image does not use structured exception handling
        const NO_SEH = 0x0400;
        /// Do not bind the image
        const NO_BIND = 0x0800;
        /// The image must execute in an AppContainer
        const APPCONTAINER = 0x1000;
        /// A WDM driver
        const WDM_DRIVER = 0x2000;
        /// The image supports Control Flow Guard
        const GUARD_CF = 0x4000;
        /// The image is terminal server aware
        const TERMINAL_SERVER_AWARE = 0x8000;
    }
}

bitflags! {
    /// Section header characteristics
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SectionCharacteristics: u32 {
        /// The section contains executable code
        const CNT_CODE = 0x0000_0020;
        /// The section contains initialized data
        const CNT_INITIALIZED_DATA = 0x0000_0040;
        /// The section contains uninitialized data
        const CNT_UNINITIALIZED_DATA = 0x0000_0080;
        /// The section can be discarded as needed
        const MEM_DISCARDABLE = 0x0200_0000;
        /// The section can be executed as code
        const MEM_EXECUTE = 0x2000_0000;
        /// The section can be read
        const MEM_READ = 0x4000_0000;
        /// The section can be written to
        const MEM_WRITE = 0x8000_0000;
    }
}

/// Index of a data directory inside the optional header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum DataDirectoryKind {
    /// Export table
    Export = 0,
    /// Import table
    Import = 1,
    /// Win32 resource table
    Resource = 2,
    /// Exception table
    Exception = 3,
    /// Attribute certificate table (file offset, not RVA)
    Security = 4,
    /// Base relocation table
    BaseRelocation = 5,
    /// Debug directory
    Debug = 6,
    /// Reserved
    Architecture = 7,
    /// Global pointer register value
    GlobalPtr = 8,
    /// Thread local storage table
    Tls = 9,
    /// Load configuration table
    LoadConfig = 10,
    /// Bound import table
    BoundImport = 11,
    /// Import address table
    Iat = 12,
    /// Delay import descriptor
    DelayImport = 13,
    /// CLI header
    ClrRuntimeHeader = 14,
    /// Reserved, must be zero
    Reserved = 15,
}

/// An `(rva, size)` pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DataDirectory {
    /// Address of the data, zero if absent
    pub rva: u32,
    /// Size of the data in bytes
    pub size: u32,
}

impl DataDirectory {
    /// Create a directory entry.
    #[must_use]
    pub fn new(rva: u32, size: u32) -> Self {
        DataDirectory { rva, size }
    }

    /// Whether the entry points at nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rva == 0 || self.size == 0
    }

    /// Read an entry through a parser.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] on truncated data.
    pub fn read(parser: &mut Parser) -> Result<Self> {
        Ok(DataDirectory {
            rva: parser.read_le::<u32>()?,
            size: parser.read_le::<u32>()?,
        })
    }

    /// Append the entry.
    pub fn write(&self, out: &mut Vec<u8>) {
        out.write_le(self.rva);
        out.write_le(self.size);
    }
}

/// The DOS header, reduced to what matters: the location of the NT headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DosHeader {
    /// File offset of the `PE\0\0` signature
    pub e_lfanew: u32,
}

/// COFF file header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHeader {
    /// Target machine (`0x14C` x86, `0x8664` x64, ...)
    pub machine: u16,
    /// Number of section headers following the optional header
    pub number_of_sections: u16,
    /// Link time
    pub time_date_stamp: u32,
    /// Unused for images
    pub pointer_to_symbol_table: u32,
    /// Unused for images
    pub number_of_symbols: u32,
    /// Size of the optional header including data directories
    pub size_of_optional_header: u16,
    /// Image characteristics
    pub characteristics: FileCharacteristics,
}

impl FileHeader {
    /// Append the file header.
    pub fn write(&self, out: &mut Vec<u8>) {
        out.write_le(self.machine);
        out.write_le(self.number_of_sections);
        out.write_le(self.time_date_stamp);
        out.write_le(self.pointer_to_symbol_table);
        out.write_le(self.number_of_symbols);
        out.write_le(self.size_of_optional_header);
        out.write_le(self.characteristics.bits());
    }
}

/// The optional header of either a PE32 or a PE32+ image.
///
/// Fields that are 32 bits wide in PE32 and 64 bits wide in PE32+ are stored as `u64`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionalHeader {
    /// Whether this is a PE32+ (64-bit) header
    pub is_pe32_plus: bool,
    /// Linker major version
    pub major_linker_version: u8,
    /// Linker minor version
    pub minor_linker_version: u8,
    /// Size of all code sections
    pub size_of_code: u32,
    /// Size of all initialized data sections
    pub size_of_initialized_data: u32,
    /// Size of all uninitialized data sections
    pub size_of_uninitialized_data: u32,
    /// RVA of the startup stub
    pub address_of_entry_point: u32,
    /// RVA of the first code section
    pub base_of_code: u32,
    /// RVA of the first data section, only present in PE32
    pub base_of_data: u32,
    /// Preferred load address
    pub image_base: u64,
    /// Section alignment in memory
    pub section_alignment: u32,
    /// Section alignment in the file
    pub file_alignment: u32,
    /// Required OS major version
    pub major_operating_system_version: u16,
    /// Required OS minor version
    pub minor_operating_system_version: u16,
    /// Image major version
    pub major_image_version: u16,
    /// Image minor version
    pub minor_image_version: u16,
    /// Subsystem major version
    pub major_subsystem_version: u16,
    /// Subsystem minor version
    pub minor_subsystem_version: u16,
    /// Reserved, zero
    pub win32_version_value: u32,
    /// Size of the loaded image, a multiple of the section alignment
    pub size_of_image: u32,
    /// Size of all headers rounded up to the file alignment
    pub size_of_headers: u32,
    /// Image checksum
    pub check_sum: u32,
    /// Subsystem (`2` GUI, `3` console)
    pub subsystem: u16,
    /// DLL characteristics
    pub dll_characteristics: DllCharacteristics,
    /// Reserved stack size
    pub size_of_stack_reserve: u64,
    /// Committed stack size
    pub size_of_stack_commit: u64,
    /// Reserved heap size
    pub size_of_heap_reserve: u64,
    /// Committed heap size
    pub size_of_heap_commit: u64,
    /// Reserved, zero
    pub loader_flags: u32,
    /// Data directories
    pub data_directories: Vec<DataDirectory>,
}

impl OptionalHeader {
    /// Size of the header when written, always with 16 data directories.
    #[must_use]
    pub fn written_size(is_pe32_plus: bool) -> usize {
        let fixed = if is_pe32_plus { 112 } else { 96 };
        fixed + DATA_DIRECTORY_COUNT * 8
    }

    /// Append the header. Missing directories are written as zero entries.
    #[allow(clippy::cast_possible_truncation)]
    pub fn write(&self, out: &mut Vec<u8>) {
        let write_wide = |out: &mut Vec<u8>, value: u64| {
            if self.is_pe32_plus {
                out.write_le(value);
            } else {
                out.write_le(value as u32);
            }
        };

        out.write_le(if self.is_pe32_plus {
            PE32_PLUS_MAGIC
        } else {
            PE32_MAGIC
        });
        out.write_le(self.major_linker_version);
        out.write_le(self.minor_linker_version);
        out.write_le(self.size_of_code);
        out.write_le(self.size_of_initialized_data);
        out.write_le(self.size_of_uninitialized_data);
        out.write_le(self.address_of_entry_point);
        out.write_le(self.base_of_code);
        if !self.is_pe32_plus {
            out.write_le(self.base_of_data);
        }
        write_wide(out, self.image_base);
        out.write_le(self.section_alignment);
        out.write_le(self.file_alignment);
        out.write_le(self.major_operating_system_version);
        out.write_le(self.minor_operating_system_version);
        out.write_le(self.major_image_version);
        out.write_le(self.minor_image_version);
        out.write_le(self.major_subsystem_version);
        out.write_le(self.minor_subsystem_version);
        out.write_le(self.win32_version_value);
        out.write_le(self.size_of_image);
        out.write_le(self.size_of_headers);
        out.write_le(self.check_sum);
        out.write_le(self.subsystem);
        out.write_le(self.dll_characteristics.bits());
        write_wide(out, self.size_of_stack_reserve);
        write_wide(out, self.size_of_stack_commit);
        write_wide(out, self.size_of_heap_reserve);
        write_wide(out, self.size_of_heap_commit);
        out.write_le(self.loader_flags);
        out.write_le(DATA_DIRECTORY_COUNT as u32);
        for index in 0..DATA_DIRECTORY_COUNT {
            self.data_directories
                .get(index)
                .copied()
                .unwrap_or_default()
                .write(out);
        }
    }

    /// Look up a data directory; absent entries read as empty.
    #[must_use]
    pub fn data_directory(&self, kind: DataDirectoryKind) -> DataDirectory {
        self.data_directories
            .get(kind as usize)
            .copied()
            .unwrap_or_default()
    }

    /// Offset of the checksum field relative to the start of the optional header.
    #[must_use]
    pub const fn check_sum_offset() -> usize {
        64
    }

    /// Offset of the data directory array relative to the start of the optional header.
    #[must_use]
    pub fn data_directories_offset(is_pe32_plus: bool) -> usize {
        if is_pe32_plus {
            112
        } else {
            96
        }
    }
}

/// A section header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionHeader {
    /// Section name, null padded to 8 bytes
    pub name: [u8; 8],
    /// Size of the section once loaded
    pub virtual_size: u32,
    /// RVA of the section
    pub virtual_address: u32,
    /// Size of the raw data, a multiple of the file alignment
    pub size_of_raw_data: u32,
    /// File offset of the raw data
    pub pointer_to_raw_data: u32,
    /// Zero for images
    pub pointer_to_relocations: u32,
    /// Zero for images
    pub pointer_to_linenumbers: u32,
    /// Zero for images
    pub number_of_relocations: u16,
    /// Zero for images
    pub number_of_linenumbers: u16,
    /// Section flags
    pub characteristics: SectionCharacteristics,
}

impl SectionHeader {
    /// Create a header with a name; longer names are truncated to 8 bytes.
    #[must_use]
    pub fn named(name: &str) -> Self {
        let mut raw_name = [0u8; 8];
        for (target, byte) in raw_name.iter_mut().zip(name.bytes()) {
            *target = byte;
        }

        SectionHeader {
            name: raw_name,
            virtual_size: 0,
            virtual_address: 0,
            size_of_raw_data: 0,
            pointer_to_raw_data: 0,
            pointer_to_relocations: 0,
            pointer_to_linenumbers: 0,
            number_of_relocations: 0,
            number_of_linenumbers: 0,
            characteristics: SectionCharacteristics::empty(),
        }
    }

    /// The section name without trailing nulls.
    #[must_use]
    pub fn name(&self) -> String {
        let end = self.name.iter().position(|b| *b == 0).unwrap_or(8);
        String::from_utf8_lossy(&self.name[..end]).into_owned()
    }

    /// Append the section header.
    pub fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.name);
        out.write_le(self.virtual_size);
        out.write_le(self.virtual_address);
        out.write_le(self.size_of_raw_data);
        out.write_le(self.pointer_to_raw_data);
        out.write_le(self.pointer_to_relocations);
        out.write_le(self.pointer_to_linenumbers);
        out.write_le(self.number_of_relocations);
        out.write_le(self.number_of_linenumbers);
        out.write_le(self.characteristics.bits());
    }
}

/// All headers of a PE image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeHeaders {
    /// DOS header
    pub dos: DosHeader,
    /// COFF file header
    pub file: FileHeader,
    /// Optional header
    pub optional: OptionalHeader,
    /// Section table
    pub sections: Vec<SectionHeader>,
}

impl PeHeaders {
    /// Parse the headers at the start of `data`.
    ///
    /// # Errors
    /// Returns [`crate::Error::BadImageFormat`] for a missing DOS or PE signature, an unknown
    /// optional header magic or a missing optional header, [`crate::Error::GoblinErr`] for
    /// any other parse failure.
    pub fn read(data: &[u8]) -> Result<Self> {
        let pe = PE::parse(data).map_err(|error| parse_failure(data, error))?;
        Self::from_goblin(&pe)
    }

    /// Narrow the headers `goblin` parsed into the writable representation.
    ///
    /// # Errors
    /// Returns [`crate::Error::BadImageFormat`] if the image has no optional header, and
    /// [`crate::Error::Malformed`] if a 32-bit field holds a wider value.
    pub fn from_goblin(pe: &PE) -> Result<Self> {
        let coff = &pe.header.coff_header;
        let Some(optional) = pe.header.optional_header.as_ref() else {
            return Err(Error::BadImageFormat("missing optional header".to_string()));
        };
        let standard = &optional.standard_fields;
        let windows = &optional.windows_fields;
        let is_pe32_plus = match standard.magic {
            PE32_MAGIC => false,
            PE32_PLUS_MAGIC => true,
            other => return Err(unknown_magic(other)),
        };

        let goblin_directories = &optional.data_directories;
        let entries = [
            goblin_directories.get_export_table(),
            goblin_directories.get_import_table(),
            goblin_directories.get_resource_table(),
            goblin_directories.get_exception_table(),
            goblin_directories.get_certificate_table(),
            goblin_directories.get_base_relocation_table(),
            goblin_directories.get_debug_table(),
            goblin_directories.get_architecture(),
            goblin_directories.get_global_ptr(),
            goblin_directories.get_tls_table(),
            goblin_directories.get_load_config_table(),
            goblin_directories.get_bound_import_table(),
            goblin_directories.get_import_address_table(),
            goblin_directories.get_delay_import_descriptor(),
            goblin_directories.get_clr_runtime_header(),
        ];
        let mut data_directories: Vec<DataDirectory> = entries
            .iter()
            .map(|entry| match entry {
                Some(directory) => DataDirectory::new(directory.virtual_address, directory.size),
                None => DataDirectory::default(),
            })
            .collect();
        // Reserved
        data_directories.push(DataDirectory::default());
        data_directories
            .truncate((windows.number_of_rva_and_sizes as usize).min(DATA_DIRECTORY_COUNT));

        let sections = pe
            .sections
            .iter()
            .map(|section| SectionHeader {
                name: section.name,
                virtual_size: section.virtual_size,
                virtual_address: section.virtual_address,
                size_of_raw_data: section.size_of_raw_data,
                pointer_to_raw_data: section.pointer_to_raw_data,
                pointer_to_relocations: section.pointer_to_relocations,
                pointer_to_linenumbers: section.pointer_to_linenumbers,
                number_of_relocations: section.number_of_relocations,
                number_of_linenumbers: section.number_of_linenumbers,
                characteristics: SectionCharacteristics::from_bits_retain(section.characteristics),
            })
            .collect();

        Ok(PeHeaders {
            dos: DosHeader {
                e_lfanew: pe.header.dos_header.pe_pointer,
            },
            file: FileHeader {
                machine: coff.machine,
                number_of_sections: coff.number_of_sections,
                time_date_stamp: coff.time_date_stamp,
                pointer_to_symbol_table: coff.pointer_to_symbol_table,
                number_of_symbols: coff.number_of_symbol_table,
                size_of_optional_header: coff.size_of_optional_header,
                characteristics: FileCharacteristics::from_bits_retain(coff.characteristics),
            },
            optional: OptionalHeader {
                is_pe32_plus,
                major_linker_version: standard.major_linker_version,
                minor_linker_version: standard.minor_linker_version,
                size_of_code: narrow(standard.size_of_code, "SizeOfCode")?,
                size_of_initialized_data: narrow(
                    standard.size_of_initialized_data,
                    "SizeOfInitializedData",
                )?,
                size_of_uninitialized_data: narrow(
                    standard.size_of_uninitialized_data,
                    "SizeOfUninitializedData",
                )?,
                address_of_entry_point: narrow(
                    standard.address_of_entry_point,
                    "AddressOfEntryPoint",
                )?,
                base_of_code: narrow(standard.base_of_code, "BaseOfCode")?,
                base_of_data: narrow(standard.base_of_data, "BaseOfData")?,
                image_base: windows.image_base,
                section_alignment: windows.section_alignment,
                file_alignment: windows.file_alignment,
                major_operating_system_version: windows.major_operating_system_version,
                minor_operating_system_version: windows.minor_operating_system_version,
                major_image_version: windows.major_image_version,
                minor_image_version: windows.minor_image_version,
                major_subsystem_version: windows.major_subsystem_version,
                minor_subsystem_version: windows.minor_subsystem_version,
                win32_version_value: windows.win32_version_value,
                size_of_image: windows.size_of_image,
                size_of_headers: windows.size_of_headers,
                check_sum: windows.check_sum,
                subsystem: windows.subsystem,
                dll_characteristics: DllCharacteristics::from_bits_retain(
                    windows.dll_characteristics,
                ),
                size_of_stack_reserve: windows.size_of_stack_reserve,
                size_of_stack_commit: windows.size_of_stack_commit,
                size_of_heap_reserve: windows.size_of_heap_reserve,
                size_of_heap_commit: windows.size_of_heap_commit,
                loader_flags: windows.loader_flags,
                data_directories,
            },
            sections,
        })
    }

    /// File offset of the optional header.
    #[must_use]
    pub fn optional_header_offset(&self) -> usize {
        self.dos.e_lfanew as usize + 4 + FILE_HEADER_SIZE
    }

    /// File offset of the checksum field.
    #[must_use]
    pub fn check_sum_offset(&self) -> usize {
        self.optional_header_offset() + OptionalHeader::check_sum_offset()
    }

    /// File offset of the data directory entry for `kind`.
    #[must_use]
    pub fn data_directory_offset(&self, kind: DataDirectoryKind) -> usize {
        self.optional_header_offset()
            + OptionalHeader::data_directories_offset(self.optional.is_pe32_plus)
            + kind as usize * 8
    }

    /// Append the DOS header, signature, file header, optional header and section table.
    ///
    /// The DOS part is always the fixed [`DOS_HEADER_AND_STUB`], so `self.dos.e_lfanew` must
    /// be `0x80`.
    ///
    /// # Errors
    /// Returns [`crate::Error::WriteConsistency`] if `e_lfanew` disagrees with the stub.
    pub fn write(&self, out: &mut Vec<u8>) -> Result<()> {
        if self.dos.e_lfanew as usize != DOS_HEADER_AND_STUB.len() {
            return Err(consistency_error!(
                "e_lfanew 0x{:x} does not follow the DOS stub",
                self.dos.e_lfanew
            ));
        }

        out.extend_from_slice(&DOS_HEADER_AND_STUB);
        out.write_le(PE_SIGNATURE);
        self.file.write(out);
        self.optional.write(out);
        for section in &self.sections {
            section.write(out);
        }
        Ok(())
    }
}

fn unknown_magic(magic: u16) -> Error {
    Error::BadImageFormat(format!("unknown optional header magic 0x{magic:04x}"))
}

fn narrow<T: TryInto<u32>>(value: T, field: &str) -> Result<u32> {
    value
        .try_into()
        .map_err(|_| malformed_error!("{} does not fit into 32 bits", field))
}

/// Turn a `goblin` failure into [`Error::BadImageFormat`] when the image lacks a signature or
/// carries an unknown optional header magic.
fn parse_failure(data: &[u8], error: goblin::error::Error) -> Error {
    let mut offset = 0;
    if read_le_at::<u16>(data, &mut offset).ok() != Some(DOS_SIGNATURE) {
        return Error::BadImageFormat("missing DOS signature".to_string());
    }

    let mut offset = 0x3C;
    let Ok(e_lfanew) = read_le_at::<u32>(data, &mut offset) else {
        return Error::GoblinErr(error);
    };
    let mut offset = e_lfanew as usize;
    if read_le_at::<u32>(data, &mut offset).ok() != Some(PE_SIGNATURE) {
        return Error::BadImageFormat("missing PE signature".to_string());
    }

    let mut offset = (e_lfanew as usize).saturating_add(4 + FILE_HEADER_SIZE);
    match read_le_at::<u16>(data, &mut offset) {
        Ok(PE32_MAGIC | PE32_PLUS_MAGIC) | Err(_) => Error::GoblinErr(error),
        Ok(other) => unknown_magic(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_headers(is_pe32_plus: bool) -> PeHeaders {
        let mut text = SectionHeader::named(".text");
        text.virtual_size = 0x230;
        text.virtual_address = 0x2000;
        text.size_of_raw_data = 0x400;
        text.pointer_to_raw_data = 0x200;
        text.characteristics = SectionCharacteristics::CNT_CODE
            | SectionCharacteristics::MEM_EXECUTE
            | SectionCharacteristics::MEM_READ;

        let mut directories = vec![DataDirectory::default(); DATA_DIRECTORY_COUNT];
        directories[DataDirectoryKind::ClrRuntimeHeader as usize] = DataDirectory::new(0x2008, 72);

        PeHeaders {
            dos: DosHeader { e_lfanew: 0x80 },
            file: FileHeader {
                machine: if is_pe32_plus { 0x8664 } else { 0x14C },
                number_of_sections: 1,
                time_date_stamp: 0x1234_5678,
                pointer_to_symbol_table: 0,
                number_of_symbols: 0,
                size_of_optional_header: OptionalHeader::written_size(is_pe32_plus) as u16,
                characteristics: FileCharacteristics::EXECUTABLE_IMAGE | FileCharacteristics::DLL,
            },
            optional: OptionalHeader {
                is_pe32_plus,
                major_linker_version: 8,
                minor_linker_version: 0,
                size_of_code: 0x400,
                size_of_initialized_data: 0,
                size_of_uninitialized_data: 0,
                address_of_entry_point: 0,
                base_of_code: 0x2000,
                base_of_data: if is_pe32_plus { 0 } else { 0x4000 },
                image_base: 0x40_0000,
                section_alignment: 0x2000,
                file_alignment: 0x200,
                major_operating_system_version: 4,
                minor_operating_system_version: 0,
                major_image_version: 0,
                minor_image_version: 0,
                major_subsystem_version: 4,
                minor_subsystem_version: 0,
                win32_version_value: 0,
                size_of_image: 0x4000,
                size_of_headers: 0x200,
                check_sum: 0,
                subsystem: 3,
                dll_characteristics: DllCharacteristics::from_bits_retain(0x8540),
                size_of_stack_reserve: 0x10_0000,
                size_of_stack_commit: 0x1000,
                size_of_heap_reserve: 0x10_0000,
                size_of_heap_commit: 0x1000,
                loader_flags: 0,
                data_directories: directories,
            },
            sections: vec![text],
        }
    }

    #[test]
    fn dos_stub_layout() {
        assert_eq!(&DOS_HEADER_AND_STUB[0..2], b"MZ");
        assert_eq!(&DOS_HEADER_AND_STUB[0x3C..0x40], &[0x80, 0, 0, 0]);
        assert_eq!(DOS_HEADER_AND_STUB[0x40 + 14], b'T');
    }

    #[test]
    fn headers_pe32() {
        let headers = sample_headers(false);
        let mut data = Vec::new();
        headers.write(&mut data).unwrap();
        assert_eq!(data.len(), 0x80 + 4 + 20 + 224 + 40);
        assert_eq!(&data[0x80..0x84], b"PE\0\0");

        let parsed = PeHeaders::read(&data).unwrap();
        assert_eq!(parsed, headers);
        assert_eq!(parsed.sections[0].name(), ".text");
        assert_eq!(
            parsed
                .optional
                .data_directory(DataDirectoryKind::ClrRuntimeHeader),
            DataDirectory::new(0x2008, 72)
        );
        assert_eq!(parsed.check_sum_offset(), 0x80 + 24 + 64);
        assert_eq!(
            parsed.data_directory_offset(DataDirectoryKind::Security),
            0x80 + 24 + 96 + 32
        );
    }

    #[test]
    fn headers_pe32_plus() {
        let headers = sample_headers(true);
        let mut data = Vec::new();
        headers.write(&mut data).unwrap();
        assert_eq!(data.len(), 0x80 + 4 + 20 + 240 + 40);

        let parsed = PeHeaders::read(&data).unwrap();
        assert!(parsed.optional.is_pe32_plus);
        assert_eq!(parsed, headers);
    }

    #[test]
    fn bad_magic() {
        let headers = sample_headers(false);
        let mut data = Vec::new();
        headers.write(&mut data).unwrap();
        data[0x80 + 24] = 0x07;
        data[0x80 + 25] = 0x01;

        match PeHeaders::read(&data) {
            Err(Error::BadImageFormat(message)) => assert!(message.contains("0x0107")),
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn bad_signatures() {
        assert!(matches!(
            PeHeaders::read(&[0x4E, 0x5A, 0, 0]),
            Err(Error::BadImageFormat(_))
        ));

        let mut data = DOS_HEADER_AND_STUB.to_vec();
        data.extend_from_slice(b"PX\0\0");
        assert!(matches!(
            PeHeaders::read(&data),
            Err(Error::BadImageFormat(_))
        ));
    }

    #[test]
    fn truncated_section_table() {
        let headers = sample_headers(false);
        let mut data = Vec::new();
        headers.write(&mut data).unwrap();
        data.truncate(data.len() - 12);

        assert!(matches!(PeHeaders::read(&data), Err(Error::GoblinErr(_))));
    }

    #[test]
    fn short_directory_array() {
        let headers = sample_headers(false);
        let mut data = Vec::new();
        headers.write(&mut data).unwrap();
        // NumberOfRvaAndSizes
        data[0x80 + 24 + 92] = 15;

        let parsed = PeHeaders::read(&data).unwrap();
        assert_eq!(parsed.optional.data_directories.len(), 15);
        assert_eq!(
            parsed
                .optional
                .data_directory(DataDirectoryKind::ClrRuntimeHeader),
            DataDirectory::new(0x2008, 72)
        );
        assert_eq!(
            parsed.optional.data_directory(DataDirectoryKind::Reserved),
            DataDirectory::default()
        );
    }
}
