//! Writing [`CilMetadata`] into PE images.
//!
//! Nothing of a read image is copied verbatim: heaps, table widths, method body placement,
//! section layout and all header values are recomputed on every write. The writer runs in
//! strict stages, each one a [`WriterState`] transition logged at `debug`:
//!
//! 1. every row is flattened into raw values while strings, blobs, GUIDs and user strings are
//!    collected into the heaps, method bodies and field data into their own buffers
//! 2. heap sizes decide the index widths, which fix the size of the table stream
//! 3. the section parts (CLI header, bodies, metadata, import table, ...) are grouped into
//!    sections and placed in one forward sweep
//! 4. the RVAs of method bodies and field data are patched into the raw values
//! 5. headers and parts are emitted, the image is signed if requested and checksummed
//!
//! # Examples
//!
//! ```rust
//! use dotmeta::{
//!     metadata::tables::{AssemblyFlags, AssemblyRow, ModuleRow},
//!     writer::{PeOptions, WritingOptions, MACHINE_AMD64},
//!     CilMetadata,
//! };
//!
//! let mut metadata = CilMetadata::default();
//! metadata.tables.module.push(ModuleRow {
//!     generation: 0,
//!     name: "Library.dll".to_string(),
//!     mvid: None,
//!     enc_id: None,
//!     enc_base_id: None,
//! });
//!
//! let options = WritingOptions {
//!     pe: PeOptions {
//!         machine: MACHINE_AMD64,
//!         ..PeOptions::default()
//!     },
//!     ..WritingOptions::default()
//! };
//! let image = metadata.write(&options)?;
//! assert_eq!(&image[..2], b"MZ");
//! # Ok::<(), dotmeta::Error>(())
//! ```

pub mod layout;
pub mod pe;
pub mod strongname;

use std::{borrow::Cow, collections::HashMap, fmt};

use tracing::debug;

pub use layout::{
    default_section_layout, lay_out_sections, ImageExtent, SectionLayoutInfo, SectionPart,
    SectionPartKind,
};
pub use pe::{pe_checksum, NativeStub};
pub use strongname::{
    CryptoCallbacks, RsaKey, RsaParameters, StrongNameKey, StrongNameKeySource,
    StrongNameOptions,
};

use crate::{
    file::{
        io::CilWrite,
        pe::{
            debug::{DebugDirectory, DebugInformation, DEBUG_DIRECTORY_SIZE},
            DataDirectory, DataDirectoryKind, DllCharacteristics, DosHeader, FileCharacteristics,
            FileHeader, OptionalHeader, PeHeaders, SectionHeader, DATA_DIRECTORY_COUNT,
            DOS_HEADER_AND_STUB, FILE_HEADER_SIZE, SECTION_HEADER_SIZE, SectionCharacteristics,
        },
    },
    metadata::{
        cilmetadata::CilMetadata,
        cor20header::{ComImageFlags, Cor20Header, COR20_HEADER_SIZE},
        method::MethodHeaderFlags,
        root::{Root, DEFAULT_METADATA_VERSION},
        streams::{HeapSizes, StreamHeader, StreamKind, TablesHeader},
        tables::{
            tables_stream_size, write_tables, AssemblyFlags, MetadataTables, RawValueStorage,
            TableId, TableIndex, TableInfo, WriteContext,
        },
        token::Token,
    },
    Error, Result,
};

/// `IMAGE_FILE_MACHINE_I386`
pub const MACHINE_I386: u16 = 0x014C;
/// `IMAGE_FILE_MACHINE_AMD64`
pub const MACHINE_AMD64: u16 = 0x8664;
/// `IMAGE_FILE_MACHINE_ARM64`
pub const MACHINE_ARM64: u16 = 0xAA64;
/// `IMAGE_FILE_MACHINE_IA64`
pub const MACHINE_IA64: u16 = 0x0200;

/// Stream order of the metadata root when no provider overrides it.
pub const DEFAULT_STREAM_ORDER: [StreamKind; 5] = [
    StreamKind::Tables,
    StreamKind::Strings,
    StreamKind::UserStrings,
    StreamKind::Guid,
    StreamKind::Blob,
];

/// PE level settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeOptions {
    /// Target machine, [`MACHINE_I386`] for platform neutral images
    pub machine: u16,
    /// Link time stamp
    pub time_date_stamp: u32,
    /// File characteristics, derived from the machine and the entry point when `None`
    pub characteristics: Option<FileCharacteristics>,
    /// Preferred load address
    pub image_base: u64,
    /// Section alignment in memory
    pub section_alignment: u32,
    /// Section alignment in the file
    pub file_alignment: u32,
    /// Subsystem, `3` (console) by default
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
    /// Linker major version
    pub major_linker_version: u8,
    /// Linker minor version
    pub minor_linker_version: u8,
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
    /// DLL imported by the startup stub
    pub import_dll_name: String,
    /// Function imported by the startup stub, `_CorDllMain` or `_CorExeMain` when `None`
    pub import_entry_name: Option<String>,
}

impl Default for PeOptions {
    fn default() -> Self {
        PeOptions {
            machine: MACHINE_I386,
            time_date_stamp: 0,
            characteristics: None,
            image_base: 0x40_0000,
            section_alignment: 0x2000,
            file_alignment: 0x200,
            subsystem: 3,
            dll_characteristics: DllCharacteristics::DYNAMIC_BASE
                | DllCharacteristics::NX_COMPAT
                | DllCharacteristics::NO_SEH
                | DllCharacteristics::TERMINAL_SERVER_AWARE,
            size_of_stack_reserve: 0x10_0000,
            size_of_stack_commit: 0x1000,
            size_of_heap_reserve: 0x10_0000,
            size_of_heap_commit: 0x1000,
            major_linker_version: 8,
            minor_linker_version: 0,
            major_operating_system_version: 4,
            minor_operating_system_version: 0,
            major_image_version: 0,
            minor_image_version: 0,
            major_subsystem_version: 4,
            minor_subsystem_version: 0,
            import_dll_name: "mscoree.dll".to_string(),
            import_entry_name: None,
        }
    }
}

impl PeOptions {
    /// Settings reproducing existing headers.
    #[must_use]
    pub fn from_headers(headers: &PeHeaders) -> Self {
        let optional = &headers.optional;
        PeOptions {
            machine: headers.file.machine,
            time_date_stamp: headers.file.time_date_stamp,
            characteristics: Some(headers.file.characteristics),
            image_base: optional.image_base,
            section_alignment: optional.section_alignment,
            file_alignment: optional.file_alignment,
            subsystem: optional.subsystem,
            dll_characteristics: optional.dll_characteristics,
            size_of_stack_reserve: optional.size_of_stack_reserve,
            size_of_stack_commit: optional.size_of_stack_commit,
            size_of_heap_reserve: optional.size_of_heap_reserve,
            size_of_heap_commit: optional.size_of_heap_commit,
            major_linker_version: optional.major_linker_version,
            minor_linker_version: optional.minor_linker_version,
            major_operating_system_version: optional.major_operating_system_version,
            minor_operating_system_version: optional.minor_operating_system_version,
            major_image_version: optional.major_image_version,
            minor_image_version: optional.minor_image_version,
            major_subsystem_version: optional.major_subsystem_version,
            minor_subsystem_version: optional.minor_subsystem_version,
            ..PeOptions::default()
        }
    }

    /// Whether the machine requires a PE32+ image.
    #[must_use]
    pub fn is_pe32_plus(&self) -> bool {
        matches!(self.machine, MACHINE_AMD64 | MACHINE_ARM64 | MACHINE_IA64)
    }

    /// Whether an import table and startup stub are emitted. Only x86 and x64 images get one.
    #[must_use]
    pub fn has_native_stub(&self) -> bool {
        matches!(self.machine, MACHINE_I386 | MACHINE_AMD64)
    }

    /// File characteristics in effect for an image with or without a method entry point.
    #[must_use]
    pub fn file_characteristics(&self, has_entry_point: bool) -> FileCharacteristics {
        if let Some(characteristics) = self.characteristics {
            return characteristics;
        }

        let mut characteristics = FileCharacteristics::EXECUTABLE_IMAGE;
        if self.is_pe32_plus() {
            characteristics |= FileCharacteristics::LARGE_ADDRESS_AWARE;
        } else {
            characteristics |= FileCharacteristics::MACHINE_32BIT;
        }
        if !has_entry_point {
            characteristics |= FileCharacteristics::DLL;
        }
        characteristics
    }
}

/// CLI header and metadata root settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliOptions {
    /// Runtime major version
    pub major_runtime_version: u16,
    /// Runtime minor version
    pub minor_runtime_version: u16,
    /// CLI header flags; `STRONG_NAME_SIGNED` is managed by the writer
    pub flags: ComImageFlags,
    /// `MethodDef` or `File` row of the entry point
    pub entry_point: Option<TableIndex>,
    /// Version string of the metadata root
    pub metadata_version: String,
    /// Major version of the table stream
    pub tables_major_version: u8,
    /// Minor version of the table stream
    pub tables_minor_version: u8,
}

impl Default for CliOptions {
    fn default() -> Self {
        CliOptions {
            major_runtime_version: 2,
            minor_runtime_version: 5,
            flags: ComImageFlags::IL_ONLY,
            entry_point: None,
            metadata_version: DEFAULT_METADATA_VERSION.to_string(),
            tables_major_version: 2,
            tables_minor_version: 0,
        }
    }
}

/// A debug directory entry to emit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DebugOptions {
    /// Creation time of the debug data
    pub time_date_stamp: u32,
    /// Format major version
    pub major_version: u16,
    /// Format minor version
    pub minor_version: u16,
    /// Format of the data, `2` for CodeView
    pub debug_type: u32,
    /// The payload
    pub data: Vec<u8>,
}

impl From<&DebugInformation> for DebugOptions {
    fn from(information: &DebugInformation) -> Self {
        DebugOptions {
            time_date_stamp: information.directory.time_date_stamp,
            major_version: information.directory.major_version,
            minor_version: information.directory.minor_version,
            debug_type: information.directory.debug_type,
            data: information.data.clone(),
        }
    }
}

/// Hooks to customize how an image is written.
pub trait WriterFunctionalityProvider {
    /// Group the parts into sections. Every part must end up in exactly one section.
    fn section_layout(&self, parts: Vec<SectionPart>) -> Vec<SectionLayoutInfo> {
        default_section_layout(parts)
    }

    /// Order of the metadata streams. Missing streams are appended in the default order.
    fn stream_order(&self) -> Vec<StreamKind> {
        DEFAULT_STREAM_ORDER.to_vec()
    }
}

/// The writer behavior without customization.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultWriterProvider;

impl WriterFunctionalityProvider for DefaultWriterProvider {}

/// Options of a write.
#[derive(Clone, Default)]
pub struct WritingOptions<'a> {
    /// PE settings
    pub pe: PeOptions,
    /// CLI header and metadata root settings
    pub cli: CliOptions,
    /// Debug directory entry to emit
    pub debug: Option<DebugOptions>,
    /// Strong-name signing
    pub strong_name: Option<StrongNameOptions>,
    /// Custom writer hooks, [`DefaultWriterProvider`] when `None`
    pub provider: Option<&'a dyn WriterFunctionalityProvider>,
    /// Cryptography for strong naming
    pub crypto: Option<&'a dyn CryptoCallbacks>,
}

impl fmt::Debug for WritingOptions<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WritingOptions")
            .field("pe", &self.pe)
            .field("cli", &self.cli)
            .field("debug", &self.debug)
            .field("strong_name", &self.strong_name)
            .field("provider", &self.provider.map(|_| "custom"))
            .field("crypto", &self.crypto.map(|_| "custom"))
            .finish()
    }
}

/// Progress of a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterState {
    /// Nothing written yet
    Start,
    /// Rows flattened into raw values
    RawValuesExtracted,
    /// Heap content final
    HeapsFilled,
    /// Index widths and the table stream size final
    TableSizesFinal,
    /// Sections and parts placed
    SectionsLaidOut,
    /// Method body and field data RVAs patched into the rows
    RvasAssigned,
    /// Image bytes complete
    BytesEmitted,
    /// Strong-name signature written
    StrongNameSigned,
    /// Write complete
    Done,
}

struct StateTracker(WriterState);

impl StateTracker {
    fn advance(&mut self, next: WriterState) {
        debug!(from = ?self.0, to = ?next, "writer state");
        self.0 = next;
    }
}

fn size_u32(size: usize) -> Result<u32> {
    u32::try_from(size).map_err(|_| Error::InvalidArgument("image exceeds 4 GiB".to_string()))
}

/// Encoded heaps and the sizes of all metadata streams.
struct MetadataStreams {
    root: Root,
    kinds: Vec<StreamKind>,
    strings: Vec<u8>,
    user_strings: Vec<u8>,
    guids: Vec<u8>,
    blobs: Vec<u8>,
    header: TablesHeader,
    info: TableInfo,
    size: u32,
}

impl MetadataStreams {
    fn new(
        ctx: &WriteContext,
        tables: &MetadataTables,
        cli: &CliOptions,
        provider: &dyn WriterFunctionalityProvider,
    ) -> Result<Self> {
        let mut heap_sizes = HeapSizes::empty();
        heap_sizes.set(HeapSizes::WIDE_STRINGS, ctx.strings.is_wide());
        heap_sizes.set(HeapSizes::WIDE_GUID, ctx.guids.is_wide());
        heap_sizes.set(HeapSizes::WIDE_BLOB, ctx.blobs.is_wide());

        let mut header = TablesHeader {
            major_version: cli.tables_major_version,
            minor_version: cli.tables_minor_version,
            heap_sizes,
            ..TablesHeader::default()
        };
        header.set_row_counts(tables.row_counts());
        let info = TableInfo::new(header.row_counts, heap_sizes);

        let mut streams = MetadataStreams {
            root: Root::new(&cli.metadata_version, Vec::new()),
            kinds: Vec::new(),
            strings: ctx.strings.finish(),
            user_strings: ctx.user_strings.finish(),
            guids: ctx.guids.finish(),
            blobs: ctx.blobs.finish(),
            header,
            info,
            size: 0,
        };

        let mut order = provider.stream_order();
        order.extend(DEFAULT_STREAM_ORDER);
        for kind in order {
            let present = match kind {
                StreamKind::UserStrings => !ctx.user_strings.is_empty(),
                StreamKind::Guid => !ctx.guids.is_empty(),
                StreamKind::UncompressedTables => false,
                _ => true,
            };
            if present && !streams.kinds.contains(&kind) {
                streams.kinds.push(kind);
            }
        }

        let sizes = streams
            .kinds
            .iter()
            .map(|kind| streams.stream_size(*kind))
            .collect::<Vec<_>>();
        streams.root.stream_headers = streams
            .kinds
            .iter()
            .map(|kind| StreamHeader {
                offset: 0,
                size: 0,
                name: kind.name().to_string(),
            })
            .collect();

        let mut offset = streams.root.size();
        for (header, size) in streams.root.stream_headers.iter_mut().zip(sizes) {
            header.offset = size_u32(offset)?;
            header.size = size_u32(size)?;
            offset += size;
        }
        streams.size = size_u32(offset)?;

        debug!(
            strings = streams.strings.len(),
            user_strings = streams.user_strings.len(),
            guids = streams.guids.len(),
            blobs = streams.blobs.len(),
            tables = streams.stream_size(StreamKind::Tables),
            "metadata streams"
        );
        Ok(streams)
    }

    fn stream_size(&self, kind: StreamKind) -> usize {
        match kind {
            StreamKind::Tables | StreamKind::UncompressedTables => {
                tables_stream_size(&self.header, &self.info)
            }
            StreamKind::Strings => self.strings.len(),
            StreamKind::UserStrings => self.user_strings.len(),
            StreamKind::Guid => self.guids.len(),
            StreamKind::Blob => self.blobs.len(),
        }
    }

    /// Encode the root and all streams with the final raw values.
    fn emit(&self, storage: &RawValueStorage<u32>) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(self.size as usize);
        self.root.write(&mut out)?;

        for (kind, header) in self.kinds.iter().zip(&self.root.stream_headers) {
            match kind {
                StreamKind::Tables | StreamKind::UncompressedTables => {
                    write_tables(&self.header, &self.info, storage, &mut out)?;
                }
                StreamKind::Strings => out.extend_from_slice(&self.strings),
                StreamKind::UserStrings => out.extend_from_slice(&self.user_strings),
                StreamKind::Guid => out.extend_from_slice(&self.guids),
                StreamKind::Blob => out.extend_from_slice(&self.blobs),
            }

            let expected = header.offset as usize + header.size as usize;
            if out.len() != expected {
                return Err(consistency_error!(
                    "stream {} ends at {}, expected {}",
                    header.name,
                    out.len(),
                    expected
                ));
            }
        }
        Ok(out)
    }
}

/// Method bodies and field data concatenated with their alignment, and the offset of every
/// row's data inside its buffer.
struct Payloads {
    bodies: Vec<u8>,
    body_offsets: Vec<(u32, u32)>,
    field_data: Vec<u8>,
    field_offsets: Vec<(u32, u32)>,
}

impl Payloads {
    fn new(ctx: &WriteContext) -> Result<Self> {
        let mut bodies = Vec::new();
        let mut body_offsets = Vec::with_capacity(ctx.method_bodies.len());
        for (row, body) in &ctx.method_bodies {
            let fat = body.first().is_some_and(|first| {
                u16::from(first & 0x3) == MethodHeaderFlags::FAT_FORMAT.bits()
            });
            if fat {
                bodies.pad_to(4);
            }
            body_offsets.push((*row, size_u32(bodies.len())?));
            bodies.extend_from_slice(body);
        }

        let mut field_data = Vec::new();
        let mut field_offsets = Vec::with_capacity(ctx.field_data.len());
        for (row, data) in &ctx.field_data {
            field_data.pad_to(8);
            field_offsets.push((*row, size_u32(field_data.len())?));
            field_data.extend_from_slice(data);
        }

        Ok(Payloads {
            bodies,
            body_offsets,
            field_data,
            field_offsets,
        })
    }
}

fn placed_part(
    placed: &HashMap<SectionPartKind, SectionPart>,
    kind: SectionPartKind,
) -> Result<&SectionPart> {
    placed
        .get(&kind)
        .ok_or_else(|| consistency_error!("section layout lost the {:?} part", kind))
}

fn directory_of(
    placed: &HashMap<SectionPartKind, SectionPart>,
    kind: SectionPartKind,
) -> DataDirectory {
    placed
        .get(&kind)
        .map(|part| DataDirectory::new(part.rva, part.size))
        .unwrap_or_default()
}

fn validate_entry_point(entry_point: Option<TableIndex>, tables: &MetadataTables) -> Result<()> {
    let Some(entry_point) = entry_point else {
        return Ok(());
    };
    match entry_point.table {
        TableId::MethodDef | TableId::File
            if entry_point.index < tables.row_count(entry_point.table) =>
        {
            Ok(())
        }
        _ => Err(Error::InvalidArgument(format!(
            "entry point {:?} is not an existing method or file",
            entry_point
        ))),
    }
}

/// Everything needed to produce the bytes of the section parts.
struct PartWriter<'a> {
    cor20: Cor20Header,
    payloads: &'a Payloads,
    resources: &'a [u8],
    metadata: &'a [u8],
    debug: Option<&'a DebugOptions>,
    stub: Option<&'a NativeStub<'a>>,
    placed: &'a HashMap<SectionPartKind, SectionPart>,
    image_base: u64,
}

impl PartWriter<'_> {
    fn write(&self, part: &SectionPart, out: &mut Vec<u8>) -> Result<()> {
        match part.kind {
            SectionPartKind::CliHeader => self.cor20.write(out),
            SectionPartKind::MethodBodies => out.extend_from_slice(&self.payloads.bodies),
            SectionPartKind::FieldData => out.extend_from_slice(&self.payloads.field_data),
            SectionPartKind::Resources => out.extend_from_slice(self.resources),
            SectionPartKind::StrongNameSignature => out.write_zeros(part.size as usize),
            SectionPartKind::Metadata => out.extend_from_slice(self.metadata),
            SectionPartKind::DebugDirectory => {
                let debug = self
                    .debug
                    .ok_or_else(|| consistency_error!("debug directory without debug options"))?;
                let data_offset = DEBUG_DIRECTORY_SIZE as u32;
                DebugDirectory {
                    characteristics: 0,
                    time_date_stamp: debug.time_date_stamp,
                    major_version: debug.major_version,
                    minor_version: debug.minor_version,
                    debug_type: debug.debug_type,
                    size_of_data: size_u32(debug.data.len())?,
                    address_of_raw_data: part.rva + data_offset,
                    pointer_to_raw_data: part.offset + data_offset,
                }
                .write(out);
                out.extend_from_slice(&debug.data);
            }
            SectionPartKind::ImportAddressTable => {
                let directory = placed_part(self.placed, SectionPartKind::ImportDirectory)?;
                self.native_stub()?.write_iat(directory.rva, out);
            }
            SectionPartKind::ImportDirectory => {
                let iat = placed_part(self.placed, SectionPartKind::ImportAddressTable)?;
                self.native_stub()?
                    .write_import_directory(part.rva, iat.rva, out);
            }
            SectionPartKind::StartupStub => {
                let iat = placed_part(self.placed, SectionPartKind::ImportAddressTable)?;
                self.native_stub()?
                    .write_stub(self.image_base + u64::from(iat.rva), out);
            }
            SectionPartKind::Relocations => {
                let stub = placed_part(self.placed, SectionPartKind::StartupStub)?;
                self.native_stub()?.write_relocations(stub.rva, out);
            }
        }
        Ok(())
    }

    fn native_stub(&self) -> Result<&NativeStub<'_>> {
        self.stub
            .ok_or_else(|| consistency_error!("native part without a startup stub"))
    }
}

/// Zero-fill `image` up to `offset`.
fn pad_until(image: &mut Vec<u8>, offset: u32) -> Result<()> {
    let offset = offset as usize;
    if image.len() > offset {
        return Err(consistency_error!(
            "content at {} overlaps the previous part ending at {}",
            offset,
            image.len()
        ));
    }
    image.resize(offset, 0);
    Ok(())
}

/// Write `metadata` as a complete PE image.
///
/// # Errors
/// Returns [`crate::Error::InvalidArgument`] for data the formats cannot express (an entry
/// point outside `MethodDef`/`File`, mismatched instruction operands, oversized heaps),
/// [`crate::Error::SigningFailed`] for any strong-naming problem, and
/// [`crate::Error::WriteConsistency`] if emitted sizes disagree with the computed layout.
#[allow(clippy::too_many_lines)]
pub fn write_metadata(metadata: &CilMetadata, options: &WritingOptions) -> Result<Vec<u8>> {
    let provider = options.provider.unwrap_or(&DefaultWriterProvider);
    let mut state = StateTracker(WriterState::Start);

    let strong_name = options
        .strong_name
        .as_ref()
        .map(|sn| StrongNameKey::load(sn, options.crypto).map(|key| (sn, key)))
        .transpose()?;

    let tables = match &strong_name {
        Some((_, key)) => {
            let mut tables = metadata.tables.clone();
            let assembly = tables.assembly.first_mut().ok_or_else(|| {
                Error::SigningFailed("strong naming requires an Assembly row".to_string())
            })?;
            assembly.public_key.clone_from(&key.public_key);
            assembly.flags |= AssemblyFlags::PUBLIC_KEY;
            Cow::Owned(tables)
        }
        None => Cow::Borrowed(&metadata.tables),
    };
    validate_entry_point(options.cli.entry_point, &tables)?;

    let mut ctx = WriteContext::new(&tables);
    let mut storage = RawValueStorage::new(tables.row_counts());
    tables.extract_rows(&mut ctx, &mut storage)?;
    state.advance(WriterState::RawValuesExtracted);

    let streams = MetadataStreams::new(&ctx, &tables, &options.cli, provider)?;
    let payloads = Payloads::new(&ctx)?;
    state.advance(WriterState::HeapsFilled);
    state.advance(WriterState::TableSizesFinal);

    let pe_options = &options.pe;
    let is_pe32_plus = pe_options.is_pe32_plus();
    let has_entry_point = options
        .cli
        .entry_point
        .is_some_and(|entry| entry.table == TableId::MethodDef);
    let characteristics = pe_options.file_characteristics(has_entry_point);
    let entry_name = pe_options.import_entry_name.clone().unwrap_or_else(|| {
        if characteristics.contains(FileCharacteristics::DLL) {
            "_CorDllMain".to_string()
        } else {
            "_CorExeMain".to_string()
        }
    });
    let stub = pe_options.has_native_stub().then(|| NativeStub {
        is_pe32_plus,
        dll_name: &pe_options.import_dll_name,
        entry_name: &entry_name,
    });

    let mut parts = Vec::new();
    if let Some(stub) = &stub {
        parts.push(SectionPart::new(
            SectionPartKind::ImportAddressTable,
            stub.iat_size(),
            4,
        ));
    }
    parts.push(SectionPart::new(
        SectionPartKind::CliHeader,
        COR20_HEADER_SIZE as u32,
        4,
    ));
    if !payloads.bodies.is_empty() {
        parts.push(SectionPart::new(
            SectionPartKind::MethodBodies,
            size_u32(payloads.bodies.len())?,
            4,
        ));
    }
    if !payloads.field_data.is_empty() {
        parts.push(SectionPart::new(
            SectionPartKind::FieldData,
            size_u32(payloads.field_data.len())?,
            8,
        ));
    }
    if !ctx.resources.is_empty() {
        parts.push(SectionPart::new(
            SectionPartKind::Resources,
            size_u32(ctx.resources.len())?,
            8,
        ));
    }
    if let Some((_, key)) = &strong_name {
        parts.push(SectionPart::new(
            SectionPartKind::StrongNameSignature,
            key.signature_size,
            4,
        ));
    }
    parts.push(SectionPart::new(SectionPartKind::Metadata, streams.size, 4));
    if let Some(debug) = &options.debug {
        parts.push(SectionPart::new(
            SectionPartKind::DebugDirectory,
            size_u32(DEBUG_DIRECTORY_SIZE + debug.data.len())?,
            4,
        ));
    }
    if let Some(stub) = &stub {
        parts.push(SectionPart::new(
            SectionPartKind::ImportDirectory,
            stub.import_directory_size(),
            4,
        ));
        parts.push(SectionPart::new(
            SectionPartKind::StartupStub,
            stub.stub_size(),
            stub.stub_alignment(),
        ));
        parts.push(SectionPart::new(
            SectionPartKind::Relocations,
            pe::RELOCATIONS_SIZE,
            4,
        ));
    }

    let part_count = parts.len();
    let mut sections = provider.section_layout(parts);
    let section_count = u16::try_from(sections.len())
        .map_err(|_| Error::InvalidArgument("too many sections".to_string()))?;
    let headers_size = DOS_HEADER_AND_STUB.len()
        + 4
        + FILE_HEADER_SIZE
        + OptionalHeader::written_size(is_pe32_plus)
        + sections.len() * SECTION_HEADER_SIZE;
    let extent = lay_out_sections(
        &mut sections,
        size_u32(headers_size)?,
        pe_options.section_alignment,
        pe_options.file_alignment,
    )?;

    let placed: HashMap<SectionPartKind, SectionPart> = sections
        .iter()
        .flat_map(|section| section.parts.iter())
        .map(|part| (part.kind, part.clone()))
        .collect();
    let laid_out = sections.iter().map(|section| section.parts.len()).sum::<usize>();
    if placed.len() != part_count || laid_out != part_count {
        return Err(consistency_error!(
            "section layout holds {} parts, expected {}",
            laid_out,
            part_count
        ));
    }
    debug!(
        sections = sections.len(),
        size_of_image = extent.size_of_image,
        file_size = extent.file_size,
        "sections laid out"
    );
    state.advance(WriterState::SectionsLaidOut);

    if !payloads.body_offsets.is_empty() {
        let bodies = placed_part(&placed, SectionPartKind::MethodBodies)?;
        for (row, offset) in &payloads.body_offsets {
            storage.set(TableId::MethodDef, *row, 0, bodies.rva + offset)?;
        }
    }
    if !payloads.field_offsets.is_empty() {
        let field_data = placed_part(&placed, SectionPartKind::FieldData)?;
        for (row, offset) in &payloads.field_offsets {
            storage.set(TableId::FieldRVA, *row, 0, field_data.rva + offset)?;
        }
    }
    state.advance(WriterState::RvasAssigned);

    let metadata_bytes = streams.emit(&storage)?;
    if metadata_bytes.len() != streams.size as usize {
        return Err(consistency_error!(
            "metadata is {} bytes, expected {}",
            metadata_bytes.len(),
            streams.size
        ));
    }

    let signing = strong_name.as_ref().filter(|(sn, _)| !sn.delay_sign);
    let mut flags = options.cli.flags;
    flags.set(ComImageFlags::STRONG_NAME_SIGNED, signing.is_some());
    let cor20 = Cor20Header {
        major_runtime_version: options.cli.major_runtime_version,
        minor_runtime_version: options.cli.minor_runtime_version,
        metadata: directory_of(&placed, SectionPartKind::Metadata),
        flags,
        entry_point_token: options
            .cli
            .entry_point
            .map_or(Token::new(0), |entry| entry.token()),
        resources: directory_of(&placed, SectionPartKind::Resources),
        strong_name_signature: directory_of(&placed, SectionPartKind::StrongNameSignature),
        ..Cor20Header::default()
    };

    let mut data_directories = vec![DataDirectory::default(); DATA_DIRECTORY_COUNT];
    data_directories[DataDirectoryKind::Import as usize] =
        directory_of(&placed, SectionPartKind::ImportDirectory);
    data_directories[DataDirectoryKind::BaseRelocation as usize] =
        directory_of(&placed, SectionPartKind::Relocations);
    data_directories[DataDirectoryKind::Iat as usize] =
        directory_of(&placed, SectionPartKind::ImportAddressTable);
    data_directories[DataDirectoryKind::ClrRuntimeHeader as usize] =
        directory_of(&placed, SectionPartKind::CliHeader);
    if let Some(debug) = placed.get(&SectionPartKind::DebugDirectory) {
        data_directories[DataDirectoryKind::Debug as usize] =
            DataDirectory::new(debug.rva, DEBUG_DIRECTORY_SIZE as u32);
    }

    let address_of_entry_point = match (&stub, placed.get(&SectionPartKind::StartupStub)) {
        (Some(stub), Some(part)) => part.rva + stub.stub_code_offset(),
        _ => 0,
    };
    let raw_size_where = |predicate: fn(&SectionLayoutInfo) -> bool| -> u32 {
        sections
            .iter()
            .filter(|section| predicate(section))
            .map(|section| section.raw_size)
            .sum()
    };

    let headers = PeHeaders {
        dos: DosHeader {
            e_lfanew: DOS_HEADER_AND_STUB.len() as u32,
        },
        file: FileHeader {
            machine: pe_options.machine,
            number_of_sections: section_count,
            time_date_stamp: pe_options.time_date_stamp,
            pointer_to_symbol_table: 0,
            number_of_symbols: 0,
            size_of_optional_header: OptionalHeader::written_size(is_pe32_plus) as u16,
            characteristics,
        },
        optional: OptionalHeader {
            is_pe32_plus,
            major_linker_version: pe_options.major_linker_version,
            minor_linker_version: pe_options.minor_linker_version,
            size_of_code: raw_size_where(SectionLayoutInfo::is_code),
            size_of_initialized_data: raw_size_where(|section| {
                section
                    .characteristics
                    .contains(SectionCharacteristics::CNT_INITIALIZED_DATA)
            }),
            size_of_uninitialized_data: 0,
            address_of_entry_point,
            base_of_code: sections
                .iter()
                .find(|section| section.is_code())
                .map_or(0, |section| section.virtual_address),
            base_of_data: if is_pe32_plus {
                0
            } else {
                sections
                    .iter()
                    .find(|section| !section.is_code())
                    .map_or(0, |section| section.virtual_address)
            },
            image_base: pe_options.image_base,
            section_alignment: pe_options.section_alignment,
            file_alignment: pe_options.file_alignment,
            major_operating_system_version: pe_options.major_operating_system_version,
            minor_operating_system_version: pe_options.minor_operating_system_version,
            major_image_version: pe_options.major_image_version,
            minor_image_version: pe_options.minor_image_version,
            major_subsystem_version: pe_options.major_subsystem_version,
            minor_subsystem_version: pe_options.minor_subsystem_version,
            win32_version_value: 0,
            size_of_image: extent.size_of_image,
            size_of_headers: extent.size_of_headers,
            check_sum: 0,
            subsystem: pe_options.subsystem,
            dll_characteristics: pe_options.dll_characteristics,
            size_of_stack_reserve: pe_options.size_of_stack_reserve,
            size_of_stack_commit: pe_options.size_of_stack_commit,
            size_of_heap_reserve: pe_options.size_of_heap_reserve,
            size_of_heap_commit: pe_options.size_of_heap_commit,
            loader_flags: 0,
            data_directories,
        },
        sections: sections
            .iter()
            .map(|section| {
                let mut header = SectionHeader::named(&section.name);
                header.virtual_size = section.virtual_size;
                header.virtual_address = section.virtual_address;
                header.size_of_raw_data = section.raw_size;
                header.pointer_to_raw_data = section.raw_pointer;
                header.characteristics = section.characteristics;
                header
            })
            .collect(),
    };

    let part_writer = PartWriter {
        cor20,
        payloads: &payloads,
        resources: &ctx.resources,
        metadata: &metadata_bytes,
        debug: options.debug.as_ref(),
        stub: stub.as_ref(),
        placed: &placed,
        image_base: pe_options.image_base,
    };

    let mut image = Vec::with_capacity(extent.file_size as usize);
    headers.write(&mut image)?;
    for section in &sections {
        pad_until(&mut image, section.raw_pointer)?;
        for part in &section.parts {
            pad_until(&mut image, part.offset)?;
            let start = image.len();
            part_writer.write(part, &mut image)?;
            if image.len() - start != part.size as usize {
                return Err(consistency_error!(
                    "{:?} part is {} bytes, expected {}",
                    part.kind,
                    image.len() - start,
                    part.size
                ));
            }
        }
        pad_until(&mut image, section.raw_pointer + section.raw_size)?;
    }
    state.advance(WriterState::BytesEmitted);

    if let Some((sn, key)) = signing {
        let crypto = options.crypto.ok_or_else(strongname::missing_callbacks)?;
        let slot = placed_part(&placed, SectionPartKind::StrongNameSignature)?;
        let slot = slot.offset as usize..(slot.offset + slot.size) as usize;
        let check_sum = headers.check_sum_offset();
        let security = headers.data_directory_offset(DataDirectoryKind::Security);
        strongname::sign_image(
            &mut image,
            &[check_sum..check_sum + 4, security..security + 8],
            slot,
            key,
            sn.hash_algorithm(),
            crypto,
        )?;
        state.advance(WriterState::StrongNameSigned);
    }

    pe::update_checksum(&mut image, headers.check_sum_offset())?;
    state.advance(WriterState::Done);
    Ok(image)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::tables::ModuleRow;

    fn module_only() -> CilMetadata {
        let mut metadata = CilMetadata::default();
        metadata.tables.module.push(ModuleRow {
            generation: 0,
            name: "Test.dll".to_string(),
            mvid: None,
            enc_id: None,
            enc_base_id: None,
        });
        metadata
    }

    struct BlobFirst;

    impl WriterFunctionalityProvider for BlobFirst {
        fn stream_order(&self) -> Vec<StreamKind> {
            vec![StreamKind::Blob, StreamKind::Blob]
        }
    }

    struct DropsParts;

    impl WriterFunctionalityProvider for DropsParts {
        fn section_layout(&self, parts: Vec<SectionPart>) -> Vec<SectionLayoutInfo> {
            let mut sections = default_section_layout(parts);
            sections.truncate(1);
            sections
        }
    }

    #[test]
    fn characteristics() {
        let options = PeOptions::default();
        assert_eq!(
            options.file_characteristics(false),
            FileCharacteristics::EXECUTABLE_IMAGE
                | FileCharacteristics::MACHINE_32BIT
                | FileCharacteristics::DLL
        );

        let x64 = PeOptions {
            machine: MACHINE_AMD64,
            ..PeOptions::default()
        };
        assert!(x64.is_pe32_plus());
        assert_eq!(
            x64.file_characteristics(true),
            FileCharacteristics::EXECUTABLE_IMAGE | FileCharacteristics::LARGE_ADDRESS_AWARE
        );

        let arm = PeOptions {
            machine: MACHINE_ARM64,
            characteristics: Some(FileCharacteristics::EXECUTABLE_IMAGE),
            ..PeOptions::default()
        };
        assert!(!arm.has_native_stub());
        assert_eq!(
            arm.file_characteristics(false),
            FileCharacteristics::EXECUTABLE_IMAGE
        );
    }

    #[test]
    fn stream_order() {
        let metadata = module_only();
        let ctx_tables = metadata.tables.clone();
        let mut ctx = WriteContext::new(&ctx_tables);
        let mut storage = RawValueStorage::new(ctx_tables.row_counts());
        ctx_tables.extract_rows(&mut ctx, &mut storage).unwrap();

        let streams =
            MetadataStreams::new(&ctx, &ctx_tables, &CliOptions::default(), &BlobFirst).unwrap();
        // empty #US and #GUID heaps are left out
        assert_eq!(
            streams.kinds,
            [StreamKind::Blob, StreamKind::Tables, StreamKind::Strings]
        );
        assert_eq!(streams.root.stream_headers[0].name, "#Blob");
        assert_eq!(
            streams.root.stream_headers[0].offset as usize,
            streams.root.size()
        );

        let bytes = streams.emit(&storage).unwrap();
        assert_eq!(bytes.len(), streams.size as usize);
        assert_eq!(&bytes[..4], b"BSJB");
    }

    #[test]
    fn rejects_invalid_entry_point() {
        let metadata = module_only();
        let options = WritingOptions {
            cli: CliOptions {
                entry_point: Some(TableIndex::new(TableId::MethodDef, 0)),
                ..CliOptions::default()
            },
            ..WritingOptions::default()
        };
        assert!(matches!(
            write_metadata(&metadata, &options),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn rejects_incomplete_layout() {
        let options = WritingOptions {
            provider: Some(&DropsParts),
            ..WritingOptions::default()
        };
        assert!(matches!(
            write_metadata(&module_only(), &options),
            Err(Error::WriteConsistency { .. })
        ));
    }

    #[test]
    fn strong_name_needs_assembly() {
        let options = WritingOptions {
            strong_name: Some(StrongNameOptions {
                key: StrongNameKeySource::PublicKey(strongname::ECMA_PUBLIC_KEY.to_vec()),
                delay_sign: true,
                hash_algorithm: None,
            }),
            ..WritingOptions::default()
        };
        assert!(matches!(
            write_metadata(&module_only(), &options),
            Err(Error::SigningFailed(_))
        ));
    }

    #[test]
    fn minimal_image() {
        let image = write_metadata(&module_only(), &WritingOptions::default()).unwrap();
        let headers = PeHeaders::read(&image).unwrap();

        assert_eq!(headers.file.machine, MACHINE_I386);
        assert_eq!(headers.sections.len(), 2);
        assert_eq!(headers.sections[0].name(), ".text");
        assert_eq!(headers.sections[1].name(), ".reloc");
        assert_eq!(image.len() % 0x200, 0);

        let cli = headers.optional.data_directory(DataDirectoryKind::ClrRuntimeHeader);
        assert_eq!(cli.size, 72);
        // the IAT comes first in .text, the CLI header right after it
        assert_eq!(cli.rva, 0x2008);
        assert_eq!(
            headers.optional.data_directory(DataDirectoryKind::Iat),
            DataDirectory::new(0x2000, 8)
        );
        assert_ne!(headers.optional.address_of_entry_point, 0);
        assert_eq!(
            headers.optional.check_sum,
            pe_checksum(&image, headers.check_sum_offset())
        );
    }
}
