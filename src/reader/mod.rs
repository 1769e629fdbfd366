//! Reading PE images into [`CilMetadata`].
//!
//! The reader walks an image front to back: PE headers, the CLI header, the metadata root
//! and its streams, the table stream header, the raw rows, and finally the typed rows and the
//! payloads stored outside of the metadata (method bodies, field initial data, embedded
//! resources, debug data). Each step is one [`ReaderState`] transition, logged at `debug`.
//!
//! Structural problems (missing CLI header, missing table stream, truncated rows) fail the
//! read. Problems confined to a single value degrade locally: custom attributes whose
//! constructor cannot be resolved keep their raw blob, field data behind an unmapped RVA is
//! left empty, and both are reported with `warn!`.
//!
//! # Examples
//!
//! ```rust,no_run
//! use dotmeta::{reader::{read_metadata, ReadingArguments}, File};
//!
//! let file = File::from_file("tests/samples/Test.dll".as_ref())?;
//! let args = ReadingArguments {
//!     read_il: false,
//!     ..ReadingArguments::default()
//! };
//! let metadata = read_metadata(&file, &args)?;
//! assert!(metadata.tables.method_def.iter().all(|method| method.body.is_none()));
//! # Ok::<(), dotmeta::Error>(())
//! ```

mod payload;

use std::fmt;

use tracing::{debug, warn};

use crate::{
    file::File,
    metadata::{
        cilmetadata::CilMetadata,
        cor20header::{ComImageFlags, Cor20Header, COR20_HEADER_SIZE},
        root::Root,
        streams::{Blob, Guid, StreamKind, Strings, UserStrings},
        tables::{read_tables, MetadataTables, ReadContext, TableId, TableIndex},
    },
    Error, Result,
};

/// Hooks to customize how an image is read.
pub trait ReaderFunctionalityProvider {
    /// Kind of the stream called `name`, `None` to ignore the stream.
    fn stream_kind(&self, name: &str) -> Option<StreamKind> {
        StreamKind::from_name(name)
    }
}

/// The reader behavior without customization.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultReaderProvider;

impl ReaderFunctionalityProvider for DefaultReaderProvider {}

/// Arguments of a read.
#[derive(Clone, Copy)]
pub struct ReadingArguments<'a> {
    /// Custom reader hooks, [`DefaultReaderProvider`] when `None`
    pub provider: Option<&'a dyn ReaderFunctionalityProvider>,
    /// Whether method bodies are decoded
    pub read_il: bool,
}

impl Default for ReadingArguments<'_> {
    fn default() -> Self {
        ReadingArguments {
            provider: None,
            read_il: true,
        }
    }
}

impl fmt::Debug for ReadingArguments<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadingArguments")
            .field("provider", &self.provider.map(|_| "custom"))
            .field("read_il", &self.read_il)
            .finish()
    }
}

/// Progress of a read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderState {
    /// Nothing read yet
    Start,
    /// PE headers parsed
    PeHeaderParsed,
    /// CLI header found and parsed
    CliHeaderLocated,
    /// Metadata root parsed
    MetadataRootParsed,
    /// Streams mapped to their kinds
    StreamsDiscovered,
    /// Table stream header parsed
    TableStreamHeaderParsed,
    /// Raw column values decoded
    RowsPopulated,
    /// Heaps available for column resolution
    HeapsResolved,
    /// Typed rows built
    RawValuesResolved,
    /// Method bodies, field data and resources loaded
    IlAndFieldDataPopulated,
    /// Read complete
    Done,
}

struct StateTracker(ReaderState);

impl StateTracker {
    fn advance(&mut self, next: ReaderState) {
        debug!(from = ?self.0, to = ?next, "reader state");
        self.0 = next;
    }
}

/// Stream contents of one metadata root. Absent heaps are empty.
#[derive(Default)]
struct Streams<'a> {
    strings: &'a [u8],
    user_strings: &'a [u8],
    guids: &'a [u8],
    blobs: &'a [u8],
    tables: Option<&'a [u8]>,
}

impl<'a> Streams<'a> {
    fn discover(
        root: &Root,
        metadata: &'a [u8],
        provider: &dyn ReaderFunctionalityProvider,
    ) -> Result<Streams<'a>> {
        let mut streams = Streams::default();
        let mut seen = Vec::new();

        for header in &root.stream_headers {
            let Some(kind) = provider.stream_kind(&header.name) else {
                debug!(name = %header.name, "ignoring unknown stream");
                continue;
            };

            let start = header.offset as usize;
            let data = metadata
                .get(start..start + header.size as usize)
                .ok_or_else(|| malformed_error!("Stream {} exceeds the metadata", header.name))?;

            let slot = match kind {
                StreamKind::Tables | StreamKind::UncompressedTables => StreamKind::Tables,
                other => other,
            };
            if seen.contains(&slot) {
                warn!(name = %header.name, "duplicate stream, keeping the first one");
                continue;
            }
            seen.push(slot);

            match slot {
                StreamKind::Strings => streams.strings = data,
                StreamKind::UserStrings => streams.user_strings = data,
                StreamKind::Guid => streams.guids = data,
                StreamKind::Blob => streams.blobs = data,
                StreamKind::Tables | StreamKind::UncompressedTables => streams.tables = Some(data),
            }
        }

        Ok(streams)
    }
}

/// Read the metadata of a loaded image.
///
/// # Errors
/// Returns [`crate::Error::BadImageFormat`] if the image has no CLI header, no metadata root
/// or no table stream, [`crate::Error::Malformed`] or [`crate::Error::OutOfBounds`] for
/// inconsistent metadata, method bodies or heap indices.
pub fn read_metadata(file: &File, args: &ReadingArguments) -> Result<CilMetadata> {
    let provider = args.provider.unwrap_or(&DefaultReaderProvider);
    let mut state = StateTracker(ReaderState::Start);

    // File::from_* parsed and validated the PE headers already
    state.advance(ReaderState::PeHeaderParsed);

    let (cor20_offset, _) = file.clr()?;
    let cor20 = Cor20Header::read(file.data_slice(cor20_offset, COR20_HEADER_SIZE)?)?;
    state.advance(ReaderState::CliHeaderLocated);

    let metadata = file.data_at_rva(cor20.metadata.rva, cor20.metadata.size as usize)?;
    let root = Root::read(metadata)?;
    debug!(version = %root.version, streams = root.stream_headers.len(), "metadata root");
    state.advance(ReaderState::MetadataRootParsed);

    let streams = Streams::discover(&root, metadata, provider)?;
    state.advance(ReaderState::StreamsDiscovered);

    let table_stream = streams
        .tables
        .ok_or_else(|| Error::BadImageFormat("no table stream exists".to_string()))?;
    let (header, info, raw) = read_tables(table_stream)?;
    state.advance(ReaderState::TableStreamHeaderParsed);
    debug!(
        tables = header.valid.count_ones(),
        rows_size = info.rows_size(),
        "table stream"
    );
    state.advance(ReaderState::RowsPopulated);

    let user_strings = UserStrings::from(streams.user_strings)?;
    let ctx = ReadContext::new(
        Strings::from(streams.strings)?,
        Blob::from(streams.blobs)?,
        Guid::from(streams.guids)?,
        &raw,
    );
    state.advance(ReaderState::HeapsResolved);

    let mut tables = MetadataTables::read_rows(&ctx)?;
    state.advance(ReaderState::RawValuesResolved);

    if args.read_il {
        payload::load_method_bodies(file, &raw, &user_strings, &mut tables)?;
    }
    payload::load_field_data(file, &raw, &mut tables);
    payload::load_resources(file, &cor20, &raw, &mut tables)?;
    state.advance(ReaderState::IlAndFieldDataPopulated);

    let entry_point = entry_point(&cor20)?;
    let strong_name_signature = payload::read_strong_name_signature(file, &cor20);
    let debug = payload::read_debug_information(file);

    state.advance(ReaderState::Done);
    Ok(CilMetadata {
        tables,
        metadata_version: root.version,
        major_runtime_version: cor20.major_runtime_version,
        minor_runtime_version: cor20.minor_runtime_version,
        flags: cor20.flags,
        entry_point,
        tables_major_version: header.major_version,
        tables_minor_version: header.minor_version,
        pe_headers: Some(file.headers().clone()),
        debug,
        strong_name_signature,
    })
}

fn entry_point(cor20: &Cor20Header) -> Result<Option<TableIndex>> {
    if cor20.flags.contains(ComImageFlags::NATIVE_ENTRYPOINT) {
        warn!(
            rva = cor20.entry_point_token.value(),
            "native entry point is not represented"
        );
        return Ok(None);
    }
    if cor20.entry_point_token.is_null() {
        return Ok(None);
    }

    let index = TableIndex::from_token(cor20.entry_point_token)?;
    match index.table {
        TableId::MethodDef | TableId::File => Ok(Some(index)),
        _ => Err(malformed_error!(
            "Entry point {} is neither a method nor a file",
            cor20.entry_point_token
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{streams::StreamHeader, tables::ModuleRow, token::Token};

    struct RenamedTables;

    impl ReaderFunctionalityProvider for RenamedTables {
        fn stream_kind(&self, name: &str) -> Option<StreamKind> {
            match name {
                "#Schema" => Some(StreamKind::Tables),
                other => StreamKind::from_name(other),
            }
        }
    }

    struct HidesTables;

    impl ReaderFunctionalityProvider for HidesTables {
        fn stream_kind(&self, name: &str) -> Option<StreamKind> {
            match StreamKind::from_name(name) {
                Some(StreamKind::Tables | StreamKind::UncompressedTables) => None,
                other => other,
            }
        }
    }

    fn root(names: &[(&str, u32, u32)]) -> Root {
        Root::new(
            "v4.0.30319",
            names
                .iter()
                .map(|(name, offset, size)| StreamHeader {
                    offset: *offset,
                    size: *size,
                    name: (*name).to_string(),
                })
                .collect(),
        )
    }

    #[test]
    fn discovers_streams() {
        let metadata = [1u8, 2, 3, 4, 5, 6, 7, 8];
        let root = root(&[
            ("#~", 0, 4),
            ("#Strings", 4, 4),
            ("#Strings", 0, 8),
            ("#Custom", 0, 8),
        ]);

        let streams = Streams::discover(&root, &metadata, &DefaultReaderProvider).unwrap();
        assert_eq!(streams.tables, Some(&metadata[..4]));
        assert_eq!(streams.strings, &metadata[4..]);
        assert!(streams.blobs.is_empty());
    }

    #[test]
    fn provider_maps_streams() {
        let metadata = [0u8; 8];
        let root = root(&[("#Schema", 0, 8)]);

        let streams = Streams::discover(&root, &metadata, &DefaultReaderProvider).unwrap();
        assert!(streams.tables.is_none());

        let streams = Streams::discover(&root, &metadata, &RenamedTables).unwrap();
        assert_eq!(streams.tables.map(<[u8]>::len), Some(8));
    }

    #[test]
    fn stream_out_of_range() {
        let metadata = [0u8; 8];
        let root = root(&[("#Blob", 4, 8)]);
        assert!(Streams::discover(&root, &metadata, &DefaultReaderProvider).is_err());
    }

    #[test]
    fn entry_points() {
        let mut cor20 = Cor20Header::default();
        assert_eq!(entry_point(&cor20).unwrap(), None);

        cor20.entry_point_token = Token::new(0x0600_0002);
        assert_eq!(
            entry_point(&cor20).unwrap(),
            Some(TableIndex::new(TableId::MethodDef, 1))
        );

        cor20.entry_point_token = Token::new(0x0200_0001);
        assert!(entry_point(&cor20).is_err());

        cor20.flags |= ComImageFlags::NATIVE_ENTRYPOINT;
        cor20.entry_point_token = Token::new(0x2050);
        assert_eq!(entry_point(&cor20).unwrap(), None);
    }

    #[test]
    fn missing_table_stream() {
        let mut metadata = CilMetadata::default();
        metadata.tables.module.push(ModuleRow {
            generation: 0,
            name: "Test.dll".to_string(),
            mvid: None,
            enc_id: None,
            enc_base_id: None,
        });
        let image = metadata.write(&metadata.writing_options()).unwrap();
        let file = File::from_mem(image).unwrap();

        assert!(read_metadata(&file, &ReadingArguments::default()).is_ok());

        let args = ReadingArguments {
            provider: Some(&HidesTables),
            ..ReadingArguments::default()
        };
        match read_metadata(&file, &args) {
            Err(Error::BadImageFormat(message)) => assert!(message.contains("no table stream")),
            other => panic!("unexpected result {other:?}"),
        }
    }
}
