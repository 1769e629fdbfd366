//! A complete assembly image in typed form.
//!
//! [`CilMetadata`] is what the reader produces and what the writer consumes: the typed rows
//! of every metadata table plus the few values of the CLI header and the metadata root that
//! are not derived from the tables. Everything else in an image (heaps, RVAs, index widths,
//! section layout) is recomputed on every write.
//!
//! # Examples
//!
//! ```rust
//! use dotmeta::{metadata::tables::ModuleRow, CilMetadata, WritingOptions};
//!
//! let mut metadata = CilMetadata::default();
//! metadata.tables.module.push(ModuleRow {
//!     generation: 0,
//!     name: "Test.dll".to_string(),
//!     mvid: None,
//!     enc_id: None,
//!     enc_base_id: None,
//! });
//!
//! let image = metadata.write(&WritingOptions::default())?;
//! let reread = CilMetadata::from_mem(image)?;
//! assert_eq!(reread.tables, metadata.tables);
//! # Ok::<(), dotmeta::Error>(())
//! ```

use std::path::Path;

use crate::{
    file::{
        pe::{debug::DebugInformation, PeHeaders},
        File,
    },
    metadata::{
        cor20header::ComImageFlags,
        root::DEFAULT_METADATA_VERSION,
        tables::{MetadataTables, TableIndex},
    },
    reader::{read_metadata, ReadingArguments},
    writer::{write_metadata, CliOptions, DebugOptions, PeOptions, WritingOptions},
    Result,
};

/// The typed content of an assembly image.
#[derive(Debug, Clone, PartialEq)]
pub struct CilMetadata {
    /// Rows of all metadata tables
    pub tables: MetadataTables,
    /// Version string of the metadata root
    pub metadata_version: String,
    /// Major runtime version of the CLI header
    pub major_runtime_version: u16,
    /// Minor runtime version of the CLI header
    pub minor_runtime_version: u16,
    /// CLI header flags
    pub flags: ComImageFlags,
    /// `MethodDef` or `File` row of the entry point
    pub entry_point: Option<TableIndex>,
    /// Major version of the table stream
    pub tables_major_version: u8,
    /// Minor version of the table stream
    pub tables_minor_version: u8,
    /// PE headers of the image this was read from, `None` for metadata built in memory
    pub pe_headers: Option<PeHeaders>,
    /// First debug directory entry and its data
    pub debug: Option<DebugInformation>,
    /// Content of the strong-name signature slot
    pub strong_name_signature: Vec<u8>,
}

impl Default for CilMetadata {
    fn default() -> Self {
        CilMetadata {
            tables: MetadataTables::default(),
            metadata_version: DEFAULT_METADATA_VERSION.to_string(),
            major_runtime_version: 2,
            minor_runtime_version: 5,
            flags: ComImageFlags::IL_ONLY,
            entry_point: None,
            tables_major_version: 2,
            tables_minor_version: 0,
            pe_headers: None,
            debug: None,
            strong_name_signature: Vec::new(),
        }
    }
}

impl CilMetadata {
    /// Metadata holding `tables` and default header values.
    #[must_use]
    pub fn new(tables: MetadataTables) -> Self {
        CilMetadata {
            tables,
            ..CilMetadata::default()
        }
    }

    /// Read an image from disk.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] if the file cannot be opened and any error of
    /// [`read_metadata`].
    pub fn from_file(path: &Path) -> Result<CilMetadata> {
        Self::read(&File::from_file(path)?, &ReadingArguments::default())
    }

    /// Read an image held in memory.
    ///
    /// # Errors
    /// See [`read_metadata`].
    pub fn from_mem(data: Vec<u8>) -> Result<CilMetadata> {
        Self::read(&File::from_mem(data)?, &ReadingArguments::default())
    }

    /// Read a loaded image with explicit arguments.
    ///
    /// # Errors
    /// See [`read_metadata`].
    pub fn read(file: &File, args: &ReadingArguments) -> Result<CilMetadata> {
        read_metadata(file, args)
    }

    /// Serialize into a complete PE image.
    ///
    /// # Errors
    /// See [`write_metadata`].
    pub fn write(&self, options: &WritingOptions) -> Result<Vec<u8>> {
        write_metadata(self, options)
    }

    /// Serialize into a PE image on disk.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] if the file cannot be written and any error of
    /// [`write_metadata`].
    pub fn write_to_file(&self, path: &Path, options: &WritingOptions) -> Result<()> {
        let image = self.write(options)?;
        std::fs::write(path, image)?;
        Ok(())
    }

    /// Writing options reproducing the headers this metadata was read with: PE settings from
    /// the original headers, CLI settings from the header values, and the debug entry.
    #[must_use]
    pub fn writing_options(&self) -> WritingOptions<'static> {
        let pe = self
            .pe_headers
            .as_ref()
            .map(PeOptions::from_headers)
            .unwrap_or_default();

        WritingOptions {
            pe,
            cli: CliOptions {
                major_runtime_version: self.major_runtime_version,
                minor_runtime_version: self.minor_runtime_version,
                flags: self.flags - ComImageFlags::STRONG_NAME_SIGNED,
                entry_point: self.entry_point,
                metadata_version: self.metadata_version.clone(),
                tables_major_version: self.tables_major_version,
                tables_minor_version: self.tables_minor_version,
            },
            debug: self.debug.as_ref().map(DebugOptions::from),
            ..WritingOptions::default()
        }
    }
}
