//! Access to the raw bytes of a PE image.
//!
//! [`File`] combines an input [`Backend`] (memory-mapped file or owned buffer) with the parsed
//! [`pe::PeHeaders`] and an [`rva::RvaConverter`], so that the metadata reader can address
//! data by RVA without caring where the bytes come from.
//!
//! # Key Components
//!
//! - [`File`] - loaded image with header access and RVA based lookups
//! - [`Backend`] - trait for byte sources
//! - [`io`] - little-endian primitives and the appending [`io::CilWrite`] trait
//! - [`parser::Parser`] - cursor based decoder
//! - [`pe`] - PE/COFF header codec
//! - [`rva`] - RVA / file offset conversion
//!
//! # Examples
//!
//! ```rust,no_run
//! use dotmeta::File;
//! use std::path::Path;
//!
//! let file = File::from_file(Path::new("assembly.dll"))?;
//! let cli = file.clr()?;
//! println!("CLI header at file offset 0x{:x}", cli.0);
//! # Ok::<(), dotmeta::Error>(())
//! ```

pub mod io;
pub mod memory;
pub mod parser;
pub mod pe;
pub mod physical;
pub mod rva;

use std::path::Path;

use memory::Memory;
use pe::{DataDirectoryKind, PeHeaders};
use physical::Physical;
use rva::RvaConverter;

use crate::{
    Error::{self, Empty, OutOfBounds},
    Result,
};

/// Source of image bytes.
pub trait Backend: Send + Sync {
    /// Returns a slice of the data at the given offset and length.
    ///
    /// # Errors
    /// Returns an error if the requested range is out of bounds.
    fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]>;

    /// Returns the entire data buffer.
    fn data(&self) -> &[u8];

    /// Returns the total length of the data buffer.
    fn len(&self) -> usize;
}

/// A loaded PE image.
pub struct File {
    data: Box<dyn Backend>,
    headers: PeHeaders,
    converter: RvaConverter,
}

impl File {
    /// Memory-map and parse the file at `file`.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] if the file cannot be mapped, or any error of
    /// [`pe::PeHeaders::read`].
    pub fn from_file(file: &Path) -> Result<File> {
        Self::load(Physical::new(file)?)
    }

    /// Parse an image held in memory.
    ///
    /// # Errors
    /// Returns [`crate::Error::Empty`] for an empty buffer, or any error of
    /// [`pe::PeHeaders::read`].
    pub fn from_mem(data: Vec<u8>) -> Result<File> {
        Self::load(Memory::new(data))
    }

    fn load<T: Backend + 'static>(data: T) -> Result<File> {
        if data.len() == 0 {
            return Err(Empty);
        }

        let headers = PeHeaders::read(data.data())?;
        let converter = RvaConverter::from_headers(&headers.sections);

        Ok(File {
            data: Box::new(data),
            headers,
            converter,
        })
    }

    /// Size of the image in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the image is empty. Always false for a successfully loaded file.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.len() == 0
    }

    /// The parsed PE headers.
    #[must_use]
    pub fn headers(&self) -> &PeHeaders {
        &self.headers
    }

    /// The RVA converter built from the section table.
    #[must_use]
    pub fn converter(&self) -> &RvaConverter {
        &self.converter
    }

    /// All image bytes.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        self.data.data()
    }

    /// A bounds-checked slice of the image.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the range lies outside the image.
    pub fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]> {
        self.data.data_slice(offset, len)
    }

    /// Convert an RVA to a file offset, `None` if no section contains it.
    #[must_use]
    pub fn rva_to_offset(&self, rva: u32) -> Option<usize> {
        self.converter
            .to_offset(u64::from(rva))
            .and_then(|offset| usize::try_from(offset).ok())
    }

    /// Convert a file offset to an RVA, `None` if no section contains it.
    #[must_use]
    pub fn offset_to_rva(&self, offset: usize) -> Option<u32> {
        self.converter
            .to_rva(offset as u64)
            .and_then(|rva| u32::try_from(rva).ok())
    }

    /// `len` bytes starting at `rva`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the RVA is unmapped or the range leaves the
    /// image.
    pub fn data_at_rva(&self, rva: u32, len: usize) -> Result<&[u8]> {
        let offset = self.rva_to_offset(rva).ok_or(OutOfBounds)?;
        self.data_slice(offset, len)
    }

    /// Everything from `rva` to the end of the image, `None` if the RVA is unmapped.
    #[must_use]
    pub fn data_from_rva(&self, rva: u32) -> Option<&[u8]> {
        let offset = self.rva_to_offset(rva)?;
        self.data().get(offset..)
    }

    /// File offset and size of the CLI header.
    ///
    /// # Errors
    /// Returns [`crate::Error::BadImageFormat`] if the image has no CLI header directory or it
    /// does not map into any section.
    pub fn clr(&self) -> Result<(usize, usize)> {
        let directory = self
            .headers
            .optional
            .data_directory(DataDirectoryKind::ClrRuntimeHeader);
        if directory.is_empty() {
            return Err(Error::BadImageFormat(
                "no data directory for CLI header".to_string(),
            ));
        }

        let offset = self.rva_to_offset(directory.rva).ok_or_else(|| {
            Error::BadImageFormat("CLI header RVA does not map into any section".to_string())
        })?;
        Ok((offset, directory.size as usize))
    }

    /// Whether this is a PE32+ image.
    #[must_use]
    pub fn is_pe32_plus(&self) -> bool {
        self.headers.optional.is_pe32_plus
    }
}
